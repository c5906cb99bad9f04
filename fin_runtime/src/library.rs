// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Libraries and the entities they declare.
//!
//! A library owns its functions and types and keeps ordered reference
//! vectors so bytecode can name entities by small index. Local declarations
//! append to the reference vectors in declaration order; cross-library
//! references resolve a name in another library and append the handle to the
//! current library's vectors, so local and imported references share one
//! index space.
//!
//! Entities are addressed by `(library, index)` handles rather than
//! borrowed references; the [`Runtime`](crate::runtime::Runtime) owns the
//! whole graph and resolves handles on demand.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::error::RuntimeError;
use crate::native::NativeId;
use crate::value::{Index, Pc};

/// A library identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LibraryId(String);

impl LibraryId {
    /// Creates an identifier from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A handle to a function: owning library index plus intra-library index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FunctionId {
    /// Owning library index.
    pub library: usize,
    /// Index within the library's function table.
    pub function: usize,
}

/// A handle to a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeId {
    /// Owning library index.
    pub library: usize,
    /// Index within the library's type table.
    pub ty: usize,
}

/// A handle to a member of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemberId {
    /// The type declaring the member.
    pub ty: TypeId,
    /// Index within the type's member list.
    pub member: usize,
}

/// Declaration-site metadata of a function.
#[derive(Debug)]
pub struct Function {
    name: String,
    generics: Index,
    contracts: Index,
    native: Option<NativeId>,
    init: Pc,
    location: Pc,
}

impl Function {
    pub(crate) fn new(name: String, generics: Index, contracts: Index, init: Pc, location: Pc) -> Self {
        Self {
            name,
            generics,
            contracts,
            native: None,
            init,
            location,
        }
    }

    pub(crate) fn native(name: String, generics: Index, contracts: Index, id: NativeId) -> Self {
        Self {
            name,
            generics,
            contracts,
            native: Some(id),
            init: 0,
            location: 0,
        }
    }

    /// Returns the function name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of type-size parameters.
    #[must_use]
    pub fn generics(&self) -> Index {
        self.generics
    }

    /// Returns the number of sub-contract parameters.
    #[must_use]
    pub fn contracts(&self) -> Index {
        self.contracts
    }

    /// Returns the native implementation, if any.
    #[must_use]
    pub fn native_id(&self) -> Option<NativeId> {
        self.native
    }

    /// Returns the pc of the init block.
    #[must_use]
    pub fn init(&self) -> Pc {
        self.init
    }

    /// Returns the pc of the body.
    #[must_use]
    pub fn location(&self) -> Pc {
        self.location
    }
}

/// A member of a type, carrying its position within the member list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    name: String,
    index: Index,
}

impl Member {
    /// Returns the member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the member's position within its type.
    #[must_use]
    pub fn index(&self) -> Index {
        self.index
    }
}

/// A named type with ordered members.
#[derive(Debug)]
pub struct Type {
    name: String,
    generics: Index,
    location: Pc,
    members: Vec<Member>,
}

impl Type {
    pub(crate) fn new(name: String, generics: Index, location: Pc) -> Self {
        Self {
            name,
            generics,
            location,
            members: Vec::new(),
        }
    }

    pub(crate) fn add_member(&mut self, name: String) -> usize {
        let index = self.members.len();
        self.members.push(Member {
            name,
            index: index as Index,
        });
        index
    }

    /// Returns the type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of type-size parameters.
    #[must_use]
    pub fn generics(&self) -> Index {
        self.generics
    }

    /// Returns the pc of the type's layout header.
    #[must_use]
    pub fn location(&self) -> Pc {
        self.location
    }

    /// Returns the member at `index`.
    pub fn member(&self, index: usize) -> Result<&Member, RuntimeError> {
        self.members.get(index).ok_or(RuntimeError::IndexOutOfRange {
            table: "member",
            index,
            len: self.members.len(),
        })
    }
}

/// A named collection of functions and types plus its reference vectors.
#[derive(Debug)]
pub struct Library {
    id: LibraryId,
    functions: Vec<Function>,
    types: Vec<Type>,
    function_names: BTreeMap<String, usize>,
    type_names: BTreeMap<String, usize>,
    ref_functions: Vec<FunctionId>,
    ref_types: Vec<TypeId>,
    ref_members: Vec<MemberId>,
}

impl Library {
    pub(crate) fn new(id: LibraryId) -> Self {
        Self {
            id,
            functions: Vec::new(),
            types: Vec::new(),
            function_names: BTreeMap::new(),
            type_names: BTreeMap::new(),
            ref_functions: Vec::new(),
            ref_types: Vec::new(),
            ref_members: Vec::new(),
        }
    }

    /// Returns the library identifier.
    #[must_use]
    pub fn id(&self) -> &LibraryId {
        &self.id
    }

    /// Declares a function, appending it to the reference vector.
    ///
    /// `library` is this library's own index within the runtime.
    pub(crate) fn add_function(&mut self, library: usize, function: Function) -> FunctionId {
        let index = self.functions.len();
        self.function_names.insert(function.name.clone(), index);
        self.functions.push(function);
        let id = FunctionId {
            library,
            function: index,
        };
        self.ref_functions.push(id);
        id
    }

    /// Declares a type, appending it to the reference vector.
    pub(crate) fn add_type(&mut self, library: usize, ty: Type) -> TypeId {
        let index = self.types.len();
        self.type_names.insert(ty.name.clone(), index);
        self.types.push(ty);
        let id = TypeId { library, ty: index };
        self.ref_types.push(id);
        id
    }

    /// Appends an imported function handle to the reference vector.
    pub(crate) fn add_ref_function(&mut self, id: FunctionId) {
        self.ref_functions.push(id);
    }

    /// Appends an imported type handle to the reference vector.
    pub(crate) fn add_ref_type(&mut self, id: TypeId) {
        self.ref_types.push(id);
    }

    /// Appends a member handle to the reference vector.
    pub(crate) fn add_ref_member(&mut self, id: MemberId) {
        self.ref_members.push(id);
    }

    /// Looks up a declared function by name.
    pub fn function_id(&self, library: usize, name: &str) -> Result<FunctionId, RuntimeError> {
        self.function_names
            .get(name)
            .map(|&function| FunctionId { library, function })
            .ok_or_else(|| RuntimeError::UnknownFunction { name: name.into() })
    }

    /// Looks up a declared type by name.
    pub fn type_id(&self, library: usize, name: &str) -> Result<TypeId, RuntimeError> {
        self.type_names
            .get(name)
            .map(|&ty| TypeId { library, ty })
            .ok_or_else(|| RuntimeError::UnknownType { name: name.into() })
    }

    /// Returns the declared function at `index`.
    pub fn function(&self, index: usize) -> Result<&Function, RuntimeError> {
        self.functions
            .get(index)
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "function",
                index,
                len: self.functions.len(),
            })
    }

    /// Returns the declared type at `index`.
    pub fn ty(&self, index: usize) -> Result<&Type, RuntimeError> {
        self.types.get(index).ok_or(RuntimeError::IndexOutOfRange {
            table: "type",
            index,
            len: self.types.len(),
        })
    }

    pub(crate) fn ty_mut(&mut self, index: usize) -> Result<&mut Type, RuntimeError> {
        let len = self.types.len();
        self.types
            .get_mut(index)
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "type",
                index,
                len,
            })
    }

    /// Resolves reference-vector entry `index` to a function handle.
    pub fn ref_function(&self, index: usize) -> Result<FunctionId, RuntimeError> {
        self.ref_functions
            .get(index)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "ref function",
                index,
                len: self.ref_functions.len(),
            })
    }

    /// Resolves reference-vector entry `index` to a type handle.
    pub fn ref_type(&self, index: usize) -> Result<TypeId, RuntimeError> {
        self.ref_types
            .get(index)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "ref type",
                index,
                len: self.ref_types.len(),
            })
    }

    /// Resolves reference-vector entry `index` to a member handle.
    pub fn ref_member(&self, index: usize) -> Result<MemberId, RuntimeError> {
        self.ref_members
            .get(index)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "ref member",
                index,
                len: self.ref_members.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn declarations_append_to_reference_vectors() {
        let mut lib = Library::new(LibraryId::new("rt"));
        let f0 = lib.add_function(0, Function::new("a()".to_string(), 0, 0, 1, 2));
        let f1 = lib.add_function(0, Function::new("b()".to_string(), 1, 0, 3, 4));

        assert_eq!(lib.ref_function(0).unwrap(), f0);
        assert_eq!(lib.ref_function(1).unwrap(), f1);
        assert_eq!(lib.function_id(0, "b()").unwrap(), f1);
        assert_eq!(lib.function(f1.function).unwrap().generics(), 1);
    }

    #[test]
    fn imports_share_the_local_index_space() {
        let mut lib = Library::new(LibraryId::new("app"));
        lib.add_function(1, Function::new("local()".to_string(), 0, 0, 0, 0));

        let imported = FunctionId {
            library: 0,
            function: 7,
        };
        lib.add_ref_function(imported);
        assert_eq!(lib.ref_function(1).unwrap(), imported);
    }

    #[test]
    fn unknown_names_are_reported() {
        let lib = Library::new(LibraryId::new("rt"));
        assert_eq!(
            lib.function_id(0, "missing()"),
            Err(RuntimeError::UnknownFunction {
                name: "missing()".to_string()
            })
        );
        assert_eq!(
            lib.type_id(0, "Missing"),
            Err(RuntimeError::UnknownType {
                name: "Missing".to_string()
            })
        );
    }

    #[test]
    fn members_carry_their_index() {
        let mut ty = Type::new("Pair".to_string(), 1, 0);
        assert_eq!(ty.add_member("first".to_string()), 0);
        assert_eq!(ty.add_member("second".to_string()), 1);

        assert_eq!(ty.member(1).unwrap().name(), "second");
        assert_eq!(ty.member(1).unwrap().index(), 1);
        assert!(matches!(
            ty.member(2),
            Err(RuntimeError::IndexOutOfRange { table: "member", .. })
        ));
    }

    #[test]
    fn out_of_range_reference_indices_are_reported() {
        let lib = Library::new(LibraryId::new("rt"));
        assert!(matches!(
            lib.ref_function(0),
            Err(RuntimeError::IndexOutOfRange {
                table: "ref function",
                ..
            })
        ));
        assert!(matches!(
            lib.ref_member(3),
            Err(RuntimeError::IndexOutOfRange {
                table: "ref member",
                ..
            })
        ));
    }
}
