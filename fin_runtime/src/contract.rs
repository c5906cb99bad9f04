// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contracts: per-activation records of generic instantiation.
//!
//! A contract is built by the caller before a call: size opcodes stage
//! concrete [`TypeInfo`]s on the tail of the *current* contract's `sizes`
//! vector (the "size stack"), and `Contract`/`TypeCall` opcodes pop staged
//! entries into a child. During the callee's first execution its init block
//! records argument, local, and member offsets into the contract; `Sign`
//! freezes the layout, and subsequent calls jump straight to the body.
//!
//! Contracts live in a runtime-owned arena and refer to each other by
//! [`ContractId`]. A parent keeps its children alive for the lifetime of the
//! run; the only child discarded early is the transient type contract, which
//! `sign` drops once member offsets have been copied out.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::RuntimeError;
use crate::library::{Function, Type};
use crate::native::NativeId;
use crate::offset::{Alignment, Offset, TypeInfo};
use crate::value::Pc;

/// A handle into the contract arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContractId(usize);

/// An activation descriptor for a function or type.
#[derive(Debug)]
pub struct Contract {
    library: usize,
    name: String,
    sizes: Vec<TypeInfo>,
    offsets: Vec<Offset>,
    contracts: Vec<ContractId>,
    type_contract: Option<ContractId>,
    initialized: bool,
    init: Pc,
    location: Pc,
    native: Option<NativeId>,
    arg_offset: Offset,
    local_offset: Offset,
    local_alignment: Alignment,
}

impl Contract {
    fn empty(library: usize, name: String) -> Self {
        Self {
            library,
            name,
            sizes: Vec::new(),
            offsets: Vec::new(),
            contracts: Vec::new(),
            type_contract: None,
            initialized: false,
            init: 0,
            location: 0,
            native: None,
            arg_offset: Offset::ZERO,
            local_offset: Offset::ZERO,
            local_alignment: 1,
        }
    }

    pub(crate) fn for_function(library: usize, function: &Function) -> Self {
        Self {
            init: function.init(),
            location: function.location(),
            native: function.native_id(),
            ..Self::empty(library, function.name().into())
        }
    }

    pub(crate) fn for_type(library: usize, ty: &Type) -> Self {
        Self {
            init: ty.location(),
            ..Self::empty(library, ty.name().into())
        }
    }

    /// Returns the owning library index.
    #[must_use]
    pub fn library(&self) -> usize {
        self.library
    }

    /// Returns the activation's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the native implementation, if any.
    #[must_use]
    pub fn native_id(&self) -> Option<NativeId> {
        self.native
    }

    /// Returns the total aligned size of the arguments.
    #[must_use]
    pub fn arg_offset(&self) -> Offset {
        self.arg_offset
    }

    /// Returns the total size of the locals.
    #[must_use]
    pub fn local_offset(&self) -> Offset {
        self.local_offset
    }

    /// Returns the strictest alignment among the locals.
    #[must_use]
    pub fn local_alignment(&self) -> Alignment {
        self.local_alignment
    }

    /// Stages a size on the tail of `sizes`.
    pub fn add_size(&mut self, info: TypeInfo) {
        self.sizes.push(info);
    }

    /// Pops the most recently staged size.
    pub fn pop_size(&mut self) -> Result<TypeInfo, RuntimeError> {
        self.sizes.pop().ok_or(RuntimeError::IndexOutOfRange {
            table: "size",
            index: 0,
            len: 0,
        })
    }

    /// Returns the size at `index`.
    pub fn size(&self, index: usize) -> Result<TypeInfo, RuntimeError> {
        self.sizes
            .get(index)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "size",
                index,
                len: self.sizes.len(),
            })
    }

    /// Returns the number of populated sizes.
    #[must_use]
    pub fn size_count(&self) -> usize {
        self.sizes.len()
    }

    /// Returns the recorded offset at `index`.
    pub fn offset(&self, index: usize) -> Result<Offset, RuntimeError> {
        self.offsets
            .get(index)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "offset",
                index,
                len: self.offsets.len(),
            })
    }

    /// Returns the number of recorded offsets.
    #[must_use]
    pub fn offset_count(&self) -> usize {
        self.offsets.len()
    }

    /// Returns the sub-contract at `index`.
    pub fn sub_contract(&self, index: usize) -> Result<ContractId, RuntimeError> {
        self.contracts
            .get(index)
            .copied()
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "contract",
                index,
                len: self.contracts.len(),
            })
    }

    /// Records the next argument's offset and advances past its aligned size.
    pub fn add_arg_offset(&mut self, info: TypeInfo) {
        self.offsets.push(self.arg_offset);
        self.arg_offset += info.aligned_size();
    }

    /// Records the next local's offset, aligning it first.
    pub fn add_local_offset(&mut self, info: TypeInfo) {
        let offset = self.local_offset.align(info.alignment());
        self.offsets.push(offset);
        self.local_offset = offset + info.size();
        self.local_alignment = self.local_alignment.max(info.alignment());
    }

    /// Transitions to initialized on first call.
    ///
    /// Returns `(true, init_pc)` on the first call and `(false, body_pc)`
    /// afterwards. Once initialized, the recorded offsets and frame layout
    /// are frozen.
    pub fn initialize(&mut self) -> (bool, Pc) {
        if self.initialized {
            (false, self.location)
        } else {
            self.initialized = true;
            (true, self.init)
        }
    }

    /// Discards the transient type contract once header execution is done.
    pub fn sign(&mut self) {
        self.type_contract = None;
    }

    fn pop_tail<T>(items: &mut Vec<T>, count: usize, table: &'static str) -> Result<Vec<T>, RuntimeError> {
        let len = items.len();
        if count > len {
            return Err(RuntimeError::IndexOutOfRange {
                table,
                index: count,
                len,
            });
        }
        Ok(items.split_off(len - count))
    }
}

/// Owns every contract created during a run.
#[derive(Debug, Default)]
pub struct ContractArena {
    items: Vec<Contract>,
}

impl ContractArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a contract and returns its handle.
    pub fn insert(&mut self, contract: Contract) -> ContractId {
        let id = ContractId(self.items.len());
        self.items.push(contract);
        id
    }

    /// Returns the contract behind `id`.
    #[must_use]
    pub fn get(&self, id: ContractId) -> &Contract {
        &self.items[id.0]
    }

    /// Returns the contract behind `id`, mutably.
    #[must_use]
    pub fn get_mut(&mut self, id: ContractId) -> &mut Contract {
        &mut self.items[id.0]
    }

    /// Builds a sub-contract of `parent` for `function`.
    ///
    /// Pops `function.generics()` staged sizes and `function.contracts()`
    /// staged sub-contracts off the parent's tails into the child, then
    /// appends the child to the parent's sub-contract list.
    pub fn add_contract(
        &mut self,
        parent: ContractId,
        library: usize,
        function: &Function,
    ) -> Result<ContractId, RuntimeError> {
        let mut child = Contract::for_function(library, function);
        {
            let parent = self.get_mut(parent);
            child.sizes = Contract::pop_tail(
                &mut parent.sizes,
                function.generics() as usize,
                "size",
            )?;
            child.contracts = Contract::pop_tail(
                &mut parent.contracts,
                function.contracts() as usize,
                "contract",
            )?;
        }
        let id = self.insert(child);
        self.get_mut(parent).contracts.push(id);
        Ok(id)
    }

    /// Builds the transient type contract of `parent` for `ty`.
    ///
    /// Pops `ty.generics()` staged sizes into the child. The child replaces
    /// any previous type contract and lives until [`Contract::sign`].
    pub fn call_type(
        &mut self,
        parent: ContractId,
        library: usize,
        ty: &Type,
    ) -> Result<ContractId, RuntimeError> {
        let mut child = Contract::for_type(library, ty);
        child.sizes = Contract::pop_tail(
            &mut self.get_mut(parent).sizes,
            ty.generics() as usize,
            "size",
        )?;
        let id = self.insert(child);
        self.get_mut(parent).type_contract = Some(id);
        Ok(id)
    }

    /// Copies a member offset out of the active type contract into `parent`.
    pub fn add_member_offset(
        &mut self,
        parent: ContractId,
        member_index: usize,
    ) -> Result<(), RuntimeError> {
        let type_contract = self
            .get(parent)
            .type_contract
            .ok_or(RuntimeError::NoContractActive)?;
        let offset = self.get(type_contract).offset(member_index)?;
        self.get_mut(parent).offsets.push(offset);
        Ok(())
    }
}
