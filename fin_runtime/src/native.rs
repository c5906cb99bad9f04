// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The native-function ABI.
//!
//! Hosts register Rust closures under function names; the interpreter calls
//! them with a [`NativeCtx`] lending out the operand stack, the allocator,
//! and the activation's contract. A native consumes its arguments from the
//! stack in reverse push order and pushes its return value itself.
//!
//! Generic parameters reach a native through [`NativeCtx::size`]. Sizes are
//! addressed from the right of the signature: for `alloc(Int)&[0]` with one
//! generic the single size is `size(0)`; with two generics the rightmost one
//! is `size(0)` and the leftmost `size(1)`. Natives never see the offsets
//! table, which is only computed for bytecode functions.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::allocator::Allocator;
use crate::contract::{ContractArena, ContractId};
use crate::error::RuntimeError;
use crate::library::Library;
use crate::offset::TypeInfo;
use crate::runtime::{Frame, format_backtrace};
use crate::stack::Stack;
use crate::value::Primitive;

/// A handle into the native registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NativeId(pub(crate) usize);

/// A host-supplied implementation of a function.
pub type NativeFunction = Box<dyn FnMut(&mut NativeCtx<'_>) -> Result<(), RuntimeError>>;

/// Owns every registered native.
#[derive(Default)]
pub struct NativeRegistry {
    items: Vec<NativeFunction>,
}

impl NativeRegistry {
    pub(crate) fn insert(&mut self, function: NativeFunction) -> NativeId {
        let id = NativeId(self.items.len());
        self.items.push(function);
        id
    }

    pub(crate) fn get_mut(&mut self, id: NativeId) -> Result<&mut NativeFunction, RuntimeError> {
        let len = self.items.len();
        self.items
            .get_mut(id.0)
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "native",
                index: id.0,
                len,
            })
    }
}

/// The capability surface lent to a native for the duration of its call.
pub struct NativeCtx<'rt> {
    alloc: &'rt mut Allocator,
    eval: &'rt mut Stack,
    contracts: &'rt ContractArena,
    contract: ContractId,
    frames: &'rt [Frame],
    frame: &'rt Frame,
    libraries: &'rt [Library],
}

impl<'rt> NativeCtx<'rt> {
    pub(crate) fn new(
        alloc: &'rt mut Allocator,
        eval: &'rt mut Stack,
        contracts: &'rt ContractArena,
        contract: ContractId,
        frames: &'rt [Frame],
        frame: &'rt Frame,
        libraries: &'rt [Library],
    ) -> Self {
        Self {
            alloc,
            eval,
            contracts,
            contract,
            frames,
            frame,
            libraries,
        }
    }

    /// Pops an argument off the operand stack.
    ///
    /// Arguments come off in reverse push order: the last argument pushed by
    /// the caller is popped first.
    pub fn pop<T: Primitive>(&mut self) -> Result<T, RuntimeError> {
        self.eval.pop(self.alloc)
    }

    /// Pushes the return value.
    pub fn push<T: Primitive>(&mut self, value: T) -> Result<(), RuntimeError> {
        self.eval.push(self.alloc, value)
    }

    /// Returns the generic size at `index`, addressed from the right of the
    /// signature.
    pub fn size(&self, index: usize) -> Result<TypeInfo, RuntimeError> {
        self.contracts.get(self.contract).size(index)
    }

    /// Returns the sub-contract at `index`, addressed like sizes.
    pub fn sub_contract(&self, index: usize) -> Result<ContractId, RuntimeError> {
        self.contracts.get(self.contract).sub_contract(index)
    }

    /// Returns the allocator for heap requests.
    pub fn allocator(&mut self) -> &mut Allocator {
        self.alloc
    }

    /// Renders the current backtrace, including this native's frame.
    #[must_use]
    pub fn backtrace(&self) -> String {
        format_backtrace(self.frames, self.frame, self.contracts, self.libraries)
    }

    /// Fails the call with a host-defined message.
    pub fn fail<T>(&self, message: impl Into<String>) -> Result<T, RuntimeError> {
        Err(RuntimeError::Native {
            message: message.into(),
        })
    }
}
