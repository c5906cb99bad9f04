// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The single error channel for `load` and `run`.
//!
//! Every failure is fatal to the current entry-point call; nothing is
//! recovered internally. The host turns a [`RuntimeError`] into a message
//! plus a backtrace (see [`Runtime::backtrace`]).
//!
//! [`Runtime::backtrace`]: crate::runtime::Runtime::backtrace

use alloc::string::String;
use core::fmt;

use crate::allocator::Access;
use crate::offset::Offset;

/// A runtime failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    /// A varint ran past the instruction buffer or overflowed its target.
    MalformedVarint,
    /// An embedded constant extended past the instruction buffer.
    TruncatedConstant,
    /// A name embedded in the instruction stream was not valid UTF-8.
    InvalidUtf8,
    /// An unrecognized opcode byte was dispatched.
    UnknownOpcode {
        /// The raw opcode byte.
        opcode: u8,
    },
    /// A jump target fell outside the instruction buffer.
    InvalidJump {
        /// The requested target, signed so backward overshoot is visible.
        target: i64,
        /// The buffer length.
        len: usize,
    },
    /// A library was named that has not been loaded.
    UnknownLibrary {
        /// The requested library id.
        id: String,
    },
    /// A function was named that the target library does not declare.
    UnknownFunction {
        /// The requested function name.
        name: String,
    },
    /// A type was named that the target library does not declare.
    UnknownType {
        /// The requested type name.
        name: String,
    },
    /// An index read from bytecode exceeded the populated length of a table.
    IndexOutOfRange {
        /// Which table was indexed.
        table: &'static str,
        /// The requested index.
        index: usize,
        /// The populated length.
        len: usize,
    },
    /// A pointer named a block index that does not exist.
    InvalidBlock {
        /// The raw block index.
        block: u32,
    },
    /// A typed access extended past the end of its block.
    AccessOutOfRange {
        /// Start offset of the access.
        offset: Offset,
        /// Size of the access.
        size: Offset,
        /// Recorded size of the block.
        block_size: Offset,
    },
    /// A block access lacked a required capability.
    InvalidAccess {
        /// The missing capability.
        required: Access,
    },
    /// `realloc`/`dealloc` was given an interior pointer.
    InteriorPointer,
    /// The operand stack exceeded its capacity.
    StackOverflow,
    /// The operand stack was popped below empty.
    StackUnderflow,
    /// A stack access fell outside the pushed region.
    StackAccessOutOfRange,
    /// A return was executed with no frame to return to.
    CallStackUnderflow,
    /// A declaration or reference ran before any library was active.
    NoLibraryActive,
    /// A contract operation ran before any contract was active.
    NoContractActive,
    /// A cross-library reference ran before `RefLib` selected a source.
    NoReferencingLibrary,
    /// A member declaration ran before any type declaration.
    NoReferencingType,
    /// The host allocator refused a request.
    AllocationFailure,
    /// The `Error` opcode was reached.
    ExplicitError,
    /// A native function failed.
    Native {
        /// Host-provided description.
        message: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedVarint => write!(f, "malformed varint"),
            Self::TruncatedConstant => write!(f, "truncated constant"),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 in name"),
            Self::UnknownOpcode { opcode } => write!(f, "invalid opcode {opcode}"),
            Self::InvalidJump { target, len } => {
                write!(f, "jump target {target} out of range {len}")
            }
            Self::UnknownLibrary { id } => write!(f, "unknown library '{id}'"),
            Self::UnknownFunction { name } => write!(f, "unknown function '{name}'"),
            Self::UnknownType { name } => write!(f, "unknown type '{name}'"),
            Self::IndexOutOfRange { table, index, len } => {
                write!(f, "{table} index {index} out of range {len}")
            }
            Self::InvalidBlock { block } => write!(f, "invalid ptr block {block}"),
            Self::AccessOutOfRange {
                offset,
                size,
                block_size,
            } => write!(
                f,
                "access out of range: {offset} + {size} exceeds block size {block_size}"
            ),
            Self::InvalidAccess { required } => {
                write!(f, "invalid permissions: {required} required")
            }
            Self::InteriorPointer => write!(f, "interior pointer released"),
            Self::StackOverflow => write!(f, "stack overflow"),
            Self::StackUnderflow => write!(f, "negative stack size"),
            Self::StackAccessOutOfRange => write!(f, "invalid stack access"),
            Self::CallStackUnderflow => write!(f, "call stack underflow"),
            Self::NoLibraryActive => write!(f, "no library active"),
            Self::NoContractActive => write!(f, "no contract active"),
            Self::NoReferencingLibrary => write!(f, "no referencing library"),
            Self::NoReferencingType => write!(f, "no referencing type"),
            Self::AllocationFailure => write!(f, "allocation failure"),
            Self::ExplicitError => write!(f, "error instruction reached"),
            Self::Native { message } => write!(f, "{message}"),
        }
    }
}

impl core::error::Error for RuntimeError {}
