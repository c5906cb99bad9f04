// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `fin_runtime`: a stack-based bytecode virtual machine for the Fin
//! language.
//!
//! The runtime loads library, type, and function declarations from a binary
//! instruction stream, links cross-library references, and executes the
//! entry function `main()` on an operand stack backed by a block-indexed,
//! permission-checked heap. Generic functions are instantiated lazily
//! through contracts: each call site captures concrete type sizes, and the
//! function's first activation records its frame layout for every later
//! call.
//!
//! ## Example
//!
//! ```
//! use fin_runtime::asm::Asm;
//! use fin_runtime::runtime::{Runtime, RuntimeConfig};
//! use fin_runtime::value::Int;
//!
//! let mut asm = Asm::new();
//! asm.lib("app");
//! let (body, end) = asm.begin_fn("main()", 0, 0);
//! asm.sign();
//! asm.place(body);
//! asm.const_i(40);
//! asm.const_i(2);
//! asm.op(fin_runtime::opcode::Opcode::AddI);
//! asm.size_i();
//! asm.ret(0);
//! asm.place(end);
//!
//! let mut rt = Runtime::new(RuntimeConfig::default())?;
//! rt.load(&asm.finish().unwrap())?;
//! rt.run()?;
//! assert_eq!(rt.pop_value::<Int>()?, 42);
//! # Ok::<(), fin_runtime::error::RuntimeError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod allocator;
pub mod asm;
pub mod contract;
pub mod error;
pub mod format;
pub mod library;
pub mod native;
pub mod offset;
pub mod opcode;
pub mod runtime;
pub mod stack;
pub mod trace;
pub mod value;
