// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host runner for Fin bytecode programs.
//!
//! Loads a bytecode file, registers the `rt` native library, and runs
//! `main()`. On a runtime failure it prints the error, the backtrace, and
//! the allocator summary, then exits non-zero.

use std::io::{Read, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use fin_runtime::allocator::Access;
use fin_runtime::library::LibraryId;
use fin_runtime::runtime::{Runtime, RuntimeConfig};
use fin_runtime::value::{Bool, Float, Int, Ptr};

/// Registers the standard `rt` natives, mirroring what Fin programs expect
/// from the host.
fn register_rt(rt: &mut Runtime) -> Result<()> {
    let lib = rt.create_library(LibraryId::new("rt"));

    rt.register_native(
        lib,
        "print(Int)Void",
        0,
        0,
        Box::new(|ctx| {
            let value = ctx.pop::<Int>()?;
            println!("{value}");
            Ok(())
        }),
    )?;

    rt.register_native(
        lib,
        "print(Float)Void",
        0,
        0,
        Box::new(|ctx| {
            let value = ctx.pop::<Float>()?;
            println!("{value}");
            Ok(())
        }),
    )?;

    rt.register_native(
        lib,
        "print(Bool)Void",
        0,
        0,
        Box::new(|ctx| {
            let value = ctx.pop::<Bool>()?;
            println!("{value}");
            Ok(())
        }),
    )?;

    rt.register_native(
        lib,
        "write(Int)Void",
        0,
        0,
        Box::new(|ctx| {
            let value = ctx.pop::<Int>()?;
            if let Err(e) = std::io::stdout().write_all(&[value as u8]) {
                return ctx.fail(e.to_string());
            }
            Ok(())
        }),
    )?;

    rt.register_native(
        lib,
        "read()Int",
        0,
        0,
        Box::new(|ctx| {
            let mut byte = [0u8];
            let value = match std::io::stdin().read(&mut byte) {
                Ok(0) => -1,
                Ok(_) => Int::from(byte[0]),
                Err(e) => return ctx.fail(e.to_string()),
            };
            ctx.push(value)
        }),
    )?;

    rt.register_native(
        lib,
        "alloc(Int)&[0]",
        1,
        0,
        Box::new(|ctx| {
            let length = ctx.pop::<Int>()?;
            let element = ctx.size(0)?;
            let size = element.aligned_size() * (length as u32);
            let ptr = ctx
                .allocator()
                .alloc(size, Access::READ | Access::WRITE | Access::FREE)?;
            ctx.push(ptr)
        }),
    )?;

    rt.register_native(
        lib,
        "realloc(&[0],Int)&[0]",
        1,
        0,
        Box::new(|ctx| {
            let length = ctx.pop::<Int>()?;
            let ptr = ctx.pop::<Ptr>()?;
            let element = ctx.size(0)?;
            let size = element.aligned_size() * (length as u32);
            let moved = ctx.allocator().realloc(ptr, size)?;
            ctx.push(moved)
        }),
    )?;

    rt.register_native(
        lib,
        "dealloc(&0)Void",
        1,
        0,
        Box::new(|ctx| {
            let ptr = ctx.pop::<Ptr>()?;
            ctx.allocator().dealloc(ptr)
        }),
    )?;

    rt.register_native(
        lib,
        "assert(Bool)Void",
        0,
        0,
        Box::new(|ctx| {
            if ctx.pop::<Bool>()? {
                Ok(())
            } else {
                ctx.fail("assertion failed")
            }
        }),
    )?;

    rt.register_native(
        lib,
        "backtrace()Void",
        0,
        0,
        Box::new(|ctx| {
            print!("{}", ctx.backtrace());
            Ok(())
        }),
    )?;

    Ok(())
}

fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("no input file");
    };

    let bytes = std::fs::read(&path).with_context(|| format!("cannot open '{path}'"))?;

    let mut rt = Runtime::new(RuntimeConfig::default())
        .context("failed to initialize the runtime")?;
    register_rt(&mut rt)?;

    if let Err(error) = rt.load(&bytes).and_then(|()| rt.run()) {
        eprintln!("Error: {error}");
        eprint!("{}", rt.backtrace());
        eprint!("{}", rt.summary());
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
