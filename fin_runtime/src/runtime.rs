// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The runtime: instruction decoding, dispatch, and the call protocol.
//!
//! [`Runtime::load`] appends a byte stream to the instruction buffer and
//! executes top-level instructions, which populate the current library.
//! [`Runtime::run`] resolves `main()`, builds the root contract, and drives
//! the dispatch loop until a terminator.
//!
//! A function activation has two phases. The caller stages sizes and
//! sub-contracts on its own contract and binds them with `Contract`, then
//! pushes arguments and issues `Call`. On the callee side the first call
//! jumps to the init block, which records the frame layout into the contract
//! and finalizes it with `Sign`; later calls jump straight to the body with
//! the frozen layout.
//!
//! Arithmetic notes: integer add/sub/mult/neg wrap; division and modulo by
//! zero follow the host's default behavior (a panic) rather than trapping;
//! float comparisons follow IEEE semantics including `NaN`.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write as _;

use crate::allocator::{Allocator, Summary};
use crate::contract::{Contract, ContractArena, ContractId};
use crate::error::RuntimeError;
use crate::format;
use crate::library::{Function, FunctionId, Library, LibraryId, Type, TypeId};
use crate::native::{NativeCtx, NativeFunction, NativeRegistry};
use crate::offset::{Offset, TypeInfo};
use crate::opcode::Opcode;
use crate::stack::Stack;
use crate::trace::{TraceEvent, TraceMask, TraceSink, Tracer};
use crate::value::{Bool, Float, Index, Int, Pc, Primitive, Ptr, native};

/// Construction-time options for a [`Runtime`].
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Operand stack capacity in bytes.
    pub stack_capacity: Offset,
    /// Enables the pedantic allocator: no block-index recycling, interior
    /// pointers rejected on `realloc`/`dealloc`.
    pub pedantic: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_capacity: Offset(4096),
            pedantic: cfg!(debug_assertions),
        }
    }
}

/// A dynamic activation record.
#[derive(Clone, Debug, Default)]
pub(crate) struct Frame {
    pub(crate) library: Option<usize>,
    pub(crate) contract: Option<ContractId>,
    pub(crate) pc: Pc,
    pub(crate) local: Offset,
    pub(crate) param: Offset,
}

/// Renders one `  in <name>` line per frame, bottom-to-top, plus the live
/// frame.
pub(crate) fn format_backtrace(
    frames: &[Frame],
    current: &Frame,
    contracts: &ContractArena,
    libraries: &[Library],
) -> String {
    let mut out = String::from("Backtrace:\n");
    for frame in frames.iter().chain(core::iter::once(current)) {
        out.push_str("  in ");
        if let Some(id) = frame.contract {
            out.push_str(contracts.get(id).name());
        } else if let Some(library) = frame.library.and_then(|i| libraries.get(i)) {
            let _ = write!(out, "<{}>", library.id());
        } else {
            out.push_str("<<anonymous>>");
        }
        out.push('\n');
    }
    out
}

/// The virtual machine.
pub struct Runtime {
    alloc: Allocator,
    eval: Stack,
    frame: Frame,
    frames: Vec<Frame>,
    libraries: Vec<Library>,
    library_index: BTreeMap<String, usize>,
    instrs: Vec<u8>,
    contracts: ContractArena,
    natives: NativeRegistry,
}

impl Runtime {
    /// Creates a runtime with `config`.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let mut alloc = Allocator::new(config.pedantic);
        let eval = Stack::create(&mut alloc, config.stack_capacity)?;
        Ok(Self {
            alloc,
            eval,
            frame: Frame::default(),
            frames: Vec::new(),
            libraries: Vec::new(),
            library_index: BTreeMap::new(),
            instrs: alloc::vec![Opcode::Term.byte()],
            contracts: ContractArena::new(),
            natives: NativeRegistry::default(),
        })
    }

    /// Returns the allocator, for diagnostics.
    #[must_use]
    pub fn allocator(&self) -> &Allocator {
        &self.alloc
    }

    /// Returns the allocator summary.
    #[must_use]
    pub fn summary(&self) -> Summary {
        self.alloc.summary()
    }

    /// Returns the number of bytes on the operand stack.
    #[must_use]
    pub fn stack_size(&self) -> Offset {
        self.eval.size()
    }

    /// Pops a primitive off the operand stack, e.g. to read `main()`'s
    /// result.
    pub fn pop_value<T: Primitive>(&mut self) -> Result<T, RuntimeError> {
        self.eval.pop(&mut self.alloc)
    }

    /// Pushes a primitive onto the operand stack.
    pub fn push_value<T: Primitive>(&mut self, value: T) -> Result<(), RuntimeError> {
        self.eval.push(&mut self.alloc, value)
    }

    /// Creates a library, or returns the existing index when `id` is already
    /// present.
    pub fn create_library(&mut self, id: LibraryId) -> usize {
        if let Some(&index) = self.library_index.get(id.name()) {
            return index;
        }
        let index = self.libraries.len();
        self.library_index.insert(id.name().into(), index);
        self.libraries.push(Library::new(id));
        index
    }

    /// Resolves a previously created library by name.
    pub fn get_library(&self, name: &str) -> Result<usize, RuntimeError> {
        self.library_index
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::UnknownLibrary { id: name.into() })
    }

    /// Returns the library at `index`.
    pub fn library(&self, index: usize) -> Result<&Library, RuntimeError> {
        self.libraries
            .get(index)
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "library",
                index,
                len: self.libraries.len(),
            })
    }

    /// Binds `function` as a native under `name` in the library at `library`.
    ///
    /// `generics` and `contracts` declare how many staged sizes and
    /// sub-contracts a caller must supply, exactly as for bytecode functions.
    pub fn register_native(
        &mut self,
        library: usize,
        name: &str,
        generics: Index,
        contracts: Index,
        function: NativeFunction,
    ) -> Result<FunctionId, RuntimeError> {
        let native_id = self.natives.insert(function);
        let len = self.libraries.len();
        let lib = self
            .libraries
            .get_mut(library)
            .ok_or(RuntimeError::IndexOutOfRange {
                table: "library",
                index: library,
                len,
            })?;
        Ok(lib.add_function(
            library,
            Function::native(name.into(), generics, contracts, native_id),
        ))
    }

    /// Appends `src` to the instruction buffer and executes its top-level
    /// instructions.
    pub fn load(&mut self, src: &[u8]) -> Result<(), RuntimeError> {
        self.load_traced(src, TraceMask::NONE, None)
    }

    /// [`Runtime::load`] with tracing.
    pub fn load_traced(
        &mut self,
        src: &[u8],
        mask: TraceMask,
        sink: Option<&mut dyn TraceSink>,
    ) -> Result<(), RuntimeError> {
        let mut tracer = Tracer::new(mask, sink);

        let size = self.eval.size();
        self.frame = Frame {
            library: None,
            contract: None,
            pc: self.instrs.len(),
            local: size,
            param: size,
        };
        let start = self.frame.pc;
        tracer.emit(TraceMask::RUN, || TraceEvent::LoadStart { pc: start });

        self.instrs.extend_from_slice(src);
        self.instrs.push(Opcode::Term.byte());

        let result = self.execute(&mut tracer);
        tracer.emit(TraceMask::RUN, || TraceEvent::LoadEnd);
        result
    }

    /// Resolves `main()` in the current library and executes it.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        self.run_traced(TraceMask::NONE, None)
    }

    /// [`Runtime::run`] with tracing.
    pub fn run_traced(
        &mut self,
        mask: TraceMask,
        sink: Option<&mut dyn TraceSink>,
    ) -> Result<(), RuntimeError> {
        let mut tracer = Tracer::new(mask, sink);
        tracer.emit(TraceMask::RUN, || TraceEvent::RunStart);
        let result = self.run_body(&mut tracer);
        tracer.emit(TraceMask::RUN, || TraceEvent::RunEnd {
            error: result.as_ref().err(),
        });
        result
    }

    fn run_body(&mut self, tracer: &mut Tracer<'_>) -> Result<(), RuntimeError> {
        let library = self.check_library()?;
        let id = self.libraries[library].function_id(library, "main()")?;
        let main_contract = {
            let function = self.libraries[id.library].function(id.function)?;
            self.contracts
                .insert(Contract::for_function(id.library, function))
        };
        self.frame.pc = 0;
        self.call(main_contract, tracer)?;
        self.execute(tracer)
    }

    /// Renders the current backtrace.
    #[must_use]
    pub fn backtrace(&self) -> String {
        format_backtrace(&self.frames, &self.frame, &self.contracts, &self.libraries)
    }

    fn jump(&mut self, target: Pc) -> Result<(), RuntimeError> {
        if target > self.instrs.len() {
            return Err(RuntimeError::InvalidJump {
                target: target as i64,
                len: self.instrs.len(),
            });
        }
        self.frame.pc = target;
        Ok(())
    }

    fn read_str(&mut self) -> Result<String, RuntimeError> {
        format::read_str(&self.instrs, &mut self.frame.pc)
    }

    fn read_index(&mut self) -> Result<Index, RuntimeError> {
        format::read_varint_u16(&self.instrs, &mut self.frame.pc)
    }

    fn read_target(&mut self) -> Result<Pc, RuntimeError> {
        let displacement = format::read_varint_i32(&self.instrs, &mut self.frame.pc)?;
        let target = self.frame.pc as i64 + i64::from(displacement);
        usize::try_from(target).map_err(|_| RuntimeError::InvalidJump {
            target,
            len: self.instrs.len(),
        })
    }

    fn read_function(&mut self) -> Result<FunctionId, RuntimeError> {
        let index = format::read_varint_u32(&self.instrs, &mut self.frame.pc)?;
        let library = self.check_library()?;
        self.libraries[library].ref_function(index as usize)
    }

    fn read_type(&mut self) -> Result<TypeId, RuntimeError> {
        let index = format::read_varint_u32(&self.instrs, &mut self.frame.pc)?;
        let library = self.check_library()?;
        self.libraries[library].ref_type(index as usize)
    }

    fn read_contract(&mut self) -> Result<ContractId, RuntimeError> {
        let index = self.read_index()?;
        let contract = self.check_contract()?;
        self.contracts.get(contract).sub_contract(index as usize)
    }

    fn read_size(&mut self) -> Result<TypeInfo, RuntimeError> {
        let index = self.read_index()?;
        let contract = self.check_contract()?;
        self.contracts.get(contract).size(index as usize)
    }

    fn read_offset(&mut self) -> Result<Offset, RuntimeError> {
        let index = self.read_index()?;
        let contract = self.check_contract()?;
        self.contracts.get(contract).offset(index as usize)
    }

    fn check_library(&self) -> Result<usize, RuntimeError> {
        self.frame.library.ok_or(RuntimeError::NoLibraryActive)
    }

    fn check_contract(&self) -> Result<ContractId, RuntimeError> {
        self.frame.contract.ok_or(RuntimeError::NoContractActive)
    }

    fn ret(&mut self, tracer: &mut Tracer<'_>) -> Result<(), RuntimeError> {
        tracer.emit(TraceMask::CALL, || TraceEvent::CallExit {
            depth: self.frames.len(),
        });
        self.eval.resize(&mut self.alloc, self.frame.param)?;
        self.frame = self
            .frames
            .pop()
            .ok_or(RuntimeError::CallStackUnderflow)?;
        Ok(())
    }

    fn call(&mut self, id: ContractId, tracer: &mut Tracer<'_>) -> Result<(), RuntimeError> {
        self.frames.push(self.frame.clone());

        let size = self.eval.size();
        self.frame.contract = Some(id);
        self.frame.local = size;
        self.frame.param = size;
        self.frame.library = Some(self.contracts.get(id).library());

        let native_id = self.contracts.get(id).native_id();
        tracer.emit(TraceMask::CALL, || TraceEvent::CallEnter {
            depth: self.frames.len(),
            name: self.contracts.get(id).name(),
            native: native_id.is_some(),
        });

        if let Some(native_id) = native_id {
            // A frame is pushed and popped even for natives so a failing
            // native still shows up in the backtrace.
            {
                let Runtime {
                    alloc,
                    eval,
                    frames,
                    frame,
                    libraries,
                    contracts,
                    natives,
                    ..
                } = self;
                let function = natives.get_mut(native_id)?;
                let mut ctx = NativeCtx::new(alloc, eval, contracts, id, frames, frame, libraries);
                function(&mut ctx)?;
            }
            tracer.emit(TraceMask::CALL, || TraceEvent::CallExit {
                depth: self.frames.len(),
            });
            self.frame = self
                .frames
                .pop()
                .ok_or(RuntimeError::CallStackUnderflow)?;
            Ok(())
        } else {
            let (first, target) = self.contracts.get_mut(id).initialize();
            if !first {
                self.finalize_call()?;
            }
            self.jump(target)
        }
    }

    /// `Sign` semantics: make arguments addressable below `local` and
    /// reserve zeroed locals above it.
    fn finalize_call(&mut self) -> Result<(), RuntimeError> {
        let id = self.check_contract()?;
        let (arg_offset, local_offset) = {
            let contract = self.contracts.get(id);
            (contract.arg_offset(), contract.local_offset())
        };
        self.frame.param = self.frame.local - arg_offset;
        self.eval.grow_zeroed(&mut self.alloc, local_offset)
    }

    fn binary_int(&mut self, f: impl FnOnce(Int, Int) -> Int) -> Result<(), RuntimeError> {
        let rhs = self.eval.pop::<Int>(&mut self.alloc)?;
        let lhs = self.eval.pop::<Int>(&mut self.alloc)?;
        self.eval.push(&mut self.alloc, f(lhs, rhs))
    }

    fn compare_int(&mut self, f: impl FnOnce(Int, Int) -> Bool) -> Result<(), RuntimeError> {
        let rhs = self.eval.pop::<Int>(&mut self.alloc)?;
        let lhs = self.eval.pop::<Int>(&mut self.alloc)?;
        self.eval.push(&mut self.alloc, f(lhs, rhs))
    }

    fn binary_float(&mut self, f: impl FnOnce(Float, Float) -> Float) -> Result<(), RuntimeError> {
        let rhs = self.eval.pop::<Float>(&mut self.alloc)?;
        let lhs = self.eval.pop::<Float>(&mut self.alloc)?;
        self.eval.push(&mut self.alloc, f(lhs, rhs))
    }

    fn compare_float(&mut self, f: impl FnOnce(Float, Float) -> Bool) -> Result<(), RuntimeError> {
        let rhs = self.eval.pop::<Float>(&mut self.alloc)?;
        let lhs = self.eval.pop::<Float>(&mut self.alloc)?;
        self.eval.push(&mut self.alloc, f(lhs, rhs))
    }

    fn execute(&mut self, tracer: &mut Tracer<'_>) -> Result<(), RuntimeError> {
        // Loader state: the source library selected by `RefLib` and the type
        // most recently declared by `Type`.
        let mut ref_library: Option<usize> = None;
        let mut ref_type: Option<TypeId> = None;

        loop {
            let pc = self.frame.pc;
            let Some(&byte) = self.instrs.get(pc) else {
                // End of buffer is as final as a terminator.
                return Ok(());
            };
            self.frame.pc += 1;
            let op = Opcode::from_byte(byte).ok_or(RuntimeError::UnknownOpcode { opcode: byte })?;

            tracer.emit(TraceMask::INSTR, || TraceEvent::Instr { pc, opcode: op });

            match op {
                Opcode::Error => return Err(RuntimeError::ExplicitError),

                Opcode::Cookie => loop {
                    let Some(&byte) = self.instrs.get(self.frame.pc) else {
                        return Err(RuntimeError::TruncatedConstant);
                    };
                    self.frame.pc += 1;
                    if byte == b'\n' {
                        break;
                    }
                },

                Opcode::Term => return Ok(()),

                Opcode::Lib => {
                    let name = self.read_str()?;
                    let index = self.create_library(LibraryId::new(name));
                    self.frame.library = Some(index);
                }

                Opcode::Fn => {
                    let library = self.check_library()?;
                    let name = self.read_str()?;
                    let generics = self.read_index()?;
                    let contracts = self.read_index()?;
                    let location = self.read_target()?;
                    let end = self.read_target()?;

                    let function =
                        Function::new(name, generics, contracts, self.frame.pc, location);
                    self.libraries[library].add_function(library, function);
                    self.jump(end)?;
                }

                Opcode::Type => {
                    let library = self.check_library()?;
                    let name = self.read_str()?;
                    let generics = self.read_index()?;
                    let end = self.read_target()?;

                    let ty = Type::new(name, generics, self.frame.pc);
                    ref_type = Some(self.libraries[library].add_type(library, ty));
                    self.jump(end)?;
                }

                Opcode::Member => {
                    let library = self.check_library()?;
                    let name = self.read_str()?;
                    let ty = ref_type.ok_or(RuntimeError::NoReferencingType)?;

                    let member = self.libraries[ty.library].ty_mut(ty.ty)?.add_member(name);
                    self.libraries[library].add_ref_member(crate::library::MemberId {
                        ty,
                        member,
                    });
                }

                Opcode::RefLib => {
                    let name = self.read_str()?;
                    ref_library = Some(self.get_library(&name)?);
                }

                Opcode::RefFn => {
                    let library = self.check_library()?;
                    let source = ref_library.ok_or(RuntimeError::NoReferencingLibrary)?;
                    let name = self.read_str()?;

                    let id = self.libraries[source].function_id(source, &name)?;
                    self.libraries[library].add_ref_function(id);
                }

                Opcode::RefType => {
                    let library = self.check_library()?;
                    let source = ref_library.ok_or(RuntimeError::NoReferencingLibrary)?;
                    let name = self.read_str()?;

                    let id = self.libraries[source].type_id(source, &name)?;
                    self.libraries[library].add_ref_type(id);
                }

                Opcode::SizeI => {
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_size(native::<Int>());
                }

                Opcode::SizeF => {
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_size(native::<Float>());
                }

                Opcode::SizeB => {
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_size(native::<Bool>());
                }

                Opcode::SizeP => {
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_size(native::<Ptr>());
                }

                Opcode::SizeDup => {
                    let size = self.read_size()?;
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_size(size);
                }

                Opcode::SizeArr => {
                    let length = format::read_varint_i32(&self.instrs, &mut self.frame.pc)?;
                    let contract = self.check_contract()?;
                    let element = self.contracts.get_mut(contract).pop_size()?;
                    let size = TypeInfo::new(
                        element.aligned_size() * (length as u32),
                        element.alignment(),
                    );
                    self.contracts.get_mut(contract).add_size(size);
                }

                Opcode::TypeCall => {
                    let contract = self.check_contract()?;
                    let id = self.read_type()?;
                    let child = {
                        let ty = self.libraries[id.library].ty(id.ty)?;
                        self.contracts.call_type(contract, id.library, ty)?
                    };
                    self.call(child, tracer)?;
                }

                Opcode::TypeRet => {
                    let contract = self.check_contract()?;
                    let (size, alignment) = {
                        let contract = self.contracts.get(contract);
                        (contract.local_offset(), contract.local_alignment())
                    };
                    self.ret(tracer)?;
                    let caller = self.check_contract()?;
                    self.contracts
                        .get_mut(caller)
                        .add_size(TypeInfo::new(size, alignment));
                }

                Opcode::TypeMem => {
                    let library = self.check_library()?;
                    let contract = self.check_contract()?;
                    let index = self.read_index()?;

                    let member = self.libraries[library].ref_member(index as usize)?;
                    self.contracts.add_member_offset(contract, member.member)?;
                }

                Opcode::Param => {
                    let size = self.read_size()?;
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_arg_offset(size);
                }

                Opcode::Local | Opcode::Field => {
                    let size = self.read_size()?;
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).add_local_offset(size);
                }

                Opcode::Contract => {
                    let contract = self.check_contract()?;
                    let id = self.read_function()?;
                    let function = self.libraries[id.library].function(id.function)?;
                    self.contracts.add_contract(contract, id.library, function)?;
                }

                Opcode::Sign => {
                    self.finalize_call()?;
                    let contract = self.check_contract()?;
                    self.contracts.get_mut(contract).sign();
                }

                Opcode::Call => {
                    self.check_library()?;
                    let contract = self.read_contract()?;
                    self.call(contract, tracer)?;
                }

                Opcode::End => self.ret(tracer)?,

                Opcode::Ret => {
                    let size = self.read_size()?;
                    let value = self.eval.top_sized(&self.alloc, size)?.to_vec();
                    self.ret(tracer)?;
                    self.eval
                        .push_sized(&mut self.alloc, size)?
                        .copy_from_slice(&value);
                }

                Opcode::Br => {
                    let target = self.read_target()?;
                    self.jump(target)?;
                }

                Opcode::BrFalse => {
                    let target = self.read_target()?;
                    if !self.eval.pop::<Bool>(&mut self.alloc)? {
                        self.jump(target)?;
                    }
                }

                Opcode::BrTrue => {
                    let target = self.read_target()?;
                    if self.eval.pop::<Bool>(&mut self.alloc)? {
                        self.jump(target)?;
                    }
                }

                Opcode::Push => {
                    let size = self.read_size()?;
                    self.eval.push_sized(&mut self.alloc, size)?;
                }

                Opcode::Pop => {
                    let size = self.read_size()?;
                    self.eval.pop_sized(&mut self.alloc, size)?;
                }

                Opcode::Dup => {
                    let size = self.read_size()?;
                    let value = self.eval.top_sized(&self.alloc, size)?.to_vec();
                    self.eval
                        .push_sized(&mut self.alloc, size)?
                        .copy_from_slice(&value);
                }

                Opcode::Load => {
                    let size = self.read_size()?;
                    let ptr = self.eval.pop::<Ptr>(&mut self.alloc)?;
                    let value = self.alloc.read_sized(ptr, size)?.to_vec();
                    self.eval
                        .push_sized(&mut self.alloc, size)?
                        .copy_from_slice(&value);
                }

                Opcode::Store => {
                    let size = self.read_size()?;
                    let value = self.eval.pop_sized(&mut self.alloc, size)?.to_vec();
                    let ptr = self.eval.pop::<Ptr>(&mut self.alloc)?;
                    self.alloc.write_sized(ptr, size)?.copy_from_slice(&value);
                }

                Opcode::AddrOff => {
                    let size = self.read_size()?;
                    let index = self.eval.pop::<Int>(&mut self.alloc)?;
                    let addr = self.eval.pop::<Ptr>(&mut self.alloc)?;
                    self.eval
                        .push(&mut self.alloc, addr + size.aligned_size() * (index as u32))?;
                }

                Opcode::AddrArg => {
                    let offset = self.read_offset()?;
                    let ptr = self.eval.ptr() + self.frame.param + offset;
                    self.eval.push(&mut self.alloc, ptr)?;
                }

                Opcode::AddrVar => {
                    let offset = self.read_offset()?;
                    let ptr = self.eval.ptr() + self.frame.local + offset;
                    self.eval.push(&mut self.alloc, ptr)?;
                }

                Opcode::AddrMem => {
                    let offset = self.read_offset()?;
                    let ptr = self.eval.top::<Ptr>(&self.alloc)?;
                    self.eval.set_top(&mut self.alloc, ptr + offset)?;
                }

                Opcode::ConstFalse => self.eval.push(&mut self.alloc, false)?,
                Opcode::ConstTrue => self.eval.push(&mut self.alloc, true)?,

                Opcode::Not => {
                    let value = self.eval.pop::<Bool>(&mut self.alloc)?;
                    self.eval.push(&mut self.alloc, !value)?;
                }

                Opcode::ConstI => {
                    let value = format::read_const::<Int>(&self.instrs, &mut self.frame.pc)?;
                    self.eval.push(&mut self.alloc, value)?;
                }

                Opcode::AddI => self.binary_int(Int::wrapping_add)?,
                Opcode::SubI => self.binary_int(Int::wrapping_sub)?,
                Opcode::MultI => self.binary_int(Int::wrapping_mul)?,
                Opcode::DivI => self.binary_int(|a, b| a / b)?,
                Opcode::ModI => self.binary_int(|a, b| a % b)?,

                Opcode::NegI => {
                    let value = self.eval.pop::<Int>(&mut self.alloc)?;
                    self.eval.push(&mut self.alloc, value.wrapping_neg())?;
                }

                Opcode::EqI => self.compare_int(|a, b| a == b)?,
                Opcode::NeI => self.compare_int(|a, b| a != b)?,
                Opcode::LtI => self.compare_int(|a, b| a < b)?,
                Opcode::LeI => self.compare_int(|a, b| a <= b)?,
                Opcode::GtI => self.compare_int(|a, b| a > b)?,
                Opcode::GeI => self.compare_int(|a, b| a >= b)?,

                Opcode::ConstF => {
                    let value = format::read_const::<Float>(&self.instrs, &mut self.frame.pc)?;
                    self.eval.push(&mut self.alloc, value)?;
                }

                Opcode::AddF => self.binary_float(|a, b| a + b)?,
                Opcode::SubF => self.binary_float(|a, b| a - b)?,
                Opcode::MultF => self.binary_float(|a, b| a * b)?,
                Opcode::DivF => self.binary_float(|a, b| a / b)?,
                Opcode::ModF => self.binary_float(|a, b| a % b)?,

                Opcode::NegF => {
                    let value = self.eval.pop::<Float>(&mut self.alloc)?;
                    self.eval.push(&mut self.alloc, -value)?;
                }

                Opcode::EqF => self.compare_float(|a, b| a == b)?,
                Opcode::NeF => self.compare_float(|a, b| a != b)?,
                Opcode::LtF => self.compare_float(|a, b| a < b)?,
                Opcode::LeF => self.compare_float(|a, b| a <= b)?,
                Opcode::GtF => self.compare_float(|a, b| a > b)?,
                Opcode::GeF => self.compare_float(|a, b| a >= b)?,

                Opcode::CastIF => {
                    let value = self.eval.pop::<Int>(&mut self.alloc)?;
                    self.eval.push(&mut self.alloc, value as Float)?;
                }

                Opcode::CastFI => {
                    let value = self.eval.pop::<Float>(&mut self.alloc)?;
                    self.eval.push(&mut self.alloc, value as Int)?;
                }
            }
        }
    }
}
