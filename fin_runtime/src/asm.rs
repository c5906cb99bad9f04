// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode builder ("assembler").
//!
//! A small helper for constructing instruction streams without hand-counting
//! byte offsets or varint lengths. Control-flow targets go through labels;
//! label operands are emitted as fixed four-byte varints (leading
//! zero-payload continuation bytes decode transparently), so targets can be
//! patched after placement.
//!
//! Reference operands (`contract`, `type_call`, sizes, offsets) are raw
//! indices; keeping track of what each index resolves to is the caller's
//! job, the same as in hand-written bytecode.

use alloc::vec::Vec;
use core::fmt;

use crate::format::{write_const, write_str, write_varint, write_varint_padded};
use crate::opcode::Opcode;
use crate::value::{Float, Int};

const TARGET_LEN: usize = 4;

/// A control-flow target that can be referenced before it is placed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label(usize);

/// A builder error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A label was referenced but never placed.
    UnresolvedLabel,
    /// A displacement did not fit the fixed target width.
    DisplacementOverflow,
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel => write!(f, "label referenced but never placed"),
            Self::DisplacementOverflow => write!(f, "branch displacement out of range"),
        }
    }
}

impl core::error::Error for AsmError {}

struct Patch {
    at: usize,
    label: Label,
}

/// An instruction-stream builder.
#[derive(Default)]
pub struct Asm {
    bytes: Vec<u8>,
    labels: Vec<Option<usize>>,
    patches: Vec<Patch>,
}

impl Asm {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current byte position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    /// Creates an unplaced label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Places `label` at the current position.
    pub fn place(&mut self, label: Label) {
        self.labels[label.0] = Some(self.bytes.len());
    }

    /// Emits a bare opcode.
    pub fn op(&mut self, op: Opcode) {
        self.bytes.push(op.byte());
    }

    fn index(&mut self, op: Opcode, index: u16) {
        self.op(op);
        write_varint(&mut self.bytes, i64::from(index));
    }

    fn name(&mut self, op: Opcode, name: &str) {
        self.op(op);
        write_str(&mut self.bytes, name);
    }

    fn target(&mut self, label: Label) {
        self.patches.push(Patch {
            at: self.bytes.len(),
            label,
        });
        self.bytes.extend_from_slice(&[0; TARGET_LEN]);
    }

    /// `lib name`: declares a library and makes it current.
    pub fn lib(&mut self, name: &str) {
        self.name(Opcode::Lib, name);
    }

    /// `fn name generics contracts body end`: declares a function.
    ///
    /// Returns `(body, end)`: the init block follows this instruction
    /// directly; place `body` where the body starts and `end` after it.
    pub fn begin_fn(&mut self, name: &str, generics: u16, contracts: u16) -> (Label, Label) {
        let body = self.label();
        let end = self.label();
        self.name(Opcode::Fn, name);
        write_varint(&mut self.bytes, i64::from(generics));
        write_varint(&mut self.bytes, i64::from(contracts));
        self.target(body);
        self.target(end);
        (body, end)
    }

    /// `type name generics end`: declares a type.
    ///
    /// Returns the end label; the layout header follows this instruction
    /// directly and `end` is placed after it.
    pub fn begin_type(&mut self, name: &str, generics: u16) -> Label {
        let end = self.label();
        self.name(Opcode::Type, name);
        write_varint(&mut self.bytes, i64::from(generics));
        self.target(end);
        end
    }

    /// `member name`: declares a member of the most recent type.
    pub fn member(&mut self, name: &str) {
        self.name(Opcode::Member, name);
    }

    /// `ref_lib name`: selects the source library for references.
    pub fn ref_lib(&mut self, name: &str) {
        self.name(Opcode::RefLib, name);
    }

    /// `ref_fn name`: imports a function from the source library.
    pub fn ref_fn(&mut self, name: &str) {
        self.name(Opcode::RefFn, name);
    }

    /// `ref_type name`: imports a type from the source library.
    pub fn ref_type(&mut self, name: &str) {
        self.name(Opcode::RefType, name);
    }

    /// `size_i`: stages the Int size.
    pub fn size_i(&mut self) {
        self.op(Opcode::SizeI);
    }

    /// `size_f`: stages the Float size.
    pub fn size_f(&mut self) {
        self.op(Opcode::SizeF);
    }

    /// `size_b`: stages the Bool size.
    pub fn size_b(&mut self) {
        self.op(Opcode::SizeB);
    }

    /// `size_p`: stages the Ptr size.
    pub fn size_p(&mut self) {
        self.op(Opcode::SizeP);
    }

    /// `size_dup index`: re-stages the size at `index`.
    pub fn size_dup(&mut self, index: u16) {
        self.index(Opcode::SizeDup, index);
    }

    /// `size_arr length`: replaces the staged top with an array size.
    pub fn size_arr(&mut self, length: Int) {
        self.op(Opcode::SizeArr);
        write_varint(&mut self.bytes, i64::from(length));
    }

    /// `param size`: records an argument offset.
    pub fn param(&mut self, size: u16) {
        self.index(Opcode::Param, size);
    }

    /// `local size`: records a local offset.
    pub fn local(&mut self, size: u16) {
        self.index(Opcode::Local, size);
    }

    /// `field size`: records a field offset in a type header.
    pub fn field(&mut self, size: u16) {
        self.index(Opcode::Field, size);
    }

    /// `contract fn_ref`: binds staged sizes/contracts into a sub-contract.
    pub fn contract(&mut self, fn_ref: u32) {
        self.op(Opcode::Contract);
        write_varint(&mut self.bytes, i64::from(fn_ref));
    }

    /// `type_call type_ref`: materializes a type's layout.
    pub fn type_call(&mut self, type_ref: u32) {
        self.op(Opcode::TypeCall);
        write_varint(&mut self.bytes, i64::from(type_ref));
    }

    /// `type_ret`: finishes a type header.
    pub fn type_ret(&mut self) {
        self.op(Opcode::TypeRet);
    }

    /// `type_mem member_ref`: copies a member offset from the type contract.
    pub fn type_mem(&mut self, member_ref: u16) {
        self.index(Opcode::TypeMem, member_ref);
    }

    /// `sign`: finalizes the frame and discards the type contract.
    pub fn sign(&mut self) {
        self.op(Opcode::Sign);
    }

    /// `call index`: invokes a bound sub-contract.
    pub fn call(&mut self, index: u16) {
        self.index(Opcode::Call, index);
    }

    /// `end`: returns without a value.
    pub fn end(&mut self) {
        self.op(Opcode::End);
    }

    /// `ret size`: returns the top-of-stack value of the given size.
    pub fn ret(&mut self, size: u16) {
        self.index(Opcode::Ret, size);
    }

    /// `br label`: unconditional branch.
    pub fn br(&mut self, label: Label) {
        self.op(Opcode::Br);
        self.target(label);
    }

    /// `br_false label`: branch when the popped Bool is false.
    pub fn br_false(&mut self, label: Label) {
        self.op(Opcode::BrFalse);
        self.target(label);
    }

    /// `br_true label`: branch when the popped Bool is true.
    pub fn br_true(&mut self, label: Label) {
        self.op(Opcode::BrTrue);
        self.target(label);
    }

    /// `term`: halts decoding.
    pub fn term(&mut self) {
        self.op(Opcode::Term);
    }

    /// `push size`: reserves a slot.
    pub fn push(&mut self, size: u16) {
        self.index(Opcode::Push, size);
    }

    /// `pop size`: discards a slot.
    pub fn pop(&mut self, size: u16) {
        self.index(Opcode::Pop, size);
    }

    /// `dup size`: duplicates the top slot.
    pub fn dup(&mut self, size: u16) {
        self.index(Opcode::Dup, size);
    }

    /// `load size`: loads through the popped pointer.
    pub fn load(&mut self, size: u16) {
        self.index(Opcode::Load, size);
    }

    /// `store size`: stores through the pointer under the value.
    pub fn store(&mut self, size: u16) {
        self.index(Opcode::Store, size);
    }

    /// `addr_off size`: pointer plus scaled index.
    pub fn addr_off(&mut self, size: u16) {
        self.index(Opcode::AddrOff, size);
    }

    /// `addr_arg offset`: address of an argument slot.
    pub fn addr_arg(&mut self, offset: u16) {
        self.index(Opcode::AddrArg, offset);
    }

    /// `addr_var offset`: address of a local slot.
    pub fn addr_var(&mut self, offset: u16) {
        self.index(Opcode::AddrVar, offset);
    }

    /// `addr_mem offset`: advances the top pointer by a member offset.
    pub fn addr_mem(&mut self, offset: u16) {
        self.index(Opcode::AddrMem, offset);
    }

    /// `const_i value`: pushes an Int literal.
    pub fn const_i(&mut self, value: Int) {
        self.op(Opcode::ConstI);
        write_const(&mut self.bytes, value);
    }

    /// `const_f value`: pushes a Float literal.
    pub fn const_f(&mut self, value: Float) {
        self.op(Opcode::ConstF);
        write_const(&mut self.bytes, value);
    }

    /// `const_true`: pushes true.
    pub fn const_true(&mut self) {
        self.op(Opcode::ConstTrue);
    }

    /// `const_false`: pushes false.
    pub fn const_false(&mut self) {
        self.op(Opcode::ConstFalse);
    }

    /// Resolves all labels and returns the finished byte stream.
    pub fn finish(mut self) -> Result<Vec<u8>, AsmError> {
        for patch in &self.patches {
            let position = self.labels[patch.label.0].ok_or(AsmError::UnresolvedLabel)?;
            let displacement = position as i64 - (patch.at + TARGET_LEN) as i64;

            let mut encoded = Vec::with_capacity(TARGET_LEN);
            write_varint_padded(&mut encoded, displacement, TARGET_LEN);
            if encoded.len() != TARGET_LEN {
                return Err(AsmError::DisplacementOverflow);
            }
            self.bytes[patch.at..patch.at + TARGET_LEN].copy_from_slice(&encoded);
        }
        Ok(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read_varint;

    #[test]
    fn forward_branch_resolves() {
        let mut asm = Asm::new();
        let target = asm.label();
        asm.br(target);
        asm.op(Opcode::Error);
        asm.place(target);
        asm.term();
        let bytes = asm.finish().unwrap();

        assert_eq!(bytes[0], Opcode::Br.byte());
        let mut pc = 1;
        let displacement = read_varint(&bytes, &mut pc).unwrap();
        assert_eq!(pc, 1 + TARGET_LEN);
        // Lands on the term byte, one past the error byte.
        assert_eq!(pc as i64 + displacement, (bytes.len() - 1) as i64);
    }

    #[test]
    fn backward_branch_is_negative() {
        let mut asm = Asm::new();
        let top = asm.label();
        asm.place(top);
        asm.const_true();
        asm.br_true(top);
        let bytes = asm.finish().unwrap();

        let mut pc = 2;
        let displacement = read_varint(&bytes, &mut pc).unwrap();
        assert_eq!(pc as i64 + displacement, 0);
    }

    #[test]
    fn unplaced_label_is_an_error() {
        let mut asm = Asm::new();
        let dangling = asm.label();
        asm.br(dangling);
        assert_eq!(asm.finish(), Err(AsmError::UnresolvedLabel));
    }

    #[test]
    fn fn_declaration_layout() {
        let mut asm = Asm::new();
        asm.lib("app");
        let (body, end) = asm.begin_fn("f()", 2, 1);
        asm.sign();
        asm.place(body);
        asm.end();
        asm.place(end);
        asm.term();
        let bytes = asm.finish().unwrap();

        // lib: opcode + len + name
        assert_eq!(bytes[0], Opcode::Lib.byte());
        assert_eq!(bytes[1], 3);
        assert_eq!(&bytes[2..5], b"app");

        // fn: opcode + name + generics + contracts + two targets
        assert_eq!(bytes[5], Opcode::Fn.byte());
        let mut pc = 6;
        assert_eq!(crate::format::read_str(&bytes, &mut pc).unwrap(), "f()");
        assert_eq!(read_varint(&bytes, &mut pc).unwrap(), 2);
        assert_eq!(read_varint(&bytes, &mut pc).unwrap(), 1);

        let body_disp = read_varint(&bytes, &mut pc).unwrap();
        let after_body_target = pc;
        let end_disp = read_varint(&bytes, &mut pc).unwrap();
        let init_pc = pc;

        assert_eq!(bytes[init_pc], Opcode::Sign.byte());
        let body_pc = (after_body_target as i64 + body_disp) as usize;
        assert_eq!(bytes[body_pc], Opcode::End.byte());
        let end_pc = (pc as i64 + end_disp) as usize;
        assert_eq!(bytes[end_pc], Opcode::Term.byte());
    }

    #[test]
    fn const_operands_are_raw_little_endian() {
        let mut asm = Asm::new();
        asm.const_i(0x0102_0304);
        let bytes = asm.finish().unwrap();
        assert_eq!(bytes, [Opcode::ConstI.byte(), 0x04, 0x03, 0x02, 0x01]);
    }
}
