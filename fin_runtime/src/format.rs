// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Encoding primitives for the instruction stream.
//!
//! Two numeric encodings appear in bytecode:
//!
//! - The variable-length integer: big-endian 7-bit groups with bit 7 as the
//!   continuation flag; the final byte carries 6 payload bits and bit 6 as
//!   the sign flag. A set sign flag bitwise-inverts the accumulated
//!   magnitude, so small negative numbers stay short.
//! - Raw little-endian constants: exactly the wire size of the primitive,
//!   read at the current pc with no alignment guarantee. Decoding copies the
//!   bytes out rather than reinterpreting the buffer in place.
//!
//! Strings are a `u16` varint length followed by that many UTF-8 bytes.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::RuntimeError;
use crate::value::{Pc, Primitive};

const CONTINUATION: u8 = 0b1000_0000;
const SIGN: u8 = 0b0100_0000;
const FINAL_PAYLOAD: u8 = 0b0011_1111;
const GROUP_PAYLOAD: u8 = 0b0111_1111;

/// Decodes a varint at `*pc`, advancing `*pc` past it.
pub fn read_varint(bytes: &[u8], pc: &mut Pc) -> Result<i64, RuntimeError> {
    let mut value: u64 = 0;
    let mut bits: u32 = 0;

    loop {
        let byte = *bytes.get(*pc).ok_or(RuntimeError::MalformedVarint)?;
        *pc += 1;

        if byte & CONTINUATION != 0 {
            value = (value << 7) | u64::from(byte & GROUP_PAYLOAD);
            bits += 7;
        } else {
            value = (value << 6) | u64::from(byte & FINAL_PAYLOAD);
            bits += 6;

            if bits > 70 {
                return Err(RuntimeError::MalformedVarint);
            }
            if byte & SIGN != 0 {
                value = !value;
            }
            return Ok(value as i64);
        }

        if bits > 70 {
            return Err(RuntimeError::MalformedVarint);
        }
    }
}

/// Decodes a varint and converts it to `u16`.
pub fn read_varint_u16(bytes: &[u8], pc: &mut Pc) -> Result<u16, RuntimeError> {
    u16::try_from(read_varint(bytes, pc)?).map_err(|_| RuntimeError::MalformedVarint)
}

/// Decodes a varint and converts it to `u32`.
pub fn read_varint_u32(bytes: &[u8], pc: &mut Pc) -> Result<u32, RuntimeError> {
    u32::try_from(read_varint(bytes, pc)?).map_err(|_| RuntimeError::MalformedVarint)
}

/// Decodes a varint and converts it to `i32`.
pub fn read_varint_i32(bytes: &[u8], pc: &mut Pc) -> Result<i32, RuntimeError> {
    i32::try_from(read_varint(bytes, pc)?).map_err(|_| RuntimeError::MalformedVarint)
}

/// Decodes a length-prefixed string at `*pc`.
pub fn read_str(bytes: &[u8], pc: &mut Pc) -> Result<String, RuntimeError> {
    let len = read_varint_u16(bytes, pc)? as usize;
    let end = pc
        .checked_add(len)
        .ok_or(RuntimeError::TruncatedConstant)?;
    let raw = bytes
        .get(*pc..end)
        .ok_or(RuntimeError::TruncatedConstant)?;
    *pc = end;
    core::str::from_utf8(raw)
        .map(String::from)
        .map_err(|_| RuntimeError::InvalidUtf8)
}

/// Decodes a raw little-endian constant at `*pc`.
///
/// The bytes are copied into an aligned temporary, so the buffer itself may
/// be arbitrarily aligned.
pub fn read_const<T: Primitive>(bytes: &[u8], pc: &mut Pc) -> Result<T, RuntimeError> {
    let size = T::TYPE_INFO.size().as_usize();
    let end = pc
        .checked_add(size)
        .ok_or(RuntimeError::TruncatedConstant)?;
    let raw = bytes
        .get(*pc..end)
        .ok_or(RuntimeError::TruncatedConstant)?;
    *pc = end;
    Ok(T::load(raw))
}

/// Encodes `value` as a varint.
pub fn write_varint(out: &mut Vec<u8>, value: i64) {
    write_varint_padded(out, value, 0);
}

/// Encodes `value` as a varint of at least `min_len` bytes.
///
/// Padding uses leading continuation bytes with zero payload, which decode
/// to the same value. Fixed-width branch operands rely on this so labels can
/// be patched after their targets are known.
pub fn write_varint_padded(out: &mut Vec<u8>, value: i64, min_len: usize) {
    let negative = value < 0;
    let magnitude = if negative { !(value as u64) } else { value as u64 };

    let mut groups = [0u8; 10];
    let mut count = 0;
    let mut rest = magnitude >> 6;
    while rest != 0 {
        groups[count] = (rest as u8 & GROUP_PAYLOAD) | CONTINUATION;
        count += 1;
        rest >>= 7;
    }

    for _ in count + 1..min_len {
        out.push(CONTINUATION);
    }
    for i in (0..count).rev() {
        out.push(groups[i]);
    }
    out.push((magnitude as u8 & FINAL_PAYLOAD) | if negative { SIGN } else { 0 });
}

/// Encodes a length-prefixed string.
pub fn write_str(out: &mut Vec<u8>, value: &str) {
    debug_assert!(value.len() <= u16::MAX as usize);
    write_varint(out, value.len() as i64);
    out.extend_from_slice(value.as_bytes());
}

/// Encodes a raw little-endian constant.
pub fn write_const<T: Primitive>(out: &mut Vec<u8>, value: T) {
    let size = T::TYPE_INFO.size().as_usize();
    let start = out.len();
    out.resize(start + size, 0);
    value.store(&mut out[start..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn roundtrip(value: i64) {
        let mut bytes = Vec::new();
        write_varint(&mut bytes, value);
        let mut pc = 0;
        assert_eq!(read_varint(&bytes, &mut pc).unwrap(), value, "{value}");
        assert_eq!(pc, bytes.len());
    }

    #[test]
    fn varint_roundtrips() {
        for v in [
            0,
            1,
            -1,
            63,
            64,
            -64,
            -65,
            8191,
            8192,
            i64::from(i32::MAX),
            i64::from(i32::MIN),
            i64::from(u32::MAX),
        ] {
            roundtrip(v);
        }
    }

    #[test]
    fn varint_single_byte_forms() {
        let mut bytes = Vec::new();
        write_varint(&mut bytes, 0);
        assert_eq!(bytes, vec![0x00]);

        bytes.clear();
        write_varint(&mut bytes, 63);
        assert_eq!(bytes, vec![0x3F]);

        // -1 inverts to magnitude 0 with the sign flag set.
        bytes.clear();
        write_varint(&mut bytes, -1);
        assert_eq!(bytes, vec![0x40]);
    }

    #[test]
    fn varint_padding_is_transparent() {
        let mut padded = Vec::new();
        write_varint_padded(&mut padded, -3, 4);
        assert_eq!(padded.len(), 4);
        assert_eq!(&padded[..3], &[0x80, 0x80, 0x80]);

        let mut pc = 0;
        assert_eq!(read_varint(&padded, &mut pc).unwrap(), -3);
        assert_eq!(pc, 4);
    }

    #[test]
    fn varint_truncation_fails() {
        let mut pc = 0;
        assert_eq!(
            read_varint(&[0x81], &mut pc),
            Err(RuntimeError::MalformedVarint)
        );
    }

    #[test]
    fn varint_narrowing_fails() {
        let mut bytes = Vec::new();
        write_varint(&mut bytes, 0x1_0000);
        let mut pc = 0;
        assert_eq!(
            read_varint_u16(&bytes, &mut pc),
            Err(RuntimeError::MalformedVarint)
        );

        bytes.clear();
        write_varint(&mut bytes, -1);
        pc = 0;
        assert_eq!(
            read_varint_u32(&bytes, &mut pc),
            Err(RuntimeError::MalformedVarint)
        );
    }

    #[test]
    fn string_roundtrip() {
        let mut bytes = Vec::new();
        write_str(&mut bytes, "main()");
        write_str(&mut bytes, "");

        let mut pc = 0;
        assert_eq!(read_str(&bytes, &mut pc).unwrap(), "main()");
        assert_eq!(read_str(&bytes, &mut pc).unwrap(), "");
        assert_eq!(pc, bytes.len());
    }

    #[test]
    fn const_roundtrip_is_little_endian() {
        let mut bytes = Vec::new();
        write_const::<i32>(&mut bytes, 0x0403_0201);
        assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);

        let mut pc = 0;
        assert_eq!(read_const::<i32>(&bytes, &mut pc).unwrap(), 0x0403_0201);

        bytes.clear();
        write_const::<f32>(&mut bytes, 3.5);
        pc = 0;
        assert_eq!(read_const::<f32>(&bytes, &mut pc).unwrap(), 3.5);
    }

    #[test]
    fn const_truncation_fails() {
        let mut pc = 0;
        assert_eq!(
            read_const::<i32>(&[1, 2, 3], &mut pc),
            Err(RuntimeError::TruncatedConstant)
        );
    }
}
