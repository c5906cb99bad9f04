// Copyright 2026 the Fin Runtime Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The block allocator.
//!
//! Every region of program-visible memory is a numbered block. A [`Ptr`]
//! names a block plus an offset into it, and every access is checked against
//! the block's [`Access`] mask and recorded size, which is how use-after-free
//! and out-of-bounds accesses surface as errors instead of corruption.
//!
//! Freed block indices are recycled through a free list. Pedantic mode keeps
//! tombstones forever and re-registers reallocations under fresh indices, so
//! stale pointers keep failing no matter how the program continues; it also
//! rejects `realloc`/`dealloc` through interior pointers.

use alloc::vec::Vec;
use core::fmt;

use crate::error::RuntimeError;
use crate::offset::{Offset, TypeInfo};
use crate::value::{Primitive, Ptr};

/// A set of block capabilities.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Access(u8);

impl Access {
    /// No capabilities; the block is a tombstone.
    pub const NONE: Self = Self(0);
    /// The block may be read.
    pub const READ: Self = Self(1 << 0);
    /// The block may be written.
    pub const WRITE: Self = Self(1 << 1);
    /// The block may be reallocated and deallocated.
    pub const FREE: Self = Self(1 << 2);

    /// Returns `true` if this mask includes all bits in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl core::ops::BitOr for Access {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NONE {
            return f.write_str("none");
        }
        let mut first = true;
        for (bit, name) in [(Self::READ, "read"), (Self::WRITE, "write"), (Self::FREE, "free")] {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

struct Block {
    memory: Vec<u8>,
    size: Offset,
    access: Access,
}

impl Block {
    fn is_tombstone(&self) -> bool {
        self.access == Access::NONE
    }
}

/// Owns all heap blocks and checks every access against permissions and
/// bounds.
pub struct Allocator {
    blocks: Vec<Block>,
    free_list: Vec<u32>,
    pedantic: bool,
}

impl Allocator {
    /// Creates an allocator.
    ///
    /// With `pedantic` set, freed indices are never reused and interior
    /// pointers are rejected by [`Allocator::realloc`] and
    /// [`Allocator::dealloc`].
    #[must_use]
    pub fn new(pedantic: bool) -> Self {
        Self {
            blocks: Vec::new(),
            free_list: Vec::new(),
            pedantic,
        }
    }

    /// Returns `true` if this allocator runs in pedantic mode.
    #[must_use]
    pub fn pedantic(&self) -> bool {
        self.pedantic
    }

    /// Allocates a zero-filled block of `size` bytes with the given access
    /// mask.
    pub fn alloc(&mut self, size: Offset, access: Access) -> Result<Ptr, RuntimeError> {
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(size.as_usize())
            .map_err(|_| RuntimeError::AllocationFailure)?;
        memory.resize(size.as_usize(), 0);

        Ok(self.add(memory, size, access))
    }

    /// Resizes the block behind `ptr`, preserving contents up to the smaller
    /// of the old and new sizes.
    ///
    /// Requires the `Free` capability. In release mode the block keeps its
    /// index; in pedantic mode the resized block gets a fresh index and the
    /// old one becomes a tombstone.
    pub fn realloc(&mut self, ptr: Ptr, size: Offset) -> Result<Ptr, RuntimeError> {
        if self.pedantic && ptr.offset() != Offset::ZERO {
            return Err(RuntimeError::InteriorPointer);
        }

        let block = self.block_mut(ptr)?;
        check_access(block, Access::FREE)?;

        if block
            .memory
            .try_reserve_exact(size.as_usize().saturating_sub(block.memory.len()))
            .is_err()
        {
            return Err(RuntimeError::AllocationFailure);
        }
        block.memory.resize(size.as_usize(), 0);

        if self.pedantic {
            let old = &mut self.blocks[ptr.block() as usize];
            let memory = core::mem::take(&mut old.memory);
            let access = old.access;
            old.access = Access::NONE;
            Ok(self.add(memory, size, access))
        } else {
            let block = &mut self.blocks[ptr.block() as usize];
            block.size = size;
            Ok(ptr)
        }
    }

    /// Releases the block behind `ptr`.
    ///
    /// Requires the `Free` capability. The index becomes a tombstone; in
    /// release mode it is pushed onto the free list for recycling.
    pub fn dealloc(&mut self, ptr: Ptr) -> Result<(), RuntimeError> {
        if self.pedantic && ptr.offset() != Offset::ZERO {
            return Err(RuntimeError::InteriorPointer);
        }

        let block = self.block_mut(ptr)?;
        check_access(block, Access::FREE)?;

        block.memory = Vec::new();
        block.access = Access::NONE;
        // size is preserved so the summary stays accurate

        if !self.pedantic {
            self.free_list.push(ptr.block());
        }
        Ok(())
    }

    /// Returns a read view of `type.size()` bytes at `ptr`.
    pub fn read_sized(&self, ptr: Ptr, ty: TypeInfo) -> Result<&[u8], RuntimeError> {
        let block = self.block(ptr)?;
        check_offset(block, ptr.offset(), ty.size())?;
        check_access(block, Access::READ)?;
        Ok(&block.memory[ptr.offset().as_usize()..ptr.offset().as_usize() + ty.size().as_usize()])
    }

    /// Returns a write view of `type.size()` bytes at `ptr`.
    pub fn write_sized(&mut self, ptr: Ptr, ty: TypeInfo) -> Result<&mut [u8], RuntimeError> {
        let block = self.block_mut(ptr)?;
        check_offset(block, ptr.offset(), ty.size())?;
        check_access(block, Access::WRITE)?;
        let start = ptr.offset().as_usize();
        Ok(&mut block.memory[start..start + ty.size().as_usize()])
    }

    /// Returns the full backing storage of the block behind `ptr`.
    ///
    /// Only the block index is validated; access and bounds checks are the
    /// caller's concern. The operand stack uses this to reach its storage.
    pub fn get(&self, ptr: Ptr) -> Result<&[u8], RuntimeError> {
        Ok(&self.block(ptr)?.memory)
    }

    /// Mutable variant of [`Allocator::get`].
    pub fn get_mut(&mut self, ptr: Ptr) -> Result<&mut [u8], RuntimeError> {
        Ok(&mut self.block_mut(ptr)?.memory)
    }

    /// Overrides the recorded size of the block behind `ptr`.
    ///
    /// The stack reports its live size through this so the summary reflects
    /// pushed bytes rather than capacity.
    pub fn set_size(&mut self, ptr: Ptr, size: Offset) -> Result<(), RuntimeError> {
        self.block_mut(ptr)?.size = size;
        Ok(())
    }

    /// Reads a primitive at `ptr`.
    pub fn read<T: Primitive>(&self, ptr: Ptr) -> Result<T, RuntimeError> {
        Ok(T::load(self.read_sized(ptr, T::TYPE_INFO)?))
    }

    /// Writes a primitive at `ptr`.
    pub fn write<T: Primitive>(&mut self, ptr: Ptr, value: T) -> Result<(), RuntimeError> {
        value.store(self.write_sized(ptr, T::TYPE_INFO)?);
        Ok(())
    }

    /// Returns a diagnostic summary of all blocks ever registered.
    #[must_use]
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for block in &self.blocks {
            let class = if block.access.contains(Access::FREE) {
                &mut summary.in_use
            } else if block.access.contains(Access::WRITE) {
                &mut summary.stack
            } else if block.access.contains(Access::READ) {
                &mut summary.instr
            } else {
                &mut summary.freed
            };
            class.blocks += 1;
            class.bytes += u64::from(block.size.0);
        }
        summary
    }

    fn add(&mut self, memory: Vec<u8>, size: Offset, access: Access) -> Ptr {
        if !self.pedantic {
            if let Some(index) = self.free_list.pop() {
                let block = &mut self.blocks[index as usize];
                debug_assert!(block.is_tombstone());
                *block = Block {
                    memory,
                    size,
                    access,
                };
                return Ptr::new(index, Offset::ZERO);
            }
        }

        let index = self.blocks.len() as u32;
        self.blocks.push(Block {
            memory,
            size,
            access,
        });
        Ptr::new(index, Offset::ZERO)
    }

    fn block(&self, ptr: Ptr) -> Result<&Block, RuntimeError> {
        self.blocks
            .get(ptr.block() as usize)
            .ok_or(RuntimeError::InvalidBlock { block: ptr.block() })
    }

    fn block_mut(&mut self, ptr: Ptr) -> Result<&mut Block, RuntimeError> {
        self.blocks
            .get_mut(ptr.block() as usize)
            .ok_or(RuntimeError::InvalidBlock { block: ptr.block() })
    }
}

fn check_offset(block: &Block, offset: Offset, size: Offset) -> Result<(), RuntimeError> {
    if offset + size > block.size {
        return Err(RuntimeError::AccessOutOfRange {
            offset,
            size,
            block_size: block.size,
        });
    }
    Ok(())
}

fn check_access(block: &Block, required: Access) -> Result<(), RuntimeError> {
    if !block.access.contains(required) {
        return Err(RuntimeError::InvalidAccess { required });
    }
    Ok(())
}

/// Byte and block counts for one summary class.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SummaryClass {
    /// Number of blocks in this class.
    pub blocks: u32,
    /// Total recorded bytes across them.
    pub bytes: u64,
}

/// A diagnostic breakdown of the block table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Blocks the program may still free.
    pub in_use: SummaryClass,
    /// Internally registered writable memory (the operand stack).
    pub stack: SummaryClass,
    /// Internally registered read-only memory.
    pub instr: SummaryClass,
    /// Tombstones.
    pub freed: SummaryClass,
}

struct Plural(u64, &'static str);

impl fmt::Display for Plural {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.0,
            self.1,
            if self.0 == 1 { "" } else { "s" }
        )
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allocator Summary:")?;
        for (label, class) in [
            ("  In use: ", self.in_use),
            ("   Stack: ", self.stack),
            ("   Instr: ", self.instr),
        ] {
            writeln!(
                f,
                "{label}{} in {}",
                Plural(class.bytes, "byte"),
                Plural(u64::from(class.blocks), "block")
            )?;
        }
        writeln!(f, "  -------")?;
        writeln!(
            f,
            "   Freed: {} in {}",
            Plural(self.freed.bytes, "byte"),
            Plural(u64::from(self.freed.blocks), "block")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn heap_access() -> Access {
        Access::READ | Access::WRITE | Access::FREE
    }

    #[test]
    fn alloc_write_read_roundtrip() {
        let mut alloc = Allocator::new(false);
        let ptr = alloc.alloc(Offset(8), heap_access()).unwrap();

        alloc.write::<i32>(ptr, 7).unwrap();
        alloc.write::<i32>(ptr + Offset(4), -9).unwrap();
        assert_eq!(alloc.read::<i32>(ptr).unwrap(), 7);
        assert_eq!(alloc.read::<i32>(ptr + Offset(4)).unwrap(), -9);

        alloc.dealloc(ptr).unwrap();
    }

    #[test]
    fn access_is_enforced() {
        let mut alloc = Allocator::new(false);
        let ro = alloc.alloc(Offset(4), Access::READ).unwrap();

        assert_eq!(alloc.read::<i32>(ro).unwrap(), 0);
        assert_eq!(
            alloc.write::<i32>(ro, 1),
            Err(RuntimeError::InvalidAccess {
                required: Access::WRITE
            })
        );
        assert_eq!(
            alloc.dealloc(ro),
            Err(RuntimeError::InvalidAccess {
                required: Access::FREE
            })
        );
    }

    #[test]
    fn bounds_are_enforced() {
        let mut alloc = Allocator::new(false);
        let ptr = alloc.alloc(Offset(6), heap_access()).unwrap();

        assert!(alloc.read::<i32>(ptr + Offset(2)).is_ok());
        assert!(matches!(
            alloc.read::<i32>(ptr + Offset(3)),
            Err(RuntimeError::AccessOutOfRange { .. })
        ));
        assert!(matches!(
            alloc.write::<Ptr>(ptr, Ptr::default()),
            Err(RuntimeError::AccessOutOfRange { .. })
        ));
    }

    #[test]
    fn unknown_block_is_rejected() {
        let alloc = Allocator::new(false);
        assert_eq!(
            alloc.read::<i32>(Ptr::new(3, Offset::ZERO)),
            Err(RuntimeError::InvalidBlock { block: 3 })
        );
    }

    #[test]
    fn use_after_free_release() {
        let mut alloc = Allocator::new(false);
        let ptr = alloc.alloc(Offset(4), heap_access()).unwrap();
        alloc.dealloc(ptr).unwrap();

        // The tombstone keeps the index alive with an empty mask.
        assert_eq!(
            alloc.read::<i32>(ptr),
            Err(RuntimeError::InvalidAccess {
                required: Access::READ
            })
        );
        assert_eq!(
            alloc.dealloc(ptr),
            Err(RuntimeError::InvalidAccess {
                required: Access::FREE
            })
        );
    }

    #[test]
    fn release_recycles_indices() {
        let mut alloc = Allocator::new(false);
        let a = alloc.alloc(Offset(4), heap_access()).unwrap();
        alloc.dealloc(a).unwrap();

        let b = alloc.alloc(Offset(4), heap_access()).unwrap();
        assert_eq!(b.block(), a.block());
    }

    #[test]
    fn pedantic_never_recycles() {
        let mut alloc = Allocator::new(true);
        let a = alloc.alloc(Offset(4), heap_access()).unwrap();
        alloc.dealloc(a).unwrap();

        let b = alloc.alloc(Offset(4), heap_access()).unwrap();
        assert_ne!(b.block(), a.block());
        assert_eq!(
            alloc.read::<i32>(a),
            Err(RuntimeError::InvalidAccess {
                required: Access::READ
            })
        );
    }

    #[test]
    fn realloc_preserves_contents() {
        for pedantic in [false, true] {
            let mut alloc = Allocator::new(pedantic);
            let ptr = alloc.alloc(Offset(8), heap_access()).unwrap();
            alloc.write::<i32>(ptr, 41).unwrap();
            alloc.write::<i32>(ptr + Offset(4), 42).unwrap();

            let grown = alloc.realloc(ptr, Offset(16)).unwrap();
            assert_eq!(alloc.read::<i32>(grown).unwrap(), 41);
            assert_eq!(alloc.read::<i32>(grown + Offset(4)).unwrap(), 42);

            let shrunk = alloc.realloc(grown, Offset(4)).unwrap();
            assert_eq!(alloc.read::<i32>(shrunk).unwrap(), 41);
            assert!(alloc.read::<i32>(shrunk + Offset(4)).is_err());
        }
    }

    #[test]
    fn pedantic_realloc_moves_the_index() {
        let mut alloc = Allocator::new(true);
        let ptr = alloc.alloc(Offset(4), heap_access()).unwrap();
        let moved = alloc.realloc(ptr, Offset(8)).unwrap();

        assert_ne!(moved.block(), ptr.block());
        assert_eq!(
            alloc.read::<i32>(ptr),
            Err(RuntimeError::InvalidAccess {
                required: Access::READ
            })
        );
    }

    #[test]
    fn pedantic_rejects_interior_release() {
        let mut alloc = Allocator::new(true);
        let ptr = alloc.alloc(Offset(8), heap_access()).unwrap();

        assert_eq!(
            alloc.dealloc(ptr + Offset(4)),
            Err(RuntimeError::InteriorPointer)
        );
        assert_eq!(
            alloc.realloc(ptr + Offset(4), Offset(16)),
            Err(RuntimeError::InteriorPointer)
        );
        alloc.dealloc(ptr).unwrap();
    }

    #[test]
    fn summary_classifies_blocks() {
        let mut alloc = Allocator::new(false);
        let heap = alloc.alloc(Offset(12), heap_access()).unwrap();
        alloc
            .alloc(Offset(64), Access::READ | Access::WRITE)
            .unwrap();
        alloc.alloc(Offset(10), Access::READ).unwrap();
        let freed = alloc.alloc(Offset(24), heap_access()).unwrap();
        alloc.dealloc(freed).unwrap();

        let summary = alloc.summary();
        assert_eq!(summary.in_use, SummaryClass { blocks: 1, bytes: 12 });
        assert_eq!(summary.stack, SummaryClass { blocks: 1, bytes: 64 });
        assert_eq!(summary.instr, SummaryClass { blocks: 1, bytes: 10 });
        assert_eq!(summary.freed, SummaryClass { blocks: 1, bytes: 24 });

        alloc.dealloc(heap).unwrap();
        assert_eq!(alloc.summary().in_use, SummaryClass::default());
    }

    #[test]
    fn summary_display_pluralizes() {
        let mut alloc = Allocator::new(false);
        let ptr = alloc.alloc(Offset(1), heap_access()).unwrap();
        alloc.dealloc(ptr).unwrap();

        let text = alloc.summary().to_string();
        assert!(text.starts_with("Allocator Summary:\n"));
        assert!(text.contains("  In use: 0 bytes in 0 blocks\n"));
        assert!(text.contains("   Freed: 1 byte in 1 block\n"));
    }
}
