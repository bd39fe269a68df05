//! # Regions, Allocations and the Allocator Trait
//!
//! Every allocator in this crate manages exactly one byte region that is
//! either owned (allocated once at start-up) or borrowed from a parent.
//! Allocators hand out [`Allocation`] handles (offsets into the region)
//! instead of raw pointers.

use std::ops::Range;

use bytemuck::Pod;

use crate::error::{MemoryError, MemoryResult};

/// Byte region managed by an allocator.
///
/// Owned regions are backed by 8-byte words so the region start is always
/// 8-byte aligned.
#[derive(Debug)]
pub enum Region<'m> {
    /// Region allocated by the allocator itself.
    Owned {
        /// Backing words.
        words: Box<[u64]>,
        /// Usable length in bytes.
        len: usize,
    },
    /// Region handed in by the caller.
    Borrowed(&'m mut [u8]),
}

impl Region<'static> {
    /// Allocates a zeroed region of `len` bytes.
    #[must_use]
    pub fn owned(len: usize) -> Self {
        let words = vec![0u64; len.div_ceil(8)].into_boxed_slice();
        Self::Owned { words, len }
    }
}

impl<'m> Region<'m> {
    /// Wraps caller-provided memory.
    #[must_use]
    pub fn borrowed(bytes: &'m mut [u8]) -> Self {
        Self::Borrowed(bytes)
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Owned { len, .. } => *len,
            Self::Borrowed(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the region holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The whole region as bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Owned { words, len } => &bytemuck::cast_slice::<u64, u8>(words)[..*len],
            Self::Borrowed(bytes) => &bytes[..],
        }
    }

    /// The whole region as mutable bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Owned { words, len } => &mut bytemuck::cast_slice_mut::<u64, u8>(words)[..*len],
            Self::Borrowed(bytes) => &mut bytes[..],
        }
    }

    /// Address of the first byte, used for alignment math only.
    #[inline]
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.as_bytes().as_ptr() as usize
    }

    /// Zeroes the whole region.
    pub fn zero(&mut self) {
        self.as_bytes_mut().fill(0);
    }
}

/// Handle to a live range inside an allocator's region.
///
/// `offset` is relative to the region start. `padding` is the number of
/// alignment bytes skipped directly before `offset` (stack allocations only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Allocation {
    offset: usize,
    size: usize,
    padding: usize,
}

impl Allocation {
    #[inline]
    pub(crate) const fn new(offset: usize, size: usize, padding: usize) -> Self {
        Self { offset, size, padding }
    }

    /// Offset of the first byte in the region.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Alignment bytes inserted before this allocation.
    #[inline]
    #[must_use]
    pub const fn padding(&self) -> usize {
        self.padding
    }

    /// One past the last byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.offset + self.size
    }

    /// Byte range inside the region.
    #[inline]
    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }

    /// Returns `true` if the two allocations share at least one byte.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Common interface of every fixed-region allocator.
///
/// Allocation failures are returned as [`MemoryError`], never raised.
/// None of the allocators synchronize internally; callers serialize
/// structural changes on one thread.
pub trait Allocator {
    /// Allocates `size` bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// [`MemoryError::OutOfMemory`] when the region has no room, plus
    /// allocator-specific size/alignment errors.
    fn alloc_bytes(&mut self, size: usize, align: usize) -> MemoryResult<Allocation>;

    /// Returns an allocation to the allocator.
    ///
    /// # Errors
    ///
    /// Allocator-specific: foreign handles, double frees, stack order
    /// violations.
    fn free_bytes(&mut self, allocation: Allocation) -> MemoryResult<()>;

    /// Releases every allocation at once.
    fn clear(&mut self);

    /// Bytes currently handed out.
    fn used(&self) -> usize;

    /// Total bytes managed.
    fn total(&self) -> usize;

    /// The managed region.
    fn memory(&self) -> &[u8];

    /// The managed region, mutably.
    fn memory_mut(&mut self) -> &mut [u8];

    /// Bytes covered by an allocation.
    ///
    /// Returns `None` when the range falls outside the region. Allocators
    /// that can check liveness cheaply (bitmap, stack) also return `None`
    /// for handles they no longer consider live; the pool does not, so a
    /// freed pool handle still reads its block.
    fn bytes(&self, allocation: &Allocation) -> Option<&[u8]> {
        self.memory().get(allocation.range())
    }

    /// Mutable bytes covered by an allocation. Same liveness rules as
    /// [`Allocator::bytes`].
    fn bytes_mut(&mut self, allocation: &Allocation) -> Option<&mut [u8]> {
        self.memory_mut().get_mut(allocation.range())
    }
}

/// Typed helpers on top of [`Allocator`], available on trait objects too.
pub trait AllocatorExt: Allocator {
    /// Allocates room for `count` values of `T`.
    ///
    /// # Errors
    ///
    /// Same as [`Allocator::alloc_bytes`]; `InvalidSize` on overflow.
    fn alloc<T: Pod>(&mut self, count: usize) -> MemoryResult<Allocation> {
        let size = std::mem::size_of::<T>()
            .checked_mul(count)
            .ok_or(MemoryError::InvalidSize {
                size: usize::MAX,
                block_size: std::mem::size_of::<T>(),
            })?;
        self.alloc_bytes(size, std::mem::align_of::<T>())
    }

    /// Views the start of an allocation as a `T`.
    fn get<T: Pod>(&self, allocation: &Allocation) -> Option<&T> {
        let bytes = self.bytes(allocation)?.get(..std::mem::size_of::<T>())?;
        bytemuck::try_from_bytes(bytes).ok()
    }

    /// Views the start of an allocation as a mutable `T`.
    fn get_mut<T: Pod>(&mut self, allocation: &Allocation) -> Option<&mut T> {
        let bytes = self.bytes_mut(allocation)?.get_mut(..std::mem::size_of::<T>())?;
        bytemuck::try_from_bytes_mut(bytes).ok()
    }

    /// Views an allocation as a slice of `T`.
    fn slice<T: Pod>(&self, allocation: &Allocation) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.bytes(allocation)?).ok()
    }

    /// Views an allocation as a mutable slice of `T`.
    fn slice_mut<T: Pod>(&mut self, allocation: &Allocation) -> Option<&mut [T]> {
        bytemuck::try_cast_slice_mut(self.bytes_mut(allocation)?).ok()
    }
}

impl<A: Allocator + ?Sized> AllocatorExt for A {}

/// Rejects zero and non-power-of-two alignments.
#[inline]
pub(crate) fn check_align(align: usize) -> MemoryResult<()> {
    if align.is_power_of_two() {
        Ok(())
    } else {
        Err(MemoryError::InvalidAlignment(align))
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_region_is_word_aligned() {
        let region = Region::owned(13);
        assert_eq!(region.len(), 13);
        assert_eq!(region.base_address() % 8, 0);
        assert!(region.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_borrowed_region_writes_through() {
        let mut backing = [0u8; 4];
        {
            let mut region = Region::borrowed(&mut backing);
            region.as_bytes_mut()[2] = 7;
        }
        assert_eq!(backing, [0, 0, 7, 0]);
    }

    #[test]
    fn test_allocation_overlap() {
        let a = Allocation::new(0, 4, 0);
        let b = Allocation::new(4, 4, 0);
        let c = Allocation::new(2, 4, 0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(16, 16), 16);
        assert!(check_align(0).is_err());
        assert!(check_align(3).is_err());
        assert!(check_align(64).is_ok());
    }
}
