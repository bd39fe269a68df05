//! # Stack Allocator
//!
//! A LIFO bump allocator with marker rollback for scratch data that lives
//! for a frame or a scope.

use crate::error::{MemoryError, MemoryResult};

use super::region::{align_up, check_align, Allocation, Allocator, Region};

/// Snapshot of the stack top, used with [`StackAllocator::rollback`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Marker(usize);

impl Marker {
    /// Byte offset of the stack top when the marker was taken.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// A bump-pointer stack allocator.
///
/// Allocations are fast (just bump a pointer). Memory is reclaimed in
/// reverse allocation order, by rolling back to a [`Marker`], or all at
/// once with [`Allocator::clear`].
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one stack per thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut stack = StackAllocator::new(1024 * 1024); // 1MB
///
/// let scope = stack.marker();
/// let scratch = stack.alloc::<f32>(1000)?;
/// // ...
/// stack.rollback(scope);
/// ```
#[derive(Debug)]
pub struct StackAllocator<'m> {
    /// The backing storage.
    region: Region<'m>,
    /// Current allocation offset (stack top).
    marker: usize,
}

impl StackAllocator<'static> {
    /// Creates a stack that owns `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_region(Region::owned(capacity))
    }
}

impl<'m> StackAllocator<'m> {
    /// Creates a stack over caller-provided memory.
    #[must_use]
    pub fn from_slice(memory: &'m mut [u8]) -> Self {
        Self::with_region(Region::borrowed(memory))
    }

    /// Creates a stack over a region.
    #[must_use]
    pub fn with_region(region: Region<'m>) -> Self {
        Self { region, marker: 0 }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.marker
    }

    /// Captures the current stack top.
    #[inline]
    #[must_use]
    pub const fn marker(&self) -> Marker {
        Marker(self.marker)
    }

    /// Resets the stack top to `marker`.
    ///
    /// Every allocation made after the marker was taken becomes invalid and
    /// must not be used. Markers above the current top are ignored.
    #[inline]
    pub fn rollback(&mut self, marker: Marker) {
        if marker.0 <= self.marker {
            self.marker = marker.0;
        }
    }

    /// Frees an allocation, reclaiming it only when it is the stack top.
    ///
    /// Returns `true` if capacity was reclaimed.
    pub fn free(&mut self, allocation: Allocation) -> bool {
        self.free_bytes(allocation).is_ok()
    }
}

impl Allocator for StackAllocator<'_> {
    fn alloc_bytes(&mut self, size: usize, align: usize) -> MemoryResult<Allocation> {
        check_align(align)?;

        // Align against the real address so borrowed regions work too.
        let base = self.region.base_address();
        let aligned = align_up(base + self.marker, align) - base;
        let padding = aligned - self.marker;

        let end = aligned.checked_add(size).filter(|end| *end <= self.capacity());
        let Some(end) = end else {
            return Err(MemoryError::OutOfMemory {
                requested: size,
                available: self.remaining(),
            });
        };

        self.marker = end;
        Ok(Allocation::new(aligned, size, padding))
    }

    fn free_bytes(&mut self, allocation: Allocation) -> MemoryResult<()> {
        if allocation.end() > self.capacity() || allocation.padding() > allocation.offset() {
            return Err(MemoryError::InvalidAllocation {
                offset: allocation.offset(),
            });
        }

        if allocation.end() == self.marker {
            self.marker = allocation.offset() - allocation.padding();
            Ok(())
        } else {
            tracing::warn!(
                "stack free at offset {} is not the top ({}); capacity not reclaimed",
                allocation.offset(),
                self.marker
            );
            Err(MemoryError::StackOrderViolation {
                offset: allocation.offset(),
                marker: self.marker,
            })
        }
    }

    #[inline]
    fn clear(&mut self) {
        self.marker = 0;
    }

    #[inline]
    fn used(&self) -> usize {
        self.marker
    }

    #[inline]
    fn total(&self) -> usize {
        self.capacity()
    }

    fn memory(&self) -> &[u8] {
        self.region.as_bytes()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.region.as_bytes_mut()
    }

    /// `None` once the stack top has dropped below the end of `allocation`.
    fn bytes(&self, allocation: &Allocation) -> Option<&[u8]> {
        if allocation.end() > self.marker {
            return None;
        }
        self.region.as_bytes().get(allocation.range())
    }

    fn bytes_mut(&mut self, allocation: &Allocation) -> Option<&mut [u8]> {
        if allocation.end() > self.marker {
            return None;
        }
        self.region.as_bytes_mut().get_mut(allocation.range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AllocatorExt;

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Blob {
        x: [u8; 100],
        y: [u8; 100],
        z: [u8; 100],
    }

    #[test]
    fn test_stack_allocate() {
        let mut stack = StackAllocator::new(1024);
        let i0 = stack.alloc::<i32>(1).unwrap();
        *stack.get_mut::<i32>(&i0).unwrap() = 10;
        assert_eq!(*stack.get::<i32>(&i0).unwrap(), 10);
    }

    #[test]
    fn test_stack_rollback_returns_same_offset() {
        let mut stack = StackAllocator::new(1024);
        let _ = stack.alloc::<u16>(1).unwrap();

        let marker = stack.marker();
        assert_eq!(marker.offset(), std::mem::size_of::<u16>());

        let obj0 = stack.alloc::<Blob>(1).unwrap();
        stack.rollback(marker);
        let obj1 = stack.alloc::<Blob>(1).unwrap();

        assert_eq!(obj0.offset(), obj1.offset());
    }

    #[test]
    fn test_rolled_back_allocation_has_no_bytes() {
        let mut stack = StackAllocator::new(1024);
        let keep = stack.alloc::<u32>(1).unwrap();
        let marker = stack.marker();
        let scratch = stack.alloc::<u64>(2).unwrap();
        assert!(stack.slice::<u64>(&scratch).is_some());

        stack.rollback(marker);
        assert!(stack.bytes(&scratch).is_none());
        assert!(stack.get_mut::<u64>(&scratch).is_none());
        assert!(stack.get::<u32>(&keep).is_some());

        assert!(stack.free(keep));
        assert!(stack.bytes(&keep).is_none());
    }

    #[test]
    fn test_stack_allocate_fail() {
        let mut stack = StackAllocator::new(1024);
        let err = stack.alloc::<Blob>(10).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { requested: 3000, available: 1024 }));
        assert_eq!(stack.used(), 0);
    }

    #[test]
    fn test_stack_clear() {
        let mut stack = StackAllocator::new(1024);
        let _ = stack.alloc::<i32>(20).unwrap();
        assert_eq!(stack.marker().offset(), 20 * std::mem::size_of::<i32>());

        stack.clear();
        assert_eq!(stack.marker().offset(), 0);
    }

    #[test]
    fn test_stack_non_lifo_free() {
        let mut stack = StackAllocator::new(1024);
        let i0 = stack.alloc::<i32>(1).unwrap();
        let c0 = stack.alloc::<u8>(1).unwrap();
        let i1 = stack.alloc::<i32>(1).unwrap();

        *stack.get_mut::<i32>(&i0).unwrap() = 10;
        *stack.get_mut::<u8>(&c0).unwrap() = b'a';
        *stack.get_mut::<i32>(&i1).unwrap() = 20;

        assert!(stack.free(i1));
        let used = stack.used();
        assert!(matches!(
            stack.free_bytes(i0),
            Err(MemoryError::StackOrderViolation { .. })
        ));
        assert_eq!(stack.used(), used);
        assert!(stack.free(c0));
        assert_eq!(stack.used(), i0.end());

        // Same offsets come back and the bytes were not touched.
        let c1 = stack.alloc::<u8>(1).unwrap();
        let i2 = stack.alloc::<i32>(1).unwrap();
        assert_eq!(*stack.get::<u8>(&c1).unwrap(), b'a');
        assert_eq!(*stack.get::<i32>(&i2).unwrap(), 20);
    }

    #[test]
    fn test_stack_alignment_padding() {
        let mut stack = StackAllocator::new(64);
        let c0 = stack.alloc::<u8>(1).unwrap();
        let l0 = stack.alloc::<u64>(1).unwrap();
        assert_eq!(c0.offset(), 0);
        assert_eq!(l0.offset(), 8);
        assert_eq!(l0.padding(), 7);

        assert!(stack.free(l0));
        assert_eq!(stack.used(), 1);
    }

    #[test]
    fn test_stack_borrowed_memory() {
        let mut backing = [0u8; 16];
        let mut stack = StackAllocator::from_slice(&mut backing);
        let a = stack.alloc_bytes(16, 1).unwrap();
        stack.bytes_mut(&a).unwrap().fill(3);
        assert!(stack.alloc_bytes(1, 1).is_err());
        drop(stack);
        assert!(backing.iter().all(|b| *b == 3));
    }
}
