//! # Pool Allocator
//!
//! Fixed-size block allocator for objects that are frequently allocated and freed.
//!
//! Unused blocks are threaded into an intrusive singly-linked free list: the
//! first 8 bytes of a free block hold the index of the next free block.

use crate::error::{MemoryError, MemoryResult};

use super::region::{check_align, Allocation, Allocator, Region};

/// Size of the free-list node stored inside every free block.
const NODE_SIZE: usize = std::mem::size_of::<u64>();

/// Free-list terminator.
const NIL: u64 = u64::MAX;

/// A pool allocator for fixed-size blocks.
///
/// Blocks are allocated and freed individually, but all blocks have the same
/// size. Reuse order is LIFO: the most recently freed block is handed out
/// next.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = PoolAllocator::new(10_000, std::mem::size_of::<Particle>())?;
///
/// // Allocate - O(1), no heap allocation
/// let block = pool.alloc()?;
///
/// // Free - O(1), no heap deallocation
/// pool.free(block)?;
/// ```
#[derive(Debug)]
pub struct PoolAllocator<'m> {
    /// The backing storage.
    region: Region<'m>,
    /// Usable bytes per block.
    block_size: usize,
    /// Distance between block starts.
    block_stride: usize,
    /// Number of blocks.
    block_count: usize,
    /// Head of the free list (block index).
    free_list: Option<usize>,
    /// Number of allocated blocks.
    allocated_count: usize,
}

impl PoolAllocator<'static> {
    /// Creates a pool of `block_count` blocks of at least `min_block_size` bytes.
    ///
    /// # Errors
    ///
    /// `InvalidSize` if `block_count` is zero.
    pub fn new(block_count: usize, min_block_size: usize) -> MemoryResult<Self> {
        Self::with_alignment(block_count, min_block_size, 0)
    }

    /// Creates a pool whose blocks start every `block_align` bytes.
    ///
    /// A `block_align` of zero means "same as the block size".
    ///
    /// # Errors
    ///
    /// `InvalidSize` if `block_count` is zero, `InvalidAlignment` if
    /// `block_align` is smaller than the block size.
    pub fn with_alignment(
        block_count: usize,
        min_block_size: usize,
        block_align: usize,
    ) -> MemoryResult<Self> {
        let (block_size, stride) = Self::layout(block_count, min_block_size, block_align)?;
        Self::build(Region::owned(stride * block_count), block_size, stride, block_count)
    }
}

impl<'m> PoolAllocator<'m> {
    /// Creates a pool over caller-provided memory.
    ///
    /// # Errors
    ///
    /// Same as [`PoolAllocator::with_alignment`], plus `InvalidLayout` if
    /// `memory` is too small for `block_count` blocks.
    pub fn from_slice(
        memory: &'m mut [u8],
        block_count: usize,
        min_block_size: usize,
        block_align: usize,
    ) -> MemoryResult<Self> {
        let (block_size, stride) = Self::layout(block_count, min_block_size, block_align)?;
        Self::build(Region::borrowed(memory), block_size, stride, block_count)
    }

    fn layout(
        block_count: usize,
        min_block_size: usize,
        block_align: usize,
    ) -> MemoryResult<(usize, usize)> {
        let block_size = min_block_size.max(NODE_SIZE);
        if block_count == 0 {
            return Err(MemoryError::InvalidSize { size: 0, block_size });
        }
        let stride = if block_align == 0 { block_size } else { block_align };
        if stride < block_size {
            return Err(MemoryError::InvalidAlignment(block_align));
        }
        Ok((block_size, stride))
    }

    fn build(
        region: Region<'m>,
        block_size: usize,
        block_stride: usize,
        block_count: usize,
    ) -> MemoryResult<Self> {
        if region.len() < block_stride * block_count {
            return Err(MemoryError::InvalidLayout {
                data_size: region.len(),
                block_size: block_stride,
            });
        }

        let mut pool = Self {
            region,
            block_size,
            block_stride,
            block_count,
            free_list: None,
            allocated_count: 0,
        };
        pool.clear();
        Ok(pool)
    }

    /// Returns the number of blocks.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.block_count
    }

    /// Returns the usable size of each block.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the number of currently allocated blocks.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Returns the number of free blocks.
    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.block_count - self.allocated_count
    }

    /// Allocates one block.
    ///
    /// This is a **O(1)** operation with **zero heap allocations**.
    ///
    /// # Errors
    ///
    /// `OutOfMemory` if the free list is empty.
    pub fn alloc(&mut self) -> MemoryResult<Allocation> {
        let Some(index) = self.free_list else {
            return Err(MemoryError::OutOfMemory {
                requested: self.block_size,
                available: 0,
            });
        };

        self.free_list = self.read_next(index);
        self.allocated_count += 1;

        Ok(Allocation::new(index * self.block_stride, self.block_size, 0))
    }

    /// Frees one block, pushing it onto the free-list head.
    ///
    /// This is a **O(1)** operation with **zero heap deallocations**
    /// (debug builds additionally scan the free list for double frees).
    ///
    /// # Errors
    ///
    /// `InvalidAllocation` for handles that are not block starts of this
    /// pool, `DoubleFree` if the block is already free (always caught when
    /// nothing is allocated, otherwise only in debug builds).
    pub fn free(&mut self, allocation: Allocation) -> MemoryResult<()> {
        let index = self.block_index(&allocation).ok_or(MemoryError::InvalidAllocation {
            offset: allocation.offset(),
        })?;

        if self.allocated_count == 0 || (cfg!(debug_assertions) && self.is_free(index)) {
            return Err(MemoryError::DoubleFree {
                offset: allocation.offset(),
            });
        }

        self.write_next(index, self.free_list);
        self.free_list = Some(index);
        self.allocated_count -= 1;
        Ok(())
    }

    /// Returns the block index of a handle issued by this pool.
    #[must_use]
    pub fn block_index(&self, allocation: &Allocation) -> Option<usize> {
        let offset = allocation.offset();
        let index = offset / self.block_stride;
        let valid = offset % self.block_stride == 0
            && index < self.block_count
            && allocation.size() == self.block_size;
        valid.then_some(index)
    }

    /// Walks the free list looking for `index`.
    fn is_free(&self, index: usize) -> bool {
        let mut cursor = self.free_list;
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == index {
                return true;
            }
            steps += 1;
            if steps > self.block_count {
                break;
            }
            cursor = self.read_next(current);
        }
        false
    }

    fn read_next(&self, index: usize) -> Option<usize> {
        let start = index * self.block_stride;
        let node = &self.region.as_bytes()[start..start + NODE_SIZE];
        let next: u64 = bytemuck::pod_read_unaligned(node);
        (next != NIL).then(|| next as usize)
    }

    fn write_next(&mut self, index: usize, next: Option<usize>) {
        let start = index * self.block_stride;
        let next = next.map_or(NIL, |n| n as u64);
        self.region.as_bytes_mut()[start..start + NODE_SIZE]
            .copy_from_slice(bytemuck::bytes_of(&next));
    }
}

impl Allocator for PoolAllocator<'_> {
    fn alloc_bytes(&mut self, size: usize, align: usize) -> MemoryResult<Allocation> {
        check_align(align)?;
        if size != self.block_size {
            return Err(MemoryError::InvalidSize {
                size,
                block_size: self.block_size,
            });
        }
        self.alloc()
    }

    fn free_bytes(&mut self, allocation: Allocation) -> MemoryResult<()> {
        if allocation.size() != self.block_size {
            return Err(MemoryError::InvalidSize {
                size: allocation.size(),
                block_size: self.block_size,
            });
        }
        self.free(allocation)
    }

    /// Rebuilds the free list across the whole region.
    ///
    /// This is a **zero-heap-allocation** operation - memory is not freed.
    fn clear(&mut self) {
        for index in 0..self.block_count {
            let next = (index + 1 < self.block_count).then_some(index + 1);
            self.write_next(index, next);
        }
        self.free_list = Some(0);
        self.allocated_count = 0;
    }

    #[inline]
    fn used(&self) -> usize {
        self.allocated_count * self.block_stride
    }

    #[inline]
    fn total(&self) -> usize {
        self.block_count * self.block_stride
    }

    fn memory(&self) -> &[u8] {
        self.region.as_bytes()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.region.as_bytes_mut()
    }
}
