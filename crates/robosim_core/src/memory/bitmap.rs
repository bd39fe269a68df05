//! # Bitmap Allocator
//!
//! Fixed-block allocator whose liveness is tracked by a packed bitmap stored
//! at the front of its own region. Supports contiguous multi-block
//! allocations.
//!
//! ```text
//! [ bitmap: x bytes ][ data: 8 * x blocks of block_size bytes ]
//! x + x * 8 * block_size == size
//! ```

use crate::error::{MemoryError, MemoryResult};

use super::bits::{all_set, get_bit, set_bit};
use super::region::{check_align, Allocation, Allocator, Region};

/// Bitmap-tracked block allocator with next-fit search.
///
/// The bitmap is the single source of truth for liveness: bit `i` is set
/// while block `i` is handed out. Searches start at a cursor and wrap
/// around once; a request fails if no run of free blocks is long enough,
/// even when enough free blocks exist in total.
///
/// Blocks start at `bitmap_size + i * block_size`. The requested alignment
/// is validated but not applied, so typed views through
/// [`AllocatorExt`](super::AllocatorExt) return `None` for a block whose
/// address does not suit `T`.
#[derive(Debug)]
pub struct BitmapAllocator<'m> {
    region: Region<'m>,
    block_size: usize,
    /// Bytes at the front of the region used by the bitmap.
    bitmap_size: usize,
    /// Number of data blocks.
    num_blocks: usize,
    /// Block index where the next search starts.
    current: usize,
    /// Number of set bits.
    allocated_blocks: usize,
}

impl BitmapAllocator<'static> {
    /// Creates an allocator that owns `size` bytes split into bitmap and blocks.
    ///
    /// # Errors
    ///
    /// `InvalidSize` if `block_size` is zero, `InvalidLayout` if the data
    /// region is not a whole number of blocks. Use
    /// [`BitmapAllocator::size_for`] to get a valid size.
    pub fn new(size: usize, block_size: usize) -> MemoryResult<Self> {
        Self::with_region(Region::owned(size), block_size)
    }
}

impl<'m> BitmapAllocator<'m> {
    /// Creates an allocator over caller-provided memory.
    ///
    /// # Errors
    ///
    /// Same as [`BitmapAllocator::new`].
    pub fn from_slice(memory: &'m mut [u8], block_size: usize) -> MemoryResult<Self> {
        Self::with_region(Region::borrowed(memory), block_size)
    }

    /// Creates an allocator over a region.
    ///
    /// # Errors
    ///
    /// Same as [`BitmapAllocator::new`].
    pub fn with_region(region: Region<'m>, block_size: usize) -> MemoryResult<Self> {
        if block_size == 0 {
            return Err(MemoryError::InvalidSize { size: 0, block_size });
        }

        // x * (1 + 8 * block_size) = size
        let size = region.len();
        let bitmap_size = size.div_ceil(1 + 8 * block_size);
        let data_size = size - bitmap_size;
        if data_size % block_size != 0 {
            return Err(MemoryError::InvalidLayout { data_size, block_size });
        }

        let mut allocator = Self {
            region,
            block_size,
            bitmap_size,
            num_blocks: data_size / block_size,
            current: 0,
            allocated_blocks: 0,
        };
        allocator.clear();
        Ok(allocator)
    }

    /// Total region size needed for `num_blocks` blocks of `block_size` bytes.
    #[must_use]
    pub const fn size_for(num_blocks: usize, block_size: usize) -> usize {
        num_blocks.div_ceil(8) + num_blocks * block_size
    }

    /// Bytes per block.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of data blocks.
    #[inline]
    #[must_use]
    pub const fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Bytes available for data.
    #[inline]
    #[must_use]
    pub const fn data_size(&self) -> usize {
        self.num_blocks * self.block_size
    }

    /// Block index where the next search starts.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.current
    }

    /// Returns `true` if block `index` is handed out.
    #[must_use]
    pub fn is_allocated(&self, index: usize) -> bool {
        index < self.num_blocks && get_bit(self.bitmap(), index)
    }

    /// Block index of the first block of a handle issued by this allocator.
    #[must_use]
    pub fn block_index(&self, allocation: &Allocation) -> Option<usize> {
        let relative = allocation.offset().checked_sub(self.bitmap_size)?;
        (relative % self.block_size == 0 && relative / self.block_size < self.num_blocks)
            .then_some(relative / self.block_size)
    }

    /// Returns `true` if every block covered by `allocation` is handed out.
    fn is_live(&self, allocation: &Allocation) -> bool {
        let Ok(count) = self.blocks_for(allocation.size()) else {
            return false;
        };
        self.block_index(allocation).is_some_and(|index| {
            index + count <= self.num_blocks && all_set(self.bitmap(), index, count)
        })
    }

    fn bitmap(&self) -> &[u8] {
        &self.region.as_bytes()[..self.bitmap_size]
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.region.as_bytes_mut()[..self.bitmap_size]
    }

    fn blocks_for(&self, size: usize) -> MemoryResult<usize> {
        if size == 0 || size % self.block_size != 0 {
            return Err(MemoryError::InvalidSize {
                size,
                block_size: self.block_size,
            });
        }
        Ok(size / self.block_size)
    }

    /// Next-fit scan for `count` consecutive clear bits.
    ///
    /// Searches `[cursor, num_blocks)` first, then wraps to `[0, cursor +
    /// count - 1)` so a run that starts before the cursor and reaches past
    /// it is still found. Runs do not span the wraparound point.
    fn find_run(&self, count: usize) -> Option<usize> {
        if count == 0 || count > self.num_blocks {
            return None;
        }

        let start = self.current;
        self.run_in(start, self.num_blocks, count)
            .or_else(|| self.run_in(0, (start + count - 1).min(self.num_blocks), count))
    }

    /// First run of `count` clear bits lying entirely inside `[from, to)`.
    fn run_in(&self, from: usize, to: usize, count: usize) -> Option<usize> {
        let bitmap = self.bitmap();
        let mut run = 0;
        for index in from..to {
            if get_bit(bitmap, index) {
                run = 0;
                continue;
            }
            run += 1;
            if run == count {
                return Some(index + 1 - count);
            }
        }
        None
    }
}

impl Allocator for BitmapAllocator<'_> {
    fn alloc_bytes(&mut self, size: usize, align: usize) -> MemoryResult<Allocation> {
        check_align(align)?;
        let count = self.blocks_for(size)?;

        let Some(first) = self.find_run(count) else {
            return Err(MemoryError::OutOfMemory {
                requested: size,
                available: (self.num_blocks - self.allocated_blocks) * self.block_size,
            });
        };

        let bitmap = self.bitmap_mut();
        for index in first..first + count {
            set_bit(bitmap, index, true);
        }
        self.allocated_blocks += count;
        self.current = (first + count) % self.num_blocks;

        Ok(Allocation::new(self.bitmap_size + first * self.block_size, size, 0))
    }

    fn free_bytes(&mut self, allocation: Allocation) -> MemoryResult<()> {
        let count = self.blocks_for(allocation.size())?;
        let index = self
            .block_index(&allocation)
            .filter(|index| index + count <= self.num_blocks)
            .ok_or(MemoryError::InvalidAllocation {
                offset: allocation.offset(),
            })?;

        if !all_set(self.bitmap(), index, count) {
            return Err(MemoryError::DoubleFree {
                offset: allocation.offset(),
            });
        }

        let bitmap = self.bitmap_mut();
        for i in index..index + count {
            set_bit(bitmap, i, false);
        }
        self.allocated_blocks -= count;

        // Bias the next search toward the freed run.
        self.current = self.current.min(index);
        Ok(())
    }

    fn clear(&mut self) {
        self.bitmap_mut().fill(0);
        self.current = 0;
        self.allocated_blocks = 0;
    }

    #[inline]
    fn used(&self) -> usize {
        self.allocated_blocks * self.block_size
    }

    #[inline]
    fn total(&self) -> usize {
        self.region.len()
    }

    fn memory(&self) -> &[u8] {
        self.region.as_bytes()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.region.as_bytes_mut()
    }

    fn bytes(&self, allocation: &Allocation) -> Option<&[u8]> {
        if !self.is_live(allocation) {
            return None;
        }
        self.region.as_bytes().get(allocation.range())
    }

    fn bytes_mut(&mut self, allocation: &Allocation) -> Option<&mut [u8]> {
        if !self.is_live(allocation) {
            return None;
        }
        self.region.as_bytes_mut().get_mut(allocation.range())
    }
}
