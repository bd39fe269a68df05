//! # Component Pool
//!
//! Pre-allocated storage for one component type: a liveness bitmap
//! followed by packed component slots, in a single buffer.
//!
//! ```text
//! [bitmap: ceil(n / 8) rounded up to 8 bytes][slot 0][slot 1]...[slot n-1]
//! ```
//!
//! Bit `i` is set exactly when slot `i` holds a live component. Allocation
//! is next-fit from a cursor; freeing pulls the cursor back down so low
//! slots are reused first.

use crate::component::ComponentId;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::bits::{count_set, get_bit, set_bit};
use crate::memory::Region;

/// Bitmap and slots for a single component type.
#[derive(Debug)]
pub struct ComponentPool {
    component: ComponentId,
    region: Region<'static>,
    bitmap_size: usize,
    component_size: usize,
    stride: usize,
    num_components: u32,
    current: u32,
    live: u32,
}

impl ComponentPool {
    /// Bytes of bitmap for `num_components` slots, padded to 8 bytes.
    #[inline]
    #[must_use]
    pub const fn calc_bitmap_size(num_components: u32) -> usize {
        (num_components as usize).div_ceil(8).next_multiple_of(8)
    }

    /// Total bytes of a pool of `num_components` slots of `component_size` bytes.
    #[inline]
    #[must_use]
    pub const fn calc_pool_size(num_components: u32, component_size: usize) -> usize {
        let stride = if component_size == 0 { 1 } else { component_size };
        Self::calc_bitmap_size(num_components) + stride * num_components as usize
    }

    /// Creates an empty pool of `num_components` slots.
    ///
    /// # Arguments
    ///
    /// * `component` - Component type stored in the pool
    /// * `component_size` - Bytes per component (zero-sized types take one byte)
    /// * `num_components` - Slot count, must be non-zero
    ///
    /// # Errors
    ///
    /// `InvalidSize` if `num_components` is zero.
    pub fn new(
        component: ComponentId,
        component_size: usize,
        num_components: u32,
    ) -> MemoryResult<Self> {
        if num_components == 0 {
            return Err(MemoryError::InvalidSize {
                size: 0,
                block_size: component_size,
            });
        }

        Ok(Self {
            component,
            region: Region::owned(Self::calc_pool_size(num_components, component_size)),
            bitmap_size: Self::calc_bitmap_size(num_components),
            component_size,
            stride: component_size.max(1),
            num_components,
            current: 0,
            live: 0,
        })
    }

    /// Component type stored in this pool.
    #[inline]
    #[must_use]
    pub const fn component(&self) -> ComponentId {
        self.component
    }

    /// Slot count.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.num_components
    }

    /// Bytes per component.
    #[inline]
    #[must_use]
    pub const fn component_size(&self) -> usize {
        self.component_size
    }

    /// Total bytes of the pool buffer.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.region.len()
    }

    /// Number of live components.
    #[inline]
    #[must_use]
    pub const fn live(&self) -> u32 {
        self.live
    }

    /// Next slot the search starts from.
    #[inline]
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.current
    }

    /// Whether slot `slot` is live.
    #[inline]
    #[must_use]
    pub fn is_allocated(&self, slot: u32) -> bool {
        slot < self.num_components && get_bit(self.bitmap(), slot as usize)
    }

    fn bitmap(&self) -> &[u8] {
        &self.region.as_bytes()[..self.bitmap_size]
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.region.as_bytes_mut()[..self.bitmap_size]
    }

    fn slot_range(&self, slot: u32) -> std::ops::Range<usize> {
        let start = self.bitmap_size + slot as usize * self.stride;
        start..start + self.component_size
    }

    /// Claims the first free slot at or after the cursor, wrapping once.
    ///
    /// The slot's bytes are left as they were; callers write the initial
    /// value. Returns `None` when every slot is live.
    pub fn alloc(&mut self) -> Option<u32> {
        let start = self.current;
        loop {
            let slot = self.current;
            self.current = (self.current + 1) % self.num_components;

            if !get_bit(self.bitmap(), slot as usize) {
                set_bit(self.bitmap_mut(), slot as usize, true);
                self.live += 1;
                return Some(slot);
            }
            if self.current == start {
                return None;
            }
        }
    }

    /// Returns `slot` to the pool.
    ///
    /// # Errors
    ///
    /// `InvalidAllocation` if `slot` is out of range, `DoubleFree` if it
    /// is not live.
    pub fn free(&mut self, slot: u32) -> MemoryResult<()> {
        let offset = self.slot_range(slot).start;
        if slot >= self.num_components {
            return Err(MemoryError::InvalidAllocation { offset });
        }
        if !get_bit(self.bitmap(), slot as usize) {
            return Err(MemoryError::DoubleFree { offset });
        }

        set_bit(self.bitmap_mut(), slot as usize, false);
        self.live -= 1;
        self.current = self.current.min(slot);
        Ok(())
    }

    /// Bytes of a live slot.
    #[inline]
    #[must_use]
    pub fn get(&self, slot: u32) -> Option<&[u8]> {
        if !self.is_allocated(slot) {
            return None;
        }
        let range = self.slot_range(slot);
        Some(&self.region.as_bytes()[range])
    }

    /// Mutable bytes of a live slot.
    #[inline]
    pub fn get_mut(&mut self, slot: u32) -> Option<&mut [u8]> {
        if !self.is_allocated(slot) {
            return None;
        }
        let range = self.slot_range(slot);
        Some(&mut self.region.as_bytes_mut()[range])
    }

    /// Live slots in ascending order.
    pub fn iter_live(&self) -> impl Iterator<Item = u32> + '_ {
        let bitmap = self.bitmap();
        (0..self.num_components).filter(move |slot| get_bit(bitmap, *slot as usize))
    }

    /// Frees every slot and zeroes the buffer.
    pub fn reset(&mut self) {
        self.region.zero();
        self.current = 0;
        self.live = 0;
    }

    /// Recounts live bits; equals [`Self::live`] unless the pool is corrupt.
    #[must_use]
    pub fn count_live(&self) -> u32 {
        count_set(self.bitmap(), self.num_components as usize) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: u32) -> ComponentPool {
        ComponentPool::new(ComponentId::new(0), 8, n).unwrap()
    }

    #[test]
    fn test_sizes() {
        assert_eq!(ComponentPool::calc_bitmap_size(1), 8);
        assert_eq!(ComponentPool::calc_bitmap_size(64), 8);
        assert_eq!(ComponentPool::calc_bitmap_size(65), 16);
        assert_eq!(ComponentPool::calc_pool_size(4, 16), 8 + 64);
        assert_eq!(ComponentPool::calc_pool_size(4, 0), 8 + 4);
        assert_eq!(pool(100).size(), 16 + 800);
    }

    #[test]
    fn test_alloc_until_full() {
        let mut pool = pool(3);
        assert_eq!(pool.alloc(), Some(0));
        assert_eq!(pool.alloc(), Some(1));
        assert_eq!(pool.alloc(), Some(2));
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.live(), 3);
        assert_eq!(pool.count_live(), 3);
    }

    #[test]
    fn test_free_pulls_cursor_down() {
        let mut pool = pool(4);
        for _ in 0..4 {
            pool.alloc().unwrap();
        }
        pool.free(2).unwrap();
        pool.free(1).unwrap();
        assert_eq!(pool.cursor(), 0);
        assert_eq!(pool.alloc(), Some(1));
        assert_eq!(pool.alloc(), Some(2));
        assert_eq!(pool.alloc(), None);
    }

    #[test]
    fn test_double_free_and_out_of_range() {
        let mut pool = pool(2);
        let slot = pool.alloc().unwrap();
        pool.free(slot).unwrap();
        assert!(matches!(pool.free(slot), Err(MemoryError::DoubleFree { .. })));
        assert!(matches!(pool.free(5), Err(MemoryError::InvalidAllocation { .. })));
    }

    #[test]
    fn test_slot_access() {
        let mut pool = pool(2);
        assert!(pool.get(0).is_none());

        let slot = pool.alloc().unwrap();
        pool.get_mut(slot).unwrap().copy_from_slice(&42u64.to_ne_bytes());
        assert_eq!(pool.get(slot).unwrap(), &42u64.to_ne_bytes());

        let other = pool.alloc().unwrap();
        assert_eq!(pool.iter_live().collect::<Vec<_>>(), vec![slot, other]);

        pool.free(slot).unwrap();
        assert!(pool.get(slot).is_none());
    }

    #[test]
    fn test_reset() {
        let mut pool = pool(2);
        pool.alloc();
        pool.alloc();
        pool.reset();
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.alloc(), Some(0));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(ComponentPool::new(ComponentId::new(0), 8, 0).is_err());
    }
}
