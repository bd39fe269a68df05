//! # Allocator Property Tests
//!
//! Behavioural guarantees of the fixed-region allocators:
//!
//! 1. **No overlap**: live ranges never overlap and never leave the region
//! 2. **Pool reuse**: freed blocks come back LIFO
//! 3. **Fragmentation**: bitmap runs must be contiguous
//! 4. **Stack discipline**: rollback and reverse-order frees
//!
//! Run with: cargo test --package robosim_core --test allocator_properties

use robosim_core::{
    Allocation, Allocator, AllocatorExt, BitmapAllocator, MemoryError, PoolAllocator,
    StackAllocator,
};

/// Small deterministic generator so runs are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> usize {
        (self.next() % n) as usize
    }
}

fn assert_disjoint(live: &[Allocation], total: usize) {
    for (i, a) in live.iter().enumerate() {
        assert!(a.end() <= total, "{a:?} leaves the region of {total} bytes");
        for b in &live[i + 1..] {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
}

// ============================================================================
// NO OVERLAP
// ============================================================================

#[test]
fn pool_live_blocks_never_overlap() {
    let mut rng = Lcg(7);
    let mut pool = PoolAllocator::new(32, 24).unwrap();
    let mut live = Vec::new();

    for _ in 0..2_000 {
        if rng.below(3) < 2 {
            if let Ok(block) = pool.alloc() {
                live.push(block);
            }
        } else if !live.is_empty() {
            let block = live.swap_remove(rng.below(live.len() as u64));
            pool.free(block).unwrap();
        }
        assert_disjoint(&live, pool.total());
        assert_eq!(pool.allocated_count(), live.len());
    }
}

#[test]
fn bitmap_live_runs_never_overlap() {
    let mut rng = Lcg(11);
    let block_size = 16;
    let size = BitmapAllocator::size_for(64, block_size);
    let mut bitmap = BitmapAllocator::new(size, block_size).unwrap();
    let mut live = Vec::new();

    for _ in 0..2_000 {
        if rng.below(3) < 2 {
            let blocks = 1 + rng.below(4);
            match bitmap.alloc_bytes(blocks * block_size, 8) {
                Ok(a) => live.push(a),
                Err(err) => assert!(matches!(err, MemoryError::OutOfMemory { .. })),
            }
        } else if !live.is_empty() {
            let a = live.swap_remove(rng.below(live.len() as u64));
            bitmap.free_bytes(a).unwrap();
        }
        assert_disjoint(&live, bitmap.total());
        assert_eq!(bitmap.used(), live.iter().map(Allocation::size).sum::<usize>());
    }
}

#[test]
fn stack_live_allocations_never_overlap() {
    let mut rng = Lcg(3);
    let mut stack = StackAllocator::new(4096);
    let mut live: Vec<Allocation> = Vec::new();

    for _ in 0..2_000 {
        if rng.below(3) < 2 {
            let align = 1 << rng.below(4);
            if let Ok(a) = stack.alloc_bytes(1 + rng.below(64), align) {
                assert_eq!(a.offset() % align, 0);
                live.push(a);
            }
        } else if let Some(top) = live.pop() {
            assert!(stack.free(top));
        }
        assert_disjoint(&live, stack.total());
    }
}

// ============================================================================
// POOL REUSE
// ============================================================================

#[test]
fn pool_of_two_reuses_lifo() {
    let mut pool = PoolAllocator::new(2, 16).unwrap();
    let p0 = pool.alloc().unwrap();
    let p1 = pool.alloc().unwrap();
    assert_ne!(p0, p1);
    assert!(matches!(pool.alloc(), Err(MemoryError::OutOfMemory { .. })));

    pool.free(p0).unwrap();
    assert_eq!(pool.alloc().unwrap(), p0);
}

// ============================================================================
// FRAGMENTATION
// ============================================================================

#[test]
fn bitmap_rejects_non_contiguous_run() {
    let block_size = 32;
    let size = BitmapAllocator::size_for(4, block_size);
    let mut bitmap = BitmapAllocator::new(size, block_size).unwrap();

    let a = bitmap.alloc_bytes(block_size, 8).unwrap();
    let b = bitmap.alloc_bytes(block_size, 8).unwrap();
    let c = bitmap.alloc_bytes(block_size, 8).unwrap();
    assert!(!a.overlaps(&c));
    bitmap.free_bytes(b).unwrap();

    // Blocks 1 and 3 are free, but not adjacent.
    assert_eq!(bitmap.data_size() - bitmap.used(), 2 * block_size);
    assert!(matches!(
        bitmap.alloc_bytes(2 * block_size, 8),
        Err(MemoryError::OutOfMemory { .. })
    ));

    // A single block still fits, at the freed position.
    assert_eq!(bitmap.alloc_bytes(block_size, 8).unwrap(), b);
}

// ============================================================================
// STACK DISCIPLINE
// ============================================================================

#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Obj {
    a: [u32; 8],
    b: f64,
}

#[test]
fn stack_rollback_returns_same_address() {
    let mut stack = StackAllocator::new(1024);
    let _header = stack.alloc::<u16>(1).unwrap();
    let m = stack.marker();
    let first = stack.alloc::<Obj>(1).unwrap();
    stack.rollback(m);
    let second = stack.alloc::<Obj>(1).unwrap();
    assert_eq!(first.offset(), second.offset());
}

#[test]
fn stack_non_lifo_free_is_not_reclaimed() {
    let mut stack = StackAllocator::new(1024);
    let i0 = stack.alloc::<i32>(1).unwrap();
    let c0 = stack.alloc::<u8>(1).unwrap();
    let i1 = stack.alloc::<i32>(1).unwrap();
    let full = stack.used();

    assert!(stack.free(i1));
    let after_i1 = stack.used();
    assert!(after_i1 < full);

    assert!(matches!(
        stack.free_bytes(i0),
        Err(MemoryError::StackOrderViolation { .. })
    ));
    assert_eq!(stack.used(), after_i1);

    assert!(stack.free(c0));
    assert!(stack.used() < after_i1);
    assert_eq!(stack.used(), i0.end());
}
