//! # Memory Management
//!
//! Fixed-region allocators for zero-allocation simulation.
//!
//! ## Design Philosophy
//!
//! All memory is allocated once at startup. After that:
//! - No heap allocations
//! - No garbage collection
//! - Hard capacity ceilings; exhaustion is a returned error
//!
//! Allocators hand out [`Allocation`] handles (offsets into their region)
//! instead of raw pointers. Typed views go through `bytemuck`.

mod bitmap;
pub(crate) mod bits;
mod manager;
mod pool;
mod region;
mod stack;

pub use bitmap::BitmapAllocator;
pub use manager::{BoxedAllocator, MemoryManager};
pub use pool::PoolAllocator;
pub use region::{Allocation, Allocator, AllocatorExt, Region};
pub use stack::{Marker, StackAllocator};
