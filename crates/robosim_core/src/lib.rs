//! # ROBOSIM Core
//!
//! Memory substrate and entity/component storage for the robot simulator:
//! - Fixed-region stack, pool and bitmap allocators
//! - A fixed-capacity ECS store with type-erased component registries
//! - A batch worker pool for payload work
//!
//! ## Architecture Rules
//!
//! 1. **Allocate once** - Regions, pools and the entity table are sized at start-up
//! 2. **Hard ceilings** - Exhaustion is a returned error, never a reallocation
//! 3. **Handles, not addresses** - Allocations and components are offsets and slots
//!
//! ## Example
//!
//! ```rust,ignore
//! use robosim_core::{EngineConfig, Manager, Transform};
//!
//! let mut manager = Manager::builder(EngineConfig::default())
//!     .with_builtin_components()
//!     .build()?;
//! let robot = manager.create_entity(None)?;
//! manager.add(robot, Transform::at([0.0, 0.0, 0.5]))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::cast_possible_truncation, clippy::module_name_repetitions)]

pub mod component;
pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod parallel;

pub use component::{
    stable_id, AttributeDescription, AttributeType, AttributeValue, Component,
    ComponentDescription, ComponentHandle, ComponentId, ComponentPool, ComponentRegistry,
    DataManager, EntityBlock, EntityId, Name, Registry, RigidBody, Transform, TypedRegistry,
};
pub use config::{
    AllocatorConfig, AllocatorKind, EcsConfig, EngineConfig, MemoryConfig, ParallelConfig,
};
pub use error::{
    ConfigError, ConfigResult, EcsError, EcsResult, MemoryError, MemoryResult, ParallelError,
    ParallelResult,
};
pub use manager::{Manager, ManagerBuilder};
pub use memory::{
    Allocation, Allocator, AllocatorExt, BitmapAllocator, MemoryManager, PoolAllocator, Region,
    StackAllocator,
};
pub use parallel::WorkerPool;
