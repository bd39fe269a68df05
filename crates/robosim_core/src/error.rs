//! # Error Types
//!
//! All errors that can occur in the memory substrate, the entity/component
//! store, configuration loading and the worker pool.
//!
//! Allocation failures are always returned, never raised as panics.

use thiserror::Error;

use crate::component::{ComponentId, EntityId};

/// Errors that can occur in the allocators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The allocator has no (contiguous) room left for the request.
    #[error("out of memory: requested {requested} bytes, {available} bytes free")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
        /// Bytes still free in the region (may be fragmented).
        available: usize,
    },

    /// The requested size does not fit the allocator's block discipline.
    #[error("invalid size {size}: must be a non-zero multiple of block size {block_size}")]
    InvalidSize {
        /// Bytes requested.
        size: usize,
        /// Block size of the allocator.
        block_size: usize,
    },

    /// Alignment must be a non-zero power of two.
    #[error("invalid alignment: {0}")]
    InvalidAlignment(usize),

    /// The allocation handle does not belong to this allocator.
    #[error("allocation at offset {offset} does not belong to this region")]
    InvalidAllocation {
        /// Offset carried by the handle.
        offset: usize,
    },

    /// The block was already free.
    #[error("double free at offset {offset}")]
    DoubleFree {
        /// Offset carried by the handle.
        offset: usize,
    },

    /// A stack allocation was freed while allocations above it are live.
    #[error("stack allocation at offset {offset} is below the top (marker {marker})")]
    StackOrderViolation {
        /// Offset of the allocation that was freed.
        offset: usize,
        /// Current top of the stack.
        marker: usize,
    },

    /// Region cannot be split into bitmap and whole blocks.
    #[error("invalid layout: {data_size} data bytes are not a multiple of block size {block_size}")]
    InvalidLayout {
        /// Bytes left for data after the bitmap.
        data_size: usize,
        /// Block size of the allocator.
        block_size: usize,
    },
}

/// Result type for allocator operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Errors that can occur in the entity/component store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// Entity id is out of range or does not name a live entity.
    #[error("invalid entity: {0}")]
    InvalidEntity(EntityId),

    /// Every entity slot is occupied.
    #[error("entity table full: capacity {capacity}")]
    EntityTableFull {
        /// Entity table capacity.
        capacity: usize,
    },

    /// Component id is out of range or not registered.
    #[error("invalid component: {0}")]
    InvalidComponent(ComponentId),

    /// The component type was never registered.
    #[error("component type not registered: {0}")]
    UnregisteredComponent(&'static str),

    /// The registry is full.
    #[error("too many component types: maximum is {max}")]
    TooManyComponents {
        /// Maximum number of registered component types.
        max: usize,
    },

    /// The pool for this component type is at capacity.
    #[error("component pool exhausted for {component}: capacity {capacity}")]
    PoolExhausted {
        /// Component type name.
        component: String,
        /// Pool capacity in instances.
        capacity: u32,
    },

    /// Creating the pool would exceed the component memory budget.
    #[error("component memory budget exceeded: need {requested} bytes, {available} bytes left")]
    ComponentBudgetExceeded {
        /// Bytes needed by the new pool.
        requested: usize,
        /// Bytes left in the budget.
        available: usize,
    },

    /// Stored bytes cannot be viewed as the requested type.
    #[error("component bytes do not match type {0}")]
    TypeMismatch(&'static str),

    /// Underlying allocator error.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Configuration rejected while building the store.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Worker pool could not be started.
    #[error(transparent)]
    Parallel(#[from] ParallelError),

    /// Serialization hook failed.
    #[error("component i/o failed: {0}")]
    Io(String),
}

/// Result type for entity/component operations.
pub type EcsResult<T> = Result<T, EcsError>;

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(String),

    /// The configuration is not valid TOML or has wrong types.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// The configuration parsed but violates a constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised by the worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParallelError {
    /// More workers were requested than the machine supports.
    #[error("requested {requested} workers, maximum is {max}")]
    TooManyWorkers {
        /// Requested worker count.
        requested: usize,
        /// Maximum worker count.
        max: usize,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

/// Result type for worker pool operations.
pub type ParallelResult<T> = Result<T, ParallelError>;
