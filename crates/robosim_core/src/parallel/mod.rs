//! # Parallel Execution
//!
//! Worker threads for payload work over disjoint index ranges. Structural
//! changes to the entity store stay on the owning thread.

mod worker_pool;

pub use worker_pool::WorkerPool;
