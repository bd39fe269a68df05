//! # Entity Component Storage
//!
//! A fixed-capacity ECS store for the simulator.
//!
//! ## Design Philosophy
//!
//! - The entity table and each component pool are allocated once
//! - Entity ids are plain table indices, reused after destruction
//! - Components are referenced by [`ComponentHandle`] (type + slot), never by address
//! - Component types are described through the type-erased [`Registry`]

mod attribute;
#[allow(clippy::module_inception)]
mod component;
mod data_manager;
mod entity;
mod pool;
mod registry;

pub use attribute::{AttributeDescription, AttributeType, AttributeValue, ComponentDescription};
pub use component::{Component, Name, RigidBody, Transform};
pub use data_manager::DataManager;
pub use entity::{ComponentHandle, ComponentId, EntityBlock, EntityId};
pub use pool::ComponentPool;
pub use registry::{stable_id, ComponentRegistry, Registry, TypedRegistry};
