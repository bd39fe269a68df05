//! # Manager
//!
//! Owned context tying configuration, the named allocators, the entity
//! store and the worker pool together behind one flat API. There is no global instance; hosts
//! create a [`Manager`] at start-up and pass it where it is needed.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut manager = Manager::builder(EngineConfig::default())
//!     .register::<Transform>()
//!     .register::<RigidBody>()
//!     .build()?;
//!
//! let robot = manager.create_entity(None)?;
//! manager.add(robot, Transform::at([0.0, 0.0, 1.0]))?;
//! ```

use std::io::{Read, Write};

use crate::component::{
    Component, ComponentHandle, ComponentId, ComponentRegistry, DataManager, EntityId, Name,
    Registry, RigidBody, Transform,
};
use crate::config::EngineConfig;
use crate::error::{EcsError, EcsResult};
use crate::memory::{Allocator, MemoryManager};
use crate::parallel::WorkerPool;

type Registration = fn(&mut ComponentRegistry) -> EcsResult<ComponentId>;

/// Collects component types before the store is built.
pub struct ManagerBuilder {
    config: EngineConfig,
    registrations: Vec<Registration>,
}

impl ManagerBuilder {
    /// Adds component type `T`.
    #[must_use]
    pub fn register<T: Component>(mut self) -> Self {
        self.registrations.push(ComponentRegistry::register::<T>);
        self
    }

    /// Adds the built-in [`Transform`], [`RigidBody`] and [`Name`] components.
    #[must_use]
    pub fn with_builtin_components(self) -> Self {
        self.register::<Transform>().register::<RigidBody>().register::<Name>()
    }

    /// Validates the configuration, builds the allocators, the store and
    /// the worker pool.
    ///
    /// Registered types get indices ordered by their stable id, so the
    /// same set of types always maps to the same indices.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `Memory` if an allocator
    /// cannot be built, `Parallel` if the workers cannot start, or any
    /// registration error.
    pub fn build(self) -> EcsResult<Manager> {
        self.config.validate()?;

        let mut registry = ComponentRegistry::new(self.config.ecs.max_components);
        for register in &self.registrations {
            register(&mut registry)?;
        }
        registry.sort_by_stable_id();

        let memory = MemoryManager::from_config(&self.config.memory.allocators)?;
        let data = DataManager::with_registry(&self.config, registry);
        let workers = WorkerPool::from_config(&self.config.parallel)?;

        tracing::info!(
            "manager built: {} component types, {} allocators, {} workers",
            data.registry().len(),
            self.config.memory.allocators.len(),
            workers.num_workers()
        );

        Ok(Manager {
            config: self.config,
            memory,
            data,
            workers,
        })
    }
}

/// Process context: configuration, allocators, entity store and workers.
#[derive(Debug)]
pub struct Manager {
    config: EngineConfig,
    memory: MemoryManager,
    data: DataManager,
    workers: WorkerPool,
}

impl Manager {
    /// Starts building a manager from `config`.
    #[must_use]
    pub fn builder(config: EngineConfig) -> ManagerBuilder {
        ManagerBuilder {
            config,
            registrations: Vec::new(),
        }
    }

    /// Configuration the manager was built from.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Entity store.
    #[must_use]
    pub const fn data(&self) -> &DataManager {
        &self.data
    }

    /// Entity store, mutably.
    pub fn data_mut(&mut self) -> &mut DataManager {
        &mut self.data
    }

    /// Named allocator table.
    #[must_use]
    pub const fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Worker pool sized by the `[parallel]` section.
    #[must_use]
    pub const fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Worker pool, mutably (for resizing).
    pub fn workers_mut(&mut self) -> &mut WorkerPool {
        &mut self.workers
    }

    /// Allocator `name`.
    #[must_use]
    pub fn allocator(&self, name: &str) -> Option<&(dyn Allocator + Send + 'static)> {
        self.memory.get(name)
    }

    /// Allocator `name`, mutably.
    pub fn allocator_mut(&mut self, name: &str) -> Option<&mut (dyn Allocator + Send + 'static)> {
        self.memory.get_mut(name)
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Registers a component type after start-up. It gets the next free index.
    ///
    /// # Errors
    ///
    /// As [`ComponentRegistry::register`].
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        self.data.register::<T>()
    }

    /// Registered component types in index order.
    pub fn registries(&self) -> impl Iterator<Item = &dyn Registry> {
        self.data.registry().iter()
    }

    /// Registry of `cid`.
    #[must_use]
    pub fn registry(&self, cid: ComponentId) -> Option<&dyn Registry> {
        self.data.registry().get(cid)
    }

    /// Index of component type `T`.
    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.data.registry().id_of::<T>()
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// See [`DataManager::create_entity`].
    ///
    /// # Errors
    ///
    /// `EntityTableFull`.
    pub fn create_entity(&mut self, requested: Option<EntityId>) -> EcsResult<EntityId> {
        self.data.create_entity(requested)
    }

    /// See [`DataManager::destroy_entity`].
    ///
    /// # Errors
    ///
    /// `InvalidEntity`.
    pub fn destroy_entity(&mut self, eid: EntityId) -> EcsResult<()> {
        self.data.destroy_entity(eid)
    }

    /// Whether `eid` names a live entity.
    #[must_use]
    pub fn entity_exists(&self, eid: EntityId) -> bool {
        self.data.entity_exists(eid)
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.data.entities()
    }

    /// See [`DataManager::copy_entity`].
    ///
    /// # Errors
    ///
    /// As [`DataManager::copy_entity`].
    pub fn copy_entity(
        &mut self,
        src: EntityId,
        requested: Option<EntityId>,
    ) -> EcsResult<EntityId> {
        self.data.copy_entity(src, requested)
    }

    /// Destroys every entity and releases every component pool.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// See [`DataManager::add_component`].
    ///
    /// # Errors
    ///
    /// As [`DataManager::add_component`].
    pub fn add_component(&mut self, eid: EntityId, cid: ComponentId) -> EcsResult<ComponentHandle> {
        self.data.add_component(eid, cid)
    }

    /// Handle of `eid`'s `cid` component.
    #[must_use]
    pub fn get_component(&self, eid: EntityId, cid: ComponentId) -> Option<ComponentHandle> {
        self.data.get_component(eid, cid)
    }

    /// See [`DataManager::remove_component`].
    ///
    /// # Errors
    ///
    /// `InvalidEntity` or `InvalidComponent`.
    pub fn remove_component(&mut self, eid: EntityId, cid: ComponentId) -> EcsResult<bool> {
        self.data.remove_component(eid, cid)
    }

    /// Component types attached to `eid`.
    ///
    /// # Errors
    ///
    /// `InvalidEntity`.
    pub fn components(&self, eid: EntityId) -> EcsResult<Vec<ComponentId>> {
        self.data.components(eid)
    }

    /// Bytes of the component behind `handle`.
    #[must_use]
    pub fn resolve(&self, handle: ComponentHandle) -> Option<&[u8]> {
        self.data.resolve(handle)
    }

    /// Mutable bytes of the component behind `handle`.
    pub fn resolve_mut(&mut self, handle: ComponentHandle) -> Option<&mut [u8]> {
        self.data.resolve_mut(handle)
    }

    /// Attaches `value` as `eid`'s `T` component.
    ///
    /// # Errors
    ///
    /// As [`DataManager::add`].
    pub fn add<T: Component>(&mut self, eid: EntityId, value: T) -> EcsResult<ComponentHandle> {
        self.data.add(eid, value)
    }

    /// `eid`'s `T` component.
    #[must_use]
    pub fn get<T: Component>(&self, eid: EntityId) -> Option<&T> {
        self.data.get(eid)
    }

    /// `eid`'s `T` component, mutably.
    pub fn get_mut<T: Component>(&mut self, eid: EntityId) -> Option<&mut T> {
        self.data.get_mut(eid)
    }

    /// Detaches `eid`'s `T` component.
    ///
    /// # Errors
    ///
    /// As [`DataManager::remove`].
    pub fn remove<T: Component>(&mut self, eid: EntityId) -> EcsResult<bool> {
        self.data.remove::<T>(eid)
    }

    // =========================================================================
    // Serialization hooks
    // =========================================================================

    /// Writes `eid`'s `cid` component through its registry.
    ///
    /// # Errors
    ///
    /// `InvalidComponent` if the entity lacks it, `Io` on write failure.
    pub fn serialize_component(
        &self,
        eid: EntityId,
        cid: ComponentId,
        writer: &mut dyn Write,
    ) -> EcsResult<()> {
        let registry = self.registry(cid).ok_or(EcsError::InvalidComponent(cid))?;
        let bytes = self
            .data
            .get_component(eid, cid)
            .and_then(|handle| self.data.resolve(handle))
            .ok_or(EcsError::InvalidComponent(cid))?;
        registry.serialize(bytes, writer)
    }

    /// Reads `eid`'s `cid` component through its registry, adding the
    /// component first if the entity lacks it.
    ///
    /// On a read failure the entity is left as it was: a component added by
    /// this call is removed again and an existing one keeps its value.
    ///
    /// # Errors
    ///
    /// As [`Self::add_component`], plus `Io` on read failure.
    pub fn deserialize_component(
        &mut self,
        eid: EntityId,
        cid: ComponentId,
        reader: &mut dyn Read,
    ) -> EcsResult<()> {
        let attached = self.data.get_component(eid, cid).is_some();
        let handle = self.data.add_component(eid, cid)?;

        let read = self.read_component(handle, reader);
        if read.is_err() && !attached {
            self.data.remove_component(eid, cid)?;
        }
        read
    }

    fn read_component(&mut self, handle: ComponentHandle, reader: &mut dyn Read) -> EcsResult<()> {
        let cid = handle.component;
        let mut bytes = self
            .data
            .resolve(handle)
            .ok_or(EcsError::InvalidComponent(cid))?
            .to_vec();

        let registry = self.registry(cid).ok_or(EcsError::InvalidComponent(cid))?;
        registry.deserialize(reader, &mut bytes)?;

        let slot = self.data.resolve_mut(handle).ok_or(EcsError::InvalidComponent(cid))?;
        slot.copy_from_slice(&bytes);
        Ok(())
    }
}
