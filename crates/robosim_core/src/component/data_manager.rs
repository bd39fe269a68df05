//! # Data Manager
//!
//! Fixed-capacity entity table plus one [`ComponentPool`] per registered
//! component type.
//!
//! ## Layout
//!
//! - `entities[eid].slot(cid)` is the pool slot of the entity's `cid`
//!   component, so lookups are two array reads and no hashing
//! - `pools[cid]` is created on the first `add_component` for `cid`,
//!   sized from the type's `max_instances`, and charged against the
//!   component memory budget
//!
//! Structural operations take `&mut self`; the borrow checker serializes
//! them on the owning thread.

use bytemuck::Pod;

use super::component::Component;
use super::entity::{ComponentHandle, ComponentId, EntityBlock, EntityId};
use super::pool::ComponentPool;
use super::registry::ComponentRegistry;
use crate::config::EngineConfig;
use crate::error::{EcsError, EcsResult};

/// Owns entity and component storage.
#[derive(Debug)]
pub struct DataManager {
    registry: ComponentRegistry,
    entities: Box<[EntityBlock]>,
    pools: Vec<Option<ComponentPool>>,
    next_entity: u32,
    entity_count: u32,
    config: EngineConfig,
    used_memory: usize,
}

impl DataManager {
    /// Creates an empty store with an empty registry.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_registry(config, ComponentRegistry::new(config.ecs.max_components))
    }

    /// Creates an empty store around an already populated registry.
    ///
    /// Pool capacities of every registered type are resolved from `config`.
    #[must_use]
    pub fn with_registry(config: &EngineConfig, mut registry: ComponentRegistry) -> Self {
        let width = config.ecs.max_components.max(registry.max_components());

        let resolved: Vec<(ComponentId, u32)> = registry
            .iter()
            .map(|r| (r.index(), config.max_instances_for(r.name(), r.description().max_instances)))
            .collect();
        for (id, capacity) in resolved {
            // `id` was just read from the registry.
            let _ = registry.set_max_instances(id, capacity);
        }

        tracing::info!(
            "data manager ready: {} entities, {} component types, {} byte budget",
            config.ecs.max_entities,
            width,
            config.ecs.component_memory
        );

        Self {
            registry,
            entities: (0..config.ecs.max_entities).map(|_| EntityBlock::new(width)).collect(),
            pools: (0..width).map(|_| None).collect(),
            next_entity: 0,
            entity_count: 0,
            config: config.clone(),
            used_memory: 0,
        }
    }

    /// Registers `T` and resolves its pool capacity.
    ///
    /// # Errors
    ///
    /// As [`ComponentRegistry::register`].
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        if let Some(id) = self.registry.id_of::<T>() {
            return Ok(id);
        }
        let id = self.registry.register::<T>()?;
        let capacity = self.config.max_instances_for(T::NAME, T::description().max_instances);
        self.registry.set_max_instances(id, capacity)?;
        Ok(id)
    }

    /// Registered component types.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Entity table capacity.
    #[inline]
    #[must_use]
    pub fn max_entities(&self) -> u32 {
        self.entities.len() as u32
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub const fn entity_count(&self) -> u32 {
        self.entity_count
    }

    /// Bytes of component memory held by pools.
    #[inline]
    #[must_use]
    pub const fn used_memory(&self) -> usize {
        self.used_memory
    }

    /// Pool of `cid`, if it has been created.
    #[must_use]
    pub fn pool(&self, cid: ComponentId) -> Option<&ComponentPool> {
        self.pools.get(cid.index() as usize).and_then(Option::as_ref)
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    /// Creates an entity.
    ///
    /// A `requested` id is used when it is in range and free. Otherwise the
    /// table is scanned from the cursor, wrapping once, for the first free
    /// slot. The cursor then moves just past the created id.
    ///
    /// # Errors
    ///
    /// `EntityTableFull` if every slot is occupied.
    pub fn create_entity(&mut self, requested: Option<EntityId>) -> EcsResult<EntityId> {
        let capacity = self.entities.len();

        let index = match requested {
            Some(eid)
                if (eid.index() as usize) < capacity
                    && !self.entities[eid.index() as usize].exists() =>
            {
                Some(eid.index() as usize)
            }
            _ => {
                let start = self.next_entity as usize;
                (0..capacity)
                    .map(|i| (start + i) % capacity)
                    .find(|i| !self.entities[*i].exists())
            }
        };

        let Some(index) = index else {
            tracing::warn!("entity table full ({capacity} entities)");
            return Err(EcsError::EntityTableFull { capacity });
        };

        let block = &mut self.entities[index];
        block.reset();
        block.set_exists(true);
        self.entity_count += 1;
        self.next_entity = ((index + 1) % capacity) as u32;
        Ok(EntityId::new(index as u32))
    }

    /// Destroys an entity, returning each of its components to its pool.
    ///
    /// # Errors
    ///
    /// `InvalidEntity` if `eid` is out of range or not live.
    pub fn destroy_entity(&mut self, eid: EntityId) -> EcsResult<()> {
        let block = self.block_mut(eid)?;
        let handles: Vec<ComponentHandle> = block.handles().collect();
        block.reset();
        self.entity_count -= 1;

        for handle in handles {
            self.release(handle)?;
        }
        Ok(())
    }

    /// Whether `eid` names a live entity.
    #[inline]
    #[must_use]
    pub fn entity_exists(&self, eid: EntityId) -> bool {
        self.entities
            .get(eid.index() as usize)
            .is_some_and(EntityBlock::exists)
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, block)| block.exists())
            .map(|(i, _)| EntityId::new(i as u32))
    }

    /// Creates a new entity carrying a copy of every component of `src`.
    ///
    /// # Errors
    ///
    /// `InvalidEntity` if `src` is not live, `EntityTableFull`, or
    /// `PoolExhausted` (in which case nothing is created).
    pub fn copy_entity(
        &mut self,
        src: EntityId,
        requested: Option<EntityId>,
    ) -> EcsResult<EntityId> {
        let handles: Vec<ComponentHandle> = self.block(src)?.handles().collect();
        let dst = self.create_entity(requested)?;

        for handle in handles {
            let copied = self.add_component(dst, handle.component).and_then(|target| {
                let bytes = self
                    .resolve(handle)
                    .ok_or(EcsError::InvalidComponent(handle.component))?
                    .to_vec();
                if let Some(out) = self.resolve_mut(target) {
                    out.copy_from_slice(&bytes);
                }
                Ok(())
            });

            if let Err(err) = copied {
                self.destroy_entity(dst)?;
                return Err(err);
            }
        }
        Ok(dst)
    }

    /// Destroys every entity and drops every pool.
    pub fn clear(&mut self) {
        for block in self.entities.iter_mut() {
            block.reset();
        }
        for pool in &mut self.pools {
            *pool = None;
        }
        self.next_entity = 0;
        self.entity_count = 0;
        self.used_memory = 0;
        tracing::debug!("data manager cleared");
    }

    // ---------------------------------------------------------------------
    // Components
    // ---------------------------------------------------------------------

    /// Attaches a default-constructed `cid` component to `eid`.
    ///
    /// If the entity already has one, its existing handle is returned.
    ///
    /// # Errors
    ///
    /// `InvalidEntity`, `InvalidComponent`, `ComponentBudgetExceeded` when
    /// the pool cannot be created, or `PoolExhausted` when it is full.
    pub fn add_component(&mut self, eid: EntityId, cid: ComponentId) -> EcsResult<ComponentHandle> {
        if let Some(slot) = self.block(eid)?.slot(cid) {
            return Ok(ComponentHandle { component: cid, slot });
        }
        let (name, size, capacity) = {
            let registry = self.registry.get(cid).ok_or(EcsError::InvalidComponent(cid))?;
            let capacity = registry
                .description()
                .max_instances
                .unwrap_or(self.config.ecs.default_max_instances);
            (registry.name(), registry.size_of(), capacity)
        };

        let pool = self.pool_or_create(cid, size, capacity)?;
        let Some(slot) = pool.alloc() else {
            tracing::warn!("component pool for {name} exhausted ({capacity} instances)");
            return Err(EcsError::PoolExhausted {
                component: name.to_string(),
                capacity,
            });
        };

        let handle = ComponentHandle { component: cid, slot };
        let written = match (self.registry.get(cid), self.pools[cid.index() as usize].as_mut()) {
            (Some(registry), Some(pool)) => {
                pool.get_mut(slot).map(|bytes| registry.write_default(bytes))
            }
            _ => None,
        };
        if let Some(Err(err)) = written {
            self.release(handle)?;
            return Err(err);
        }

        self.block_mut(eid)?.set_slot(cid, slot);
        Ok(handle)
    }

    /// Handle of `eid`'s `cid` component.
    #[inline]
    #[must_use]
    pub fn get_component(&self, eid: EntityId, cid: ComponentId) -> Option<ComponentHandle> {
        let block = self.entities.get(eid.index() as usize).filter(|b| b.exists())?;
        block.slot(cid).map(|slot| ComponentHandle { component: cid, slot })
    }

    /// Detaches `eid`'s `cid` component and returns its slot to the pool.
    ///
    /// Returns `false` if the entity did not have the component.
    ///
    /// # Errors
    ///
    /// `InvalidEntity` or `InvalidComponent`.
    pub fn remove_component(&mut self, eid: EntityId, cid: ComponentId) -> EcsResult<bool> {
        if cid.index() as usize >= self.registry.len() {
            return Err(EcsError::InvalidComponent(cid));
        }
        match self.block_mut(eid)?.take_slot(cid) {
            Some(slot) => {
                self.release(ComponentHandle { component: cid, slot })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Component types attached to `eid`, in index order.
    ///
    /// # Errors
    ///
    /// `InvalidEntity`.
    pub fn components(&self, eid: EntityId) -> EcsResult<Vec<ComponentId>> {
        Ok(self.block(eid)?.handles().map(|h| h.component).collect())
    }

    /// Number of live `cid` components.
    #[must_use]
    pub fn component_count(&self, cid: ComponentId) -> u32 {
        self.pool(cid).map_or(0, ComponentPool::live)
    }

    /// Bytes of the component behind `handle`.
    #[inline]
    #[must_use]
    pub fn resolve(&self, handle: ComponentHandle) -> Option<&[u8]> {
        self.pool(handle.component)?.get(handle.slot)
    }

    /// Mutable bytes of the component behind `handle`.
    #[inline]
    pub fn resolve_mut(&mut self, handle: ComponentHandle) -> Option<&mut [u8]> {
        self.pools
            .get_mut(handle.component.index() as usize)?
            .as_mut()?
            .get_mut(handle.slot)
    }

    // ---------------------------------------------------------------------
    // Typed access
    // ---------------------------------------------------------------------

    /// Attaches `value` as `eid`'s `T` component, replacing an existing one.
    ///
    /// # Errors
    ///
    /// `UnregisteredComponent` plus everything [`Self::add_component`] returns.
    pub fn add<T: Component>(&mut self, eid: EntityId, value: T) -> EcsResult<ComponentHandle> {
        let cid = self.registry.id_of::<T>().ok_or(EcsError::UnregisteredComponent(T::NAME))?;
        let handle = self.add_component(eid, cid)?;
        let bytes = self.resolve_mut(handle).ok_or(EcsError::TypeMismatch(T::NAME))?;
        bytes.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(handle)
    }

    /// `eid`'s `T` component.
    #[must_use]
    pub fn get<T: Component>(&self, eid: EntityId) -> Option<&T> {
        let handle = self.get_component(eid, self.registry.id_of::<T>()?)?;
        view(self.resolve(handle)?)
    }

    /// `eid`'s `T` component, mutably.
    pub fn get_mut<T: Component>(&mut self, eid: EntityId) -> Option<&mut T> {
        let handle = self.get_component(eid, self.registry.id_of::<T>()?)?;
        view_mut(self.resolve_mut(handle)?)
    }

    /// Detaches `eid`'s `T` component.
    ///
    /// # Errors
    ///
    /// `UnregisteredComponent` plus everything [`Self::remove_component`] returns.
    pub fn remove<T: Component>(&mut self, eid: EntityId) -> EcsResult<bool> {
        let cid = self.registry.id_of::<T>().ok_or(EcsError::UnregisteredComponent(T::NAME))?;
        self.remove_component(eid, cid)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn block(&self, eid: EntityId) -> EcsResult<&EntityBlock> {
        self.entities
            .get(eid.index() as usize)
            .filter(|b| b.exists())
            .ok_or(EcsError::InvalidEntity(eid))
    }

    fn block_mut(&mut self, eid: EntityId) -> EcsResult<&mut EntityBlock> {
        self.entities
            .get_mut(eid.index() as usize)
            .filter(|b| b.exists())
            .ok_or(EcsError::InvalidEntity(eid))
    }

    fn pool_or_create(
        &mut self,
        cid: ComponentId,
        size: usize,
        capacity: u32,
    ) -> EcsResult<&mut ComponentPool> {
        let index = cid.index() as usize;
        let slot = self.pools.get_mut(index).ok_or(EcsError::InvalidComponent(cid))?;

        if slot.is_none() {
            let bytes = ComponentPool::calc_pool_size(capacity, size);
            let available = self.config.ecs.component_memory.saturating_sub(self.used_memory);
            if bytes > available {
                tracing::warn!(
                    "pool for {cid} needs {bytes} bytes, {available} left in component budget"
                );
                return Err(EcsError::ComponentBudgetExceeded {
                    requested: bytes,
                    available,
                });
            }

            *slot = Some(ComponentPool::new(cid, size, capacity)?);
            self.used_memory += bytes;
            tracing::debug!("created pool for {cid}: {capacity} x {size} bytes");
        }

        slot.as_mut().ok_or(EcsError::InvalidComponent(cid))
    }

    fn release(&mut self, handle: ComponentHandle) -> EcsResult<()> {
        let pool = self
            .pools
            .get_mut(handle.component.index() as usize)
            .and_then(Option::as_mut)
            .ok_or(EcsError::InvalidComponent(handle.component))?;
        pool.free(handle.slot)?;
        Ok(())
    }
}

/// Typed view of a live slot. Pools keep slots aligned for every
/// registrable component, so this only fails on a size mismatch.
fn view<T: Pod>(bytes: &[u8]) -> Option<&T> {
    bytemuck::try_from_bytes(bytes).ok()
}

fn view_mut<T: Pod>(bytes: &mut [u8]) -> Option<&mut T> {
    bytemuck::try_from_bytes_mut(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Name, RigidBody, Transform};

    fn config(max_entities: u32) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.ecs.max_entities = max_entities;
        config.ecs.max_components = 8;
        config
    }

    fn manager(max_entities: u32) -> DataManager {
        let mut dm = DataManager::new(&config(max_entities));
        dm.register::<Transform>().unwrap();
        dm.register::<RigidBody>().unwrap();
        dm.register::<Name>().unwrap();
        dm
    }

    #[test]
    fn test_create_until_full_then_reuse() {
        let mut dm = manager(4);
        let ids: Vec<_> = (0..4).map(|_| dm.create_entity(None).unwrap()).collect();
        assert_eq!(ids.iter().map(|e| e.index()).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(dm.create_entity(None), Err(EcsError::EntityTableFull { capacity: 4 }));

        dm.destroy_entity(ids[1]).unwrap();
        assert_eq!(dm.create_entity(None).unwrap(), ids[1]);
        assert_eq!(dm.entity_count(), 4);
    }

    #[test]
    fn test_create_requested_id() {
        let mut dm = manager(8);
        assert_eq!(dm.create_entity(Some(EntityId::new(5))).unwrap(), EntityId::new(5));
        // Cursor moved past the requested id.
        assert_eq!(dm.create_entity(None).unwrap(), EntityId::new(6));
        // Taken id falls back to the scan.
        assert_eq!(dm.create_entity(Some(EntityId::new(5))).unwrap(), EntityId::new(7));
        // Wraps around.
        assert_eq!(dm.create_entity(None).unwrap(), EntityId::new(0));
        assert!(dm.entity_exists(EntityId::new(5)));
        assert!(!dm.entity_exists(EntityId::new(1)));
        assert!(!dm.entity_exists(EntityId::INVALID));
    }

    #[test]
    fn test_add_get_remove() {
        let mut dm = manager(4);
        let e = dm.create_entity(None).unwrap();
        let cid = dm.registry().id_of::<RigidBody>().unwrap();

        let handle = dm.add_component(e, cid).unwrap();
        assert_eq!(dm.get_component(e, cid), Some(handle));
        assert_eq!(dm.add_component(e, cid).unwrap(), handle);
        assert_eq!(dm.get::<RigidBody>(e), Some(&RigidBody::default()));

        assert!(dm.remove_component(e, cid).unwrap());
        assert_eq!(dm.get_component(e, cid), None);
        assert!(!dm.remove_component(e, cid).unwrap());
        assert_eq!(dm.component_count(cid), 0);
    }

    #[test]
    fn test_typed_access() {
        let mut dm = manager(4);
        let e = dm.create_entity(None).unwrap();
        dm.add(e, Transform::at([1.0, 2.0, 3.0])).unwrap();
        dm.get_mut::<Transform>(e).unwrap().position[2] = 9.0;
        assert_eq!(dm.get::<Transform>(e).unwrap().position, [1.0, 2.0, 9.0]);
        assert!(dm.get::<Name>(e).is_none());

        assert!(dm.remove::<Transform>(e).unwrap());
        assert!(dm.get::<Transform>(e).is_none());
    }

    #[test]
    fn test_invalid_ids() {
        let mut dm = manager(2);
        let e = dm.create_entity(None).unwrap();
        let ghost = EntityId::new(1);
        let cid = ComponentId::new(0);

        assert_eq!(dm.add_component(ghost, cid), Err(EcsError::InvalidEntity(ghost)));
        assert_eq!(
            dm.destroy_entity(EntityId::INVALID),
            Err(EcsError::InvalidEntity(EntityId::INVALID))
        );
        assert_eq!(
            dm.add_component(e, ComponentId::new(7)),
            Err(EcsError::InvalidComponent(ComponentId::new(7)))
        );
        assert!(dm.components(ghost).is_err());
    }

    #[test]
    fn test_destroy_returns_components() {
        let mut dm = manager(4);
        let e = dm.create_entity(None).unwrap();
        dm.add(e, Transform::default()).unwrap();
        dm.add(e, Name::new("rover")).unwrap();

        let t = dm.registry().id_of::<Transform>().unwrap();
        let n = dm.registry().id_of::<Name>().unwrap();
        let mut expected = vec![t, n];
        expected.sort();
        assert_eq!(dm.components(e).unwrap(), expected);

        dm.destroy_entity(e).unwrap();
        assert_eq!(dm.component_count(t), 0);
        assert_eq!(dm.component_count(n), 0);
        assert!(!dm.entity_exists(e));
    }

    #[test]
    fn test_pool_exhausted() {
        let mut config = config(8);
        config.components.insert("Name".into(), 2);
        let mut dm = DataManager::new(&config);
        dm.register::<Name>().unwrap();

        let ids: Vec<_> = (0..3).map(|_| dm.create_entity(None).unwrap()).collect();
        dm.add(ids[0], Name::new("a")).unwrap();
        dm.add(ids[1], Name::new("b")).unwrap();
        assert!(matches!(
            dm.add(ids[2], Name::new("c")),
            Err(EcsError::PoolExhausted { capacity: 2, .. })
        ));
        assert!(dm.get::<Name>(ids[2]).is_none());
    }

    #[test]
    fn test_budget_exceeded() {
        let mut config = config(4);
        config.ecs.component_memory = 64;
        let mut dm = DataManager::new(&config);
        dm.register::<Transform>().unwrap();
        let e = dm.create_entity(None).unwrap();
        assert!(matches!(
            dm.add(e, Transform::default()),
            Err(EcsError::ComponentBudgetExceeded { .. })
        ));
        assert_eq!(dm.used_memory(), 0);
    }

    #[test]
    fn test_copy_entity() {
        let mut dm = manager(4);
        let src = dm.create_entity(None).unwrap();
        dm.add(src, Transform::at([4.0, 5.0, 6.0])).unwrap();
        dm.add(src, Name::new("twin")).unwrap();

        let dst = dm.copy_entity(src, None).unwrap();
        assert_ne!(src, dst);
        assert_eq!(dm.get::<Transform>(dst), dm.get::<Transform>(src));
        assert_eq!(dm.get::<Name>(dst).unwrap().as_str(), "twin");

        dm.get_mut::<Transform>(dst).unwrap().position = [0.0; 3];
        assert_eq!(dm.get::<Transform>(src).unwrap().position, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_clear() {
        let mut dm = manager(4);
        let e = dm.create_entity(None).unwrap();
        dm.add(e, Transform::default()).unwrap();
        assert!(dm.used_memory() > 0);

        dm.clear();
        assert_eq!(dm.entities().count(), 0);
        assert_eq!(dm.used_memory(), 0);
        assert_eq!(dm.create_entity(None).unwrap(), EntityId::new(0));
    }

    #[test]
    fn test_capacity_resolution() {
        let mut config = config(4);
        config.ecs.default_max_instances = 16;
        config.components.insert("Transform".into(), 32);
        let mut dm = DataManager::new(&config);
        let t = dm.register::<Transform>().unwrap();
        let r = dm.register::<RigidBody>().unwrap();
        assert_eq!(dm.registry().get(t).unwrap().description().max_instances, Some(32));
        assert_eq!(dm.registry().get(r).unwrap().description().max_instances, Some(16));
    }

    #[test]
    fn test_declared_capacity_beats_default() {
        #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
        #[repr(C)]
        struct Lidar {
            range: f32,
        }

        impl Component for Lidar {
            const NAME: &'static str = "Lidar";

            fn description() -> crate::component::ComponentDescription {
                crate::component::ComponentDescription::new(Self::NAME).with_max_instances(1024)
            }
        }

        let mut config = config(4);
        config.ecs.default_max_instances = 16;
        let mut dm = DataManager::new(&config);
        let lidar = dm.register::<Lidar>().unwrap();
        let transform = dm.register::<Transform>().unwrap();
        assert_eq!(dm.registry().get(lidar).unwrap().description().max_instances, Some(1024));
        assert_eq!(dm.registry().get(transform).unwrap().description().max_instances, Some(16));

        let e = dm.create_entity(None).unwrap();
        dm.add(e, Lidar { range: 30.0 }).unwrap();
        assert_eq!(dm.pool(lidar).unwrap().capacity(), 1024);
    }
}
