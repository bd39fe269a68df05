//! # Component Registry
//!
//! Type-erased descriptors for component types. Each registered type gets
//! one [`TypedRegistry`] boxed behind the object-safe [`Registry`] trait, so
//! pools, serializers and inspectors can work on raw component bytes without
//! knowing the concrete type.
//!
//! Indices (the [`ComponentId`] used to address pools) follow registration
//! order until [`ComponentRegistry::sort_by_stable_id`] reassigns them by a
//! hash of the type name, which keeps them identical across builds.

use std::any::TypeId;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::marker::PhantomData;

use super::attribute::ComponentDescription;
use super::component::Component;
use super::entity::ComponentId;
use crate::error::{EcsError, EcsResult};

/// FNV-1a 64-bit hash of a component type name.
#[must_use]
pub const fn stable_id(name: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let bytes = name.as_bytes();
    let mut hash = OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

/// Type-erased view of one component type.
pub trait Registry: Send + Sync {
    /// Type name.
    fn name(&self) -> &'static str;

    /// `size_of` the component.
    fn size_of(&self) -> usize;

    /// `align_of` the component.
    fn align_of(&self) -> usize;

    /// Field layout and pool capacity.
    fn description(&self) -> &ComponentDescription;

    /// Mutable description, used to apply capacity overrides.
    fn description_mut(&mut self) -> &mut ComponentDescription;

    /// Hash of the type name, stable across builds and platforms.
    fn stable_id(&self) -> u64 {
        stable_id(self.name())
    }

    /// Pool / table index.
    fn index(&self) -> ComponentId;

    /// Reassigns the index. Only valid before any pool exists.
    fn set_index(&mut self, index: ComponentId);

    /// `TypeId` of the concrete component.
    fn type_id(&self) -> TypeId;

    /// Writes the default value into `component`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` if `component` is not exactly `size_of` bytes.
    fn write_default(&self, component: &mut [u8]) -> EcsResult<()>;

    /// Serializes `component` into `writer`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` on a size mismatch, `Io` on write failure.
    fn serialize(&self, component: &[u8], writer: &mut dyn Write) -> EcsResult<()>;

    /// Deserializes `reader` into `component`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` on a size mismatch, `Io` on read failure.
    fn deserialize(&self, reader: &mut dyn Read, component: &mut [u8]) -> EcsResult<()>;

    /// Bytes [`Registry::serialize`] would write for `component`.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` on a size mismatch.
    fn serialized_size(&self, component: &[u8]) -> EcsResult<usize>;
}

/// [`Registry`] implementation for component type `T`.
pub struct TypedRegistry<T: Component> {
    index: ComponentId,
    description: ComponentDescription,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> TypedRegistry<T> {
    /// Creates the registry for `T` at `index`.
    #[must_use]
    pub fn new(index: ComponentId) -> Self {
        Self {
            index,
            description: T::description(),
            _marker: PhantomData,
        }
    }

    fn read(component: &[u8]) -> EcsResult<T> {
        if component.len() == std::mem::size_of::<T>() {
            Ok(bytemuck::pod_read_unaligned(component))
        } else {
            Err(EcsError::TypeMismatch(T::NAME))
        }
    }

    fn check_len(component: &[u8]) -> EcsResult<()> {
        if component.len() == std::mem::size_of::<T>() {
            Ok(())
        } else {
            Err(EcsError::TypeMismatch(T::NAME))
        }
    }
}

impl<T: Component> Registry for TypedRegistry<T> {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn size_of(&self) -> usize {
        std::mem::size_of::<T>()
    }

    fn align_of(&self) -> usize {
        std::mem::align_of::<T>()
    }

    fn description(&self) -> &ComponentDescription {
        &self.description
    }

    fn description_mut(&mut self) -> &mut ComponentDescription {
        &mut self.description
    }

    fn index(&self) -> ComponentId {
        self.index
    }

    fn set_index(&mut self, index: ComponentId) {
        self.index = index;
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn write_default(&self, component: &mut [u8]) -> EcsResult<()> {
        Self::check_len(component)?;
        component.copy_from_slice(bytemuck::bytes_of(&T::default()));
        Ok(())
    }

    fn serialize(&self, component: &[u8], writer: &mut dyn Write) -> EcsResult<()> {
        let value = Self::read(component)?;
        value.serialize(writer)?;
        Ok(())
    }

    fn deserialize(&self, reader: &mut dyn Read, component: &mut [u8]) -> EcsResult<()> {
        let mut value = Self::read(component)?;
        value.deserialize(reader)?;
        component.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    fn serialized_size(&self, component: &[u8]) -> EcsResult<usize> {
        Ok(Self::read(component)?.serialized_size())
    }
}

/// Ordered collection of registered component types.
pub struct ComponentRegistry {
    registries: Vec<Box<dyn Registry>>,
    by_type: HashMap<TypeId, usize>,
    max_components: usize,
}

impl ComponentRegistry {
    /// Largest component alignment a pool can hand out typed views for.
    pub const MAX_ALIGN: usize = 8;

    /// Creates an empty registry holding at most `max_components` types.
    #[must_use]
    pub fn new(max_components: usize) -> Self {
        Self {
            registries: Vec::with_capacity(max_components),
            by_type: HashMap::with_capacity(max_components),
            max_components,
        }
    }

    /// Registers `T` once and returns its index.
    ///
    /// Registering an already known type returns the existing index.
    ///
    /// # Errors
    ///
    /// `TooManyComponents` when full, `TypeMismatch` if `T` is over-aligned.
    pub fn register<T: Component>(&mut self) -> EcsResult<ComponentId> {
        if let Some(id) = self.id_of::<T>() {
            return Ok(id);
        }
        if self.registries.len() >= self.max_components {
            return Err(EcsError::TooManyComponents {
                max: self.max_components,
            });
        }
        if std::mem::align_of::<T>() > Self::MAX_ALIGN {
            return Err(EcsError::TypeMismatch(T::NAME));
        }

        let id = ComponentId::new(self.registries.len() as u32);
        self.by_type.insert(TypeId::of::<T>(), self.registries.len());
        self.registries.push(Box::new(TypedRegistry::<T>::new(id)));
        tracing::debug!("registered component {} as {}", T::NAME, id);
        Ok(id)
    }

    /// Index of `T`, if registered.
    #[must_use]
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|i| self.registries[*i].index())
    }

    /// Registry at `id`.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&dyn Registry> {
        self.registries.get(id.index() as usize).map(|r| &**r)
    }

    /// Registry with type name `name`.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&dyn Registry> {
        self.iter().find(|r| r.name() == name)
    }

    /// Registries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Registry> {
        self.registries.iter().map(|r| &**r)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registries.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    /// Capacity of the registry.
    #[must_use]
    pub const fn max_components(&self) -> usize {
        self.max_components
    }

    /// Overrides the pool capacity of `id`.
    ///
    /// # Errors
    ///
    /// `InvalidComponent` if `id` is not registered.
    pub fn set_max_instances(&mut self, id: ComponentId, max_instances: u32) -> EcsResult<()> {
        let registry = self
            .registries
            .get_mut(id.index() as usize)
            .ok_or(EcsError::InvalidComponent(id))?;
        registry.description_mut().max_instances = Some(max_instances);
        Ok(())
    }

    /// Reassigns every index in order of [`stable_id`], ties broken by name.
    pub fn sort_by_stable_id(&mut self) {
        self.registries
            .sort_by(|a, b| (a.stable_id(), a.name()).cmp(&(b.stable_id(), b.name())));
        self.by_type.clear();
        for (i, registry) in self.registries.iter_mut().enumerate() {
            registry.set_index(ComponentId::new(i as u32));
            self.by_type.insert(registry.type_id(), i);
        }
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|r| (r.index(), r.name()))).finish()
    }
}
