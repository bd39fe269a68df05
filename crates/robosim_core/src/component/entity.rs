//! # Entity Management
//!
//! Entities are plain indices into a fixed-capacity table. A freed id is
//! reused by the next `create_entity` that reaches it; there is no
//! generation counter.

use std::fmt;

/// Index of an entity slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Sentinel returned when no entity could be created.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates an entity id from a table index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Checks if this is not the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

/// Small integer addressing a component type's pool and table column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Creates a component id from a registry index.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the registry index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Reference to one live component instance: its type and pool slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentHandle {
    /// Component type.
    pub component: ComponentId,
    /// Slot inside the type's pool.
    pub slot: u32,
}

/// One row of the entity table.
///
/// `components[cid]` holds the pool slot of the entity's `cid` component,
/// or `None` if the entity lacks it.
#[derive(Clone, Debug)]
pub struct EntityBlock {
    exists: bool,
    components: Box<[Option<u32>]>,
}

impl EntityBlock {
    /// Creates a free row `max_components` columns wide.
    #[must_use]
    pub fn new(max_components: usize) -> Self {
        Self {
            exists: false,
            components: vec![None; max_components].into_boxed_slice(),
        }
    }

    /// Whether the slot holds a live entity.
    #[inline]
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    #[inline]
    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// Slot of component `cid`, if attached.
    #[inline]
    #[must_use]
    pub fn slot(&self, cid: ComponentId) -> Option<u32> {
        self.components.get(cid.index() as usize).copied().flatten()
    }

    #[inline]
    pub(crate) fn set_slot(&mut self, cid: ComponentId, slot: u32) {
        self.components[cid.index() as usize] = Some(slot);
    }

    #[inline]
    pub(crate) fn take_slot(&mut self, cid: ComponentId) -> Option<u32> {
        self.components.get_mut(cid.index() as usize).and_then(Option::take)
    }

    /// Attached components in column order.
    pub fn handles(&self) -> impl Iterator<Item = ComponentHandle> + '_ {
        self.components.iter().enumerate().filter_map(|(i, slot)| {
            slot.map(|slot| ComponentHandle {
                component: ComponentId::new(i as u32),
                slot,
            })
        })
    }

    /// Number of attached components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.iter().filter(|slot| slot.is_some()).count()
    }

    /// Frees the row and detaches every column.
    pub(crate) fn reset(&mut self) {
        self.exists = false;
        self.components.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_sentinel() {
        assert!(!EntityId::INVALID.is_valid());
        assert!(EntityId::new(0).is_valid());
        assert_eq!(EntityId::default(), EntityId::INVALID);
        assert_eq!(EntityId::new(7).to_string(), "#7");
    }

    #[test]
    fn test_entity_block_columns() {
        let mut block = EntityBlock::new(4);
        assert!(!block.exists());
        assert_eq!(block.slot(ComponentId::new(2)), None);

        block.set_exists(true);
        block.set_slot(ComponentId::new(2), 9);
        block.set_slot(ComponentId::new(0), 3);
        assert_eq!(block.slot(ComponentId::new(2)), Some(9));
        assert_eq!(block.component_count(), 2);

        let handles: Vec<_> = block.handles().map(|h| (h.component.index(), h.slot)).collect();
        assert_eq!(handles, vec![(0, 3), (2, 9)]);

        assert_eq!(block.take_slot(ComponentId::new(2)), Some(9));
        assert_eq!(block.take_slot(ComponentId::new(2)), None);
        // Out-of-range columns read as absent.
        assert_eq!(block.slot(ComponentId::new(10)), None);

        block.reset();
        assert!(!block.exists());
        assert_eq!(block.component_count(), 0);
    }
}
