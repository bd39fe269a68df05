//! # Memory Manager
//!
//! Named table of the raw allocators built at start-up. Subsystems look
//! their allocator up by name instead of reaching for a global.

use std::collections::BTreeMap;

use crate::config::{AllocatorConfig, AllocatorKind};
use crate::error::MemoryResult;

use super::{Allocator, BitmapAllocator, PoolAllocator, StackAllocator};

/// Boxed allocator stored in the table.
pub type BoxedAllocator = Box<dyn Allocator + Send>;

/// Owns every named allocator of the process.
#[derive(Default)]
pub struct MemoryManager {
    allocators: BTreeMap<String, BoxedAllocator>,
}

impl MemoryManager {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every allocator described by `configs`.
    ///
    /// # Errors
    ///
    /// The first allocator construction error.
    pub fn from_config(configs: &[AllocatorConfig]) -> MemoryResult<Self> {
        let mut manager = Self::new();
        for config in configs {
            let allocator = Self::build(config)?;
            tracing::debug!(
                "allocator '{}' ({:?}, {} bytes) ready",
                config.name,
                config.kind,
                allocator.total()
            );
            manager.register(config.name.clone(), allocator);
        }
        Ok(manager)
    }

    fn build(config: &AllocatorConfig) -> MemoryResult<BoxedAllocator> {
        let allocator: BoxedAllocator = match config.kind {
            AllocatorKind::Stack => Box::new(StackAllocator::new(config.bytes)),
            AllocatorKind::Pool => {
                let block_size = config.block_size.max(1);
                Box::new(PoolAllocator::new(config.bytes / block_size, block_size)?)
            }
            AllocatorKind::Bitmap => {
                Box::new(BitmapAllocator::new(config.bytes, config.block_size)?)
            }
        };
        Ok(allocator)
    }

    /// Adds or replaces an allocator, returning the previous one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        allocator: BoxedAllocator,
    ) -> Option<BoxedAllocator> {
        self.allocators.insert(name.into(), allocator)
    }

    /// Removes an allocator from the table.
    pub fn unregister(&mut self, name: &str) -> Option<BoxedAllocator> {
        self.allocators.remove(name)
    }

    /// Looks up an allocator by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&(dyn Allocator + Send + 'static)> {
        self.allocators.get(name).map(|a| &**a)
    }

    /// Looks up an allocator by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Allocator + Send + 'static)> {
        self.allocators.get_mut(name).map(|a| &mut **a)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.allocators.keys().map(String::as_str)
    }

    /// Sum of `total()` over every allocator.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.allocators.values().map(|a| a.total()).sum()
    }

    /// Sum of `used()` over every allocator.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.allocators.values().map(|a| a.used()).sum()
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.allocators.iter().map(|(name, a)| (name, (a.used(), a.total()))))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AllocatorExt;

    fn configs() -> Vec<AllocatorConfig> {
        vec![
            AllocatorConfig {
                name: "frame".into(),
                kind: AllocatorKind::Stack,
                bytes: 256,
                block_size: 0,
            },
            AllocatorConfig {
                name: "messages".into(),
                kind: AllocatorKind::Pool,
                bytes: 256,
                block_size: 32,
            },
            AllocatorConfig {
                name: "meshes".into(),
                kind: AllocatorKind::Bitmap,
                bytes: BitmapAllocator::size_for(16, 16),
                block_size: 16,
            },
        ]
    }

    #[test]
    fn test_build_from_config() {
        let manager = MemoryManager::from_config(&configs()).unwrap();
        assert_eq!(manager.names().collect::<Vec<_>>(), vec!["frame", "messages", "meshes"]);
        assert_eq!(manager.get("frame").unwrap().total(), 256);
        assert_eq!(manager.get("messages").unwrap().total(), 256);
        assert!(manager.get("missing").is_none());
    }

    #[test]
    fn test_lookup_and_allocate() {
        let mut manager = MemoryManager::from_config(&configs()).unwrap();
        let frame = manager.get_mut("frame").unwrap();
        let values = frame.alloc::<u32>(4).unwrap();
        frame.slice_mut::<u32>(&values).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(frame.slice::<u32>(&values).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(manager.used_bytes(), 16);
    }

    #[test]
    fn test_invalid_bitmap_config_fails() {
        let bad = [AllocatorConfig {
            name: "bad".into(),
            kind: AllocatorKind::Bitmap,
            bytes: 10,
            block_size: 4,
        }];
        assert!(MemoryManager::from_config(&bad).is_err());
    }
}
