//! # Engine Configuration
//!
//! Start-up configuration loaded once from TOML:
//!
//! - `[ecs]` - entity table width, component table width, component byte budget
//! - `[components]` - per-type `max_instances` overrides by component name
//! - `[[memory.allocators]]` - named raw allocators
//! - `[parallel]` - worker pool sizing
//!
//! Every field has a default, so an empty document is a valid configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Hard upper bound on `ecs.max_components`.
pub const MAX_COMPONENT_TYPES: usize = 256;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Entity/component store sizing.
    #[serde(default)]
    pub ecs: EcsConfig,
    /// `max_instances` overrides keyed by component name.
    #[serde(default)]
    pub components: BTreeMap<String, u32>,
    /// Raw allocators.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Worker pool sizing.
    #[serde(default)]
    pub parallel: ParallelConfig,
}

/// Entity/component store sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EcsConfig {
    /// Entity table capacity.
    #[serde(default = "default_max_entities")]
    pub max_entities: u32,
    /// Maximum number of component types (width of each entity's table).
    #[serde(default = "default_max_components")]
    pub max_components: usize,
    /// Byte budget shared by all component pools.
    #[serde(default = "default_component_memory")]
    pub component_memory: usize,
    /// Pool capacity for types that neither override it here nor in their description.
    #[serde(default = "default_max_instances")]
    pub default_max_instances: u32,
}

fn default_max_entities() -> u32 {
    1024
}

fn default_max_components() -> usize {
    32
}

fn default_component_memory() -> usize {
    64 * 1024 * 1024
}

fn default_max_instances() -> u32 {
    1024
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            max_entities: default_max_entities(),
            max_components: default_max_components(),
            component_memory: default_component_memory(),
            default_max_instances: default_max_instances(),
        }
    }
}

/// Raw allocator table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Allocators built at start-up, looked up by name.
    #[serde(default)]
    pub allocators: Vec<AllocatorConfig>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            allocators: vec![AllocatorConfig {
                name: "frame".to_string(),
                kind: AllocatorKind::Stack,
                bytes: 1024 * 1024,
                block_size: 0,
            }],
        }
    }
}

/// Allocator discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// LIFO bump allocator.
    Stack,
    /// Fixed-block free-list allocator.
    Pool,
    /// Fixed-block allocator tracked by a bitmap.
    Bitmap,
}

/// One named allocator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AllocatorConfig {
    /// Lookup name.
    pub name: String,
    /// Discipline.
    pub kind: AllocatorKind,
    /// Total byte budget.
    pub bytes: usize,
    /// Block size (pool and bitmap only).
    #[serde(default)]
    pub block_size: usize,
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParallelConfig {
    /// Worker thread count; `None` means available parallelism minus one.
    #[serde(default)]
    pub workers: Option<usize>,
    /// Indices claimed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    16
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            workers: None,
            batch_size: default_batch_size(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML, `Invalid` for constraint violations.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// `Parse` if serialization fails.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks capacity constraints.
    ///
    /// # Errors
    ///
    /// `Invalid` naming the first violated constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.ecs.max_entities == 0 {
            return invalid("ecs.max_entities must be non-zero".into());
        }
        if self.ecs.max_components == 0 || self.ecs.max_components > MAX_COMPONENT_TYPES {
            return invalid(format!(
                "ecs.max_components must be in 1..={MAX_COMPONENT_TYPES}, got {}",
                self.ecs.max_components
            ));
        }
        if self.ecs.default_max_instances == 0 {
            return invalid("ecs.default_max_instances must be non-zero".into());
        }
        if let Some((name, _)) = self.components.iter().find(|(_, n)| **n == 0) {
            return invalid(format!("components.{name} must be non-zero"));
        }
        if self.parallel.batch_size == 0 {
            return invalid("parallel.batch_size must be non-zero".into());
        }

        for (i, alloc) in self.memory.allocators.iter().enumerate() {
            if self.memory.allocators[..i].iter().any(|a| a.name == alloc.name) {
                return invalid(format!("duplicate allocator name '{}'", alloc.name));
            }
            if alloc.bytes == 0 {
                return invalid(format!("allocator '{}' has zero bytes", alloc.name));
            }
            if alloc.kind != AllocatorKind::Stack && alloc.block_size == 0 {
                return invalid(format!("allocator '{}' needs a non-zero block_size", alloc.name));
            }
        }

        Ok(())
    }

    /// Pool capacity for component `name`.
    ///
    /// A `[components]` entry wins, then the capacity the type declares,
    /// then `ecs.default_max_instances`.
    #[must_use]
    pub fn max_instances_for(&self, name: &str, declared: Option<u32>) -> u32 {
        self.components
            .get(name)
            .copied()
            .or(declared)
            .unwrap_or(self.ecs.default_max_instances)
    }
}
