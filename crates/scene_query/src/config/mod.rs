//! Configuration system
//!
//! [`SceneQueryConfig`] picks the pruning structures and their tuning
//! knobs. Any type implementing [`Config`] loads from and saves to TOML or
//! RON, chosen by file extension.

pub use serde::{Deserialize, Serialize};

use crate::error::{Result, SceneQueryError};
use crate::physics::collision::bounds::Aabb;
use crate::spatial::dynamic_pruner::DEFAULT_REBUILD_RATE_HINT;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            Self::from_toml(&contents)
        } else if path.ends_with(".ron") {
            Self::from_ron(&contents)
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> std::result::Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            self.to_toml()?
        } else if path.ends_with(".ron") {
            self.to_ron()?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Parse from a TOML document
    fn from_toml(contents: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse from a RON document
    fn from_ron(contents: &str) -> std::result::Result<Self, ConfigError> {
        ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Render as a TOML document
    fn to_toml(&self) -> std::result::Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Render as a RON document
    fn to_ron(&self) -> std::result::Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Acceleration structure behind a pruner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PruningStructure {
    /// Flat list, every query scans everything
    None,
    /// Bulk-built AABB tree, rebuilt after any change
    StaticAabbTree,
    /// Refitted AABB tree with progressive rebuilds
    DynamicAabbTree,
    /// Loose octree
    Octree,
    /// Loose quadtree over the two axes perpendicular to the up axis
    Quadtree,
}

/// Scene query manager settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneQueryConfig {
    /// Structure for shapes that never move
    pub static_structure: PruningStructure,
    /// Structure for moving shapes
    pub dynamic_structure: PruningStructure,
    /// Expected world extent for the loose trees; derived from the shapes when absent
    pub max_bounds: Option<Aabb>,
    /// Pre-sizing hint for the static pool
    pub max_nb_static_shapes: usize,
    /// Pre-sizing hint for the dynamic pool
    pub max_nb_dynamic_shapes: usize,
    /// Loose tree depth, clamped per structure
    pub subdivision_level: u32,
    /// Vertical axis (0 = X, 1 = Y, 2 = Z)
    pub up_axis: usize,
    /// Number of steps a dynamic tree rebuild is spread over, plus 3
    pub dynamic_tree_rebuild_rate_hint: u32,
}

impl Default for SceneQueryConfig {
    fn default() -> Self {
        Self {
            static_structure: PruningStructure::StaticAabbTree,
            dynamic_structure: PruningStructure::DynamicAabbTree,
            max_bounds: None,
            max_nb_static_shapes: 0,
            max_nb_dynamic_shapes: 0,
            subdivision_level: 6,
            up_axis: 1,
            dynamic_tree_rebuild_rate_hint: DEFAULT_REBUILD_RATE_HINT,
        }
    }
}

impl Config for SceneQueryConfig {}

impl SceneQueryConfig {
    /// Reject settings no pruner can honour
    pub fn validate(&self) -> Result<()> {
        if self.up_axis > 2 {
            return Err(SceneQueryError::InvalidConfig(format!("up axis {} is not 0, 1 or 2", self.up_axis)));
        }
        if self.dynamic_tree_rebuild_rate_hint <= 3 {
            return Err(SceneQueryError::InvalidConfig(format!(
                "dynamic tree rebuild rate hint {} must be greater than 3",
                self.dynamic_tree_rebuild_rate_hint
            )));
        }
        if let Some(bounds) = &self.max_bounds {
            if !bounds.is_valid() {
                return Err(SceneQueryError::InvalidConfig("max bounds are empty".to_string()));
            }
        }
        if self.subdivision_level == 0 {
            return Err(SceneQueryError::InvalidConfig("subdivision level must be at least 1".to_string()));
        }
        Ok(())
    }
}
