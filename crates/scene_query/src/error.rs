//! Errors surfaced by scene query entry points
//!
//! Most of the subsystem reports through return values (`bool`,
//! `Option`, hit counts). These errors cover malformed caller input.

use crate::config::ConfigError;

/// Rejected scene query input
#[derive(thiserror::Error, Debug)]
pub enum SceneQueryError {
    /// Ray or sweep direction is not unit length
    #[error("direction is not unit length (squared length {0})")]
    InvalidRayDirection(f32),

    /// Cull plane masks are 32 bits wide
    #[error("too many cull planes: {0} (max 32)")]
    TooManyPlanes(usize),

    /// A pruning pool is full
    #[error("pruning pool capacity exceeded ({0} objects)")]
    CapacityExceeded(usize),

    /// Triangle mesh references missing vertices or is not a triangle list
    #[error("invalid triangle mesh: {0}")]
    InvalidMesh(String),

    /// Shape handle is stale or unknown
    #[error("unknown shape handle")]
    InvalidShape,

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be loaded or saved
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for scene query entry points
pub type Result<T> = std::result::Result<T, SceneQueryError>;
