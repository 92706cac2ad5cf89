//! Error types for the physics layer.

use physim_scene::SceneError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Missing or malformed scene data.
    #[error("Configuration error: {0}")]
    Configuration(#[from] SceneError),

    #[error("Index {index} out of range [0, {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Operation not legal in the entity's current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Entities from different engine instances were mixed.
    #[error("Incompatible backend: {0}")]
    IncompatibleBackend(String),

    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    /// The selected back end lacks a capability. Non-fatal.
    #[error("{backend} does not implement {operation}")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Solver diverged: {0}")]
    SolverDiverged(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
