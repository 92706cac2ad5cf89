//! World layer for the physim simulation core.
//!
//! A [`World`] owns one [`PhysicsEngine`](physim_engine::PhysicsEngine) and
//! an [`EventBus`]. It loads a scene description, drives the fixed-step
//! loop (solver, pose propagation, sensor update) and publishes what
//! happened to subscribers. [`WorldSnapshot`] captures the observable state
//! for external collaborators.

pub mod event;
pub mod loader;
pub mod snapshot;
pub mod world;

pub use event::{ConnectionId, EntityRef, Event, EventBus, EventKind};
pub use snapshot::{BodySnapshot, RayFanSnapshot, RecordingStats, SnapshotRecorder, WorldSnapshot};
pub use world::World;

use physim_engine::PhysicsError;
use physim_scene::SceneError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation not legal in the world's current run state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, WorldError>;
