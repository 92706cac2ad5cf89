//! Engine-agnostic rigid-body physics for the physim simulation core.
//!
//! [`PhysicsEngine`] owns a back end selected at construction and the
//! registry of [`Body`], [`Joint`] and [`Shape`] entities. Entities are
//! addressed by copyable identifiers; the back end keeps the native state
//! for each identifier in its own tables.
//!
//! A step runs in two phases: the back end advances the solver, then every
//! body whose pose changed propagates the new pose to its shapes. Sensor
//! shapes are updated afterwards with [`PhysicsEngine::update_sensors`].

pub mod backend;
pub mod body;
pub mod config;
pub mod engine;
pub mod error;
pub mod id;
pub mod joint;
pub mod ray_shape;
pub mod shape;

pub use backend::{Backend, BackendKind, Capabilities, RayHit};
pub use body::{Body, BodyMut};
pub use config::EngineConfig;
pub use engine::{PhysicsEngine, StepReport};
pub use error::{PhysicsError, Result};
pub use id::{BodyId, EngineId, JointId, ShapeId};
pub use joint::{Joint, JointKind, JointMut, JointRef, JointState};
pub use ray_shape::{RayFan, RayReading};
pub use shape::{Shape, ShapeKind, ShapeMut};
