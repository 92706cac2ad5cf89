//! physim: multi-body physics and sensor simulation core.
//!
//! This is the umbrella crate that re-exports the public surface of the
//! sub-crates: math and poses, the scene description tree, collision
//! geometry, the engine layer with its back ends, and the world loop.

pub use physim_collision::{self, AABB, Geometry, RayFanSpec, RaySegment};
pub use physim_engine::{
    self, BackendKind, Body, BodyId, BodyMut, Capabilities, EngineConfig, Joint, JointKind,
    JointMut, JointRef, JointState, PhysicsEngine, PhysicsError, RayFan, RayHit, RayReading,
    Shape, ShapeId, ShapeKind, ShapeMut, StepReport,
};
pub use physim_math::{self, GRAVITY, MassProperties, Pose, Vec3};
pub use physim_scene::{self, Element, SceneError};
pub use physim_world::{
    self, ConnectionId, EntityRef, Event, EventBus, EventKind, SnapshotRecorder, World,
    WorldError, WorldSnapshot,
};
