//! Rigid-body dynamics back ends.
//!
//! Every back end implements [`Backend`] over a shared [`RigidSet`] that maps
//! entity identifiers to native records. The engine never holds native
//! references; it addresses everything through identifiers.

mod constraint;
mod impulse;
mod position;
mod rigid;

pub use impulse::SequentialImpulse;
pub use position::PositionBased;
pub use rigid::{NativeBody, NativeJoint, NativeShape, RayHit, RigidSet};

use crate::config::EngineConfig;
use crate::error::{PhysicsError, Result};
use crate::id::JointId;
use crate::shape::ShapeKind;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of available back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Velocity-level projected Gauss-Seidel with Baumgarte stabilization.
    SequentialImpulse,
    /// Extended position-based dynamics with substepping.
    PositionBased,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::SequentialImpulse, BackendKind::PositionBased];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::SequentialImpulse => "sequential_impulse",
            BackendKind::PositionBased => "position_based",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BackendKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown backend '{s}'"))
    }
}

bitflags! {
    /// Optional features a back end may support.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Joint velocity motors.
        const JOINT_MOTOR = 1 << 0;
        /// Joint forces applied for the next step.
        const JOINT_FORCE = 1 << 1;
        /// Motor force limits.
        const JOINT_MAX_FORCE = 1 << 2;
        /// Joint high/low stops.
        const JOINT_LIMITS = 1 << 3;
        /// Viscous joint damping.
        const JOINT_DAMPING = 1 << 4;
        /// Compound shapes.
        const COMPOUND_SHAPES = 1 << 5;
        /// Contacts against plane shapes.
        const PLANE_CONTACTS = 1 << 6;
    }
}

impl Capabilities {
    /// Whether shapes of `kind` can be created.
    pub fn supports_shape(&self, kind: ShapeKind) -> bool {
        kind != ShapeKind::Compound || self.contains(Capabilities::COMPOUND_SHAPES)
    }
}

/// A rigid-body solver.
///
/// Joint setters have default implementations that write the native joint
/// record; back ends that cannot honour one override it to report
/// [`PhysicsError::NotImplemented`].
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> Capabilities;

    fn world(&self) -> &RigidSet;

    fn world_mut(&mut self) -> &mut RigidSet;

    /// Advance every native body by `dt`. Force accumulators and applied
    /// joint forces are consumed.
    fn step(&mut self, dt: f64) -> Result<()>;

    /// Target joint velocity for the motor on the joint axis.
    fn set_joint_velocity(&mut self, id: JointId, velocity: f64) -> Result<()> {
        self.world_mut().joint_mut(id)?.motor_velocity = Some(velocity);
        Ok(())
    }

    /// Generalized force applied along the joint axis during the next step.
    fn set_joint_force(&mut self, id: JointId, force: f64) -> Result<()> {
        self.world_mut().joint_mut(id)?.applied_force = force;
        Ok(())
    }

    /// Force limit for the joint motor.
    fn set_joint_max_force(&mut self, id: JointId, max_force: f64) -> Result<()> {
        self.world_mut().joint_mut(id)?.max_force = max_force;
        Ok(())
    }

    fn not_implemented(&self, operation: &'static str) -> PhysicsError {
        PhysicsError::NotImplemented {
            backend: self.kind().name(),
            operation,
        }
    }
}

/// Construct the back end named by `config`.
pub fn create_backend(config: &EngineConfig) -> Result<Box<dyn Backend>> {
    let kind = config.validate()?;
    let world = RigidSet::new(config.gravity);
    let backend: Box<dyn Backend> = match kind {
        BackendKind::SequentialImpulse => Box::new(SequentialImpulse::new(world, config)),
        BackendKind::PositionBased => Box::new(PositionBased::new(world, config)),
    };
    tracing::debug!("Created {} backend", kind);
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_round_trip() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("bullet".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_position_based_lacks_motor_and_compound() {
        let sequential = create_backend(&EngineConfig::default()).unwrap();
        let position =
            create_backend(&EngineConfig::with_backend(BackendKind::PositionBased)).unwrap();

        assert!(sequential.capabilities().supports_shape(ShapeKind::Compound));
        assert!(!position.capabilities().supports_shape(ShapeKind::Compound));
        assert!(position.capabilities().supports_shape(ShapeKind::Ray));
        assert!(!position.capabilities().contains(Capabilities::JOINT_MOTOR));
        assert!(position.capabilities().contains(Capabilities::JOINT_LIMITS));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&BackendKind::PositionBased).unwrap();
        assert_eq!(json, "\"position_based\"");
    }
}
