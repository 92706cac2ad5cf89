//! Math primitives for the physim simulation core.
//!
//! Thin aliases over nalgebra plus the two quantities every other crate
//! shares: rigid poses and rigid-body mass properties.

pub mod mass;
pub mod pose;

pub use mass::MassProperties;
pub use pose::{Pose, is_finite_pose, pose_from_xyz_rpy, pose_to_xyz_rpy};

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = na::Matrix3<f64>;
/// Unit quaternion alias.
pub type Quat = na::UnitQuaternion<f64>;

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.80665;

/// Tolerance below which masses and lengths are treated as zero.
pub const EPSILON: f64 = 1e-12;

/// Any unit vector perpendicular to `v`.
pub fn any_orthogonal(v: &Vec3) -> Vec3 {
    let candidate = if v.x.abs() < 0.9 { Vec3::x() } else { Vec3::y() };
    v.cross(&candidate).normalize()
}
