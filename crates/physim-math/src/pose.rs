//! Rigid poses (position + orientation).

use crate::Vec3;
use nalgebra as na;

/// Rigid transform from a local frame into its parent frame.
pub type Pose = na::Isometry3<f64>;

/// Build a pose from a translation and roll/pitch/yaw angles (radians).
pub fn pose_from_xyz_rpy(xyz: Vec3, rpy: Vec3) -> Pose {
    Pose::from_parts(
        na::Translation3::from(xyz),
        na::UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
    )
}

/// Split a pose into translation and roll/pitch/yaw angles.
pub fn pose_to_xyz_rpy(pose: &Pose) -> (Vec3, Vec3) {
    let (r, p, y) = pose.rotation.euler_angles();
    (pose.translation.vector, Vec3::new(r, p, y))
}

/// True when every component of the pose is finite.
pub fn is_finite_pose(pose: &Pose) -> bool {
    pose.translation.vector.iter().all(|c| c.is_finite())
        && pose.rotation.coords.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_xyz_rpy_roundtrip() {
        let xyz = Vec3::new(1.0, -2.0, 3.0);
        let rpy = Vec3::new(0.1, -0.4, 1.2);
        let pose = pose_from_xyz_rpy(xyz, rpy);
        let (xyz2, rpy2) = pose_to_xyz_rpy(&pose);
        assert_relative_eq!(xyz, xyz2, epsilon = 1e-12);
        assert_relative_eq!(rpy, rpy2, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_pose_detected() {
        let mut pose = Pose::identity();
        assert!(is_finite_pose(&pose));
        pose.translation.vector.z = f64::NAN;
        assert!(!is_finite_pose(&pose));
    }
}
