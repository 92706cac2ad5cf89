//! Contact generation between solid geometry and infinite planes.

use crate::geometry::Geometry;
use physim_math::{Pose, Vec3};
use std::f64::consts::TAU;

/// Rim points sampled per cylinder cap.
const CYLINDER_RIM_SAMPLES: usize = 8;

/// One penetrating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Deepest point of the solid, world frame.
    pub point: Vec3,
    /// Plane normal, pointing out of the plane towards the solid.
    pub normal: Vec3,
    /// Penetration depth (positive = penetrating).
    pub depth: f64,
}

/// Contacts of `geom` at `pose` against the plane through `plane_point`
/// with unit `plane_normal`.
pub fn plane_contacts(
    geom: &Geometry,
    pose: &Pose,
    plane_point: &Vec3,
    plane_normal: &Vec3,
) -> Vec<Contact> {
    let mut out = Vec::new();
    collect(geom, pose, plane_point, plane_normal, &mut out);
    out
}

fn collect(geom: &Geometry, pose: &Pose, p0: &Vec3, n: &Vec3, out: &mut Vec<Contact>) {
    let mut test = |point: Vec3| {
        let depth = -n.dot(&(point - p0));
        if depth > 0.0 {
            out.push(Contact {
                point,
                normal: *n,
                depth,
            });
        }
    };
    let world = |local: Vec3| pose.transform_point(&local.into()).coords;

    match geom {
        Geometry::Sphere { radius } => test(pose.translation.vector - n * *radius),
        Geometry::Box { half_extents: h } => {
            for sx in [-1.0, 1.0] {
                for sy in [-1.0, 1.0] {
                    for sz in [-1.0, 1.0] {
                        test(world(Vec3::new(sx * h.x, sy * h.y, sz * h.z)));
                    }
                }
            }
        }
        Geometry::Cylinder { radius, length } => {
            for z in [-0.5 * length, 0.5 * length] {
                for k in 0..CYLINDER_RIM_SAMPLES {
                    let a = TAU * k as f64 / CYLINDER_RIM_SAMPLES as f64;
                    test(world(Vec3::new(radius * a.cos(), radius * a.sin(), z)));
                }
            }
        }
        Geometry::Plane { .. } => {}
        Geometry::Compound { parts } => {
            for (p, g) in parts {
                collect(g, &(pose * p), p0, n, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_resting_in_ground() {
        let g = Geometry::Sphere { radius: 0.5 };
        let contacts = plane_contacts(
            &g,
            &Pose::translation(1.0, 2.0, 0.4),
            &Vec3::zeros(),
            &Vec3::z(),
        );
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].depth, 0.1, epsilon = 1e-12);
        assert_relative_eq!(contacts[0].point, Vec3::new(1.0, 2.0, -0.1), epsilon = 1e-12);
    }

    #[test]
    fn test_box_bottom_face() {
        let g = Geometry::cuboid(Vec3::new(1.0, 1.0, 1.0));
        let contacts = plane_contacts(
            &g,
            &Pose::translation(0.0, 0.0, 0.45),
            &Vec3::zeros(),
            &Vec3::z(),
        );
        assert_eq!(contacts.len(), 4);
        for c in &contacts {
            assert_relative_eq!(c.depth, 0.05, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_separated_and_planes_produce_nothing() {
        let g = Geometry::Sphere { radius: 0.5 };
        assert!(plane_contacts(&g, &Pose::translation(0.0, 0.0, 2.0), &Vec3::zeros(), &Vec3::z()).is_empty());
        let p = Geometry::plane(Vec3::z());
        assert!(plane_contacts(&p, &Pose::identity(), &Vec3::zeros(), &Vec3::z()).is_empty());
    }
}
