//! Geometry primitives.

use physim_math::{EPSILON, MassProperties, Pose, Vec3};
use std::f64::consts::PI;

/// Half-width used for the bounds of unbounded geometry.
const UNBOUNDED: f64 = 1e6;

/// Collision geometry, expressed in its own local frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Sphere with given radius.
    Sphere { radius: f64 },
    /// Box with half-extents (width/2, height/2, depth/2).
    Box { half_extents: Vec3 },
    /// Cylinder along Z axis, centred on the origin.
    Cylinder { radius: f64, length: f64 },
    /// Infinite plane through the origin with unit outward normal.
    Plane { normal: Vec3 },
    /// Rigid union of posed solid parts.
    Compound { parts: Vec<(Pose, Geometry)> },
}

impl Geometry {
    /// Box from full edge lengths.
    pub fn cuboid(size: Vec3) -> Self {
        Geometry::Box {
            half_extents: size * 0.5,
        }
    }

    /// Plane with the given (not necessarily unit) normal.
    pub fn plane(normal: Vec3) -> Self {
        let n = normal.norm();
        let normal = if n > EPSILON { normal / n } else { Vec3::z() };
        Geometry::Plane { normal }
    }

    /// True for geometry that encloses a finite volume.
    pub fn is_solid(&self) -> bool {
        !matches!(self, Geometry::Plane { .. })
    }

    /// Enclosed volume. Planes have none.
    pub fn volume(&self) -> f64 {
        match self {
            Geometry::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Geometry::Box { half_extents } => {
                8.0 * half_extents.x * half_extents.y * half_extents.z
            }
            Geometry::Cylinder { radius, length } => PI * radius * radius * length,
            Geometry::Plane { .. } => 0.0,
            Geometry::Compound { parts } => parts.iter().map(|(_, g)| g.volume()).sum(),
        }
    }

    /// Mass properties of this geometry filled uniformly with `mass`.
    ///
    /// Compound parts share the mass in proportion to their volume. Planes
    /// are massless.
    pub fn mass_properties(&self, mass: f64) -> MassProperties {
        match self {
            Geometry::Sphere { radius } => MassProperties::sphere(mass, *radius),
            Geometry::Box { half_extents } => MassProperties::solid_box(mass, half_extents * 2.0),
            Geometry::Cylinder { radius, length } => {
                MassProperties::cylinder(mass, *radius, *length)
            }
            Geometry::Plane { .. } => MassProperties::zero(),
            Geometry::Compound { parts } => {
                let total = self.volume();
                if total <= EPSILON {
                    return MassProperties::zero();
                }
                let shares: Vec<MassProperties> = parts
                    .iter()
                    .map(|(pose, g)| g.mass_properties(mass * g.volume() / total).transformed(pose))
                    .collect();
                MassProperties::combine(shares.iter())
            }
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    /// Create AABB from min/max corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An empty box that any merge replaces.
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f64::INFINITY),
            max: Vec3::repeat(f64::NEG_INFINITY),
        }
    }

    /// True if no point has been merged in.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Compute the world AABB of a geometry placed at `pose`.
    pub fn from_geometry(geom: &Geometry, pose: &Pose) -> Self {
        match geom {
            Geometry::Sphere { radius } => {
                let c = pose.translation.vector;
                let r = Vec3::repeat(*radius);
                AABB::new(c - r, c + r)
            }
            Geometry::Box { half_extents } => Self::from_local_extents(half_extents, pose),
            Geometry::Cylinder { radius, length } => {
                Self::from_local_extents(&Vec3::new(*radius, *radius, length * 0.5), pose)
            }
            Geometry::Plane { .. } => {
                AABB::new(Vec3::repeat(-UNBOUNDED), Vec3::repeat(UNBOUNDED))
            }
            Geometry::Compound { parts } => parts.iter().fold(AABB::empty(), |acc, (p, g)| {
                acc.merged(&AABB::from_geometry(g, &(pose * p)))
            }),
        }
    }

    /// Bounds of the local box `[-h, h]` after transforming by `pose`.
    fn from_local_extents(h: &Vec3, pose: &Pose) -> Self {
        let mut aabb = AABB::empty();
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    let corner = Vec3::new(sx * h.x, sy * h.y, sz * h.z);
                    aabb = aabb.including(&pose.transform_point(&corner.into()).coords);
                }
            }
        }
        aabb
    }

    /// Grow to include a point.
    pub fn including(&self, p: &Vec3) -> Self {
        AABB::new(self.min.inf(p), self.max.sup(p))
    }

    /// Smallest box containing both.
    pub fn merged(&self, other: &AABB) -> Self {
        AABB::new(self.min.inf(&other.min), self.max.sup(&other.max))
    }

    /// Slab test: entry distance of a ray into this box, if within `max_distance`.
    pub fn ray_entry(&self, origin: &Vec3, dir: &Vec3, max_distance: f64) -> Option<f64> {
        let mut t_min = 0.0_f64;
        let mut t_max = max_distance;
        for i in 0..3 {
            if dir[i].abs() < EPSILON {
                if origin[i] < self.min[i] || origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let (t0, t1) = {
                let a = (self.min[i] - origin[i]) * inv;
                let b = (self.max[i] - origin[i]) * inv;
                if a < b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use physim_math::pose_from_xyz_rpy;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_box_aabb_under_rotation() {
        let g = Geometry::cuboid(Vec3::new(2.0, 2.0, 2.0));
        let pose = pose_from_xyz_rpy(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, FRAC_PI_4));
        let aabb = AABB::from_geometry(&g, &pose);
        let r = 2.0_f64.sqrt();
        assert_relative_eq!(aabb.min, Vec3::new(1.0 - r, -r, -1.0), epsilon = 1e-12);
        assert_relative_eq!(aabb.max, Vec3::new(1.0 + r, r, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_compound_aabb_covers_parts() {
        let g = Geometry::Compound {
            parts: vec![
                (Pose::translation(-1.0, 0.0, 0.0), Geometry::Sphere { radius: 0.5 }),
                (Pose::translation(2.0, 0.0, 0.0), Geometry::Sphere { radius: 0.25 }),
            ],
        };
        let aabb = AABB::from_geometry(&g, &Pose::translation(0.0, 0.0, 1.0));
        assert_relative_eq!(aabb.min, Vec3::new(-1.5, -0.5, 0.5), epsilon = 1e-12);
        assert_relative_eq!(aabb.max, Vec3::new(2.25, 0.5, 1.5), epsilon = 1e-12);
    }

    #[test]
    fn test_compound_mass_split_by_volume() {
        let cube = Geometry::cuboid(Vec3::new(1.0, 1.0, 1.0));
        let g = Geometry::Compound {
            parts: vec![
                (Pose::translation(-1.0, 0.0, 0.0), cube.clone()),
                (Pose::translation(1.0, 0.0, 0.0), cube),
            ],
        };
        let mp = g.mass_properties(2.0);
        assert_relative_eq!(mp.mass, 2.0, epsilon = 1e-12);
        assert_relative_eq!(mp.cog, Vec3::zeros(), epsilon = 1e-12);
        // Each cube: 1/6 about its own centre, plus m*d^2 = 1 about Y and Z.
        assert_relative_eq!(mp.inertia[(0, 0)], 2.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(mp.inertia[(1, 1)], 2.0 / 6.0 + 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_plane_is_massless_and_unbounded() {
        let g = Geometry::plane(Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(g, Geometry::Plane { normal: Vec3::z() });
        assert!(!g.is_solid());
        assert!(g.mass_properties(5.0).is_zero());
        let bounds = AABB::from_geometry(&g, &Pose::identity());
        assert!(bounds.min.iter().all(|m| *m < -1e3));
        assert!(bounds.max.iter().all(|m| *m > 1e3));
    }

    #[test]
    fn test_ray_entry() {
        let aabb = AABB::new(Vec3::new(1.0, -1.0, -1.0), Vec3::new(2.0, 1.0, 1.0));
        let t = aabb.ray_entry(&Vec3::zeros(), &Vec3::x(), 10.0).unwrap();
        assert_relative_eq!(t, 1.0);
        assert!(aabb.ray_entry(&Vec3::zeros(), &Vec3::x(), 0.5).is_none());
        assert!(aabb.ray_entry(&Vec3::zeros(), &Vec3::y(), 10.0).is_none());
    }
}
