//! Rigid-body mass properties and their composition.
//!
//! Inertia tensors are always expressed about the centre of gravity, in the
//! frame the centre of gravity is given in. Composition moves every part to
//! the composite centre with the parallel-axis theorem.

use crate::{EPSILON, Mat3, Pose, Vec3};

/// Mass, centre of gravity and inertia of a rigid body or body part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    /// Mass (kg). Zero means static / massless.
    pub mass: f64,
    /// Centre of gravity in the owning frame.
    pub cog: Vec3,
    /// Rotational inertia about the centre of gravity (3x3 symmetric).
    pub inertia: Mat3,
}

impl MassProperties {
    /// Create mass properties from mass, centre of gravity and inertia.
    pub fn new(mass: f64, cog: Vec3, inertia: Mat3) -> Self {
        Self { mass, cog, inertia }
    }

    /// No mass at all.
    pub fn zero() -> Self {
        Self {
            mass: 0.0,
            cog: Vec3::zeros(),
            inertia: Mat3::zeros(),
        }
    }

    /// A point mass at `pos`.
    pub fn point_mass(mass: f64, pos: Vec3) -> Self {
        Self {
            mass,
            cog: pos,
            inertia: Mat3::zeros(),
        }
    }

    /// Uniform solid sphere centred at the origin.
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 2.0 / 5.0 * mass * radius * radius;
        Self {
            mass,
            cog: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(i, i, i)),
        }
    }

    /// Uniform solid box with full edge lengths `size`, centred at the origin.
    pub fn solid_box(mass: f64, size: Vec3) -> Self {
        let (x2, y2, z2) = (size.x * size.x, size.y * size.y, size.z * size.z);
        Self {
            mass,
            cog: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(
                mass * (y2 + z2) / 12.0,
                mass * (x2 + z2) / 12.0,
                mass * (x2 + y2) / 12.0,
            )),
        }
    }

    /// Uniform solid cylinder along Z, centred at the origin.
    pub fn cylinder(mass: f64, radius: f64, length: f64) -> Self {
        let ixy = mass * (3.0 * radius * radius + length * length) / 12.0;
        let iz = 0.5 * mass * radius * radius;
        Self {
            mass,
            cog: Vec3::zeros(),
            inertia: Mat3::from_diagonal(&Vec3::new(ixy, ixy, iz)),
        }
    }

    /// True when the mass is negligible.
    pub fn is_zero(&self) -> bool {
        self.mass <= EPSILON
    }

    /// Express these properties in the parent frame of `pose`.
    pub fn transformed(&self, pose: &Pose) -> Self {
        let rot = pose.rotation.to_rotation_matrix();
        let r = rot.matrix();
        Self {
            mass: self.mass,
            cog: pose.transform_point(&self.cog.into()).coords,
            inertia: r * self.inertia * r.transpose(),
        }
    }

    /// Inertia about an arbitrary `point` (parallel-axis theorem).
    pub fn inertia_about(&self, point: &Vec3) -> Mat3 {
        let d = self.cog - point;
        self.inertia + (Mat3::identity() * d.dot(&d) - d * d.transpose()) * self.mass
    }

    /// Combine several parts into one composite body.
    ///
    /// The composite centre of gravity is the mass-weighted mean of the part
    /// centres; each part inertia is shifted to it with the parallel-axis
    /// theorem. Massless parts contribute nothing.
    pub fn combine<'a, I>(parts: I) -> Self
    where
        I: IntoIterator<Item = &'a MassProperties>,
    {
        let parts: Vec<&MassProperties> = parts.into_iter().filter(|p| !p.is_zero()).collect();
        let mass: f64 = parts.iter().map(|p| p.mass).sum();
        if mass <= EPSILON {
            return Self::zero();
        }

        let cog = parts
            .iter()
            .fold(Vec3::zeros(), |acc, p| acc + p.cog * p.mass)
            / mass;
        let inertia = parts
            .iter()
            .fold(Mat3::zeros(), |acc, p| acc + p.inertia_about(&cog));

        Self { mass, cog, inertia }
    }

    /// 1/m, or zero for static bodies.
    pub fn inverse_mass(&self) -> f64 {
        if self.is_zero() { 0.0 } else { 1.0 / self.mass }
    }

    /// Inverse inertia about the centre of gravity.
    ///
    /// Singular tensors (point masses, static bodies) invert to zero, which
    /// locks rotation instead of producing infinite angular acceleration.
    pub fn inverse_inertia(&self) -> Mat3 {
        if self.is_zero() {
            return Mat3::zeros();
        }
        self.inertia.try_inverse().unwrap_or_else(Mat3::zeros)
    }
}

impl Default for MassProperties {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose_from_xyz_rpy;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_inertia() {
        let mp = MassProperties::sphere(5.0, 0.1);
        let expected_i = 2.0 / 5.0 * 5.0 * 0.01;
        assert_relative_eq!(mp.inertia[(0, 0)], expected_i, epsilon = 1e-12);
        assert_relative_eq!(mp.inertia[(2, 2)], expected_i, epsilon = 1e-12);
    }

    #[test]
    fn test_combine_two_point_masses() {
        let a = MassProperties::point_mass(1.0, Vec3::new(-1.0, 0.0, 0.0));
        let b = MassProperties::point_mass(1.0, Vec3::new(1.0, 0.0, 0.0));
        let c = MassProperties::combine([&a, &b]);

        assert_relative_eq!(c.mass, 2.0);
        assert_relative_eq!(c.cog, Vec3::zeros(), epsilon = 1e-12);
        // Dumbbell: no inertia about X, m*d^2 summed about Y and Z.
        assert_relative_eq!(c.inertia[(0, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(c.inertia[(1, 1)], 2.0, epsilon = 1e-12);
        assert_relative_eq!(c.inertia[(2, 2)], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_combine_skips_massless_parts() {
        let a = MassProperties::sphere(2.0, 0.5);
        let c = MassProperties::combine([&a, &MassProperties::zero()]);
        assert_eq!(c, a);
        assert!(MassProperties::combine(std::iter::empty::<&MassProperties>()).is_zero());
    }

    #[test]
    fn test_transformed_moves_cog_and_rotates_inertia() {
        let b = MassProperties::solid_box(3.0, Vec3::new(2.0, 1.0, 1.0));
        let pose = pose_from_xyz_rpy(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
        );
        let t = b.transformed(&pose);
        assert_relative_eq!(t.cog, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        // Long axis now along Y: Ixx and Iyy swap.
        assert_relative_eq!(t.inertia[(0, 0)], b.inertia[(1, 1)], epsilon = 1e-12);
        assert_relative_eq!(t.inertia[(1, 1)], b.inertia[(0, 0)], epsilon = 1e-12);
    }

    #[test]
    fn test_static_inverse_is_zero() {
        let z = MassProperties::zero();
        assert_eq!(z.inverse_mass(), 0.0);
        assert_eq!(z.inverse_inertia(), Mat3::zeros());
        let p = MassProperties::point_mass(1.0, Vec3::zeros());
        assert_eq!(p.inverse_inertia(), Mat3::zeros());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn arb_pos() -> impl Strategy<Value = Vec3> {
        (-5.0..5.0_f64, -5.0..5.0_f64, -5.0..5.0_f64).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    fn arb_part() -> impl Strategy<Value = MassProperties> {
        (0.1..20.0_f64, 0.01..2.0_f64, arb_pos()).prop_map(|(m, r, pos)| {
            let mut mp = MassProperties::sphere(m, r);
            mp.cog = pos;
            mp
        })
    }

    proptest! {
        #[test]
        fn combined_inertia_is_symmetric(parts in prop::collection::vec(arb_part(), 1..6)) {
            let c = MassProperties::combine(parts.iter());
            for i in 0..3 {
                for j in 0..3 {
                    prop_assert!((c.inertia[(i, j)] - c.inertia[(j, i)]).abs() < EPS,
                        "not symmetric at ({},{})", i, j);
                }
            }
        }

        #[test]
        fn combined_mass_is_sum(parts in prop::collection::vec(arb_part(), 1..6)) {
            let c = MassProperties::combine(parts.iter());
            let total: f64 = parts.iter().map(|p| p.mass).sum();
            prop_assert!((c.mass - total).abs() < EPS);
        }

        #[test]
        fn combining_is_order_independent(parts in prop::collection::vec(arb_part(), 2..6)) {
            let forward = MassProperties::combine(parts.iter());
            let backward = MassProperties::combine(parts.iter().rev());
            prop_assert!((forward.cog - backward.cog).norm() < EPS);
            prop_assert!((forward.inertia - backward.inertia).norm() < 1e-7);
        }
    }
}
