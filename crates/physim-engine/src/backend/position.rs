//! Position-based back end.
//!
//! Substepped extended position-based dynamics: predict poses from
//! velocities, project joint, stop and contact constraints directly on the
//! poses, then derive velocities from the pose change. Joint motors, joint
//! forces, motor force limits and compound shapes are not available.

use super::constraint::JointFrame;
use super::rigid::RigidSet;
use super::{Backend, BackendKind, Capabilities};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::id::{BodyId, JointId};
use crate::joint::JointKind;
use physim_math::{EPSILON, Mat3, Pose, Quat, Vec3};

/// Constraint projection solver.
#[derive(Debug)]
pub struct PositionBased {
    world: RigidSet,
    iterations: u32,
    substeps: u32,
    /// Contact compliance (m/N).
    contact_compliance: f64,
}

impl PositionBased {
    pub fn new(world: RigidSet, config: &EngineConfig) -> Self {
        Self {
            world,
            iterations: config.iterations,
            substeps: config.substeps,
            contact_compliance: 1.0 / config.contact_stiffness,
        }
    }

    fn project_joints(&mut self) -> Result<()> {
        let ids: Vec<JointId> = self.world.joints().map(|(id, _)| id).collect();
        for id in ids {
            let j = self.world.joint(id)?.clone();

            let f = JointFrame::new(&self.world, &j);
            match j.kind {
                JointKind::Fixed | JointKind::Prismatic => {
                    self.angular(j.parent, j.child, f.orientation_error(&j), 0.0);
                }
                JointKind::Revolute => {
                    self.angular(j.parent, j.child, f.axis_error(), 0.0);
                    let f = JointFrame::new(&self.world, &j);
                    let over = f.limit_violation(&j);
                    if over != 0.0 {
                        self.angular(j.parent, j.child, f.axis * over, 0.0);
                    }
                }
                JointKind::Ball => {}
            }

            let f = JointFrame::new(&self.world, &j);
            match j.kind {
                JointKind::Prismatic => {
                    let sep = f.separation();
                    let drift = sep - f.axis * sep.dot(&f.axis) + f.axis * f.limit_violation(&j);
                    self.positional(j.parent, j.child, &f.anchor_child, &f.anchor_child, drift, 0.0);
                }
                _ => {
                    let sep = f.separation();
                    self.positional(j.parent, j.child, &f.anchor_parent, &f.anchor_child, sep, 0.0);
                }
            }
        }
        Ok(())
    }

    fn project_contacts(&mut self, alpha: f64) {
        for pc in self.world.plane_contacts() {
            let c = pc.contact;
            let surface = c.point + c.normal * c.depth;
            self.positional(
                Some(pc.plane_body),
                Some(pc.body),
                &surface,
                &c.point,
                -c.normal * c.depth,
                alpha,
            );
        }
    }

    /// Remove the offset `drift` between point `pa` on `a` and `pb` on `b`
    /// (`drift` points from where `b` should be towards where it is).
    fn positional(
        &mut self,
        a: Option<BodyId>,
        b: Option<BodyId>,
        pa: &Vec3,
        pb: &Vec3,
        drift: Vec3,
        alpha: f64,
    ) {
        let c = drift.norm();
        if c < EPSILON {
            return;
        }
        let n = drift / c;
        let sa = self.world.side(a);
        let sb = self.world.side(b);
        let ra = pa - sa.position();
        let rb = pb - sb.position();
        let weight = |inv_mass: f64, inv_inertia: &Mat3, r: &Vec3| {
            let rn = r.cross(&n);
            inv_mass + rn.dot(&(inv_inertia * rn))
        };
        let w = weight(sa.inv_mass, &sa.inv_inertia, &ra)
            + weight(sb.inv_mass, &sb.inv_inertia, &rb)
            + alpha;
        if w <= EPSILON {
            return;
        }
        let p = n * (-c / w);

        if let Some(body) = b.and_then(|id| self.world.body_mut(id).ok()) {
            if body.is_dynamic() {
                let iw = body.inv_inertia_world();
                body.com_pose.translation.vector += p * body.inv_mass;
                rotate(&mut body.com_pose, iw * rb.cross(&p));
            }
        }
        if let Some(body) = a.and_then(|id| self.world.body_mut(id).ok()) {
            if body.is_dynamic() {
                let iw = body.inv_inertia_world();
                body.com_pose.translation.vector -= p * body.inv_mass;
                rotate(&mut body.com_pose, -(iw * ra.cross(&p)));
            }
        }
    }

    /// Remove the rotation `drift` of `b` relative to `a`.
    fn angular(&mut self, a: Option<BodyId>, b: Option<BodyId>, drift: Vec3, alpha: f64) {
        let theta = drift.norm();
        if theta < EPSILON {
            return;
        }
        let n = drift / theta;
        let sa = self.world.side(a);
        let sb = self.world.side(b);
        let w = n.dot(&(sa.inv_inertia * n)) + n.dot(&(sb.inv_inertia * n)) + alpha;
        if w <= EPSILON {
            return;
        }
        let p = n * (-theta / w);

        if let Some(body) = b.and_then(|id| self.world.body_mut(id).ok()) {
            if body.is_dynamic() {
                let iw = body.inv_inertia_world();
                rotate(&mut body.com_pose, iw * p);
            }
        }
        if let Some(body) = a.and_then(|id| self.world.body_mut(id).ok()) {
            if body.is_dynamic() {
                let iw = body.inv_inertia_world();
                rotate(&mut body.com_pose, -(iw * p));
            }
        }
    }
}

fn rotate(pose: &mut Pose, by: Vec3) {
    pose.rotation = Quat::from_scaled_axis(by) * pose.rotation;
}

impl Backend for PositionBased {
    fn kind(&self) -> BackendKind {
        BackendKind::PositionBased
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::JOINT_LIMITS | Capabilities::JOINT_DAMPING | Capabilities::PLANE_CONTACTS
    }

    fn world(&self) -> &RigidSet {
        &self.world
    }

    fn world_mut(&mut self) -> &mut RigidSet {
        &mut self.world
    }

    fn step(&mut self, dt: f64) -> Result<()> {
        let h = dt / self.substeps as f64;
        let alpha = self.contact_compliance / (h * h);
        self.world.apply_joint_loads();

        for _ in 0..self.substeps {
            let previous: Vec<(BodyId, Pose)> = self
                .world
                .bodies()
                .filter(|(_, b)| b.is_dynamic())
                .map(|(id, b)| (id, b.com_pose))
                .collect();

            self.world.integrate_velocities(h);
            self.world.integrate_positions(h);

            for _ in 0..self.iterations {
                self.project_joints()?;
                self.project_contacts(alpha);
            }

            for (id, before) in previous {
                let body = self.world.body_mut(id)?;
                body.linear_velocity =
                    (body.com_pose.translation.vector - before.translation.vector) / h;
                let dq = body.com_pose.rotation * before.rotation.inverse();
                body.angular_velocity = dq.scaled_axis() / h;
            }
        }

        self.world.clear_accumulators();
        Ok(())
    }

    fn set_joint_velocity(&mut self, _id: JointId, _velocity: f64) -> Result<()> {
        Err(self.not_implemented("joint velocity motors"))
    }

    fn set_joint_force(&mut self, _id: JointId, _force: f64) -> Result<()> {
        Err(self.not_implemented("joint forces"))
    }

    fn set_joint_max_force(&mut self, _id: JointId, _max_force: f64) -> Result<()> {
        Err(self.not_implemented("joint max force"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rigid::NativeBody;
    use crate::error::PhysicsError;
    use crate::id::EngineId;
    use approx::assert_relative_eq;
    use physim_math::{GRAVITY, MassProperties};

    fn backend() -> PositionBased {
        let config = EngineConfig::with_backend(BackendKind::PositionBased);
        PositionBased::new(RigidSet::new(config.gravity), &config)
    }

    fn ball(world: &mut RigidSet, id: BodyId, at: Pose) {
        let mut body = NativeBody::new(at, 0.0, 0.0);
        body.set_mass(&MassProperties::sphere(1.0, 0.1));
        world.insert_body(id, body);
    }

    #[test]
    fn test_free_fall_velocity() {
        let e = EngineId::next();
        let id = BodyId::new(e, 0);
        let mut pb = backend();
        ball(pb.world_mut(), id, Pose::identity());
        for _ in 0..100 {
            pb.step(0.01).unwrap();
        }
        let v = pb.world().body(id).unwrap().linear_velocity;
        assert_relative_eq!(v.z, -GRAVITY, epsilon = 1e-6);
    }

    #[test]
    fn test_ball_joint_holds_anchor() {
        let e = EngineId::next();
        let id = BodyId::new(e, 0);
        let mut pb = backend();
        ball(pb.world_mut(), id, Pose::translation(0.5, 0.0, 0.0));
        let joint = pb
            .world()
            .connect(JointKind::Ball, None, Some(id), &Vec3::zeros(), &Vec3::z());
        pb.world_mut().insert_joint(JointId::new(e, 1), joint);
        for _ in 0..300 {
            pb.step(0.001).unwrap();
        }
        let p = pb.world().body(id).unwrap().position();
        assert_relative_eq!(p.norm(), 0.5, epsilon = 1e-4);
        assert!(p.z < -0.05);
    }

    #[test]
    fn test_motor_operations_not_implemented() {
        let mut pb = backend();
        let id = JointId::new(EngineId::next(), 0);
        assert!(matches!(
            pb.set_joint_velocity(id, 1.0),
            Err(PhysicsError::NotImplemented { .. })
        ));
        assert!(matches!(
            pb.set_joint_max_force(id, 1.0),
            Err(PhysicsError::NotImplemented { .. })
        ));
    }
}
