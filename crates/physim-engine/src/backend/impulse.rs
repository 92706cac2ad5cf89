//! Sequential-impulse back end.
//!
//! Semi-implicit Euler with velocity-level constraint rows solved by
//! projected Gauss-Seidel. Position drift is fed back through a Baumgarte
//! bias scaled by `erp`.

use super::constraint::{JointFrame, tangents};
use super::rigid::{NativeJoint, PlaneContact, RigidSet};
use super::{Backend, BackendKind, Capabilities};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::id::BodyId;
use crate::joint::JointKind;
use physim_math::{EPSILON, Mat3, Vec3};
use std::collections::BTreeMap;

/// Penetration tolerated before contacts push back (m).
const CONTACT_SLOP: f64 = 1e-3;

/// Impulse-based solver.
#[derive(Debug)]
pub struct SequentialImpulse {
    world: RigidSet,
    iterations: u32,
    erp: f64,
    friction: f64,
}

impl SequentialImpulse {
    pub fn new(world: RigidSet, config: &EngineConfig) -> Self {
        Self {
            world,
            iterations: config.iterations,
            erp: config.erp,
            friction: config.friction,
        }
    }
}

impl Backend for SequentialImpulse {
    fn kind(&self) -> BackendKind {
        BackendKind::SequentialImpulse
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn world(&self) -> &RigidSet {
        &self.world
    }

    fn world_mut(&mut self) -> &mut RigidSet {
        &mut self.world
    }

    fn step(&mut self, dt: f64) -> Result<()> {
        self.world.apply_joint_loads();
        self.world.integrate_velocities(dt);

        let mut rows = RowSolver::new(&self.world);
        for (_, joint) in self.world.joints() {
            rows.add_joint(&self.world, joint, dt, self.erp);
        }
        for contact in self.world.plane_contacts() {
            rows.add_contact(&self.world, &contact, dt, self.erp, self.friction);
        }
        rows.solve(self.iterations);
        rows.write_back(&mut self.world)?;

        self.world.integrate_positions(dt);
        self.world.clear_accumulators();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SolverBody {
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    inv_mass: f64,
    inv_inertia: Mat3,
}

/// One scalar velocity constraint `J v = bias` with impulse bounds.
#[derive(Debug, Clone, Copy)]
struct Row {
    a: Option<usize>,
    b: Option<usize>,
    ja_lin: Vec3,
    ja_ang: Vec3,
    jb_lin: Vec3,
    jb_ang: Vec3,
    bias: f64,
    lo: f64,
    hi: f64,
    eff_mass: f64,
    lambda: f64,
    /// Friction rows are bounded by `mu` times the impulse of a normal row.
    friction: Option<(usize, f64)>,
}

struct RowSolver {
    index: BTreeMap<BodyId, usize>,
    bodies: Vec<(BodyId, SolverBody)>,
    rows: Vec<Row>,
}

impl RowSolver {
    fn new(world: &RigidSet) -> Self {
        let mut index = BTreeMap::new();
        let mut bodies = Vec::new();
        for (id, body) in world.bodies().filter(|(_, b)| b.is_dynamic()) {
            index.insert(id, bodies.len());
            bodies.push((
                id,
                SolverBody {
                    linear_velocity: body.linear_velocity,
                    angular_velocity: body.angular_velocity,
                    inv_mass: body.inv_mass,
                    inv_inertia: body.inv_inertia_world(),
                },
            ));
        }
        Self {
            index,
            bodies,
            rows: Vec::new(),
        }
    }

    fn slot(&self, id: Option<BodyId>) -> Option<usize> {
        id.and_then(|id| self.index.get(&id).copied())
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        a: Option<usize>,
        b: Option<usize>,
        ja: (Vec3, Vec3),
        jb: (Vec3, Vec3),
        bias: f64,
        lo: f64,
        hi: f64,
    ) -> Option<usize> {
        let mut k = 0.0;
        if let Some(i) = a {
            let body = &self.bodies[i].1;
            k += body.inv_mass * ja.0.norm_squared() + ja.1.dot(&(body.inv_inertia * ja.1));
        }
        if let Some(i) = b {
            let body = &self.bodies[i].1;
            k += body.inv_mass * jb.0.norm_squared() + jb.1.dot(&(body.inv_inertia * jb.1));
        }
        if k <= EPSILON {
            return None;
        }
        self.rows.push(Row {
            a,
            b,
            ja_lin: ja.0,
            ja_ang: ja.1,
            jb_lin: jb.0,
            jb_ang: jb.1,
            bias,
            lo,
            hi,
            eff_mass: 1.0 / k,
            lambda: 0.0,
            friction: None,
        });
        Some(self.rows.len() - 1)
    }

    /// Relative velocity of the point `p` along `e`, seen from body `b` minus body `a`.
    #[allow(clippy::too_many_arguments)]
    fn push_linear(
        &mut self,
        a: Option<usize>,
        b: Option<usize>,
        xa: &Vec3,
        xb: &Vec3,
        pa: &Vec3,
        pb: &Vec3,
        e: &Vec3,
        bias: f64,
        lo: f64,
        hi: f64,
    ) -> Option<usize> {
        let ra = pa - xa;
        let rb = pb - xb;
        self.push(a, b, (-e, -ra.cross(e)), (*e, rb.cross(e)), bias, lo, hi)
    }

    fn push_angular(
        &mut self,
        a: Option<usize>,
        b: Option<usize>,
        e: &Vec3,
        bias: f64,
        lo: f64,
        hi: f64,
    ) -> Option<usize> {
        let zero = Vec3::zeros();
        self.push(a, b, (zero, -e), (zero, *e), bias, lo, hi)
    }

    fn add_joint(&mut self, world: &RigidSet, j: &NativeJoint, dt: f64, erp: f64) {
        let a = self.slot(j.parent);
        let b = self.slot(j.child);
        if a.is_none() && b.is_none() {
            return;
        }
        let f = JointFrame::new(world, j);
        let (xa, xb) = (f.parent.position(), f.child.position());
        let baumgarte = |c: f64| -erp / dt * c;
        let inf = f64::INFINITY;

        // Translation.
        match j.kind {
            JointKind::Ball | JointKind::Revolute | JointKind::Fixed => {
                let sep = f.separation();
                for e in [Vec3::x(), Vec3::y(), Vec3::z()] {
                    let bias = baumgarte(sep.dot(&e));
                    self.push_linear(
                        a, b, &xa, &xb, &f.anchor_parent, &f.anchor_child, &e, bias, -inf, inf,
                    );
                }
            }
            JointKind::Prismatic => {
                let sep = f.separation();
                let (t1, t2) = tangents(&f.axis);
                for e in [t1, t2] {
                    let bias = baumgarte(sep.dot(&e));
                    self.push_linear(
                        a, b, &xa, &xb, &f.anchor_child, &f.anchor_child, &e, bias, -inf, inf,
                    );
                }
            }
        }

        // Rotation.
        match j.kind {
            JointKind::Fixed | JointKind::Prismatic => {
                let err = f.orientation_error(j);
                for e in [Vec3::x(), Vec3::y(), Vec3::z()] {
                    self.push_angular(a, b, &e, baumgarte(err.dot(&e)), -inf, inf);
                }
            }
            JointKind::Revolute => {
                let err = f.axis_error();
                let (t1, t2) = tangents(&f.axis);
                for e in [t1, t2] {
                    self.push_angular(a, b, &e, baumgarte(err.dot(&e)), -inf, inf);
                }
            }
            JointKind::Ball => {}
        }

        if j.kind.axis_count() == 0 {
            return;
        }
        let axis_row = |solver: &mut Self, bias: f64, lo: f64, hi: f64| match j.kind {
            JointKind::Prismatic => solver.push_linear(
                a, b, &xa, &xb, &f.anchor_child, &f.anchor_child, &f.axis, bias, lo, hi,
            ),
            _ => solver.push_angular(a, b, &f.axis, bias, lo, hi),
        };

        // Stops: never cross a stop within this step, push back when past it.
        let q = f.position(j);
        if j.low_stop.is_finite() {
            let c = q - j.low_stop;
            let bias = if c >= 0.0 { -c / dt } else { baumgarte(c) };
            axis_row(self, bias, 0.0, inf);
        }
        if j.high_stop.is_finite() {
            let c = q - j.high_stop;
            let bias = if c <= 0.0 { -c / dt } else { baumgarte(c) };
            axis_row(self, bias, -inf, 0.0);
        }

        if let Some(target) = j.motor_velocity {
            let limit = j.max_force * dt;
            axis_row(self, target, -limit, limit);
        }
    }

    fn add_contact(
        &mut self,
        world: &RigidSet,
        pc: &PlaneContact,
        dt: f64,
        erp: f64,
        friction: f64,
    ) {
        let a = self.slot(Some(pc.plane_body));
        let b = self.slot(Some(pc.body));
        let xa = world.side(Some(pc.plane_body)).position();
        let xb = world.side(Some(pc.body)).position();
        let c = &pc.contact;
        let bias = erp / dt * (c.depth - CONTACT_SLOP).max(0.0);

        let Some(normal) = self.push_linear(
            a, b, &xa, &xb, &c.point, &c.point, &c.normal, bias, 0.0, f64::INFINITY,
        ) else {
            return;
        };
        if friction <= 0.0 {
            return;
        }
        let (t1, t2) = tangents(&c.normal);
        for t in [t1, t2] {
            if let Some(row) =
                self.push_linear(a, b, &xa, &xb, &c.point, &c.point, &t, 0.0, 0.0, 0.0)
            {
                self.rows[row].friction = Some((normal, friction));
            }
        }
    }

    fn solve(&mut self, iterations: u32) {
        for _ in 0..iterations {
            for r in 0..self.rows.len() {
                let row = self.rows[r];
                let (lo, hi) = match row.friction {
                    Some((n, mu)) => {
                        let bound = mu * self.rows[n].lambda;
                        (-bound, bound)
                    }
                    None => (row.lo, row.hi),
                };

                let mut jv = 0.0;
                if let Some(i) = row.a {
                    let body = &self.bodies[i].1;
                    jv += row.ja_lin.dot(&body.linear_velocity)
                        + row.ja_ang.dot(&body.angular_velocity);
                }
                if let Some(i) = row.b {
                    let body = &self.bodies[i].1;
                    jv += row.jb_lin.dot(&body.linear_velocity)
                        + row.jb_ang.dot(&body.angular_velocity);
                }

                let lambda = (row.lambda + row.eff_mass * (row.bias - jv)).max(lo).min(hi);
                let applied = lambda - row.lambda;
                self.rows[r].lambda = lambda;

                if let Some(i) = row.a {
                    let body = &mut self.bodies[i].1;
                    body.linear_velocity += row.ja_lin * (body.inv_mass * applied);
                    body.angular_velocity += body.inv_inertia * row.ja_ang * applied;
                }
                if let Some(i) = row.b {
                    let body = &mut self.bodies[i].1;
                    body.linear_velocity += row.jb_lin * (body.inv_mass * applied);
                    body.angular_velocity += body.inv_inertia * row.jb_ang * applied;
                }
            }
        }
    }

    fn write_back(self, world: &mut RigidSet) -> Result<()> {
        for (id, body) in self.bodies {
            let native = world.body_mut(id)?;
            native.linear_velocity = body.linear_velocity;
            native.angular_velocity = body.angular_velocity;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rigid::{NativeBody, NativeShape};
    use crate::id::{EngineId, JointId, ShapeId};
    use approx::assert_relative_eq;
    use physim_collision::Geometry;
    use physim_math::{GRAVITY, MassProperties, Pose};

    fn backend() -> SequentialImpulse {
        let config = EngineConfig::default();
        SequentialImpulse::new(RigidSet::new(config.gravity), &config)
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
        let mut si = backend();
        ball(si.world_mut(), id, Pose::identity());
        for _ in 0..100 {
            si.step(0.01).unwrap();
        }
        let v = si.world().body(id).unwrap().linear_velocity;
        assert_relative_eq!(v.z, -GRAVITY, epsilon = 1e-9);
    }

    #[test]
    fn test_pendulum_keeps_length() {
        let e = EngineId::next();
        let id = BodyId::new(e, 0);
        let mut si = backend();
        ball(si.world_mut(), id, Pose::translation(1.0, 0.0, 0.0));
        let joint = si
            .world()
            .connect(JointKind::Revolute, None, Some(id), &Vec3::zeros(), &Vec3::y());
        si.world_mut().insert_joint(JointId::new(e, 1), joint);

        for _ in 0..500 {
            si.step(0.001).unwrap();
        }
        let p = si.world().body(id).unwrap().position();
        assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-2);
        assert!(p.z < -0.5, "pendulum should swing down, z = {}", p.z);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_ball_rests_on_ground_plane() {
        let e = EngineId::next();
        let (ground, ball_id) = (BodyId::new(e, 0), BodyId::new(e, 1));
        let mut si = backend();
        let world = si.world_mut();
        world.insert_body(ground, NativeBody::new(Pose::identity(), 0.0, 0.0));
        world.insert_shape(
            ShapeId::new(e, 2),
            NativeShape {
                body: ground,
                local: Pose::identity(),
                geometry: Geometry::plane(Vec3::z()),
                laser_retro: 0.0,
                fiducial: -1,
            },
        );
        ball(world, ball_id, Pose::translation(0.0, 0.0, 0.6));
        world.insert_shape(
            ShapeId::new(e, 3),
            NativeShape {
                body: ball_id,
                local: Pose::identity(),
                geometry: Geometry::Sphere { radius: 0.5 },
                laser_retro: 0.0,
                fiducial: -1,
            },
        );

        for _ in 0..2000 {
            si.step(0.001).unwrap();
        }
        let body = si.world().body(ball_id).unwrap();
        assert!(body.position().z > 0.45 && body.position().z < 0.51);
        assert!(body.linear_velocity.norm() < 0.05);
    }
}
