//! The physics engine: back end plus entity registry.

use crate::backend::{Backend, BackendKind, Capabilities, NativeBody, RayHit, create_backend};
use crate::body::{Body, BodyMut, propagate_pose};
use crate::config::EngineConfig;
use crate::error::{PhysicsError, Result};
use crate::id::{BodyId, EngineId, JointId, ShapeId};
use crate::joint::{Joint, JointKind, JointMut, JointRef};
use crate::ray_shape::RayReading;
use crate::shape::{Shape, ShapeKind, ShapeMut};
use physim_collision::{AABB, Ray};
use physim_math::{Pose, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Outcome of one [`PhysicsEngine::step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Steps taken so far, including this one.
    pub iteration: u64,
    /// Simulated time after this step (s).
    pub sim_time: f64,
    /// Bodies whose pose changed, in identifier order.
    pub moved: Vec<BodyId>,
}

/// Owns a back end and every body, joint and shape created through it.
pub struct PhysicsEngine {
    id: EngineId,
    config: EngineConfig,
    backend: Box<dyn Backend>,
    bodies: BTreeMap<BodyId, Body>,
    joints: BTreeMap<JointId, Joint>,
    shapes: BTreeMap<ShapeId, Shape>,
    next_index: u32,
    sim_time: f64,
    iterations: u64,
    finalized: bool,
}

impl std::fmt::Debug for PhysicsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsEngine")
            .field("id", &self.id)
            .field("backend", &self.backend.kind())
            .field("bodies", &self.bodies.len())
            .field("joints", &self.joints.len())
            .field("shapes", &self.shapes.len())
            .field("sim_time", &self.sim_time)
            .finish()
    }
}

impl PhysicsEngine {
    /// Create an engine with the back end named in `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let backend = create_backend(&config)?;
        let id = EngineId::next();
        tracing::debug!("Created {} with {} backend", id, backend.kind());
        Ok(Self {
            id,
            config,
            backend,
            bodies: BTreeMap::new(),
            joints: BTreeMap::new(),
            shapes: BTreeMap::new(),
            next_index: 0,
            sim_time: 0.0,
            iterations: 0,
            finalized: false,
        })
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
        self.backend.world_mut().gravity = gravity;
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    fn next_index(&mut self) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn check_live(&self) -> Result<()> {
        if self.finalized {
            return Err(PhysicsError::InvalidState(format!("{} has been finalized", self.id)));
        }
        Ok(())
    }

    fn check_engine(&self, engine: EngineId, what: &dyn std::fmt::Display) -> Result<()> {
        if engine != self.id {
            return Err(PhysicsError::IncompatibleBackend(format!(
                "{what} does not belong to {}",
                self.id
            )));
        }
        Ok(())
    }

    /// New static body at the origin.
    pub fn create_body(&mut self, name: &str) -> Result<BodyId> {
        self.check_live()?;
        let id = BodyId::new(self.id, self.next_index());
        let (lin, ang) = (self.config.linear_damping, self.config.angular_damping);
        self.backend
            .world_mut()
            .insert_body(id, NativeBody::new(Pose::identity(), lin, ang));
        self.bodies.insert(id, Body::new(id, name, lin, ang));
        tracing::debug!("Created body {} ({})", id, name);
        Ok(id)
    }

    pub fn create_joint(&mut self, kind: JointKind) -> Result<JointId> {
        self.check_live()?;
        let id = JointId::new(self.id, self.next_index());
        self.joints.insert(id, Joint::new(id, kind));
        Ok(id)
    }

    /// New unloaded shape. Kinds the back end cannot simulate are rejected.
    pub fn create_shape(&mut self, kind: ShapeKind) -> Result<ShapeId> {
        self.check_live()?;
        if !self.backend.capabilities().supports_shape(kind) {
            let err = self.backend.not_implemented(kind.creation());
            tracing::warn!("Cannot create {} shape: {}", kind, err);
            return Err(err);
        }
        let id = ShapeId::new(self.id, self.next_index());
        self.shapes.insert(id, Shape::new(id, kind));
        Ok(id)
    }

    /// Destroy a body together with its shapes and every incident joint.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<()> {
        self.check_engine(id.engine(), &id)?;
        let body = self
            .bodies
            .get(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))?;
        let joints: Vec<JointId> = body.joints().collect();
        let shapes = body.shapes.clone();
        for joint in joints {
            self.destroy_joint(joint)?;
        }
        for shape in shapes {
            self.backend.world_mut().remove_shape(shape);
            self.shapes.remove(&shape);
        }
        self.backend.world_mut().remove_body(id);
        self.bodies.remove(&id);
        tracing::debug!("Destroyed body {}", id);
        Ok(())
    }

    pub fn destroy_joint(&mut self, id: JointId) -> Result<()> {
        self.joint_mut(id)?.fini();
        self.joints.remove(&id);
        Ok(())
    }

    /// Destroy a shape, detaching it from its body first.
    pub fn destroy_shape(&mut self, id: ShapeId) -> Result<()> {
        let owner = self.shape(id)?.body();
        if let Some(owner) = owner {
            self.body_mut(owner)?.detach_shape(id)?;
        }
        self.backend.world_mut().remove_shape(id);
        self.shapes.remove(&id);
        Ok(())
    }

    pub fn body(&self, id: BodyId) -> Result<&Body> {
        self.check_engine(id.engine(), &id)?;
        self.bodies
            .get(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))
    }

    pub fn body_mut(&mut self, id: BodyId) -> Result<BodyMut<'_>> {
        self.check_engine(id.engine(), &id)?;
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))?;
        Ok(BodyMut {
            body,
            shapes: &mut self.shapes,
            backend: self.backend.as_mut(),
            engine: self.id,
        })
    }

    pub fn joint(&self, id: JointId) -> Result<JointRef<'_>> {
        self.check_engine(id.engine(), &id)?;
        let joint = self
            .joints
            .get(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))?;
        Ok(JointRef {
            joint,
            backend: self.backend.as_ref(),
        })
    }

    pub fn joint_mut(&mut self, id: JointId) -> Result<JointMut<'_>> {
        self.check_engine(id.engine(), &id)?;
        let joint = self
            .joints
            .get_mut(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))?;
        Ok(JointMut {
            joint,
            bodies: &mut self.bodies,
            backend: self.backend.as_mut(),
            engine: self.id,
        })
    }

    pub fn shape(&self, id: ShapeId) -> Result<&Shape> {
        self.check_engine(id.engine(), &id)?;
        self.shapes
            .get(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))
    }

    pub fn shape_mut(&mut self, id: ShapeId) -> Result<ShapeMut<'_>> {
        self.check_engine(id.engine(), &id)?;
        let shape = self
            .shapes
            .get_mut(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))?;
        Ok(ShapeMut {
            shape,
            backend: self.backend.as_mut(),
        })
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.values()
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    pub fn body_by_name(&self, name: &str) -> Option<BodyId> {
        self.bodies.values().find(|b| b.name() == name).map(Body::id)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Native record counts (bodies, joints, shapes) held by the back end.
    pub fn native_counts(&self) -> (usize, usize, usize) {
        let world = self.backend.world();
        (world.body_count(), world.joint_count(), world.shape_count())
    }

    /// Advance the simulation by `dt`.
    ///
    /// Phase 1 runs the solver. Phase 2 refreshes every body from its native
    /// record and propagates changed poses to shapes. Sensors are not
    /// touched; call [`PhysicsEngine::update_sensors`] afterwards.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        self.check_live()?;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(PhysicsError::InvalidState(format!("invalid step size {dt}")));
        }

        self.backend.step(dt)?;
        if let Some(id) = self.backend.world().first_non_finite() {
            let name = self.bodies.get(&id).map_or("?", |b| b.name());
            tracing::error!("Solver diverged at t={:.6}: {} ({})", self.sim_time + dt, id, name);
            return Err(PhysicsError::SolverDiverged(format!(
                "{id} ({name}) left the finite range"
            )));
        }

        let world = self.backend.world_mut();
        let mut moved = Vec::new();
        for (id, body) in self.bodies.iter_mut() {
            let native = world.body(*id)?;
            if body.pose_dirty || native.link_pose() != *body.world_pose() {
                propagate_pose(body, &mut self.shapes, world)?;
                moved.push(*id);
            } else {
                body.sync(native);
            }
        }

        self.sim_time += dt;
        self.iterations += 1;
        Ok(StepReport {
            iteration: self.iterations,
            sim_time: self.sim_time,
            moved,
        })
    }

    /// Recast every initialized, attached ray fan against the current world.
    ///
    /// Casting only reads the back end, so fans are cast concurrently with
    /// the `parallel` feature; results are stored sequentially.
    pub fn update_sensors(&mut self) -> Result<Vec<ShapeId>> {
        self.check_live()?;
        let world = self.backend.world();
        let jobs: Vec<(ShapeId, BodyId, Pose)> = self
            .shapes
            .values()
            .filter(|s| s.ray_fan().is_some_and(|f| f.is_initialized()))
            .filter_map(|s| {
                let body = s.body()?;
                let link = world.body(body).ok()?.link_pose();
                Some((s.id(), body, link))
            })
            .collect();

        let shapes = &self.shapes;
        let cast = |(id, body, link): &(ShapeId, BodyId, Pose)| -> Vec<RayReading> {
            shapes
                .get(id)
                .and_then(Shape::ray_fan)
                .map(|fan| fan.cast(world, link, *body))
                .unwrap_or_default()
        };
        #[cfg(feature = "parallel")]
        let readings: Vec<Vec<RayReading>> = jobs.par_iter().map(cast).collect();
        #[cfg(not(feature = "parallel"))]
        let readings: Vec<Vec<RayReading>> = jobs.iter().map(cast).collect();

        let mut updated = Vec::with_capacity(jobs.len());
        for ((id, _, link), readings) in jobs.into_iter().zip(readings) {
            if let Some(shape) = self.shapes.get_mut(&id) {
                shape.set_link_pose(&link);
                if let Some(fan) = shape.fan_mut() {
                    fan.apply(&link, readings);
                }
                shape.mark_dirty();
                updated.push(id);
            }
        }
        Ok(updated)
    }

    pub fn world_pose(&self, id: BodyId) -> Result<Pose> {
        Ok(*self.body(id)?.world_pose())
    }

    /// Union of the body's shape bounds; a point at the link origin when it
    /// has no shapes.
    pub fn bounding_box(&self, id: BodyId) -> Result<AABB> {
        let body = self.body(id)?;
        let bounds = body
            .shapes()
            .iter()
            .filter_map(|s| self.shapes.get(s))
            .fold(AABB::empty(), |acc, s| acc.merged(s.bounding_box()));
        if bounds.is_empty() {
            let p = body.world_pose().translation.vector;
            return Ok(AABB::new(p, p));
        }
        Ok(bounds)
    }

    /// Nearest shape hit by the ray from `origin` along `dir`.
    pub fn cast_ray(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_distance: f64,
        exclude: Option<BodyId>,
    ) -> Option<RayHit> {
        let ray = Ray::new(origin, dir)?;
        self.backend.world().cast_ray(&ray, max_distance, exclude)
    }

    /// Release every entity: joints, then shapes, then bodies, then the
    /// native world. Idempotent.
    pub fn fini(&mut self) {
        if self.finalized {
            return;
        }
        let joints: Vec<JointId> = self.joints.keys().copied().collect();
        for id in joints {
            if let Ok(mut joint) = self.joint_mut(id) {
                joint.fini();
            }
        }
        self.joints.clear();

        for id in std::mem::take(&mut self.shapes).into_keys() {
            self.backend.world_mut().remove_shape(id);
        }
        for id in std::mem::take(&mut self.bodies).into_keys() {
            self.backend.world_mut().remove_body(id);
        }
        self.backend.world_mut().clear();
        self.finalized = true;
        tracing::debug!("Finalized {}", self.id);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for PhysicsEngine {
    fn drop(&mut self) {
        self.fini();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use physim_math::{GRAVITY, MassProperties};
    use physim_scene::Element;

    fn engine(kind: BackendKind) -> PhysicsEngine {
        PhysicsEngine::new(EngineConfig::with_backend(kind)).unwrap()
    }

    fn ball(engine: &mut PhysicsEngine, at: Vec3) -> BodyId {
        let id = engine.create_body("ball").unwrap();
        let mut body = engine.body_mut(id).unwrap();
        body.set_inertial(MassProperties::sphere(1.0, 0.1)).unwrap();
        body.set_world_pose(Pose::translation(at.x, at.y, at.z)).unwrap();
        id
    }

    #[test]
    fn test_unknown_backend_fails() {
        let config = EngineConfig {
            backend: "ode".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            PhysicsEngine::new(config),
            Err(PhysicsError::BackendInit(_))
        ));
    }

    #[test]
    fn test_free_fall_both_backends() {
        for kind in BackendKind::ALL {
            let mut e = engine(kind);
            let id = ball(&mut e, Vec3::zeros());
            for _ in 0..1000 {
                e.step(0.001).unwrap();
            }
            let v = e.body(id).unwrap().linear_velocity();
            assert_relative_eq!(v.z, -GRAVITY, epsilon = 1e-6);
            assert_relative_eq!(e.sim_time(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_step_reports_moved_bodies() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let falling = ball(&mut e, Vec3::zeros());
        let fixed = e.create_body("ground").unwrap();
        let report = e.step(0.01).unwrap();
        assert_eq!(report.iteration, 1);
        assert!(report.moved.contains(&falling));

        let report = e.step(0.01).unwrap();
        assert_eq!(report.moved, vec![falling]);
        assert!(!report.moved.contains(&fixed));
    }

    #[test]
    fn test_divergence_fails_step() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let id = ball(&mut e, Vec3::zeros());
        e.body_mut(id)
            .unwrap()
            .set_linear_velocity(Vec3::new(f64::INFINITY, 0.0, 0.0))
            .unwrap();
        assert!(matches!(e.step(0.01), Err(PhysicsError::SolverDiverged(_))));
    }

    #[test]
    fn test_foreign_ids_rejected() {
        let mut a = engine(BackendKind::SequentialImpulse);
        let b = engine(BackendKind::SequentialImpulse);
        let id = a.create_body("x").unwrap();
        assert!(matches!(b.body(id), Err(PhysicsError::IncompatibleBackend(_))));
    }

    #[test]
    fn test_position_based_rejects_compound() {
        let mut e = engine(BackendKind::PositionBased);
        assert!(matches!(
            e.create_shape(ShapeKind::Compound),
            Err(PhysicsError::NotImplemented { operation: "compound shapes", .. })
        ));
        assert!(e.create_shape(ShapeKind::Ray).is_ok());
    }

    #[test]
    fn test_cast_ray_and_bounds() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let body = e.create_body("target").unwrap();
        e.body_mut(body)
            .unwrap()
            .set_world_pose(Pose::translation(3.0, 0.0, 0.0))
            .unwrap();
        let shape = e.create_shape(ShapeKind::Box).unwrap();
        e.shape_mut(shape)
            .unwrap()
            .load(
                &Element::from_xml_str(
                    r#"<collision><fiducial>9</fiducial>
                         <geometry><box><size>1 1 1</size></box></geometry></collision>"#,
                )
                .unwrap(),
            )
            .unwrap();
        e.body_mut(body).unwrap().attach_shape(shape).unwrap();
        e.shape_mut(shape).unwrap().init().unwrap();

        let hit = e.cast_ray(Vec3::zeros(), Vec3::x(), 10.0, None).unwrap();
        assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-9);
        assert_eq!(hit.fiducial, 9);
        assert!(e.cast_ray(Vec3::zeros(), Vec3::x(), 10.0, Some(body)).is_none());

        let bounds = e.bounding_box(body).unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(2.5, -0.5, -0.5), epsilon = 1e-9);
        assert_relative_eq!(bounds.max, Vec3::new(3.5, 0.5, 0.5), epsilon = 1e-9);
    }

    #[test]
    fn test_plane_altitude_moves_ground() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let ground = e.create_body("ground").unwrap();
        let plane = e.create_shape(ShapeKind::Plane).unwrap();
        e.shape_mut(plane)
            .unwrap()
            .load(&Element::from_xml_str("<collision><geometry><plane/></geometry></collision>").unwrap())
            .unwrap();
        e.body_mut(ground).unwrap().attach_shape(plane).unwrap();
        e.shape_mut(plane).unwrap().init().unwrap();

        let down = -Vec3::z();
        let hit = e.cast_ray(Vec3::new(0.0, 0.0, 5.0), down, 10.0, None).unwrap();
        assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-9);

        e.shape_mut(plane).unwrap().set_altitude(1.5).unwrap();
        let hit = e.cast_ray(Vec3::new(0.0, 0.0, 5.0), down, 10.0, None).unwrap();
        assert_relative_eq!(hit.distance, 3.5, epsilon = 1e-9);
    }

    #[test]
    fn test_fini_releases_everything() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let a = ball(&mut e, Vec3::zeros());
        let j = e.create_joint(JointKind::Ball).unwrap();
        e.joint_mut(j)
            .unwrap()
            .load(&Element::from_xml_str("<joint/>").unwrap())
            .unwrap();
        e.joint_mut(j).unwrap().attach(None, Some(a)).unwrap();
        assert_eq!(e.native_counts(), (1, 1, 0));

        e.fini();
        assert_eq!(e.native_counts(), (0, 0, 0));
        assert_eq!(e.body_count(), 0);
        assert!(e.create_body("late").is_err());
        e.fini();
    }

    #[test]
    fn test_stop_setters_keep_order() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let a = ball(&mut e, Vec3::zeros());
        let j = e.create_joint(JointKind::Revolute).unwrap();
        let mut joint = e.joint_mut(j).unwrap();
        joint
            .load(
                &Element::from_xml_str(
                    "<joint><axis><limit><lower>-1</lower><upper>1</upper></limit></axis></joint>",
                )
                .unwrap(),
            )
            .unwrap();
        joint.attach(None, Some(a)).unwrap();

        assert!(matches!(
            joint.set_low_stop(0, 2.0),
            Err(PhysicsError::Configuration(_))
        ));
        assert!(matches!(
            joint.set_high_stop(0, -2.0),
            Err(PhysicsError::Configuration(_))
        ));
        joint.set_high_stop(0, 3.0).unwrap();
        joint.set_low_stop(0, 2.0).unwrap();
        assert_eq!(joint.low_stop(0).unwrap(), 2.0);
        assert_eq!(joint.high_stop(0).unwrap(), 3.0);
    }

    #[test]
    fn test_destroy_body_removes_joints() {
        let mut e = engine(BackendKind::SequentialImpulse);
        let a = ball(&mut e, Vec3::zeros());
        let j = e.create_joint(JointKind::Fixed).unwrap();
        let mut joint = e.joint_mut(j).unwrap();
        joint.load(&Element::from_xml_str("<joint/>").unwrap()).unwrap();
        joint.attach(None, Some(a)).unwrap();

        e.destroy_body(a).unwrap();
        assert_eq!(e.native_counts(), (0, 0, 0));
        assert!(matches!(e.joint(j), Err(PhysicsError::UnknownEntity(_))));
    }
}
