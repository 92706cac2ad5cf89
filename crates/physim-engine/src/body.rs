//! Bodies (links): one rigid object with its shapes and incident joints.
//!
//! [`Body`] is the engine-side record. It mirrors the native body's motion
//! after every step and after every setter, so reads never touch the back
//! end. Writes go through [`BodyMut`], which updates the native body first
//! and then propagates the new pose to the attached shapes.

use crate::backend::{Backend, NativeBody, RigidSet};
use crate::error::{PhysicsError, Result};
use crate::id::{BodyId, EngineId, JointId, ShapeId};
use crate::shape::Shape;
use nalgebra::Translation3;
use physim_math::{MassProperties, Mat3, Pose, Vec3};
use physim_scene::Element;
use std::collections::BTreeMap;
use std::ops::Deref;

/// Engine-side state of one link.
#[derive(Debug, Clone)]
pub struct Body {
    id: BodyId,
    name: String,
    /// Pose of the parent (model) frame in the world.
    model_pose: Pose,
    /// Link pose relative to the model frame.
    relative_pose: Pose,
    /// Link pose in the world.
    world_pose: Pose,
    /// Explicit inertial, link coordinates.
    inertial: MassProperties,
    /// Inertial plus all attached shapes.
    composite: MassProperties,
    gravity: bool,
    enabled: bool,
    linear_damping: f64,
    angular_damping: f64,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    force: Vec3,
    torque: Vec3,
    pub(crate) shapes: Vec<ShapeId>,
    /// Incident joints and the body on their other side (`None` = world).
    pub(crate) joints: Vec<(JointId, Option<BodyId>)>,
    pub(crate) pose_dirty: bool,
}

impl Body {
    pub(crate) fn new(id: BodyId, name: &str, linear_damping: f64, angular_damping: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            model_pose: Pose::identity(),
            relative_pose: Pose::identity(),
            world_pose: Pose::identity(),
            inertial: MassProperties::zero(),
            composite: MassProperties::zero(),
            gravity: true,
            enabled: true,
            linear_damping,
            angular_damping,
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
            shapes: Vec::new(),
            joints: Vec::new(),
            pose_dirty: false,
        }
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn world_pose(&self) -> &Pose {
        &self.world_pose
    }

    pub fn relative_pose(&self) -> &Pose {
        &self.relative_pose
    }

    pub fn model_pose(&self) -> &Pose {
        &self.model_pose
    }

    /// Velocity of the centre of mass, world frame.
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Force accumulated for the next step.
    pub fn force(&self) -> Vec3 {
        self.force
    }

    pub fn torque(&self) -> Vec3 {
        self.torque
    }

    pub fn inertial(&self) -> &MassProperties {
        &self.inertial
    }

    /// Composite mass properties in link coordinates.
    pub fn mass_properties(&self) -> &MassProperties {
        &self.composite
    }

    /// Centre of mass in the world frame.
    pub fn world_cog(&self) -> Vec3 {
        self.world_pose
            .transform_point(&self.composite.cog.into())
            .coords
    }

    pub fn is_static(&self) -> bool {
        self.composite.is_zero()
    }

    pub fn gravity_mode(&self) -> bool {
        self.gravity
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn linear_damping(&self) -> f64 {
        self.linear_damping
    }

    pub fn angular_damping(&self) -> f64 {
        self.angular_damping
    }

    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }

    pub fn joints(&self) -> impl Iterator<Item = JointId> + '_ {
        self.joints.iter().map(|(j, _)| *j)
    }

    /// Copy motion state from the native body.
    pub(crate) fn sync(&mut self, native: &NativeBody) {
        self.world_pose = native.link_pose();
        self.relative_pose = self.model_pose.inverse() * self.world_pose;
        self.linear_velocity = native.linear_velocity;
        self.angular_velocity = native.angular_velocity;
        self.force = native.force;
        self.torque = native.torque;
    }

    /// Parse a `<link>` element into a new body value.
    fn parse(&self, el: &Element) -> Result<Body> {
        let mut next = self.clone();
        if let Some(name) = el.parse_attr::<String>("name")? {
            next.name = name;
        }
        next.relative_pose = el.value_or("pose", self.relative_pose)?;
        next.gravity = el.value_or("gravity", self.gravity)?;
        next.enabled = el.value_or("enabled", self.enabled)?;
        if let Some(damping) = el.child("damping") {
            next.linear_damping = check_damping(damping.value_or("linear", self.linear_damping)?)?;
            next.angular_damping =
                check_damping(damping.value_or("angular", self.angular_damping)?)?;
        }
        if let Some(inertial) = el.child("inertial") {
            next.inertial = parse_inertial(inertial)?;
        }
        Ok(next)
    }

    pub fn to_element(&self) -> Element {
        let (i, c) = (&self.inertial.inertia, self.inertial.cog);
        Element::new("link")
            .with_attr("name", self.name.as_str())
            .with_value("pose", self.relative_pose)
            .with_value("gravity", self.gravity)
            .with_value("enabled", self.enabled)
            .with_child(
                Element::new("damping")
                    .with_value("linear", self.linear_damping)
                    .with_value("angular", self.angular_damping),
            )
            .with_child(
                Element::new("inertial")
                    .with_value("mass", self.inertial.mass)
                    .with_value("pose", Pose::translation(c.x, c.y, c.z))
                    .with_child(
                        Element::new("inertia")
                            .with_value("ixx", i[(0, 0)])
                            .with_value("ixy", i[(0, 1)])
                            .with_value("ixz", i[(0, 2)])
                            .with_value("iyy", i[(1, 1)])
                            .with_value("iyz", i[(1, 2)])
                            .with_value("izz", i[(2, 2)]),
                    ),
            )
    }
}

/// `<inertial>`: mass, pose of the inertia frame and the tensor in it.
/// The tensor defaults to the identity, like scene formats usually do.
fn check_damping(damping: f64) -> Result<f64> {
    if !(damping.is_finite() && damping >= 0.0) {
        return Err(PhysicsError::Configuration(physim_scene::SceneError::InvalidValue {
            element: "damping".into(),
            value: damping.to_string(),
            expected: "non-negative damping",
        }));
    }
    Ok(damping)
}

fn parse_inertial(el: &Element) -> Result<MassProperties> {
    let mass: f64 = el.value_or("mass", 1.0)?;
    if !(mass.is_finite() && mass >= 0.0) {
        return Err(PhysicsError::Configuration(physim_scene::SceneError::InvalidValue {
            element: "mass".into(),
            value: mass.to_string(),
            expected: "non-negative mass",
        }));
    }
    let frame: Pose = el.value_or("pose", Pose::identity())?;
    let inertia = match el.child("inertia") {
        None => Mat3::identity(),
        Some(t) => {
            let ixx = t.value_or("ixx", 1.0)?;
            let iyy = t.value_or("iyy", 1.0)?;
            let izz = t.value_or("izz", 1.0)?;
            let ixy = t.value_or("ixy", 0.0)?;
            let ixz = t.value_or("ixz", 0.0)?;
            let iyz = t.value_or("iyz", 0.0)?;
            Mat3::new(ixx, ixy, ixz, ixy, iyy, iyz, ixz, iyz, izz)
        }
    };
    Ok(MassProperties::new(mass, Vec3::zeros(), inertia).transformed(&frame))
}

/// Refresh `body` from its native record and re-project its shapes into the
/// native centre-of-mass frame.
pub(crate) fn propagate_pose(
    body: &mut Body,
    shapes: &mut BTreeMap<ShapeId, Shape>,
    world: &mut RigidSet,
) -> Result<()> {
    let native = world.body(body.id)?;
    let (link, cog) = (native.link_pose(), native.cog);
    body.sync(native);
    let to_com = Translation3::from(-cog);
    for id in &body.shapes {
        let Some(shape) = shapes.get_mut(id) else {
            continue;
        };
        shape.set_link_pose(&link);
        if let Some(native) = world.shape_mut(*id) {
            native.local = to_com * *shape.relative_pose();
        }
    }
    body.pose_dirty = false;
    Ok(())
}

/// Mutable access to a body, the shape registry and the back end.
pub struct BodyMut<'a> {
    pub(crate) body: &'a mut Body,
    pub(crate) shapes: &'a mut BTreeMap<ShapeId, Shape>,
    pub(crate) backend: &'a mut dyn Backend,
    pub(crate) engine: EngineId,
}

impl Deref for BodyMut<'_> {
    type Target = Body;

    fn deref(&self) -> &Body {
        self.body
    }
}

impl BodyMut<'_> {
    fn native(&mut self) -> Result<&mut NativeBody> {
        self.backend.world_mut().body_mut(self.body.id)
    }

    /// Read a `<link>` element (shapes are handled by the caller). On error
    /// the body is left unchanged.
    pub fn load(&mut self, el: &Element) -> Result<()> {
        let next = self.body.parse(el)?;
        *self.body = next;
        let (gravity, enabled) = (self.body.gravity, self.body.enabled);
        let (lin, ang) = (self.body.linear_damping, self.body.angular_damping);
        let pose = self.body.model_pose * self.body.relative_pose;
        let native = self.native()?;
        native.gravity = gravity;
        native.enabled = enabled;
        native.linear_damping = lin;
        native.angular_damping = ang;
        native.set_link_pose(&pose);
        self.update_com()
    }

    pub fn set_world_pose(&mut self, pose: Pose) -> Result<()> {
        self.native()?.set_link_pose(&pose);
        self.on_pose_change()
    }

    pub fn set_relative_pose(&mut self, pose: Pose) -> Result<()> {
        let world = self.body.model_pose * pose;
        self.native()?.set_link_pose(&world);
        self.update_com()
    }

    /// Move the parent frame; the link keeps its relative pose.
    pub fn set_model_pose(&mut self, model: Pose) -> Result<()> {
        self.body.model_pose = model;
        let world = model * self.body.relative_pose;
        self.native()?.set_link_pose(&world);
        self.on_pose_change()
    }

    pub fn set_linear_velocity(&mut self, v: Vec3) -> Result<()> {
        self.if_enabled("linear velocity", |n| n.linear_velocity = v)
    }

    pub fn set_angular_velocity(&mut self, w: Vec3) -> Result<()> {
        self.if_enabled("angular velocity", |n| n.angular_velocity = w)
    }

    pub fn set_force(&mut self, f: Vec3) -> Result<()> {
        self.if_enabled("force", |n| n.force = f)
    }

    pub fn add_force(&mut self, f: Vec3) -> Result<()> {
        self.if_enabled("force", |n| n.force += f)
    }

    pub fn set_torque(&mut self, t: Vec3) -> Result<()> {
        self.if_enabled("torque", |n| n.torque = t)
    }

    pub fn add_torque(&mut self, t: Vec3) -> Result<()> {
        self.if_enabled("torque", |n| n.torque += t)
    }

    /// Apply `f` to the native body unless the body is disabled; disabled
    /// bodies stay frozen.
    fn if_enabled(&mut self, what: &str, f: impl FnOnce(&mut NativeBody)) -> Result<()> {
        if !self.body.enabled {
            tracing::debug!("Ignoring {} on disabled body {}", what, self.body.name);
            return Ok(());
        }
        let native = self.native()?;
        f(native);
        let native = self.backend.world().body(self.body.id)?;
        self.body.sync(native);
        Ok(())
    }

    pub fn set_gravity_mode(&mut self, on: bool) -> Result<()> {
        self.native()?.gravity = on;
        self.body.gravity = on;
        Ok(())
    }

    /// Disabling zeroes velocities and loads and freezes the body.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let native = self.native()?;
        native.enabled = enabled;
        native.freeze();
        self.body.enabled = enabled;
        let native = self.backend.world().body(self.body.id)?;
        self.body.sync(native);
        Ok(())
    }

    pub fn set_linear_damping(&mut self, damping: f64) -> Result<()> {
        let damping = check_damping(damping)?;
        self.native()?.linear_damping = damping;
        self.body.linear_damping = damping;
        Ok(())
    }

    pub fn set_angular_damping(&mut self, damping: f64) -> Result<()> {
        let damping = check_damping(damping)?;
        self.native()?.angular_damping = damping;
        self.body.angular_damping = damping;
        Ok(())
    }

    /// Replace the explicit inertial and recompute the composite.
    pub fn set_inertial(&mut self, inertial: MassProperties) -> Result<()> {
        self.body.inertial = inertial;
        self.update_com()
    }

    /// Attach a loaded shape. Collidable shapes get their native record here.
    pub fn attach_shape(&mut self, id: ShapeId) -> Result<()> {
        if id.engine() != self.engine {
            return Err(PhysicsError::IncompatibleBackend(format!(
                "{id} does not belong to {}",
                self.engine
            )));
        }
        let shape = self
            .shapes
            .get_mut(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))?;
        if let Some(owner) = shape.body {
            return Err(PhysicsError::InvalidState(format!(
                "{} is already attached to {owner}",
                shape.name()
            )));
        }
        shape.body = Some(self.body.id);
        let cog = self.backend.world().body(self.body.id)?.cog;
        if let Some(native) = shape.native(&cog) {
            self.backend.world_mut().insert_shape(id, native);
        }
        self.body.shapes.push(id);
        self.update_com()
    }

    /// Detach a shape and remove its native record.
    pub fn detach_shape(&mut self, id: ShapeId) -> Result<()> {
        let Some(pos) = self.body.shapes.iter().position(|s| *s == id) else {
            return Err(PhysicsError::InvalidState(format!(
                "{id} is not attached to {}",
                self.body.name
            )));
        };
        self.body.shapes.remove(pos);
        self.backend.world_mut().remove_shape(id);
        if let Some(shape) = self.shapes.get_mut(&id) {
            shape.body = None;
        }
        self.update_com()
    }

    /// Recompute the composite mass from the inertial and attached shapes,
    /// push it to the back end and re-project the shapes.
    pub fn update_com(&mut self) -> Result<()> {
        let parts: Vec<MassProperties> = std::iter::once(self.body.inertial)
            .chain(
                self.body
                    .shapes
                    .iter()
                    .filter_map(|id| self.shapes.get(id))
                    .map(Shape::mass_properties),
            )
            .collect();
        self.body.composite = MassProperties::combine(parts.iter());
        let composite = self.body.composite;
        self.native()?.set_mass(&composite);
        self.on_pose_change()
    }

    /// Propagate the native pose to the cached state and every shape.
    pub fn on_pose_change(&mut self) -> Result<()> {
        propagate_pose(self.body, self.shapes, self.backend.world_mut())?;
        self.body.pose_dirty = true;
        Ok(())
    }
}
