//! Joints: constraint edges between two bodies, or a body and the world.
//!
//! A joint goes through `Unattached -> Configured -> Active -> Destroyed`.
//! Configuration comes from a `<joint>` element; attaching creates the native
//! constraint; only active joints accept parameter changes.

use crate::backend::{Backend, Capabilities};
use crate::body::Body;
use crate::error::{PhysicsError, Result};
use crate::id::{BodyId, EngineId, JointId};
use physim_math::{Pose, Vec3};
use physim_scene::{Element, SceneError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Joint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    /// One rotational DOF about the axis.
    Revolute,
    /// One translational DOF along the axis.
    Prismatic,
    /// Three rotational DOFs about the anchor.
    Ball,
    /// Welds both sides together.
    Fixed,
}

impl JointKind {
    /// Number of controllable axes.
    pub fn axis_count(&self) -> usize {
        match self {
            JointKind::Revolute | JointKind::Prismatic => 1,
            JointKind::Ball | JointKind::Fixed => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JointKind::Revolute => "revolute",
            JointKind::Prismatic => "prismatic",
            JointKind::Ball => "ball",
            JointKind::Fixed => "fixed",
        }
    }
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JointKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "revolute" | "hinge" => Ok(JointKind::Revolute),
            "prismatic" | "slider" => Ok(JointKind::Prismatic),
            "ball" => Ok(JointKind::Ball),
            "fixed" => Ok(JointKind::Fixed),
            other => Err(format!("unknown joint type '{other}'")),
        }
    }
}

/// Lifecycle state of a joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointState {
    Unattached,
    Configured,
    Active,
    Destroyed,
}

/// Configured parameters of a joint plus the bodies it connects.
#[derive(Debug, Clone)]
pub struct Joint {
    id: JointId,
    name: String,
    kind: JointKind,
    state: JointState,
    /// Joint frame relative to the child link (parent link when there is no child).
    pose: Pose,
    /// Axis in the joint frame.
    axis: Vec3,
    low_stop: f64,
    high_stop: f64,
    max_force: f64,
    velocity_limit: f64,
    damping: f64,
    parent_name: Option<String>,
    child_name: Option<String>,
    parent: Option<BodyId>,
    child: Option<BodyId>,
}

impl Joint {
    pub(crate) fn new(id: JointId, kind: JointKind) -> Self {
        Self {
            id,
            name: id.to_string(),
            kind,
            state: JointState::Unattached,
            pose: Pose::identity(),
            axis: Vec3::z(),
            low_stop: f64::NEG_INFINITY,
            high_stop: f64::INFINITY,
            max_force: f64::INFINITY,
            velocity_limit: f64::INFINITY,
            damping: 0.0,
            parent_name: None,
            child_name: None,
            parent: None,
            child: None,
        }
    }

    pub fn id(&self) -> JointId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn state(&self) -> JointState {
        self.state
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Axis `index` in the joint frame.
    pub fn axis(&self, index: usize) -> Result<Vec3> {
        self.check_axis(index)?;
        Ok(self.axis)
    }

    pub fn high_stop(&self, index: usize) -> Result<f64> {
        self.check_axis(index)?;
        Ok(self.high_stop)
    }

    pub fn low_stop(&self, index: usize) -> Result<f64> {
        self.check_axis(index)?;
        Ok(self.low_stop)
    }

    pub fn max_force(&self, index: usize) -> Result<f64> {
        self.check_axis(index)?;
        Ok(self.max_force)
    }

    pub fn damping(&self, index: usize) -> Result<f64> {
        self.check_axis(index)?;
        Ok(self.damping)
    }

    /// Velocity limit from the scene; informational.
    pub fn velocity_limit(&self) -> f64 {
        self.velocity_limit
    }

    /// Parent link name from the scene, `None` for the world.
    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn child_name(&self) -> Option<&str> {
        self.child_name.as_deref()
    }

    /// Parent body once attached, `None` for the world.
    pub fn parent(&self) -> Option<BodyId> {
        self.parent
    }

    pub fn child(&self) -> Option<BodyId> {
        self.child
    }

    fn check_axis(&self, index: usize) -> Result<()> {
        let len = self.kind.axis_count();
        if index >= len {
            return Err(PhysicsError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn check_state(&self, expected: JointState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(PhysicsError::InvalidState(format!(
                "{operation} on {} requires {expected:?}, joint is {:?}",
                self.name, self.state
            )));
        }
        Ok(())
    }

    /// Parse configuration from a `<joint>` element without touching `self`.
    fn parse(&self, el: &Element) -> Result<Joint> {
        let mut next = self.clone();
        if let Some(name) = el.parse_attr::<String>("name")? {
            next.name = name;
        }
        if let Some(ty) = el.attr("type") {
            let kind: JointKind = ty.parse().map_err(|_| SceneError::InvalidValue {
                element: "joint@type".into(),
                value: ty.to_string(),
                expected: "joint type",
            })?;
            if kind != self.kind {
                return Err(PhysicsError::Configuration(SceneError::InvalidValue {
                    element: "joint@type".into(),
                    value: ty.to_string(),
                    expected: self.kind.name(),
                }));
            }
        }
        next.parent_name = link_name(el.child_value("parent")?);
        next.child_name = link_name(el.child_value("child")?);
        next.pose = el.value_or("pose", Pose::identity())?;

        if let Some(axis) = el.child("axis") {
            let xyz: Vec3 = axis.value_or("xyz", Vec3::z())?;
            let n = xyz.norm();
            if !(n.is_finite() && n > 0.0) {
                return Err(PhysicsError::Configuration(SceneError::InvalidValue {
                    element: "xyz".into(),
                    value: format!("{} {} {}", xyz.x, xyz.y, xyz.z),
                    expected: "non-zero axis",
                }));
            }
            next.axis = xyz / n;
            if let Some(limit) = axis.child("limit") {
                next.low_stop = limit.value_or("lower", f64::NEG_INFINITY)?;
                next.high_stop = limit.value_or("upper", f64::INFINITY)?;
                check_stops(next.low_stop, next.high_stop)?;
                next.max_force = limit.value_or("effort", f64::INFINITY)?;
                next.velocity_limit = limit.value_or("velocity", f64::INFINITY)?;
            }
            if let Some(dynamics) = axis.child("dynamics") {
                next.damping = dynamics.value_or("damping", 0.0)?;
            }
        }
        next.state = JointState::Configured;
        Ok(next)
    }

    pub fn to_element(&self) -> Element {
        let mut el = Element::new("joint")
            .with_attr("name", self.name.as_str())
            .with_attr("type", self.kind.name())
            .with_value("parent", self.parent_name.as_deref().unwrap_or("world"))
            .with_value("child", self.child_name.as_deref().unwrap_or("world"))
            .with_value("pose", self.pose);
        if self.kind.axis_count() > 0 {
            let mut limit = Element::new("limit");
            for (tag, value) in [
                ("lower", self.low_stop),
                ("upper", self.high_stop),
                ("effort", self.max_force),
                ("velocity", self.velocity_limit),
            ] {
                if value.is_finite() {
                    limit = limit.with_value(tag, value);
                }
            }
            el = el.with_child(
                Element::new("axis")
                    .with_value("xyz", self.axis)
                    .with_child(limit)
                    .with_child(Element::new("dynamics").with_value("damping", self.damping)),
            );
        }
        el
    }
}

fn link_name(name: Option<String>) -> Option<String> {
    name.filter(|n| n != "world")
}

/// Read access to a joint together with its live back-end state.
pub struct JointRef<'a> {
    pub(crate) joint: &'a Joint,
    pub(crate) backend: &'a dyn Backend,
}

impl Deref for JointRef<'_> {
    type Target = Joint;

    fn deref(&self) -> &Joint {
        self.joint
    }
}

impl JointRef<'_> {
    /// Current joint coordinate on `index` (rad or m).
    pub fn angle(&self, index: usize) -> Result<f64> {
        self.joint.check_axis(index)?;
        self.joint.check_state(JointState::Active, "angle")?;
        self.backend.world().joint_position(self.joint.id)
    }

    /// Current joint rate on `index` (rad/s or m/s).
    pub fn velocity(&self, index: usize) -> Result<f64> {
        self.joint.check_axis(index)?;
        self.joint.check_state(JointState::Active, "velocity")?;
        self.backend.world().joint_rate(self.joint.id)
    }

    /// World anchor.
    pub fn anchor(&self) -> Result<Vec3> {
        self.joint.check_state(JointState::Active, "anchor")?;
        self.backend.world().joint_anchor(self.joint.id)
    }
}

/// Mutable access to a joint, the bodies it may connect and the back end.
pub struct JointMut<'a> {
    pub(crate) joint: &'a mut Joint,
    pub(crate) bodies: &'a mut BTreeMap<BodyId, Body>,
    pub(crate) backend: &'a mut dyn Backend,
    pub(crate) engine: EngineId,
}

impl Deref for JointMut<'_> {
    type Target = Joint;

    fn deref(&self) -> &Joint {
        self.joint
    }
}

impl JointMut<'_> {
    /// Read configuration from a `<joint>` element. On error the joint is
    /// left exactly as it was.
    pub fn load(&mut self, el: &Element) -> Result<()> {
        if !matches!(
            self.joint.state,
            JointState::Unattached | JointState::Configured
        ) {
            return Err(PhysicsError::InvalidState(format!(
                "cannot load {} while {:?}",
                self.joint.name, self.joint.state
            )));
        }
        *self.joint = self.joint.parse(el)?;
        Ok(())
    }

    /// Connect `parent` and `child`; `None` stands for the static world.
    ///
    /// The joint frame is placed at the configured pose relative to the child
    /// (or the parent when the child is the world).
    pub fn attach(&mut self, parent: Option<BodyId>, child: Option<BodyId>) -> Result<()> {
        self.joint.check_state(JointState::Configured, "attach")?;
        let (anchor_body, other) = match (parent, child) {
            (Some(p), c) => (p, c),
            (None, Some(c)) => (c, None),
            (None, None) => {
                return Err(PhysicsError::InvalidState(format!(
                    "{} must connect at least one body",
                    self.joint.name
                )));
            }
        };
        for id in parent.iter().chain(child.iter()) {
            if id.engine() != self.engine {
                return Err(PhysicsError::IncompatibleBackend(format!(
                    "{id} does not belong to {}",
                    self.engine
                )));
            }
            if !self.bodies.contains_key(id) {
                return Err(PhysicsError::UnknownEntity(id.to_string()));
            }
        }
        if parent == child {
            return Err(PhysicsError::InvalidState(format!(
                "{} connects a body to itself",
                self.joint.name
            )));
        }
        if self
            .bodies
            .get(&anchor_body)
            .is_some_and(|b| b.joints.iter().any(|(_, o)| *o == other))
        {
            return Err(PhysicsError::InvalidState(format!(
                "another joint already connects {anchor_body} and {}",
                other.map_or("world".to_string(), |o| o.to_string())
            )));
        }

        let reference = child.or(parent).map_or(Ok(Pose::identity()), |id| {
            self.backend.world().body(id).map(|b| b.link_pose())
        })?;
        let frame = reference * self.joint.pose;
        let anchor = frame.translation.vector;
        let axis = frame.rotation * self.joint.axis;

        let world = self.backend.world_mut();
        let mut native = world.connect(self.joint.kind, parent, child, &anchor, &axis);
        native.low_stop = self.joint.low_stop;
        native.high_stop = self.joint.high_stop;
        native.damping = self.joint.damping;
        native.max_force = self.joint.max_force;
        world.insert_joint(self.joint.id, native);

        if let Some(body) = parent.and_then(|id| self.bodies.get_mut(&id)) {
            body.joints.push((self.joint.id, child));
        }
        if let Some(body) = child.and_then(|id| self.bodies.get_mut(&id)) {
            body.joints.push((self.joint.id, parent));
        }
        self.joint.parent = parent;
        self.joint.child = child;
        self.joint.state = JointState::Active;
        tracing::debug!("Attached {} ({}) to {:?} / {:?}", self.joint.name, self.joint.kind, parent, child);
        Ok(())
    }

    /// Set axis `index` in the joint frame.
    pub fn set_axis(&mut self, index: usize, axis: Vec3) -> Result<()> {
        self.check_active(index, "set_axis")?;
        let n = axis.norm();
        if !(n.is_finite() && n > 0.0) {
            return Err(PhysicsError::InvalidState(format!(
                "axis of {} must be non-zero",
                self.joint.name
            )));
        }
        let axis = axis / n;
        let world = self.backend.world_mut();
        let reference = self
            .joint
            .child
            .or(self.joint.parent)
            .map_or(Ok(Pose::identity()), |id| world.body(id).map(|b| b.link_pose()))?;
        let world_axis = (reference * self.joint.pose).rotation * axis;
        world.set_joint_axis(self.joint.id, &world_axis)?;
        self.joint.axis = axis;
        Ok(())
    }

    pub fn set_high_stop(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_active(index, "set_high_stop")?;
        self.require(Capabilities::JOINT_LIMITS, "joint limits")?;
        check_stops(self.joint.low_stop, value)?;
        self.backend.world_mut().joint_mut(self.joint.id)?.high_stop = value;
        self.joint.high_stop = value;
        Ok(())
    }

    pub fn set_low_stop(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_active(index, "set_low_stop")?;
        self.require(Capabilities::JOINT_LIMITS, "joint limits")?;
        check_stops(value, self.joint.high_stop)?;
        self.backend.world_mut().joint_mut(self.joint.id)?.low_stop = value;
        self.joint.low_stop = value;
        Ok(())
    }

    pub fn set_damping(&mut self, index: usize, damping: f64) -> Result<()> {
        self.check_active(index, "set_damping")?;
        self.require(Capabilities::JOINT_DAMPING, "joint damping")?;
        self.backend.world_mut().joint_mut(self.joint.id)?.damping = damping;
        self.joint.damping = damping;
        Ok(())
    }

    /// Drive axis `index` towards `velocity` with the motor.
    pub fn set_velocity(&mut self, index: usize, velocity: f64) -> Result<()> {
        self.check_active(index, "set_velocity")?;
        let result = self.backend.set_joint_velocity(self.joint.id, velocity);
        self.logged(result)
    }

    /// Apply `force` along axis `index` during the next step.
    pub fn set_force(&mut self, index: usize, force: f64) -> Result<()> {
        self.check_active(index, "set_force")?;
        let result = self.backend.set_joint_force(self.joint.id, force);
        self.logged(result)
    }

    pub fn set_max_force(&mut self, index: usize, max_force: f64) -> Result<()> {
        self.check_active(index, "set_max_force")?;
        let result = self.backend.set_joint_max_force(self.joint.id, max_force);
        self.logged(result)?;
        self.joint.max_force = max_force;
        Ok(())
    }

    /// Remove the native constraint and detach from both bodies.
    pub fn fini(&mut self) {
        if self.joint.state == JointState::Active {
            self.backend.world_mut().remove_joint(self.joint.id);
            for id in [self.joint.parent, self.joint.child].into_iter().flatten() {
                if let Some(body) = self.bodies.get_mut(&id) {
                    body.joints.retain(|(j, _)| *j != self.joint.id);
                }
            }
            tracing::debug!("Detached {}", self.joint.name);
        }
        self.joint.state = JointState::Destroyed;
    }

    fn check_active(&self, index: usize, operation: &str) -> Result<()> {
        self.joint.check_state(JointState::Active, operation)?;
        self.joint.check_axis(index)
    }

    fn require(&self, capability: Capabilities, operation: &'static str) -> Result<()> {
        if self.backend.capabilities().contains(capability) {
            Ok(())
        } else {
            self.logged(Err(self.backend.not_implemented(operation)))
        }
    }

    fn logged(&self, result: Result<()>) -> Result<()> {
        if let Err(e @ PhysicsError::NotImplemented { .. }) = &result {
            tracing::warn!("{}: {}", self.joint.name, e);
        }
        result
    }
}

/// Stops must be ordered; either may be infinite.
fn check_stops(low: f64, high: f64) -> Result<()> {
    if low <= high {
        return Ok(());
    }
    Err(PhysicsError::Configuration(SceneError::InvalidValue {
        element: "limit".into(),
        value: format!("{low} {high}"),
        expected: "lower stop not above upper stop",
    }))
}
