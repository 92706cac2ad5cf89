//! Native records shared by every back end.
//!
//! Bodies are stored in their centre-of-mass frame. Shapes are stored
//! relative to that frame, so any change of the centre of mass must
//! re-project them (see [`crate::body::BodyMut::on_pose_change`]).

use super::constraint::JointFrame;
use crate::error::{PhysicsError, Result};
use crate::id::{BodyId, JointId, ShapeId};
use crate::joint::JointKind;
use nalgebra::Translation3;
use physim_collision::{AABB, Contact, Geometry, Ray, intersect, plane_contacts};
use physim_math::{MassProperties, Mat3, Pose, Quat, Vec3, is_finite_pose};
use std::collections::BTreeMap;

/// Native rigid body.
#[derive(Debug, Clone)]
pub struct NativeBody {
    /// Pose of the centre-of-mass frame (link axes, origin at the cog).
    pub com_pose: Pose,
    /// Centre of mass in link coordinates.
    pub cog: Vec3,
    /// Velocity of the centre of mass, world frame.
    pub linear_velocity: Vec3,
    /// World frame.
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub torque: Vec3,
    pub mass: f64,
    pub inv_mass: f64,
    /// Inertia about the cog in link axes.
    pub inertia: Mat3,
    pub inv_inertia: Mat3,
    pub gravity: bool,
    pub enabled: bool,
    pub linear_damping: f64,
    pub angular_damping: f64,
}

impl NativeBody {
    /// A massless (static) body at `link_pose`.
    pub fn new(link_pose: Pose, linear_damping: f64, angular_damping: f64) -> Self {
        Self {
            com_pose: link_pose,
            cog: Vec3::zeros(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            force: Vec3::zeros(),
            torque: Vec3::zeros(),
            mass: 0.0,
            inv_mass: 0.0,
            inertia: Mat3::zeros(),
            inv_inertia: Mat3::zeros(),
            gravity: true,
            enabled: true,
            linear_damping,
            angular_damping,
        }
    }

    pub fn link_pose(&self) -> Pose {
        self.com_pose * Translation3::from(-self.cog)
    }

    pub fn set_link_pose(&mut self, pose: &Pose) {
        self.com_pose = pose * Translation3::from(self.cog);
    }

    /// Replace mass properties (expressed in link coordinates) keeping the
    /// link frame where it is.
    pub fn set_mass(&mut self, mp: &MassProperties) {
        let link = self.link_pose();
        self.cog = mp.cog;
        self.mass = mp.mass;
        self.inv_mass = mp.inverse_mass();
        self.inertia = mp.inertia;
        self.inv_inertia = mp.inverse_inertia();
        self.set_link_pose(&link);
    }

    /// Moves under the solver: enabled and not massless.
    pub fn is_dynamic(&self) -> bool {
        self.enabled && self.inv_mass > 0.0
    }

    pub fn position(&self) -> Vec3 {
        self.com_pose.translation.vector
    }

    pub fn orientation(&self) -> Quat {
        self.com_pose.rotation
    }

    pub fn inv_inertia_world(&self) -> Mat3 {
        let r = self.com_pose.rotation.to_rotation_matrix();
        r.matrix() * self.inv_inertia * r.matrix().transpose()
    }

    pub fn inertia_world(&self) -> Mat3 {
        let r = self.com_pose.rotation.to_rotation_matrix();
        r.matrix() * self.inertia * r.matrix().transpose()
    }

    /// Velocity of the material point currently at world `point`.
    pub fn velocity_at(&self, point: &Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(&(point - self.position()))
    }

    /// Zero velocities and accumulated loads.
    pub fn freeze(&mut self) {
        self.linear_velocity = Vec3::zeros();
        self.angular_velocity = Vec3::zeros();
        self.force = Vec3::zeros();
        self.torque = Vec3::zeros();
    }

    pub fn is_finite(&self) -> bool {
        is_finite_pose(&self.com_pose)
            && self.linear_velocity.iter().all(|c| c.is_finite())
            && self.angular_velocity.iter().all(|c| c.is_finite())
    }
}

/// Native joint. Anchors and axes are stored in each side's centre-of-mass
/// frame, or in the world frame for a side attached to the static world.
#[derive(Debug, Clone)]
pub struct NativeJoint {
    pub kind: JointKind,
    pub parent: Option<BodyId>,
    pub child: Option<BodyId>,
    pub anchor_parent: Vec3,
    pub anchor_child: Vec3,
    pub axis_parent: Vec3,
    pub axis_child: Vec3,
    /// Orientation of the child relative to the parent at attach time.
    pub rest: Quat,
    pub low_stop: f64,
    pub high_stop: f64,
    pub damping: f64,
    pub max_force: f64,
    pub motor_velocity: Option<f64>,
    /// Consumed by the next step.
    pub applied_force: f64,
}

/// Native collision or sensing-target shape.
#[derive(Debug, Clone)]
pub struct NativeShape {
    pub body: BodyId,
    /// Pose relative to the owning body's centre-of-mass frame.
    pub local: Pose,
    pub geometry: Geometry,
    pub laser_retro: f64,
    pub fiducial: i32,
}

/// Nearest ray intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f64,
    pub shape: ShapeId,
    pub body: BodyId,
    pub laser_retro: f64,
    pub fiducial: i32,
}

/// Kinematic snapshot of one side of a constraint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Side {
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub inv_mass: f64,
    pub inv_inertia: Mat3,
}

impl Side {
    fn fixed(pose: Pose) -> Self {
        Self {
            pose,
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            inv_mass: 0.0,
            inv_inertia: Mat3::zeros(),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.pose.translation.vector
    }

    pub fn velocity_at(&self, point: &Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(&(point - self.position()))
    }
}

/// A penetrating point between a plane shape and a solid shape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlaneContact {
    pub plane_body: BodyId,
    pub body: BodyId,
    pub contact: Contact,
}

/// Identifier-keyed native tables plus global parameters.
#[derive(Debug, Clone)]
pub struct RigidSet {
    pub gravity: Vec3,
    bodies: BTreeMap<BodyId, NativeBody>,
    joints: BTreeMap<JointId, NativeJoint>,
    shapes: BTreeMap<ShapeId, NativeShape>,
}

impl RigidSet {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            gravity,
            bodies: BTreeMap::new(),
            joints: BTreeMap::new(),
            shapes: BTreeMap::new(),
        }
    }

    pub fn insert_body(&mut self, id: BodyId, body: NativeBody) {
        self.bodies.insert(id, body);
    }

    pub fn remove_body(&mut self, id: BodyId) -> Option<NativeBody> {
        self.bodies.remove(&id)
    }

    pub fn body(&self, id: BodyId) -> Result<&NativeBody> {
        self.bodies
            .get(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))
    }

    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut NativeBody> {
        self.bodies
            .get_mut(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &NativeBody)> {
        self.bodies.iter().map(|(id, b)| (*id, b))
    }

    pub fn insert_joint(&mut self, id: JointId, joint: NativeJoint) {
        self.joints.insert(id, joint);
    }

    pub fn remove_joint(&mut self, id: JointId) -> Option<NativeJoint> {
        self.joints.remove(&id)
    }

    pub fn joint(&self, id: JointId) -> Result<&NativeJoint> {
        self.joints
            .get(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))
    }

    pub fn joint_mut(&mut self, id: JointId) -> Result<&mut NativeJoint> {
        self.joints
            .get_mut(&id)
            .ok_or_else(|| PhysicsError::UnknownEntity(id.to_string()))
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &NativeJoint)> {
        self.joints.iter().map(|(id, j)| (*id, j))
    }

    pub fn insert_shape(&mut self, id: ShapeId, shape: NativeShape) {
        self.shapes.insert(id, shape);
    }

    pub fn remove_shape(&mut self, id: ShapeId) -> Option<NativeShape> {
        self.shapes.remove(&id)
    }

    pub fn shape(&self, id: ShapeId) -> Option<&NativeShape> {
        self.shapes.get(&id)
    }

    pub fn shape_mut(&mut self, id: ShapeId) -> Option<&mut NativeShape> {
        self.shapes.get_mut(&id)
    }

    pub fn shapes(&self) -> impl Iterator<Item = (ShapeId, &NativeShape)> {
        self.shapes.iter().map(|(id, s)| (*id, s))
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

    /// Drop every native record.
    pub fn clear(&mut self) {
        self.joints.clear();
        self.shapes.clear();
        self.bodies.clear();
    }

    /// World pose of a shape's geometry.
    pub fn shape_pose(&self, shape: &NativeShape) -> Option<Pose> {
        self.bodies.get(&shape.body).map(|b| b.com_pose * shape.local)
    }

    /// Frame a joint side is expressed in.
    pub(crate) fn frame(&self, id: Option<BodyId>) -> Pose {
        id.and_then(|id| self.bodies.get(&id))
            .map(|b| b.com_pose)
            .unwrap_or_else(Pose::identity)
    }

    pub(crate) fn side(&self, id: Option<BodyId>) -> Side {
        match id.and_then(|id| self.bodies.get(&id)) {
            None => Side::fixed(Pose::identity()),
            Some(b) if !b.is_dynamic() => Side {
                linear_velocity: b.linear_velocity,
                angular_velocity: b.angular_velocity,
                ..Side::fixed(b.com_pose)
            },
            Some(b) => Side {
                pose: b.com_pose,
                linear_velocity: b.linear_velocity,
                angular_velocity: b.angular_velocity,
                inv_mass: b.inv_mass,
                inv_inertia: b.inv_inertia_world(),
            },
        }
    }

    /// Build a native joint anchored at world `anchor` with world `axis`,
    /// using the current poses of both sides as the rest configuration.
    pub fn connect(
        &self,
        kind: JointKind,
        parent: Option<BodyId>,
        child: Option<BodyId>,
        anchor: &Vec3,
        axis: &Vec3,
    ) -> NativeJoint {
        let fp = self.frame(parent);
        let fc = self.frame(child);
        NativeJoint {
            kind,
            parent,
            child,
            anchor_parent: fp.inverse_transform_point(&(*anchor).into()).coords,
            anchor_child: fc.inverse_transform_point(&(*anchor).into()).coords,
            axis_parent: fp.inverse_transform_vector(axis),
            axis_child: fc.inverse_transform_vector(axis),
            rest: fp.rotation.inverse() * fc.rotation,
            low_stop: f64::NEG_INFINITY,
            high_stop: f64::INFINITY,
            damping: 0.0,
            max_force: f64::INFINITY,
            motor_velocity: None,
            applied_force: 0.0,
        }
    }

    /// Re-express a joint's axis from a new world direction.
    pub fn set_joint_axis(&mut self, id: JointId, axis: &Vec3) -> Result<()> {
        let (parent, child) = {
            let j = self.joint(id)?;
            (j.parent, j.child)
        };
        let axis_parent = self.frame(parent).inverse_transform_vector(axis);
        let axis_child = self.frame(child).inverse_transform_vector(axis);
        let j = self.joint_mut(id)?;
        j.axis_parent = axis_parent;
        j.axis_child = axis_child;
        Ok(())
    }

    /// Joint coordinate along its single axis (m or rad).
    pub fn joint_position(&self, id: JointId) -> Result<f64> {
        let j = self.joint(id)?;
        Ok(JointFrame::new(self, j).position(j))
    }

    /// Joint coordinate rate (m/s or rad/s).
    pub fn joint_rate(&self, id: JointId) -> Result<f64> {
        let j = self.joint(id)?;
        Ok(JointFrame::new(self, j).rate(j))
    }

    /// World anchor as seen from the child side.
    pub fn joint_anchor(&self, id: JointId) -> Result<Vec3> {
        let j = self.joint(id)?;
        Ok(JointFrame::new(self, j).anchor_child)
    }

    /// Nearest intersection along `ray` within `max_distance`, skipping
    /// shapes of `exclude`.
    pub fn cast_ray(&self, ray: &Ray, max_distance: f64, exclude: Option<BodyId>) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (id, shape) in &self.shapes {
            if Some(shape.body) == exclude {
                continue;
            }
            let Some(pose) = self.shape_pose(shape) else {
                continue;
            };
            let limit = best.map_or(max_distance, |b| b.distance);
            if shape.geometry.is_solid()
                && AABB::from_geometry(&shape.geometry, &pose)
                    .ray_entry(&ray.origin, &ray.dir, limit)
                    .is_none()
            {
                continue;
            }
            if let Some(distance) = intersect(&shape.geometry, &pose, ray, limit) {
                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(RayHit {
                        distance,
                        shape: *id,
                        body: shape.body,
                        laser_retro: shape.laser_retro,
                        fiducial: shape.fiducial,
                    });
                }
            }
        }
        best
    }

    /// Contacts between every plane shape and every solid shape of another
    /// body, where at least one of the two bodies is dynamic.
    pub(crate) fn plane_contacts(&self) -> Vec<PlaneContact> {
        let mut out = Vec::new();
        for plane in self.shapes.values() {
            let Geometry::Plane { normal } = plane.geometry else {
                continue;
            };
            let Some(plane_body) = self.bodies.get(&plane.body) else {
                continue;
            };
            let plane_pose = plane_body.com_pose * plane.local;
            let point = plane_pose.translation.vector;
            let n = plane_pose.rotation * normal;

            for solid in self.shapes.values() {
                if solid.body == plane.body || !solid.geometry.is_solid() {
                    continue;
                }
                let Some(body) = self.bodies.get(&solid.body) else {
                    continue;
                };
                if !body.is_dynamic() && !plane_body.is_dynamic() {
                    continue;
                }
                let pose = body.com_pose * solid.local;
                for contact in plane_contacts(&solid.geometry, &pose, &point, &n) {
                    out.push(PlaneContact {
                        plane_body: plane.body,
                        body: solid.body,
                        contact,
                    });
                }
            }
        }
        out
    }

    /// First body whose state is no longer finite.
    pub fn first_non_finite(&self) -> Option<BodyId> {
        self.bodies
            .iter()
            .find(|(_, b)| !b.is_finite())
            .map(|(id, _)| *id)
    }

    /// Zero body force/torque accumulators and applied joint forces.
    pub fn clear_accumulators(&mut self) {
        for body in self.bodies.values_mut() {
            body.force = Vec3::zeros();
            body.torque = Vec3::zeros();
        }
        for joint in self.joints.values_mut() {
            joint.applied_force = 0.0;
        }
    }

    /// Apply joint damping and applied joint forces as body loads.
    pub(crate) fn apply_joint_loads(&mut self) {
        let loads: Vec<(Option<BodyId>, Option<BodyId>, Vec3, bool)> = self
            .joints
            .values()
            .filter(|j| j.kind.axis_count() == 1)
            .filter_map(|j| {
                let frame = JointFrame::new(self, j);
                let generalized = j.applied_force - j.damping * frame.rate(j);
                (generalized != 0.0).then(|| {
                    (
                        j.parent,
                        j.child,
                        frame.axis * generalized,
                        j.kind == JointKind::Prismatic,
                    )
                })
            })
            .collect();

        for (parent, child, load, linear) in loads {
            for (id, sign) in [(parent, -1.0), (child, 1.0)] {
                if let Some(body) = id.and_then(|id| self.bodies.get_mut(&id)) {
                    if linear {
                        body.force += load * sign;
                    } else {
                        body.torque += load * sign;
                    }
                }
            }
        }
    }

    /// Semi-implicit velocity update from gravity, accumulated loads and damping.
    pub(crate) fn integrate_velocities(&mut self, dt: f64) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut().filter(|b| b.is_dynamic()) {
            let mut accel = body.force * body.inv_mass;
            if body.gravity {
                accel += gravity;
            }
            body.linear_velocity += accel * dt;

            let w = body.angular_velocity;
            let gyro = w.cross(&(body.inertia_world() * w));
            body.angular_velocity += body.inv_inertia_world() * (body.torque - gyro) * dt;

            body.linear_velocity /= 1.0 + dt * body.linear_damping;
            body.angular_velocity /= 1.0 + dt * body.angular_damping;
        }
    }

    /// Advance poses from velocities.
    pub(crate) fn integrate_positions(&mut self, dt: f64) {
        for body in self.bodies.values_mut().filter(|b| b.is_dynamic()) {
            body.com_pose.translation.vector += body.linear_velocity * dt;
            body.com_pose.rotation =
                Quat::from_scaled_axis(body.angular_velocity * dt) * body.com_pose.rotation;
        }
    }
}
