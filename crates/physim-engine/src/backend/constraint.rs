//! Joint kinematics shared by the back ends.

use super::rigid::{NativeJoint, RigidSet, Side};
use crate::joint::JointKind;
use physim_math::{EPSILON, Vec3};
use std::f64::consts::{PI, TAU};

/// World-frame view of a joint under the current body poses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JointFrame {
    pub parent: Side,
    pub child: Side,
    pub anchor_parent: Vec3,
    pub anchor_child: Vec3,
    /// Joint axis carried by the parent.
    pub axis: Vec3,
    /// Joint axis carried by the child.
    pub axis_child: Vec3,
}

impl JointFrame {
    pub fn new(set: &RigidSet, j: &NativeJoint) -> Self {
        let parent = set.side(j.parent);
        let child = set.side(j.child);
        Self {
            anchor_parent: parent.pose.transform_point(&j.anchor_parent.into()).coords,
            anchor_child: child.pose.transform_point(&j.anchor_child.into()).coords,
            axis: unit_or_z(parent.pose.rotation * j.axis_parent),
            axis_child: unit_or_z(child.pose.rotation * j.axis_child),
            parent,
            child,
        }
    }

    /// Child anchor minus parent anchor.
    pub fn separation(&self) -> Vec3 {
        self.anchor_child - self.anchor_parent
    }

    /// Joint coordinate: slide distance or hinge angle in (-pi, pi].
    pub fn position(&self, j: &NativeJoint) -> f64 {
        match j.kind {
            JointKind::Prismatic => self.separation().dot(&self.axis),
            JointKind::Revolute => {
                let rel = self.parent.pose.rotation.inverse()
                    * self.child.pose.rotation
                    * j.rest.inverse();
                let q = rel.quaternion();
                let s = q.imag().dot(&unit_or_z(j.axis_parent));
                wrap_angle(2.0 * s.atan2(q.w))
            }
            JointKind::Ball | JointKind::Fixed => 0.0,
        }
    }

    pub fn rate(&self, j: &NativeJoint) -> f64 {
        match j.kind {
            JointKind::Prismatic => (self.child.velocity_at(&self.anchor_child)
                - self.parent.velocity_at(&self.anchor_parent))
            .dot(&self.axis),
            JointKind::Revolute => {
                (self.child.angular_velocity - self.parent.angular_velocity).dot(&self.axis)
            }
            JointKind::Ball | JointKind::Fixed => 0.0,
        }
    }

    /// Rotation vector taking the child's rest orientation (relative to the
    /// parent) to its current one.
    pub fn orientation_error(&self, j: &NativeJoint) -> Vec3 {
        let target = self.parent.pose.rotation * j.rest;
        (self.child.pose.rotation * target.inverse()).scaled_axis()
    }

    /// Rotation vector taking the parent axis onto the child axis.
    pub fn axis_error(&self) -> Vec3 {
        self.axis.cross(&self.axis_child)
    }

    /// Signed violation of the joint stops, zero when within them.
    pub fn limit_violation(&self, j: &NativeJoint) -> f64 {
        let q = self.position(j);
        if q < j.low_stop {
            q - j.low_stop
        } else if q > j.high_stop {
            q - j.high_stop
        } else {
            0.0
        }
    }
}

/// Two unit vectors spanning the plane perpendicular to unit `n`.
pub(crate) fn tangents(n: &Vec3) -> (Vec3, Vec3) {
    let t1 = physim_math::any_orthogonal(n);
    (t1, n.cross(&t1))
}

fn unit_or_z(v: Vec3) -> Vec3 {
    let n = v.norm();
    if n > EPSILON { v / n } else { Vec3::z() }
}

pub(crate) fn wrap_angle(a: f64) -> f64 {
    let w = (a + PI).rem_euclid(TAU) - PI;
    if w == -PI { PI } else { w }
}
