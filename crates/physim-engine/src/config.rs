//! Engine configuration.

use crate::backend::BackendKind;
use crate::error::{PhysicsError, Result};
use physim_math::{GRAVITY, Vec3};
use physim_scene::Element;
use serde::{Deserialize, Serialize};

/// Solver and world parameters, read from the scene's `<physics>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Back-end name, see [`BackendKind`].
    pub backend: String,
    /// Gravity acceleration (m/s²).
    pub gravity: Vec3,
    /// Fixed step used by the world loop (s).
    pub max_step_size: f64,
    /// Constraint solver iterations per step (per substep for position-based).
    pub iterations: u32,
    /// Position-based substeps per step.
    pub substeps: u32,
    /// Error reduction parameter for velocity-level stabilization, in [0, 1].
    pub erp: f64,
    /// Contact stiffness (N/m); its inverse is the position-level compliance.
    pub contact_stiffness: f64,
    /// Coulomb friction coefficient for plane contacts.
    pub friction: f64,
    /// Default linear damping for new bodies (1/s).
    pub linear_damping: f64,
    /// Default angular damping for new bodies (1/s).
    pub angular_damping: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::SequentialImpulse.name().to_string(),
            gravity: Vec3::new(0.0, 0.0, -GRAVITY),
            max_step_size: 0.001,
            iterations: 20,
            substeps: 4,
            erp: 0.2,
            contact_stiffness: 1e8,
            friction: 0.5,
            linear_damping: 0.0,
            angular_damping: 0.0,
        }
    }
}

impl EngineConfig {
    /// Config for a given back end with every other parameter at its default.
    pub fn with_backend(kind: BackendKind) -> Self {
        Self {
            backend: kind.name().to_string(),
            ..Self::default()
        }
    }

    /// Read a `<physics type="...">` element. Absent values keep their defaults.
    pub fn from_element(el: &Element) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            backend: el.parse_attr("type")?.unwrap_or(d.backend),
            gravity: el.value_or("gravity", d.gravity)?,
            max_step_size: el.value_or("max_step_size", d.max_step_size)?,
            iterations: el.value_or("iterations", d.iterations)?,
            substeps: el.value_or("substeps", d.substeps)?,
            erp: el.value_or("erp", d.erp)?,
            contact_stiffness: el.value_or("contact_stiffness", d.contact_stiffness)?,
            friction: el.value_or("friction", d.friction)?,
            linear_damping: el.value_or("linear_damping", d.linear_damping)?,
            angular_damping: el.value_or("angular_damping", d.angular_damping)?,
        })
    }

    pub fn to_element(&self) -> Element {
        Element::new("physics")
            .with_attr("type", self.backend.as_str())
            .with_value("gravity", self.gravity)
            .with_value("max_step_size", self.max_step_size)
            .with_value("iterations", self.iterations)
            .with_value("substeps", self.substeps)
            .with_value("erp", self.erp)
            .with_value("contact_stiffness", self.contact_stiffness)
            .with_value("friction", self.friction)
            .with_value("linear_damping", self.linear_damping)
            .with_value("angular_damping", self.angular_damping)
    }

    /// Resolve the back end and check solver parameters.
    pub fn validate(&self) -> Result<BackendKind> {
        let kind: BackendKind = self.backend.parse().map_err(PhysicsError::BackendInit)?;

        let invalid = |what: &str| Err(PhysicsError::BackendInit(format!("invalid {what}")));
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return invalid("gravity");
        }
        if !(self.max_step_size.is_finite() && self.max_step_size > 0.0) {
            return invalid("max_step_size");
        }
        if self.iterations == 0 {
            return invalid("iterations");
        }
        if self.substeps == 0 {
            return invalid("substeps");
        }
        if !(0.0..=1.0).contains(&self.erp) {
            return invalid("erp");
        }
        if !(self.contact_stiffness.is_finite() && self.contact_stiffness > 0.0) {
            return invalid("contact_stiffness");
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return invalid("friction");
        }
        if !(self.linear_damping.is_finite() && self.linear_damping >= 0.0) {
            return invalid("linear_damping");
        }
        if !(self.angular_damping.is_finite() && self.angular_damping >= 0.0) {
            return invalid("angular_damping");
        }
        Ok(kind)
    }
}
