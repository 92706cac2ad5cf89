//! Collision and sensing geometry for the physim simulation core.
//!
//! Analytic ray casts against primitive shapes, regular ray fans for range
//! sensors, and contact generation against infinite planes. All queries are
//! pure functions of geometry and pose; no state lives here.

pub mod contact;
pub mod fan;
pub mod geometry;
pub mod ray;

pub use contact::{Contact, plane_contacts};
pub use fan::{RangeSpec, RayFanSpec, RaySegment, ScanAxis};
pub use geometry::{AABB, Geometry};
pub use ray::{Ray, intersect};
