//! Ray-fan sensing shapes.
//!
//! A fan's rays are generated once by [`RayFan::init`] in the owning link's
//! frame. Every update resets the per-ray results, moves the segments into
//! the world with the link pose and casts each ray against world geometry.
//! Lengths are measured from the sensor origin, so a hit always reports a
//! value in `[min_range, max_range]`.

use crate::backend::RigidSet;
use crate::error::{PhysicsError, Result};
use crate::id::BodyId;
use physim_collision::{Ray, RayFanSpec, RaySegment};
use physim_math::{Pose, Vec3};

/// Result of casting one ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayReading {
    pub length: f64,
    pub retro: f64,
    pub fiducial: i32,
}

impl RayReading {
    fn miss(max_range: f64) -> Self {
        Self {
            length: max_range,
            retro: 0.0,
            fiducial: -1,
        }
    }
}

/// Rays plus their latest readings.
#[derive(Debug, Clone, PartialEq)]
pub struct RayFan {
    spec: RayFanSpec,
    /// Segments in the link frame, empty until initialized.
    local: Vec<RaySegment>,
    world: Vec<RaySegment>,
    readings: Vec<RayReading>,
}

impl RayFan {
    pub fn new(spec: RayFanSpec) -> Self {
        Self {
            spec,
            local: Vec::new(),
            world: Vec::new(),
            readings: Vec::new(),
        }
    }

    pub fn spec(&self) -> &RayFanSpec {
        &self.spec
    }

    /// Generate the rays around `offset` (sensor origin in the link frame).
    pub fn init(&mut self, offset: &Vec3) {
        self.local = self.spec.segments(offset);
        self.world = self.local.clone();
        self.readings = vec![RayReading::miss(self.spec.range.max); self.local.len()];
    }

    pub fn is_initialized(&self) -> bool {
        !self.local.is_empty()
    }

    pub fn ray_count(&self) -> usize {
        self.spec.ray_count()
    }

    /// Segments in the link frame.
    pub fn local_segments(&self) -> &[RaySegment] {
        &self.local
    }

    /// Segments in the world frame as of the last update.
    pub fn world_segments(&self) -> &[RaySegment] {
        &self.world
    }

    pub fn readings(&self) -> &[RayReading] {
        &self.readings
    }

    /// Cast every ray from a link at `link_pose`, ignoring shapes of `owner`.
    ///
    /// Read-only, so fans may be cast concurrently.
    pub fn cast(&self, world: &RigidSet, link_pose: &Pose, owner: BodyId) -> Vec<RayReading> {
        let span = self.spec.range.max - self.spec.range.min;
        self.local
            .iter()
            .map(|segment| {
                let s = segment.transformed(link_pose);
                let Some(ray) = Ray::new(s.start, s.end - s.start) else {
                    return RayReading::miss(self.spec.range.max);
                };
                match world.cast_ray(&ray, span, Some(owner)) {
                    Some(hit) => RayReading {
                        length: (self.spec.range.min + hit.distance).min(self.spec.range.max),
                        retro: hit.laser_retro,
                        fiducial: hit.fiducial,
                    },
                    None => RayReading::miss(self.spec.range.max),
                }
            })
            .collect()
    }

    /// Reset every reading, then store `readings` cast from `link_pose`.
    pub fn apply(&mut self, link_pose: &Pose, readings: Vec<RayReading>) {
        self.reset();
        self.world = self.local.iter().map(|s| s.transformed(link_pose)).collect();
        for (slot, reading) in self.readings.iter_mut().zip(readings) {
            *slot = reading;
        }
    }

    /// Cast and store in one go.
    pub fn update(&mut self, world: &RigidSet, link_pose: &Pose, owner: BodyId) {
        let readings = self.cast(world, link_pose, owner);
        self.apply(link_pose, readings);
    }

    /// Every ray back to `max_range`, no retro, no fiducial.
    pub fn reset(&mut self) {
        let miss = RayReading::miss(self.spec.range.max);
        self.readings.iter_mut().for_each(|r| *r = miss);
    }

    fn reading(&self, index: usize) -> Result<&RayReading> {
        if !self.is_initialized() {
            return Err(PhysicsError::InvalidState(
                "ray fan has no readings before init".into(),
            ));
        }
        self.readings.get(index).ok_or(PhysicsError::IndexOutOfRange {
            index,
            len: self.ray_count(),
        })
    }

    pub fn range(&self, index: usize) -> Result<f64> {
        Ok(self.reading(index)?.length)
    }

    pub fn retro(&self, index: usize) -> Result<f64> {
        Ok(self.reading(index)?.retro)
    }

    pub fn fiducial(&self, index: usize) -> Result<i32> {
        Ok(self.reading(index)?.fiducial)
    }

    pub fn min_range(&self) -> f64 {
        self.spec.range.min
    }

    pub fn max_range(&self) -> f64 {
        self.spec.range.max
    }

    pub fn range_resolution(&self) -> f64 {
        self.spec.range.resolution
    }

    pub fn horizontal_samples(&self) -> u32 {
        self.spec.horizontal.samples
    }

    pub fn horizontal_resolution(&self) -> f64 {
        self.spec.horizontal.resolution
    }

    pub fn horizontal_min_angle(&self) -> f64 {
        self.spec.horizontal.min_angle
    }

    pub fn horizontal_max_angle(&self) -> f64 {
        self.spec.horizontal.max_angle
    }

    pub fn vertical_samples(&self) -> u32 {
        self.spec.vertical.samples
    }

    pub fn vertical_resolution(&self) -> f64 {
        self.spec.vertical.resolution
    }

    pub fn vertical_min_angle(&self) -> f64 {
        self.spec.vertical.min_angle
    }

    pub fn vertical_max_angle(&self) -> f64 {
        self.spec.vertical.max_angle
    }
}
