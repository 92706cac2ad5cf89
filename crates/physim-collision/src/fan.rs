//! Regular ray fans for range sensors.
//!
//! A fan is a grid of rays over yaw (horizontal) and pitch (vertical). With a
//! single sample the axis angle is exactly zero; otherwise samples are spread
//! evenly over `[min_angle, max_angle]` inclusive. Rays are ordered with the
//! vertical index as the outer loop.

use physim_math::{Pose, Vec3};
use serde::{Deserialize, Serialize};

/// One angular axis of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanAxis {
    pub samples: u32,
    pub resolution: f64,
    pub min_angle: f64,
    pub max_angle: f64,
}

impl Default for ScanAxis {
    fn default() -> Self {
        Self {
            samples: 1,
            resolution: 1.0,
            min_angle: 0.0,
            max_angle: 0.0,
        }
    }
}

impl ScanAxis {
    /// Angle of sample `i`.
    pub fn angle(&self, i: u32) -> f64 {
        if self.samples <= 1 {
            0.0
        } else {
            self.min_angle + i as f64 * (self.max_angle - self.min_angle) / (self.samples - 1) as f64
        }
    }
}

/// Radial extent of every ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub min: f64,
    pub max: f64,
    pub resolution: f64,
}

/// Full description of a ray fan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayFanSpec {
    pub horizontal: ScanAxis,
    pub vertical: ScanAxis,
    pub range: RangeSpec,
}

/// Ray segment endpoints, in whatever frame the fan was generated for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySegment {
    pub start: Vec3,
    pub end: Vec3,
}

impl RaySegment {
    /// Unit direction from start to end.
    pub fn direction(&self) -> Vec3 {
        (self.end - self.start).normalize()
    }

    pub fn transformed(&self, pose: &Pose) -> Self {
        Self {
            start: pose.transform_point(&self.start.into()).coords,
            end: pose.transform_point(&self.end.into()).coords,
        }
    }
}

/// Unit direction for a (yaw, pitch) pair.
pub fn direction(yaw: f64, pitch: f64) -> Vec3 {
    Vec3::new(pitch.cos() * yaw.cos(), yaw.sin(), pitch.sin() * yaw.cos())
}

impl RayFanSpec {
    pub fn ray_count(&self) -> usize {
        self.horizontal.samples as usize * self.vertical.samples as usize
    }

    /// (yaw, pitch) of every ray, vertical index outermost.
    pub fn angles(&self) -> Vec<(f64, f64)> {
        let mut out = Vec::with_capacity(self.ray_count());
        for j in 0..self.vertical.samples {
            let pitch = self.vertical.angle(j);
            for i in 0..self.horizontal.samples {
                out.push((self.horizontal.angle(i), pitch));
            }
        }
        out
    }

    /// Segments starting `range.min` and ending `range.max` from `offset`.
    pub fn segments(&self, offset: &Vec3) -> Vec<RaySegment> {
        self.angles()
            .into_iter()
            .map(|(yaw, pitch)| {
                let axis = direction(yaw, pitch);
                RaySegment {
                    start: axis * self.range.min + offset,
                    end: axis * self.range.max + offset,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fan(h: u32, v: u32) -> RayFanSpec {
        RayFanSpec {
            horizontal: ScanAxis {
                samples: h,
                resolution: 1.0,
                min_angle: -1.0,
                max_angle: 1.0,
            },
            vertical: ScanAxis {
                samples: v,
                resolution: 1.0,
                min_angle: -0.25,
                max_angle: 0.25,
            },
            range: RangeSpec {
                min: 0.2,
                max: 8.0,
                resolution: 0.01,
            },
        }
    }

    #[test]
    fn test_single_sample_angle_is_zero() {
        let spec = fan(1, 1);
        assert_eq!(spec.angles(), vec![(0.0, 0.0)]);
        let seg = spec.segments(&Vec3::zeros())[0];
        assert_relative_eq!(seg.start, Vec3::new(0.2, 0.0, 0.0));
        assert_relative_eq!(seg.end, Vec3::new(8.0, 0.0, 0.0));
    }

    #[test]
    fn test_grid_spans_limits_inclusive() {
        let spec = fan(5, 3);
        let angles = spec.angles();
        assert_eq!(angles.len(), 15);
        assert_relative_eq!(angles[0].0, -1.0);
        assert_relative_eq!(angles[4].0, 1.0);
        assert_relative_eq!(angles[2].0, 0.0);
        // Vertical is the outer loop.
        assert_relative_eq!(angles[0].1, -0.25);
        assert_relative_eq!(angles[4].1, -0.25);
        assert_relative_eq!(angles[5].1, 0.0);
        assert_relative_eq!(angles[14].1, 0.25);
    }

    #[test]
    fn test_direction_components() {
        let d = direction(std::f64::consts::FRAC_PI_2, 0.0);
        assert_relative_eq!(d, Vec3::y(), epsilon = 1e-12);
        let d = direction(0.0, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(d, Vec3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_offset_shifts_segments() {
        let offset = Vec3::new(0.1, 0.0, 0.3);
        let seg = fan(1, 1).segments(&offset)[0];
        assert_relative_eq!(seg.start, Vec3::new(0.3, 0.0, 0.3), epsilon = 1e-12);
        assert_relative_eq!(seg.direction(), Vec3::x(), epsilon = 1e-12);
    }
}
