//! Analytic ray casts against primitive geometry.
//!
//! Every test moves the ray into the geometry's local frame, solves there,
//! and returns the distance along the (unit) world direction. A ray that
//! starts inside a solid reports its exit point.

use crate::geometry::Geometry;
use physim_math::{EPSILON, Pose, Vec3};

/// Half-line `origin + t * dir`, `t >= 0`, with unit `dir`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Create a ray; `dir` is normalized. Returns `None` for a zero direction.
    pub fn new(origin: Vec3, dir: Vec3) -> Option<Self> {
        let n = dir.norm();
        (n > EPSILON && n.is_finite()).then(|| Self {
            origin,
            dir: dir / n,
        })
    }

    /// Point at distance `t`.
    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.dir * t
    }

    fn to_local(self, pose: &Pose) -> Self {
        Self {
            origin: pose.inverse_transform_point(&self.origin.into()).coords,
            dir: pose.inverse_transform_vector(&self.dir),
        }
    }
}

/// Distance along `ray` to the first surface of `geom` placed at `pose`,
/// if it lies within `max_distance`.
pub fn intersect(geom: &Geometry, pose: &Pose, ray: &Ray, max_distance: f64) -> Option<f64> {
    let local = ray.to_local(pose);
    let t = match geom {
        Geometry::Sphere { radius } => sphere(&local, *radius),
        Geometry::Box { half_extents } => cuboid(&local, half_extents),
        Geometry::Cylinder { radius, length } => cylinder(&local, *radius, length * 0.5),
        Geometry::Plane { normal } => plane(&local, normal),
        Geometry::Compound { parts } => {
            return parts
                .iter()
                .filter_map(|(p, g)| intersect(g, &(pose * p), ray, max_distance))
                .min_by(f64::total_cmp);
        }
    }?;
    (t <= max_distance).then_some(t)
}

fn sphere(ray: &Ray, radius: f64) -> Option<f64> {
    let b = ray.origin.dot(&ray.dir);
    let c = ray.origin.norm_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    first_non_negative(-b - sq, -b + sq)
}

fn cuboid(ray: &Ray, h: &Vec3) -> Option<f64> {
    let mut t_near = f64::NEG_INFINITY;
    let mut t_far = f64::INFINITY;
    for i in 0..3 {
        let (o, d) = (ray.origin[i], ray.dir[i]);
        if d.abs() < EPSILON {
            if o.abs() > h[i] {
                return None;
            }
            continue;
        }
        let a = (-h[i] - o) / d;
        let b = (h[i] - o) / d;
        t_near = t_near.max(a.min(b));
        t_far = t_far.min(a.max(b));
        if t_near > t_far {
            return None;
        }
    }
    first_non_negative(t_near, t_far)
}

fn cylinder(ray: &Ray, radius: f64, half_length: f64) -> Option<f64> {
    let (o, d) = (ray.origin, ray.dir);
    let mut best: Option<f64> = None;
    let mut keep = |t: f64| {
        if t >= 0.0 && best.map_or(true, |b| t < b) {
            best = Some(t);
        }
    };

    // Side.
    let a = d.x * d.x + d.y * d.y;
    if a > EPSILON {
        let b = o.x * d.x + o.y * d.y;
        let c = o.x * o.x + o.y * o.y - radius * radius;
        let disc = b * b - a * c;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            for t in [(-b - sq) / a, (-b + sq) / a] {
                if (o.z + t * d.z).abs() <= half_length {
                    keep(t);
                }
            }
        }
    }

    // Caps.
    if d.z.abs() > EPSILON {
        for z in [-half_length, half_length] {
            let t = (z - o.z) / d.z;
            let p = o + d * t;
            if p.x * p.x + p.y * p.y <= radius * radius {
                keep(t);
            }
        }
    }

    best
}

fn plane(ray: &Ray, normal: &Vec3) -> Option<f64> {
    let denom = normal.dot(&ray.dir);
    if denom.abs() < EPSILON {
        return None;
    }
    let t = -normal.dot(&ray.origin) / denom;
    (t >= 0.0).then_some(t)
}

fn first_non_negative(near: f64, far: f64) -> Option<f64> {
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        Some(far)
    } else {
        None
    }
}
