//! Typed values stored as element text or attribute text.

use physim_math::{Pose, Vec3, pose_from_xyz_rpy, pose_to_xyz_rpy};

/// A value that can be read from and written to scene text.
pub trait SceneValue: Sized {
    /// Human-readable description used in error messages.
    const EXPECTED: &'static str;

    fn parse_value(text: &str) -> Option<Self>;

    fn format_value(&self) -> String;
}

fn floats(text: &str) -> Option<Vec<f64>> {
    text.split_whitespace().map(|s| s.parse().ok()).collect()
}

impl SceneValue for f64 {
    const EXPECTED: &'static str = "a number";

    fn parse_value(text: &str) -> Option<Self> {
        text.trim().parse().ok()
    }

    fn format_value(&self) -> String {
        self.to_string()
    }
}

macro_rules! integer_value {
    ($($ty:ty),*) => {$(
        impl SceneValue for $ty {
            const EXPECTED: &'static str = "an integer";

            fn parse_value(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }

            fn format_value(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

integer_value!(i32, u32, usize);

impl SceneValue for bool {
    const EXPECTED: &'static str = "a boolean (true/false/1/0)";

    fn parse_value(text: &str) -> Option<Self> {
        match text.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    fn format_value(&self) -> String {
        self.to_string()
    }
}

impl SceneValue for String {
    const EXPECTED: &'static str = "text";

    fn parse_value(text: &str) -> Option<Self> {
        Some(text.to_string())
    }

    fn format_value(&self) -> String {
        self.clone()
    }
}

impl SceneValue for &str {
    const EXPECTED: &'static str = "text";

    // Borrowed text can't be produced from a temporary, so only formatting is useful.
    fn parse_value(_text: &str) -> Option<Self> {
        None
    }

    fn format_value(&self) -> String {
        (*self).to_string()
    }
}

impl SceneValue for Vec3 {
    const EXPECTED: &'static str = "three numbers 'x y z'";

    fn parse_value(text: &str) -> Option<Self> {
        match floats(text)?.as_slice() {
            [x, y, z] => Some(Vec3::new(*x, *y, *z)),
            _ => None,
        }
    }

    fn format_value(&self) -> String {
        format!("{} {} {}", self.x, self.y, self.z)
    }
}

impl SceneValue for Pose {
    const EXPECTED: &'static str = "six numbers 'x y z roll pitch yaw'";

    fn parse_value(text: &str) -> Option<Self> {
        match floats(text)?.as_slice() {
            [x, y, z, roll, pitch, yaw] => Some(pose_from_xyz_rpy(
                Vec3::new(*x, *y, *z),
                Vec3::new(*roll, *pitch, *yaw),
            )),
            _ => None,
        }
    }

    fn format_value(&self) -> String {
        let (xyz, rpy) = pose_to_xyz_rpy(self);
        format!(
            "{} {} {} {} {} {}",
            xyz.x, xyz.y, xyz.z, rpy.x, rpy.y, rpy.z
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_numbers() {
        assert_eq!(f64::parse_value(" 0.25 "), Some(0.25));
        assert_eq!(u32::parse_value("640"), Some(640));
        assert_eq!(i32::parse_value("-1"), Some(-1));
        assert_eq!(u32::parse_value("-1"), None);
        assert_eq!(f64::parse_value("nope"), None);
    }

    #[test]
    fn test_float_text_round_trips_exactly() {
        let x = 0.1 + 0.2;
        assert_eq!(f64::parse_value(&x.format_value()), Some(x));
    }

    #[test]
    fn test_booleans() {
        assert_eq!(bool::parse_value("1"), Some(true));
        assert_eq!(bool::parse_value("false"), Some(false));
        assert_eq!(bool::parse_value("yes"), None);
    }

    #[test]
    fn test_vec3_requires_three_components() {
        assert_eq!(Vec3::parse_value("1 2 3"), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(Vec3::parse_value("1 2"), None);
        assert_eq!(Vec3::parse_value("1 2 3 4"), None);
    }

    #[test]
    fn test_pose_text() {
        let pose = Pose::parse_value("1 2 3 0 0 1.5707963267948966").unwrap();
        assert_relative_eq!(pose.translation.vector, Vec3::new(1.0, 2.0, 3.0));
        let rotated = pose.rotation * Vec3::x();
        assert_relative_eq!(rotated, Vec3::y(), epsilon = 1e-12);

        let back = Pose::parse_value(&pose.format_value()).unwrap();
        assert_relative_eq!(back, pose, epsilon = 1e-12);
        assert!(Pose::parse_value("1 2 3").is_none());
    }
}
