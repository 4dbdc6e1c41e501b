//! Math type re-exports and small vector helpers.
//!
//! The host side of the renderer works in double precision. `Vec3` is an alias
//! for `glam::DVec3`, which already provides componentwise arithmetic, scalar
//! scaling, `dot`, `cross`, `length` and negation.

pub use glam::{DMat3, DVec3};

/// Host vector type (`real` is `f64`).
pub type Vec3 = DVec3;

/// Scalar type used on the host.
pub type Real = f64;

pub use std::f64::consts::PI;

/// Unit vector in the direction of `v`.
///
/// A zero-length input yields NaN components; callers guard against it.
#[inline]
pub fn unit(v: Vec3) -> Vec3 {
    v / v.length()
}

/// Clamp every component to `[0, 1]`.
#[inline]
pub fn clamp01(v: Vec3) -> Vec3 {
    v.clamp(Vec3::ZERO, Vec3::ONE)
}

/// Rotation about the X axis (pitch) from a cached sine/cosine pair.
#[inline]
pub fn rot_x(sin: Real, cos: Real) -> DMat3 {
    DMat3::from_cols(
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, cos, sin),
        Vec3::new(0.0, -sin, cos),
    )
}

/// Rotation about the Y axis (yaw) from a cached sine/cosine pair.
#[inline]
pub fn rot_y(sin: Real, cos: Real) -> DMat3 {
    DMat3::from_cols(
        Vec3::new(cos, 0.0, -sin),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(sin, 0.0, cos),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit() {
        let u = unit(Vec3::new(3.0, 0.0, 4.0));
        assert!((u.length() - 1.0).abs() < 1e-12);
        assert!((u.x - 0.6).abs() < 1e-12);

        // Zero vector is not guarded here
        assert!(unit(Vec3::ZERO).x.is_nan());
    }

    #[test]
    fn test_clamp01() {
        let c = clamp01(Vec3::new(-0.5, 0.25, 7.0));
        assert_eq!(c, Vec3::new(0.0, 0.25, 1.0));
    }

    #[test]
    fn test_rotations_match_glam() {
        let a = 0.37_f64;
        let rx = rot_x(a.sin(), a.cos());
        let ry = rot_y(a.sin(), a.cos());
        let v = Vec3::new(0.2, -0.4, 1.3);

        assert!((rx * v - DMat3::from_rotation_x(a) * v).length() < 1e-12);
        assert!((ry * v - DMat3::from_rotation_y(a) * v).length() < 1e-12);
    }
}
