//! Rays, triangles and the intersection / sampling primitives.

use rand::Rng;

use crate::util::{unit, Real, Vec3, PI};

/// Determinant and distance tolerance for [`ray_intersect`].
pub const EPSILON: Real = 1e-14;

/// A ray with an origin and a direction.
///
/// The direction is not re-normalized after camera rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ray {
    pub pos: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(pos: Vec3, dir: Vec3) -> Self {
        Self { pos, dir }
    }

    /// Point at parametric distance `t`.
    #[inline]
    pub fn at(&self, t: Real) -> Vec3 {
        self.pos + self.dir * t
    }
}

/// Triangle with a precomputed flat normal.
///
/// The normal follows the winding `v0 -> v1 -> v2` and is not guaranteed to face
/// any particular side; shading flips it against the incoming ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub n: Vec3,
}

impl Triangle {
    /// Build a triangle and compute its flat normal once.
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            v0,
            v1,
            v2,
            n: flat_normal(v0, v1, v2),
        }
    }
}

/// Normalized `cross(v1 - v0, v2 - v0)`. NaN for degenerate triangles.
pub fn flat_normal(v0: Vec3, v1: Vec3, v2: Vec3) -> Vec3 {
    unit((v1 - v0).cross(v2 - v0))
}

/// A ray/triangle hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Parametric distance along the ray.
    pub distance: Real,
    /// First intersection point.
    pub point: Vec3,
}

/// Möller-Trumbore ray/triangle intersection.
///
/// Near-parallel rays (`|det| < EPSILON`) are rejected. Barycentrics must satisfy
/// `u in [0,1]`, `v >= 0`, `u + v <= 1`, and the distance must fall strictly inside
/// `(EPSILON, 1/EPSILON)`.
pub fn ray_intersect(r: &Ray, t: &Triangle) -> Option<Hit> {
    let edge1 = t.v1 - t.v0;
    let edge2 = t.v2 - t.v0;
    let h = r.dir.cross(edge2);
    let a = edge1.dot(h);
    if a > -EPSILON && a < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = r.pos - t.v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * r.dir.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let d = f * edge2.dot(q);
    if d > EPSILON && d < 1.0 / EPSILON {
        Some(Hit {
            distance: d,
            point: r.at(d),
        })
    } else {
        None
    }
}

/// Random direction on the hemisphere around `normal`.
///
/// Azimuth and elevation are drawn uniformly, then the sample is mirrored through
/// the origin when it lands on the wrong side of `normal`. The resulting density is
/// not the uniform hemisphere density the estimator divides by; that mismatch is
/// part of the light-transport model and kept as is.
pub fn rand_unit_vec<R: Rng + ?Sized>(normal: Vec3, rng: &mut R) -> Vec3 {
    let rv_xz = rng.gen::<Real>() * PI * 2.0;
    let rv_y = rng.gen::<Real>() * PI * 0.5;
    let f_x = rv_y.cos();
    let f_y = rv_y.sin();

    let out = Vec3::new(rv_xz.cos() * f_x, f_y, rv_xz.sin() * f_x);
    if normal.dot(out) < 0.0 {
        -out
    } else {
        out
    }
}
