//! Pinhole camera and viewport ray generation.

use crate::geom::Ray;
use crate::util::{rot_x, rot_y, unit, DMat3, Error, Real, Result, Vec3};

/// Initial camera position.
pub const INITIAL_POSITION: Vec3 = Vec3::new(0.0, 0.0, -3.0);

/// Initial focal length. Larger values narrow the field of view.
pub const INITIAL_FOCAL: Real = 2.0;

/// One ray per pixel, row-major (`i + j * res_x`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Viewport {
    pub res_x: usize,
    pub res_y: usize,
    pub rays: Vec<Ray>,
}

impl Viewport {
    #[inline]
    pub fn len(&self) -> usize {
        self.rays.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    /// Fails unless there is exactly one ray per pixel.
    pub fn validate(&self) -> Result<()> {
        if self.rays.len() != self.res_x * self.res_y {
            return Err(Error::ViewportMismatch {
                rays: self.rays.len(),
                res_x: self.res_x,
                res_y: self.res_y,
            });
        }
        Ok(())
    }

    /// Storage index of cell `(i, j)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i + j * self.res_x
    }

    /// Cell `(i, j)` of a storage index.
    #[inline]
    pub fn cell(&self, index: usize) -> (usize, usize) {
        if self.res_x == 0 {
            return (0, 0);
        }
        (index % self.res_x, index / self.res_x)
    }
}

/// Camera pose, focal length and output resolution.
///
/// Angles are `(pitch, yaw, roll)` about `(X, Y, Z)`. Roll is tracked but does
/// not take part in ray generation.
#[derive(Debug, Clone)]
pub struct Camera {
    pos: Vec3,
    angles: Vec3,
    sin: Vec3,
    cos: Vec3,
    focal: Real,
    res_x: usize,
    res_y: usize,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        let mut cam = Self {
            pos: INITIAL_POSITION,
            angles: Vec3::ZERO,
            sin: Vec3::ZERO,
            cos: Vec3::ONE,
            focal: INITIAL_FOCAL,
            res_x: 0,
            res_y: 0,
        };
        cam.update_trig();
        cam
    }

    fn update_trig(&mut self) {
        let a = self.angles;
        self.sin = Vec3::new(a.x.sin(), a.y.sin(), a.z.sin());
        self.cos = Vec3::new(a.x.cos(), a.y.cos(), a.z.cos());
    }

    pub fn position(&self) -> Vec3 {
        self.pos
    }

    pub fn angles(&self) -> Vec3 {
        self.angles
    }

    pub fn focal(&self) -> Real {
        self.focal
    }

    pub fn resolution(&self) -> (usize, usize) {
        (self.res_x, self.res_y)
    }

    pub fn set_resolution(&mut self, res_x: usize, res_y: usize) {
        self.res_x = res_x;
        self.res_y = res_y;
    }

    /// Add `delta` to the angle triple and refresh the trig cache.
    pub fn rotate(&mut self, delta: Vec3) {
        self.angles += delta;
        self.update_trig();
    }

    pub fn set_angles(&mut self, angles: Vec3) {
        self.angles = angles;
        self.update_trig();
    }

    pub fn add_focal(&mut self, delta: Real) {
        self.focal += delta;
    }

    /// Camera-to-world rotation: yaw about Y first, then pitch about X.
    pub fn rotation(&self) -> DMat3 {
        rot_x(self.sin.x, self.cos.x) * rot_y(self.sin.y, self.cos.y)
    }

    /// Move by `delta` expressed in camera space.
    pub fn rel_move(&mut self, delta: Vec3) {
        self.pos += self.rotation() * delta;
    }

    /// Sensor offset of cell `(i, j)` in camera space.
    ///
    /// The sensor is `res_x / res_y` wide and 1 tall, centered on the optical
    /// axis; `i` grows towards -X and `j` towards -Y.
    pub fn sensor_offset(&self, i: usize, j: usize) -> Vec3 {
        let w = self.res_x as Real;
        let h = self.res_y as Real;
        let aspect = w / h;
        let step_x = aspect / w;
        let step_y = 1.0 / h;
        Vec3::new(
            aspect / 2.0 - step_x * i as Real - step_x / 2.0,
            0.5 - step_y * j as Real - step_y / 2.0,
            0.0,
        )
    }

    /// Generate the ray grid for the current pose.
    pub fn viewport(&self) -> Viewport {
        let (res_x, res_y) = (self.res_x, self.res_y);
        let rot = self.rotation();
        let forward = Vec3::new(0.0, 0.0, self.focal);

        let mut rays = Vec::with_capacity(res_x * res_y);
        for j in 0..res_y {
            for i in 0..res_x {
                let offset = self.sensor_offset(i, j);
                rays.push(Ray {
                    pos: self.pos + rot * offset,
                    dir: rot * unit(offset + forward),
                });
            }
        }

        Viewport { res_x, res_y, rays }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_size() {
        let mut cam = Camera::new();
        cam.set_resolution(7, 3);
        let vp = cam.viewport();
        assert_eq!(vp.len(), 21);
        assert_eq!((vp.res_x, vp.res_y), (7, 3));

        cam.set_resolution(0, 0);
        assert!(cam.viewport().is_empty());
    }

    #[test]
    fn test_index_cell() {
        let mut cam = Camera::new();
        cam.set_resolution(5, 4);
        let vp = cam.viewport();
        for j in 0..4 {
            for i in 0..5 {
                let idx = vp.index(i, j);
                assert_eq!(idx, i + j * 5);
                assert_eq!(vp.cell(idx), (i, j));

                let ray = vp.rays[idx];
                let expected = cam.position() + cam.sensor_offset(i, j);
                assert!((ray.pos - expected).length() < 1e-12);
            }
        }
    }

    #[test]
    fn test_sensor_layout() {
        let mut cam = Camera::new();
        cam.set_resolution(4, 2);
        // First cell sits in the +X/+Y corner, half a step inside
        let o = cam.sensor_offset(0, 0);
        assert!((o.x - 0.75).abs() < 1e-12);
        assert!((o.y - 0.25).abs() < 1e-12);
        let o = cam.sensor_offset(3, 1);
        assert!((o.x + 0.75).abs() < 1e-12);
        assert!((o.y + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_center_ray_looks_forward() {
        let mut cam = Camera::new();
        cam.set_resolution(1, 1);
        let vp = cam.viewport();
        let r = vp.rays[0];
        assert!((r.pos - INITIAL_POSITION).length() < 1e-12);
        assert!((r.dir - Vec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_focal_narrows_fov() {
        let mut cam = Camera::new();
        cam.set_resolution(8, 8);
        let edge = |c: &Camera| c.viewport().rays[0].dir.dot(Vec3::Z);
        let wide = edge(&cam);
        cam.add_focal(1.0);
        assert!(edge(&cam) > wide);
    }

    #[test]
    fn test_rel_move_follows_yaw() {
        let mut cam = Camera::new();
        cam.rotate(Vec3::new(0.0, std::f64::consts::FRAC_PI_2, 0.0));
        cam.rel_move(Vec3::new(0.0, 0.0, 1.0));
        // Forward is now +X
        let p = cam.position();
        assert!((p - Vec3::new(1.0, 0.0, -3.0)).length() < 1e-12);
    }

    #[test]
    fn test_validate() {
        let mut cam = Camera::new();
        cam.set_resolution(3, 2);
        let mut vp = cam.viewport();
        assert!(vp.validate().is_ok());

        vp.rays.pop();
        assert!(matches!(
            vp.validate(),
            Err(Error::ViewportMismatch { rays: 5, res_x: 3, res_y: 2 })
        ));
        assert!(Viewport::default().validate().is_ok());
    }

    #[test]
    fn test_rotated_rays() {
        let mut cam = Camera::new();
        cam.set_resolution(6, 4);
        cam.set_angles(Vec3::new(0.4, -0.7, 0.0));
        cam.add_focal(0.5);
        cam.rel_move(Vec3::new(0.3, -0.1, 0.2));

        let rot = cam.rotation();
        assert!((rot * Vec3::Z - Vec3::Z).length() > 0.1);
        let vp = cam.viewport();
        for j in 0..4 {
            for i in 0..6 {
                let ray = vp.rays[vp.index(i, j)];
                let offset = cam.sensor_offset(i, j);
                let pos = cam.position() + rot * offset;
                let dir = rot * unit(offset + Vec3::new(0.0, 0.0, cam.focal()));
                assert!((ray.pos - pos).length() < 1e-12);
                assert!((ray.dir - dir).length() < 1e-12);
            }
        }
    }

    #[test]
    fn test_rotation_yaw_then_pitch() {
        let mut cam = Camera::new();
        let (pitch, yaw) = (0.3, -0.8);
        cam.set_angles(Vec3::new(pitch, yaw, 0.0));
        let expected = DMat3::from_rotation_x(pitch) * DMat3::from_rotation_y(yaw);
        let v = Vec3::new(0.1, 0.2, 0.3);
        assert!((cam.rotation() * v - expected * v).length() < 1e-12);
    }
}
