//! Scene data: materials, the output bitmap and the built-in demo scene.

use std::path::Path;

use crate::geom::Triangle;
use crate::util::{clamp01, Error, Result, Vec3};

/// Diffuse surface description.
///
/// `reflectance` is the albedo and is not clamped at rest. `emittance` is the
/// radiance the surface adds on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Material {
    pub reflectance: Vec3,
    pub emittance: Vec3,
}

impl Material {
    pub fn new(reflectance: Vec3, emittance: Vec3) -> Self {
        Self {
            reflectance,
            emittance,
        }
    }

    /// Non-emissive diffuse material.
    pub fn diffuse(reflectance: Vec3) -> Self {
        Self::new(reflectance, Vec3::ZERO)
    }
}

/// 8-bit RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Map a `[0,1]` channel to `0..=255` with rounding.
#[inline]
pub fn quantize(c: f64) -> u8 {
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Clamp a color to `[0,1]` and quantize it. Alpha is always 0.
pub fn vec3_to_rgba(c: Vec3) -> Rgba {
    let c = clamp01(c);
    Rgba::new(quantize(c.x), quantize(c.y), quantize(c.z), 0)
}

/// Row-major RGBA8 image matching the viewport pixel order.
#[derive(Debug, Clone, Default)]
pub struct Bitmap {
    pub res_x: usize,
    pub res_y: usize,
    pub data: Vec<Rgba>,
}

impl Bitmap {
    pub fn new(res_x: usize, res_y: usize) -> Self {
        Self {
            res_x,
            res_y,
            data: vec![Rgba::default(); res_x * res_y],
        }
    }

    /// Resize to `res_x * res_y` pixels. Existing contents are not preserved
    /// in any meaningful layout.
    pub fn resize(&mut self, res_x: usize, res_y: usize) {
        if self.res_x == res_x && self.res_y == res_y && self.data.len() == res_x * res_y {
            return;
        }
        self.res_x = res_x;
        self.res_y = res_y;
        self.data.clear();
        self.data.resize(res_x * res_y, Rgba::default());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel at column `i`, row `j`.
    pub fn get(&self, i: usize, j: usize) -> Option<Rgba> {
        if i >= self.res_x || j >= self.res_y {
            return None;
        }
        self.data.get(i + j * self.res_x).copied()
    }

    /// Flat `[r, g, b, a, ...]` bytes, for image encoders.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data.iter().flat_map(|p| [p.r, p.g, p.b, p.a]).collect()
    }

    /// Write as an RGB PNG. Alpha is always 0 in a rendered bitmap, so it is dropped.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let rgb: Vec<u8> = self.data.iter().flat_map(|p| [p.r, p.g, p.b]).collect();
        let img = image::RgbImage::from_raw(self.res_x as u32, self.res_y as u32, rgb)
            .ok_or_else(|| Error::Image("pixel count does not match resolution".into()))?;
        img.save(path.as_ref())
            .map_err(|e| Error::Image(format!("{}: {e}", path.as_ref().display())))
    }
}

/// Triangles and their materials, index for index.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    triangles: Vec<Triangle>,
    materials: Vec<Material>,
}

impl Scene {
    /// Pair up triangles and materials. Both lists must have the same length.
    pub fn new(triangles: Vec<Triangle>, materials: Vec<Material>) -> Result<Self> {
        if triangles.len() != materials.len() {
            return Err(Error::SceneMismatch {
                triangles: triangles.len(),
                materials: materials.len(),
            });
        }
        Ok(Self {
            triangles,
            materials,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    #[inline]
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Iterate `(triangle, material)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Triangle, &Material)> {
        self.triangles.iter().zip(self.materials.iter())
    }
}

/// The built-in scene: a red triangle over a two-tone floor, lit by a square
/// area light, in front of a white back wall.
pub fn demo_scene() -> Scene {
    let v = Vec3::new;
    let p = 20.0;
    let al = 0.75;

    let triangles = vec![
        Triangle::new(v(0.0, 0.0, 1.0), v(0.5, -0.5, 0.0), v(-0.5, -0.5, 0.0)),
        // floor
        Triangle::new(v(p, -1.0, p), v(-p, -1.0, -p), v(-p, -1.0, p)),
        Triangle::new(v(p, -1.0, p), v(p, -1.0, -p), v(-p, -1.0, -p)),
        // light
        Triangle::new(v(al, 0.75, al), v(-al, 0.75, al), v(al, 0.75, -al)),
        Triangle::new(v(-al, 0.75, al), v(-al, 0.75, -al), v(al, 0.75, -al)),
        // back wall
        Triangle::new(v(1.25, 0.5, 1.0), v(1.25, -1.0, 1.0), v(-1.25, -1.0, 1.0)),
        Triangle::new(v(1.25, 0.5, 1.0), v(-1.25, -1.0, 1.0), v(-1.25, 0.5, 1.0)),
    ];

    let light = Material::new(Vec3::ONE, Vec3::ONE);
    let materials = vec![
        Material::diffuse(v(1.0, 0.0, 0.0)),
        Material::diffuse(v(0.0, 1.0, 0.0)),
        Material::diffuse(v(0.0, 0.0, 1.0)),
        light,
        light,
        Material::diffuse(Vec3::ONE),
        Material::diffuse(Vec3::ONE),
    ];

    Scene {
        triangles,
        materials,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(-3.0), 0);
        assert_eq!(quantize(9.0), 255);
    }

    #[test]
    fn test_vec3_to_rgba_alpha_zero() {
        let px = vec3_to_rgba(Vec3::new(2.0, 0.25, -1.0));
        assert_eq!(px, Rgba::new(255, 64, 0, 0));
    }

    #[test]
    fn test_bitmap_resize() {
        let mut bmp = Bitmap::new(2, 2);
        bmp.data[3] = Rgba::new(1, 2, 3, 4);
        bmp.resize(4, 3);
        assert_eq!(bmp.len(), 12);
        assert!(bmp.data.iter().all(|p| *p == Rgba::default()));
        assert_eq!(bmp.get(3, 2), Some(Rgba::default()));
        assert_eq!(bmp.get(4, 0), None);

        bmp.resize(0, 0);
        assert!(bmp.is_empty());
    }

    #[test]
    fn test_bitmap_to_rgba8() {
        let mut bmp = Bitmap::new(2, 1);
        bmp.data[1] = Rgba::new(10, 20, 30, 0);
        assert_eq!(bmp.to_rgba8(), vec![0, 0, 0, 0, 10, 20, 30, 0]);
    }

    #[test]
    fn test_save_png() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().expect("temp file");
        let mut bmp = Bitmap::new(3, 2);
        bmp.data[4] = Rgba::new(255, 0, 0, 0);
        bmp.save_png(file.path()).expect("save");

        let img = image::open(file.path()).expect("decode").to_rgb8();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_scene_mismatch() {
        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        let err = Scene::new(vec![t, t], vec![Material::default()]).unwrap_err();
        assert!(matches!(
            err,
            Error::SceneMismatch {
                triangles: 2,
                materials: 1
            }
        ));
        assert!(Scene::new(vec![t], vec![Material::default()]).is_ok());
    }

    #[test]
    fn test_demo_scene() {
        let scene = demo_scene();
        assert_eq!(scene.len(), 7);
        assert_eq!(scene.materials().len(), 7);

        let emitters: Vec<_> = scene
            .iter()
            .filter(|(_, m)| m.emittance != Vec3::ZERO)
            .collect();
        assert_eq!(emitters.len(), 2);
        for (t, _) in emitters {
            // Light quad is horizontal
            assert!(t.n.x.abs() < 1e-12 && t.n.z.abs() < 1e-12);
        }
    }
}
