//! Host-to-device data layout.
//!
//! Every struct is `#[repr(C)]`, bytemuck `Pod`, and built from 16-byte `vec4`
//! slots so WGSL storage layout and GLSL std430 agree with Rust without
//! relying on vec3 alignment rules.

use bytemuck::{Pod, Zeroable};

use crate::geom::{Ray, Triangle};
use crate::scene::{quantize, Material, Rgba, Scene};
use crate::util::Vec3;

/// `vec4<f32>` holding a vec3 and padding (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuVec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub _pad: f32,
}

impl GpuVec4 {
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

impl From<Vec3> for GpuVec4 {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x as f32,
            y: v.y as f32,
            z: v.z as f32,
            _pad: 0.0,
        }
    }
}

/// Ray (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct GpuRay {
    pub pos: GpuVec4,
    pub dir: GpuVec4,
}

impl From<&Ray> for GpuRay {
    fn from(r: &Ray) -> Self {
        Self {
            pos: r.pos.into(),
            dir: r.dir.into(),
        }
    }
}

/// Triangle with its flat normal (64 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: GpuVec4,
    pub v1: GpuVec4,
    pub v2: GpuVec4,
    pub n: GpuVec4,
}

impl From<&Triangle> for GpuTriangle {
    fn from(t: &Triangle) -> Self {
        Self {
            v0: t.v0.into(),
            v1: t.v1.into(),
            v2: t.v2.into(),
            n: t.n.into(),
        }
    }
}

/// Material (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct GpuMaterial {
    pub reflectance: GpuVec4,
    pub emittance: GpuVec4,
}

impl From<&Material> for GpuMaterial {
    fn from(m: &Material) -> Self {
        Self {
            reflectance: m.reflectance.into(),
            emittance: m.emittance.into(),
        }
    }
}

impl GpuMaterial {
    pub fn to_material(self) -> Material {
        Material::new(self.reflectance.to_vec3(), self.emittance.to_vec3())
    }
}

/// Float color written by the kernels (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl GpuRgba {
    /// Clamp and quantize. The kernel's alpha is dropped; alpha is 0.
    pub fn to_rgba(self) -> Rgba {
        let c = |v: f32| quantize((v as f64).clamp(0.0, 1.0));
        Rgba::new(c(self.r), c(self.g), c(self.b), 0)
    }
}

/// Per-dispatch uniforms (16 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuInputs {
    pub n_tris: u32,
    pub n_rays: u32,
    pub n_samples: u32,
    pub flat_mode: u32,
}

const _: () = assert!(std::mem::size_of::<GpuVec4>() == 16);
const _: () = assert!(std::mem::size_of::<GpuRay>() == 32);
const _: () = assert!(std::mem::size_of::<GpuTriangle>() == 64);
const _: () = assert!(std::mem::size_of::<GpuMaterial>() == 32);
const _: () = assert!(std::mem::size_of::<GpuRgba>() == 16);
const _: () = assert!(std::mem::size_of::<GpuInputs>() == 16);

/// Convert viewport rays for upload.
pub fn pack_rays(rays: &[Ray]) -> Vec<GpuRay> {
    rays.iter().map(GpuRay::from).collect()
}

/// Convert scene triangles and materials for upload.
pub fn pack_scene(scene: &Scene) -> (Vec<GpuTriangle>, Vec<GpuMaterial>) {
    (
        scene.triangles().iter().map(GpuTriangle::from).collect(),
        scene.materials().iter().map(GpuMaterial::from).collect(),
    )
}

/// Quantize kernel output into `out`, pixel for pixel.
pub fn unpack_pixels(src: &[GpuRgba], out: &mut [Rgba]) {
    for (dst, px) in out.iter_mut().zip(src) {
        *dst = px.to_rgba();
    }
}
