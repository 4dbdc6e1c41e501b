//! Renderer abstraction.
//!
//! Every backend satisfies [`Renderer`]: it owns a [`Camera`], hands out a
//! [`Viewport`] for the current pose and turns `(viewport, scene)` into a
//! [`Bitmap`]. Camera deltas are provided methods, so the driver can apply the
//! same delta to every backend and switch between them without a visible jump.
//!
//! - [`cpu::CpuRenderer`] - host renderer, flat or multi-threaded path traced
//! - `gpu::kernel::KernelRenderer` - wgpu compute (feature `wgpu-backend`)
//! - `gpu::vulkan::VulkanRenderer` - vulkano compute (feature `vulkan-backend`)

pub mod cpu;

pub use cpu::{CpuMode, CpuRenderer};

use crate::scene::{Bitmap, Scene};
use crate::util::{Real, Result, Vec3};
use crate::view::{Camera, Viewport};

/// Default sample count per pixel.
pub const DEFAULT_SAMPLES: u32 = 128;

/// A rendering backend.
pub trait Renderer {
    /// Human-readable backend name and device.
    fn describe(&self) -> String;

    fn camera(&self) -> &Camera;

    fn camera_mut(&mut self) -> &mut Camera;

    /// Set the output resolution used by [`Renderer::current_viewport`].
    fn resize_viewport(&mut self, res_x: usize, res_y: usize) {
        self.camera_mut().set_resolution(res_x, res_y);
    }

    /// Move the camera by a camera-space delta.
    fn apply_move_delta(&mut self, delta: Vec3) {
        self.camera_mut().rel_move(delta);
    }

    /// Add `(pitch, yaw, roll)` to the camera angles.
    fn apply_rotation_delta(&mut self, delta: Vec3) {
        self.camera_mut().rotate(delta);
    }

    fn apply_focal_delta(&mut self, delta: Real) {
        self.camera_mut().add_focal(delta);
    }

    fn current_viewport(&self) -> Viewport {
        self.camera().viewport()
    }

    /// Albedo of the first hit per pixel.
    fn render_flat(
        &mut self,
        viewport: &Viewport,
        scene: &Scene,
        n_samples: u32,
        bitmap: &mut Bitmap,
    ) -> Result<()>;

    /// Full render in the backend's native mode.
    fn render(
        &mut self,
        viewport: &Viewport,
        scene: &Scene,
        n_samples: u32,
        bitmap: &mut Bitmap,
    ) -> Result<()>;
}
