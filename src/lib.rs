//! # spath
//!
//! Interactive Monte-Carlo path tracer for small triangle scenes, with
//! interchangeable compute backends behind one [`render::Renderer`] trait.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math types
//! - [`geom`] - Rays, triangles, intersection and hemisphere sampling
//! - [`view`] - Pinhole camera and viewport ray generation
//! - [`trace`] - Host light-transport estimator
//! - [`scene`] - Materials, bitmap and the demo scene
//! - [`render`] - Renderer trait and the CPU backend
//! - [`gpu`] - wgpu and Vulkan compute backends
//! - [`app`] - Input mapping and the renderer set
//! - [`settings`] - Persistent settings
//!
//! ## Example
//!
//! ```ignore
//! use spath::prelude::*;
//!
//! let scene = demo_scene();
//! let mut r = CpuRenderer::new(CpuMode::PathTraced);
//! r.resize_viewport(320, 240);
//! let vp = r.current_viewport();
//! let mut bitmap = Bitmap::default();
//! r.render(&vp, &scene, 64, &mut bitmap)?;
//! ```

pub mod util;
pub mod geom;
pub mod view;
pub mod trace;
pub mod scene;
pub mod render;
pub mod gpu;
pub mod app;
pub mod settings;

// Re-export commonly used types
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Vec3};
    pub use crate::geom::{Ray, Triangle};
    pub use crate::scene::{demo_scene, Bitmap, Material, Rgba, Scene};
    pub use crate::view::{Camera, Viewport};
    pub use crate::render::{CpuMode, CpuRenderer, Renderer, DEFAULT_SAMPLES};
    pub use crate::app::AppState;
    pub use crate::settings::{BackendKind, Settings};
    #[cfg(feature = "wgpu-backend")]
    pub use crate::gpu::kernel::KernelRenderer;
    #[cfg(feature = "vulkan-backend")]
    pub use crate::gpu::vulkan::VulkanRenderer;
}
