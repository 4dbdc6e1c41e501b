//! Application state: the renderer set and the input mapping.
//!
//! Holds what an interactive front end would keep between frames. Camera deltas
//! go to every renderer so switching backends keeps the same view.
//!
//! | Key | Effect |
//! |-----|--------|
//! | `w` / `s` | move forward / back |
//! | `a` / `d` | move sideways |
//! | `f` / `g` | focal length up / down |
//! | `r` | next backend |
//! | `+` / `-` | double / halve samples |
//! | `p` | toggle path tracing |
//! | `q` / ESC | quit |

use tracing::{debug, info};

use crate::render::{CpuMode, CpuRenderer, Renderer};
use crate::scene::{Bitmap, Scene};
use crate::settings::{BackendKind, Settings};
use crate::util::{Error, Real, Result, Vec3, PI};

/// Camera step per movement key.
pub const MOVE_STEP: Real = 0.05;

/// Focal change per `f` / `g`.
pub const FOCAL_STEP: Real = 0.1;

/// Radians per pixel of mouse drag, as a fraction of a full turn.
pub const DRAG_SENSITIVITY: Real = 0.0005;

/// Escape key as it appears in a key script.
pub const KEY_ESCAPE: char = '\u{1b}';

/// Instantiate the backends listed in `settings`, in order.
///
/// Any construction failure aborts; there is no fallback to another backend.
pub fn build_renderers(settings: &Settings) -> Result<Vec<Box<dyn Renderer>>> {
    let mut renderers: Vec<Box<dyn Renderer>> = Vec::with_capacity(settings.backends.len());
    for &kind in &settings.backends {
        let r = build_renderer(kind, settings)?;
        info!("backend {}: {}", kind, r.describe());
        renderers.push(r);
    }
    Ok(renderers)
}

#[cfg_attr(
    not(any(feature = "wgpu-backend", feature = "vulkan-backend")),
    allow(unused_variables)
)]
fn build_renderer(kind: BackendKind, settings: &Settings) -> Result<Box<dyn Renderer>> {
    match kind {
        BackendKind::Cpu => Ok(Box::new(CpuRenderer::new(CpuMode::PathTraced))),
        BackendKind::CpuFlat => Ok(Box::new(CpuRenderer::new(CpuMode::Flat))),
        #[cfg(feature = "wgpu-backend")]
        BackendKind::Wgpu => Ok(Box::new(crate::gpu::kernel::KernelRenderer::with_kernel(
            &settings.wgsl_kernel,
        )?)),
        #[cfg(feature = "vulkan-backend")]
        BackendKind::Vulkan => Ok(Box::new(crate::gpu::vulkan::VulkanRenderer::with_kernel(
            &settings.spirv_kernel,
        )?)),
        #[cfg(not(all(feature = "wgpu-backend", feature = "vulkan-backend")))]
        other => Err(Error::Settings(format!("backend '{other}' is not compiled in"))),
    }
}

/// Driver-side state between frames.
pub struct AppState {
    renderers: Vec<Box<dyn Renderer>>,
    active: usize,
    samples: u32,
    path_tracing: bool,
    running: bool,
    size: (usize, usize),
    drag_from: Option<(Real, Real)>,
}

impl AppState {
    /// Take ownership of the renderers and size every viewport.
    pub fn new(mut renderers: Vec<Box<dyn Renderer>>, settings: &Settings) -> Result<Self> {
        if renderers.is_empty() {
            return Err(Error::Settings("no backends configured".into()));
        }
        for r in renderers.iter_mut() {
            r.resize_viewport(settings.width, settings.height);
        }
        Ok(Self {
            renderers,
            active: 0,
            samples: settings.samples.max(1),
            path_tracing: settings.path_tracing,
            running: true,
            size: (settings.width, settings.height),
            drag_from: None,
        })
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn path_tracing(&self) -> bool {
        self.path_tracing
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &dyn Renderer {
        self.renderers[self.active].as_ref()
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    fn for_each(&mut self, f: impl Fn(&mut dyn Renderer)) {
        for r in self.renderers.iter_mut() {
            f(r.as_mut());
        }
    }

    /// Apply one key press. Unknown keys are ignored.
    pub fn handle_key(&mut self, key: char) {
        match key {
            'w' => self.for_each(|r| r.apply_move_delta(Vec3::new(0.0, 0.0, MOVE_STEP))),
            's' => self.for_each(|r| r.apply_move_delta(Vec3::new(0.0, 0.0, -MOVE_STEP))),
            'a' => self.for_each(|r| r.apply_move_delta(Vec3::new(MOVE_STEP, 0.0, 0.0))),
            'd' => self.for_each(|r| r.apply_move_delta(Vec3::new(-MOVE_STEP, 0.0, 0.0))),
            'f' => self.for_each(|r| r.apply_focal_delta(FOCAL_STEP)),
            'g' => self.for_each(|r| r.apply_focal_delta(-FOCAL_STEP)),
            'r' => self.next_backend(),
            '+' => {
                self.samples = self.samples.saturating_mul(2);
                info!("samples: {}", self.samples);
            }
            '-' => {
                self.samples = (self.samples / 2).max(1);
                info!("samples: {}", self.samples);
            }
            'p' => {
                self.path_tracing = !self.path_tracing;
                info!("path tracing: {}", if self.path_tracing { "on" } else { "off" });
            }
            'q' | KEY_ESCAPE => {
                debug!("quit requested");
                self.running = false;
            }
            other => debug!("unmapped key {:?}", other),
        }
    }

    /// Apply every key of a script in order, stopping at a quit key.
    pub fn play_keys(&mut self, script: &str) {
        for key in script.chars() {
            if !self.running {
                break;
            }
            self.handle_key(key);
        }
    }

    fn next_backend(&mut self) {
        self.active = (self.active + 1) % self.renderers.len();
        let (w, h) = self.size;
        let r = &mut self.renderers[self.active];
        r.resize_viewport(w, h);
        info!("{}", r.describe());
    }

    /// Resize every viewport.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.size = (width, height);
        self.for_each(|r| r.resize_viewport(width, height));
    }

    /// Left button pressed at `(x, y)`.
    pub fn mouse_down(&mut self, x: Real, y: Real) {
        self.drag_from = Some((x, y));
    }

    /// Pointer moved with the left button held: rotate by the drag delta.
    pub fn mouse_drag(&mut self, x: Real, y: Real) {
        let Some((x0, y0)) = self.drag_from else {
            return;
        };
        let (dx, dy) = (x - x0, y - y0);
        let k = 2.0 * PI * DRAG_SENSITIVITY;
        let delta = Vec3::new(dy * k, -dx * k, 0.0);
        self.for_each(|r| r.apply_rotation_delta(delta));
        self.drag_from = Some((x, y));
    }

    pub fn mouse_up(&mut self) {
        self.drag_from = None;
    }

    /// Render one frame with the active backend in the current mode.
    pub fn frame(&mut self, scene: &Scene, bitmap: &mut Bitmap) -> Result<()> {
        let samples = self.samples;
        let path_tracing = self.path_tracing;
        let r = &mut self.renderers[self.active];
        let viewport = r.current_viewport();
        if path_tracing {
            r.render(&viewport, scene, samples, bitmap)
        } else {
            r.render_flat(&viewport, scene, samples, bitmap)
        }
    }
}
