//! Host renderer.
//!
//! Flat mode shades on the calling thread. Path-traced mode splits the pixels
//! into [`CHUNK_SIZE`] runs, deals them round-robin to a fixed rayon pool and
//! reports progress from the calling thread while the workers run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_pcg::Pcg32;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::Renderer;
use crate::scene::{Bitmap, Rgba, Scene};
use crate::trace::{flat_color, sample_pixel};
use crate::util::Result;
use crate::view::{Camera, Viewport};

/// Pixels per work unit.
pub const CHUNK_SIZE: usize = 16;

/// How often the calling thread logs progress.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// What [`Renderer::render`] does on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuMode {
    /// Albedo of the first hit, single-threaded.
    Flat,
    /// Monte-Carlo path tracing on every core.
    PathTraced,
}

/// Worker that owns chunk `chunk` when `workers` workers share `n_chunks` full chunks.
///
/// The first `chunks_per_worker * workers` chunks are dealt round-robin; anything
/// after that, including a trailing partial chunk, goes to the last worker.
pub fn worker_for_chunk(chunk: usize, n_chunks: usize, workers: usize) -> usize {
    let workers = workers.max(1);
    let chunks_per_worker = n_chunks / workers;
    if chunk < chunks_per_worker * workers {
        chunk % workers
    } else {
        workers - 1
    }
}

/// CPU backend.
pub struct CpuRenderer {
    camera: Camera,
    mode: CpuMode,
    pool: Option<ThreadPool>,
    threads: usize,
}

impl CpuRenderer {
    pub fn new(mode: CpuMode) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(mode, threads)
    }

    /// Build with an explicit worker count. One worker renders on the calling thread.
    pub fn with_threads(mode: CpuMode, threads: usize) -> Self {
        let mut threads = threads.max(1);
        let pool = if mode == CpuMode::PathTraced && threads > 1 {
            match ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("spath-cpu-{i}"))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("Can't start render threads, rendering sequentially: {}", e);
                    threads = 1;
                    None
                }
            }
        } else {
            None
        };

        if mode == CpuMode::PathTraced {
            info!("CPU path tracer using {} thread(s)", threads);
        }

        Self {
            camera: Camera::new(),
            mode,
            pool,
            threads,
        }
    }

    pub fn mode(&self) -> CpuMode {
        self.mode
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn path_trace(&self, viewport: &Viewport, scene: &Scene, n_samples: u32, out: &mut [Rgba]) {
        let rays = &viewport.rays;
        let n_pixels = out.len();
        if n_pixels == 0 {
            return;
        }

        let Some(pool) = self.pool.as_ref() else {
            let mut rng = Pcg32::seed_from_u64(0);
            for (px, ray) in out.iter_mut().zip(rays) {
                *px = sample_pixel(ray, scene, n_samples, &mut rng);
            }
            return;
        };

        let workers = self.threads;
        let n_chunks = n_pixels / CHUNK_SIZE;
        let mut buckets: Vec<Vec<(usize, &mut [Rgba])>> = (0..workers).map(|_| Vec::new()).collect();
        for (c, chunk) in out.chunks_mut(CHUNK_SIZE).enumerate() {
            buckets[worker_for_chunk(c, n_chunks, workers)].push((c * CHUNK_SIZE, chunk));
        }

        let progress = AtomicUsize::new(0);
        let (done_tx, done_rx) = mpsc::channel::<usize>();

        pool.in_place_scope(|s| {
            for (w, bucket) in buckets.into_iter().enumerate() {
                let progress = &progress;
                let done_tx = done_tx.clone();
                s.spawn(move |_| {
                    let mut rng = Pcg32::seed_from_u64(w as u64);
                    for (start, chunk) in bucket {
                        for (k, px) in chunk.iter_mut().enumerate() {
                            *px = sample_pixel(&rays[start + k], scene, n_samples, &mut rng);
                        }
                        progress.fetch_add(chunk.len(), Ordering::Relaxed);
                    }
                    let _ = done_tx.send(w);
                });
            }
            drop(done_tx);

            let mut finished = 0;
            while finished < workers {
                match done_rx.recv_timeout(PROGRESS_INTERVAL) {
                    Ok(w) => {
                        finished += 1;
                        debug!("worker {} done", w);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let p = progress.load(Ordering::Relaxed);
                        info!("progress {:.1}%", p as f64 * 100.0 / n_pixels as f64);
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        });
    }
}

impl Renderer for CpuRenderer {
    fn describe(&self) -> String {
        match self.mode {
            CpuMode::Flat => "CPU flat renderer".to_string(),
            CpuMode::PathTraced => format!("CPU path tracer ({} threads)", self.threads),
        }
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    fn render_flat(
        &mut self,
        viewport: &Viewport,
        scene: &Scene,
        _n_samples: u32,
        bitmap: &mut Bitmap,
    ) -> Result<()> {
        viewport.validate()?;
        bitmap.resize(viewport.res_x, viewport.res_y);
        for (px, ray) in bitmap.data.iter_mut().zip(&viewport.rays) {
            *px = flat_color(ray, scene);
        }
        Ok(())
    }

    fn render(
        &mut self,
        viewport: &Viewport,
        scene: &Scene,
        n_samples: u32,
        bitmap: &mut Bitmap,
    ) -> Result<()> {
        if self.mode == CpuMode::Flat {
            return self.render_flat(viewport, scene, n_samples, bitmap);
        }

        viewport.validate()?;
        info!("samples: {}", n_samples);
        let start = Instant::now();
        bitmap.resize(viewport.res_x, viewport.res_y);
        self.path_trace(viewport, scene, n_samples, &mut bitmap.data);
        info!("render done in {:.3} s", start.elapsed().as_secs_f64());
        Ok(())
    }
}
