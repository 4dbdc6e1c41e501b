//! wgpu compute backend.
//!
//! Loads the WGSL kernel at construction, keeps grow-only storage buffers for
//! rays, triangles, materials and output, and reads results back through a
//! mappable staging buffer. Every render blocks until the readback completes.
//!
//! ## Usage
//! ```ignore
//! let mut r = KernelRenderer::new()?;
//! r.resize_viewport(640, 480);
//! let vp = r.current_viewport();
//! r.render(&vp, &scene, 128, &mut bitmap)?;
//! ```

use std::mem::size_of;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use super::layout::{pack_rays, pack_scene, unpack_pixels, GpuInputs, GpuMaterial, GpuRay, GpuRgba, GpuTriangle};
use super::{grown_capacity, load_kernel_source, workgroup_counts, KERNEL_WGSL_PATH};
use crate::render::Renderer;
use crate::scene::{Bitmap, Scene};
use crate::util::{Error, Result};
use crate::view::{Camera, Viewport};

/// Storage buffer that only ever grows.
struct GrowBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    elem_size: usize,
    usage: wgpu::BufferUsages,
    label: &'static str,
}

impl GrowBuffer {
    fn new(device: &wgpu::Device, label: &'static str, elem_size: usize, usage: wgpu::BufferUsages) -> Self {
        Self {
            buffer: Self::create(device, label, elem_size, 1, usage),
            capacity: 1,
            elem_size,
            usage,
            label,
        }
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        elem_size: usize,
        capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (elem_size * capacity) as u64,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Make room for `required` elements. Returns true if the buffer was replaced.
    fn ensure(&mut self, device: &wgpu::Device, required: usize) -> bool {
        let Some(capacity) = grown_capacity(self.capacity, required) else {
            return false;
        };
        debug!("{}: grow {} -> {} elements", self.label, self.capacity, capacity);
        self.buffer = Self::create(device, self.label, self.elem_size, capacity, self.usage);
        self.capacity = capacity;
        true
    }
}

/// Kernel-offload GPU renderer.
pub struct KernelRenderer {
    camera: Camera,
    description: String,

    // Fields drop in declaration order: bindings and buffers before the
    // pipelines, pipelines before the device.
    bind_group: Option<wgpu::BindGroup>,
    output: GrowBuffer,
    staging: GrowBuffer,
    rays: GrowBuffer,
    triangles: GrowBuffer,
    materials: GrowBuffer,
    inputs: wgpu::Buffer,

    flat_pipeline: wgpu::ComputePipeline,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,

    queue: wgpu::Queue,
    device: wgpu::Device,
    _adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl KernelRenderer {
    /// Acquire a device and build the pipelines from [`KERNEL_WGSL_PATH`].
    pub fn new() -> Result<Self> {
        Self::with_kernel(KERNEL_WGSL_PATH)
    }

    pub fn with_kernel(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = load_kernel_source(path)?;
        info!("wgpu kernel: {}", path.display());

        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::NoDevice(e.to_string()))?;

        let adapter_info = adapter.get_info();
        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(Error::NoDevice(format!(
                "{} has no compute shader support",
                adapter_info.name
            )));
        }
        info!("wgpu adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("spath_device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| Error::device(format!("request_device failed: {e}")))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("spath_render_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("spath_bind_group_layout"),
            entries: &[
                // @binding(0) output colors
                storage_entry(0, false),
                // @binding(1..=3) rays, triangles, materials
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                // @binding(4) dispatch inputs
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("spath_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make_pipeline = |entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let flat_pipeline = make_pipeline("render_flat");
        let pipeline = make_pipeline("render");

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::KernelCompile(err.to_string()));
        }

        use wgpu::BufferUsages as U;
        let output = GrowBuffer::new(&device, "spath_output", size_of::<GpuRgba>(), U::STORAGE | U::COPY_SRC);
        let staging = GrowBuffer::new(&device, "spath_staging", size_of::<GpuRgba>(), U::MAP_READ | U::COPY_DST);
        let rays = GrowBuffer::new(&device, "spath_rays", size_of::<GpuRay>(), U::STORAGE | U::COPY_DST);
        let triangles = GrowBuffer::new(&device, "spath_triangles", size_of::<GpuTriangle>(), U::STORAGE | U::COPY_DST);
        let materials = GrowBuffer::new(&device, "spath_materials", size_of::<GpuMaterial>(), U::STORAGE | U::COPY_DST);
        let inputs = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("spath_inputs"),
            size: size_of::<GpuInputs>() as u64,
            usage: U::UNIFORM | U::COPY_DST,
            mapped_at_creation: false,
        });

        let description = format!("GPU kernel renderer (wgpu) on {} ({:?})", adapter_info.name, adapter_info.backend);

        Ok(Self {
            camera: Camera::new(),
            description,
            bind_group: None,
            output,
            staging,
            rays,
            triangles,
            materials,
            inputs,
            flat_pipeline,
            pipeline,
            bind_group_layout,
            queue,
            device,
            _adapter: adapter,
            _instance: instance,
        })
    }

    fn rebuild_bind_group(&mut self) {
        self.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("spath_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.output.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.rays.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.triangles.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.materials.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.inputs.as_entire_binding(),
                },
            ],
        }));
    }

    fn dispatch(
        &mut self,
        viewport: &Viewport,
        scene: &Scene,
        n_samples: u32,
        flat: bool,
        bitmap: &mut Bitmap,
    ) -> Result<()> {
        viewport.validate()?;
        let start = Instant::now();
        bitmap.resize(viewport.res_x, viewport.res_y);
        let n_rays = viewport.len();
        if n_rays == 0 {
            return Ok(());
        }

        let rays = pack_rays(&viewport.rays);
        let (tris, mats) = pack_scene(scene);

        let mut rebind = self.bind_group.is_none();
        rebind |= self.output.ensure(&self.device, n_rays);
        rebind |= self.staging.ensure(&self.device, n_rays);
        rebind |= self.rays.ensure(&self.device, rays.len());
        rebind |= self.triangles.ensure(&self.device, tris.len());
        rebind |= self.materials.ensure(&self.device, mats.len());
        if rebind {
            self.rebuild_bind_group();
        }
        let Some(bind_group) = self.bind_group.as_ref() else {
            return Err(Error::device("bind group missing"));
        };

        let inputs = GpuInputs {
            n_tris: tris.len() as u32,
            n_rays: n_rays as u32,
            n_samples,
            flat_mode: flat as u32,
        };
        self.queue.write_buffer(&self.inputs, 0, bytemuck::bytes_of(&inputs));
        self.queue.write_buffer(&self.rays.buffer, 0, bytemuck::cast_slice(&rays));
        if !tris.is_empty() {
            self.queue.write_buffer(&self.triangles.buffer, 0, bytemuck::cast_slice(&tris));
            self.queue.write_buffer(&self.materials.buffer, 0, bytemuck::cast_slice(&mats));
        }

        let (wg_x, wg_y) = workgroup_counts(n_rays);
        let out_bytes = (n_rays * size_of::<GpuRgba>()) as u64;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("spath_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("spath_compute_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(if flat { &self.flat_pipeline } else { &self.pipeline });
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(wg_x, wg_y, 1);
        }
        encoder.copy_buffer_to_buffer(&self.output.buffer, 0, &self.staging.buffer, 0, out_bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = self.staging.buffer.slice(..out_bytes);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::device(format!("device poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| Error::device("map_async channel closed"))?
            .map_err(|e| Error::device(format!("readback map failed: {e}")))?;

        {
            let data = slice.get_mapped_range();
            let pixels = bytemuck::cast_slice::<u8, GpuRgba>(&data);
            unpack_pixels(pixels, &mut bitmap.data);
        }
        self.staging.buffer.unmap();

        info!("render done in {:.3} s", start.elapsed().as_secs_f64());
        Ok(())
    }
}

impl Renderer for KernelRenderer {
    fn describe(&self) -> String {
        self.description.clone()
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
        n_samples: u32,
        bitmap: &mut Bitmap,
    ) -> Result<()> {
        self.dispatch(viewport, scene, n_samples, true, bitmap)
    }

    fn render(
        &mut self,
        viewport: &Viewport,
        scene: &Scene,
        n_samples: u32,
        bitmap: &mut Bitmap,
    ) -> Result<()> {
        info!("samples: {}", n_samples);
        self.dispatch(viewport, scene, n_samples, false, bitmap)
    }
}
