//! Vulkan compute backend (vulkano).
//!
//! Explicit command-buffer flavor of the GPU renderer: the device, allocators
//! and compute pipeline are created once, host-visible buffers grow on demand,
//! and each render records one dispatch and waits on its fence.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use vulkano::{
    buffer::{Buffer, BufferContents, BufferCreateInfo, BufferUsage, Subbuffer},
    command_buffer::{allocator::StandardCommandBufferAllocator, AutoCommandBufferBuilder, CommandBufferUsage},
    descriptor_set::{allocator::StandardDescriptorSetAllocator, DescriptorSet, WriteDescriptorSet},
    device::{Device, DeviceCreateInfo, DeviceExtensions, Queue, QueueCreateInfo, QueueFlags},
    instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter, StandardMemoryAllocator},
    pipeline::{
        compute::ComputePipelineCreateInfo, layout::PipelineDescriptorSetLayoutCreateInfo, ComputePipeline,
        Pipeline, PipelineBindPoint, PipelineLayout, PipelineShaderStageCreateInfo,
    },
    shader::{ShaderModule, ShaderModuleCreateInfo},
    sync::{self, GpuFuture},
    VulkanLibrary,
};

use super::layout::{pack_rays, pack_scene, unpack_pixels, GpuInputs, GpuMaterial, GpuRay, GpuRgba, GpuTriangle};
use super::{grown_capacity, load_spirv, workgroup_counts, KERNEL_SPIRV_PATH};
use crate::render::Renderer;
use crate::scene::{Bitmap, Scene};
use crate::util::{Error, Result};
use crate::view::{Camera, Viewport};

/// Host-visible slice buffer that only ever grows.
struct SliceBuffer<T: BufferContents> {
    buffer: Subbuffer<[T]>,
    capacity: usize,
    usage: BufferUsage,
    filter: MemoryTypeFilter,
    label: &'static str,
}

impl<T: BufferContents + Copy> SliceBuffer<T> {
    fn new(
        allocator: &Arc<StandardMemoryAllocator>,
        label: &'static str,
        usage: BufferUsage,
        filter: MemoryTypeFilter,
    ) -> Result<Self> {
        Ok(Self {
            buffer: Self::create(allocator, label, usage, filter, 1)?,
            capacity: 1,
            usage,
            filter,
            label,
        })
    }

    fn create(
        allocator: &Arc<StandardMemoryAllocator>,
        label: &str,
        usage: BufferUsage,
        filter: MemoryTypeFilter,
        capacity: usize,
    ) -> Result<Subbuffer<[T]>> {
        Buffer::new_slice::<T>(
            allocator.clone(),
            BufferCreateInfo {
                usage,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: filter,
                ..Default::default()
            },
            capacity as u64,
        )
        .map_err(|e| Error::DeviceMemory(format!("{label}: {e}")))
    }

    /// Returns true if the buffer was replaced.
    fn ensure(&mut self, allocator: &Arc<StandardMemoryAllocator>, required: usize) -> Result<bool> {
        let Some(capacity) = grown_capacity(self.capacity, required) else {
            return Ok(false);
        };
        debug!("{}: grow {} -> {} elements", self.label, self.capacity, capacity);
        self.buffer = Self::create(allocator, self.label, self.usage, self.filter, capacity)?;
        self.capacity = capacity;
        Ok(true)
    }

    fn upload(&self, data: &[T]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut guard = self
            .buffer
            .write()
            .map_err(|e| Error::device(format!("{}: map for write failed: {e}", self.label)))?;
        guard[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Command-buffer GPU renderer.
pub struct VulkanRenderer {
    camera: Camera,
    description: String,

    // Declaration order is teardown order: descriptor set and buffers first,
    // then allocators and pipeline, the queue and device, the instance last.
    descriptor_set: Option<Arc<DescriptorSet>>,
    output: SliceBuffer<GpuRgba>,
    rays: SliceBuffer<GpuRay>,
    triangles: SliceBuffer<GpuTriangle>,
    materials: SliceBuffer<GpuMaterial>,
    inputs: Subbuffer<GpuInputs>,

    command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
    descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
    memory_allocator: Arc<StandardMemoryAllocator>,
    pipeline: Arc<ComputePipeline>,
    queue: Arc<Queue>,
    device: Arc<Device>,
    _instance: Arc<Instance>,
}

impl VulkanRenderer {
    /// Acquire a device and build the pipeline from [`KERNEL_SPIRV_PATH`].
    pub fn new() -> Result<Self> {
        Self::with_kernel(KERNEL_SPIRV_PATH)
    }

    pub fn with_kernel(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let words = load_spirv(path)?;
        info!("vulkan kernel: {}", path.display());

        let library = VulkanLibrary::new().map_err(|e| Error::NoDevice(format!("no Vulkan loader: {e}")))?;
        let instance = Instance::new(
            library,
            InstanceCreateInfo {
                flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
                ..Default::default()
            },
        )
        .map_err(|e| Error::NoDevice(format!("can't create Vulkan instance: {e}")))?;

        // First physical device with a compute-capable queue family
        let (physical, queue_family_index) = instance
            .enumerate_physical_devices()
            .map_err(|e| Error::NoDevice(e.to_string()))?
            .find_map(|p| {
                p.queue_family_properties()
                    .iter()
                    .position(|q| q.queue_flags.contains(QueueFlags::COMPUTE))
                    .map(|q| (p, q as u32))
            })
            .ok_or_else(|| Error::NoDevice("no Vulkan device with a compute queue".into()))?;

        let props = physical.properties();
        info!("vulkan device: {} ({:?})", props.device_name, props.device_type);
        let description = format!("GPU command-buffer renderer (vulkan) on {}", props.device_name);

        let enabled_extensions = DeviceExtensions {
            khr_storage_buffer_storage_class: physical.supported_extensions().khr_storage_buffer_storage_class,
            ..DeviceExtensions::empty()
        };
        let (device, mut queues) = Device::new(
            physical,
            DeviceCreateInfo {
                queue_create_infos: vec![QueueCreateInfo {
                    queue_family_index,
                    ..Default::default()
                }],
                enabled_extensions,
                ..Default::default()
            },
        )
        .map_err(|e| Error::device(format!("can't create logical device: {e}")))?;
        let queue = queues
            .next()
            .ok_or_else(|| Error::device("device returned no compute queue"))?;

        let pipeline = Self::create_pipeline(device.clone(), &words)?;

        let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
        let descriptor_set_allocator = Arc::new(StandardDescriptorSetAllocator::new(device.clone(), Default::default()));
        let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(device.clone(), Default::default()));

        let upload = MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE;
        let readback = MemoryTypeFilter::PREFER_HOST | MemoryTypeFilter::HOST_RANDOM_ACCESS;
        let storage = BufferUsage::STORAGE_BUFFER;

        let output = SliceBuffer::new(&memory_allocator, "spath_output", storage, readback)?;
        let rays = SliceBuffer::new(&memory_allocator, "spath_rays", storage, upload)?;
        let triangles = SliceBuffer::new(&memory_allocator, "spath_triangles", storage, upload)?;
        let materials = SliceBuffer::new(&memory_allocator, "spath_materials", storage, upload)?;
        let inputs = Buffer::from_data(
            memory_allocator.clone(),
            BufferCreateInfo {
                usage: BufferUsage::UNIFORM_BUFFER,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: upload,
                ..Default::default()
            },
            GpuInputs::default(),
        )
        .map_err(|e| Error::DeviceMemory(format!("spath_inputs: {e}")))?;

        Ok(Self {
            camera: Camera::new(),
            description,
            descriptor_set: None,
            output,
            rays,
            triangles,
            materials,
            inputs,
            command_buffer_allocator,
            descriptor_set_allocator,
            memory_allocator,
            pipeline,
            queue,
            device,
            _instance: instance,
        })
    }

    fn create_pipeline(device: Arc<Device>, words: &[u32]) -> Result<Arc<ComputePipeline>> {
        let compile = |what: &str, e: &dyn std::fmt::Display| Error::KernelCompile(format!("{what}: {e}"));

        // SAFETY: the words come from a file that passed the SPIR-V header check;
        // vulkano validates the module against the device before use.
        let module = unsafe { ShaderModule::new(device.clone(), ShaderModuleCreateInfo::new(words)) }
            .map_err(|e| compile("shader module", &e))?;
        let entry = module
            .entry_point("main")
            .ok_or_else(|| Error::KernelCompile("kernel has no `main` entry point".into()))?;

        let stage = PipelineShaderStageCreateInfo::new(entry);
        let layout_info = PipelineDescriptorSetLayoutCreateInfo::from_stages([&stage])
            .into_pipeline_layout_create_info(device.clone())
            .map_err(|e| compile("descriptor layout", &e))?;
        let layout = PipelineLayout::new(device.clone(), layout_info).map_err(|e| compile("pipeline layout", &e))?;

        ComputePipeline::new(device, None, ComputePipelineCreateInfo::stage_layout(stage, layout))
            .map_err(|e| compile("compute pipeline", &e))
    }

    fn rebuild_descriptor_set(&mut self) -> Result<()> {
        let layout = self
            .pipeline
            .layout()
            .set_layouts()
            .first()
            .ok_or_else(|| Error::KernelCompile("kernel declares no descriptor set".into()))?;

        let set = DescriptorSet::new(
            self.descriptor_set_allocator.clone(),
            layout.clone(),
            [
                WriteDescriptorSet::buffer(0, self.output.buffer.clone()),
                WriteDescriptorSet::buffer(1, self.rays.buffer.clone()),
                WriteDescriptorSet::buffer(2, self.triangles.buffer.clone()),
                WriteDescriptorSet::buffer(3, self.materials.buffer.clone()),
                WriteDescriptorSet::buffer(4, self.inputs.clone()),
            ],
            [],
        )
        .map_err(|e| Error::device(format!("descriptor set: {e}")))?;

        self.descriptor_set = Some(set);
        Ok(())
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

        let alloc = self.memory_allocator.clone();
        let mut rebind = self.descriptor_set.is_none();
        rebind |= self.output.ensure(&alloc, n_rays)?;
        rebind |= self.rays.ensure(&alloc, rays.len())?;
        rebind |= self.triangles.ensure(&alloc, tris.len())?;
        rebind |= self.materials.ensure(&alloc, mats.len())?;
        if rebind {
            self.rebuild_descriptor_set()?;
        }
        let set = self
            .descriptor_set
            .clone()
            .ok_or_else(|| Error::device("descriptor set missing"))?;

        self.rays.upload(&rays)?;
        self.triangles.upload(&tris)?;
        self.materials.upload(&mats)?;
        *self
            .inputs
            .write()
            .map_err(|e| Error::device(format!("spath_inputs: map for write failed: {e}")))? = GpuInputs {
            n_tris: tris.len() as u32,
            n_rays: n_rays as u32,
            n_samples,
            flat_mode: flat as u32,
        };

        let (wg_x, wg_y) = workgroup_counts(n_rays);
        let mut builder = AutoCommandBufferBuilder::primary(
            self.command_buffer_allocator.clone(),
            self.queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )
        .map_err(|e| Error::device(format!("command buffer: {e}")))?;

        builder
            .bind_pipeline_compute(self.pipeline.clone())
            .map_err(|e| Error::device(format!("bind pipeline: {e}")))?
            .bind_descriptor_sets(PipelineBindPoint::Compute, self.pipeline.layout().clone(), 0, set)
            .map_err(|e| Error::device(format!("bind descriptor set: {e}")))?;
        // SAFETY: the kernel bounds-checks its index against `n_rays` and every
        // bound buffer holds at least that many elements.
        unsafe { builder.dispatch([wg_x, wg_y, 1]) }.map_err(|e| Error::device(format!("dispatch: {e}")))?;

        let command_buffer = builder
            .build()
            .map_err(|e| Error::device(format!("command buffer build: {e}")))?;

        sync::now(self.device.clone())
            .then_execute(self.queue.clone(), command_buffer)
            .map_err(|e| Error::device(format!("submit: {e}")))?
            .then_signal_fence_and_flush()
            .map_err(|e| Error::device(format!("flush: {e}")))?
            .wait(None)
            .map_err(|e| Error::device(format!("fence wait: {e}")))?;

        {
            let out = self
                .output
                .buffer
                .read()
                .map_err(|e| Error::device(format!("spath_output: map for read failed: {e}")))?;
            unpack_pixels(&out[..n_rays], &mut bitmap.data);
        }

        info!("render done in {:.3} s", start.elapsed().as_secs_f64());
        Ok(())
    }
}

impl Renderer for VulkanRenderer {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_malformed_kernel_fails_before_device() {
        let mut f = NamedTempFile::new().expect("temp file");
        f.write_all(&[1, 2, 3, 4, 5]).expect("write");
        let err = VulkanRenderer::with_kernel(f.path()).err().expect("must fail");
        assert!(matches!(err, Error::KernelMalformed { .. }));
        assert!(err.is_construction_failure());
    }
}
