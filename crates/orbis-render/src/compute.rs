//! wgpu implementation of [`ComputeDevice`].
//!
//! Images are storage textures; each dispatch is recorded in its own compute
//! pass. Recorded work is submitted to the queue at every memory barrier, so
//! storage uploads issued after a barrier can never be observed by dispatches
//! recorded before it.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::gpu::{ComputeDevice, ImageAccess, PixelFormat, TextureHandle};
use crate::shader::{Kernel, KernelId};

/// Error type for headless device initialization.
#[derive(Debug, thiserror::Error)]
pub enum ComputeContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Map a texel format to its wgpu equivalent.
pub fn wgpu_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::R32Float => wgpu::TextureFormat::R32Float,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

struct GpuImage {
    label: String,
    allocation: Option<(wgpu::Texture, wgpu::TextureView)>,
    size: (u32, u32),
}

struct BoundKernel {
    key: (KernelId, u64),
    bindings: Vec<u32>,
}

/// Compute backend owning a headless wgpu device.
pub struct WgpuCompute {
    device: wgpu::Device,
    queue: wgpu::Queue,
    images: HashMap<TextureHandle, GpuImage>,
    next_handle: u32,
    storage: HashMap<u32, wgpu::Buffer>,
    pipelines: HashMap<(KernelId, u64), wgpu::ComputePipeline>,
    bound: Option<BoundKernel>,
    bound_images: BTreeMap<u32, TextureHandle>,
    encoder: Option<wgpu::CommandEncoder>,
    submissions: u64,
}

impl WgpuCompute {
    /// Wrap an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            images: HashMap::new(),
            next_handle: 0,
            storage: HashMap::new(),
            pipelines: HashMap::new(),
            bound: None,
            bound_images: BTreeMap::new(),
            encoder: None,
            submissions: 0,
        }
    }

    /// Request an adapter and device without a surface.
    pub async fn new_headless() -> Result<Self, ComputeContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(ComputeContextError::NoAdapter),
        };

        let info = adapter.get_info();
        info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name, info.backend, info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("orbis-compute-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Number of command buffers submitted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Submit any recorded but unsubmitted work.
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
            self.submissions += 1;
        }
    }

    fn pipeline_for(&mut self, kernel: &Kernel) -> Option<(KernelId, u64)> {
        let key = (kernel.id(), kernel.revision());
        if self.pipelines.contains_key(&key) {
            return Some(key);
        }

        let entry_point = kernel.entry_point()?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel.name()),
                source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(kernel.name()),
                layout: None,
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            });

        // Older revisions of the same kernel are unreachable from now on.
        self.pipelines.retain(|(id, _), _| *id != kernel.id());
        self.pipelines.insert(key, pipeline);
        debug!(
            "Built compute pipeline '{}' (revision {})",
            kernel.name(),
            kernel.revision()
        );
        Some(key)
    }
}

impl ComputeDevice for WgpuCompute {
    fn create_texture(&mut self, label: &str) -> TextureHandle {
        self.next_handle += 1;
        let handle = TextureHandle(self.next_handle);
        self.images.insert(
            handle,
            GpuImage {
                label: label.to_string(),
                allocation: None,
                size: (0, 0),
            },
        );
        handle
    }

    fn allocate_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) {
        let Some(image) = self.images.get_mut(&texture) else {
            warn!("allocate_texture on unknown handle {:?}", texture);
            return;
        };

        let gpu_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&image.label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format(format),
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());

        if let Some((old, _)) = image.allocation.replace((gpu_texture, view)) {
            old.destroy();
        }
        image.size = (width, height);
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.images
            .get(&texture)
            .filter(|image| image.allocation.is_some())
            .map(|image| image.size)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(image) = self.images.remove(&texture)
            && let Some((gpu_texture, _)) = image.allocation
        {
            gpu_texture.destroy();
        }
        self.bound_images.retain(|_, bound| *bound != texture);
    }

    fn upload_storage(&mut self, slot: u32, bytes: &[u8]) {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("orbis-storage"),
                contents: bytes,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            });
        self.storage.insert(slot, buffer);
    }

    fn bind_kernel(&mut self, kernel: &Kernel) -> bool {
        self.bound_images.clear();
        self.bound = self.pipeline_for(kernel).map(|key| BoundKernel {
            key,
            bindings: kernel.bindings().to_vec(),
        });
        self.bound.is_some()
    }

    fn bind_image(&mut self, texture: TextureHandle, _access: ImageAccess, binding: u32) {
        // Access is declared by the kernel itself; wgpu validates it against the view.
        self.bound_images.insert(binding, texture);
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        let Some(bound) = &self.bound else {
            return;
        };
        let Some(pipeline) = self.pipelines.get(&bound.key) else {
            return;
        };

        let mut entries = Vec::with_capacity(bound.bindings.len());
        for &binding in &bound.bindings {
            if let Some(handle) = self.bound_images.get(&binding) {
                let Some((_, view)) = self
                    .images
                    .get(handle)
                    .and_then(|image| image.allocation.as_ref())
                else {
                    warn!("image {:?} at binding {} is not allocated", handle, binding);
                    return;
                };
                entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: wgpu::BindingResource::TextureView(view),
                });
            } else if let Some(buffer) = self.storage.get(&binding) {
                entries.push(wgpu::BindGroupEntry {
                    binding,
                    resource: buffer.as_entire_binding(),
                });
            } else {
                warn!("binding {} has no resource, skipping dispatch", binding);
                return;
            }
        }

        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("orbis-kernel-bindings"),
            layout: &layout,
            entries: &entries,
        });

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("orbis-compute"),
            })
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("orbis-kernel"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, groups_z);
    }

    fn memory_barrier(&mut self) {
        self.flush();
    }
}

/// Initialize a headless compute backend synchronously using `pollster`.
pub fn init_compute_blocking() -> Result<WgpuCompute, ComputeContextError> {
    pollster::block_on(WgpuCompute::new_headless())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::KernelLibrary;

    const FILL: &str = r#"
        @group(0) @binding(0) var output: texture_storage_2d<r32float, write>;

        @compute @workgroup_size(8, 8, 1)
        fn main(@builtin(global_invocation_id) id: vec3<u32>) {
            let size = textureDimensions(output);
            if (id.x >= size.x || id.y >= size.y) {
                return;
            }
            textureStore(output, vec2<i32>(id.xy), vec4<f32>(1.0, 0.0, 0.0, 1.0));
        }
    "#;

    fn create_test_backend() -> Option<WgpuCompute> {
        init_compute_blocking().ok()
    }

    #[test]
    fn test_format_mapping() {
        assert_eq!(
            wgpu_format(PixelFormat::R32Float),
            wgpu::TextureFormat::R32Float
        );
        assert_eq!(
            wgpu_format(PixelFormat::Rgba16Float),
            wgpu::TextureFormat::Rgba16Float
        );
    }

    #[test]
    fn test_allocate_resize_release() {
        let Some(mut gpu) = create_test_backend() else {
            return;
        };
        let texture = gpu.create_texture("height");
        assert_eq!(gpu.texture_size(texture), None);

        gpu.allocate_texture(texture, 21, 21, PixelFormat::R32Float);
        assert_eq!(gpu.texture_size(texture), Some((21, 21)));

        gpu.allocate_texture(texture, 45, 45, PixelFormat::R32Float);
        assert_eq!(gpu.texture_size(texture), Some((45, 45)));

        gpu.release_texture(texture);
        assert_eq!(gpu.texture_size(texture), None);
    }

    #[test]
    fn test_dispatch_and_barrier_submit_work() {
        let Some(mut gpu) = create_test_backend() else {
            return;
        };
        let mut library = KernelLibrary::new();
        let id = library.load_from_source("fill", "fill.wgsl", FILL);
        let texture = gpu.create_texture("target");
        gpu.allocate_texture(texture, 21, 21, PixelFormat::R32Float);

        assert!(gpu.bind_kernel(library.get(id).unwrap()));
        gpu.bind_image(texture, ImageAccess::WriteOnly, 0);
        gpu.dispatch(3, 3, 1);
        gpu.memory_barrier();
        assert_eq!(gpu.submissions(), 1);

        // A barrier with nothing recorded submits nothing.
        gpu.memory_barrier();
        assert_eq!(gpu.submissions(), 1);
    }

    #[test]
    fn test_failed_kernel_does_not_bind() {
        let Some(mut gpu) = create_test_backend() else {
            return;
        };
        let mut library = KernelLibrary::new();
        let id = library.load_from_source("broken", "broken.wgsl", "fn (");
        assert!(!gpu.bind_kernel(library.get(id).unwrap()));
        gpu.dispatch(1, 1, 1);
        gpu.memory_barrier();
        assert_eq!(gpu.submissions(), 0);
    }
}
