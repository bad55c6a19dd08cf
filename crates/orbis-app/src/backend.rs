//! GPU backend used by the headless driver.
//!
//! Compute work goes to a real wgpu device when one is available. There is
//! no window, so render work is always recorded.

use std::path::Path;

use orbis_render::{
    ComputeDevice, DrawState, ImageAccess, Kernel, MaterialHandle, MeshHandle, PixelFormat,
    RecordingBackend, RenderDevice, TextureHandle, UniformValue, WgpuCompute,
    init_compute_blocking,
};
use tracing::{info, warn};

/// Work submitted during one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub dispatches: u32,
    pub barriers: u32,
    pub allocations: u32,
    pub draws: u32,
}

pub struct HeadlessBackend {
    compute: Option<WgpuCompute>,
    recorder: RecordingBackend,
    stats: FrameStats,
}

impl HeadlessBackend {
    /// Use a wgpu device when one can be created, otherwise record everything.
    pub fn detect() -> Self {
        match init_compute_blocking() {
            Ok(compute) => {
                info!("Running terrain kernels on the GPU");
                Self::with_compute(compute)
            }
            Err(err) => {
                warn!("{err}; recording compute work instead");
                Self::recording()
            }
        }
    }

    pub fn with_compute(compute: WgpuCompute) -> Self {
        Self {
            compute: Some(compute),
            recorder: RecordingBackend::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn recording() -> Self {
        Self {
            compute: None,
            recorder: RecordingBackend::new(),
            stats: FrameStats::default(),
        }
    }

    pub fn has_gpu(&self) -> bool {
        self.compute.is_some()
    }

    pub fn recorder(&self) -> &RecordingBackend {
        &self.recorder
    }

    /// Submit pending GPU work and return this frame's statistics.
    pub fn end_frame(&mut self) -> FrameStats {
        if let Some(compute) = &mut self.compute {
            compute.flush();
        }
        self.recorder.clear();
        std::mem::take(&mut self.stats)
    }

    fn compute_device(&self) -> &dyn ComputeDevice {
        match &self.compute {
            Some(compute) => compute as &dyn ComputeDevice,
            None => &self.recorder,
        }
    }

    fn compute_device_mut(&mut self) -> &mut dyn ComputeDevice {
        match &mut self.compute {
            Some(compute) => compute as &mut dyn ComputeDevice,
            None => &mut self.recorder,
        }
    }
}

impl ComputeDevice for HeadlessBackend {
    fn create_texture(&mut self, label: &str) -> TextureHandle {
        self.compute_device_mut().create_texture(label)
    }

    fn allocate_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) {
        self.stats.allocations += 1;
        self.compute_device_mut()
            .allocate_texture(texture, width, height, format);
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.compute_device().texture_size(texture)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.compute_device_mut().release_texture(texture);
    }

    fn upload_storage(&mut self, slot: u32, bytes: &[u8]) {
        self.compute_device_mut().upload_storage(slot, bytes);
    }

    fn bind_kernel(&mut self, kernel: &Kernel) -> bool {
        self.compute_device_mut().bind_kernel(kernel)
    }

    fn bind_image(&mut self, texture: TextureHandle, access: ImageAccess, binding: u32) {
        self.compute_device_mut()
            .bind_image(texture, access, binding);
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.stats.dispatches += 1;
        self.compute_device_mut()
            .dispatch(groups_x, groups_y, groups_z);
    }

    fn memory_barrier(&mut self) {
        self.stats.barriers += 1;
        self.compute_device_mut().memory_barrier();
    }
}

impl RenderDevice for HeadlessBackend {
    fn upload_mesh(&mut self, label: &str, positions: &[[f32; 3]], indices: &[u32]) -> MeshHandle {
        self.recorder.upload_mesh(label, positions, indices)
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        self.recorder.release_mesh(mesh);
    }

    fn create_material(&mut self, label: &str, source: &str) -> MaterialHandle {
        self.recorder.create_material(label, source)
    }

    fn bind_material(&mut self, material: MaterialHandle) -> bool {
        self.recorder.bind_material(material)
    }

    fn binding_index(&self, material: MaterialHandle, name: &str) -> Option<u32> {
        self.recorder.binding_index(material, name)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.recorder.set_uniform(name, value);
    }

    fn set_texture(&mut self, name: &str, texture: TextureHandle) {
        self.recorder.set_texture(name, texture);
    }

    fn request_texture(&mut self, label: &str, path: &Path, srgb: bool) -> TextureHandle {
        self.recorder.request_texture(label, path, srgb)
    }

    fn draw(&mut self, mesh: MeshHandle, state: DrawState) {
        self.stats.draws += 1;
        self.recorder.draw(mesh, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_render::{GpuCommand, KernelLibrary};

    const FILL: &str = r#"
        @group(0) @binding(0) var output: texture_storage_2d<r32float, write>;

        @compute @workgroup_size(8, 8, 1)
        fn main(@builtin(global_invocation_id) id: vec3<u32>) {
            textureStore(output, vec2<i32>(id.xy), vec4<f32>(1.0, 0.0, 0.0, 1.0));
        }
    "#;

    #[test]
    fn test_recording_backend_counts_frame_work() {
        let mut backend = HeadlessBackend::recording();
        assert!(!backend.has_gpu());

        let mut library = KernelLibrary::new();
        let id = library.load_from_source("fill", "fill.wgsl", FILL);
        let texture = backend.create_texture("target");
        backend.allocate_texture(texture, 16, 16, PixelFormat::R32Float);
        assert_eq!(backend.texture_size(texture), Some((16, 16)));

        let kernel = library.get(id).unwrap();
        assert!(backend.bind_kernel(kernel));
        backend.bind_image(texture, ImageAccess::WriteOnly, 0);
        backend.dispatch(2, 2, 1);
        backend.memory_barrier();
        assert_eq!(backend.recorder().dispatch_count(), 1);

        let stats = backend.end_frame();
        assert_eq!(
            stats,
            FrameStats {
                dispatches: 1,
                barriers: 1,
                allocations: 1,
                draws: 0,
            }
        );
        assert!(backend.recorder().commands().is_empty());
        assert_eq!(backend.end_frame(), FrameStats::default());
        // Resource state survives the per-frame clear.
        assert_eq!(backend.texture_size(texture), Some((16, 16)));
    }

    #[test]
    fn test_render_work_is_recorded() {
        let mut backend = HeadlessBackend::recording();
        let mesh = backend.upload_mesh("quad", &[[0.0; 3]; 3], &[0, 1, 2]);
        backend.draw(mesh, DrawState::default());
        assert_eq!(
            backend
                .recorder()
                .count(|c| matches!(c, GpuCommand::Draw { .. })),
            1
        );
        assert_eq!(backend.end_frame().draws, 1);
    }
}
