//! A backend that records every GPU command instead of executing it.
//!
//! Used by tests to assert dispatch counts, barrier placement and draw state,
//! and by the headless driver when no adapter is available.

use std::collections::HashMap;
use std::path::Path;

use crate::gpu::{
    ComputeDevice, DrawState, ImageAccess, MaterialHandle, MeshHandle, PixelFormat,
    RenderDevice, TextureHandle, UniformValue,
};
use crate::shader::{Kernel, global_bindings, validate_wgsl};

/// One recorded GPU command.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    CreateTexture {
        texture: TextureHandle,
        label: String,
    },
    AllocateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
    ReleaseTexture {
        texture: TextureHandle,
    },
    UploadStorage {
        slot: u32,
        size: usize,
    },
    BindKernel {
        name: String,
        ready: bool,
    },
    BindImage {
        texture: TextureHandle,
        access: ImageAccess,
        binding: u32,
    },
    Dispatch {
        groups: [u32; 3],
    },
    MemoryBarrier,
    UploadMesh {
        mesh: MeshHandle,
        label: String,
        vertex_count: usize,
        index_count: usize,
    },
    ReleaseMesh {
        mesh: MeshHandle,
    },
    BindMaterial {
        material: MaterialHandle,
        ready: bool,
    },
    SetUniform {
        name: String,
        value: UniformValue,
    },
    SetTexture {
        name: String,
        texture: TextureHandle,
    },
    RequestTexture {
        texture: TextureHandle,
        label: String,
        srgb: bool,
    },
    Draw {
        mesh: MeshHandle,
        state: DrawState,
    },
}

#[derive(Debug)]
struct RecordedTexture {
    size: Option<(u32, u32)>,
}

#[derive(Debug)]
struct RecordedMaterial {
    /// Global names and binding indices, or `None` if compilation failed.
    bindings: Option<Vec<(String, u32)>>,
}

/// Records commands; keeps just enough state to answer queries.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<GpuCommand>,
    textures: HashMap<TextureHandle, RecordedTexture>,
    materials: HashMap<MaterialHandle, RecordedMaterial>,
    storage: HashMap<u32, Vec<u8>>,
    next_handle: u32,
    kernel_bound: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    /// All commands recorded since creation or the last [`clear`](Self::clear).
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Forget recorded commands, keeping resource state.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded commands matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&GpuCommand) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    pub fn dispatch_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::Dispatch { .. }))
    }

    pub fn barrier_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::MemoryBarrier))
    }

    pub fn allocation_count(&self) -> usize {
        self.count(|c| matches!(c, GpuCommand::AllocateTexture { .. }))
    }

    /// Mesh and state of every recorded draw, in submission order.
    pub fn draws(&self) -> Vec<(MeshHandle, DrawState)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Draw { mesh, state } => Some((*mesh, *state)),
                _ => None,
            })
            .collect()
    }

    /// Number of images created and not yet released.
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Last bytes uploaded to `slot`.
    pub fn storage(&self, slot: u32) -> Option<&[u8]> {
        self.storage.get(&slot).map(Vec::as_slice)
    }
}

impl ComputeDevice for RecordingBackend {
    fn create_texture(&mut self, label: &str) -> TextureHandle {
        let texture = TextureHandle(self.next_handle());
        self.textures.insert(texture, RecordedTexture { size: None });
        self.commands.push(GpuCommand::CreateTexture {
            texture,
            label: label.to_string(),
        });
        texture
    }

    fn allocate_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) {
        if let Some(recorded) = self.textures.get_mut(&texture) {
            recorded.size = Some((width, height));
        }
        self.commands.push(GpuCommand::AllocateTexture {
            texture,
            width,
            height,
            format,
        });
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).and_then(|t| t.size)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.commands.push(GpuCommand::ReleaseTexture { texture });
    }

    fn upload_storage(&mut self, slot: u32, bytes: &[u8]) {
        self.storage.insert(slot, bytes.to_vec());
        self.commands.push(GpuCommand::UploadStorage {
            slot,
            size: bytes.len(),
        });
    }

    fn bind_kernel(&mut self, kernel: &Kernel) -> bool {
        self.kernel_bound = kernel.is_ready();
        self.commands.push(GpuCommand::BindKernel {
            name: kernel.name().to_string(),
            ready: self.kernel_bound,
        });
        self.kernel_bound
    }

    fn bind_image(&mut self, texture: TextureHandle, access: ImageAccess, binding: u32) {
        self.commands.push(GpuCommand::BindImage {
            texture,
            access,
            binding,
        });
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        if self.kernel_bound {
            self.commands.push(GpuCommand::Dispatch {
                groups: [groups_x, groups_y, groups_z],
            });
        }
    }

    fn memory_barrier(&mut self) {
        self.commands.push(GpuCommand::MemoryBarrier);
    }
}

impl RenderDevice for RecordingBackend {
    fn upload_mesh(&mut self, label: &str, positions: &[[f32; 3]], indices: &[u32]) -> MeshHandle {
        let mesh = MeshHandle(self.next_handle());
        self.commands.push(GpuCommand::UploadMesh {
            mesh,
            label: label.to_string(),
            vertex_count: positions.len(),
            index_count: indices.len(),
        });
        mesh
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        self.commands.push(GpuCommand::ReleaseMesh { mesh });
    }

    fn create_material(&mut self, label: &str, source: &str) -> MaterialHandle {
        let material = MaterialHandle(self.next_handle());
        let bindings = match validate_wgsl(label, source) {
            Ok(module) => Some(global_bindings(&module)),
            Err(err) => {
                log::warn!("{}", err);
                None
            }
        };
        self.materials
            .insert(material, RecordedMaterial { bindings });
        material
    }

    fn bind_material(&mut self, material: MaterialHandle) -> bool {
        let ready = self
            .materials
            .get(&material)
            .is_some_and(|m| m.bindings.is_some());
        self.commands
            .push(GpuCommand::BindMaterial { material, ready });
        ready
    }

    fn binding_index(&self, material: MaterialHandle, name: &str) -> Option<u32> {
        self.materials
            .get(&material)?
            .bindings
            .as_ref()?
            .iter()
            .find(|(global, _)| global == name)
            .map(|(_, binding)| *binding)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) {
        self.commands.push(GpuCommand::SetUniform {
            name: name.to_string(),
            value,
        });
    }

    fn set_texture(&mut self, name: &str, texture: TextureHandle) {
        self.commands.push(GpuCommand::SetTexture {
            name: name.to_string(),
            texture,
        });
    }

    fn request_texture(&mut self, label: &str, _path: &Path, srgb: bool) -> TextureHandle {
        let texture = TextureHandle(self.next_handle());
        self.commands.push(GpuCommand::RequestTexture {
            texture,
            label: label.to_string(),
            srgb,
        });
        texture
    }

    fn draw(&mut self, mesh: MeshHandle, state: DrawState) {
        self.commands.push(GpuCommand::Draw { mesh, state });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::KernelLibrary;

    const KERNEL: &str = r#"
        @group(0) @binding(0) var output: texture_storage_2d<r32float, write>;

        @compute @workgroup_size(8, 8, 1)
        fn main(@builtin(global_invocation_id) id: vec3<u32>) {
            textureStore(output, vec2<i32>(id.xy), vec4<f32>(0.0));
        }
    "#;

    #[test]
    fn test_texture_lifecycle() {
        let mut gpu = RecordingBackend::new();
        let texture = gpu.create_texture("height");
        assert_eq!(gpu.texture_size(texture), None);

        gpu.allocate_texture(texture, 21, 21, PixelFormat::R32Float);
        assert_eq!(gpu.texture_size(texture), Some((21, 21)));
        assert_eq!(gpu.live_texture_count(), 1);

        gpu.release_texture(texture);
        assert_eq!(gpu.live_texture_count(), 0);
        assert_eq!(gpu.texture_size(texture), None);
    }

    #[test]
    fn test_dispatch_requires_ready_kernel() {
        let mut library = KernelLibrary::new();
        let good = library.load_from_source("good", "good.wgsl", KERNEL);
        let bad = library.load_from_source("bad", "bad.wgsl", "fn broken(");
        let mut gpu = RecordingBackend::new();

        assert!(gpu.bind_kernel(library.get(good).unwrap()));
        gpu.dispatch(1, 1, 1);
        assert!(!gpu.bind_kernel(library.get(bad).unwrap()));
        gpu.dispatch(1, 1, 1);

        assert_eq!(gpu.dispatch_count(), 1);
    }

    #[test]
    fn test_storage_upload_is_kept() {
        let mut gpu = RecordingBackend::new();
        gpu.upload_storage(3, &[1, 2, 3, 4]);
        assert_eq!(gpu.storage(3), Some(&[1u8, 2, 3, 4][..]));
        assert!(gpu.storage(0).is_none());
    }

    #[test]
    fn test_material_binding_lookup() {
        let source = r#"
            @group(0) @binding(2) var height_map: texture_2d<f32>;

            @vertex
            fn vs_main() -> @builtin(position) vec4<f32> {
                return textureLoad(height_map, vec2<i32>(0, 0), 0);
            }
        "#;
        let mut gpu = RecordingBackend::new();
        let material = gpu.create_material("terrain", source);
        assert!(gpu.bind_material(material));
        assert_eq!(gpu.binding_index(material, "height_map"), Some(2));
        assert_eq!(gpu.binding_index(material, "missing"), None);

        let broken = gpu.create_material("broken", "not wgsl");
        assert!(!gpu.bind_material(broken));
        assert_eq!(gpu.binding_index(broken, "height_map"), None);
    }

    #[test]
    fn test_draws_are_listed_in_order() {
        let mut gpu = RecordingBackend::new();
        let a = gpu.upload_mesh("a", &[[0.0; 3]; 3], &[0, 1, 2]);
        let b = gpu.upload_mesh("b", &[[0.0; 3]; 3], &[0, 1, 2]);
        gpu.draw(b, DrawState::default());
        gpu.draw(a, DrawState::default());
        let meshes: Vec<_> = gpu.draws().into_iter().map(|(m, _)| m).collect();
        assert_eq!(meshes, vec![b, a]);
    }
}
