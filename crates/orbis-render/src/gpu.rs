//! GPU capability contracts consumed by the terrain core.
//!
//! The terrain never talks to a graphics API directly. It drives two narrow
//! traits: [`ComputeDevice`] for 2D GPU images, storage uploads and kernel
//! dispatch, and [`RenderDevice`] for meshes, materials and draw submission.
//! Resources are referred to by small copyable handles owned by the backend.

use std::path::Path;

use bytemuck::Pod;

use crate::shader::Kernel;

/// Handle to a 2D GPU image (height map, normal map, streamed texture).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Handle to an uploaded vertex/index buffer pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u32);

/// Handle to a compiled render program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Texel formats used by the terrain maps and streamed textures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Single 32-bit float channel (height maps).
    R32Float,
    /// Four 16-bit float channels (normal maps).
    Rgba16Float,
    /// 8-bit sRGB color (albedo textures).
    Rgba8UnormSrgb,
    /// 8-bit linear color (normal/MRAO textures).
    Rgba8Unorm,
}

impl PixelFormat {
    /// Size of one texel in bytes.
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            PixelFormat::R32Float => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::Rgba8UnormSrgb | PixelFormat::Rgba8Unorm => 4,
        }
    }
}

/// How a kernel accesses a bound image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Rasterizer fill mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

/// Winding order considered front facing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

/// Fixed-function state for one draw submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DrawState {
    pub cull_back_faces: bool,
    pub polygon_mode: PolygonMode,
    pub front_face: FrontFace,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            cull_back_faces: true,
            polygon_mode: PolygonMode::Fill,
            front_face: FrontFace::Ccw,
        }
    }
}

/// A value bound to a named material uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

/// GPU compute capability: images, storage uploads, kernels and barriers.
///
/// Dispatches are asynchronous with respect to the caller. Ordering between
/// dependent dispatches exists only where [`memory_barrier`](Self::memory_barrier)
/// is issued.
pub trait ComputeDevice {
    /// Register a new, not yet allocated, 2D image.
    fn create_texture(&mut self, label: &str) -> TextureHandle;

    /// Allocate (or reallocate) the storage behind `texture`.
    fn allocate_texture(
        &mut self,
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: PixelFormat,
    );

    /// Current `(width, height)` of an allocated image.
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;

    /// Free the image. The handle must not be used afterwards.
    fn release_texture(&mut self, texture: TextureHandle);

    /// Upload `bytes` to the GPU-readable buffer bound at `slot`.
    fn upload_storage(&mut self, slot: u32, bytes: &[u8]);

    /// Bind `kernel` for the following dispatches. Returns `false` when the
    /// kernel has no valid compiled program; later dispatches are then no-ops.
    fn bind_kernel(&mut self, kernel: &Kernel) -> bool;

    /// Bind `texture` as a storage image at `binding` for the bound kernel.
    fn bind_image(&mut self, texture: TextureHandle, access: ImageAccess, binding: u32);

    /// Dispatch the bound kernel with the given workgroup counts.
    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32);

    /// Make every previous write visible to every later read.
    fn memory_barrier(&mut self);
}

/// Render capability: meshes, materials, named uniforms and draw submission.
pub trait RenderDevice {
    /// Upload a position-only triangle list.
    fn upload_mesh(&mut self, label: &str, positions: &[[f32; 3]], indices: &[u32]) -> MeshHandle;

    /// Free a mesh previously returned by [`upload_mesh`](Self::upload_mesh).
    fn release_mesh(&mut self, mesh: MeshHandle);

    /// Compile a WGSL render program. Compile errors are kept by the backend
    /// and surface as `false` from [`bind_material`](Self::bind_material).
    fn create_material(&mut self, label: &str, source: &str) -> MaterialHandle;

    /// Make `material` current. Returns `false` if it failed to compile.
    fn bind_material(&mut self, material: MaterialHandle) -> bool;

    /// Binding index of a named uniform or texture in `material`.
    fn binding_index(&self, material: MaterialHandle, name: &str) -> Option<u32>;

    /// Set a named uniform on the current material.
    fn set_uniform(&mut self, name: &str, value: UniformValue);

    /// Bind `texture` for sampling under `name` on the current material.
    fn set_texture(&mut self, name: &str, texture: TextureHandle);

    /// Start streaming an image file. The handle is bindable immediately and
    /// samples as a placeholder until the upload completes.
    fn request_texture(&mut self, label: &str, path: &Path, srgb: bool) -> TextureHandle;

    /// Submit `mesh` with the current material.
    fn draw(&mut self, mesh: MeshHandle, state: DrawState);
}

/// Everything the terrain needs from a backend.
pub trait GpuBackend: ComputeDevice + RenderDevice {}

impl<T: ComputeDevice + RenderDevice + ?Sized> GpuBackend for T {}

/// Upload a plain-old-data value to the storage slot `slot`.
pub fn upload_pod<T: Pod, D: ComputeDevice + ?Sized>(device: &mut D, slot: u32, value: &T) {
    device.upload_storage(slot, bytemuck::bytes_of(value));
}

/// Number of workgroups needed to cover `extent` invocations.
pub fn workgroup_count(extent: u32, workgroup_size: u32) -> u32 {
    extent.div_ceil(workgroup_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(21, 8), 3);
        assert_eq!(workgroup_count(16, 8), 2);
        assert_eq!(workgroup_count(1, 8), 1);
        assert_eq!(workgroup_count(0, 8), 0);
    }

    #[test]
    fn test_workgroup_count_zero_size_is_clamped() {
        assert_eq!(workgroup_count(5, 0), 5);
    }

    #[test]
    fn test_default_draw_state_is_filled_ccw_culled() {
        let state = DrawState::default();
        assert!(state.cull_back_faces);
        assert_eq!(state.polygon_mode, PolygonMode::Fill);
        assert_eq!(state.front_face, FrontFace::Ccw);
    }

    #[test]
    fn test_bytes_per_texel() {
        assert_eq!(PixelFormat::R32Float.bytes_per_texel(), 4);
        assert_eq!(PixelFormat::Rgba16Float.bytes_per_texel(), 8);
    }
}
