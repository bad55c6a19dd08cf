//! GPU plumbing for the terrain: capability traits, WGSL kernel library, a
//! wgpu compute backend and a recording backend for tests and headless runs.

pub mod compute;
pub mod gpu;
pub mod recording;
pub mod shader;

pub use compute::{ComputeContextError, WgpuCompute, init_compute_blocking, wgpu_format};
pub use gpu::{
    ComputeDevice, DrawState, FrontFace, GpuBackend, ImageAccess, MaterialHandle, MeshHandle,
    PixelFormat, PolygonMode, RenderDevice, TextureHandle, UniformValue, upload_pod,
    workgroup_count,
};
pub use recording::{GpuCommand, RecordingBackend};
pub use shader::{
    Kernel, KernelId, KernelLibrary, KernelStatus, ShaderError, global_bindings, validate_wgsl,
};
