//! Three-stage map generation: heights, seam fix, normals.
//!
//! Every stage reads what the previous one wrote, so a full memory barrier
//! follows each dispatch, including the last one before the maps are sampled.

use std::path::Path;

use orbis_render::{
    ComputeDevice, ImageAccess, KernelId, KernelLibrary, PixelFormat, TextureHandle, upload_pod,
    workgroup_count,
};
use tracing::{info, warn};

use crate::descriptor::ChunkDescriptor;

/// Storage slot the chunk descriptor is uploaded to.
pub const CHUNK_DATA_SLOT: u32 = 3;
/// Workgroup edge of every terrain kernel.
pub const WORKGROUP_SIZE: u32 = 8;

pub const HEIGHT_FORMAT: PixelFormat = PixelFormat::R32Float;
pub const NORMAL_FORMAT: PixelFormat = PixelFormat::Rgba16Float;

pub const POSITION_KERNEL: &str = "planet compute position";
pub const FIX_SEAMS_KERNEL: &str = "planet fix seams";
pub const NORMALS_KERNEL: &str = "planet compute normals";

const POSITION_FILE: &str = "planet_compute_position.wgsl";
const FIX_SEAMS_FILE: &str = "planet_fix_seams.wgsl";
const NORMALS_FILE: &str = "planet_compute_normals.wgsl";

const POSITION_SOURCE: &str = include_str!("shaders/planet_compute_position.wgsl");
const FIX_SEAMS_SOURCE: &str = include_str!("shaders/planet_fix_seams.wgsl");
const NORMALS_SOURCE: &str = include_str!("shaders/planet_compute_normals.wgsl");

/// The three terrain kernels.
pub struct PlanetKernels {
    library: KernelLibrary,
    positions: KernelId,
    fix_seams: KernelId,
    normals: KernelId,
}

impl PlanetKernels {
    /// Kernels compiled from the sources embedded in the crate.
    pub fn builtin() -> Self {
        Self::load(KernelLibrary::new())
    }

    /// Kernels read from `dir`, falling back to the embedded source for any
    /// file that cannot be read. Reloads always go to `dir`.
    pub fn from_dir(dir: &Path) -> Self {
        info!(dir = %dir.display(), "Loading terrain kernels");
        Self::load(KernelLibrary::new().with_shader_dir(dir))
    }

    fn load(mut library: KernelLibrary) -> Self {
        let mut load = |name: &str, file: &str, fallback: &str| {
            if library.shader_dir().is_some() {
                match library.load_from_file(name, file) {
                    Ok(id) => return id,
                    Err(err) => warn!("{}, using embedded source", err),
                }
            }
            library.load_from_source(name, file, fallback)
        };

        let positions = load(POSITION_KERNEL, POSITION_FILE, POSITION_SOURCE);
        let fix_seams = load(FIX_SEAMS_KERNEL, FIX_SEAMS_FILE, FIX_SEAMS_SOURCE);
        let normals = load(NORMALS_KERNEL, NORMALS_FILE, NORMALS_SOURCE);

        Self {
            library,
            positions,
            fix_seams,
            normals,
        }
    }

    pub fn library(&self) -> &KernelLibrary {
        &self.library
    }

    /// True when all three kernels compiled.
    pub fn all_ready(&self) -> bool {
        [self.positions, self.fix_seams, self.normals]
            .into_iter()
            .all(|id| self.library.is_ready(id))
    }

    /// Sum of the kernel revisions. Changes whenever any kernel is reloaded.
    pub fn revision(&self) -> u64 {
        [self.positions, self.fix_seams, self.normals]
            .into_iter()
            .filter_map(|id| self.library.revision(id))
            .sum()
    }

    /// Re-read every kernel from the shader directory.
    pub fn reload(&mut self) -> usize {
        self.library.reload_all()
    }

    /// Replace the source of one kernel by name.
    pub fn replace_source(&mut self, name: &str, source: &str) -> bool {
        let Some(file_name) = [
            (POSITION_KERNEL, POSITION_FILE),
            (FIX_SEAMS_KERNEL, FIX_SEAMS_FILE),
            (NORMALS_KERNEL, NORMALS_FILE),
        ]
        .into_iter()
        .find_map(|(kernel, file)| (kernel == name).then_some(file)) else {
            return false;
        };
        self.library.load_from_source(name, file_name, source);
        true
    }

    /// `(name, message)` for every kernel that failed to compile.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.library.failures()
    }
}

impl Default for PlanetKernels {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Height and normal maps owned by one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkMaps {
    pub height: TextureHandle,
    pub normal: TextureHandle,
}

impl ChunkMaps {
    pub fn create<D: ComputeDevice + ?Sized>(gpu: &mut D, lod: u32) -> Self {
        Self {
            height: gpu.create_texture(&format!("heightmap_LOD_{lod}")),
            normal: gpu.create_texture(&format!("normal_LOD_{lod}")),
        }
    }

    /// Allocate both maps at `size`² unless they already have that size.
    /// Returns whether anything was reallocated.
    pub fn ensure_size<D: ComputeDevice + ?Sized>(&self, gpu: &mut D, size: u32) -> bool {
        let mut resized = false;
        for (texture, format) in [(self.height, HEIGHT_FORMAT), (self.normal, NORMAL_FORMAT)] {
            if gpu.texture_size(texture).map(|(width, _)| width) != Some(size) {
                gpu.allocate_texture(texture, size, size, format);
                resized = true;
            }
        }
        resized
    }

    pub fn release<D: ComputeDevice + ?Sized>(self, gpu: &mut D) {
        gpu.release_texture(self.height);
        gpu.release_texture(self.normal);
    }
}

/// Result of one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineRun {
    /// All three stages were dispatched.
    Dispatched,
    /// At least one kernel failed to compile; nothing was dispatched.
    KernelsNotReady,
    /// The height map has no storage yet.
    MapsMissing,
}

/// Upload `descriptor` and regenerate `maps`.
pub fn run<D: ComputeDevice + ?Sized>(
    gpu: &mut D,
    kernels: &PlanetKernels,
    maps: &ChunkMaps,
    descriptor: &ChunkDescriptor,
) -> PipelineRun {
    if !kernels.all_ready() {
        return PipelineRun::KernelsNotReady;
    }
    let Some((width, height)) = gpu.texture_size(maps.height) else {
        return PipelineRun::MapsMissing;
    };
    let groups_x = workgroup_count(width, WORKGROUP_SIZE);
    let groups_y = workgroup_count(height, WORKGROUP_SIZE);
    let library = &kernels.library;

    upload_pod(gpu, CHUNK_DATA_SLOT, descriptor);

    let stages = [
        (kernels.positions, &[(maps.height, ImageAccess::WriteOnly, 0)][..]),
        (kernels.fix_seams, &[(maps.height, ImageAccess::ReadWrite, 0)][..]),
        (
            kernels.normals,
            &[
                (maps.height, ImageAccess::ReadOnly, 0),
                (maps.normal, ImageAccess::WriteOnly, 1),
            ][..],
        ),
    ];

    for (id, images) in stages {
        let Some(kernel) = library.get(id) else {
            return PipelineRun::KernelsNotReady;
        };
        gpu.bind_kernel(kernel);
        for &(texture, access, binding) in images {
            gpu.bind_image(texture, access, binding);
        }
        gpu.dispatch(groups_x, groups_y, 1);
        gpu.memory_barrier();
    }

    PipelineRun::Dispatched
}
