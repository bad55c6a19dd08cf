//! Chunk descriptor and the cache that gates GPU regeneration.

use bytemuck::{Pod, Zeroable};
use glam::{DAffine3, DMat4, DQuat, Mat4};

/// Everything that affects a chunk's generated maps. Uploaded verbatim to the
/// kernels' storage slot, so the layout matches the WGSL `ChunkData` struct.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ChunkDescriptor {
    /// Grid to chunk-local transform (snapped position, cell size, quadrant).
    pub local_transform: [[f32; 4]; 4],
    /// Chunk-local to planet space.
    pub planet_transform: [[f32; 4]; 4],
    /// Rotation of the mesh frame in planet space.
    pub local_orientation: [[f32; 4]; 4],
    pub radius: f32,
    pub cell_width: f32,
    pub cell_count: i32,
    pub current_lod: i32,
}

static_assertions::assert_eq_size!(ChunkDescriptor, [u8; 208]);

impl ChunkDescriptor {
    pub fn new(
        local_transform: &DAffine3,
        mesh_rotation_ps: DQuat,
        radius: f64,
        cell_width: f64,
        cell_count: u32,
        current_lod: u32,
    ) -> Self {
        let orientation = DMat4::from_quat(mesh_rotation_ps);
        let planet_transform =
            orientation * DMat4::from_translation(glam::DVec3::new(radius, 0.0, 0.0));
        Self {
            local_transform: to_f32(&DMat4::from(*local_transform)),
            planet_transform: to_f32(&planet_transform),
            local_orientation: to_f32(&orientation),
            radius: radius as f32,
            cell_width: cell_width as f32,
            cell_count: cell_count as i32,
            current_lod: current_lod as i32,
        }
    }
}

fn to_f32(matrix: &DMat4) -> [[f32; 4]; 4] {
    let matrix: Mat4 = matrix.as_mat4();
    matrix.to_cols_array_2d()
}

/// Last descriptor that was successfully processed, plus a force flag.
#[derive(Clone, Debug)]
pub struct DescriptorCache {
    last: Option<ChunkDescriptor>,
    forced: bool,
}

impl DescriptorCache {
    /// A new cache is forced: the first check always asks for an update.
    pub fn new() -> Self {
        Self {
            last: None,
            forced: true,
        }
    }

    pub fn needs_update(&self, descriptor: &ChunkDescriptor) -> bool {
        self.forced || self.last.as_ref() != Some(descriptor)
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Remember `descriptor` as processed and clear the force flag.
    pub fn record(&mut self, descriptor: ChunkDescriptor) {
        self.last = Some(descriptor);
        self.forced = false;
    }

    /// Force the next check to ask for an update.
    pub fn invalidate(&mut self) {
        self.forced = true;
    }

    pub fn last(&self) -> Option<&ChunkDescriptor> {
        self.last.as_ref()
    }
}

impl Default for DescriptorCache {
    fn default() -> Self {
        Self::new()
    }
}
