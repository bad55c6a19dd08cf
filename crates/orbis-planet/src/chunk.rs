//! One level of the LOD chain.
//!
//! Level 0 is the central disc with the finest cells; every following level
//! is a ring with twice the cell size of the previous one. Each node owns the
//! next coarser level, so dropping a node drops its whole tail.

use glam::{DAffine3, DMat4, DQuat, DVec2, DVec3};
use orbis_render::{
    ComputeDevice, DrawState, FrontFace, MeshHandle, PolygonMode, RenderDevice, UniformValue,
};
use orbis_scene::RenderContext;
use tracing::{debug, warn};

use crate::descriptor::{ChunkDescriptor, DescriptorCache};
use crate::pipeline::{self, ChunkMaps, PipelineRun, PlanetKernels};
use crate::placement::ChunkPlacement;
use crate::template::map_size;

/// Per-frame planet state read by every node of the chain.
pub struct ChunkFrame<'a> {
    pub camera_position: DVec3,
    pub planet_position: DVec3,
    /// Inverse of the mesh frame rotation in world space.
    pub inv_mesh_rotation_ws: DQuat,
    /// Mesh frame rotation in planet space.
    pub mesh_rotation_ps: DQuat,
    pub radius: f64,
    pub freeze_updates: bool,
    pub kernels: &'a PlanetKernels,
}

/// Shared meshes drawn by the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkMeshes {
    pub root: MeshHandle,
    pub ring: MeshHandle,
}

/// Draw switches for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkDrawFlags {
    pub wireframe: bool,
    pub double_sided: bool,
}

pub struct ChunkNode {
    current_lod: u32,
    num_lods: u32,
    cell_size: f64,
    cell_count: u32,
    placement: Option<ChunkPlacement>,
    maps: Option<ChunkMaps>,
    cache: DescriptorCache,
    kernels_failed: bool,
    child: Option<Box<ChunkNode>>,
}

impl ChunkNode {
    pub fn new(current_lod: u32, num_lods: u32, cell_size: f64) -> Self {
        Self {
            current_lod,
            num_lods,
            cell_size,
            cell_count: 0,
            placement: None,
            maps: None,
            cache: DescriptorCache::new(),
            kernels_failed: false,
            child: None,
        }
    }

    pub fn current_lod(&self) -> u32 {
        self.current_lod
    }

    pub fn num_lods(&self) -> u32 {
        self.num_lods
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_count(&self) -> u32 {
        self.cell_count
    }

    /// Snapped position of this level, once placed.
    pub fn chunk_position(&self) -> Option<DVec2> {
        self.placement.map(|p| p.chunk_position)
    }

    pub fn local_transform(&self) -> DAffine3 {
        self.placement.map_or(DAffine3::IDENTITY, |p| p.transform)
    }

    pub fn maps(&self) -> Option<&ChunkMaps> {
        self.maps.as_ref()
    }

    pub fn last_descriptor(&self) -> Option<&ChunkDescriptor> {
        self.cache.last()
    }

    pub fn child(&self) -> Option<&ChunkNode> {
        self.child.as_deref()
    }

    /// This node followed by every coarser level.
    pub fn chain(&self) -> impl Iterator<Item = &ChunkNode> {
        std::iter::successors(Some(self), |node| node.child())
    }

    pub fn chain_len(&self) -> usize {
        self.chain().count()
    }

    /// Resize the maps for `cell_count` and force one rebuild of the whole
    /// chain on the next tick. No dispatch happens here.
    pub fn regenerate<D: ComputeDevice + ?Sized>(&mut self, gpu: &mut D, cell_count: u32) {
        self.cell_count = cell_count;
        self.ensure_maps(gpu);
        self.cache.invalidate();
        if let Some(child) = &mut self.child {
            child.regenerate(gpu, cell_count);
        }
    }

    /// Force a rebuild of this node and every coarser one on the next tick.
    pub fn force_rebuild_maps(&mut self) {
        self.cache.invalidate();
        if let Some(child) = &mut self.child {
            child.force_rebuild_maps();
        }
    }

    /// Maintain the chain, then place and rebuild this level.
    ///
    /// A new child is only sized this frame and ticked from the next one, so
    /// the chain grows by at most one level per tick. Shrinking likewise only
    /// removes the last level of the chain.
    pub fn tick<D: ComputeDevice + ?Sized>(
        &mut self,
        frame: &ChunkFrame<'_>,
        gpu: &mut D,
        num_lods: u32,
        width: f64,
    ) {
        self.cell_size = width;
        self.num_lods = num_lods;

        let mut grown = false;
        if self.child.is_none() && self.current_lod + 1 < num_lods {
            let mut child = ChunkNode::new(self.current_lod + 1, num_lods, self.cell_size * 2.0);
            child.regenerate(gpu, self.cell_count);
            debug!(lod = child.current_lod, "Added LOD level");
            self.child = Some(Box::new(child));
            grown = true;
        }

        if self.current_lod + 1 >= num_lods
            && let Some(child) = &self.child
            && child.child.is_none()
        {
            debug!(lod = child.current_lod, "Removed LOD level");
            if let Some(child) = self.child.take() {
                child.release(gpu);
            }
        }

        if !grown && let Some(child) = &mut self.child {
            child.tick(frame, gpu, num_lods, self.cell_size * 2.0);
        }

        let camera_local =
            frame.inv_mesh_rotation_ws * (frame.camera_position - frame.planet_position);
        self.placement = Some(ChunkPlacement::compute(
            camera_local,
            frame.radius,
            self.cell_size,
            self.current_lod,
        ));

        self.rebuild_maps(frame, gpu);
    }

    /// Descriptor for the current placement.
    pub fn descriptor(&self, frame: &ChunkFrame<'_>) -> ChunkDescriptor {
        ChunkDescriptor::new(
            &self.local_transform(),
            frame.mesh_rotation_ps,
            frame.radius,
            self.cell_size,
            self.cell_count,
            self.current_lod,
        )
    }

    /// Run the GPU pipeline if the descriptor changed since the last
    /// successful run. Returns whether anything was dispatched.
    pub fn rebuild_maps<D: ComputeDevice + ?Sized>(
        &mut self,
        frame: &ChunkFrame<'_>,
        gpu: &mut D,
    ) -> bool {
        if frame.freeze_updates && !self.cache.is_forced() {
            return false;
        }

        let descriptor = self.descriptor(frame);
        if !self.cache.needs_update(&descriptor) {
            return false;
        }

        let maps = self.ensure_maps(gpu);
        match pipeline::run(gpu, frame.kernels, &maps, &descriptor) {
            PipelineRun::Dispatched => {
                self.cache.record(descriptor);
                self.kernels_failed = false;
                true
            }
            PipelineRun::KernelsNotReady => {
                if !self.kernels_failed {
                    warn!(lod = self.current_lod, "Terrain kernels not ready, keeping old maps");
                    self.kernels_failed = true;
                }
                false
            }
            PipelineRun::MapsMissing => {
                debug!(lod = self.current_lod, "Maps not allocated, skipping rebuild");
                false
            }
        }
    }

    fn ensure_maps<D: ComputeDevice + ?Sized>(&mut self, gpu: &mut D) -> ChunkMaps {
        let maps = match self.maps {
            Some(maps) => maps,
            None => {
                let maps = ChunkMaps::create(gpu, self.current_lod);
                self.maps = Some(maps);
                maps
            }
        };
        let size = map_size(self.cell_count);
        if maps.ensure_size(gpu, size) {
            debug!(lod = self.current_lod, size, "Allocated chunk maps");
        }
        maps
    }

    /// Draw every coarser level first, then this one.
    pub fn render(&self, ctx: &mut RenderContext<'_>, meshes: &ChunkMeshes, flags: ChunkDrawFlags) {
        if let Some(child) = &self.child {
            child.render(ctx, meshes, flags);
        }

        let Some(maps) = &self.maps else {
            return;
        };
        // Not placed or never generated yet.
        if self.placement.is_none() || self.cache.last().is_none() {
            return;
        }
        let mesh = if self.current_lod == 0 {
            meshes.root
        } else {
            meshes.ring
        };

        let gpu = &mut *ctx.gpu;
        let local = DMat4::from(self.local_transform()).as_mat4();
        gpu.set_uniform(
            "local_transform",
            UniformValue::Mat4(local.to_cols_array_2d()),
        );
        gpu.set_uniform("cell_width", UniformValue::Float(self.cell_size as f32));
        gpu.set_uniform("current_lod", UniformValue::Int(self.current_lod as i32));
        gpu.set_texture("height_map", maps.height);
        gpu.set_texture("normal_map", maps.normal);

        let polygon_mode = if flags.wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        };
        gpu.draw(
            mesh,
            DrawState {
                cull_back_faces: true,
                polygon_mode,
                front_face: FrontFace::Ccw,
            },
        );
        if flags.double_sided {
            gpu.draw(
                mesh,
                DrawState {
                    cull_back_faces: true,
                    polygon_mode: PolygonMode::Line,
                    front_face: FrontFace::Cw,
                },
            );
        }
    }

    /// Free the GPU maps of this node and every coarser one.
    pub fn release<D: ComputeDevice + ?Sized>(mut self, gpu: &mut D) {
        if let Some(child) = self.child.take() {
            child.release(gpu);
        }
        if let Some(maps) = self.maps.take() {
            maps.release(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_render::{GpuCommand, RecordingBackend};
    use orbis_scene::{Camera, RenderSettings};

    const RADIUS: f64 = 1000.0;

    fn frame(kernels: &PlanetKernels, camera: DVec3) -> ChunkFrame<'_> {
        ChunkFrame {
            camera_position: camera,
            planet_position: DVec3::ZERO,
            inv_mesh_rotation_ws: DQuat::IDENTITY,
            mesh_rotation_ps: DQuat::IDENTITY,
            radius: RADIUS,
            freeze_updates: false,
            kernels,
        }
    }

    fn above_origin() -> DVec3 {
        DVec3::new(RADIUS + 2.0, 0.0, 0.0)
    }

    fn root(gpu: &mut RecordingBackend) -> ChunkNode {
        let mut node = ChunkNode::new(0, 1, 1.0);
        node.regenerate(gpu, 4);
        node
    }

    #[test]
    fn test_chain_grows_one_level_per_tick() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        assert_eq!(node.chain_len(), 1);

        for expected in 2..=5 {
            node.tick(&frame, &mut gpu, 5, 1.0);
            assert_eq!(node.chain_len(), expected);
        }
        node.tick(&frame, &mut gpu, 5, 1.0);
        assert_eq!(node.chain_len(), 5);
    }

    #[test]
    fn test_chain_shrinks_one_level_per_tick() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        for _ in 0..6 {
            node.tick(&frame, &mut gpu, 5, 1.0);
        }
        assert_eq!(node.chain_len(), 5);
        assert_eq!(gpu.live_texture_count(), 10);

        for expected in [4, 3, 2] {
            node.tick(&frame, &mut gpu, 2, 1.0);
            assert_eq!(node.chain_len(), expected);
        }
        node.tick(&frame, &mut gpu, 2, 1.0);
        assert_eq!(node.chain_len(), 2);
        // Dropped levels released their maps.
        assert_eq!(gpu.live_texture_count(), 4);
    }

    #[test]
    fn test_cell_size_doubles_per_level() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        for _ in 0..5 {
            node.tick(&frame, &mut gpu, 4, 1.0);
        }
        let sizes: Vec<f64> = node.chain().map(ChunkNode::cell_size).collect();
        assert_eq!(sizes, vec![1.0, 2.0, 4.0, 8.0]);
        let lods: Vec<u32> = node.chain().map(ChunkNode::current_lod).collect();
        assert_eq!(lods, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_rebuild_is_skipped_for_unchanged_descriptor() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);

        node.tick(&frame, &mut gpu, 1, 1.0);
        assert_eq!(gpu.dispatch_count(), 3);
        assert!(!node.rebuild_maps(&frame, &mut gpu));
        assert_eq!(gpu.dispatch_count(), 3);

        // A different cell width changes the descriptor.
        node.tick(&frame, &mut gpu, 1, 2.0);
        assert_eq!(gpu.dispatch_count(), 6);
    }

    #[test]
    fn test_camera_motion_within_cell_is_free() {
        let kernels = PlanetKernels::builtin();
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);

        node.tick(&frame(&kernels, above_origin()), &mut gpu, 1, 1.0);
        let moved = DVec3::new(RADIUS + 2.0, 0.3, 0.2);
        node.tick(&frame(&kernels, moved), &mut gpu, 1, 1.0);
        assert_eq!(gpu.dispatch_count(), 3);

        let far = DVec3::new(RADIUS + 2.0, 5.0, 0.0);
        node.tick(&frame(&kernels, far), &mut gpu, 1, 1.0);
        assert_eq!(gpu.dispatch_count(), 6);
    }

    #[test]
    fn test_force_rebuild_reaches_every_level() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        for _ in 0..4 {
            node.tick(&frame, &mut gpu, 3, 1.0);
        }
        gpu.clear();

        node.force_rebuild_maps();
        node.tick(&frame, &mut gpu, 3, 1.0);
        assert_eq!(gpu.dispatch_count(), 9);
    }

    #[test]
    fn test_freeze_updates_only_lets_forced_rebuilds_through() {
        let kernels = PlanetKernels::builtin();
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        let mut frozen = frame(&kernels, above_origin());
        frozen.freeze_updates = true;

        // First rebuild is forced.
        node.tick(&frozen, &mut gpu, 1, 1.0);
        assert_eq!(gpu.dispatch_count(), 3);

        node.tick(&frozen, &mut gpu, 1, 2.0);
        assert_eq!(gpu.dispatch_count(), 3);

        node.force_rebuild_maps();
        node.tick(&frozen, &mut gpu, 1, 2.0);
        assert_eq!(gpu.dispatch_count(), 6);
    }

    #[test]
    fn test_failed_kernels_retry_until_fixed() {
        let mut kernels = PlanetKernels::builtin();
        kernels.replace_source(pipeline::NORMALS_KERNEL, "fn broken(");
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);

        node.tick(&frame(&kernels, above_origin()), &mut gpu, 1, 1.0);
        node.tick(&frame(&kernels, above_origin()), &mut gpu, 1, 1.0);
        assert_eq!(gpu.dispatch_count(), 0);
        assert!(node.last_descriptor().is_none());

        kernels = PlanetKernels::builtin();
        node.tick(&frame(&kernels, above_origin()), &mut gpu, 1, 1.0);
        assert_eq!(gpu.dispatch_count(), 3);
        assert!(node.last_descriptor().is_some());
    }

    #[test]
    fn test_regenerate_reallocates_on_resolution_change_only() {
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        assert_eq!(gpu.allocation_count(), 2);

        node.regenerate(&mut gpu, 4);
        assert_eq!(gpu.allocation_count(), 2);

        node.regenerate(&mut gpu, 10);
        assert_eq!(gpu.allocation_count(), 4);
        let maps = node.maps().unwrap();
        assert_eq!(gpu.texture_size(maps.height), Some((45, 45)));
    }

    #[test]
    fn test_rebuild_repairs_stale_map_size() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        let maps = *node.maps().unwrap();
        gpu.allocate_texture(maps.height, 7, 7, pipeline::HEIGHT_FORMAT);

        node.tick(&frame, &mut gpu, 1, 1.0);
        assert_eq!(gpu.texture_size(maps.height), Some((21, 21)));
        assert_eq!(gpu.dispatch_count(), 3);
    }

    #[test]
    fn test_render_draws_finest_first_with_ring_template() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        for _ in 0..3 {
            node.tick(&frame, &mut gpu, 3, 1.0);
        }
        let meshes = ChunkMeshes {
            root: MeshHandle(100),
            ring: MeshHandle(101),
        };
        gpu.clear();

        let camera = Camera::default();
        let mut ctx = RenderContext {
            camera: &camera,
            settings: RenderSettings::default(),
            gpu: &mut gpu,
        };
        node.render(&mut ctx, &meshes, ChunkDrawFlags::default());

        let draws: Vec<MeshHandle> = gpu.draws().into_iter().map(|(mesh, _)| mesh).collect();
        assert_eq!(draws, vec![meshes.ring, meshes.ring, meshes.root]);
        let lods: Vec<_> = gpu
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::SetUniform {
                    name,
                    value: UniformValue::Int(lod),
                } if name == "current_lod" => Some(*lod),
                _ => None,
            })
            .collect();
        assert_eq!(lods, vec![2, 1, 0]);
    }

    #[test]
    fn test_new_level_is_not_drawn_before_first_placement() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        node.tick(&frame, &mut gpu, 2, 1.0);
        assert_eq!(node.chain_len(), 2);
        assert!(node.child().unwrap().chunk_position().is_none());

        let meshes = ChunkMeshes {
            root: MeshHandle(100),
            ring: MeshHandle(101),
        };
        let camera = Camera::default();
        gpu.clear();
        let mut ctx = RenderContext {
            camera: &camera,
            settings: RenderSettings::default(),
            gpu: &mut gpu,
        };
        node.render(&mut ctx, &meshes, ChunkDrawFlags::default());
        let draws: Vec<MeshHandle> = gpu.draws().into_iter().map(|(mesh, _)| mesh).collect();
        assert_eq!(draws, vec![meshes.root]);

        // Placed and generated on the next tick.
        node.tick(&frame, &mut gpu, 2, 1.0);
        gpu.clear();
        let mut ctx = RenderContext {
            camera: &camera,
            settings: RenderSettings::default(),
            gpu: &mut gpu,
        };
        node.render(&mut ctx, &meshes, ChunkDrawFlags::default());
        let draws: Vec<MeshHandle> = gpu.draws().into_iter().map(|(mesh, _)| mesh).collect();
        assert_eq!(draws, vec![meshes.ring, meshes.root]);
    }

    #[test]
    fn test_double_sided_and_wireframe_draw_state() {
        let kernels = PlanetKernels::builtin();
        let frame = frame(&kernels, above_origin());
        let mut gpu = RecordingBackend::new();
        let mut node = root(&mut gpu);
        node.tick(&frame, &mut gpu, 1, 1.0);
        let meshes = ChunkMeshes {
            root: MeshHandle(100),
            ring: MeshHandle(101),
        };
        gpu.clear();

        let camera = Camera::default();
        let mut ctx = RenderContext {
            camera: &camera,
            settings: RenderSettings::default(),
            gpu: &mut gpu,
        };
        let flags = ChunkDrawFlags {
            wireframe: true,
            double_sided: true,
        };
        node.render(&mut ctx, &meshes, flags);

        let states: Vec<DrawState> = gpu.draws().into_iter().map(|(_, state)| state).collect();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].polygon_mode, PolygonMode::Line);
        assert_eq!(states[0].front_face, FrontFace::Ccw);
        assert_eq!(states[1].polygon_mode, PolygonMode::Line);
        assert_eq!(states[1].front_face, FrontFace::Cw);
    }
}
