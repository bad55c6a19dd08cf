//! Planet root: owns the configuration, the shared templates and the chain.

use std::path::{Path, PathBuf};

use glam::{DAffine3, DMat4, DQuat, DVec3};
use orbis_config::{MAX_CELL_COUNT, MAX_LODS, PlanetSettings};
use orbis_render::{GpuBackend, MaterialHandle, RenderDevice, UniformValue};
use orbis_scene::{DebugPanel, NodeTransform, RenderContext, SceneNode, TickContext};
use tracing::{debug, info, warn};

use crate::chunk::{ChunkDrawFlags, ChunkFrame, ChunkMeshes, ChunkNode};
use crate::pipeline::PlanetKernels;
use crate::rotation::closest_rotation_to;
use crate::template::MeshTemplate;
use crate::textures::TerrainTextures;

pub const MATERIAL_SOURCE: &str = include_str!("shaders/planet_material.wgsl");
pub const DEFAULT_TEXTURE_DIR: &str = "resources/textures";

/// Range of levels displayed for the current altitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodWindow {
    /// Finest configured level that is still drawn.
    pub first_lod: u32,
    /// Number of levels in the chain.
    pub lod_count: u32,
    /// Cell width of the first displayed level.
    pub base_width: f64,
}

impl LodWindow {
    /// Skip the finest levels whose cells are too small to matter from
    /// `altitude`: each doubling of the altitude past one chunk width drops
    /// one level.
    pub fn from_altitude(altitude: f64, cell_width: f64, cell_count: u32, num_lods: u32) -> Self {
        let chunk_width = cell_width * f64::from(cell_count * 4 + 2);
        let normalized = (altitude / chunk_width).max(1.0);
        let first_lod = (normalized.log2().floor() as u32).min(num_lods.saturating_sub(1));
        Self {
            first_lod,
            lod_count: num_lods - first_lod,
            base_width: cell_width * 2f64.powi(first_lod as i32),
        }
    }
}

/// A planet made of one chunk chain that follows the camera.
pub struct Planet {
    name: String,
    transform: NodeTransform,

    radius: f32,
    num_lods: u32,
    cell_width: f32,
    cell_count: u32,
    dirty: bool,

    double_sided: bool,
    freeze_camera: bool,
    freeze_updates: bool,

    orbit_distance: f64,
    orbit_speed: f32,
    rotation_speed: f32,
    current_orbit: f64,
    current_rotation: f64,

    kernels: PlanetKernels,
    kernel_revision: u64,

    root: ChunkNode,
    meshes: Option<ChunkMeshes>,
    material: Option<MaterialHandle>,
    material_failed: bool,
    textures: Option<TerrainTextures>,
    texture_dir: PathBuf,

    mesh_rotation_ps: DQuat,
    mesh_rotation_ws: DQuat,
    mesh_transform_ws: DAffine3,
    window: Option<LodWindow>,
}

impl Planet {
    pub fn new(name: &str, settings: &PlanetSettings) -> Self {
        let kernels = match &settings.shader_dir {
            Some(dir) => PlanetKernels::from_dir(dir),
            None => PlanetKernels::builtin(),
        };
        Self::with_kernels(name, settings, kernels)
    }

    pub fn with_kernels(name: &str, settings: &PlanetSettings, kernels: PlanetKernels) -> Self {
        let defaults = PlanetSettings::default();
        let mut planet = Self {
            name: name.to_string(),
            transform: NodeTransform::default(),
            radius: defaults.radius,
            num_lods: defaults.num_lods,
            cell_width: defaults.cell_width,
            cell_count: defaults.cell_count,
            dirty: true,
            double_sided: false,
            freeze_camera: false,
            freeze_updates: false,
            orbit_distance: 0.0,
            orbit_speed: 0.0,
            rotation_speed: 0.0,
            current_orbit: 0.0,
            current_rotation: 0.0,
            kernel_revision: kernels.revision(),
            kernels,
            root: ChunkNode::new(0, defaults.num_lods, f64::from(defaults.cell_width)),
            meshes: None,
            material: None,
            material_failed: false,
            textures: None,
            texture_dir: PathBuf::from(DEFAULT_TEXTURE_DIR),
            mesh_rotation_ps: DQuat::IDENTITY,
            mesh_rotation_ws: DQuat::IDENTITY,
            mesh_transform_ws: DAffine3::IDENTITY,
            window: None,
        };
        planet.set_radius(settings.radius);
        planet.set_max_lods(settings.num_lods);
        planet.set_cell_width(settings.cell_width);
        planet.set_cell_count(settings.cell_count);
        planet.set_orbit_distance(settings.orbit_distance);
        planet.set_orbit_speed(settings.orbit_speed);
        planet.set_rotation_speed(settings.rotation_speed);
        planet
    }

    /// Directory the terrain textures are streamed from.
    pub fn with_texture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = dir.into();
        self
    }

    pub fn texture_dir(&self) -> &Path {
        &self.texture_dir
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn num_lods(&self) -> u32 {
        self.num_lods
    }

    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    pub fn cell_count(&self) -> u32 {
        self.cell_count
    }

    /// Whether templates and maps will be rebuilt on the next tick.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_radius(&mut self, radius: f32) {
        if !(radius > 0.0) || !radius.is_finite() {
            warn!(radius, "Ignoring invalid planet radius");
            return;
        }
        self.radius = radius;
        self.dirty = true;
    }

    pub fn set_max_lods(&mut self, num_lods: u32) {
        self.num_lods = num_lods.clamp(1, MAX_LODS);
        self.dirty = true;
    }

    pub fn set_cell_count(&mut self, cell_count: u32) {
        self.cell_count = cell_count.clamp(1, MAX_CELL_COUNT);
        self.dirty = true;
    }

    pub fn set_cell_width(&mut self, cell_width: f32) {
        if !(cell_width > 0.0) || !cell_width.is_finite() {
            warn!(cell_width, "Ignoring invalid cell width");
            return;
        }
        self.cell_width = cell_width;
        self.dirty = true;
    }

    pub fn set_double_sided(&mut self, double_sided: bool) {
        self.double_sided = double_sided;
    }

    pub fn set_freeze_camera(&mut self, freeze: bool) {
        self.freeze_camera = freeze;
    }

    pub fn set_freeze_updates(&mut self, freeze: bool) {
        self.freeze_updates = freeze;
    }

    pub fn orbit_distance(&self) -> f64 {
        self.orbit_distance
    }

    pub fn orbit_speed(&self) -> f32 {
        self.orbit_speed
    }

    pub fn rotation_speed(&self) -> f32 {
        self.rotation_speed
    }

    /// Radius of the circular orbit in the parent's XY plane. Zero leaves the
    /// local position alone.
    pub fn set_orbit_distance(&mut self, distance: f64) {
        if !(distance >= 0.0) || !distance.is_finite() {
            warn!(distance, "Ignoring invalid orbit distance");
            return;
        }
        self.orbit_distance = distance;
    }

    pub fn set_orbit_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            warn!(speed, "Ignoring invalid orbit speed");
            return;
        }
        self.orbit_speed = speed;
    }

    /// Spin about the local Z axis, in radians per second. Zero leaves the
    /// local rotation alone.
    pub fn set_rotation_speed(&mut self, speed: f32) {
        if !speed.is_finite() {
            warn!(speed, "Ignoring invalid rotation speed");
            return;
        }
        self.rotation_speed = speed;
    }

    pub fn root(&self) -> &ChunkNode {
        &self.root
    }

    pub fn meshes(&self) -> Option<&ChunkMeshes> {
        self.meshes.as_ref()
    }

    pub fn kernels(&self) -> &PlanetKernels {
        &self.kernels
    }

    /// Mutable access for hot reload. Any revision change is picked up on
    /// the next tick and rebuilds every map.
    pub fn kernels_mut(&mut self) -> &mut PlanetKernels {
        &mut self.kernels
    }

    /// Re-read the kernels from their shader directory.
    pub fn reload_kernels(&mut self) -> usize {
        self.kernels.reload()
    }

    pub fn mesh_rotation_ps(&self) -> DQuat {
        self.mesh_rotation_ps
    }

    /// Mesh frame relative to the camera, used for drawing.
    pub fn mesh_transform_ws(&self) -> DAffine3 {
        self.mesh_transform_ws
    }

    /// Window used by the last tick.
    pub fn lod_window(&self) -> Option<LodWindow> {
        self.window
    }

    /// Rebuild both templates and resize every chunk's maps.
    pub fn regenerate<D: GpuBackend + ?Sized>(&mut self, gpu: &mut D) {
        let root = MeshTemplate::root(self.cell_count);
        let ring = MeshTemplate::ring(self.cell_count);

        if let Some(old) = self.meshes.take() {
            gpu.release_mesh(old.root);
            gpu.release_mesh(old.ring);
        }
        self.meshes = Some(ChunkMeshes {
            root: gpu.upload_mesh("planet root mesh", &root.positions, &root.indices),
            ring: gpu.upload_mesh("planet ring mesh", &ring.positions, &ring.indices),
        });
        info!(
            planet = %self.name,
            cell_count = self.cell_count,
            root_vertices = root.vertex_count(),
            ring_vertices = ring.vertex_count(),
            "Rebuilt planet templates"
        );

        self.root.regenerate(gpu, self.cell_count);
        self.dirty = false;
    }

    /// Advance the orbit and the spin, then move the node accordingly.
    fn advance_motion(&mut self, delta_time: f64) {
        self.current_orbit += f64::from(self.orbit_speed) * delta_time;
        self.current_rotation += f64::from(self.rotation_speed) * delta_time;

        if self.orbit_distance > 0.0 {
            let (sin, cos) = self.current_orbit.sin_cos();
            self.transform
                .set_local_position(DVec3::new(cos, sin, 0.0) * self.orbit_distance);
        }
        if self.rotation_speed != 0.0 {
            self.transform
                .set_local_rotation(DQuat::from_rotation_z(self.current_rotation));
        }
    }

    fn update_mesh_frame(&mut self, camera_position: DVec3) {
        let planet_position = self.transform.world_position();
        let world_rotation = self.transform.world_rotation();
        let radius = f64::from(self.radius);

        if !self.freeze_camera {
            let direction_ps =
                world_rotation.inverse() * (camera_position - planet_position).normalize_or_zero();
            let max_step =
                f64::from(self.cell_width) * 2f64.powi(self.num_lods as i32) / (radius * 2.0);
            self.mesh_rotation_ps =
                closest_rotation_to(self.mesh_rotation_ps, direction_ps, max_step);
            self.mesh_rotation_ws = world_rotation * self.mesh_rotation_ps;
        }

        self.mesh_transform_ws = DAffine3::from_translation(planet_position - camera_position)
            * DAffine3::from_quat(self.mesh_rotation_ws)
            * DAffine3::from_translation(DVec3::new(radius, 0.0, 0.0));
    }

    fn bind_material(&mut self, gpu: &mut dyn GpuBackend) -> Option<MaterialHandle> {
        let material = match self.material {
            Some(material) => material,
            None => {
                let material = gpu.create_material("planet material", MATERIAL_SOURCE);
                self.material = Some(material);
                material
            }
        };
        if gpu.bind_material(material) {
            self.material_failed = false;
            Some(material)
        } else {
            if !self.material_failed {
                warn!(planet = %self.name, "Planet material unavailable, skipping draw");
                self.material_failed = true;
            }
            None
        }
    }
}

fn mat4_uniform(matrix: DMat4) -> UniformValue {
    UniformValue::Mat4(matrix.as_mat4().to_cols_array_2d())
}

impl SceneNode for Planet {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self) -> &NodeTransform {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut NodeTransform {
        &mut self.transform
    }

    fn tick(&mut self, ctx: &mut TickContext<'_>) {
        if self.dirty {
            self.regenerate(&mut *ctx.gpu);
        }

        let revision = self.kernels.revision();
        if revision != self.kernel_revision {
            info!(revision, "Terrain kernels changed, rebuilding every map");
            self.root.force_rebuild_maps();
            self.kernel_revision = revision;
        }

        // Move first so the mesh frame and the chain see this frame's pose.
        self.advance_motion(ctx.delta_time);

        let camera_position = ctx.camera.world_position;
        self.update_mesh_frame(camera_position);

        let planet_position = self.transform.world_position();
        let radius = f64::from(self.radius);
        let altitude = (camera_position - planet_position).length() - radius;
        let window = LodWindow::from_altitude(
            altitude,
            f64::from(self.cell_width),
            self.cell_count,
            self.num_lods,
        );
        if self.window.is_some_and(|w| w.first_lod != window.first_lod) {
            debug!(first_lod = window.first_lod, "LOD window moved");
        }
        self.window = Some(window);

        let frame = ChunkFrame {
            camera_position,
            planet_position,
            inv_mesh_rotation_ws: self.mesh_rotation_ws.inverse(),
            mesh_rotation_ps: self.mesh_rotation_ps,
            radius,
            freeze_updates: self.freeze_updates,
            kernels: &self.kernels,
        };
        self.root
            .tick(&frame, &mut *ctx.gpu, window.lod_count, window.base_width);
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let Some(meshes) = self.meshes else {
            return;
        };
        let Some(material) = self.bind_material(&mut *ctx.gpu) else {
            return;
        };

        let gpu = &mut *ctx.gpu;
        if self.textures.is_none() {
            self.textures = Some(TerrainTextures::request(&mut *gpu, &self.texture_dir));
        }

        gpu.set_uniform(
            "mesh_transform_ws",
            mat4_uniform(DMat4::from(self.mesh_transform_ws)),
        );
        gpu.set_uniform(
            "view_projection",
            UniformValue::Mat4(ctx.camera.view_projection_matrix().to_cols_array_2d()),
        );
        gpu.set_uniform(
            "mesh_rotation_ps",
            mat4_uniform(DMat4::from_quat(self.mesh_rotation_ps)),
        );
        gpu.set_uniform(
            "scene_rotation",
            mat4_uniform(DMat4::from_quat(self.transform.world_rotation())),
        );
        gpu.set_uniform("radius", UniformValue::Float(self.radius));
        gpu.set_uniform("cell_count", UniformValue::Int(self.cell_count as i32));
        if let Some(textures) = &self.textures {
            for &(name, texture) in textures.bindings() {
                if gpu.binding_index(material, name).is_some() {
                    gpu.set_texture(name, texture);
                }
            }
        }

        let flags = ChunkDrawFlags {
            wireframe: ctx.settings.wireframe,
            double_sided: self.double_sided,
        };
        self.root.render(ctx, &meshes, flags);
    }

    fn draw_ui(&mut self, ui: &mut dyn DebugPanel) {
        ui.text("Mesh");
        let mut num_lods = self.num_lods as i32;
        if ui.slider_int("num LODs", &mut num_lods, 1, MAX_LODS as i32) {
            self.set_max_lods(num_lods.max(1) as u32);
        }
        let mut radius = self.radius;
        if ui.drag_float("radius", &mut radius, 10.0) {
            self.set_radius(radius);
        }
        let mut cell_count = self.cell_count as i32;
        if ui.slider_int("cell number", &mut cell_count, 1, MAX_CELL_COUNT as i32) {
            self.set_cell_count(cell_count.max(1) as u32);
        }
        let mut cell_width = self.cell_width;
        if ui.slider_float("cell width", &mut cell_width, 0.05, 10.0) {
            self.set_cell_width(cell_width);
        }

        ui.separator();
        ui.text("Transformations");
        ui.drag_float("rotation speed", &mut self.rotation_speed, 0.01);
        ui.drag_float("orbit speed", &mut self.orbit_speed, 0.01);
        let mut orbit_distance = self.orbit_distance as f32;
        if ui.drag_float("orbit distance", &mut orbit_distance, 100.0) {
            self.set_orbit_distance(f64::from(orbit_distance));
        }

        ui.separator();
        ui.text("Debug");
        ui.checkbox("Double sided", &mut self.double_sided);
        ui.checkbox("Freeze Camera", &mut self.freeze_camera);
        ui.checkbox("Freeze Updates", &mut self.freeze_updates);
        for (name, message) in self.kernels.failures() {
            ui.text(&format!("{name}: {message}"));
        }
    }
}
