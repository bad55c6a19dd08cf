//! One planet, one orbiting camera, run frame by frame.

use glam::DVec3;
use orbis_config::Config;
use orbis_planet::Planet;
use orbis_scene::{Camera, RenderSettings, Scene};
use tracing::{debug, info};

use crate::backend::{FrameStats, HeadlessBackend};
use crate::game_loop::{FIXED_DT, GameLoop};

/// Ground speed of the camera in metres per second.
pub const DEFAULT_ORBIT_SPEED: f64 = 20.0;

/// Circular orbit around the planet centre in the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orbit {
    pub distance: f64,
    pub speed: f64,
}

impl Orbit {
    pub fn position(&self, time: f64) -> DVec3 {
        let angle = if self.distance > 0.0 {
            self.speed * time / self.distance
        } else {
            0.0
        };
        DVec3::new(angle.cos(), 0.0, angle.sin()) * self.distance
    }
}

/// Totals over a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u32,
    pub dispatches: u64,
    pub draws: u64,
}

pub struct Session {
    scene: Scene,
    camera: Camera,
    settings: RenderSettings,
    backend: HeadlessBackend,
    orbit: Orbit,
    game_loop: GameLoop,
}

impl Session {
    pub fn new(config: &Config, backend: HeadlessBackend) -> Self {
        let mut planet = Planet::new("planet", &config.planet);
        planet.set_double_sided(config.render.double_sided);
        planet.set_freeze_camera(config.debug.freeze_camera);
        planet.set_freeze_updates(config.debug.freeze_updates);

        let mut scene = Scene::new();
        scene.add(Box::new(planet));

        let orbit = Orbit {
            distance: f64::from(config.planet.radius) + config.camera.altitude,
            speed: DEFAULT_ORBIT_SPEED,
        };
        let mut camera = Camera::at(orbit.position(0.0));
        camera.near = config.camera.near;

        Self {
            scene,
            camera,
            settings: RenderSettings {
                wireframe: config.render.wireframe,
            },
            backend,
            orbit,
            game_loop: GameLoop::new(),
        }
    }

    pub fn with_orbit_speed(mut self, speed: f64) -> Self {
        self.orbit.speed = speed;
        self
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn backend(&self) -> &HeadlessBackend {
        &self.backend
    }

    /// Advance one fixed step, render once and collect the GPU work.
    pub fn frame(&mut self) -> FrameStats {
        let Self {
            scene,
            camera,
            settings,
            backend,
            orbit,
            game_loop,
        } = self;

        game_loop.advance(FIXED_DT, |dt, sim_time| {
            camera.world_position = orbit.position(sim_time + dt);
            scene.tick(dt, camera, &mut *backend);
        });
        scene.render(camera, *settings, &mut *backend);

        let stats = backend.end_frame();
        debug!(
            frame = game_loop.frame_count(),
            dispatches = stats.dispatches,
            barriers = stats.barriers,
            allocations = stats.allocations,
            draws = stats.draws,
            "Frame done"
        );
        stats
    }

    pub fn run(&mut self, frames: u32) -> RunSummary {
        let mut summary = RunSummary::default();
        for _ in 0..frames {
            let stats = self.frame();
            summary.frames += 1;
            summary.dispatches += u64::from(stats.dispatches);
            summary.draws += u64::from(stats.draws);
        }
        info!(
            frames = summary.frames,
            dispatches = summary.dispatches,
            draws = summary.draws,
            sim_time = self.game_loop.total_sim_time(),
            gpu = self.backend.has_gpu(),
            "Run finished"
        );
        summary
    }
}
