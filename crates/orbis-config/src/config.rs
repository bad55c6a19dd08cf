//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for the LOD slider and for CLI/config values.
pub const MAX_LODS: u32 = 40;
/// Upper bound for the cell count slider and for CLI/config values.
pub const MAX_CELL_COUNT: u32 = 120;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Terrain settings for the planet.
    pub planet: PlanetSettings,
    /// Rendering settings.
    pub render: RenderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Viewer placement for the headless driver.
    pub camera: CameraConfig,
    /// Driver settings.
    pub app: AppConfig,
}

/// Terrain settings owned by the planet root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanetSettings {
    /// Planet radius in meters.
    pub radius: f32,
    /// Number of LOD rings around the central disc (including the disc).
    pub num_lods: u32,
    /// Edge length of a cell at the finest level, in meters.
    pub cell_width: f32,
    /// Cells per chunk half-extent; drives template and map resolution.
    pub cell_count: u32,
    /// Directory holding the terrain WGSL kernels for hot reload. Embedded
    /// sources are used when unset.
    pub shader_dir: Option<PathBuf>,
    /// Radius of the planet's circular orbit around its parent, in meters.
    /// Zero keeps the planet where it was placed.
    pub orbit_distance: f64,
    /// Orbital angular speed in radians per second.
    pub orbit_speed: f32,
    /// Spin about the planet's Z axis in radians per second.
    pub rotation_speed: f32,
}

/// Rendering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Draw every surface in line mode.
    pub wireframe: bool,
    /// Submit each chunk a second time, reversed and in line mode.
    pub double_sided: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Stop following the camera with the terrain mesh.
    pub freeze_camera: bool,
    /// Skip every map rebuild that is not forced.
    pub freeze_updates: bool,
}

/// Starting viewer placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Height above the surface in meters.
    pub altitude: f64,
    /// Near plane distance in meters.
    pub near: f64,
}

/// Headless driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Number of frames to simulate before exiting.
    pub frames: u32,
}

// --- Default implementations ---

impl Default for PlanetSettings {
    fn default() -> Self {
        Self {
            radius: 80_000.0,
            num_lods: 14,
            cell_width: 1.0,
            cell_count: 10,
            shader_dir: None,
            orbit_distance: 0.0,
            orbit_speed: 0.0,
            rotation_speed: 0.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            freeze_camera: false,
            freeze_updates: false,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            altitude: 2.0,
            near: 0.1,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { frames: 120 }
    }
}

impl PlanetSettings {
    /// Reject settings no planet can be built from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.radius > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "planet.radius",
                reason: format!("must be positive, got {}", self.radius),
            });
        }
        if !(self.cell_width > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "planet.cell_width",
                reason: format!("must be positive, got {}", self.cell_width),
            });
        }
        if !(1..=MAX_CELL_COUNT).contains(&self.cell_count) {
            return Err(ConfigError::InvalidValue {
                field: "planet.cell_count",
                reason: format!("must be in 1..={MAX_CELL_COUNT}, got {}", self.cell_count),
            });
        }
        if !(1..=MAX_LODS).contains(&self.num_lods) {
            return Err(ConfigError::InvalidValue {
                field: "planet.num_lods",
                reason: format!("must be in 1..={MAX_LODS}, got {}", self.num_lods),
            });
        }
        if !(self.orbit_distance >= 0.0 && self.orbit_distance.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "planet.orbit_distance",
                reason: format!("must be finite and non-negative, got {}", self.orbit_distance),
            });
        }
        if !(self.orbit_speed.is_finite() && self.rotation_speed.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "planet.orbit_speed",
                reason: "orbit and rotation speeds must be finite".to_string(),
            });
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Validate every section that has constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.planet.validate()
    }
}
