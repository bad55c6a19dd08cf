//! Configuration system for Orbis.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap, hot-reload detection, and validation of
//! the planet parameters before any terrain is built from them.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AppConfig, CameraConfig, Config, DebugConfig, MAX_CELL_COUNT, MAX_LODS, PlanetSettings,
    RenderConfig,
};
pub use error::ConfigError;
