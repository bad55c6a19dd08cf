//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Orbis command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "orbis", about = "Planet terrain LOD driver")]
pub struct CliArgs {
    /// Planet radius in meters.
    #[arg(long)]
    pub radius: Option<f32>,

    /// Number of LOD levels.
    #[arg(long)]
    pub lods: Option<u32>,

    /// Cells per chunk half-extent.
    #[arg(long)]
    pub cell_count: Option<u32>,

    /// Finest cell width in meters.
    #[arg(long)]
    pub cell_width: Option<f32>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Render in wireframe.
    #[arg(long)]
    pub wireframe: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(radius) = args.radius {
            self.planet.radius = radius;
        }
        if let Some(lods) = args.lods {
            self.planet.num_lods = lods;
        }
        if let Some(count) = args.cell_count {
            self.planet.cell_count = count;
        }
        if let Some(width) = args.cell_width {
            self.planet.cell_width = width;
        }
        if let Some(frames) = args.frames {
            self.app.frames = frames;
        }
        if let Some(wireframe) = args.wireframe {
            self.render.wireframe = wireframe;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            radius: Some(1000.0),
            lods: Some(3),
            cell_count: Some(4),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.planet.radius, 1000.0);
        assert_eq!(config.planet.num_lods, 3);
        assert_eq!(config.planet.cell_count, 4);
        // Non-overridden fields retain defaults
        assert_eq!(config.planet.cell_width, 1.0);
        assert_eq!(config.app.frames, 120);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from(["orbis", "--lods", "5", "--wireframe", "true"]);
        assert_eq!(args.lods, Some(5));
        assert_eq!(args.wireframe, Some(true));
        assert!(args.radius.is_none());
    }
}
