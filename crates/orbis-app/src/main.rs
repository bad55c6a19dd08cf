//! Headless Orbis driver.

use clap::Parser;
use orbis_app::backend::HeadlessBackend;
use orbis_app::platform::PlatformDirs;
use orbis_app::session::Session;
use orbis_config::{CliArgs, Config};

fn main() {
    let args = CliArgs::parse();

    let dirs = match &args.config {
        Some(root) => PlatformDirs::resolve_with_root(root),
        None => match PlatformDirs::resolve() {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to resolve platform directories: {e}");
                std::process::exit(1);
            }
        },
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create platform directories: {e}");
        std::process::exit(1);
    }

    let mut config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config, using defaults: {e}");
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(2);
    }

    orbis_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!(
        config = %dirs.config_dir.display(),
        radius = config.planet.radius,
        lods = config.planet.num_lods,
        cell_count = config.planet.cell_count,
        "Orbis starting"
    );

    let mut session = Session::new(&config, HeadlessBackend::detect());
    session.run(config.app.frames);
}
