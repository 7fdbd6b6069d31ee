//! Dedicated Strata server.

use clap::Parser;
use strata_app::{AppError, PlatformDirs, ServerApp, install_shutdown_flag, load_config};
use strata_config::CliArgs;

fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(&args) {
        tracing::error!("Server failed: {e}");
        eprintln!("strata-server: {e}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), AppError> {
    let dirs = PlatformDirs::resolve(args.config.as_deref())?;
    dirs.create_all()?;
    let config = load_config(&dirs, args)?;
    strata_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!("Config directory {}", dirs.config_dir.display());

    let running = install_shutdown_flag();
    let mut server = ServerApp::new(config)?;
    server.start()?;
    server.run(&running)
}
