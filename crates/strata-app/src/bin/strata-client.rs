//! Headless Strata client.

use clap::Parser;
use strata_app::{AppError, ClientApp, PlatformDirs, install_shutdown_flag, load_config};
use strata_config::CliArgs;

fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(&args) {
        tracing::error!("Client failed: {e}");
        eprintln!("strata-client: {e}");
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), AppError> {
    let dirs = PlatformDirs::resolve(args.config.as_deref())?;
    dirs.create_all()?;
    let config = load_config(&dirs, args)?;
    strata_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    let running = install_shutdown_flag();
    let mut client = ClientApp::new(config)?;
    client.start()?;
    client.run(&running);
    Ok(())
}
