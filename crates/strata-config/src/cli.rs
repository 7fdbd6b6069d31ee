//! Command-line argument parsing shared by the server and client binaries.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata", about = "Strata voxel world")]
pub struct CliArgs {
    /// Server address (connect target for clients, bind address for servers).
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// World seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// View distance in columns.
    #[arg(long)]
    pub view_distance: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the world save.
    #[arg(long)]
    pub save_dir: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(seed) = args.seed {
            self.world.seed = seed;
        }
        if let Some(vd) = args.view_distance {
            self.simulation.view_distance = vd;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(ref dir) = args.save_dir {
            self.world.save_dir = dir.clone();
        }
    }
}
