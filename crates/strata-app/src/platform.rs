//! Per-user directory layout and process startup helpers shared by both
//! binaries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_config::{CliArgs, Config};
use strata_net::NetSettings;

use crate::AppError;

const APP_NAME: &str = "strata";

/// OS-specific directories for Strata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Persistent data; default parent of the world save.
    pub data_dir: PathBuf,
    /// Log files.
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// Resolves the directories without creating them. `config_override`
    /// replaces the config directory (`--config`).
    ///
    /// # Errors
    ///
    /// Returns an error if the OS exposes no config or data directory.
    pub fn resolve(config_override: Option<&Path>) -> Result<Self, AppError> {
        let config_dir = match config_override {
            Some(dir) => dir.to_path_buf(),
            None => Config::default_dir()?,
        };
        let data_dir = dirs::data_dir().ok_or(AppError::NoDataDir)?.join(APP_NAME);
        let log_dir = data_dir.join("logs");
        Ok(Self {
            config_dir,
            data_dir,
            log_dir,
        })
    }

    /// Creates every directory that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::CreateDir`] naming the directory that failed.
    pub fn create_all(&self) -> Result<(), AppError> {
        for dir in [&self.config_dir, &self.data_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| AppError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Loads `config.ron` from `dirs.config_dir` (creating it if missing) and
/// applies the command-line overrides.
///
/// # Errors
///
/// Returns an error if the config exists but cannot be read or parsed.
pub fn load_config(dirs: &PlatformDirs, args: &CliArgs) -> Result<Config, AppError> {
    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(args);
    Ok(config)
}

/// Network settings described by `config`.
pub fn net_settings(config: &Config) -> NetSettings {
    NetSettings {
        address: config.network.server_address.clone(),
        port: config.network.server_port,
        max_players: config.network.max_players as usize,
        max_inbound_queue: config.network.max_inbound_queue,
        packets_per_tick: config.network.packets_per_tick,
    }
}

/// A flag that stays `true` until Ctrl-C is pressed.
pub fn install_shutdown_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Shutdown requested");
        flag.store(false, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to install Ctrl-C handler: {e}");
    }
    running
}
