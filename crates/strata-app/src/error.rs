//! Top-level error type for the server and client runtimes.

use std::path::PathBuf;

use strata_config::ConfigError;
use strata_voxel::RegistryError;
use strata_world::SaveError;

/// Anything that stops a server or client from starting or saving.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build block registry: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Save(#[from] SaveError),

    /// The OS did not provide a per-user data directory.
    #[error("could not determine a data directory")]
    NoDataDir,

    /// Creating one of the application directories failed.
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The network manager could not connect or bind.
    #[error("network failed to start on {0}")]
    NetworkInit(String),
}
