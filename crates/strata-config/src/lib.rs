//! Configuration for Strata servers and clients.
//!
//! Settings persist to disk as RON files, are forward/backward compatible
//! through `#[serde(default)]`, and can be overridden from the command line.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, NetworkConfig, SimulationConfig, WorldConfig};
pub use error::ConfigError;
