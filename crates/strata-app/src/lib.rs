//! Strata server and client runtimes.
//!
//! Wires config, logging, the world, and networking together behind the
//! `strata-server` and `strata-client` binaries.

pub mod client;
mod error;
pub mod game_loop;
pub mod platform;
pub mod server;

pub use client::ClientApp;
pub use error::AppError;
pub use game_loop::GameLoop;
pub use platform::{PlatformDirs, install_shutdown_flag, load_config, net_settings};
pub use server::ServerApp;
