//! Dedicated server runtime: authoritative world, network, and autosave.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strata_config::Config;
use strata_net::{NetworkManager, ServerNetworkManager};
use strata_voxel::SAVE_DIRTY;
use strata_world::{Registry, World, load_save, save_world};
use tracing::{error, info, warn};

use crate::AppError;
use crate::game_loop::GameLoop;
use crate::platform::net_settings;

/// Seconds between autosaves.
pub const AUTOSAVE_SECS: u64 = 60;

/// Ticks between re-sends of columns the simulation changed.
pub const NETWORK_SYNC_TICKS: u64 = 10;

/// The authoritative world together with the server network manager.
pub struct ServerApp {
    config: Config,
    world: World,
    network: ServerNetworkManager,
    ticks_since_save: u64,
    autosave_ticks: u64,
    ticks_since_sync: u64,
}

impl ServerApp {
    /// Builds the world, restoring `save_dir/world.strw` if present.
    ///
    /// A save's seed takes precedence over the configured one, so columns
    /// generated after loading match the saved ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the save exists but cannot be decoded.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let saved = load_save(&config.world.save_dir)?;
        let seed = match &saved {
            Some(save) if save.header.seed != config.world.seed => {
                warn!(
                    "Save uses seed {}, ignoring configured seed {}",
                    save.header.seed, config.world.seed
                );
                save.header.seed
            }
            Some(save) => save.header.seed,
            None => config.world.seed,
        };

        let (registry, blocks) = Registry::standard()?;
        let generator = blocks.column_generator(&registry, seed, config.world.water_level);
        let mut world = World::new(Arc::new(registry), Box::new(generator), seed);
        world.set_random_tick_speed(config.world.random_tick_speed);
        if let Some(save) = saved {
            save.apply(&mut world);
            info!(
                "Restored {} chunks from {}",
                world.chunk_manager().loaded_count(),
                config.world.save_dir.display()
            );
        }

        let network = ServerNetworkManager::new(net_settings(&config));
        let autosave_ticks = AUTOSAVE_SECS * u64::from(config.simulation.tick_rate.max(1));
        Ok(Self {
            config,
            world,
            network,
            ticks_since_save: 0,
            autosave_ticks,
            ticks_since_sync: 0,
        })
    }

    /// Starts listening.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NetworkInit`] if the address cannot be bound.
    pub fn start(&mut self) -> Result<(), AppError> {
        if self.network.init() {
            Ok(())
        } else {
            Err(AppError::NetworkInit(net_settings(&self.config).endpoint()))
        }
    }

    /// One simulation tick: apply client packets, advance the world, push
    /// changed columns to their holders, and autosave when due.
    pub fn tick(&mut self, dt: Duration) {
        self.network.process_inbound(&mut self.world);
        self.world.update(dt);

        self.ticks_since_sync += 1;
        if self.ticks_since_sync >= NETWORK_SYNC_TICKS {
            self.ticks_since_sync = 0;
            self.network.sync_dirty_columns(&mut self.world);
        }

        self.ticks_since_save += 1;
        if self.ticks_since_save >= self.autosave_ticks {
            self.ticks_since_save = 0;
            if self.has_unsaved_chunks()
                && let Err(e) = self.save()
            {
                error!("Autosave failed: {e}");
            }
        }
    }

    /// Returns `true` if any resident chunk changed since the last save.
    pub fn has_unsaved_chunks(&self) -> bool {
        self.world
            .chunk_manager()
            .iter_dirty(SAVE_DIRTY)
            .next()
            .is_some()
    }

    /// Writes the world to the configured save directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the save file cannot be written.
    pub fn save(&mut self) -> Result<PathBuf, AppError> {
        Ok(save_world(&mut self.world, &self.config.world.save_dir)?)
    }

    /// Ticks at the configured rate until `running` is cleared, then closes
    /// every connection and saves.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), AppError> {
        let mut game_loop = GameLoop::new(self.config.simulation.tick_rate);
        info!(
            "Server running at {} ticks per second",
            self.config.simulation.tick_rate
        );
        while running.load(Ordering::SeqCst) {
            game_loop.tick(|dt| self.tick(dt));
            std::thread::sleep(game_loop.time_until_next_tick());
        }

        self.network.shutdown();
        let path = self.save()?;
        info!(
            "Server stopped after {} ticks, world saved to {}",
            game_loop.update_count(),
            path.display()
        );
        Ok(())
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.network.local_addr()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn network(&self) -> &ServerNetworkManager {
        &self.network
    }
}
