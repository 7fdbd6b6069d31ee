//! Headless client runtime: mirrors the server's world around the local
//! player.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use strata_config::Config;
use strata_net::{ClientNetworkManager, ConnectionState, NetworkManager};
use strata_world::{PlayerState, Registry, World};
use tracing::{info, warn};

use crate::AppError;
use crate::game_loop::GameLoop;
use crate::platform::net_settings;

/// A client world fed by a [`ClientNetworkManager`].
///
/// Random ticks are disabled locally; block changes arrive from the server.
pub struct ClientApp {
    config: Config,
    world: World,
    network: ClientNetworkManager,
    player: PlayerState,
    was_established: bool,
}

impl ClientApp {
    /// Builds an empty world whose missing columns are requested from the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns an error if the block registry cannot be built.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let (registry, _) = Registry::standard()?;
        let network = ClientNetworkManager::new(net_settings(&config));
        let mut world = World::new(
            Arc::new(registry),
            Box::new(network.provider()),
            config.world.seed,
        );
        world.set_random_tick_speed(0);
        Ok(Self {
            config,
            world,
            network,
            player: PlayerState::default(),
            was_established: false,
        })
    }

    /// Connects to the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NetworkInit`] if the connection fails.
    pub fn start(&mut self) -> Result<(), AppError> {
        if self.network.init() {
            Ok(())
        } else {
            Err(AppError::NetworkInit(net_settings(&self.config).endpoint()))
        }
    }

    /// One tick: apply server packets, then, once established, request the
    /// columns in view, report the player, and advance the local world.
    pub fn tick(&mut self, dt: Duration) {
        self.network.process_inbound(&mut self.world);
        if self.network.state() != ConnectionState::Established {
            return;
        }
        if !self.was_established {
            self.was_established = true;
            if let Some(id) = self.network.client_id() {
                self.player.client_id = id;
            }
        }

        self.request_view();
        self.network.send_player_state(self.player);
        self.world.update(dt);
    }

    /// Asks for every column within the view distance that is not resident.
    fn request_view(&mut self) {
        let (cx, cz) = self.player.column();
        let radius = self.config.simulation.view_distance as i32;
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let (x, z) = (cx + dx, cz + dz);
                if !self.world.chunk_manager().contains_column(x, z) {
                    // Misses go through the remote provider as requests.
                    self.world.load_column(x, z);
                }
            }
        }
    }

    /// Returns `true` once a connection that had been established is gone.
    pub fn is_disconnected(&self) -> bool {
        self.was_established && self.network.state() == ConnectionState::Closed
    }

    /// Ticks until `running` is cleared or the server goes away.
    pub fn run(&mut self, running: &AtomicBool) {
        let mut game_loop = GameLoop::new(self.config.simulation.tick_rate);
        while running.load(Ordering::SeqCst) && !self.is_disconnected() {
            game_loop.tick(|dt| self.tick(dt));
            std::thread::sleep(game_loop.time_until_next_tick());
        }
        if self.is_disconnected() {
            warn!("Disconnected from server");
        }
        self.network.shutdown();
        info!("Client stopped after {} ticks", game_loop.update_count());
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn player_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }

    pub fn network(&self) -> &ClientNetworkManager {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut ClientNetworkManager {
        &mut self.network
    }
}
