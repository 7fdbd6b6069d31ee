//! Server side of the protocol: accepts clients and keeps them in sync with
//! the authoritative world.

use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use dashmap::DashMap;
use rustc_hash::FxHashSet;
use strata_voxel::{Chunk, NETWORK_DIRTY, Vec3i};
use strata_world::World;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;

use crate::chunk_packet::encode_column_packets;
use crate::manager::{ConnectionState, NetSettings, NetworkManager, build_runtime};
use crate::packet::Packet;
use crate::queue::{ConnectionEvent, InboundReceiver, OverflowPolicy, event_channel, inbound_queue};
use crate::transport::{ConnectionContext, ConnectionHandle, open_connection};

type ConnectionMap = Arc<DashMap<u32, ConnectionHandle>>;

/// Listens for clients, applies their requests to the world, and relays the
/// results.
///
/// Connections live in a shared map written by the accept task and read by
/// the simulation thread. All world access happens in
/// [`process_inbound`](NetworkManager::process_inbound).
pub struct ServerNetworkManager {
    settings: NetSettings,
    state: ConnectionState,
    runtime: Option<Runtime>,
    connections: ConnectionMap,
    /// Columns each client has been sent.
    streamed: DashMap<u32, FxHashSet<(i32, i32)>>,
    inbound: Option<InboundReceiver>,
    events: Option<Receiver<ConnectionEvent>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    local_addr: Option<SocketAddr>,
}

impl ServerNetworkManager {
    pub fn new(settings: NetSettings) -> Self {
        Self {
            settings,
            state: ConnectionState::Closed,
            runtime: None,
            connections: Arc::new(DashMap::new()),
            streamed: DashMap::new(),
            inbound: None,
            events: None,
            shutdown_tx: None,
            local_addr: None,
        }
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Sends `packet` to one client. Returns `false` if it is not connected.
    pub fn send_to(&self, client_id: u32, packet: &Packet) -> bool {
        self.connections
            .get(&client_id)
            .is_some_and(|conn| conn.send(packet))
    }

    /// Sends `packet` to every client except `except`. Returns the number of
    /// clients it was queued for.
    pub fn broadcast_except(&self, except: u32, packet: &Packet) -> usize {
        let body = match packet.encode() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Not broadcasting {:?}: {e}", packet.id());
                return 0;
            }
        };
        self.connections
            .iter()
            .filter(|entry| *entry.key() != except)
            .filter(|entry| entry.value().send_frame(body.clone()))
            .count()
    }

    /// Sends column `(x, z)` to `client_id` as one or more chunk-data
    /// packets. Returns the number of packets sent; 0 if the column is not
    /// resident or the client is gone.
    pub fn stream_column(&self, world: &World, client_id: u32, x: i32, z: i32) -> usize {
        let manager = world.chunk_manager();
        let Some(column) = manager.column(x, z) else {
            return 0;
        };
        let chunks: Vec<(i32, &Chunk)> = manager.column_chunks(x, z).collect();
        let frames = encode_column_packets(x, z, column, &chunks);

        let Some(conn) = self.connections.get(&client_id) else {
            return 0;
        };
        let count = frames.len();
        for frame in frames {
            conn.send_frame(frame);
        }
        drop(conn);
        self.streamed.entry(client_id).or_default().insert((x, z));
        tracing::debug!(
            "Streamed column ({x}, {z}) to {client_id}: {} chunks in {count} packets",
            chunks.len()
        );
        count
    }

    /// Returns `true` if column `(x, z)` has been sent to `client_id`.
    pub fn has_streamed(&self, client_id: u32, x: i32, z: i32) -> bool {
        self.streamed
            .get(&client_id)
            .is_some_and(|columns| columns.contains(&(x, z)))
    }

    /// Re-sends every column with a chunk changed since the previous call to
    /// the clients holding it, then clears the network dirty flags.
    ///
    /// Carries simulation results (random ticks, fluid flow, light) that no
    /// relayed packet describes. Returns the number of columns sent.
    pub fn sync_dirty_columns(&self, world: &mut World) -> usize {
        let mut dirty: Vec<(i32, i32)> = world
            .chunk_manager()
            .iter_dirty(NETWORK_DIRTY)
            .map(|pos| (pos.x, pos.z))
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        world.chunk_manager_mut().clear_dirty_all(NETWORK_DIRTY);
        dirty.sort_unstable();

        let mut sent = 0;
        for (x, z) in dirty {
            let holders: Vec<u32> = self
                .streamed
                .iter()
                .filter(|entry| entry.value().contains(&(x, z)))
                .map(|entry| *entry.key())
                .collect();
            for client_id in holders {
                if self.stream_column(world, client_id, x, z) > 0 {
                    sent += 1;
                }
            }
        }
        if sent > 0 {
            tracing::debug!("Resynced {sent} changed columns");
        }
        sent
    }

    /// Re-sends the column holding `pos` so a client that predicted a
    /// rejected edit converges back to the server's state.
    fn resync(&self, world: &World, client_id: u32, pos: Vec3i) {
        let cp = pos.chunk_pos();
        if world.chunk_manager().contains_column(cp.x, cp.z) {
            self.stream_column(world, client_id, cp.x, cp.z);
        }
    }

    fn on_connected(&self, world: &mut World, client_id: u32) {
        if let Some(conn) = self.connections.get(&client_id) {
            for player in world.players() {
                conn.send(&Packet::SpawnPlayer {
                    client_id: player.client_id,
                });
                conn.send(&Packet::PosRotUpdate(*player));
            }
        }
        world.spawn_player(client_id);
        self.broadcast_except(client_id, &Packet::SpawnPlayer { client_id });
        tracing::info!("Player {client_id} joined");
    }

    fn on_disconnected(&self, world: &mut World, client_id: u32) {
        self.connections.remove(&client_id);
        self.streamed.remove(&client_id);
        if world.kill_player(client_id).is_some() {
            self.broadcast_except(client_id, &Packet::KillPlayer { client_id });
            tracing::info!("Player {client_id} left");
        }
    }

    /// Applies one packet from `sender`.
    pub fn handle_packet(&self, world: &mut World, sender: u32, packet: Packet) {
        match packet {
            Packet::PosRotUpdate(mut state) => {
                state.client_id = sender;
                if world.update_player(state) {
                    self.broadcast_except(sender, &Packet::PosRotUpdate(state));
                }
            }
            Packet::PlaceBlock { hit, block, .. } => match world.place_block(hit, block) {
                Ok(_) => {
                    let relay = Packet::PlaceBlock {
                        client_id: sender,
                        hit,
                        block,
                    };
                    self.broadcast_except(sender, &relay);
                }
                Err(e) => {
                    tracing::debug!("Rejected placement from {sender}: {e}");
                    self.resync(world, sender, hit.adjacent());
                }
            },
            Packet::BreakBlock { hit, .. } => match world.break_block(hit) {
                Ok(_) => {
                    let relay = Packet::BreakBlock {
                        client_id: sender,
                        hit,
                    };
                    self.broadcast_except(sender, &relay);
                }
                Err(e) => {
                    tracing::debug!("Rejected break from {sender}: {e}");
                    self.resync(world, sender, hit.block);
                }
            },
            Packet::LoadColumnRequest { x, z } => {
                let fresh = !world.chunk_manager().contains_column(x, z);
                if world.load_column(x, z) {
                    if fresh {
                        // Nobody holds a column that was just loaded.
                        world
                            .chunk_manager_mut()
                            .clear_column_dirty(x, z, NETWORK_DIRTY);
                    }
                    self.stream_column(world, sender, x, z);
                } else {
                    tracing::warn!("Column ({x}, {z}) unavailable for {sender}");
                }
            }
            other => {
                tracing::warn!("Ignoring {:?} from client {sender}", other.id());
            }
        }
    }
}

impl NetworkManager for ServerNetworkManager {
    fn init(&mut self) -> bool {
        if self.state != ConnectionState::Closed {
            tracing::warn!("Server network already started");
            return true;
        }
        self.state = ConnectionState::Connecting;

        let runtime = match build_runtime("strata-server-io") {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Failed to start server runtime: {e}");
                self.state = ConnectionState::Closed;
                return false;
            }
        };

        let endpoint = self.settings.endpoint();
        let listener = match runtime.block_on(TcpListener::bind(endpoint.as_str())) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("Failed to bind {endpoint}: {e}");
                self.state = ConnectionState::Closed;
                return false;
            }
        };
        self.local_addr = listener.local_addr().ok();

        let (inbound_tx, inbound_rx) = inbound_queue(self.settings.max_inbound_queue);
        let (events_tx, events_rx) = event_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let acceptor = Acceptor {
            connections: Arc::clone(&self.connections),
            next_id: 1,
            max_players: self.settings.max_players,
            ctx: ConnectionContext {
                inbound: inbound_tx,
                events: events_tx,
                overflow: OverflowPolicy::Disconnect,
            },
            runtime: runtime.handle().clone(),
        };
        runtime.spawn(acceptor.run(listener, shutdown_rx));

        tracing::info!(
            "Server listening on {}",
            self.local_addr.map_or(endpoint, |addr| addr.to_string())
        );
        self.inbound = Some(inbound_rx);
        self.events = Some(events_rx);
        self.shutdown_tx = Some(shutdown_tx);
        self.runtime = Some(runtime);
        self.state = ConnectionState::Established;
        true
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.connections.clear();
        self.streamed.clear();
        self.inbound = None;
        self.events = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        self.local_addr = None;
        if self.state != ConnectionState::Closed {
            tracing::info!("Server network shut down");
        }
        self.state = ConnectionState::Closed;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn process_inbound(&mut self, world: &mut World) -> usize {
        let events: Vec<ConnectionEvent> = self
            .events
            .as_ref()
            .map(|events| events.try_iter().collect())
            .unwrap_or_default();
        for event in events {
            match event {
                ConnectionEvent::Connected(id) => self.on_connected(world, id),
                ConnectionEvent::Disconnected(id) => self.on_disconnected(world, id),
            }
        }

        let batch = match &self.inbound {
            Some(inbound) => inbound.drain(self.settings.packets_per_tick),
            None => return 0,
        };
        let applied = batch.len();
        for inbound in batch {
            self.handle_packet(world, inbound.client_id, inbound.packet);
        }
        applied
    }
}

impl Drop for ServerNetworkManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

struct Acceptor {
    connections: ConnectionMap,
    next_id: u32,
    max_players: usize,
    ctx: ConnectionContext,
    runtime: Handle,
}

impl Acceptor {
    async fn run(mut self, listener: TcpListener, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => self.accept(stream, peer),
                    Err(e) => tracing::warn!("Accept failed: {e}"),
                },
                _ = shutdown_rx.changed() => break,
            }
        }
        tracing::debug!("Accept loop stopped");
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.connections.len() >= self.max_players {
            tracing::warn!("Player limit {} reached, rejecting {peer}", self.max_players);
            return;
        }
        let client_id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        // The handle is registered and announced before the reader runs, so
        // its disconnect event always follows the connect event.
        let (handle, pending) = open_connection(stream, client_id, self.ctx.clone());
        handle.send(&Packet::EstablishConnection { client_id });
        self.connections.insert(client_id, handle);
        let _ = self.ctx.events.send(ConnectionEvent::Connected(client_id));
        pending.start(&self.runtime);
        tracing::info!("Accepted {peer} as client {client_id}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
