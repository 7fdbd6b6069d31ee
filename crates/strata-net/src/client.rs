//! Client side of the protocol: one connection to the server.

use crossbeam_channel::{Receiver, Sender};
use rustc_hash::FxHashSet;
use strata_voxel::{BlockId, Vec3i};
use strata_world::{EditError, PlayerState, RaycastHit, World};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;

use crate::manager::{ConnectionState, NetSettings, NetworkManager, build_runtime};
use crate::packet::Packet;
use crate::provider::RemoteProvider;
use crate::queue::{ConnectionEvent, InboundReceiver, OverflowPolicy, event_channel, inbound_queue};
use crate::transport::{ConnectionContext, ConnectionHandle, spawn_connection};

/// Connects to a server and applies its authoritative updates to the local
/// world.
///
/// The state is `Connecting` from a successful [`init`](NetworkManager::init)
/// until the server's `EstablishConnection` arrives and assigns a client id.
pub struct ClientNetworkManager {
    settings: NetSettings,
    state: ConnectionState,
    client_id: Option<u32>,
    runtime: Option<Runtime>,
    connection: Option<ConnectionHandle>,
    inbound: Option<InboundReceiver>,
    events: Option<Receiver<ConnectionEvent>>,
    /// Columns asked for and not yet received.
    requested: FxHashSet<(i32, i32)>,
    peer_closed: bool,
    provider_tx: Sender<(i32, i32)>,
    provider_rx: Receiver<(i32, i32)>,
}

impl ClientNetworkManager {
    pub fn new(settings: NetSettings) -> Self {
        let (provider_tx, provider_rx) = crossbeam_channel::unbounded();
        Self {
            settings,
            state: ConnectionState::Closed,
            client_id: None,
            runtime: None,
            connection: None,
            inbound: None,
            events: None,
            requested: FxHashSet::default(),
            peer_closed: false,
            provider_tx,
            provider_rx,
        }
    }

    /// A chunk provider whose misses become column requests on this
    /// connection.
    pub fn provider(&self) -> RemoteProvider {
        RemoteProvider::new(self.provider_tx.clone())
    }

    /// Id assigned by the server, once established.
    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    /// Number of column requests still in flight.
    pub fn pending_requests(&self) -> usize {
        self.requested.len()
    }

    /// Asks the server for column `(x, z)`. Returns `false` if the column is
    /// already requested or nothing could be sent.
    pub fn request_column(&mut self, x: i32, z: i32) -> bool {
        if !self.requested.insert((x, z)) {
            return false;
        }
        if !self.send(&Packet::LoadColumnRequest { x, z }) {
            self.requested.remove(&(x, z));
            return false;
        }
        tracing::debug!("Requested column ({x}, {z})");
        true
    }

    /// Reports the local player's position and rotation.
    pub fn send_player_state(&self, mut state: PlayerState) -> bool {
        state.client_id = self.client_id.unwrap_or_default();
        self.send(&Packet::PosRotUpdate(state))
    }

    /// Places `block` in front of `hit` locally and asks the server to do
    /// the same. Other clients receive the edit from the server; if the
    /// server rejects it, the column is re-sent and overwrites the local
    /// prediction.
    pub fn place_block(
        &self,
        world: &mut World,
        hit: RaycastHit,
        block: BlockId,
    ) -> Result<Vec3i, EditError> {
        let placed = world.place_block(hit, block)?;
        self.send(&Packet::PlaceBlock {
            client_id: self.client_id.unwrap_or_default(),
            hit,
            block,
        });
        Ok(placed)
    }

    /// Breaks the block at `hit` locally and asks the server to do the same.
    pub fn break_block(&self, world: &mut World, hit: RaycastHit) -> Result<BlockId, EditError> {
        let broken = world.break_block(hit)?;
        self.send(&Packet::BreakBlock {
            client_id: self.client_id.unwrap_or_default(),
            hit,
        });
        Ok(broken)
    }

    fn send(&self, packet: &Packet) -> bool {
        self.connection.as_ref().is_some_and(|conn| conn.send(packet))
    }

    /// Applies one packet received from the server.
    pub fn handle_packet(&mut self, world: &mut World, packet: Packet) {
        match packet {
            Packet::EstablishConnection { client_id } => {
                self.client_id = Some(client_id);
                self.state = ConnectionState::Established;
                tracing::info!("Connection established as client {client_id}");
            }
            Packet::ChunkData(data) => {
                let (x, z) = (data.x, data.z);
                tracing::debug!("Received column ({x}, {z}) with {} chunks", data.chunks.len());
                self.requested.remove(&(x, z));
                world.insert_column(x, z, data.into_column_data());
            }
            Packet::PlaceBlock { client_id, hit, block } => {
                if let Err(e) = world.place_block(hit, block) {
                    tracing::debug!("Placement by {client_id} not applied locally: {e}");
                }
            }
            Packet::BreakBlock { client_id, hit } => {
                if let Err(e) = world.break_block(hit) {
                    tracing::debug!("Break by {client_id} not applied locally: {e}");
                }
            }
            Packet::SpawnPlayer { client_id } => {
                world.spawn_player(client_id);
            }
            Packet::KillPlayer { client_id } => {
                world.kill_player(client_id);
            }
            Packet::PosRotUpdate(state) => {
                if !world.update_player(state) {
                    *world.spawn_player(state.client_id) = state;
                }
            }
            Packet::LoadColumnRequest { x, z } => {
                tracing::warn!("Ignoring column request ({x}, {z}) sent by the server");
            }
        }
    }
}

impl NetworkManager for ClientNetworkManager {
    fn init(&mut self) -> bool {
        if self.state != ConnectionState::Closed {
            tracing::warn!("Client network already started");
            return true;
        }
        self.state = ConnectionState::Connecting;

        let runtime = match build_runtime("strata-client-io") {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Failed to start client runtime: {e}");
                self.state = ConnectionState::Closed;
                return false;
            }
        };

        let endpoint = self.settings.endpoint();
        let stream = match runtime.block_on(TcpStream::connect(endpoint.as_str())) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Failed to connect to {endpoint}: {e}");
                self.state = ConnectionState::Closed;
                return false;
            }
        };

        let (inbound_tx, inbound_rx) = inbound_queue(self.settings.max_inbound_queue);
        let (events_tx, events_rx) = event_channel();
        let ctx = ConnectionContext {
            inbound: inbound_tx,
            events: events_tx,
            overflow: OverflowPolicy::DropPacket,
        };
        self.connection = Some(spawn_connection(runtime.handle(), stream, 0, ctx));
        self.inbound = Some(inbound_rx);
        self.events = Some(events_rx);
        self.runtime = Some(runtime);
        tracing::info!("Connecting to {endpoint}");
        true
    }

    fn shutdown(&mut self) {
        self.connection = None;
        self.inbound = None;
        self.events = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        self.requested.clear();
        self.client_id = None;
        self.peer_closed = false;
        if self.state != ConnectionState::Closed {
            tracing::info!("Client network shut down");
        }
        self.state = ConnectionState::Closed;
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn process_inbound(&mut self, world: &mut World) -> usize {
        let misses: Vec<(i32, i32)> = self.provider_rx.try_iter().collect();
        for (x, z) in misses {
            self.request_column(x, z);
        }

        let batch = match &self.inbound {
            Some(inbound) => inbound.drain(self.settings.packets_per_tick),
            None => return 0,
        };
        let applied = batch.len();
        for inbound in batch {
            self.handle_packet(world, inbound.packet);
        }

        if let Some(events) = &self.events
            && events
                .try_iter()
                .any(|event| matches!(event, ConnectionEvent::Disconnected(_)))
        {
            self.peer_closed = true;
        }
        // Packets that arrived before the close are still applied.
        if self.peer_closed && self.inbound.as_ref().is_none_or(InboundReceiver::is_empty) {
            tracing::warn!("Lost connection to server");
            self.shutdown();
        }
        applied
    }
}

impl Drop for ClientNetworkManager {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    use strata_voxel::{ChunkColumn, NullProvider};
    use strata_world::Registry;

    use super::*;
    use crate::chunk_packet::ChunkDataPacket;

    fn make_world() -> World {
        World::new(Arc::new(Registry::new()), Box::new(NullProvider), 0)
    }

    fn settings_for(listener: &TcpListener) -> NetSettings {
        NetSettings {
            port: listener.local_addr().unwrap().port(),
            ..Default::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..300 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_starts_closed() {
        let client = ClientNetworkManager::new(NetSettings::default());
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.client_id(), None);
    }

    #[test]
    fn test_failed_connect_returns_to_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let settings = settings_for(&listener);
        drop(listener);

        let mut client = ClientNetworkManager::new(settings);
        assert!(!client.init());
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_connecting_until_established() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = ClientNetworkManager::new(settings_for(&listener));
        assert!(client.init());
        assert_eq!(client.state(), ConnectionState::Connecting);

        let mut world = make_world();
        client.handle_packet(&mut world, Packet::EstablishConnection { client_id: 7 });
        assert_eq!(client.state(), ConnectionState::Established);
        assert_eq!(client.client_id(), Some(7));

        client.shutdown();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.client_id(), None);
    }

    #[test]
    fn test_establish_over_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let settings = settings_for(&listener);
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // length 6, id 0, client id 42
            stream.write_all(&[0, 6, 0, 0, 0, 0, 0, 42]).unwrap();
            stream.flush().unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });

        let mut client = ClientNetworkManager::new(settings);
        assert!(client.init());
        let mut world = make_world();
        assert!(wait_until(|| {
            client.process_inbound(&mut world);
            client.state() == ConnectionState::Established
        }));
        assert_eq!(client.client_id(), Some(42));
        server.join().unwrap();
    }

    #[test]
    fn test_server_close_shuts_client_down() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let settings = settings_for(&listener);
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut client = ClientNetworkManager::new(settings);
        assert!(client.init());
        server.join().unwrap();
        let mut world = make_world();
        assert!(wait_until(|| {
            client.process_inbound(&mut world);
            client.state() == ConnectionState::Closed
        }));
    }

    #[test]
    fn test_column_requests_are_deduplicated() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = ClientNetworkManager::new(settings_for(&listener));
        let mut world = make_world();
        assert!(!client.request_column(1, 2), "nothing to send on before init");

        assert!(client.init());
        assert!(client.request_column(1, 2));
        assert!(!client.request_column(1, 2));
        assert_eq!(client.pending_requests(), 1);

        let data = ChunkDataPacket {
            x: 1,
            z: 2,
            column: ChunkColumn::new(),
            chunks: Vec::new(),
        };
        client.handle_packet(&mut world, Packet::ChunkData(data));
        assert_eq!(client.pending_requests(), 0);
        assert!(world.chunk_manager().contains_column(1, 2));
        client.shutdown();
    }

    #[test]
    fn test_provider_misses_become_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = ClientNetworkManager::new(settings_for(&listener));
        assert!(client.init());

        let mut world = World::new(Arc::new(Registry::new()), Box::new(client.provider()), 0);
        assert!(!world.load_column(4, 4));
        assert!(!world.load_column(4, 4));
        client.process_inbound(&mut world);
        assert_eq!(client.pending_requests(), 1);
        client.shutdown();
    }

    #[test]
    fn test_player_packets_update_roster() {
        let mut client = ClientNetworkManager::new(NetSettings::default());
        let mut world = make_world();

        client.handle_packet(&mut world, Packet::SpawnPlayer { client_id: 3 });
        assert!(world.player(3).is_some());

        let mut state = PlayerState::new(9);
        state.rotation = glam::Vec2::new(1.5, 0.25);
        client.handle_packet(&mut world, Packet::PosRotUpdate(state));
        assert_eq!(world.player(9).map(|p| p.rotation.x), Some(1.5));

        client.handle_packet(&mut world, Packet::KillPlayer { client_id: 3 });
        assert!(world.player(3).is_none());
    }
}
