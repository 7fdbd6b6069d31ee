//! Connection state machine and the interface shared by client and server.

use strata_world::World;

/// Lifecycle of a network manager.
///
/// `Closed → Connecting → Established`; any state returns to `Closed` on
/// shutdown or when connecting fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected and not trying to be.
    #[default]
    Closed,
    /// Socket work is in progress; not yet usable.
    Connecting,
    /// Ready to exchange packets.
    Established,
}

/// Common surface of [`ClientNetworkManager`](crate::ClientNetworkManager)
/// and [`ServerNetworkManager`](crate::ServerNetworkManager).
pub trait NetworkManager {
    /// Starts connecting (client) or listening (server). Returns `false` on
    /// failure, after which the state is [`ConnectionState::Closed`].
    fn init(&mut self) -> bool;

    /// Closes every connection and returns to [`ConnectionState::Closed`].
    fn shutdown(&mut self);

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Applies at most one tick's budget of queued packets to `world`.
    /// Returns the number of packets applied.
    fn process_inbound(&mut self, world: &mut World) -> usize;
}

/// Socket and queue settings shared by client and server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetSettings {
    /// Host to connect to, or interface to bind.
    pub address: String,
    /// TCP port. Port 0 lets a server pick a free one.
    pub port: u16,
    /// Most simultaneous connections a server accepts.
    pub max_players: usize,
    /// Capacity of the inbound packet queue.
    pub max_inbound_queue: usize,
    /// Most packets applied per [`NetworkManager::process_inbound`] call.
    pub packets_per_tick: usize,
}

impl NetSettings {
    /// `address:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for NetSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7777,
            max_players: 32,
            max_inbound_queue: 4096,
            packets_per_tick: 256,
        }
    }
}

/// Builds the I/O runtime every manager drives its sockets on.
pub(crate) fn build_runtime(name: &str) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name(name)
        .enable_all()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_closed() {
        assert_eq!(ConnectionState::default(), ConnectionState::Closed);
    }

    #[test]
    fn test_endpoint_format() {
        let settings = NetSettings {
            address: "10.0.0.2".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(settings.endpoint(), "10.0.0.2:9000");
    }
}
