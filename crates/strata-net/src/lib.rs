//! Client/server networking: length-prefixed binary packets over TCP, with
//! tokio tasks moving bytes and the simulation thread applying packets to
//! the [`World`](strata_world::World).

pub mod chunk_packet;
pub mod client;
pub mod compression;
pub mod framing;
pub mod manager;
pub mod packet;
pub mod provider;
pub mod queue;
pub mod server;
pub mod transport;

pub use chunk_packet::{ChunkDataPacket, MAX_CHUNKS_PER_PACKET, encode_column_packets};
pub use client::ClientNetworkManager;
pub use compression::{CompressionError, compress_block, decompress_exact};
pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use manager::{ConnectionState, NetSettings, NetworkManager};
pub use packet::{Packet, PacketError, PacketId};
pub use provider::RemoteProvider;
pub use queue::{ConnectionEvent, Inbound, OverflowPolicy, QueueError};
pub use server::ServerNetworkManager;
