//! Chunk provider for clients: missing columns are requested from the server.

use crossbeam_channel::Sender;
use strata_voxel::{ChunkProvider, ColumnData};

/// Forwards every miss to the client network manager, which turns it into a
/// [`Packet::LoadColumnRequest`](crate::Packet::LoadColumnRequest).
///
/// Never produces a column itself; the answer arrives later as chunk data
/// and is merged with [`World::insert_column`](strata_world::World::insert_column).
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    requests: Sender<(i32, i32)>,
}

impl RemoteProvider {
    pub(crate) fn new(requests: Sender<(i32, i32)>) -> Self {
        Self { requests }
    }
}

impl ChunkProvider for RemoteProvider {
    fn provide_column(&mut self, x: i32, z: i32) -> Option<ColumnData> {
        if self.requests.send((x, z)).is_err() {
            tracing::debug!("Column request ({x}, {z}) dropped, client network is gone");
        }
        None
    }
}
