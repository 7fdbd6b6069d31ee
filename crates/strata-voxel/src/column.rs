//! Per-`(x, z)` metadata shared by every chunk in a vertical stack.

use crate::bytes::ByteReader;
use crate::chunk::{CHUNK_AREA, CHUNK_SIZE};
use crate::chunk_serial::ChunkCodecError;

/// Height of the world in blocks; valid block y is `0..WORLD_HEIGHT`.
pub const WORLD_HEIGHT: i32 = 256;

/// Height of the world in chunks.
pub const WORLD_CHUNK_HEIGHT: i32 = WORLD_HEIGHT / CHUNK_SIZE as i32;

/// Encoded size of a column in bytes.
pub const COLUMN_BYTES: usize = CHUNK_AREA;

/// Opaque-height record for a 16×16 column of chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkColumn {
    /// World y of the tallest opaque block per `(x, z)`, indexed `x + z*16`.
    heights: [u8; CHUNK_AREA],
}

impl ChunkColumn {
    /// Creates a column where every line reports height 0.
    pub fn new() -> Self {
        Self {
            heights: [0; CHUNK_AREA],
        }
    }

    /// World y of the tallest opaque block at local `(x, z)`.
    pub fn tallest_opaque(&self, x: i32, z: i32) -> i32 {
        self.heights[Self::index(x, z)] as i32
    }

    /// Records the tallest opaque block at local `(x, z)`. `y` is truncated to
    /// a byte.
    pub fn set_tallest_opaque(&mut self, x: i32, z: i32, y: i32) {
        self.heights[Self::index(x, z)] = y as u8;
    }

    /// Raw height table.
    pub fn heights(&self) -> &[u8; CHUNK_AREA] {
        &self.heights
    }

    /// Appends the 256-byte height table to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.heights);
    }

    /// Reads a 256-byte height table.
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self, ChunkCodecError> {
        let mut heights = [0u8; CHUNK_AREA];
        heights.copy_from_slice(reader.read_bytes(CHUNK_AREA)?);
        Ok(Self { heights })
    }

    fn index(x: i32, z: i32) -> usize {
        (x & 0xF) as usize + (z & 0xF) as usize * CHUNK_SIZE
    }
}

impl Default for ChunkColumn {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
