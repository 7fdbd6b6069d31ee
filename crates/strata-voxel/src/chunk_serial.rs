//! Binary encoding of [`Chunk`] contents, shared by save files and the wire.
//!
//! ## Payload layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4096 | Block ids (`i8`, index `x + z*16 + y*256`) |
//! | 4096 | 4096 | Packed light (sky high nibble, block low nibble) |
//! | 8192 | 4096 | Block metadata |
//! | 12288 | 64 | Layer table: 32 × `u16` big-endian (16 counts, 16 reserved zeros) |
//!
//! ## Record layout ([`Chunk::write_to`])
//!
//! `block_count:u16` `tickable_count:u16` `payload[12352]` `tickables[n]:i32`,
//! all big-endian. The block count is carried explicitly and trusted on
//! decode rather than recomputed.

use rustc_hash::FxHashSet;

use crate::bytes::ByteReader;
use crate::chunk::{CHUNK_SIZE, CHUNK_VOLUME, Chunk};

/// Entries in the encoded layer table.
pub const LAYER_TABLE_ENTRIES: usize = 32;

/// Exact size of an uncompressed chunk payload.
pub const PAYLOAD_SIZE: usize = CHUNK_VOLUME * 3 + LAYER_TABLE_ENTRIES * 2;

/// Upper bound accepted for declared block and tickable counts.
pub const MAX_DECLARED_COUNT: u16 = CHUNK_VOLUME as u16;

/// Upper bound for one layer table entry.
const MAX_LAYER_COUNT: u16 = (CHUNK_SIZE * CHUNK_SIZE) as u16;

/// Bits a valid packed tickable may use.
const TICKABLE_MASK: i32 = 0x000F_0F0F;

/// Errors that can occur while decoding chunk or column data.
#[derive(Debug, thiserror::Error)]
pub enum ChunkCodecError {
    /// The data is shorter than expected.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count available.
        actual: usize,
    },
    /// The declared block count exceeds the chunk volume.
    #[error("block count {0} exceeds chunk volume")]
    BlockCountOutOfRange(u16),
    /// The declared tickable count exceeds the chunk volume.
    #[error("tickable count {0} exceeds chunk volume")]
    TickableCountOutOfRange(u16),
    /// A tickable entry does not name a position inside the chunk.
    #[error("tickable {0:#x} is outside the chunk")]
    InvalidTickable(i32),
    /// A layer table entry exceeds the number of cells in one layer.
    #[error("layer {layer} count {count} exceeds layer area")]
    LayerCountOutOfRange {
        /// Layer index.
        layer: usize,
        /// Declared count.
        count: u16,
    },
    /// A payload did not have the fixed payload size.
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadSize {
        /// Required size.
        expected: usize,
        /// Size received.
        actual: usize,
    },
}

impl Chunk {
    /// Appends the fixed-size payload (ids, light, meta, layer table) to `out`.
    pub fn write_payload(&self, out: &mut Vec<u8>) {
        out.reserve(PAYLOAD_SIZE);
        out.extend(self.block_ids().iter().map(|&id| id as u8));
        out.extend_from_slice(self.light_data());
        out.extend_from_slice(self.meta_data());
        for &count in self.layer_counts() {
            out.extend_from_slice(&count.to_be_bytes());
        }
        for _ in CHUNK_SIZE..LAYER_TABLE_ENTRIES {
            out.extend_from_slice(&0u16.to_be_bytes());
        }
    }

    /// Encodes the payload into a fresh buffer of exactly [`PAYLOAD_SIZE`] bytes.
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PAYLOAD_SIZE);
        self.write_payload(&mut out);
        out
    }

    /// Rebuilds a chunk from a payload plus the separately transmitted block
    /// count and tickables.
    pub fn from_payload(
        payload: &[u8],
        block_count: u16,
        tickables: FxHashSet<i32>,
    ) -> Result<Chunk, ChunkCodecError> {
        if payload.len() != PAYLOAD_SIZE {
            return Err(ChunkCodecError::PayloadSize {
                expected: PAYLOAD_SIZE,
                actual: payload.len(),
            });
        }
        let block_count = check_block_count(block_count)?;

        let mut ids = Box::new([0i8; CHUNK_VOLUME]);
        let mut light = Box::new([0u8; CHUNK_VOLUME]);
        let mut meta = Box::new([0u8; CHUNK_VOLUME]);
        for (dst, &src) in ids.iter_mut().zip(&payload[..CHUNK_VOLUME]) {
            *dst = src as i8;
        }
        light.copy_from_slice(&payload[CHUNK_VOLUME..CHUNK_VOLUME * 2]);
        meta.copy_from_slice(&payload[CHUNK_VOLUME * 2..CHUNK_VOLUME * 3]);

        let table = &payload[CHUNK_VOLUME * 3..];
        let mut layer_counts = [0u16; CHUNK_SIZE];
        for (y, count) in layer_counts.iter_mut().enumerate() {
            let declared = u16::from_be_bytes([table[y * 2], table[y * 2 + 1]]);
            if declared > MAX_LAYER_COUNT {
                return Err(ChunkCodecError::LayerCountOutOfRange {
                    layer: y,
                    count: declared,
                });
            }
            *count = declared;
        }

        Ok(Chunk::from_raw_parts(
            ids,
            light,
            meta,
            layer_counts,
            block_count,
            tickables,
        ))
    }

    /// Tickables in ascending order, for deterministic encoding.
    pub fn sorted_tickables(&self) -> Vec<i32> {
        let mut out: Vec<i32> = self.tickables().iter().copied().collect();
        out.sort_unstable();
        out
    }

    /// Appends a full chunk record (counts, payload, tickables) to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let tickables = self.sorted_tickables();
        out.extend_from_slice(&self.block_count().to_be_bytes());
        out.extend_from_slice(&(tickables.len() as u16).to_be_bytes());
        self.write_payload(out);
        for t in tickables {
            out.extend_from_slice(&t.to_be_bytes());
        }
    }

    /// Reads a record produced by [`Chunk::write_to`].
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Chunk, ChunkCodecError> {
        let block_count = reader.read_u16()?;
        let tickable_count = reader.read_u16()?;
        let payload = reader.read_bytes(PAYLOAD_SIZE)?;
        let tickables = read_tickables(reader, tickable_count)?;
        Chunk::from_payload(payload, block_count, tickables)
    }

    /// Reads a record that predates tickable tracking: `block_count:u16`
    /// followed by the payload. The tickable set is left empty.
    pub fn read_from_without_tickables(
        reader: &mut ByteReader<'_>,
    ) -> Result<Chunk, ChunkCodecError> {
        let block_count = reader.read_u16()?;
        let payload = reader.read_bytes(PAYLOAD_SIZE)?;
        Chunk::from_payload(payload, block_count, FxHashSet::default())
    }
}

fn check_block_count(count: u16) -> Result<u16, ChunkCodecError> {
    if count > MAX_DECLARED_COUNT {
        Err(ChunkCodecError::BlockCountOutOfRange(count))
    } else {
        Ok(count)
    }
}

/// Reads `count` packed tickables, validating the count before allocating and
/// every entry against the chunk bounds.
pub fn read_tickables(
    reader: &mut ByteReader<'_>,
    count: u16,
) -> Result<FxHashSet<i32>, ChunkCodecError> {
    if count > MAX_DECLARED_COUNT {
        return Err(ChunkCodecError::TickableCountOutOfRange(count));
    }
    let raw = reader.read_bytes(count as usize * 4)?;
    let mut set = FxHashSet::with_capacity_and_hasher(count as usize, Default::default());
    for bytes in raw.chunks_exact(4) {
        let packed = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if packed & !TICKABLE_MASK != 0 {
            return Err(ChunkCodecError::InvalidTickable(packed));
        }
        set.insert(packed);
    }
    Ok(set)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
