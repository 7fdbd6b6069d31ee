//! Chunk-data packet: one column's height record plus any number of its
//! chunks.
//!
//! ## Body layout (big-endian)
//!
//! ```text
//! chunkX:i32  chunkZ:i32  chunkCount:u8
//! columnCompressedLen:u16  columnCompressedBytes[len]
//! chunkCount × {
//!     chunkY:i32  blockCount:u16  tickableCount:u16  tickables[n]:i32
//!     compressedLen:u16  compressedPayload[compressedLen]
//! }
//! ```
//!
//! Every compressed payload expands to exactly
//! [`PAYLOAD_SIZE`](strata_voxel::PAYLOAD_SIZE) bytes. A column that does
//! not fit one frame is sent as several packets, each repeating the column
//! header.

use strata_voxel::chunk_serial::{MAX_DECLARED_COUNT, read_tickables};
use strata_voxel::{ByteReader, COLUMN_BYTES, Chunk, ChunkColumn, ColumnData, PAYLOAD_SIZE};

use crate::compression::{compress_block, decompress_exact};
use crate::framing::MAX_FRAME_LEN;
use crate::packet::{PacketError, PacketId};

/// Most chunks a single packet can declare.
pub const MAX_CHUNKS_PER_PACKET: usize = u8::MAX as usize;

/// Byte offset of `chunkCount` inside an encoded frame (after the packet id
/// and the two coordinates).
const COUNT_OFFSET: usize = 2 + 4 + 4;

/// A decoded chunk-data packet.
#[derive(Debug)]
pub struct ChunkDataPacket {
    /// Column chunk x.
    pub x: i32,
    /// Column chunk z.
    pub z: i32,
    /// Opaque-height record.
    pub column: ChunkColumn,
    /// `(chunk_y, chunk)` pairs.
    pub chunks: Vec<(i32, Chunk)>,
}

impl ChunkDataPacket {
    /// Converts into the form [`ChunkManager::insert_column`] merges.
    ///
    /// [`ChunkManager::insert_column`]: strata_voxel::ChunkManager::insert_column
    pub fn into_column_data(self) -> ColumnData {
        ColumnData {
            column: self.column,
            chunks: self.chunks,
            light_updates: Vec::new(),
        }
    }

    /// Appends the packet body to `out`.
    pub(crate) fn write_body(&self, out: &mut Vec<u8>) -> Result<(), PacketError> {
        if self.chunks.len() > MAX_CHUNKS_PER_PACKET {
            return Err(PacketError::FrameTooLarge(self.chunks.len()));
        }
        let start = out.len();
        write_header(out, self.x, self.z, &compress_block(self.column.heights()));
        out[start + 8] = self.chunks.len() as u8;
        for (cy, chunk) in &self.chunks {
            write_chunk_record(out, *cy, chunk);
        }
        Ok(())
    }

    /// Reads a packet body.
    pub(crate) fn read_body(reader: &mut ByteReader<'_>) -> Result<Self, PacketError> {
        let x = reader.read_i32()?;
        let z = reader.read_i32()?;
        let count = reader.read_u8()?;

        let column_len = reader.read_u16()? as usize;
        let column_raw = decompress_exact(reader.read_bytes(column_len)?, COLUMN_BYTES)?;
        let column = ChunkColumn::read_from(&mut ByteReader::new(&column_raw))?;

        let mut chunks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let cy = reader.read_i32()?;
            let block_count = reader.read_u16()?;
            if block_count > MAX_DECLARED_COUNT {
                return Err(PacketError::CorruptChunkPayload(format!(
                    "block count {block_count} exceeds chunk volume"
                )));
            }
            let tickable_count = reader.read_u16()?;
            let tickables = read_tickables(reader, tickable_count)?;
            let payload_len = reader.read_u16()? as usize;
            let payload = decompress_exact(reader.read_bytes(payload_len)?, PAYLOAD_SIZE)?;
            chunks.push((cy, Chunk::from_payload(&payload, block_count, tickables)?));
        }

        Ok(Self {
            x,
            z,
            column,
            chunks,
        })
    }
}

fn write_header(out: &mut Vec<u8>, x: i32, z: i32, compressed_column: &[u8]) {
    out.extend_from_slice(&x.to_be_bytes());
    out.extend_from_slice(&z.to_be_bytes());
    out.push(0);
    out.extend_from_slice(&(compressed_column.len() as u16).to_be_bytes());
    out.extend_from_slice(compressed_column);
}

/// Appends one chunk record to `out`.
fn write_chunk_record(out: &mut Vec<u8>, cy: i32, chunk: &Chunk) {
    let tickables = chunk.sorted_tickables();
    let compressed = compress_block(&chunk.payload_bytes());
    out.extend_from_slice(&cy.to_be_bytes());
    out.extend_from_slice(&chunk.block_count().to_be_bytes());
    out.extend_from_slice(&(tickables.len() as u16).to_be_bytes());
    for t in tickables {
        out.extend_from_slice(&t.to_be_bytes());
    }
    out.extend_from_slice(&(compressed.len() as u16).to_be_bytes());
    out.extend_from_slice(&compressed);
}

/// Encodes a column and its chunks as one or more complete chunk-data frame
/// bodies (packet id included), each within [`MAX_FRAME_LEN`] and
/// [`MAX_CHUNKS_PER_PACKET`]. Always returns at least one frame, so a column
/// with no chunks still delivers its height record.
pub fn encode_column_packets(
    x: i32,
    z: i32,
    column: &ChunkColumn,
    chunks: &[(i32, &Chunk)],
) -> Vec<Vec<u8>> {
    let mut header = Vec::with_capacity(64);
    header.extend_from_slice(&(PacketId::ChunkData as u16).to_be_bytes());
    write_header(&mut header, x, z, &compress_block(column.heights()));

    let mut frames = Vec::new();
    let mut current = header.clone();
    let mut count = 0usize;
    let mut record = Vec::new();
    for &(cy, chunk) in chunks {
        record.clear();
        write_chunk_record(&mut record, cy, chunk);
        if count > 0
            && (current.len() + record.len() > MAX_FRAME_LEN || count == MAX_CHUNKS_PER_PACKET)
        {
            current[COUNT_OFFSET] = count as u8;
            frames.push(std::mem::replace(&mut current, header.clone()));
            count = 0;
        }
        current.extend_from_slice(&record);
        count += 1;
    }
    current[COUNT_OFFSET] = count as u8;
    frames.push(current);
    frames
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strata_voxel::BlockId;

    use super::*;
    use crate::packet::Packet;

    fn decode_one(frame: &[u8]) -> ChunkDataPacket {
        match Packet::decode(frame).expect("decode") {
            Packet::ChunkData(data) => data,
            other => panic!("expected chunk data, got {other:?}"),
        }
    }

    /// Chunk with ten blocks and the two tickables at the extreme positions.
    fn make_scenario_chunk() -> Chunk {
        let mut chunk = Chunk::new();
        for i in 0..10 {
            chunk.set_block(i, 0, 0, BlockId(3));
        }
        chunk.set_meta(4, 0, 0, 9);
        chunk.set_sky_light(7, 7, 7, 11);
        chunk.add_tickable(1, 2, 3);
        chunk.add_tickable(15, 15, 15);
        chunk
    }

    #[test]
    fn test_protocol_scenario_survives() {
        let chunk = make_scenario_chunk();
        let mut column = ChunkColumn::new();
        column.set_tallest_opaque(2, 3, 200);

        let frames = encode_column_packets(-3, 12, &column, &[(4, &chunk)]);
        assert_eq!(frames.len(), 1);
        let packet = decode_one(&frames[0]);

        assert_eq!((packet.x, packet.z), (-3, 12));
        assert_eq!(packet.column, column);
        assert_eq!(packet.chunks.len(), 1);
        let (cy, decoded) = &packet.chunks[0];
        assert_eq!(*cy, 4);
        assert_eq!(decoded.block_count(), 10);
        let mut tickables = decoded.sorted_tickables();
        tickables.sort_unstable();
        assert_eq!(tickables, vec![0x01_0203, 0x0F_0F0F]);
        assert_eq!(decoded.block_ids(), chunk.block_ids());
        assert_eq!(decoded.meta_data(), chunk.meta_data());
        assert_eq!(decoded.light_data(), chunk.light_data());
        assert_eq!(decoded.layer_counts(), chunk.layer_counts());
    }

    #[test]
    fn test_empty_column_still_sends_heights() {
        let mut column = ChunkColumn::new();
        column.set_tallest_opaque(15, 15, 64);
        let frames = encode_column_packets(0, 0, &column, &[]);
        assert_eq!(frames.len(), 1);
        let packet = decode_one(&frames[0]);
        assert!(packet.chunks.is_empty());
        assert_eq!(packet.column.tallest_opaque(15, 15), 64);
    }

    #[test]
    fn test_large_column_is_split() {
        // Noisy payloads compress poorly, so sixteen of them exceed one frame.
        let chunks: Vec<Chunk> = (0..16)
            .map(|seed| {
                let mut chunk = Chunk::new();
                let mut state = 0x9E37_79B9u32.wrapping_mul(seed + 1);
                for i in 0..4096 {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    let (x, y, z) = Chunk::unindex(i);
                    chunk.set_block(x, y, z, BlockId((state % 100) as i8));
                    chunk.set_meta(x, y, z, (state >> 8) as u8);
                }
                chunk
            })
            .collect();
        let refs: Vec<(i32, &Chunk)> = chunks.iter().enumerate().map(|(i, c)| (i as i32, c)).collect();
        let column = ChunkColumn::new();

        let frames = encode_column_packets(5, 6, &column, &refs);
        assert!(frames.len() > 1);

        let mut seen = Vec::new();
        for frame in &frames {
            assert!(frame.len() <= MAX_FRAME_LEN);
            let packet = decode_one(frame);
            assert_eq!((packet.x, packet.z), (5, 6));
            for (cy, chunk) in packet.chunks {
                assert_eq!(chunk.block_ids(), chunks[cy as usize].block_ids());
                seen.push(cy);
            }
        }
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    fn scenario_body_with_chunk_header(block_count: u16, tickable_count: u16) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&(PacketId::ChunkData as u16).to_be_bytes());
        write_header(&mut frame, 0, 0, &compress_block(ChunkColumn::new().heights()));
        frame[COUNT_OFFSET] = 1;
        frame.extend_from_slice(&0i32.to_be_bytes());
        frame.extend_from_slice(&block_count.to_be_bytes());
        frame.extend_from_slice(&tickable_count.to_be_bytes());
        frame
    }

    #[test]
    fn test_oversize_counts_rejected() {
        let frame = scenario_body_with_chunk_header(4097, 0);
        assert!(matches!(
            Packet::decode(&frame),
            Err(PacketError::CorruptChunkPayload(_))
        ));

        let frame = scenario_body_with_chunk_header(10, 60_000);
        assert!(matches!(
            Packet::decode(&frame),
            Err(PacketError::CorruptChunkPayload(_))
        ));
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let mut frame = scenario_body_with_chunk_header(10, 0);
        let bogus = compress_block(&[0u8; 100]);
        frame.extend_from_slice(&(bogus.len() as u16).to_be_bytes());
        frame.extend_from_slice(&bogus);
        assert!(matches!(
            Packet::decode(&frame),
            Err(PacketError::CorruptChunkPayload(_))
        ));

        let mut frame = scenario_body_with_chunk_header(10, 0);
        frame.extend_from_slice(&4u16.to_be_bytes());
        frame.extend_from_slice(&[0xFF; 4]);
        assert!(matches!(
            Packet::decode(&frame),
            Err(PacketError::CorruptChunkPayload(_))
        ));
    }

    #[test]
    fn test_declared_length_beyond_frame_is_truncated() {
        let mut frame = scenario_body_with_chunk_header(10, 0);
        frame.extend_from_slice(&5000u16.to_be_bytes());
        frame.extend_from_slice(&[0; 10]);
        assert!(matches!(
            Packet::decode(&frame),
            Err(PacketError::Truncated { .. })
        ));
    }
}
