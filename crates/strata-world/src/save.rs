//! World save files: every resident column and chunk in one binary file.
//!
//! ## Layout (big-endian)
//!
//! ```text
//! magic "STRW"  version:u16  seed:u64
//! columnCount:u32  { x:i32 z:i32 heights[256] }*
//! chunkCount:u32   { x:i32 y:i32 z:i32 chunk record }*
//! ```
//!
//! A version 2 chunk record is the full [`Chunk::write_to`] record. Version 1
//! records have no tickable count or tickable list; their tickable sets are
//! rebuilt from the registry when the save is applied.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use strata_voxel::{
    ByteReader, COLUMN_BYTES, Chunk, ChunkCodecError, ChunkColumn, ColumnData, PAYLOAD_SIZE,
    SAVE_DIRTY, Vec3i,
};

use crate::world::{World, rebuild_chunk_tickables};

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

/// File magic.
pub const SAVE_MAGIC: [u8; 4] = *b"STRW";

/// Version written by [`encode_world`].
pub const CURRENT_SAVE_VERSION: u16 = 2;

/// Name of the save file inside the save directory.
pub const SAVE_FILE_NAME: &str = "world.strw";

const COLUMN_RECORD_SIZE: usize = 8 + COLUMN_BYTES;
const MIN_CHUNK_RECORD_SIZE: usize = 12 + 2 + PAYLOAD_SIZE;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while reading or writing a save file.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// I/O error reading or writing the save file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The file does not start with the save magic.
    #[error("not a world save (bad magic)")]
    InvalidMagic,
    /// The file was written by a newer or unknown format version.
    #[error("unsupported save version {0}")]
    UnsupportedVersion(u16),
    /// A column or chunk record could not be decoded.
    #[error("corrupt save record: {0}")]
    Codec(#[from] ChunkCodecError),
}

// ---------------------------------------------------------------------------
// Save structures
// ---------------------------------------------------------------------------

/// Header fields of a save file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveHeader {
    /// Format version the file was written with.
    pub version: u16,
    /// World seed.
    pub seed: u64,
}

/// A decoded save file.
#[derive(Debug)]
pub struct SaveFile {
    /// File header.
    pub header: SaveHeader,
    /// Column height records keyed by chunk `(x, z)`.
    pub columns: Vec<(i32, i32, ChunkColumn)>,
    /// Chunks keyed by chunk position.
    pub chunks: Vec<(Vec3i, Chunk)>,
}

impl SaveFile {
    /// Inserts every saved column into `world`, replacing resident data at
    /// the same positions. Returns the number of columns applied.
    pub fn apply(self, world: &mut World) -> usize {
        let rebuild = self.header.version < 2;
        let mut columns: FxHashMap<(i32, i32), ColumnData> = FxHashMap::default();
        for (x, z, column) in self.columns {
            columns.entry((x, z)).or_default().column = column;
        }
        for (pos, chunk) in self.chunks {
            columns
                .entry((pos.x, pos.z))
                .or_default()
                .chunks
                .push((pos.y, chunk));
        }

        let count = columns.len();
        for ((x, z), mut data) in columns {
            if rebuild {
                for (_, chunk) in &mut data.chunks {
                    rebuild_chunk_tickables(world.registry(), chunk);
                }
            }
            world.insert_column(x, z, data);
        }
        tracing::info!(
            "Applied save v{}: {} columns",
            self.header.version,
            count
        );
        count
    }
}

// ---------------------------------------------------------------------------
// Encode / Decode
// ---------------------------------------------------------------------------

/// Encodes every resident column and chunk of `world` in the current format.
/// Records are sorted by position so the output is deterministic.
pub fn encode_world(world: &World) -> Vec<u8> {
    let manager = world.chunk_manager();
    let mut columns: Vec<(&Vec3i, &ChunkColumn)> = manager.iter_columns().collect();
    columns.sort_unstable_by_key(|(pos, _)| **pos);
    let mut chunks: Vec<(&Vec3i, &Chunk)> = manager.iter().collect();
    chunks.sort_unstable_by_key(|(pos, _)| **pos);

    let mut out = Vec::with_capacity(
        18 + columns.len() * COLUMN_RECORD_SIZE + chunks.len() * (MIN_CHUNK_RECORD_SIZE + 2),
    );
    out.extend_from_slice(&SAVE_MAGIC);
    out.extend_from_slice(&CURRENT_SAVE_VERSION.to_be_bytes());
    out.extend_from_slice(&world.seed().to_be_bytes());

    out.extend_from_slice(&(columns.len() as u32).to_be_bytes());
    for (pos, column) in columns {
        out.extend_from_slice(&pos.x.to_be_bytes());
        out.extend_from_slice(&pos.z.to_be_bytes());
        column.write_to(&mut out);
    }

    out.extend_from_slice(&(chunks.len() as u32).to_be_bytes());
    for (pos, chunk) in chunks {
        out.extend_from_slice(&pos.x.to_be_bytes());
        out.extend_from_slice(&pos.y.to_be_bytes());
        out.extend_from_slice(&pos.z.to_be_bytes());
        chunk.write_to(&mut out);
    }
    out
}

/// Decodes a save file of any supported version.
///
/// # Errors
///
/// Returns [`SaveError`] on bad magic, unknown version, or a truncated or
/// corrupt record.
pub fn decode_save(data: &[u8]) -> Result<SaveFile, SaveError> {
    let mut reader = ByteReader::new(data);
    if reader.read_bytes(4)? != SAVE_MAGIC {
        return Err(SaveError::InvalidMagic);
    }
    let version = reader.read_u16()?;
    if version == 0 || version > CURRENT_SAVE_VERSION {
        return Err(SaveError::UnsupportedVersion(version));
    }
    let seed = reader.read_u64()?;

    let column_count = reader.read_u32()? as usize;
    let mut columns = Vec::with_capacity(column_count.min(reader.remaining() / COLUMN_RECORD_SIZE));
    for _ in 0..column_count {
        let x = reader.read_i32()?;
        let z = reader.read_i32()?;
        columns.push((x, z, ChunkColumn::read_from(&mut reader)?));
    }

    let chunk_count = reader.read_u32()? as usize;
    let mut chunks =
        Vec::with_capacity(chunk_count.min(reader.remaining() / MIN_CHUNK_RECORD_SIZE));
    for _ in 0..chunk_count {
        let pos = Vec3i::new(reader.read_i32()?, reader.read_i32()?, reader.read_i32()?);
        let chunk = if version >= 2 {
            Chunk::read_from(&mut reader)?
        } else {
            Chunk::read_from_without_tickables(&mut reader)?
        };
        chunks.push((pos, chunk));
    }

    if reader.remaining() > 0 {
        tracing::warn!("Ignoring {} trailing bytes in save file", reader.remaining());
    }

    Ok(SaveFile {
        header: SaveHeader { version, seed },
        columns,
        chunks,
    })
}

// ---------------------------------------------------------------------------
// Write / Load
// ---------------------------------------------------------------------------

/// Writes `world` to `dir/world.strw` atomically (temp file, then rename) and
/// clears the save-dirty flag on every chunk. Returns the path written.
///
/// # Errors
///
/// Returns [`SaveError::Io`] if the directory or file cannot be written.
pub fn save_world(world: &mut World, dir: &Path) -> Result<PathBuf, SaveError> {
    let bytes = encode_world(world);
    std::fs::create_dir_all(dir)?;
    let path = dir.join(SAVE_FILE_NAME);
    let tmp = dir.join(format!("{SAVE_FILE_NAME}.tmp"));
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, &path)?;

    world.chunk_manager_mut().clear_dirty_all(SAVE_DIRTY);
    tracing::info!(
        "Saved {} chunks ({} bytes) to {}",
        world.chunk_manager().loaded_count(),
        bytes.len(),
        path.display()
    );
    Ok(path)
}

/// Reads `dir/world.strw`. Returns `Ok(None)` if no save exists yet.
///
/// # Errors
///
/// Returns [`SaveError`] if the file exists but cannot be read or decoded.
pub fn load_save(dir: &Path) -> Result<Option<SaveFile>, SaveError> {
    let path = dir.join(SAVE_FILE_NAME);
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    decode_save(&data).map(Some)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_voxel::{BlockId, NullProvider};

    use super::*;
    use crate::registry::{Registry, StandardBlocks};

    fn make_world(seed: u64) -> (World, StandardBlocks) {
        let (registry, blocks) = Registry::standard().expect("standard registry");
        let world = World::new(Arc::new(registry), Box::new(NullProvider), seed);
        (world, blocks)
    }

    /// A world with one empty column at (0, 0) holding a stone floor and a
    /// grass block at (3, 5, 7).
    fn make_populated_world() -> (World, StandardBlocks) {
        let (mut world, blocks) = make_world(99);
        world.insert_column(0, 0, ColumnData::empty());
        for x in 0..16 {
            for z in 0..16 {
                world.set_block(Vec3i::new(x, 0, z), blocks.stone);
            }
        }
        world.set_block(Vec3i::new(3, 1, 7), blocks.dirt);
        world.set_block(Vec3i::new(3, 2, 7), blocks.grass);
        (world, blocks)
    }

    #[test]
    fn test_v2_round_trip() {
        let (world, blocks) = make_populated_world();
        let bytes = encode_world(&world);
        let save = decode_save(&bytes).expect("decode");

        assert_eq!(save.header, SaveHeader { version: 2, seed: 99 });
        assert_eq!(save.columns.len(), 1);
        assert_eq!(save.chunks.len(), 1);

        let (_, _, column) = &save.columns[0];
        assert_eq!(column, world.chunk_manager().column(0, 0).expect("column"));

        let (pos, chunk) = &save.chunks[0];
        assert_eq!(*pos, Vec3i::ZERO);
        let original = world.chunk_manager().get_chunk(Vec3i::ZERO);
        assert_eq!(chunk.block_ids(), original.block_ids());
        assert_eq!(chunk.light_data(), original.light_data());
        assert_eq!(chunk.meta_data(), original.meta_data());
        assert_eq!(chunk.layer_counts(), original.layer_counts());
        assert_eq!(chunk.block_count(), original.block_count());
        assert_eq!(chunk.tickables(), original.tickables());
        assert!(chunk.is_tickable(3, 2, 7));
        assert_eq!(chunk.get_block(3, 2, 7), blocks.grass);
    }

    #[test]
    fn test_v1_decode_rebuilds_tickables() {
        let (world, blocks) = make_populated_world();
        let chunk = world.chunk_manager().get_chunk(Vec3i::ZERO);
        let column = world.chunk_manager().column(0, 0).expect("column");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"STRW");
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&5u64.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        column.write_to(&mut bytes);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        for _ in 0..3 {
            bytes.extend_from_slice(&0i32.to_be_bytes());
        }
        bytes.extend_from_slice(&chunk.block_count().to_be_bytes());
        chunk.write_payload(&mut bytes);

        let save = decode_save(&bytes).expect("decode v1");
        assert_eq!(save.header.version, 1);
        assert!(save.chunks[0].1.tickables().is_empty());

        let (mut restored, _) = make_world(5);
        assert_eq!(save.apply(&mut restored), 1);
        let restored_chunk = restored.chunk_manager().get_chunk(Vec3i::ZERO);
        assert!(restored_chunk.is_tickable(3, 2, 7));
        assert_eq!(restored_chunk.tickables().len(), 1);
        assert_eq!(restored.get_block(Vec3i::new(3, 2, 7)), blocks.grass);
        assert_eq!(restored.get_block(Vec3i::new(9, 0, 9)), blocks.stone);
    }

    #[test]
    fn test_bad_magic_and_version_rejected() {
        let mut bytes = b"NOPE".to_vec();
        bytes.extend_from_slice(&[0; 32]);
        assert!(matches!(decode_save(&bytes), Err(SaveError::InvalidMagic)));

        let mut bytes = b"STRW".to_vec();
        bytes.extend_from_slice(&9u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 16]);
        assert!(matches!(
            decode_save(&bytes),
            Err(SaveError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_save_is_codec_error() {
        let (world, _) = make_populated_world();
        let bytes = encode_world(&world);
        let cut = &bytes[..bytes.len() - 100];
        assert!(matches!(decode_save(cut), Err(SaveError::Codec(_))));
    }

    #[test]
    fn test_huge_declared_count_does_not_allocate() {
        let mut bytes = b"STRW".to_vec();
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(decode_save(&bytes), Err(SaveError::Codec(_))));
    }

    #[test]
    fn test_save_and_load_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut world, blocks) = make_populated_world();
        assert!(world.chunk_manager().iter_dirty(SAVE_DIRTY).next().is_some());

        let path = save_world(&mut world, dir.path()).expect("save");
        assert_eq!(path, dir.path().join(SAVE_FILE_NAME));
        assert!(!dir.path().join("world.strw.tmp").exists());
        assert_eq!(world.chunk_manager().iter_dirty(SAVE_DIRTY).count(), 0);

        let save = load_save(dir.path()).expect("load").expect("present");
        let (mut restored, _) = make_world(0);
        save.apply(&mut restored);
        assert_eq!(restored.get_block(Vec3i::new(3, 1, 7)), blocks.dirt);
        assert_eq!(restored.get_block(Vec3i::new(3, 3, 7)), BlockId::AIR);
    }

    #[test]
    fn test_load_missing_save_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_save(dir.path()).expect("load").is_none());
    }
}
