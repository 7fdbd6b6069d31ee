//! Chunked block storage: fixed-size chunks with derived metadata, column
//! height records, the chunk cache and its neighbor view, binary codecs, and
//! terrain generation.

pub mod bytes;
pub mod chunk;
pub mod chunk_field;
pub mod chunk_manager;
pub mod chunk_serial;
pub mod column;
pub mod coords;
pub mod generation;
pub mod registry;

pub use bytes::ByteReader;
pub use chunk::{
    ALL_DIRTY, CHUNK_AREA, CHUNK_SIZE, CHUNK_VOLUME, Chunk, MAX_LIGHT, MESH_DIRTY, NETWORK_DIRTY,
    SAVE_DIRTY,
};
pub use chunk_field::ChunkField;
pub use chunk_manager::{ChunkManager, ChunkProvider, ColumnData, NullProvider};
pub use chunk_serial::{ChunkCodecError, PAYLOAD_SIZE};
pub use column::{COLUMN_BYTES, ChunkColumn, WORLD_CHUNK_HEIGHT, WORLD_HEIGHT};
pub use coords::{Face, Vec3i};
pub use generation::{ColumnGenerator, NoiseTerrain, NoiseTerrainParams, TerrainGenerator, TerrainPalette};
pub use registry::{BlockDef, BlockId, BlockRegistry, RegistryError, Transparency};
