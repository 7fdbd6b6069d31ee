//! Central owner for all loaded chunks and columns, keyed by [`Vec3i`].
//!
//! The [`ChunkManager`] provides O(1) chunk lookup, insert, and removal
//! using an [`FxHashMap`](rustc_hash::FxHashMap). Absent chunks are never
//! reported as missing on the read path: [`ChunkManager::get_chunk`] hands out
//! a manager-owned empty sentinel instead, so neighbor queries need no
//! special cases. Columns that are not resident are obtained through a
//! [`ChunkProvider`], which generates them locally on a server and requests
//! them over the network on a client.
//!
//! Inside a loaded column, an absent chunk stands for open sky: all air with
//! full sky light. Generation and the wire only carry the chunks below the top
//! of the terrain.

use rustc_hash::FxHashMap;

use crate::chunk::{Chunk, MAX_LIGHT, MESH_DIRTY};
use crate::column::{ChunkColumn, WORLD_CHUNK_HEIGHT};
use crate::coords::Vec3i;

/// A freshly produced column: height record, chunks by chunk-y, and the
/// world positions that still need a light propagation pass.
#[derive(Debug, Default)]
pub struct ColumnData {
    /// Opaque-height record.
    pub column: ChunkColumn,
    /// `(chunk_y, chunk)` pairs; chunk-y outside `0..16` is ignored.
    pub chunks: Vec<(i32, Chunk)>,
    /// World positions queued for light spreading.
    pub light_updates: Vec<Vec3i>,
}

impl ColumnData {
    /// A column with no chunks and a zeroed height record.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Source of columns that are not yet resident.
pub trait ChunkProvider: Send {
    /// Produces the column at chunk coordinates `(x, z)`, or `None` if it is
    /// not available right now (e.g. requested from a server and still in
    /// flight).
    fn provide_column(&mut self, x: i32, z: i32) -> Option<ColumnData>;
}

/// Provider that never produces anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProvider;

impl ChunkProvider for NullProvider {
    fn provide_column(&mut self, _x: i32, _z: i32) -> Option<ColumnData> {
        None
    }
}

/// Owns all currently-loaded chunks and columns.
///
/// This is the single authority for which chunks exist in memory.
pub struct ChunkManager {
    chunks: FxHashMap<Vec3i, Chunk>,
    columns: FxHashMap<Vec3i, ChunkColumn>,
    /// Returned for every absent position; never handed out mutably.
    empty: Chunk,
    provider: Box<dyn ChunkProvider>,
    pending_light: Vec<Vec3i>,
}

impl ChunkManager {
    /// Creates an empty manager backed by `provider`.
    pub fn new(provider: Box<dyn ChunkProvider>) -> Self {
        Self {
            chunks: FxHashMap::default(),
            columns: FxHashMap::default(),
            empty: Chunk::new(),
            provider,
            pending_light: Vec::new(),
        }
    }

    /// Replaces the column provider.
    pub fn set_provider(&mut self, provider: Box<dyn ChunkProvider>) {
        self.provider = provider;
    }

    /// The chunk at chunk position `pos`, or the empty sentinel when absent.
    pub fn get_chunk(&self, pos: Vec3i) -> &Chunk {
        self.chunks.get(&pos).unwrap_or(&self.empty)
    }

    /// Mutable access to a resident chunk.
    pub fn get_chunk_mut(&mut self, pos: Vec3i) -> Option<&mut Chunk> {
        self.chunks.get_mut(&pos)
    }

    /// Returns `true` if `chunk` is the manager's sentinel.
    pub fn is_sentinel(&self, chunk: &Chunk) -> bool {
        std::ptr::eq(chunk, &self.empty)
    }

    /// The shared empty sentinel.
    pub fn sentinel(&self) -> &Chunk {
        &self.empty
    }

    /// Mutable access to the chunk at `pos`, creating an open-sky chunk if
    /// its column is loaded but the chunk itself is absent.
    ///
    /// Returns `None` when the column is not loaded or `pos.y` is outside
    /// the world.
    pub fn ensure_chunk(&mut self, pos: Vec3i) -> Option<&mut Chunk> {
        if !(0..WORLD_CHUNK_HEIGHT).contains(&pos.y) || !self.contains_column(pos.x, pos.z) {
            return None;
        }
        if !self.chunks.contains_key(&pos) {
            self.chunks.insert(pos, Chunk::with_sky_light(MAX_LIGHT));
            self.rebuild_neighbor_fields(pos);
        }
        self.chunks.get_mut(&pos)
    }

    /// The chunk at `pos`, asking the provider for its column first if the
    /// column is not resident.
    pub fn get_or_load_chunk(&mut self, pos: Vec3i) -> &Chunk {
        if !self.contains_column(pos.x, pos.z) {
            self.load_column(pos.x, pos.z);
        }
        self.get_chunk(pos)
    }

    /// Makes the column at `(x, z)` resident via the provider.
    ///
    /// Returns `true` if the column is resident afterwards.
    pub fn load_column(&mut self, x: i32, z: i32) -> bool {
        if self.contains_column(x, z) {
            return true;
        }
        match self.provider.provide_column(x, z) {
            Some(data) => {
                self.insert_column(x, z, data);
                true
            }
            None => false,
        }
    }

    /// Merges a column and its chunks, replacing anything already resident
    /// at those positions, and marks the neighbors of every inserted chunk
    /// for remeshing.
    pub fn insert_column(&mut self, x: i32, z: i32, data: ColumnData) {
        let ColumnData {
            column,
            chunks,
            light_updates,
        } = data;
        self.columns.insert(Vec3i::new(x, 0, z), column);
        for (cy, chunk) in chunks {
            if !(0..WORLD_CHUNK_HEIGHT).contains(&cy) {
                tracing::warn!("Dropping chunk ({x}, {cy}, {z}) outside world height");
                continue;
            }
            let pos = Vec3i::new(x, cy, z);
            self.chunks.insert(pos, chunk);
            self.rebuild_neighbor_fields(pos);
        }
        self.pending_light.extend(light_updates);
    }

    /// Marks the 26 resident neighbors of `pos` as needing a remesh.
    pub fn rebuild_neighbor_fields(&mut self, pos: Vec3i) {
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    if let Some(chunk) = self.chunks.get_mut(&pos.offset(dx, dy, dz)) {
                        chunk.mark_dirty(MESH_DIRTY);
                    }
                }
            }
        }
    }

    /// Removes the column at `(x, z)` and all of its chunks.
    ///
    /// Returns the removed column and chunks, or `None` if it was not loaded.
    pub fn unload_column(&mut self, x: i32, z: i32) -> Option<ColumnData> {
        let column = self.columns.remove(&Vec3i::new(x, 0, z))?;
        let chunks = (0..WORLD_CHUNK_HEIGHT)
            .filter_map(|cy| {
                self.chunks
                    .remove(&Vec3i::new(x, cy, z))
                    .map(|chunk| (cy, chunk))
            })
            .collect();
        Some(ColumnData {
            column,
            chunks,
            light_updates: Vec::new(),
        })
    }

    /// The height record of column `(x, z)`.
    pub fn column(&self, x: i32, z: i32) -> Option<&ChunkColumn> {
        self.columns.get(&Vec3i::new(x, 0, z))
    }

    /// Mutable height record of column `(x, z)`.
    pub fn column_mut(&mut self, x: i32, z: i32) -> Option<&mut ChunkColumn> {
        self.columns.get_mut(&Vec3i::new(x, 0, z))
    }

    /// Returns `true` if a chunk is resident at `pos`.
    pub fn contains_chunk(&self, pos: Vec3i) -> bool {
        self.chunks.contains_key(&pos)
    }

    /// Returns `true` if column `(x, z)` is resident.
    pub fn contains_column(&self, x: i32, z: i32) -> bool {
        self.columns.contains_key(&Vec3i::new(x, 0, z))
    }

    /// Resident chunks of column `(x, z)` in ascending chunk-y order.
    pub fn column_chunks(&self, x: i32, z: i32) -> impl Iterator<Item = (i32, &Chunk)> {
        (0..WORLD_CHUNK_HEIGHT)
            .filter_map(move |cy| self.chunks.get(&Vec3i::new(x, cy, z)).map(|c| (cy, c)))
    }

    /// Number of currently loaded chunks.
    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of currently loaded columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Iterates over all loaded `(position, chunk)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec3i, &Chunk)> {
        self.chunks.iter()
    }

    /// Mutable iteration over all loaded `(position, chunk)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Vec3i, &mut Chunk)> {
        self.chunks.iter_mut()
    }

    /// Iterates over all loaded `(key, column)` pairs (keys have `y == 0`).
    pub fn iter_columns(&self) -> impl Iterator<Item = (&Vec3i, &ChunkColumn)> {
        self.columns.iter()
    }

    /// Iterates over positions of chunks that have the given dirty flag set.
    pub fn iter_dirty(&self, flag: u8) -> impl Iterator<Item = &Vec3i> {
        self.chunks
            .iter()
            .filter(move |(_, chunk)| chunk.is_dirty(flag))
            .map(|(pos, _)| pos)
    }

    /// Clears `flag` on every loaded chunk.
    pub fn clear_dirty_all(&mut self, flag: u8) {
        for chunk in self.chunks.values_mut() {
            chunk.clear_dirty(flag);
        }
    }

    /// Clears `flag` on every resident chunk of column `(x, z)`.
    pub fn clear_column_dirty(&mut self, x: i32, z: i32, flag: u8) {
        for cy in 0..WORLD_CHUNK_HEIGHT {
            if let Some(chunk) = self.chunks.get_mut(&Vec3i::new(x, cy, z)) {
                chunk.clear_dirty(flag);
            }
        }
    }

    /// Drains world positions queued for light propagation by inserted columns.
    pub fn take_light_updates(&mut self) -> Vec<Vec3i> {
        std::mem::take(&mut self.pending_light)
    }
}

impl Default for ChunkManager {
    fn default() -> Self {
        Self::new(Box::new(NullProvider))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{NETWORK_DIRTY, SAVE_DIRTY};
    use crate::registry::BlockId;

    struct CountingProvider {
        calls: usize,
    }

    impl ChunkProvider for CountingProvider {
        fn provide_column(&mut self, _x: i32, _z: i32) -> Option<ColumnData> {
            self.calls += 1;
            let mut chunk = Chunk::new();
            chunk.set_block(0, 0, 0, BlockId(1));
            let mut column = ChunkColumn::new();
            column.set_tallest_opaque(0, 0, 0);
            Some(ColumnData {
                column,
                chunks: vec![(0, chunk)],
                light_updates: vec![Vec3i::new(1, 2, 3)],
            })
        }
    }

    fn column_with(chunks: Vec<(i32, Chunk)>) -> ColumnData {
        ColumnData {
            column: ChunkColumn::new(),
            chunks,
            light_updates: Vec::new(),
        }
    }

    #[test]
    fn test_absent_chunk_is_sentinel_air() {
        let mut mgr = ChunkManager::default();
        let chunk = mgr.get_chunk(Vec3i::new(5, 3, -7));
        assert!(mgr.is_sentinel(chunk));
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    assert_eq!(chunk.get_block(x, y, z), BlockId::AIR);
                }
            }
        }
        assert!(mgr.get_chunk_mut(Vec3i::new(5, 3, -7)).is_none());
    }

    #[test]
    fn test_insert_column_then_get() {
        let mut mgr = ChunkManager::default();
        let mut chunk = Chunk::new();
        chunk.set_block(1, 2, 3, BlockId(7));
        mgr.insert_column(2, -1, column_with(vec![(4, chunk)]));

        assert!(mgr.contains_column(2, -1));
        assert!(mgr.contains_chunk(Vec3i::new(2, 4, -1)));
        let got = mgr.get_chunk(Vec3i::new(2, 4, -1));
        assert!(!mgr.is_sentinel(got));
        assert_eq!(got.get_block(1, 2, 3), BlockId(7));
        assert_eq!(mgr.loaded_count(), 1);
        assert_eq!(mgr.column_count(), 1);
    }

    #[test]
    fn test_insert_marks_neighbors_mesh_dirty() {
        let mut mgr = ChunkManager::default();
        mgr.insert_column(0, 0, column_with(vec![(1, Chunk::new())]));
        mgr.clear_dirty_all(MESH_DIRTY);

        mgr.insert_column(1, 1, column_with(vec![(2, Chunk::new())]));
        assert!(mgr.get_chunk(Vec3i::new(0, 1, 0)).is_dirty(MESH_DIRTY));
        let dirty: Vec<_> = mgr.iter_dirty(MESH_DIRTY).copied().collect();
        assert_eq!(dirty, vec![Vec3i::new(0, 1, 0)]);
    }

    #[test]
    fn test_out_of_world_chunks_are_dropped() {
        let mut mgr = ChunkManager::default();
        mgr.insert_column(0, 0, column_with(vec![(-1, Chunk::new()), (16, Chunk::new())]));
        assert_eq!(mgr.loaded_count(), 0);
        assert!(mgr.contains_column(0, 0));
    }

    #[test]
    fn test_load_column_uses_provider_once() {
        let mut mgr = ChunkManager::new(Box::new(CountingProvider { calls: 0 }));
        assert_eq!(
            mgr.get_or_load_chunk(Vec3i::new(3, 0, 3)).get_block(0, 0, 0),
            BlockId(1)
        );
        assert!(mgr.load_column(3, 3));
        assert_eq!(mgr.take_light_updates(), vec![Vec3i::new(1, 2, 3)]);
        assert!(mgr.take_light_updates().is_empty());
    }

    #[test]
    fn test_null_provider_leaves_column_absent() {
        let mut mgr = ChunkManager::default();
        assert!(!mgr.load_column(0, 0));
        assert!(mgr.get_or_load_chunk(Vec3i::new(0, 0, 0)).is_empty());
        assert!(!mgr.contains_column(0, 0));
        assert!(mgr.is_sentinel(mgr.get_chunk(Vec3i::new(0, 0, 0))));
    }

    #[test]
    fn test_ensure_chunk_requires_loaded_column() {
        let mut mgr = ChunkManager::default();
        assert!(mgr.ensure_chunk(Vec3i::new(0, 5, 0)).is_none());

        mgr.insert_column(0, 0, ColumnData::empty());
        let chunk = mgr.ensure_chunk(Vec3i::new(0, 5, 0)).unwrap();
        assert_eq!(chunk.sky_light(0, 0, 0), 15);
        assert!(mgr.ensure_chunk(Vec3i::new(0, 16, 0)).is_none());
        assert!(mgr.contains_chunk(Vec3i::new(0, 5, 0)));
    }

    #[test]
    fn test_unload_column_returns_chunks() {
        let mut mgr = ChunkManager::default();
        mgr.insert_column(
            4,
            4,
            column_with(vec![(0, Chunk::new()), (3, Chunk::new())]),
        );
        let removed = mgr.unload_column(4, 4).unwrap();
        let ys: Vec<i32> = removed.chunks.iter().map(|(y, _)| *y).collect();
        assert_eq!(ys, vec![0, 3]);
        assert_eq!(mgr.loaded_count(), 0);
        assert!(mgr.unload_column(4, 4).is_none());
    }

    #[test]
    fn test_get_chunk_mut_edits_resident_chunk() {
        let mut mgr = ChunkManager::default();
        mgr.insert_column(0, 0, column_with(vec![(0, Chunk::new())]));
        let chunk = mgr.get_chunk_mut(Vec3i::new(0, 0, 0)).unwrap();
        chunk.set_block(0, 0, 0, BlockId(3));
        assert!(chunk.is_dirty(SAVE_DIRTY | NETWORK_DIRTY));
        assert_eq!(mgr.get_chunk(Vec3i::ZERO).block_count(), 1);
        let listed: Vec<i32> = mgr.column_chunks(0, 0).map(|(y, _)| y).collect();
        assert_eq!(listed, vec![0]);
    }

    #[test]
    fn test_clear_column_dirty_leaves_other_columns() {
        let mut mgr = ChunkManager::default();
        for x in 0..2 {
            let mut chunk = Chunk::new();
            chunk.set_block(0, 0, 0, BlockId(3));
            mgr.insert_column(x, 0, column_with(vec![(0, chunk)]));
        }
        mgr.clear_column_dirty(0, 0, NETWORK_DIRTY);

        let dirty: Vec<Vec3i> = mgr.iter_dirty(NETWORK_DIRTY).copied().collect();
        assert_eq!(dirty, vec![Vec3i::new(1, 0, 0)]);
        assert!(mgr.get_chunk(Vec3i::ZERO).is_dirty(SAVE_DIRTY));
    }
}
