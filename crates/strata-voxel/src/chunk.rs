//! Fixed-size chunk storage for 16×16×16 block volumes.
//!
//! A [`Chunk`] stores one [`BlockId`], one metadata byte and one packed light
//! byte per cell, plus derived metadata kept in step with every write: the
//! non-air block count, per-layer counts, the tallest non-air block of each
//! vertical line, and the set of tickable positions.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::registry::BlockId;

/// Side length of a chunk in blocks.
pub const CHUNK_SIZE: usize = 16;

/// Number of vertical lines in a chunk (16²).
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

/// Total number of blocks in a chunk (16³).
pub const CHUNK_VOLUME: usize = CHUNK_AREA * CHUNK_SIZE;

/// Dirty-flag bit: chunk mesh needs rebuilding.
pub const MESH_DIRTY: u8 = 0b0000_0001;
/// Dirty-flag bit: chunk needs saving to disk.
pub const SAVE_DIRTY: u8 = 0b0000_0010;
/// Dirty-flag bit: chunk needs network sync.
pub const NETWORK_DIRTY: u8 = 0b0000_0100;

/// All dirty flags combined.
pub const ALL_DIRTY: u8 = MESH_DIRTY | SAVE_DIRTY | NETWORK_DIRTY;

/// Maximum light level for either channel.
pub const MAX_LIGHT: u8 = 15;

/// A 16³ block volume with incrementally maintained metadata.
///
/// Coordinates are chunk-local `i32` values; anything outside `[0, 16)` reads
/// as [`BlockId::NONE`] and is ignored on write. Chunks are never cloned: the
/// owning manager hands out borrows only.
pub struct Chunk {
    /// Block ids, indexed `x + z*16 + y*256`.
    ids: Box<[i8; CHUNK_VOLUME]>,
    /// Per-block auxiliary state (fluid level, door half, ...).
    meta: Box<[u8; CHUNK_VOLUME]>,
    /// Packed light: sky in the high nibble, block light in the low nibble.
    light: Box<[u8; CHUNK_VOLUME]>,
    /// Non-air count per horizontal slice.
    layer_counts: [u16; CHUNK_SIZE],
    /// Local y of the tallest non-air block per `(x, z)`, or -1.
    tallest: [i8; CHUNK_AREA],
    /// Packed local positions (`x<<16 | y<<8 | z`) of tickable blocks.
    tickables: FxHashSet<i32>,
    /// Number of non-air blocks.
    block_count: u16,
    /// Bitfield of dirty flags.
    dirty: u8,
    /// Monotonically increasing version counter, incremented on each mutation.
    version: u64,
}

impl Chunk {
    /// Creates a new chunk filled with air and no light.
    pub fn new() -> Self {
        Self {
            ids: Box::new([0; CHUNK_VOLUME]),
            meta: Box::new([0; CHUNK_VOLUME]),
            light: Box::new([0; CHUNK_VOLUME]),
            layer_counts: [0; CHUNK_SIZE],
            tallest: [-1; CHUNK_AREA],
            tickables: FxHashSet::default(),
            block_count: 0,
            dirty: 0,
            version: 0,
        }
    }

    /// Creates an air chunk with every cell at the given sky light level.
    pub fn with_sky_light(level: u8) -> Self {
        let mut chunk = Self::new();
        chunk.light.fill(level.min(MAX_LIGHT) << 4);
        chunk
    }

    /// Converts local `(x, y, z)` to a linear index (x fastest, then z, then y).
    pub const fn index(x: usize, y: usize, z: usize) -> usize {
        x + z * CHUNK_SIZE + y * CHUNK_AREA
    }

    /// Inverse of [`Chunk::index`].
    pub const fn unindex(index: usize) -> (i32, i32, i32) {
        (
            (index % CHUNK_SIZE) as i32,
            (index / CHUNK_AREA) as i32,
            ((index / CHUNK_SIZE) % CHUNK_SIZE) as i32,
        )
    }

    /// Packs a local position into the tickable-set representation.
    pub const fn pack_local(x: i32, y: i32, z: i32) -> i32 {
        (x << 16) | (y << 8) | z
    }

    /// Unpacks a tickable-set entry into `(x, y, z)`.
    pub const fn unpack_local(packed: i32) -> (i32, i32, i32) {
        ((packed >> 16) & 0xFF, (packed >> 8) & 0xFF, packed & 0xFF)
    }

    /// Returns `true` if `(x, y, z)` lies inside `[0, 16)³`.
    pub const fn in_bounds(x: i32, y: i32, z: i32) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < CHUNK_SIZE
            && (y as usize) < CHUNK_SIZE
            && (z as usize) < CHUNK_SIZE
    }

    fn checked_index(x: i32, y: i32, z: i32) -> Option<usize> {
        Self::in_bounds(x, y, z).then(|| Self::index(x as usize, y as usize, z as usize))
    }

    /// Returns the block at `(x, y, z)`, or [`BlockId::NONE`] if out of bounds.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockId {
        match Self::checked_index(x, y, z) {
            Some(i) => BlockId(self.ids[i]),
            None => BlockId::NONE,
        }
    }

    /// Writes a block and updates the derived counts and height table.
    ///
    /// Returns the previous id, or [`BlockId::NONE`] when the write was
    /// rejected (out of bounds, or `id` is itself NONE). Writing the id a cell
    /// already holds changes nothing.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> BlockId {
        if id.is_none() {
            return BlockId::NONE;
        }
        let Some(i) = Self::checked_index(x, y, z) else {
            tracing::trace!("Chunk::set_block out of bounds: ({}, {}, {})", x, y, z);
            return BlockId::NONE;
        };
        let previous = BlockId(self.ids[i]);
        if previous == id {
            return previous;
        }
        self.ids[i] = id.0;

        let layer = y as usize;
        let column = x as usize + z as usize * CHUNK_SIZE;
        match (previous.is_air(), id.is_air()) {
            (true, false) => {
                self.block_count += 1;
                self.layer_counts[layer] += 1;
                if y as i8 > self.tallest[column] {
                    self.tallest[column] = y as i8;
                }
            }
            (false, true) => {
                self.block_count = self.block_count.saturating_sub(1);
                self.layer_counts[layer] = self.layer_counts[layer].saturating_sub(1);
                if y as i8 == self.tallest[column] {
                    self.tallest[column] = self.scan_tallest(x as usize, z as usize, layer);
                }
            }
            _ => {}
        }

        self.touch();
        previous
    }

    /// Finds the tallest non-air block strictly below `below` in line `(x, z)`.
    fn scan_tallest(&self, x: usize, z: usize, below: usize) -> i8 {
        (0..below)
            .rev()
            .find(|&y| self.ids[Self::index(x, y, z)] != 0)
            .map_or(-1, |y| y as i8)
    }

    /// Returns the metadata byte at `(x, y, z)` (0 when out of bounds).
    pub fn get_meta(&self, x: i32, y: i32, z: i32) -> u8 {
        Self::checked_index(x, y, z).map_or(0, |i| self.meta[i])
    }

    /// Sets the metadata byte at `(x, y, z)`.
    pub fn set_meta(&mut self, x: i32, y: i32, z: i32, meta: u8) {
        if let Some(i) = Self::checked_index(x, y, z)
            && self.meta[i] != meta
        {
            self.meta[i] = meta;
            self.touch();
        }
    }

    /// Returns the sky light level at `(x, y, z)`.
    ///
    /// Out-of-bounds positions report full sky light.
    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        Self::checked_index(x, y, z).map_or(MAX_LIGHT, |i| self.light[i] >> 4)
    }

    /// Sets the sky light level at `(x, y, z)` (clamped to 15).
    pub fn set_sky_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if let Some(i) = Self::checked_index(x, y, z) {
            let packed = (self.light[i] & 0x0F) | (level.min(MAX_LIGHT) << 4);
            if packed != self.light[i] {
                self.light[i] = packed;
                self.touch();
            }
        }
    }

    /// Returns the block light level at `(x, y, z)`.
    pub fn block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        Self::checked_index(x, y, z).map_or(0, |i| self.light[i] & 0x0F)
    }

    /// Sets the block light level at `(x, y, z)` (clamped to 15).
    pub fn set_block_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if let Some(i) = Self::checked_index(x, y, z) {
            let packed = (self.light[i] & 0xF0) | level.min(MAX_LIGHT);
            if packed != self.light[i] {
                self.light[i] = packed;
                self.touch();
            }
        }
    }

    /// Marks `(x, y, z)` as tickable. Returns `true` if it was newly added.
    pub fn add_tickable(&mut self, x: i32, y: i32, z: i32) -> bool {
        Self::in_bounds(x, y, z) && self.tickables.insert(Self::pack_local(x, y, z))
    }

    /// Removes `(x, y, z)` from the tickable set. Returns `true` if present.
    pub fn remove_tickable(&mut self, x: i32, y: i32, z: i32) -> bool {
        Self::in_bounds(x, y, z) && self.tickables.remove(&Self::pack_local(x, y, z))
    }

    /// Returns `true` if `(x, y, z)` is in the tickable set.
    pub fn is_tickable(&self, x: i32, y: i32, z: i32) -> bool {
        Self::in_bounds(x, y, z) && self.tickables.contains(&Self::pack_local(x, y, z))
    }

    /// The packed tickable positions.
    pub fn tickables(&self) -> &FxHashSet<i32> {
        &self.tickables
    }

    /// Local y of the tallest non-air block at `(x, z)`, or -1 if none.
    pub fn tallest_block(&self, x: i32, z: i32) -> i8 {
        if Self::in_bounds(x, 0, z) {
            self.tallest[x as usize + z as usize * CHUNK_SIZE]
        } else {
            -1
        }
    }

    /// Number of non-air blocks in slice `y` (0 when out of range).
    pub fn layer_count(&self, y: i32) -> u16 {
        if Self::in_bounds(0, y, 0) {
            self.layer_counts[y as usize]
        } else {
            0
        }
    }

    /// Returns `true` if slice `y` contains only air.
    pub fn is_layer_empty(&self, y: i32) -> bool {
        self.layer_count(y) == 0
    }

    /// Number of non-air blocks.
    pub fn block_count(&self) -> u16 {
        self.block_count
    }

    /// Returns `true` if the chunk holds no non-air blocks.
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// Returns the current dirty flags.
    pub fn dirty_flags(&self) -> u8 {
        self.dirty
    }

    /// Returns `true` if the specified dirty flag (or combination) is set.
    pub fn is_dirty(&self, flag: u8) -> bool {
        self.dirty & flag == flag
    }

    /// Mark specific dirty flags.
    pub fn mark_dirty(&mut self, flags: u8) {
        self.dirty |= flags;
    }

    /// Clears the specified dirty flag bits.
    pub fn clear_dirty(&mut self, flags: u8) {
        self.dirty &= !flags;
    }

    /// Returns the current version counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Raw block id array.
    pub fn block_ids(&self) -> &[i8; CHUNK_VOLUME] {
        &self.ids
    }

    /// Raw metadata array.
    pub fn meta_data(&self) -> &[u8; CHUNK_VOLUME] {
        &self.meta
    }

    /// Raw packed light array.
    pub fn light_data(&self) -> &[u8; CHUNK_VOLUME] {
        &self.light
    }

    /// Per-layer non-air counts.
    pub fn layer_counts(&self) -> &[u16; CHUNK_SIZE] {
        &self.layer_counts
    }

    fn touch(&mut self) {
        self.dirty |= ALL_DIRTY;
        self.version += 1;
    }

    /// Assembles a chunk from decoded arrays.
    ///
    /// `block_count` and `layer_counts` are trusted as given; only the
    /// tallest-block table is rebuilt by scanning.
    pub(crate) fn from_raw_parts(
        ids: Box<[i8; CHUNK_VOLUME]>,
        light: Box<[u8; CHUNK_VOLUME]>,
        meta: Box<[u8; CHUNK_VOLUME]>,
        layer_counts: [u16; CHUNK_SIZE],
        block_count: u16,
        tickables: FxHashSet<i32>,
    ) -> Self {
        let mut chunk = Self {
            ids,
            meta,
            light,
            layer_counts,
            tallest: [-1; CHUNK_AREA],
            tickables,
            block_count,
            dirty: 0,
            version: 0,
        };
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                chunk.tallest[x + z * CHUNK_SIZE] = chunk.scan_tallest(x, z, CHUNK_SIZE);
            }
        }
        chunk
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("block_count", &self.block_count)
            .field("tickables", &self.tickables.len())
            .field("dirty", &self.dirty)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
