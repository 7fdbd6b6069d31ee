//! The [`World`] facade: block access in world coordinates, derived-metadata
//! upkeep on every write, block callbacks, players, and the per-tick update.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use strata_voxel::{
    BlockId, Chunk, ChunkManager, ChunkProvider, ColumnData, Face, Vec3i, WORLD_CHUNK_HEIGHT,
    WORLD_HEIGHT,
};

use crate::fluid::{FluidInstance, do_fluid_tick};
use crate::light;
use crate::player::PlayerState;
use crate::registry::{FluidId, Registry};

/// A block targeted by a ray: the block that was hit and the face it was hit on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaycastHit {
    /// World position of the block that was hit.
    pub block: Vec3i,
    /// Face of that block the ray entered through.
    pub face: Face,
}

impl RaycastHit {
    /// The cell in front of the hit face, where a placed block goes.
    pub fn adjacent(&self) -> Vec3i {
        self.block + self.face.offset()
    }
}

/// Reason a raycast-targeted edit was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// The target column is not resident.
    #[error("target column not loaded")]
    NotLoaded,
    /// The target lies above or below the world.
    #[error("target outside world height")]
    OutOfWorld,
    /// Attempted to place into a cell that holds a block.
    #[error("target cell is obstructed")]
    Obstructed,
    /// Attempted to break an empty cell.
    #[error("target cell is already empty")]
    AlreadyEmpty,
    /// The block id is not registered, or is air.
    #[error("block id {0} cannot be placed")]
    InvalidBlock(i8),
    /// The block's own placement rule refused the position.
    #[error("block refuses placement here")]
    PlacementRefused,
}

/// Scheduled sky light work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LightUpdate {
    /// Recompute straight-down sky light for world column `(x, z)`.
    Column(i32, i32),
    /// Spread light into and out of a world position.
    Spread(Vec3i),
}

/// The simulated world: chunks, players, and scheduled light and fluid work.
///
/// All mutation happens on the simulation thread through `&mut World`.
pub struct World {
    registry: Arc<Registry>,
    chunks: ChunkManager,
    players: FxHashMap<u32, PlayerState>,
    light_queue: VecDeque<LightUpdate>,
    fluids: Vec<FluidInstance>,
    rng: ChaCha8Rng,
    seed: u64,
    random_tick_speed: u32,
    tick: u64,
    elapsed: Duration,
}

impl World {
    /// Creates an empty world whose missing columns come from `provider`.
    pub fn new(registry: Arc<Registry>, provider: Box<dyn ChunkProvider>, seed: u64) -> Self {
        let fluids = (0..registry.fluid_count())
            .map(|_| FluidInstance::new())
            .collect();
        Self {
            registry,
            chunks: ChunkManager::new(provider),
            players: FxHashMap::default(),
            light_queue: VecDeque::new(),
            fluids,
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            random_tick_speed: 3,
            tick: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Sets how many tickables are sampled per loaded chunk each tick.
    pub fn set_random_tick_speed(&mut self, speed: u32) {
        self.random_tick_speed = speed;
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Read access to the chunk store.
    pub fn chunk_manager(&self) -> &ChunkManager {
        &self.chunks
    }

    /// Write access to the chunk store.
    pub fn chunk_manager_mut(&mut self) -> &mut ChunkManager {
        &mut self.chunks
    }

    /// World seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of completed [`World::update`] calls.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulated time accumulated by [`World::update`].
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The tick-scoped random number generator.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    // -----------------------------------------------------------------------
    // Block access
    // -----------------------------------------------------------------------

    fn in_world(pos: Vec3i) -> bool {
        (0..WORLD_HEIGHT).contains(&pos.y)
    }

    /// Returns `true` if `pos` is inside the world height and its column is
    /// resident.
    pub fn is_loaded(&self, pos: Vec3i) -> bool {
        let cp = pos.chunk_pos();
        Self::in_world(pos) && self.chunks.contains_column(cp.x, cp.z)
    }

    /// Block at `pos`. Reads outside the world height return
    /// [`BlockId::NONE`]; unloaded positions read as air. Never triggers
    /// generation.
    pub fn get_block(&self, pos: Vec3i) -> BlockId {
        if !Self::in_world(pos) {
            return BlockId::NONE;
        }
        let (lx, ly, lz) = pos.local();
        self.chunks.get_chunk(pos.chunk_pos()).get_block(lx, ly, lz)
    }

    /// Metadata byte at `pos` (0 when absent).
    pub fn get_meta(&self, pos: Vec3i) -> u8 {
        if !Self::in_world(pos) {
            return 0;
        }
        let (lx, ly, lz) = pos.local();
        self.chunks.get_chunk(pos.chunk_pos()).get_meta(lx, ly, lz)
    }

    /// Sets the metadata byte at `pos` without any callbacks.
    pub fn set_meta(&mut self, pos: Vec3i, meta: u8) {
        if !Self::in_world(pos) {
            return;
        }
        let (lx, ly, lz) = pos.local();
        if let Some(chunk) = self.chunks.get_chunk_mut(pos.chunk_pos()) {
            chunk.set_meta(lx, ly, lz, meta);
        }
    }

    /// Sky light at `pos`. Above the world and inside open-sky parts of a
    /// loaded column this is 15; below the world or in unloaded columns it is 0.
    pub fn sky_light(&self, pos: Vec3i) -> u8 {
        if pos.y >= WORLD_HEIGHT {
            return 15;
        }
        if !self.is_loaded(pos) {
            return 0;
        }
        let cp = pos.chunk_pos();
        if !self.chunks.contains_chunk(cp) {
            return 15;
        }
        let (lx, ly, lz) = pos.local();
        self.chunks.get_chunk(cp).sky_light(lx, ly, lz)
    }

    /// Writes sky light into a resident chunk. Returns `false` if there is
    /// no chunk to hold it.
    pub(crate) fn set_sky_light(&mut self, pos: Vec3i, level: u8) -> bool {
        if !Self::in_world(pos) {
            return false;
        }
        let (lx, ly, lz) = pos.local();
        match self.chunks.get_chunk_mut(pos.chunk_pos()) {
            Some(chunk) => {
                chunk.set_sky_light(lx, ly, lz, level);
                true
            }
            None => false,
        }
    }

    /// Writes a block with metadata 0 and runs block callbacks.
    ///
    /// Returns `false` if the write was dropped (out of world, unloaded
    /// column, or `id` is NONE).
    pub fn set_block(&mut self, pos: Vec3i, id: BlockId) -> bool {
        self.set_block_with_meta(pos, id, 0)
    }

    /// Writes a block with the given metadata and runs block callbacks.
    pub fn set_block_with_meta(&mut self, pos: Vec3i, id: BlockId, meta: u8) -> bool {
        let Some((old, old_meta)) = self.write_block(pos, id, meta) else {
            return false;
        };
        if old != id {
            self.notify(pos, old, old_meta, id);
        }
        true
    }

    /// Writes a block without running any callbacks. Used when applying
    /// authoritative state received from elsewhere.
    pub fn set_block_silent(&mut self, pos: Vec3i, id: BlockId, meta: u8) -> bool {
        self.write_block(pos, id, meta).is_some()
    }

    /// Stores the block and keeps tickables, column height and light in
    /// step. Returns the previous id and metadata.
    fn write_block(&mut self, pos: Vec3i, id: BlockId, meta: u8) -> Option<(BlockId, u8)> {
        if id.is_none() || !Self::in_world(pos) {
            return None;
        }
        let cp = pos.chunk_pos();
        let (lx, ly, lz) = pos.local();
        let tickable = self.registry.is_randomly_tickable(id);
        let Some(chunk) = self.chunks.ensure_chunk(cp) else {
            tracing::debug!(
                "Dropping write of {:?} at ({}, {}, {}): column not loaded",
                id,
                pos.x,
                pos.y,
                pos.z
            );
            return None;
        };

        let old = chunk.get_block(lx, ly, lz);
        let old_meta = chunk.get_meta(lx, ly, lz);
        chunk.set_block(lx, ly, lz, id);
        chunk.set_meta(lx, ly, lz, meta);
        if old == id {
            return Some((old, old_meta));
        }

        if tickable {
            chunk.add_tickable(lx, ly, lz);
        } else {
            chunk.remove_tickable(lx, ly, lz);
        }

        self.update_column(pos, old, id);
        Some((old, old_meta))
    }

    /// Maintains the opaque-height record and schedules light work after
    /// `pos` changed from `old` to `new`.
    fn update_column(&mut self, pos: Vec3i, old: BlockId, new: BlockId) {
        let blocks = self.registry.blocks();
        let old_opaque = blocks.is_opaque(old);
        let new_opaque = blocks.is_opaque(new);
        let opacity_changed = blocks.opacity(old) != blocks.opacity(new);
        let cp = pos.chunk_pos();
        let (lx, _, lz) = pos.local();

        let Some(height) = self.chunks.column(cp.x, cp.z).map(|c| c.tallest_opaque(lx, lz)) else {
            return;
        };
        let mut new_height = height;
        if new_opaque && pos.y > height {
            new_height = pos.y;
        } else if old_opaque && !new_opaque && pos.y == height {
            new_height = (0..pos.y)
                .rev()
                .find(|&y| blocks.is_opaque(self.get_block(Vec3i::new(pos.x, y, pos.z))))
                .unwrap_or(0);
        }
        if new_height != height
            && let Some(column) = self.chunks.column_mut(cp.x, cp.z)
        {
            column.set_tallest_opaque(lx, lz, new_height);
        }

        if opacity_changed {
            if pos.y >= height.min(new_height) {
                self.light_queue.push_back(LightUpdate::Column(pos.x, pos.z));
            }
            self.light_queue.push_back(LightUpdate::Spread(pos));
        }
    }

    /// Runs broken/placed callbacks at `pos` and neighbor callbacks around it.
    fn notify(&mut self, pos: Vec3i, old: BlockId, old_meta: u8, new: BlockId) {
        let registry = Arc::clone(&self.registry);
        if let Some(behavior) = registry.behavior(old) {
            behavior.on_block_broken(self, pos, old, old_meta);
        }
        if let Some(behavior) = registry.behavior(new) {
            behavior.on_block_placed(self, pos);
        }
        for face in Face::ALL {
            let neighbor = pos + face.offset();
            let id = self.get_block(neighbor);
            if let Some(behavior) = registry.behavior(id) {
                behavior.on_neighbor_updated(self, neighbor, pos);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Columns
    // -----------------------------------------------------------------------

    /// Makes column `(x, z)` resident through the chunk provider, then fills
    /// the tickable sets of its chunks from the registry.
    pub fn load_column(&mut self, x: i32, z: i32) -> bool {
        if self.chunks.contains_column(x, z) {
            return true;
        }
        if !self.chunks.load_column(x, z) {
            return false;
        }
        self.rebuild_tickables(x, z);
        true
    }

    /// Merges an externally supplied column (network or save file) as is.
    pub fn insert_column(&mut self, x: i32, z: i32, data: ColumnData) {
        self.chunks.insert_column(x, z, data);
    }

    /// Removes column `(x, z)` and returns its contents.
    pub fn unload_column(&mut self, x: i32, z: i32) -> Option<ColumnData> {
        self.chunks.unload_column(x, z)
    }

    /// Re-derives the tickable set of every chunk in column `(x, z)`.
    pub fn rebuild_tickables(&mut self, x: i32, z: i32) {
        for cy in 0..WORLD_CHUNK_HEIGHT {
            if let Some(chunk) = self.chunks.get_chunk_mut(Vec3i::new(x, cy, z)) {
                rebuild_chunk_tickables(&self.registry, chunk);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Edits
    // -----------------------------------------------------------------------

    /// Places `id` in front of the hit face. Returns the position written.
    pub fn place_block(&mut self, hit: RaycastHit, id: BlockId) -> Result<Vec3i, EditError> {
        let target = hit.adjacent();
        if id.is_air() || self.registry.blocks().def(id).is_none() {
            return Err(EditError::InvalidBlock(id.0));
        }
        if !Self::in_world(target) {
            return Err(EditError::OutOfWorld);
        }
        if !self.is_loaded(target) {
            return Err(EditError::NotLoaded);
        }
        let existing = self.get_block(target);
        if !existing.is_air() && self.registry.fluid_for_block(existing).is_none() {
            return Err(EditError::Obstructed);
        }
        let registry = Arc::clone(&self.registry);
        if let Some(behavior) = registry.behavior(id)
            && !behavior.can_place_block(self, target)
        {
            return Err(EditError::PlacementRefused);
        }
        self.set_block(target, id);
        Ok(target)
    }

    /// Breaks the hit block. Returns the id that was removed.
    pub fn break_block(&mut self, hit: RaycastHit) -> Result<BlockId, EditError> {
        let pos = hit.block;
        if !Self::in_world(pos) {
            return Err(EditError::OutOfWorld);
        }
        if !self.is_loaded(pos) {
            return Err(EditError::NotLoaded);
        }
        let old = self.get_block(pos);
        if old.is_air() {
            return Err(EditError::AlreadyEmpty);
        }
        self.set_block(pos, BlockId::AIR);
        Ok(old)
    }

    // -----------------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------------

    /// Adds (or resets) the player with `client_id`.
    pub fn spawn_player(&mut self, client_id: u32) -> &mut PlayerState {
        let slot = self.players.entry(client_id).or_default();
        *slot = PlayerState::new(client_id);
        slot
    }

    /// Removes a player.
    pub fn kill_player(&mut self, client_id: u32) -> Option<PlayerState> {
        self.players.remove(&client_id)
    }

    /// Replaces the state of a known player. Returns `false` for unknown ids.
    pub fn update_player(&mut self, state: PlayerState) -> bool {
        match self.players.get_mut(&state.client_id) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    /// State of one player.
    pub fn player(&self, client_id: u32) -> Option<&PlayerState> {
        self.players.get(&client_id)
    }

    /// All loaded players.
    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    /// Number of loaded players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    // -----------------------------------------------------------------------
    // Fluids and light
    // -----------------------------------------------------------------------

    /// Schedules `pos` for the next tick of `fluid`.
    pub fn add_fluid_update(&mut self, fluid: FluidId, pos: Vec3i) {
        if let Some(instance) = self.fluids.get_mut(fluid.0 as usize) {
            instance.add_fluid_update(pos);
        }
    }

    /// Queue state of one fluid kind.
    pub fn fluid(&self, fluid: FluidId) -> Option<&FluidInstance> {
        self.fluids.get(fluid.0 as usize)
    }

    pub(crate) fn fluid_mut(&mut self, fluid: FluidId) -> Option<&mut FluidInstance> {
        self.fluids.get_mut(fluid.0 as usize)
    }

    /// Number of light updates waiting for the next tick.
    pub fn pending_light_updates(&self) -> usize {
        self.light_queue.len()
    }

    /// Drains and applies all scheduled light work.
    pub fn process_light_updates(&mut self) {
        for pos in self.chunks.take_light_updates() {
            self.light_queue.push_back(LightUpdate::Spread(pos));
        }
        while let Some(update) = self.light_queue.pop_front() {
            match update {
                LightUpdate::Column(x, z) => light::recompute_column(self, x, z),
                LightUpdate::Spread(pos) => light::spread(self, pos),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advances the simulation by one tick: random ticks, light, then one
    /// step of every fluid.
    pub fn update(&mut self, delta: Duration) {
        self.random_ticks();
        self.process_light_updates();
        for i in 0..self.fluids.len() {
            do_fluid_tick(self, FluidId(i as u8));
        }
        self.tick += 1;
        self.elapsed += delta;
    }

    /// Samples up to `random_tick_speed` distinct tickables per loaded chunk
    /// and runs their random-tick callback.
    fn random_ticks(&mut self) {
        if self.random_tick_speed == 0 {
            return;
        }
        let mut chunk_positions: Vec<Vec3i> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| !chunk.tickables().is_empty())
            .map(|(pos, _)| *pos)
            .collect();
        chunk_positions.sort_unstable();

        let mut picked = Vec::new();
        for cp in chunk_positions {
            let tickables = self.chunks.get_chunk(cp).sorted_tickables();
            let amount = (self.random_tick_speed as usize).min(tickables.len());
            for i in rand::seq::index::sample(&mut self.rng, tickables.len(), amount).into_iter() {
                let (lx, ly, lz) = Chunk::unpack_local(tickables[i]);
                picked.push(Vec3i::from_chunk_local(cp, lx, ly, lz));
            }
        }

        let registry = Arc::clone(&self.registry);
        for pos in picked {
            let id = self.get_block(pos);
            if registry.is_randomly_tickable(id)
                && let Some(behavior) = registry.behavior(id)
            {
                behavior.on_random_tick(self, pos);
            }
        }
    }
}

/// Fills `chunk`'s tickable set from the registry's random-tick flags.
pub(crate) fn rebuild_chunk_tickables(registry: &Registry, chunk: &mut Chunk) {
    let flagged: Vec<usize> = chunk
        .block_ids()
        .iter()
        .enumerate()
        .filter(|&(_, &id)| registry.is_randomly_tickable(BlockId(id)))
        .map(|(i, _)| i)
        .collect();
    for i in flagged {
        let (x, y, z) = Chunk::unindex(i);
        chunk.add_tickable(x, y, z);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strata_voxel::NullProvider;

    use super::*;
    use crate::behavior::DoorBlock;
    use crate::registry::StandardBlocks;

    fn make_world() -> (World, StandardBlocks) {
        let (registry, blocks) = Registry::standard().expect("standard registry");
        let world = World::new(Arc::new(registry), Box::new(NullProvider), 1);
        (world, blocks)
    }

    /// One loaded column at (0, 0) with a stone floor at y = 0.
    fn make_floored_world() -> (World, StandardBlocks) {
        let (mut world, blocks) = make_world();
        world.insert_column(0, 0, ColumnData::empty());
        for x in 0..16 {
            for z in 0..16 {
                assert!(world.set_block(Vec3i::new(x, 0, z), blocks.stone));
            }
        }
        world.process_light_updates();
        (world, blocks)
    }

    fn hit(x: i32, y: i32, z: i32, face: Face) -> RaycastHit {
        RaycastHit {
            block: Vec3i::new(x, y, z),
            face,
        }
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let (mut world, blocks) = make_floored_world();
        let pos = Vec3i::new(5, 10, 5);
        assert!(world.set_block(pos, blocks.dirt));
        assert_eq!(world.get_block(pos), blocks.dirt);
        assert!(world.set_block_with_meta(pos, blocks.stone, 3));
        assert_eq!(world.get_block(pos), blocks.stone);
        assert_eq!(world.get_meta(pos), 3);
    }

    #[test]
    fn test_reads_outside_world_height_are_none() {
        let (world, _) = make_floored_world();
        assert_eq!(world.get_block(Vec3i::new(0, -1, 0)), BlockId::NONE);
        assert_eq!(world.get_block(Vec3i::new(0, 256, 0)), BlockId::NONE);
        assert_eq!(world.get_block(Vec3i::new(0, 255, 0)), BlockId::AIR);
    }

    #[test]
    fn test_writes_to_unloaded_column_are_dropped() {
        let (mut world, blocks) = make_floored_world();
        let pos = Vec3i::new(100, 10, 100);
        assert!(!world.set_block(pos, blocks.stone));
        assert_eq!(world.get_block(pos), BlockId::AIR);
        assert!(!world.chunk_manager().contains_column(6, 6));
        assert!(!world.set_block(Vec3i::new(1, 1, 1), BlockId::NONE));
    }

    #[test]
    fn test_reads_never_generate() {
        let (registry, blocks) = Registry::standard().expect("standard registry");
        let generator = blocks.column_generator(&registry, 7, 62);
        let world = World::new(Arc::new(registry), Box::new(generator), 7);
        assert_eq!(world.get_block(Vec3i::new(3, 30, 3)), BlockId::AIR);
        assert!(!world.chunk_manager().contains_column(0, 0));
    }

    #[test]
    fn test_generated_column_tickables_match_grass() {
        let (registry, blocks) = Registry::standard().expect("standard registry");
        let generator = blocks.column_generator(&registry, 7, 62);
        let mut world = World::new(Arc::new(registry), Box::new(generator), 7);
        assert!(world.load_column(0, 0));

        for (_, chunk) in world.chunk_manager().column_chunks(0, 0) {
            let grass = chunk
                .block_ids()
                .iter()
                .filter(|&&id| BlockId(id) == blocks.grass)
                .count();
            assert_eq!(chunk.tickables().len(), grass);
            for &packed in chunk.tickables() {
                let (x, y, z) = Chunk::unpack_local(packed);
                assert_eq!(chunk.get_block(x, y, z), blocks.grass);
            }
        }
    }

    #[test]
    fn test_tickables_follow_block_type() {
        let (mut world, blocks) = make_floored_world();
        let pos = Vec3i::new(2, 1, 3);
        world.set_block(pos, blocks.grass);
        assert!(world.chunk_manager().get_chunk(Vec3i::ZERO).is_tickable(2, 1, 3));
        world.set_block(pos, blocks.stone);
        assert!(!world.chunk_manager().get_chunk(Vec3i::ZERO).is_tickable(2, 1, 3));
    }

    #[test]
    fn test_grass_decays_under_opaque_block() {
        let (mut world, blocks) = make_floored_world();
        world.set_random_tick_speed(16);
        let pos = Vec3i::new(4, 1, 4);
        world.set_block(pos, blocks.grass);
        world.set_block(pos.up(), blocks.stone);
        world.update(Duration::from_millis(50));
        assert_eq!(world.get_block(pos), blocks.dirt);
        assert!(world.chunk_manager().get_chunk(Vec3i::ZERO).tickables().is_empty());
    }

    #[test]
    fn test_door_places_and_breaks_both_halves() {
        let (mut world, blocks) = make_floored_world();
        let lower = Vec3i::new(6, 1, 6);
        world.set_block(lower, blocks.door);
        assert_eq!(world.get_block(lower.up()), blocks.door);
        assert_eq!(world.get_meta(lower.up()) & DoorBlock::UPPER, DoorBlock::UPPER);
        assert_eq!(world.get_meta(lower) & DoorBlock::UPPER, 0);

        world.set_block(lower.up(), BlockId::AIR);
        assert_eq!(world.get_block(lower), BlockId::AIR);
        assert_eq!(world.get_block(lower.up()), BlockId::AIR);
    }

    #[test]
    fn test_sand_falls_to_floor() {
        let (mut world, blocks) = make_floored_world();
        world.set_block(Vec3i::new(4, 10, 4), blocks.sand);
        assert_eq!(world.get_block(Vec3i::new(4, 10, 4)), BlockId::AIR);
        assert_eq!(world.get_block(Vec3i::new(4, 1, 4)), blocks.sand);
        assert_eq!(world.chunk_manager().get_chunk(Vec3i::ZERO).block_count(), 257);
    }

    #[test]
    fn test_sand_falls_when_support_removed() {
        let (mut world, blocks) = make_floored_world();
        world.set_block(Vec3i::new(4, 1, 4), blocks.stone);
        world.set_block(Vec3i::new(4, 2, 4), blocks.sand);
        assert_eq!(world.get_block(Vec3i::new(4, 2, 4)), blocks.sand);
        world.set_block(Vec3i::new(4, 1, 4), BlockId::AIR);
        assert_eq!(world.get_block(Vec3i::new(4, 1, 4)), blocks.sand);
        assert_eq!(world.get_block(Vec3i::new(4, 2, 4)), BlockId::AIR);
    }

    #[test]
    fn test_stacked_sand_falls_without_loss() {
        let (mut world, blocks) = make_floored_world();
        world.set_block(Vec3i::new(4, 1, 4), blocks.stone);
        for y in 2..=4 {
            world.set_block(Vec3i::new(4, y, 4), blocks.sand);
        }
        let before = world.chunk_manager().get_chunk(Vec3i::new(0, 0, 0)).block_count();

        world.set_block(Vec3i::new(4, 1, 4), BlockId::AIR);
        for y in 1..=3 {
            assert_eq!(world.get_block(Vec3i::new(4, y, 4)), blocks.sand, "y = {y}");
        }
        assert_eq!(world.get_block(Vec3i::new(4, 4, 4)), BlockId::AIR);
        let sand = (1..=6)
            .filter(|&y| world.get_block(Vec3i::new(4, y, 4)) == blocks.sand)
            .count();
        assert_eq!(sand, 3);
        let after = world.chunk_manager().get_chunk(Vec3i::new(0, 0, 0)).block_count();
        assert_eq!(after, before - 1);
    }

    #[test]
    fn test_sand_falls_across_a_gap() {
        let (mut world, blocks) = make_floored_world();
        world.set_block(Vec3i::new(2, 5, 2), blocks.stone);
        world.set_block(Vec3i::new(2, 6, 2), blocks.sand);
        world.set_block(Vec3i::new(2, 5, 2), BlockId::AIR);
        assert_eq!(world.get_block(Vec3i::new(2, 1, 2)), blocks.sand);
        for y in 2..=6 {
            assert_eq!(world.get_block(Vec3i::new(2, y, 2)), BlockId::AIR);
        }
    }

    #[test]
    fn test_fluid_advances_one_ring_per_tick() {
        let (mut world, blocks) = make_floored_world();
        let origin = Vec3i::new(8, 1, 8);
        world.set_block(origin, blocks.water);

        for ring in 1..=3 {
            world.update(Duration::from_millis(50));
            for dx in -5i32..=5 {
                for dz in -5i32..=5 {
                    let pos = origin.offset(dx, 0, dz);
                    let expected = if dx.abs() + dz.abs() <= ring {
                        blocks.water
                    } else {
                        BlockId::AIR
                    };
                    assert_eq!(world.get_block(pos), expected, "ring {ring} at {dx},{dz}");
                }
            }
        }
        assert_eq!(world.get_block(origin.up()), BlockId::AIR);
    }

    #[test]
    fn test_fluid_stops_at_unloaded_columns() {
        let (mut world, blocks) = make_floored_world();
        world.set_block(Vec3i::new(0, 1, 0), blocks.water);
        world.update(Duration::from_millis(50));
        assert_eq!(world.get_block(Vec3i::new(1, 1, 0)), blocks.water);
        assert_eq!(world.get_block(Vec3i::new(-1, 1, 0)), BlockId::AIR);
        assert!(!world.chunk_manager().contains_column(-1, 0));
    }

    #[test]
    fn test_place_block_errors() {
        let (mut world, blocks) = make_floored_world();
        assert_eq!(
            world.place_block(hit(40, 0, 40, Face::Up), blocks.stone),
            Err(EditError::NotLoaded)
        );
        assert_eq!(
            world.place_block(hit(1, 255, 1, Face::Up), blocks.stone),
            Err(EditError::OutOfWorld)
        );
        assert_eq!(
            world.place_block(hit(1, 1, 1, Face::Down), blocks.stone),
            Err(EditError::Obstructed)
        );
        assert_eq!(
            world.place_block(hit(1, 0, 1, Face::Up), BlockId::AIR),
            Err(EditError::InvalidBlock(0))
        );
        assert_eq!(
            world.place_block(hit(1, 0, 1, Face::Up), BlockId(120)),
            Err(EditError::InvalidBlock(120))
        );

        world.set_block(Vec3i::new(3, 2, 3), blocks.stone);
        assert_eq!(
            world.place_block(hit(3, 0, 3, Face::Up), blocks.door),
            Err(EditError::PlacementRefused)
        );
    }

    #[test]
    fn test_place_and_break_succeed() {
        let (mut world, blocks) = make_floored_world();
        let placed = world
            .place_block(hit(2, 0, 2, Face::Up), blocks.dirt)
            .expect("place");
        assert_eq!(placed, Vec3i::new(2, 1, 2));
        assert_eq!(world.get_block(placed), blocks.dirt);

        assert_eq!(world.break_block(hit(2, 1, 2, Face::Up)), Ok(blocks.dirt));
        assert_eq!(world.get_block(placed), BlockId::AIR);
        assert_eq!(
            world.break_block(hit(2, 1, 2, Face::Up)),
            Err(EditError::AlreadyEmpty)
        );
    }

    #[test]
    fn test_place_block_replaces_fluid() {
        let (mut world, blocks) = make_floored_world();
        world.set_block(Vec3i::new(5, 1, 5), blocks.water);
        assert_eq!(
            world.place_block(hit(5, 0, 5, Face::Up), blocks.glass),
            Ok(Vec3i::new(5, 1, 5))
        );
        assert_eq!(world.get_block(Vec3i::new(5, 1, 5)), blocks.glass);
    }

    #[test]
    fn test_column_height_tracks_opaque_blocks() {
        let (mut world, blocks) = make_floored_world();
        let height = |w: &World| w.chunk_manager().column(0, 0).expect("column").tallest_opaque(3, 3);
        assert_eq!(height(&world), 0);

        world.set_block(Vec3i::new(3, 20, 3), blocks.stone);
        assert_eq!(height(&world), 20);
        world.set_block(Vec3i::new(3, 30, 3), blocks.glass);
        assert_eq!(height(&world), 20);
        world.set_block(Vec3i::new(3, 12, 3), blocks.dirt);
        world.set_block(Vec3i::new(3, 20, 3), BlockId::AIR);
        assert_eq!(height(&world), 12);
    }

    #[test]
    fn test_light_follows_opacity_changes() {
        let (mut world, blocks) = make_floored_world();
        assert_eq!(world.sky_light(Vec3i::new(8, 0, 8)), 0);
        assert_eq!(world.sky_light(Vec3i::new(8, 5, 8)), 15);

        let roof = Vec3i::new(8, 10, 8);
        world.set_block(roof, blocks.stone);
        assert!(world.pending_light_updates() > 0);
        world.process_light_updates();
        assert_eq!(world.pending_light_updates(), 0);
        assert_eq!(world.sky_light(roof), 0);
        assert_eq!(world.sky_light(roof.up()), 15);
        assert_eq!(world.sky_light(roof.down()), 14);
        assert_eq!(world.sky_light(Vec3i::new(8, 1, 8)), 14);

        world.set_block(roof, BlockId::AIR);
        world.process_light_updates();
        assert_eq!(world.sky_light(roof), 15);
        assert_eq!(world.sky_light(roof.down()), 15);
    }

    #[test]
    fn test_sky_light_outside_resident_chunks() {
        let (world, _) = make_floored_world();
        assert_eq!(world.sky_light(Vec3i::new(0, 300, 0)), 15);
        assert_eq!(world.sky_light(Vec3i::new(0, 100, 0)), 15);
        assert_eq!(world.sky_light(Vec3i::new(50, 10, 50)), 0);
    }

    #[test]
    fn test_players() {
        let (mut world, _) = make_world();
        world.spawn_player(4).position = glam::Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(world.player_count(), 1);

        let mut state = *world.player(4).expect("player");
        state.velocity.x = 2.0;
        assert!(world.update_player(state));
        assert_eq!(world.player(4).map(|p| p.velocity.x), Some(2.0));
        assert!(!world.update_player(PlayerState::new(9)));

        world.spawn_player(4);
        assert_eq!(world.player(4).map(|p| p.position), Some(glam::Vec3::ZERO));
        assert!(world.kill_player(4).is_some());
        assert_eq!(world.players().count(), 0);
    }

    #[test]
    fn test_update_advances_clock() {
        let (mut world, _) = make_world();
        world.update(Duration::from_millis(50));
        world.update(Duration::from_millis(50));
        assert_eq!(world.tick_count(), 2);
        assert_eq!(world.elapsed(), Duration::from_millis(100));
    }
}
