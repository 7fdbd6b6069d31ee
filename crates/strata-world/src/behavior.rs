//! Block behavior capability set and the concrete block kinds.
//!
//! Every registered block id owns one [`BlockBehavior`]. The world calls into
//! it after each effective write: `on_block_broken` for the block that was
//! replaced, `on_block_placed` for the new block, and `on_neighbor_updated`
//! for each of the six neighbors. All callbacks default to doing nothing.

use rand::Rng;
use strata_voxel::{BlockId, Vec3i};

use crate::registry::FluidId;
use crate::world::World;

/// Type-specific reactions to world changes.
pub trait BlockBehavior: Send + Sync {
    /// A block of this type was written at `pos`.
    fn on_block_placed(&self, _world: &mut World, _pos: Vec3i) {}

    /// A block of this type at `pos` was replaced. `old` and `old_meta` are
    /// what the cell held before.
    fn on_block_broken(&self, _world: &mut World, _pos: Vec3i, _old: BlockId, _old_meta: u8) {}

    /// The block at `neighbor`, adjacent to this block at `pos`, changed.
    fn on_neighbor_updated(&self, _world: &mut World, _pos: Vec3i, _neighbor: Vec3i) {}

    /// Whether a block of this type may be placed at `pos`.
    fn can_place_block(&self, _world: &World, _pos: Vec3i) -> bool {
        true
    }

    /// Whether blocks of this type join their chunk's tickable set.
    fn is_randomly_tickable(&self) -> bool {
        false
    }

    /// Called when this block is drawn by random tick sampling.
    fn on_random_tick(&self, _world: &mut World, _pos: Vec3i) {}
}

/// No behavior at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainBlock;

impl BlockBehavior for PlainBlock {}

/// Drops through loaded air until it rests on something.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallingBlock;

impl FallingBlock {
    fn try_fall(world: &mut World, pos: Vec3i) {
        let is_open = |world: &World, p: Vec3i| world.is_loaded(p) && world.get_block(p).is_air();
        let mut landing = pos.down();
        if !is_open(&*world, landing) {
            return;
        }
        while is_open(&*world, landing.down()) {
            landing = landing.down();
        }

        // The landing cell is filled before the source is cleared, so the
        // blocks above that fall into `pos` stack on top of it.
        let id = world.get_block(pos);
        let meta = world.get_meta(pos);
        if world.set_block_with_meta(landing, id, meta) && world.get_block(pos) == id {
            world.set_block(pos, BlockId::AIR);
        }
    }
}

impl BlockBehavior for FallingBlock {
    fn on_block_placed(&self, world: &mut World, pos: Vec3i) {
        Self::try_fall(world, pos);
    }

    fn on_neighbor_updated(&self, world: &mut World, pos: Vec3i, neighbor: Vec3i) {
        if neighbor == pos.down() {
            Self::try_fall(world, pos);
        }
    }
}

/// Schedules fluid spreading whenever the fluid appears or a neighbor opens up.
#[derive(Debug, Clone, Copy)]
pub struct FluidBlock {
    /// Fluid kind this block represents.
    pub fluid: FluidId,
}

impl BlockBehavior for FluidBlock {
    fn on_block_placed(&self, world: &mut World, pos: Vec3i) {
        world.add_fluid_update(self.fluid, pos);
    }

    fn on_neighbor_updated(&self, world: &mut World, pos: Vec3i, neighbor: Vec3i) {
        if world.get_block(neighbor).is_air() {
            world.add_fluid_update(self.fluid, pos);
        }
    }
}

/// Two-block-tall door. The upper half carries [`DoorBlock::UPPER`] in its
/// metadata; placing the lower half places the upper one, and breaking either
/// half removes the other.
#[derive(Debug, Default, Clone, Copy)]
pub struct DoorBlock;

impl DoorBlock {
    /// Metadata bit marking the upper half.
    pub const UPPER: u8 = 0x8;
}

impl BlockBehavior for DoorBlock {
    fn on_block_placed(&self, world: &mut World, pos: Vec3i) {
        let meta = world.get_meta(pos);
        if meta & Self::UPPER != 0 {
            return;
        }
        let up = pos.up();
        if world.get_block(up).is_air() {
            let id = world.get_block(pos);
            world.set_block_with_meta(up, id, meta | Self::UPPER);
        }
    }

    fn on_block_broken(&self, world: &mut World, pos: Vec3i, old: BlockId, old_meta: u8) {
        let other = if old_meta & Self::UPPER != 0 {
            pos.down()
        } else {
            pos.up()
        };
        if world.get_block(other) == old {
            world.set_block(other, BlockId::AIR);
        }
    }

    fn can_place_block(&self, world: &World, pos: Vec3i) -> bool {
        world.get_block(pos.up()).is_air()
    }
}

/// Grass decays to dirt under an opaque block and otherwise spreads onto
/// nearby dirt that has open space above it.
#[derive(Debug, Clone, Copy)]
pub struct GrassBlock {
    /// Block grass turns into, and spreads onto.
    pub dirt: BlockId,
}

impl GrassBlock {
    fn covered(world: &World, pos: Vec3i) -> bool {
        world.registry().blocks().is_opaque(world.get_block(pos.up()))
    }
}

impl BlockBehavior for GrassBlock {
    fn is_randomly_tickable(&self) -> bool {
        true
    }

    fn on_random_tick(&self, world: &mut World, pos: Vec3i) {
        if Self::covered(world, pos) {
            world.set_block(pos, self.dirt);
            return;
        }
        let grass = world.get_block(pos);
        let rng = world.rng();
        let target = pos.offset(
            rng.random_range(-1..=1),
            rng.random_range(-1..=1),
            rng.random_range(-1..=1),
        );
        if world.get_block(target) == self.dirt && !Self::covered(world, target) {
            world.set_block(target, grass);
        }
    }
}
