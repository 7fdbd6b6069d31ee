//! Flood-fill fluid simulation.
//!
//! Each fluid kind owns a [`FluidInstance`] holding two position queues.
//! Positions scheduled during a tick go into `pending`; at the start of the
//! next tick `pending` becomes the batch being processed. A fluid therefore
//! advances exactly one ring of cells per tick, and a position is processed
//! at most once per tick.

use rustc_hash::FxHashSet;
use strata_voxel::{Face, Vec3i};

use crate::registry::FluidId;
use crate::world::World;

/// Scheduled work for one fluid kind.
#[derive(Debug, Default)]
pub struct FluidInstance {
    pending: Vec<Vec3i>,
    queued: FxHashSet<Vec3i>,
    /// Recycled allocation for the batch being processed.
    processing: Vec<Vec3i>,
}

impl FluidInstance {
    /// Creates an instance with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `pos` for the next tick. Returns `false` if it was already
    /// scheduled.
    pub fn add_fluid_update(&mut self, pos: Vec3i) -> bool {
        if self.queued.insert(pos) {
            self.pending.push(pos);
            true
        } else {
            false
        }
    }

    /// Number of positions waiting for the next tick.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Moves the pending queue out as this tick's batch.
    fn begin_tick(&mut self) -> Vec<Vec3i> {
        self.queued.clear();
        let mut batch = std::mem::take(&mut self.processing);
        std::mem::swap(&mut batch, &mut self.pending);
        batch
    }

    /// Hands the drained batch allocation back for reuse.
    fn end_tick(&mut self, mut batch: Vec<Vec3i>) {
        batch.clear();
        self.processing = batch;
    }
}

/// Runs one tick of `fluid`: every position scheduled before this tick
/// spreads into its loaded, air-filled horizontal neighbors.
pub fn do_fluid_tick(world: &mut World, fluid: FluidId) {
    let Some(block) = world.registry().fluid(fluid).map(|def| def.block) else {
        return;
    };
    let Some(batch) = world.fluid_mut(fluid).map(FluidInstance::begin_tick) else {
        return;
    };
    if !batch.is_empty() {
        tracing::trace!("Fluid {:?} tick: {} positions", fluid, batch.len());
    }

    for &pos in &batch {
        if world.get_block(pos) != block {
            continue;
        }
        for face in Face::HORIZONTAL {
            let next = pos + face.offset();
            if world.is_loaded(next) && world.get_block(next).is_air() {
                world.set_block(next, block);
            }
        }
    }

    if let Some(instance) = world.fluid_mut(fluid) {
        instance.end_tick(batch);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
