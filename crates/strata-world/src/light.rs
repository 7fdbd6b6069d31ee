//! Sky light maintenance for the [`World`].
//!
//! Sky light enters from the top of the world at level 15 and travels straight
//! down without decay through blocks with zero opacity, losing `opacity` per
//! block through translucent ones. Sideways and upward steps lose
//! `1 + opacity`. Opaque blocks hold level 0.
//!
//! Darkening is approximate: a column recompute lowers the straight-down
//! values, but light that already spread sideways from the old values stays
//! until those cells are rewritten.

use std::collections::VecDeque;
use std::sync::Arc;

use strata_voxel::{BlockRegistry, Face, MAX_LIGHT, Vec3i, WORLD_CHUNK_HEIGHT};

use crate::world::World;

/// Level that reaches a cell of the given `opacity` from a neighbor at
/// `level`, travelling in direction `dir`.
fn propagated(level: u8, dir: Face, opacity: u8) -> u8 {
    if dir == Face::Down && level == MAX_LIGHT && opacity == 0 {
        MAX_LIGHT
    } else {
        level.saturating_sub(1 + opacity)
    }
}

/// Recomputes straight-down sky light for world column `(x, z)` and spreads
/// from every cell whose level changed.
pub(crate) fn recompute_column(world: &mut World, x: i32, z: i32) {
    let cp = Vec3i::new(x, 0, z).chunk_pos();
    let manager = world.chunk_manager();
    if !manager.contains_column(cp.x, cp.z) {
        return;
    }
    let Some(top_chunk) = (0..WORLD_CHUNK_HEIGHT)
        .rev()
        .find(|&cy| manager.contains_chunk(Vec3i::new(cp.x, cy, cp.z)))
    else {
        return;
    };

    let registry = Arc::clone(world.registry());
    let blocks = registry.blocks();
    let mut level = MAX_LIGHT;
    let mut changed = Vec::new();
    for y in (0..(top_chunk + 1) * 16).rev() {
        let pos = Vec3i::new(x, y, z);
        let id = world.get_block(pos);
        level = if blocks.is_opaque(id) {
            0
        } else {
            level.saturating_sub(blocks.opacity(id))
        };
        if world.sky_light(pos) != level && world.set_sky_light(pos, level) {
            changed.push(pos);
        }
    }

    for pos in changed {
        spread(world, pos);
    }
}

/// Pulls light into `start` from its neighbors, then floods outward from it.
pub(crate) fn spread(world: &mut World, start: Vec3i) {
    if !world.is_loaded(start) {
        return;
    }
    let registry = Arc::clone(world.registry());
    let blocks = registry.blocks();

    let start_id = world.get_block(start);
    if blocks.is_opaque(start_id) {
        world.set_sky_light(start, 0);
        return;
    }
    let opacity = blocks.opacity(start_id);
    let best = Face::ALL
        .iter()
        .map(|&face| {
            let from = start + face.offset();
            propagated(world.sky_light(from), face.opposite(), opacity)
        })
        .max()
        .unwrap_or(0);
    if best > world.sky_light(start) {
        world.set_sky_light(start, best);
    }

    flood(world, blocks, start);
}

/// Breadth-first increase of sky light outward from `start`.
fn flood(world: &mut World, blocks: &BlockRegistry, start: Vec3i) {
    let mut queue = VecDeque::from([start]);
    while let Some(pos) = queue.pop_front() {
        let level = world.sky_light(pos);
        if level == 0 {
            continue;
        }
        for face in Face::ALL {
            let next = pos + face.offset();
            if !world.is_loaded(next) {
                continue;
            }
            let id = world.get_block(next);
            if blocks.is_opaque(id) {
                continue;
            }
            let candidate = propagated(level, face, blocks.opacity(id));
            if world.sky_light(next) < candidate && world.set_sky_light(next, candidate) {
                queue.push_back(next);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
