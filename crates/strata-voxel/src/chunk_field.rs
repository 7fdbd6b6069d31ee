//! Neighbor-aware view over a chunk and its 26 surrounding chunks.
//!
//! A [`ChunkField`] borrows 27 chunks from a [`ChunkManager`] so that block
//! queries which spill across a chunk boundary resolve without hashing. The
//! borrows are tied to the manager borrow, so a field cannot outlive the
//! chunks it points at. Absent neighbors are the manager's sentinel.

use crate::chunk::{CHUNK_SIZE, Chunk};
use crate::chunk_manager::ChunkManager;
use crate::coords::{Face, Vec3i};
use crate::registry::BlockId;

const SIZE: i32 = CHUNK_SIZE as i32;
const CENTER_SLOT: usize = 13;

/// 27 borrowed chunks centered on one chunk position.
pub struct ChunkField<'a> {
    center: Vec3i,
    slots: [&'a Chunk; 27],
    sentinel: &'a Chunk,
}

impl<'a> ChunkField<'a> {
    /// Captures the chunk at `center` and its 26 neighbors.
    pub fn build(manager: &'a ChunkManager, center: Vec3i) -> Self {
        let sentinel = manager.sentinel();
        let mut field = Self {
            center,
            slots: [sentinel; 27],
            sentinel,
        };
        field.rebuild_field(manager);
        field
    }

    /// Index of the slot holding the chunk offset by `(dx, dy, dz)`, each in `-1..=1`.
    pub const fn slot_index(dx: i32, dy: i32, dz: i32) -> usize {
        ((dx + 1) + (dz + 1) * 3 + (dy + 1) * 9) as usize
    }

    /// Re-captures all 27 slots from `manager`.
    pub fn rebuild_field(&mut self, manager: &'a ChunkManager) {
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    self.slots[Self::slot_index(dx, dy, dz)] =
                        manager.get_chunk(self.center.offset(dx, dy, dz));
                }
            }
        }
    }

    /// Drops every neighbor, keeping only the center chunk.
    pub fn clear_field(&mut self) {
        let center = self.slots[CENTER_SLOT];
        self.slots = [self.sentinel; 27];
        self.slots[CENTER_SLOT] = center;
    }

    /// Chunk position this field is centered on.
    pub fn center(&self) -> Vec3i {
        self.center
    }

    /// The center chunk.
    pub fn center_chunk(&self) -> &'a Chunk {
        self.slots[CENTER_SLOT]
    }

    /// The chunk containing center-local `(x, y, z)`, optionally stepped one
    /// block across `face`. Coordinates more than one chunk away resolve to
    /// the sentinel.
    pub fn get_chunk(&self, x: i32, y: i32, z: i32, face: Option<Face>) -> &'a Chunk {
        let (x, y, z) = match face {
            Some(f) => {
                let o = f.offset();
                (x + o.x, y + o.y, z + o.z)
            }
            None => (x, y, z),
        };
        match (axis(x), axis(y), axis(z)) {
            (Some(dx), Some(dy), Some(dz)) => self.slots[Self::slot_index(dx, dy, dz)],
            _ => self.sentinel,
        }
    }

    /// Block at center-local `(x, y, z)`, reading through neighbors as needed.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockId {
        self.get_chunk(x, y, z, None)
            .get_block(x & (SIZE - 1), y & (SIZE - 1), z & (SIZE - 1))
    }

    /// Sky light at center-local `(x, y, z)`.
    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.get_chunk(x, y, z, None)
            .sky_light(x & (SIZE - 1), y & (SIZE - 1), z & (SIZE - 1))
    }
}

/// Maps a center-local coordinate to a neighbor offset by sign.
fn axis(v: i32) -> Option<i32> {
    if v < -SIZE || v >= 2 * SIZE {
        None
    } else if v < 0 {
        Some(-1)
    } else if v >= SIZE {
        Some(1)
    } else {
        Some(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_manager::ColumnData;
    use crate::column::ChunkColumn;

    /// Fills a 3×3×3 block of chunks around `(0, 1, 0)` with distinct ids.
    fn populated_manager() -> ChunkManager {
        let mut mgr = ChunkManager::default();
        for cz in -1..=1 {
            for cx in -1..=1 {
                let mut chunks = Vec::new();
                for cy in 0..=2 {
                    let mut chunk = Chunk::new();
                    for i in 0..16 {
                        let id = BlockId((1 + (cx + 1) + (cz + 1) * 3 + cy * 9) as i8);
                        chunk.set_block(i, (i * 5) % 16, (i * 3) % 16, id);
                        chunk.set_block(15, i, 0, id);
                        chunk.set_block(0, 15, i, id);
                    }
                    chunks.push((cy, chunk));
                }
                mgr.insert_column(
                    cx,
                    cz,
                    ColumnData {
                        column: ChunkColumn::new(),
                        chunks,
                        light_updates: Vec::new(),
                    },
                );
            }
        }
        mgr
    }

    fn direct_lookup(mgr: &ChunkManager, world: Vec3i) -> BlockId {
        let (lx, ly, lz) = world.local();
        mgr.get_chunk(world.chunk_pos()).get_block(lx, ly, lz)
    }

    #[test]
    fn test_slot_index_layout() {
        assert_eq!(ChunkField::slot_index(-1, -1, -1), 0);
        assert_eq!(ChunkField::slot_index(0, 0, 0), CENTER_SLOT);
        assert_eq!(ChunkField::slot_index(1, 1, 1), 26);
        assert_eq!(ChunkField::slot_index(0, 0, 1), 16);
    }

    #[test]
    fn test_field_matches_manager_for_every_position_and_face() {
        let mgr = populated_manager();
        let center = Vec3i::new(0, 1, 0);
        let field = ChunkField::build(&mgr, center);
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    let base = Vec3i::from_chunk_local(center, x, y, z);
                    assert_eq!(field.get_block(x, y, z), direct_lookup(&mgr, base));
                    for face in Face::ALL {
                        let o = face.offset();
                        let chunk = field.get_chunk(x, y, z, Some(face));
                        let world = base + o;
                        let (lx, ly, lz) = world.local();
                        assert_eq!(chunk.get_block(lx, ly, lz), direct_lookup(&mgr, world));
                        assert!(std::ptr::eq(chunk, mgr.get_chunk(world.chunk_pos())));
                    }
                }
            }
        }
    }

    #[test]
    fn test_beyond_one_chunk_is_sentinel() {
        let mgr = populated_manager();
        let field = ChunkField::build(&mgr, Vec3i::new(0, 1, 0));
        assert!(mgr.is_sentinel(field.get_chunk(-17, 0, 0, None)));
        assert!(mgr.is_sentinel(field.get_chunk(0, 32, 0, None)));
        assert!(mgr.is_sentinel(field.get_chunk(31, 0, 32, Some(Face::South))));
        assert!(!mgr.is_sentinel(field.get_chunk(-16, 0, 0, None)));
        assert_eq!(field.get_block(40, 0, 0), BlockId::AIR);
    }

    #[test]
    fn test_clear_field_keeps_only_center() {
        let mgr = populated_manager();
        let mut field = ChunkField::build(&mgr, Vec3i::new(0, 1, 0));
        let center = field.center_chunk();
        field.clear_field();
        assert!(std::ptr::eq(field.get_chunk(3, 3, 3, None), center));
        assert!(mgr.is_sentinel(field.get_chunk(-1, 3, 3, None)));
        assert!(mgr.is_sentinel(field.get_chunk(3, 16, 3, None)));

        field.rebuild_field(&mgr);
        assert!(!mgr.is_sentinel(field.get_chunk(-1, 3, 3, None)));
    }

    #[test]
    fn test_absent_neighbors_read_air() {
        let mgr = populated_manager();
        let field = ChunkField::build(&mgr, Vec3i::new(1, 1, 1));
        assert_eq!(field.get_block(16, 0, 0), BlockId::AIR);
        assert_eq!(field.get_block(0, 15, 0), direct_lookup(&mgr, Vec3i::new(16, 31, 16)));
    }
}
