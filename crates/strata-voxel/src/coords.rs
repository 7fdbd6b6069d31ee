//! Integer coordinate key type and axis-aligned faces.
//!
//! [`Vec3i`] is used for every coordinate-keyed map in the engine (chunk
//! positions, column keys, world block positions). World coordinates map to
//! chunk coordinates by an arithmetic shift of [`CHUNK_SHIFT`] and to
//! chunk-local coordinates by masking with [`CHUNK_MASK`].

use std::hash::{Hash, Hasher};
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Shift converting a world coordinate to a chunk coordinate.
pub const CHUNK_SHIFT: i32 = 4;

/// Mask extracting the chunk-local part of a world coordinate.
pub const CHUNK_MASK: i32 = 0xF;

/// Immutable 3-component integer vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vec3i {
    /// X component.
    pub x: i32,
    /// Y component.
    pub y: i32,
    /// Z component.
    pub z: i32,
}

impl Vec3i {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates a new vector.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns this vector offset by `(dx, dy, dz)`.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The position directly above.
    pub const fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// The position directly below.
    pub const fn down(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Chunk coordinate containing this world position.
    pub const fn chunk_pos(self) -> Self {
        Self::new(
            self.x >> CHUNK_SHIFT,
            self.y >> CHUNK_SHIFT,
            self.z >> CHUNK_SHIFT,
        )
    }

    /// Chunk-local coordinate of this world position (each in `0..16`).
    pub const fn local(self) -> (i32, i32, i32) {
        (self.x & CHUNK_MASK, self.y & CHUNK_MASK, self.z & CHUNK_MASK)
    }

    /// Key of the column containing this chunk position (`y` zeroed).
    pub const fn column_key(self) -> Self {
        Self::new(self.x, 0, self.z)
    }

    /// World position of local `(lx, ly, lz)` inside the chunk at `chunk`.
    pub const fn from_chunk_local(chunk: Self, lx: i32, ly: i32, lz: i32) -> Self {
        Self::new(
            (chunk.x << CHUNK_SHIFT) + lx,
            (chunk.y << CHUNK_SHIFT) + ly,
            (chunk.z << CHUNK_SHIFT) + lz,
        )
    }
}

// Chunk coordinates rarely leave a few thousand in magnitude, so a single
// multiply-xor fold spreads them well enough for FxHashMap buckets.
impl Hash for Vec3i {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let folded = (self.x as i64).wrapping_mul(73_856_093)
            ^ (self.y as i64).wrapping_mul(19_349_663)
            ^ (self.z as i64).wrapping_mul(83_492_791);
        state.write_i64(folded);
    }
}

impl Add for Vec3i {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3i {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// The six axis-aligned faces of a block or chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    /// +Y
    Up = 0,
    /// −Y
    Down = 1,
    /// −Z
    North = 2,
    /// +Z
    South = 3,
    /// +X
    East = 4,
    /// −X
    West = 5,
}

impl Face {
    /// All six faces in discriminant order.
    pub const ALL: [Face; 6] = [
        Face::Up,
        Face::Down,
        Face::North,
        Face::South,
        Face::East,
        Face::West,
    ];

    /// The four horizontal faces.
    pub const HORIZONTAL: [Face; 4] = [Face::North, Face::South, Face::East, Face::West];

    /// Unit offset pointing out of this face.
    pub const fn offset(self) -> Vec3i {
        match self {
            Face::Up => Vec3i::new(0, 1, 0),
            Face::Down => Vec3i::new(0, -1, 0),
            Face::North => Vec3i::new(0, 0, -1),
            Face::South => Vec3i::new(0, 0, 1),
            Face::East => Vec3i::new(1, 0, 0),
            Face::West => Vec3i::new(-1, 0, 0),
        }
    }

    /// Returns the opposite face.
    pub const fn opposite(self) -> Face {
        match self {
            Face::Up => Face::Down,
            Face::Down => Face::Up,
            Face::North => Face::South,
            Face::South => Face::North,
            Face::East => Face::West,
            Face::West => Face::East,
        }
    }

    /// Decodes a wire discriminant.
    pub fn from_u8(value: u8) -> Option<Face> {
        Face::ALL.get(value as usize).copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
