//! Block type registry: maps compact [`BlockId`] values to [`BlockDef`] metadata.
//!
//! The registry is built once during startup. Air is always ID 0 so that
//! zero-initialized chunk memory represents empty space, and `-1` is reserved
//! as the [`BlockId::NONE`] sentinel returned by out-of-range queries.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact identifier stored inside every block cell (1 byte, signed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub i8);

impl BlockId {
    /// Empty space.
    pub const AIR: BlockId = BlockId(0);
    /// "No block here": out-of-range reads and rejected writes.
    pub const NONE: BlockId = BlockId(-1);

    /// Returns `true` for air.
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for the [`BlockId::NONE`] sentinel.
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }

    /// Index into dense per-id tables, or `None` for the sentinel.
    pub const fn index(self) -> Option<usize> {
        if self.0 < 0 { None } else { Some(self.0 as usize) }
    }
}

/// Transparency mode for a block type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Fully blocks light and visibility.
    Opaque,
    /// Partially transparent (e.g. water, leaves).
    SemiTransparent,
    /// Completely transparent (e.g. air, glass).
    FullyTransparent,
}

/// Static data describing one block type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockDef {
    /// Human-readable name (e.g. "stone", "water").
    pub name: String,
    /// Whether entities collide with this block.
    pub solid: bool,
    /// Transparency mode.
    pub transparency: Transparency,
    /// Sky light lost when passing through this block, in addition to the
    /// one level lost per step. Ignored for opaque blocks.
    pub opacity: u8,
    /// Light emission level (0 = none, 15 = max).
    pub light_emission: u8,
}

impl BlockDef {
    /// A solid, opaque block with no emission.
    pub fn opaque(name: &str) -> Self {
        Self {
            name: name.to_string(),
            solid: true,
            transparency: Transparency::Opaque,
            opacity: 15,
            light_emission: 0,
        }
    }

    /// A non-solid, semi-transparent block that attenuates light by `opacity`.
    pub fn translucent(name: &str, solid: bool, opacity: u8) -> Self {
        Self {
            name: name.to_string(),
            solid,
            transparency: Transparency::SemiTransparent,
            opacity,
            light_emission: 0,
        }
    }
}

/// Errors that can occur during block type registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A type with the same name has already been registered.
    #[error("duplicate block type name: {0}")]
    DuplicateName(String),
    /// All 128 ids have been consumed.
    #[error("block registry is full (max {} types)", MAX_BLOCK_TYPES)]
    RegistryFull,
}

/// Number of distinct ids representable by a non-negative [`BlockId`].
pub const MAX_BLOCK_TYPES: usize = 128;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`BlockId`] → [`BlockDef`] with O(1) lookup by index and by name.
pub struct BlockRegistry {
    /// Dense array where `index == BlockId.0`.
    types: Vec<BlockDef>,
    /// Reverse lookup: name → ID.
    name_to_id: FxHashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a new registry with Air pre-registered as ID 0.
    pub fn new() -> Self {
        let air = BlockDef {
            name: "air".to_string(),
            solid: false,
            transparency: Transparency::FullyTransparent,
            opacity: 0,
            light_emission: 0,
        };

        let mut name_to_id = FxHashMap::default();
        name_to_id.insert("air".to_string(), BlockId::AIR);

        Self {
            types: vec![air],
            name_to_id,
        }
    }

    /// Registers a new block type and returns its assigned ID.
    ///
    /// IDs are assigned sequentially starting from 1 (0 is Air).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if a type with the same name
    /// already exists, or [`RegistryError::RegistryFull`] once 128 types exist.
    pub fn register(&mut self, def: BlockDef) -> Result<BlockId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.types.len() >= MAX_BLOCK_TYPES {
            return Err(RegistryError::RegistryFull);
        }

        let id = BlockId(self.types.len() as i8);
        self.name_to_id.insert(def.name.clone(), id);
        self.types.push(def);
        Ok(id)
    }

    /// Returns the definition for `id`, or `None` if unregistered or NONE.
    pub fn def(&self, id: BlockId) -> Option<&BlockDef> {
        id.index().and_then(|i| self.types.get(i))
    }

    /// Returns the ID for a named block type, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    /// Returns the total number of registered types (including Air).
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if only Air is registered.
    pub fn is_empty(&self) -> bool {
        self.types.len() <= 1
    }

    /// Returns `true` if `id` fully blocks light.
    pub fn is_opaque(&self, id: BlockId) -> bool {
        self.def(id)
            .is_some_and(|d| d.transparency == Transparency::Opaque)
    }

    /// Returns `true` if `id` lets any light through. Unknown ids count as
    /// transparent.
    pub fn is_transparent(&self, id: BlockId) -> bool {
        !self.is_opaque(id)
    }

    /// Returns `true` if entities collide with `id`.
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.def(id).is_some_and(|d| d.solid)
    }

    /// Extra light attenuation of `id` (15 for opaque blocks, 0 for unknown).
    pub fn opacity(&self, id: BlockId) -> u8 {
        match self.def(id) {
            Some(d) if d.transparency == Transparency::Opaque => 15,
            Some(d) => d.opacity.min(15),
            None => 0,
        }
    }

    /// Light emitted by `id`.
    pub fn light_emission(&self, id: BlockId) -> u8 {
        self.def(id).map_or(0, |d| d.light_emission.min(15))
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
