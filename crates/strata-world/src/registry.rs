//! Block and fluid registry: static block data plus the behavior table.
//!
//! A [`Registry`] is built once at startup and shared with the [`World`]
//! through an `Arc`. Behaviors are indexed by block id, so the world can run
//! block-specific callbacks without knowing any concrete block kind.
//!
//! [`World`]: crate::World

use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_voxel::{
    BlockDef, BlockId, BlockRegistry, ColumnGenerator, NoiseTerrain, NoiseTerrainParams,
    RegistryError, TerrainPalette, Transparency,
};

use crate::behavior::{BlockBehavior, DoorBlock, FallingBlock, FluidBlock, GrassBlock, PlainBlock};

/// Index of a registered fluid kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FluidId(pub u8);

/// Static data describing one fluid kind.
#[derive(Clone, Debug)]
pub struct FluidDef {
    /// Human-readable name.
    pub name: String,
    /// The block that represents this fluid in the world.
    pub block: BlockId,
    /// Maximum spread distance from a source. Reserved; spreading is
    /// currently unbounded.
    pub max_distance: Option<u8>,
}

/// Block definitions, per-block behaviors, and fluid kinds.
pub struct Registry {
    blocks: BlockRegistry,
    behaviors: Vec<Arc<dyn BlockBehavior>>,
    tickable: Vec<bool>,
    fluids: Vec<FluidDef>,
    fluid_by_block: FxHashMap<BlockId, FluidId>,
}

impl Registry {
    /// Creates a registry containing only air.
    pub fn new() -> Self {
        let plain: Arc<dyn BlockBehavior> = Arc::new(PlainBlock);
        Self {
            blocks: BlockRegistry::new(),
            behaviors: vec![plain],
            tickable: vec![false],
            fluids: Vec::new(),
            fluid_by_block: FxHashMap::default(),
        }
    }

    /// Registers a block type with its behavior.
    pub fn register_block(
        &mut self,
        def: BlockDef,
        behavior: Arc<dyn BlockBehavior>,
    ) -> Result<BlockId, RegistryError> {
        let id = self.blocks.register(def)?;
        self.tickable.push(behavior.is_randomly_tickable());
        self.behaviors.push(behavior);
        Ok(id)
    }

    /// Registers a fluid kind together with the block that represents it.
    pub fn register_fluid(&mut self, def: BlockDef) -> Result<(FluidId, BlockId), RegistryError> {
        if self.fluids.len() > u8::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }
        let fluid = FluidId(self.fluids.len() as u8);
        let name = def.name.clone();
        let block = self.register_block(def, Arc::new(FluidBlock { fluid }))?;
        self.fluids.push(FluidDef {
            name,
            block,
            max_distance: None,
        });
        self.fluid_by_block.insert(block, fluid);
        Ok((fluid, block))
    }

    /// The block data table.
    pub fn blocks(&self) -> &BlockRegistry {
        &self.blocks
    }

    /// Behavior of `id`, or `None` for unregistered ids and NONE.
    pub fn behavior(&self, id: BlockId) -> Option<&Arc<dyn BlockBehavior>> {
        id.index().and_then(|i| self.behaviors.get(i))
    }

    /// Returns `true` if blocks of this type belong in a chunk's tickable set.
    pub fn is_randomly_tickable(&self, id: BlockId) -> bool {
        id.index()
            .and_then(|i| self.tickable.get(i).copied())
            .unwrap_or(false)
    }

    /// Fluid kind `fluid`.
    pub fn fluid(&self, fluid: FluidId) -> Option<&FluidDef> {
        self.fluids.get(fluid.0 as usize)
    }

    /// The fluid kind that `block` represents, if any.
    pub fn fluid_for_block(&self, block: BlockId) -> Option<FluidId> {
        self.fluid_by_block.get(&block).copied()
    }

    /// Number of registered fluid kinds.
    pub fn fluid_count(&self) -> usize {
        self.fluids.len()
    }

    /// Builds the default block set used by the server and client binaries.
    pub fn standard() -> Result<(Registry, StandardBlocks), RegistryError> {
        let mut reg = Registry::new();
        let plain = || -> Arc<dyn BlockBehavior> { Arc::new(PlainBlock) };
        let falling = || -> Arc<dyn BlockBehavior> { Arc::new(FallingBlock) };

        let stone = reg.register_block(BlockDef::opaque("stone"), plain())?;
        let dirt = reg.register_block(BlockDef::opaque("dirt"), plain())?;
        let grass = reg.register_block(BlockDef::opaque("grass"), Arc::new(GrassBlock { dirt }))?;
        let sand = reg.register_block(BlockDef::opaque("sand"), falling())?;
        let gravel = reg.register_block(BlockDef::opaque("gravel"), falling())?;
        let bedrock = reg.register_block(BlockDef::opaque("bedrock"), plain())?;
        let (water_fluid, water) = reg.register_fluid(BlockDef::translucent("water", false, 2))?;
        let leaves = reg.register_block(BlockDef::translucent("leaves", true, 1), plain())?;
        let glass = reg.register_block(
            BlockDef {
                name: "glass".to_string(),
                solid: true,
                transparency: Transparency::FullyTransparent,
                opacity: 0,
                light_emission: 0,
            },
            plain(),
        )?;
        let door = reg.register_block(BlockDef::translucent("door", true, 0), Arc::new(DoorBlock))?;

        Ok((
            reg,
            StandardBlocks {
                stone,
                dirt,
                grass,
                sand,
                gravel,
                bedrock,
                water,
                water_fluid,
                leaves,
                glass,
                door,
            },
        ))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids assigned by [`Registry::standard`].
#[derive(Clone, Copy, Debug)]
pub struct StandardBlocks {
    pub stone: BlockId,
    pub dirt: BlockId,
    pub grass: BlockId,
    pub sand: BlockId,
    pub gravel: BlockId,
    pub bedrock: BlockId,
    pub water: BlockId,
    pub water_fluid: FluidId,
    pub leaves: BlockId,
    pub glass: BlockId,
    pub door: BlockId,
}

impl StandardBlocks {
    /// Terrain materials for [`NoiseTerrain`].
    pub fn palette(&self) -> TerrainPalette {
        TerrainPalette {
            grass: self.grass,
            dirt: self.dirt,
            stone: self.stone,
            bedrock: self.bedrock,
            sand: self.sand,
        }
    }

    /// Noise terrain flooded with water up to `water_level`.
    pub fn column_generator(
        &self,
        registry: &Registry,
        seed: u64,
        water_level: i32,
    ) -> ColumnGenerator {
        let params = NoiseTerrainParams {
            seed,
            water_level,
            ..Default::default()
        };
        let terrain = NoiseTerrain::new(params, self.palette());
        ColumnGenerator::new(
            Box::new(terrain),
            water_level,
            self.water,
            registry.blocks(),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
