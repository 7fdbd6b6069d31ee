//! Column generation: terrain materials, the opaque-height record, and the
//! initial sky light of freshly generated columns.
//!
//! Terrain shape is delegated to a [`TerrainGenerator`]. The shipped
//! [`NoiseTerrain`] layers octaves of simplex noise (fractal Brownian motion)
//! into a heightmap and bands materials by depth below the surface.

use noise::{NoiseFn, Simplex};
use rustc_hash::FxHashSet;

use crate::chunk::{CHUNK_SIZE, Chunk, MAX_LIGHT};
use crate::chunk_manager::{ChunkProvider, ColumnData};
use crate::column::{ChunkColumn, WORLD_HEIGHT};
use crate::coords::Vec3i;
use crate::registry::{BlockId, BlockRegistry};

/// Source of terrain shape and material.
pub trait TerrainGenerator: Send {
    /// World y of the topmost terrain block at world `(wx, wz)`.
    fn surface_height(&self, wx: i32, wz: i32) -> i32;

    /// Terrain block `depth` blocks below the surface at `surface_y`.
    fn material(&self, wx: i32, wz: i32, depth: i32, surface_y: i32) -> BlockId;
}

/// Block ids used by [`NoiseTerrain`].
#[derive(Clone, Copy, Debug)]
pub struct TerrainPalette {
    pub grass: BlockId,
    pub dirt: BlockId,
    pub stone: BlockId,
    pub bedrock: BlockId,
    pub sand: BlockId,
}

/// Configuration for the fBm heightmap.
#[derive(Clone, Debug)]
pub struct NoiseTerrainParams {
    /// World seed for deterministic generation.
    pub seed: u64,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave.
    pub base_frequency: f64,
    /// Amplitude of the first octave, in blocks.
    pub amplitude: f64,
    /// Height the noise oscillates around.
    pub base_height: i32,
    /// Surfaces within one block of this level are sand.
    pub water_level: i32,
}

impl Default for NoiseTerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.01,
            amplitude: 24.0,
            base_height: 64,
            water_level: 62,
        }
    }
}

/// Simplex fBm heightmap with depth-banded materials.
pub struct NoiseTerrain {
    noise: Simplex,
    params: NoiseTerrainParams,
    palette: TerrainPalette,
}

impl NoiseTerrain {
    /// Creates a terrain generator with the given parameters.
    pub fn new(params: NoiseTerrainParams, palette: TerrainPalette) -> Self {
        let noise = Simplex::new(params.seed as u32);
        Self {
            noise,
            params,
            palette,
        }
    }

    /// Return a reference to the current parameters.
    pub fn params(&self) -> &NoiseTerrainParams {
        &self.params
    }

    fn sample(&self, x: f64, z: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, z * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }
}

impl TerrainGenerator for NoiseTerrain {
    fn surface_height(&self, wx: i32, wz: i32) -> i32 {
        let h = self.params.base_height as f64 + self.sample(wx as f64, wz as f64);
        (h.round() as i32).clamp(1, WORLD_HEIGHT - 1)
    }

    fn material(&self, _wx: i32, _wz: i32, depth: i32, surface_y: i32) -> BlockId {
        let y = surface_y - depth;
        let shore = surface_y <= self.params.water_level + 1;
        if y <= 0 {
            self.palette.bedrock
        } else if depth == 0 {
            if shore { self.palette.sand } else { self.palette.grass }
        } else if depth <= 3 {
            if shore { self.palette.sand } else { self.palette.dirt }
        } else {
            self.palette.stone
        }
    }
}

/// Produces whole columns from a [`TerrainGenerator`], flooding everything
/// between the terrain and the water level.
pub struct ColumnGenerator {
    terrain: Box<dyn TerrainGenerator>,
    water_level: i32,
    water: BlockId,
    water_opacity: u8,
    /// Ids that raise the column height record.
    opaque: FxHashSet<BlockId>,
}

impl ColumnGenerator {
    /// Creates a column generator. Opacity of the terrain materials and the
    /// sky light lost per block of water depth come from `blocks`.
    pub fn new(
        terrain: Box<dyn TerrainGenerator>,
        water_level: i32,
        water: BlockId,
        blocks: &BlockRegistry,
    ) -> Self {
        let opaque = (0..blocks.len())
            .map(|i| BlockId(i as i8))
            .filter(|&id| blocks.is_opaque(id))
            .collect();
        Self {
            terrain,
            water_level,
            water,
            water_opacity: blocks.opacity(water),
            opaque,
        }
    }

    /// Generates the column at chunk coordinates `(cx, cz)`.
    ///
    /// Only chunks up to the highest terrain or water block are produced;
    /// the rest of the column is open sky.
    pub fn generate(&self, cx: i32, cz: i32) -> ColumnData {
        let size = CHUNK_SIZE as i32;
        let mut column = ChunkColumn::new();
        let mut surfaces = [0i32; CHUNK_SIZE * CHUNK_SIZE];
        let mut top = 0;
        for lz in 0..size {
            for lx in 0..size {
                let surface = self
                    .terrain
                    .surface_height(cx * size + lx, cz * size + lz)
                    .clamp(0, WORLD_HEIGHT - 1);
                surfaces[(lx + lz * size) as usize] = surface;
                top = top.max(surface).max(self.water_level.min(WORLD_HEIGHT - 1));
            }
        }

        let chunk_count = (top / size + 1) as usize;
        let mut chunks: Vec<Chunk> = (0..chunk_count)
            .map(|_| Chunk::with_sky_light(MAX_LIGHT))
            .collect();
        let mut light_updates = Vec::new();

        for lz in 0..size {
            for lx in 0..size {
                let (wx, wz) = (cx * size + lx, cz * size + lz);
                let surface = surfaces[(lx + lz * size) as usize];
                let line_top = surface.max(self.water_level.min(WORLD_HEIGHT - 1));
                let mut height = None;
                for y in (0..=line_top).rev() {
                    let chunk = &mut chunks[(y / size) as usize];
                    let ly = y % size;
                    if y <= surface {
                        let id = self.terrain.material(wx, wz, surface - y, surface);
                        if height.is_none() && self.opaque.contains(&id) {
                            height = Some(y);
                        }
                        chunk.set_block(lx, ly, lz, id);
                        chunk.set_sky_light(lx, ly, lz, 0);
                    } else {
                        let depth = (self.water_level - y + 1) as u32;
                        let attenuation = depth.saturating_mul(self.water_opacity as u32);
                        let sky = (MAX_LIGHT as u32).saturating_sub(attenuation) as u8;
                        chunk.set_block(lx, ly, lz, self.water);
                        chunk.set_sky_light(lx, ly, lz, sky);
                        light_updates.push(Vec3i::new(wx, y, wz));
                    }
                }
                column.set_tallest_opaque(lx, lz, height.unwrap_or(0));
            }
        }

        let chunks = chunks
            .into_iter()
            .enumerate()
            .map(|(cy, mut chunk)| {
                chunk.clear_dirty(crate::chunk::ALL_DIRTY);
                (cy as i32, chunk)
            })
            .collect();

        tracing::trace!("Generated column ({cx}, {cz}) up to y={top}");
        ColumnData {
            column,
            chunks,
            light_updates,
        }
    }
}

impl ChunkProvider for ColumnGenerator {
    fn provide_column(&mut self, x: i32, z: i32) -> Option<ColumnData> {
        Some(self.generate(x, z))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
