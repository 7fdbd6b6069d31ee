//! The simulated world on top of the chunk store: block registry and
//! behaviors, the [`World`] facade with light and fluid scheduling, players,
//! and save files.

pub mod behavior;
pub mod fluid;
mod light;
pub mod player;
pub mod registry;
pub mod save;
pub mod world;

pub use behavior::{BlockBehavior, DoorBlock, FallingBlock, FluidBlock, GrassBlock, PlainBlock};
pub use fluid::{FluidInstance, do_fluid_tick};
pub use player::PlayerState;
pub use registry::{FluidDef, FluidId, Registry, StandardBlocks};
pub use save::{
    CURRENT_SAVE_VERSION, SAVE_FILE_NAME, SaveError, SaveFile, SaveHeader, decode_save,
    encode_world, load_save, save_world,
};
pub use world::{EditError, RaycastHit, World};
