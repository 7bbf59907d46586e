//! # Voxels
//!
//! Everything the engine knows about worlds, independent of craft.
//!
//! * **Block**: block types, block state and facing, quarter-turn rotation
//! * **Chunk**: 16x16x16 block storage used by the reference world
//! * **Entity**: identifiers and views of players, passengers and projectiles
//! * **World**: the `WorldAccess` collaborator trait and the in-memory `VoxelWorld`
//!
//! ## Thread Safety
//!
//! Worlds are shared as `MtResource<W>`. Structural tasks take read guards on
//! worker threads; only the tick loop takes write guards.

pub mod block;
pub mod chunk;
pub mod entity;
pub mod world;
