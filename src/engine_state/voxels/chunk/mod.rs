//! # Chunk Module
//!
//! This module provides the `Chunk` struct for managing 16x16x16 blocks of
//! voxel data.
//!
//! ## Storage
//!
//! - `solid_array`: one bit per block, set when the block is anything but air.
//!   Integrity checks and obstruction tests only need to know whether a cell is
//!   empty, so they never touch the block vector for air.
//! - `blocks`: dense block data in x, then z, then y order.
//!
//! ### Performance Characteristics
//! - **Solidity Check**: O(1)
//! - **Block Lookup**: O(1)
//! - **Non-air count**: O(1) amortised via the bit vector popcount

use bitvec::prelude::BitVec;
use cgmath::Point3;

use super::block::{Block, BlockPos};

/// The dimension (width, height, depth) of a chunk in blocks.
pub const CHUNK_DIMENSION: i32 = 16;
/// The number of blocks in a single 2D plane of a chunk (CHUNK_DIMENSION²).
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of blocks in a chunk (CHUNK_DIMENSION³).
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// Chunk coordinates (block coordinates divided by `CHUNK_DIMENSION`).
pub type ChunkPos = Point3<i32>;

/// Represents a 16x16x16 collection of voxel blocks in the world.
#[derive(Clone)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates (not block coordinates).
    pub position: ChunkPos,

    /// One bit per block, set for non-air blocks.
    pub solid_array: BitVec,

    /// Block data for every cell of the chunk.
    pub blocks: Vec<Block>,
}

impl Chunk {
    /// Creates a new, completely empty chunk (all blocks are air).
    pub fn empty(position: ChunkPos) -> Self {
        Chunk {
            position,
            solid_array: BitVec::repeat(false, CHUNK_SIZE as usize),
            blocks: vec![Block::AIR; CHUNK_SIZE as usize],
        }
    }

    /// The chunk containing the given block position.
    pub fn chunk_pos_of(pos: BlockPos) -> ChunkPos {
        Point3::new(
            pos.x.div_euclid(CHUNK_DIMENSION),
            pos.y.div_euclid(CHUNK_DIMENSION),
            pos.z.div_euclid(CHUNK_DIMENSION),
        )
    }

    /// Index of a world block position inside its chunk's storage.
    fn local_index(pos: BlockPos) -> usize {
        let x = pos.x.rem_euclid(CHUNK_DIMENSION);
        let y = pos.y.rem_euclid(CHUNK_DIMENSION);
        let z = pos.z.rem_euclid(CHUNK_DIMENSION);
        (x + z * CHUNK_DIMENSION + y * CHUNK_PLANE_SIZE) as usize
    }

    /// Returns the block at a world position inside this chunk.
    pub fn get_block_at(&self, pos: BlockPos) -> Block {
        let index = Self::local_index(pos);
        if !self.solid_array[index] {
            return Block::AIR;
        }
        self.blocks[index]
    }

    /// Writes a block at a world position inside this chunk.
    pub fn set_block_at(&mut self, pos: BlockPos, block: Block) {
        let index = Self::local_index(pos);
        self.solid_array.set(index, !block.is_air());
        self.blocks[index] = block;
    }

    pub fn is_solid_at(&self, pos: BlockPos) -> bool {
        self.solid_array[Self::local_index(pos)]
    }

    /// Number of non-air blocks in the chunk.
    pub fn solid_count(&self) -> usize {
        self.solid_array.count_ones()
    }

    /// True when the chunk holds nothing but air and can be dropped.
    pub fn is_empty(&self) -> bool {
        self.solid_array.not_any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn negative_positions_map_into_their_own_chunk() {
        assert_eq!(Chunk::chunk_pos_of(Point3::new(-1, 0, 15)), Point3::new(-1, 0, 0));
        assert_eq!(Chunk::chunk_pos_of(Point3::new(16, -17, 0)), Point3::new(1, -2, 0));
    }

    #[test]
    fn set_then_get_tracks_solidity() {
        let mut chunk = Chunk::empty(Point3::new(0, 0, 0));
        let pos = Point3::new(3, 4, 5);
        chunk.set_block_at(pos, Block::new(BlockType::STONE));
        assert!(chunk.is_solid_at(pos));
        assert_eq!(chunk.get_block_at(pos).block_type, BlockType::STONE);
        assert_eq!(chunk.solid_count(), 1);

        chunk.set_block_at(pos, Block::AIR);
        assert!(chunk.is_empty());
    }
}
