//! # Block Module
//!
//! Block data as stored in the world and carried through block deltas.

use block_side::{BlockSide, Rotation};
use block_type::BlockType;
use cgmath::Point3;

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block types in memory.
pub type BlockTypeSize = u8;

/// Absolute integer coordinates of a block in a world.
pub type BlockPos = Point3<i32>;

/// Mask of the state bits that hold a horizontal facing.
const FACING_MASK: u8 = 0b11;

/// Represents a single voxel block in the world: a type plus a small state
/// value (facing for orientation-sensitive blocks, free-form otherwise).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub block_type: BlockType,
    pub state: u8,
}

impl Block {
    pub const AIR: Block = Block {
        block_type: BlockType::AIR,
        state: 0,
    };

    /// Creates a block of the specified type with a zero state.
    pub fn new(block_type: BlockType) -> Self {
        Block {
            block_type,
            state: 0,
        }
    }

    pub fn with_state(block_type: BlockType, state: u8) -> Self {
        Block { block_type, state }
    }

    /// Creates an orientation-sensitive block facing `side`.
    pub fn facing(block_type: BlockType, side: BlockSide) -> Self {
        Block {
            block_type,
            state: side as u8 & FACING_MASK,
        }
    }

    pub fn is_air(&self) -> bool {
        self.block_type.is_air()
    }

    /// The horizontal facing, for orientation-sensitive blocks.
    pub fn side(&self) -> Option<BlockSide> {
        self.block_type
            .is_orientable()
            .then(|| BlockSide::from_state(self.state))
    }

    /// Returns this block as it looks after a quarter turn.
    ///
    /// Only the facing bits of orientation-sensitive blocks change; every
    /// other block is returned untouched.
    pub fn rotated(self, rotation: Rotation) -> Self {
        match self.side() {
            Some(side) => Block {
                block_type: self.block_type,
                state: (self.state & !FACING_MASK) | side.rotated(rotation) as u8,
            },
            None => self,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::AIR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_keeps_upper_state_bits() {
        let stairs = Block::with_state(BlockType::STAIRS, 0b1000_0000 | BlockSide::NORTH as u8);
        let turned = stairs.rotated(Rotation::CLOCKWISE);
        assert_eq!(turned.side(), Some(BlockSide::EAST));
        assert_eq!(turned.state & 0b1000_0000, 0b1000_0000);
    }

    #[test]
    fn plain_blocks_ignore_rotation() {
        let planks = Block::with_state(BlockType::PLANKS, 3);
        assert_eq!(planks.rotated(Rotation::CLOCKWISE), planks);
        assert_eq!(planks.side(), None);
    }
}
