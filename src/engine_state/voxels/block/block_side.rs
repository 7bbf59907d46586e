//! # Block Side Module
//!
//! This module defines the faces of a voxel block and the quarter-turn
//! rotations that craft rotation applies to them.

use cgmath::Vector3;
use serde::{Deserialize, Serialize};

/// A quarter turn about the vertical axis, as seen from above.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    NONE,
    CLOCKWISE,
    ANTICLOCKWISE,
}

impl Rotation {
    /// The rotation that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Rotation::NONE => Rotation::NONE,
            Rotation::CLOCKWISE => Rotation::ANTICLOCKWISE,
            Rotation::ANTICLOCKWISE => Rotation::CLOCKWISE,
        }
    }
}

/// Represents the six faces of a voxel block.
///
/// The four horizontal faces come first so that their discriminants can be
/// stored directly in the two low state bits of orientation-sensitive blocks.
///
/// Clockwise order (from above) is: NORTH (-Z), EAST (+X), SOUTH (+Z), WEST (-X).
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    NORTH = 0,
    EAST = 1,
    SOUTH = 2,
    WEST = 3,
    UP = 4,
    DOWN = 5,
}

impl BlockSide {
    /// Returns all six block faces.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::NORTH,
            BlockSide::EAST,
            BlockSide::SOUTH,
            BlockSide::WEST,
            BlockSide::UP,
            BlockSide::DOWN,
        ]
    }

    /// Decodes a horizontal facing from the low two bits of a block state.
    pub fn from_state(state: u8) -> BlockSide {
        match state & 0b11 {
            0 => BlockSide::NORTH,
            1 => BlockSide::EAST,
            2 => BlockSide::SOUTH,
            _ => BlockSide::WEST,
        }
    }

    /// Unit offset to the neighbouring block on this side.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            BlockSide::NORTH => Vector3::new(0, 0, -1),
            BlockSide::EAST => Vector3::new(1, 0, 0),
            BlockSide::SOUTH => Vector3::new(0, 0, 1),
            BlockSide::WEST => Vector3::new(-1, 0, 0),
            BlockSide::UP => Vector3::new(0, 1, 0),
            BlockSide::DOWN => Vector3::new(0, -1, 0),
        }
    }

    /// Applies a quarter turn. Vertical faces are unaffected.
    pub fn rotated(self, rotation: Rotation) -> BlockSide {
        let horizontal = self as u8;
        if horizontal > 3 {
            return self;
        }
        match rotation {
            Rotation::NONE => self,
            Rotation::CLOCKWISE => BlockSide::from_state(horizontal + 1),
            Rotation::ANTICLOCKWISE => BlockSide::from_state(horizontal + 3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BlockSide, Rotation};

    #[test]
    fn clockwise_walks_the_compass() {
        assert_eq!(BlockSide::NORTH.rotated(Rotation::CLOCKWISE), BlockSide::EAST);
        assert_eq!(BlockSide::WEST.rotated(Rotation::CLOCKWISE), BlockSide::NORTH);
        assert_eq!(BlockSide::NORTH.rotated(Rotation::ANTICLOCKWISE), BlockSide::WEST);
        assert_eq!(BlockSide::UP.rotated(Rotation::CLOCKWISE), BlockSide::UP);
    }

    #[test]
    fn four_quarter_turns_are_identity() {
        for side in BlockSide::all() {
            let mut turned = side;
            for _ in 0..4 {
                turned = turned.rotated(Rotation::CLOCKWISE);
            }
            assert_eq!(turned, side);
        }
    }

    #[test]
    fn inverse_rotation_undoes() {
        for side in BlockSide::all() {
            let rotation = Rotation::CLOCKWISE;
            assert_eq!(side.rotated(rotation).rotated(rotation.inverse()), side);
        }
    }
}
