//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world and the
//! handful of properties the movement code cares about: whether a block is
//! passable, water, replaceable by a moving craft, explosive, or carries a
//! facing in its state.

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::BlockTypeSize;

/// Enumerates all possible block types in the voxel world.
///
/// The discriminant doubles as the numeric block id used in compact storage and
/// in craft-type configuration files. `FromPrimitive` allows conversion back
/// from that id.
#[repr(u8)]
#[allow(non_camel_case_types)]
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, FromPrimitive, Serialize, Deserialize,
)]
pub enum BlockType {
    /// Empty space.
    AIR = 0,
    STONE,
    DIRT,
    GRASS,
    WOOD,
    WHITE,
    PLANKS,
    WOOL,
    GLASS,
    IRON_BLOCK,
    /// Flowing water. Passable, and not counted as hull by the overall sink ratio.
    WATER,
    /// Still water. Same movement rules as `WATER`.
    STATIONARY_WATER,
    /// Decoration that a moving craft overwrites and drops as an item.
    FLOWER,
    /// Decoration that a moving craft overwrites and drops as an item.
    TALL_GRASS,
    /// Explodes when a craft with a collision explosion rams into it.
    TNT,
    /// Orientation-sensitive: facing lives in the low two state bits.
    STAIRS,
    /// Orientation-sensitive: facing lives in the low two state bits.
    DISPENSER,
    /// Orientation-sensitive: facing lives in the low two state bits.
    LEVER,
    /// Orientation-sensitive: facing lives in the low two state bits.
    PISTON,
    /// Orientation-sensitive: facing lives in the low two state bits.
    SIGN,
    /// Client-side marker used for explosive tracers.
    COBWEB,
    BEDROCK,
}

impl BlockType {
    /// Converts a numeric block id to a `BlockType`, if the id is known.
    pub fn from_id(btype: BlockTypeSize) -> Option<Self> {
        num::FromPrimitive::from_u8(btype)
    }

    /// The numeric id stored in compact block data.
    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    pub fn is_air(self) -> bool {
        self == BlockType::AIR
    }

    pub fn is_water(self) -> bool {
        matches!(self, BlockType::WATER | BlockType::STATIONARY_WATER)
    }

    /// Blocks a craft can move into without displacing anything.
    pub fn is_passable(self) -> bool {
        self.is_air() || self.is_water()
    }

    /// Blocks a craft can move into by destroying them (they drop as items).
    pub fn is_replaceable(self) -> bool {
        matches!(self, BlockType::FLOWER | BlockType::TALL_GRASS)
    }

    pub fn is_explosive(self) -> bool {
        self == BlockType::TNT
    }

    /// Whether the block stores a horizontal facing in its state that has to be
    /// remapped when the block is rotated.
    pub fn is_orientable(self) -> bool {
        matches!(
            self,
            BlockType::STAIRS
                | BlockType::DISPENSER
                | BlockType::LEVER
                | BlockType::PISTON
                | BlockType::SIGN
        )
    }

    /// Generates a random solid hull material.
    ///
    /// Used for procedural test hulls and the demo scene.
    pub fn get_random_hull_type() -> Self {
        const HULL: [BlockType; 4] = [
            BlockType::PLANKS,
            BlockType::WOOD,
            BlockType::WOOL,
            BlockType::IRON_BLOCK,
        ];
        HULL[fastrand::usize(..HULL.len())]
    }
}
