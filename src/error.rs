//! Error types.
//!
//! Every craft failure is local to that craft: it is reported to the craft's
//! notification target (or logged when there is none) and never aborts a tick.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine_state::crafts::CraftId;
use crate::engine_state::voxels::block::{block_type::BlockType, BlockPos};
use crate::engine_state::voxels::chunk::ChunkPos;
use crate::engine_state::voxels::world::WorldId;

/// The craft is not allowed to exist or move in its current composition or place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    #[error("Detection - Craft too large - Max size {max}")]
    TooLarge { max: usize },
    #[error("Detection - Craft too small - Min size {min}, found {found}")]
    TooSmall { min: usize, found: usize },
    #[error("Detection - Forbidden block {block:?} found at {position:?}")]
    ForbiddenBlock { block: BlockType, position: BlockPos },
    #[error("Detection - {block:?} is not part of a {craft_type}")]
    SeedNotAllowed { block: BlockType, craft_type: String },
    #[error("Not enough flyblock: {blocks} {found:.2}% < {required:.2}%")]
    FlyBlockShortfall {
        blocks: String,
        found: f64,
        required: f64,
    },
    #[error("Too much flyblock: {blocks} {found:.2}% > {allowed:.2}%")]
    FlyBlockExcess {
        blocks: String,
        found: f64,
        allowed: f64,
    },
    #[error("Translation - Failed Craft hit height limit {limit}")]
    HeightLimit { limit: i32 },
    #[error("Craft is moving into unloaded chunk {chunk:?}")]
    UnloadedChunk { chunk: ChunkPos },
}

/// Another craft or controller already owns what this request touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OwnershipConflict {
    #[error("Detection - Failed - Already commanding a craft")]
    AlreadyCommanding,
    #[error("Detection - Failed Craft is already being controlled")]
    AlreadyControlled,
    #[error("Parent Craft is busy")]
    ParentBusy,
    #[error("Craft is busy")]
    CraftBusy,
}

/// An injected region or permission policy refused the action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyDenial {
    #[error("Player- Craft should sink but PVP is not allowed in this region")]
    PvpRegion,
    #[error("Sinking a craft is not allowed in this region")]
    CustomFlag,
    #[error("Sinking a craft is not allowed in this town plot @ {at:?}")]
    TownPlot { at: BlockPos },
    #[error("Insufficient permissions to move the craft to {position:?}")]
    MoveDenied { position: BlockPos },
    #[error("{0}")]
    Other(String),
}

/// Why a structural task did not produce a world update.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CraftError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("Craft is obstructed by {block:?} at {position:?}")]
    Obstruction { position: BlockPos, block: BlockType },
    /// Obstructed, but the collision still produces an effect (an explosion)
    /// that goes through the update queue.
    #[error("Craft collided with {block:?} at {position:?}")]
    ObstructionWithEffect { position: BlockPos, block: BlockType },
    #[error(transparent)]
    OwnershipConflict(#[from] OwnershipConflict),
    #[error(transparent)]
    PolicyDenied(#[from] PolicyDenial),
    #[error("No such craft: {0}")]
    UnknownCraft(CraftId),
    #[error("World {0:?} is not managed by this coordinator")]
    UnknownWorld(WorldId),
}

impl CraftError {
    pub fn is_obstruction(&self) -> bool {
        matches!(
            self,
            CraftError::Obstruction { .. } | CraftError::ObstructionWithEffect { .. }
        )
    }
}

/// The update queue rejected a batch at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("Craft collision at {position:?} with {occupant}")]
    Collision { position: BlockPos, occupant: CraftId },
    #[error("Update batch writes {position:?} for more than one craft")]
    MixedOwnership { position: BlockPos },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EconomyError {
    #[error("Deposit of {amount} to {account} failed: {reason}")]
    DepositFailed {
        account: String,
        amount: i64,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_pass_through_transparently() {
        let error: CraftError = ValidationFailure::TooLarge { max: 10 }.into();
        assert_eq!(error.to_string(), "Detection - Craft too large - Max size 10");

        let conflict: CraftError = OwnershipConflict::AlreadyControlled.into();
        assert_eq!(
            conflict.to_string(),
            "Detection - Failed Craft is already being controlled"
        );
    }

    #[test]
    fn obstruction_variants_are_grouped() {
        let position = cgmath::Point3::new(1, 2, 3);
        assert!(CraftError::Obstruction {
            position,
            block: BlockType::STONE
        }
        .is_obstruction());
        assert!(!CraftError::from(PolicyDenial::PvpRegion).is_obstruction());
    }
}
