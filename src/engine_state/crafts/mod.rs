//! # Crafts
//!
//! A craft is a registered set of world blocks that moves as one unit.
//!
//! * **Craft Type**: the immutable rule book (`craft_type`)
//! * **Registry**: live craft per world and the controller bindings (`registry`)
//! * **Spatial**: bounds, hitboxes and quarter-turn math (`spatial`)
//! * **Tasks**: detection, translation and rotation computations (`tasks`)
//!
//! ## Processing State
//!
//! Each craft carries a tri-state processing guard, touched only by the tick
//! loop:
//!
//! ```text
//! Idle -> Dispatched -> Completed -> Idle
//!             |                       ^
//!             +-----------------------+   (failed or empty result)
//! ```
//!
//! `Completed` means the task's world update is waiting in the update queue.
//! The craft returns to `Idle` only once that update has been written or
//! rejected, so a new task can never be computed against a half-applied world.

pub mod craft_type;
pub mod registry;
pub mod spatial;
pub mod tasks;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use cgmath::{Point3, Vector3};

use self::craft_type::CraftType;
use self::spatial::{BoundingBox, HitBox};
use super::voxels::block::BlockPos;
use super::voxels::entity::PlayerId;
use super::voxels::world::WorldId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CraftId(pub u64);

impl fmt::Display for CraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "craft #{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProcessingState {
    #[default]
    Idle,
    /// A structural task is computing.
    Dispatched,
    /// The result is drained and its world update is queued.
    Completed,
}

/// A live craft.
#[derive(Clone, Debug)]
pub struct Craft {
    pub id: CraftId,
    pub world: WorldId,
    pub craft_type: Arc<CraftType>,
    block_list: Vec<BlockPos>,
    /// Block count at detection, minus anything carved out since.
    pub orig_block_count: usize,
    bounds: BoundingBox,
    hitbox: HitBox,
    processing: ProcessingState,
    pub cruising: bool,
    pub sinking: bool,
    pub pilot_locked: bool,
    pub keep_moving: bool,
    pub cruise_direction: Vector3<i32>,
    /// The last displacement this craft committed.
    pub last_move: Vector3<i32>,
    pub last_cruise_update: u64,
    pub last_right_click: u64,
    pub last_block_check: u64,
    pub sinking_since: Option<u64>,
    pub pilot_lock_anchor: Option<Point3<f64>>,
    pub last_pilot_lock_move: u64,
    /// Who receives this craft's messages. May differ from the controller.
    pub notification_target: Option<PlayerId>,
}

impl Craft {
    pub fn new(
        id: CraftId,
        world: WorldId,
        craft_type: Arc<CraftType>,
        block_list: Vec<BlockPos>,
    ) -> Self {
        let mut craft = Craft {
            id,
            world,
            craft_type,
            block_list: Vec::new(),
            orig_block_count: 0,
            bounds: BoundingBox {
                min: Point3::new(0, 0, 0),
                max: Point3::new(0, 0, 0),
            },
            hitbox: HitBox::default(),
            processing: ProcessingState::Idle,
            cruising: false,
            sinking: false,
            pilot_locked: false,
            keep_moving: false,
            cruise_direction: Vector3::new(0, 0, 0),
            last_move: Vector3::new(0, 0, 0),
            last_cruise_update: 0,
            last_right_click: 0,
            last_block_check: 0,
            sinking_since: None,
            pilot_lock_anchor: None,
            last_pilot_lock_move: 0,
            notification_target: None,
        };
        craft.set_blocks(block_list);
        craft.orig_block_count = craft.block_list.len();
        craft
    }

    pub fn block_list(&self) -> &[BlockPos] {
        &self.block_list
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn hitbox(&self) -> &HitBox {
        &self.hitbox
    }

    pub fn size(&self) -> usize {
        self.block_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_list.is_empty()
    }

    /// Replaces the block list, dropping duplicate positions, and recomputes
    /// the bounding box and hitbox. An empty list keeps the previous bounds.
    pub fn set_blocks(&mut self, mut blocks: Vec<BlockPos>) {
        let mut seen = HashSet::with_capacity(blocks.len());
        blocks.retain(|block| seen.insert(*block));
        if let Some(bounds) = BoundingBox::from_blocks(&blocks) {
            self.bounds = bounds;
        }
        self.hitbox = HitBox::from_blocks(&blocks);
        self.block_list = blocks;
    }

    pub fn processing(&self) -> ProcessingState {
        self.processing
    }

    pub fn is_idle(&self) -> bool {
        self.processing == ProcessingState::Idle
    }

    pub(crate) fn set_processing(&mut self, state: ProcessingState) {
        self.processing = state;
    }

    /// Everything a structural task needs to know about this craft.
    pub fn snapshot(&self, controller: Option<PlayerId>) -> CraftSnapshot {
        CraftSnapshot {
            id: self.id,
            world: self.world,
            craft_type: Arc::clone(&self.craft_type),
            block_list: self.block_list.clone(),
            bounds: self.bounds,
            orig_block_count: self.orig_block_count,
            sinking: self.sinking,
            controller,
        }
    }
}

/// A copy of a craft's state taken at dispatch time.
#[derive(Clone, Debug)]
pub struct CraftSnapshot {
    pub id: CraftId,
    pub world: WorldId,
    pub craft_type: Arc<CraftType>,
    pub block_list: Vec<BlockPos>,
    pub bounds: BoundingBox,
    pub orig_block_count: usize,
    pub sinking: bool,
    pub controller: Option<PlayerId>,
}
