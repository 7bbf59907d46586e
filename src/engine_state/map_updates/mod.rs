//! # Map Updates
//!
//! Every world write the engine makes goes through here, on the tick thread.
//!
//! A structural task describes its result as an `UpdateBatch`: block deltas
//! plus the entity moves and item drops that go with them. The coordinator
//! queues the batch and, at the end of the tick, applies it with
//! `apply_update`. Application is all-or-nothing: the batch is validated
//! against the current craft occupancy first and nothing is written if any
//! destination belongs to another live craft.
//!
//! ## Write Order
//!
//! 1. Chunks touched by the batch are loaded
//! 2. Source positions that are not also destinations are cleared
//! 3. Destinations are written
//! 4. Visual effects fire
//! 5. Entities are moved and item drops spawned
//!
//! Clearing before writing keeps a block that is both a source and a
//! destination from ever being cleared.

use std::collections::{HashMap, HashSet, VecDeque};

use cgmath::Point3;

use crate::engine_state::crafts::{Craft, CraftId};
use crate::engine_state::voxels::block::{
    block_side::Rotation, block_type::BlockType, Block, BlockPos,
};
use crate::engine_state::voxels::chunk::Chunk;
use crate::engine_state::voxels::entity::EntityId;
use crate::engine_state::voxels::world::{WorldAccess, WorldId};
use crate::error::UpdateError;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum VisualEffect {
    Smoke,
    Explosion { power: f32 },
}

/// One proposed block write.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MapUpdateCommand {
    /// Where the block came from. `None` for blocks placed from nothing.
    pub old_position: Option<BlockPos>,
    pub new_position: BlockPos,
    /// `None` for effect-only entries that write no block.
    pub block: Option<Block>,
    pub craft: Option<CraftId>,
    /// Applied to the block's facing when it is written.
    pub rotation: Rotation,
    pub effect: Option<VisualEffect>,
}

impl MapUpdateCommand {
    /// Moves the block at `from` to `to`.
    pub fn moved(from: BlockPos, to: BlockPos, block: Block, craft: CraftId) -> Self {
        MapUpdateCommand {
            old_position: Some(from),
            new_position: to,
            block: Some(block),
            craft: Some(craft),
            rotation: Rotation::NONE,
            effect: None,
        }
    }

    /// Writes `block` at `at` with no source.
    pub fn place(at: BlockPos, block: Block) -> Self {
        MapUpdateCommand {
            old_position: None,
            new_position: at,
            block: Some(block),
            craft: None,
            rotation: Rotation::NONE,
            effect: None,
        }
    }

    /// Fires `effect` at `at` without touching any block.
    pub fn effect(at: BlockPos, effect: VisualEffect, craft: Option<CraftId>) -> Self {
        MapUpdateCommand {
            old_position: None,
            new_position: at,
            block: None,
            craft,
            rotation: Rotation::NONE,
            effect: Some(effect),
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_effect(mut self, effect: VisualEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    fn writes_block(&self) -> bool {
        self.block.is_some()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EntityUpdateCommand {
    pub entity: EntityId,
    pub to: Point3<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ItemDropUpdateCommand {
    pub at: Point3<f64>,
    pub block: Block,
}

/// Everything one task wants written, applied as a unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateBatch {
    /// The craft that owns the block deltas. `None` for world maintenance.
    pub craft: Option<CraftId>,
    pub blocks: Vec<MapUpdateCommand>,
    pub entities: Vec<EntityUpdateCommand>,
    pub item_drops: Vec<ItemDropUpdateCommand>,
    /// Cleared sources at or below this height are refilled with water.
    pub water_level: Option<i32>,
}

impl UpdateBatch {
    pub fn for_craft(craft: CraftId) -> Self {
        UpdateBatch {
            craft: Some(craft),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.entities.is_empty() && self.item_drops.is_empty()
    }
}

/// Which live craft owns each block position of one world.
#[derive(Clone, Debug, Default)]
pub struct Occupancy {
    owners: HashMap<BlockPos, CraftId>,
}

impl Occupancy {
    pub fn from_crafts<'a>(crafts: impl IntoIterator<Item = &'a Craft>) -> Self {
        let mut occupancy = Occupancy::default();
        for craft in crafts {
            occupancy.insert(craft.id, craft.block_list());
        }
        occupancy
    }

    pub fn owner(&self, pos: BlockPos) -> Option<CraftId> {
        self.owners.get(&pos).copied()
    }

    pub fn insert(&mut self, craft: CraftId, blocks: &[BlockPos]) {
        for block in blocks {
            self.owners.insert(*block, craft);
        }
    }

    /// Forgets `blocks` where they are still owned by `craft`.
    pub fn remove(&mut self, craft: CraftId, blocks: &[BlockPos]) {
        for block in blocks {
            if self.owners.get(block) == Some(&craft) {
                self.owners.remove(block);
            }
        }
    }

    pub fn replace(&mut self, craft: CraftId, old: &[BlockPos], new: &[BlockPos]) {
        self.remove(craft, old);
        self.insert(craft, new);
    }
}

/// Checks a batch against the current occupancy without writing anything.
pub fn validate_update(batch: &UpdateBatch, occupancy: &Occupancy) -> Result<(), UpdateError> {
    let sources: HashSet<BlockPos> = batch
        .blocks
        .iter()
        .filter_map(|command| command.old_position)
        .collect();

    let mut writers: HashMap<BlockPos, Option<CraftId>> = HashMap::new();
    for command in batch.blocks.iter().filter(|c| c.writes_block()) {
        let position = command.new_position;
        if let Some(previous) = writers.insert(position, command.craft) {
            if previous != command.craft {
                return Err(UpdateError::MixedOwnership { position });
            }
        }
        if sources.contains(&position) {
            continue;
        }
        if let Some(occupant) = occupancy.owner(position) {
            if Some(occupant) != batch.craft {
                return Err(UpdateError::Collision { position, occupant });
            }
        }
    }
    Ok(())
}

/// Validates and, only if the whole batch is clear, writes it to `world`.
pub fn apply_update<W: WorldAccess + ?Sized>(
    world: &mut W,
    batch: &UpdateBatch,
    occupancy: &Occupancy,
) -> Result<(), UpdateError> {
    validate_update(batch, occupancy)?;

    let mut chunks: Vec<_> = batch
        .blocks
        .iter()
        .flat_map(|command| command.old_position.into_iter().chain([command.new_position]))
        .map(Chunk::chunk_pos_of)
        .collect();
    chunks.sort_by_key(|chunk| (chunk.x, chunk.y, chunk.z));
    chunks.dedup();
    for chunk in chunks {
        if !world.is_loaded(chunk) {
            world.load_chunk(chunk);
        }
    }

    let destinations: HashSet<BlockPos> = batch
        .blocks
        .iter()
        .filter(|command| command.writes_block())
        .map(|command| command.new_position)
        .collect();

    for source in batch.blocks.iter().filter_map(|command| command.old_position) {
        if destinations.contains(&source) {
            continue;
        }
        let fill = match batch.water_level {
            Some(level) if source.y <= level => Block::new(BlockType::STATIONARY_WATER),
            _ => Block::AIR,
        };
        world.set_block(source, fill);
    }

    for command in &batch.blocks {
        if let Some(block) = command.block {
            world.set_block(command.new_position, block.rotated(command.rotation));
        }
    }

    for command in &batch.blocks {
        match command.effect {
            Some(VisualEffect::Smoke) => world.spawn_smoke(command.new_position),
            Some(VisualEffect::Explosion { power }) => {
                world.create_explosion(command.new_position, power)
            }
            None => {}
        }
    }

    for entity in &batch.entities {
        world.move_entity(entity.entity, entity.to);
    }
    for drop in &batch.item_drops {
        world.spawn_item_drop(drop.at, drop.block);
    }
    Ok(())
}

/// A batch waiting to be written, tagged with its world.
#[derive(Clone, Debug)]
pub struct PendingUpdate {
    pub world: WorldId,
    pub batch: UpdateBatch,
}

/// Batches waiting for the end-of-tick flush, in submission order.
#[derive(Default)]
pub struct UpdateQueue {
    pending: VecDeque<PendingUpdate>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, world: WorldId, batch: UpdateBatch) {
        self.pending.push_back(PendingUpdate { world, batch });
    }

    pub fn pop(&mut self) -> Option<PendingUpdate> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
