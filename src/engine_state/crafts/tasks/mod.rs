//! # Structural Tasks
//!
//! Detection, translation and rotation. Each one reads the world through a
//! `WorldView` and a snapshot of its craft and produces a result the tick loop
//! can apply later. None of them write anything.
//!
//! A `WorldView` takes the world's read lock for a single lookup, never for a
//! whole computation, so the tick thread's writes only ever wait on one read.
//!
//! Translation and rotation share `plan_movement`: both map every block of the
//! craft to a destination, check each destination against the world, and
//! describe the move as an `UpdateBatch`. They differ only in how positions and
//! entity locations are mapped and whether block facings turn.

pub mod detection_task;
pub mod rotation_task;
pub mod translation_task;

use std::collections::HashSet;
use std::sync::Arc;

use cgmath::{Point3, Vector3};

use super::craft_type::CompositionTally;
use super::spatial::HitBox;
use super::{CraftId, CraftSnapshot};
use crate::core::MtResource;
use crate::engine_state::integration::RegionPolicy;
use crate::engine_state::map_updates::{
    EntityUpdateCommand, ItemDropUpdateCommand, MapUpdateCommand, UpdateBatch, VisualEffect,
};
use crate::engine_state::task_management::task::{Task, TaskOutcome};
use crate::engine_state::voxels::block::{block_side::Rotation, Block, BlockPos};
use crate::engine_state::voxels::chunk::{Chunk, ChunkPos};
use crate::engine_state::voxels::entity::EntityId;
use crate::engine_state::voxels::world::WorldAccess;
use crate::error::{CraftError, PolicyDenial, ValidationFailure};

pub use detection_task::{DetectionResult, DetectionTask};
pub use rotation_task::RotationTask;
pub use translation_task::TranslationTask;

/// The three structural computations, as one type the task manager can run.
pub enum StructuralTask<W: WorldAccess> {
    Detection(DetectionTask<W>),
    Translation(TranslationTask<W>),
    Rotation(RotationTask<W>),
}

impl<W: WorldAccess> Task for StructuralTask<W> {
    fn craft(&self) -> CraftId {
        match self {
            StructuralTask::Detection(task) => task.craft,
            StructuralTask::Translation(task) => task.snapshot.id,
            StructuralTask::Rotation(task) => task.snapshot.id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            StructuralTask::Detection(_) => "detection",
            StructuralTask::Translation(_) => "translation",
            StructuralTask::Rotation(_) => "rotation",
        }
    }

    fn process(self: Box<Self>) -> TaskOutcome {
        match *self {
            StructuralTask::Detection(task) => TaskOutcome::Detected(task.compute()),
            StructuralTask::Translation(task) => TaskOutcome::Translated(task.compute()),
            StructuralTask::Rotation(task) => TaskOutcome::Rotated(task.compute()),
        }
    }
}

/// Read access to a shared world, one short-lived guard per lookup.
pub struct WorldView<'a, W: WorldAccess> {
    world: &'a MtResource<W>,
}

impl<'a, W: WorldAccess> WorldView<'a, W> {
    pub fn new(world: &'a MtResource<W>) -> Self {
        WorldView { world }
    }

    pub fn block_at(&self, pos: BlockPos) -> Block {
        self.world.get().block_at(pos)
    }

    pub fn is_loaded(&self, chunk: ChunkPos) -> bool {
        self.world.get().is_loaded(chunk)
    }

    pub fn height_bounds(&self) -> (i32, i32) {
        self.world.get().height_bounds()
    }

    pub fn entities_within(
        &self,
        min: Point3<f64>,
        max: Point3<f64>,
    ) -> Vec<(EntityId, Point3<f64>)> {
        self.world.get().entities_within(min, max)
    }
}

/// A successful translation or rotation, ready to be queued.
#[derive(Clone, Debug)]
pub struct MovementResult {
    pub craft: CraftId,
    /// The craft's block list after the move.
    pub new_blocks: Vec<BlockPos>,
    /// Zero for rotations.
    pub delta: Vector3<i32>,
    pub rotation: Rotation,
    pub updates: UpdateBatch,
}

/// A failed translation or rotation.
///
/// `effects` is only non-empty for `CraftError::ObstructionWithEffect` and holds
/// the effect-only update (an explosion) that still goes through the queue.
#[derive(Clone, Debug)]
pub struct MovementFailure {
    pub error: CraftError,
    pub effects: UpdateBatch,
}

impl MovementFailure {
    pub fn new(error: impl Into<CraftError>) -> Self {
        MovementFailure {
            error: error.into(),
            effects: UpdateBatch::default(),
        }
    }
}

/// Everything `plan_movement` needs to know about the move itself.
pub(crate) struct MovementPlan<'a, F, G>
where
    F: Fn(BlockPos) -> BlockPos,
    G: Fn(Point3<f64>) -> Point3<f64>,
{
    pub snapshot: &'a CraftSnapshot,
    pub policy: Option<&'a Arc<dyn RegionPolicy>>,
    pub map_block: F,
    pub map_location: G,
    pub rotation: Rotation,
    pub delta: Vector3<i32>,
}

pub(crate) fn plan_movement<W, F, G>(
    world: &MtResource<W>,
    plan: MovementPlan<'_, F, G>,
) -> Result<MovementResult, MovementFailure>
where
    W: WorldAccess,
    F: Fn(BlockPos) -> BlockPos,
    G: Fn(Point3<f64>) -> Point3<f64>,
{
    let snapshot = plan.snapshot;
    let craft_type = &snapshot.craft_type;
    let world = WorldView::new(world);
    let (world_min, world_max) = world.height_bounds();

    let live: Vec<(BlockPos, Block)> = snapshot
        .block_list
        .iter()
        .map(|pos| (*pos, world.block_at(*pos)))
        .collect();

    if !snapshot.sinking {
        CompositionTally::tally(craft_type, live.iter().map(|(_, block)| *block))
            .check_fly_blocks(craft_type)
            .map_err(MovementFailure::new)?;
    }

    let own: HashSet<BlockPos> = snapshot.block_list.iter().copied().collect();
    let mut batch = UpdateBatch::for_craft(snapshot.id);
    let mut new_blocks = Vec::with_capacity(live.len());

    for (source, block) in &live {
        if block.is_air() {
            continue;
        }
        let destination = (plan.map_block)(*source);

        if destination.y < world_min {
            return Err(MovementFailure::new(ValidationFailure::HeightLimit {
                limit: world_min,
            }));
        }
        if destination.y >= world_max {
            return Err(MovementFailure::new(ValidationFailure::HeightLimit {
                limit: world_max,
            }));
        }
        if let Some(limit) = craft_type.max_height_limit {
            if destination.y > limit && plan.delta.y > 0 {
                return Err(MovementFailure::new(ValidationFailure::HeightLimit { limit }));
            }
        }
        if let Some(limit) = craft_type.min_height_limit {
            if destination.y < limit && plan.delta.y < 0 && !snapshot.sinking {
                return Err(MovementFailure::new(ValidationFailure::HeightLimit { limit }));
            }
        }

        let chunk = Chunk::chunk_pos_of(destination);
        if !world.is_loaded(chunk) {
            return Err(MovementFailure::new(ValidationFailure::UnloadedChunk { chunk }));
        }

        if !own.contains(&destination) {
            let occupant = world.block_at(destination);
            if occupant.block_type.is_replaceable() {
                batch.item_drops.push(ItemDropUpdateCommand {
                    at: Point3::new(
                        destination.x as f64 + 0.5,
                        destination.y as f64 + 0.5,
                        destination.z as f64 + 0.5,
                    ),
                    block: occupant,
                });
            } else if occupant.block_type.is_explosive() && craft_type.collision_explosion > 0.0 {
                let mut effects = UpdateBatch::for_craft(snapshot.id);
                effects.blocks.push(MapUpdateCommand::effect(
                    destination,
                    VisualEffect::Explosion {
                        power: craft_type.collision_explosion,
                    },
                    Some(snapshot.id),
                ));
                return Err(MovementFailure {
                    error: CraftError::ObstructionWithEffect {
                        position: destination,
                        block: occupant.block_type,
                    },
                    effects,
                });
            } else if !occupant.block_type.is_passable() {
                return Err(MovementFailure::new(CraftError::Obstruction {
                    position: destination,
                    block: occupant.block_type,
                }));
            }
        }

        if let Some(policy) = plan.policy {
            if !policy.can_move(snapshot.world, destination, snapshot.controller) {
                return Err(MovementFailure::new(PolicyDenial::MoveDenied {
                    position: destination,
                }));
            }
        }

        let mut command = MapUpdateCommand::moved(*source, destination, *block, snapshot.id)
            .with_rotation(plan.rotation);
        if craft_type.emits_smoke(block.block_type) {
            command = command.with_effect(VisualEffect::Smoke);
        }
        batch.blocks.push(command);
        new_blocks.push(destination);
    }

    batch.water_level = water_level(&world, &own);
    batch.entities = carried_entities(&world, snapshot, &plan.map_location);

    Ok(MovementResult {
        craft: snapshot.id,
        new_blocks,
        delta: plan.delta,
        rotation: plan.rotation,
        updates: batch,
    })
}

/// Highest water block directly beside the hull, if the craft floats in water.
fn water_level<W: WorldAccess>(world: &WorldView<'_, W>, own: &HashSet<BlockPos>) -> Option<i32> {
    let sides = [
        Vector3::new(1, 0, 0),
        Vector3::new(-1, 0, 0),
        Vector3::new(0, 0, 1),
        Vector3::new(0, 0, -1),
    ];
    own.iter()
        .flat_map(|pos| sides.iter().map(move |side| *pos + *side))
        .filter(|neighbour| !own.contains(neighbour))
        .filter(|neighbour| world.block_at(*neighbour).block_type.is_water())
        .map(|neighbour| neighbour.y)
        .max()
}

/// Entities standing on the craft, with their destinations.
fn carried_entities<W, G>(
    world: &WorldView<'_, W>,
    snapshot: &CraftSnapshot,
    map_location: &G,
) -> Vec<EntityUpdateCommand>
where
    W: WorldAccess,
    G: Fn(Point3<f64>) -> Point3<f64>,
{
    let hitbox = HitBox::from_blocks(&snapshot.block_list);
    let (min, max) = snapshot.bounds.entity_bounds(0.5);
    world
        .entities_within(min, max)
        .into_iter()
        .filter(|(_, location)| hitbox.contains_location(*location))
        .map(|(entity, location)| EntityUpdateCommand {
            entity,
            to: map_location(location),
        })
        .collect()
}
