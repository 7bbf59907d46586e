//! # Craft Registry
//!
//! Owns every live craft and the two-way controller bindings. Lookups by id,
//! by world and by controller are constant time.
//!
//! New detections are admitted in two steps. `plan_detection` checks the
//! proposed block set against every craft already in the world and decides
//! which parents, if any, lose blocks to the newcomer. `commit_detection`
//! then splits those parents and registers the child in one call, so a parent
//! is never left half-updated.

use std::collections::HashMap;

use log::info;

use super::spatial::{self, BoundingBox};
use super::{Craft, CraftId};
use crate::engine_state::voxels::block::BlockPos;
use crate::engine_state::voxels::entity::PlayerId;
use crate::engine_state::voxels::world::WorldId;
use crate::error::OwnershipConflict;

/// Parents that give up the overlapping blocks to a newly detected craft.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DetectionPlan {
    pub parents: Vec<CraftId>,
}

#[derive(Default)]
pub struct CraftRegistry {
    crafts: HashMap<CraftId, Craft>,
    by_world: HashMap<WorldId, Vec<CraftId>>,
    controller_to_craft: HashMap<PlayerId, CraftId>,
    craft_to_controller: HashMap<CraftId, PlayerId>,
    next_id: u64,
}

impl CraftRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> CraftId {
        self.next_id += 1;
        CraftId(self.next_id)
    }

    /// Registers a craft. A controller that already commands another craft is
    /// moved over to the new one.
    pub fn add_craft(&mut self, craft: Craft, controller: Option<PlayerId>) {
        let id = craft.id;
        self.by_world.entry(craft.world).or_default().push(id);
        self.crafts.insert(id, craft);
        if let Some(player) = controller {
            self.bind_controller(id, player);
        }
    }

    pub fn remove_craft(&mut self, id: CraftId) -> Option<Craft> {
        let craft = self.crafts.remove(&id)?;
        if let Some(ids) = self.by_world.get_mut(&craft.world) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_world.remove(&craft.world);
            }
        }
        self.remove_controller(id);
        Some(craft)
    }

    pub fn get(&self, id: CraftId) -> Option<&Craft> {
        self.crafts.get(&id)
    }

    pub fn get_mut(&mut self, id: CraftId) -> Option<&mut Craft> {
        self.crafts.get_mut(&id)
    }

    pub fn contains(&self, id: CraftId) -> bool {
        self.crafts.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.crafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crafts.is_empty()
    }

    /// Every live craft, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Craft> + '_ {
        self.crafts.values()
    }

    /// Crafts in `world`, in registration order.
    pub fn crafts_in_world(&self, world: WorldId) -> impl Iterator<Item = &Craft> + '_ {
        self.craft_ids_in_world(world)
            .iter()
            .filter_map(move |id| self.crafts.get(id))
    }

    pub fn craft_ids_in_world(&self, world: WorldId) -> &[CraftId] {
        self.by_world.get(&world).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Worlds with at least one live craft, sorted.
    pub fn worlds(&self) -> Vec<WorldId> {
        let mut worlds: Vec<WorldId> = self.by_world.keys().copied().collect();
        worlds.sort();
        worlds
    }

    pub fn craft_by_controller(&self, player: PlayerId) -> Option<&Craft> {
        self.controller_to_craft
            .get(&player)
            .and_then(|id| self.crafts.get(id))
    }

    pub fn controller_of(&self, id: CraftId) -> Option<PlayerId> {
        self.craft_to_controller.get(&id).copied()
    }

    pub fn bind_controller(&mut self, id: CraftId, player: PlayerId) {
        if let Some(previous) = self.controller_to_craft.insert(player, id) {
            if previous != id {
                self.craft_to_controller.remove(&previous);
            }
        }
        if let Some(old_player) = self.craft_to_controller.insert(id, player) {
            if old_player != player {
                self.controller_to_craft.remove(&old_player);
            }
        }
    }

    pub fn remove_controller(&mut self, id: CraftId) -> Option<PlayerId> {
        let player = self.craft_to_controller.remove(&id)?;
        self.controller_to_craft.remove(&player);
        Some(player)
    }

    /// Decides whether `blocks` may become a new craft of `craft` in its world.
    ///
    /// An existing craft overlapping the new set wins when it has the same type
    /// or is no larger than the new set. A larger craft of another type is a
    /// parent the new craft is carved out of, which requires the parent to be
    /// idle.
    pub fn plan_detection(
        &self,
        craft: &Craft,
        blocks: &[BlockPos],
    ) -> Result<DetectionPlan, OwnershipConflict> {
        let Some(new_bounds) = BoundingBox::from_blocks(blocks) else {
            return Ok(DetectionPlan::default());
        };
        let mut plan = DetectionPlan::default();
        for existing in self.crafts_in_world(craft.world) {
            if existing.id == craft.id || !existing.bounds().intersects(&new_bounds) {
                continue;
            }
            if !spatial::blocks_overlap(existing.block_list(), blocks) {
                continue;
            }
            if existing.craft_type.same_type(&craft.craft_type) || existing.size() <= blocks.len() {
                return Err(OwnershipConflict::AlreadyControlled);
            }
            if !existing.is_idle() {
                return Err(OwnershipConflict::ParentBusy);
            }
            plan.parents.push(existing.id);
        }
        Ok(plan)
    }

    /// Splits every planned parent and registers `craft`, as one step.
    pub fn commit_detection(
        &mut self,
        craft: Craft,
        controller: Option<PlayerId>,
        plan: DetectionPlan,
    ) {
        for parent_id in plan.parents {
            if let Some(parent) = self.crafts.get_mut(&parent_id) {
                let before = parent.size();
                let remaining = spatial::subtract(parent.block_list(), craft.block_list());
                let removed = before - remaining.len();
                parent.set_blocks(remaining);
                parent.orig_block_count = parent.orig_block_count.saturating_sub(removed);
                info!(
                    "{} detached {} blocks from {}",
                    craft.id, removed, parent_id
                );
            }
        }
        self.add_craft(craft, controller);
    }
}
