//! Wreck fading: blocks left behind by sunk craft revert to air, or to water
//! at or below sea level, once they are old enough.
//!
//! An entry leaves the store only once a run finds its block changed. A fade
//! that was rejected at flush, or skipped because a craft sat on the block,
//! is simply queued again by a later run.

use std::collections::HashMap;

use log::{debug, warn};

use crate::core::MtResource;
use crate::engine_state::crafts::registry::CraftRegistry;
use crate::engine_state::map_updates::{MapUpdateCommand, Occupancy, UpdateBatch, UpdateQueue};
use crate::engine_state::voxels::block::{block_type::BlockType, Block, BlockPos};
use crate::engine_state::voxels::chunk::Chunk;
use crate::engine_state::voxels::world::{WorldAccess, WorldId};
use crate::engine_state::Coordinator;

/// Beyond this many tracked blocks the store is assumed corrupt and reset.
pub const MAX_FADE_ENTRIES: usize = 1 << 22;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FadeEntry {
    /// The block type that was left behind. Anything else there is not faded.
    pub block_type: BlockType,
    pub water: bool,
    pub since: u64,
}

/// Wreck blocks waiting to fade, by world and position.
#[derive(Debug, Default)]
pub struct FadeStore {
    entries: HashMap<(WorldId, BlockPos), FadeEntry>,
}

impl FadeStore {
    pub fn register(
        &mut self,
        world: WorldId,
        pos: BlockPos,
        block_type: BlockType,
        water: bool,
        since: u64,
    ) {
        if self.entries.len() >= MAX_FADE_ENTRIES && !self.entries.contains_key(&(world, pos)) {
            warn!(
                "Fade store reached {} entries, discarding it",
                self.entries.len()
            );
            self.entries.clear();
        }
        self.entries.insert(
            (world, pos),
            FadeEntry {
                block_type,
                water,
                since,
            },
        );
    }

    pub fn get(&self, world: WorldId, pos: BlockPos) -> Option<&FadeEntry> {
        self.entries.get(&(world, pos))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry older than `fade_after`, grouped by world.
    fn due(&self, now: u64, fade_after: u64) -> HashMap<WorldId, Vec<(BlockPos, FadeEntry)>> {
        let mut due: HashMap<WorldId, Vec<(BlockPos, FadeEntry)>> = HashMap::new();
        for ((world, pos), entry) in &self.entries {
            if now.saturating_sub(entry.since) > fade_after {
                due.entry(*world).or_default().push((*pos, *entry));
            }
        }
        due
    }

    fn remove(&mut self, world: WorldId, pos: BlockPos) {
        self.entries.remove(&(world, pos));
    }

    fn remove_world(&mut self, world: WorldId) {
        self.entries.retain(|(entry_world, _), _| *entry_world != world);
    }
}

/// Queues the fade of every due wreck block. Returns how many blocks fade.
pub fn fade_wrecks<W: WorldAccess>(
    store: &mut FadeStore,
    worlds: &HashMap<WorldId, MtResource<W>>,
    registry: &CraftRegistry,
    queue: &mut UpdateQueue,
    now: u64,
    fade_after: u64,
) -> usize {
    let mut faded = 0;
    for (world_id, mut due) in store.due(now, fade_after) {
        let Some(handle) = worlds.get(&world_id) else {
            warn!(
                "Dropping {} fade entries for unmanaged world {:?}",
                due.len(),
                world_id
            );
            store.remove_world(world_id);
            continue;
        };
        due.sort_by_key(|(pos, _)| (pos.x, pos.y, pos.z));
        let occupancy = Occupancy::from_crafts(registry.crafts_in_world(world_id));

        let mut batch = UpdateBatch::default();
        {
            let mut world = handle.get_mut();
            for (pos, entry) in due {
                if occupancy.owner(pos).is_some() {
                    continue;
                }
                let chunk = Chunk::chunk_pos_of(pos);
                if !world.is_loaded(chunk) {
                    world.load_chunk(chunk);
                }
                if world.block_at(pos).block_type != entry.block_type {
                    store.remove(world_id, pos);
                    continue;
                }
                let fill = if entry.water {
                    Block::new(BlockType::STATIONARY_WATER)
                } else {
                    Block::AIR
                };
                batch.blocks.push(MapUpdateCommand::place(pos, fill));
            }
        }

        if !batch.blocks.is_empty() {
            faded += batch.blocks.len();
            debug!("Fading {} wreck blocks in {:?}", batch.blocks.len(), world_id);
            queue.enqueue(world_id, batch);
        }
    }
    faded
}

impl<W: WorldAccess> Coordinator<W> {
    pub(crate) fn fading_pass(&mut self, now: u64) {
        if !self.passes.fade_timer.fire(now) || self.passes.fades.is_empty() {
            return;
        }
        fade_wrecks(
            &mut self.passes.fades,
            &self.worlds,
            &self.registry,
            &mut self.update_queue,
            now,
            self.settings.fade_wrecks_after_ticks,
        );
    }
}
