//! Bookkeeping for short-lived projectiles: tracers, dispenser fireballs and
//! contact explosives.
//!
//! Each part reads the world under a read guard and produces a list of
//! actions. The write guard is only taken when there is something to do.

use std::collections::HashMap;

use cgmath::{MetricSpace, Point3};
use log::{debug, warn};

use crate::config::Settings;
use crate::engine_state::voxels::block::{block_type::BlockType, Block, BlockPos};
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
use crate::engine_state::voxels::entity::{EntityId, PlayerId, ProjectileKind};
use crate::engine_state::voxels::world::{WorldAccess, WorldId};
use crate::engine_state::Coordinator;

/// Primed explosives faster than this (speed squared) leave tracers.
pub const TRACER_MIN_SPEED_SQUARED: f64 = 0.25;
/// Ticks between spotting an explosive and showing its tracer.
pub const TRACER_SHOW_DELAY_TICKS: u64 = 5;
/// Ticks between spotting an explosive and clearing its tracer.
pub const TRACER_CLEAR_DELAY_TICKS: u64 = 160;
/// Primed explosives faster than this (speed squared) become contact explosives.
pub const CONTACT_MIN_SPEED_SQUARED: f64 = 0.35;
/// Sanity bound for every tracking structure in `TransientTracker`.
pub const MAX_TRACKED_TRANSIENTS: usize = 1 << 16;

/// A client-side block change to send once `due` is reached.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DelayedBlockChange {
    pub due: u64,
    pub world: WorldId,
    pub player: PlayerId,
    pub pos: BlockPos,
    pub block: Block,
}

#[derive(Debug, Default)]
pub struct TransientTracker {
    delayed: Vec<DelayedBlockChange>,
    /// Dispenser fireballs and the tick they were first seen.
    fireballs: HashMap<(WorldId, EntityId), u64>,
    /// Contact explosives and their last speed squared.
    explosives: HashMap<(WorldId, EntityId), f64>,
}

fn block_pos_of(location: Point3<f64>) -> BlockPos {
    Point3::new(
        location.x.floor() as i32,
        location.y.floor() as i32,
        location.z.floor() as i32,
    )
}

impl TransientTracker {
    pub fn pending_block_changes(&self) -> usize {
        self.delayed.len()
    }

    pub fn tracked_fireballs(&self) -> usize {
        self.fireballs.len()
    }

    pub fn tracked_explosives(&self) -> usize {
        self.explosives.len()
    }

    /// Resets any structure that has grown past its bound.
    pub fn enforce_bounds(&mut self) {
        if self.delayed.len() > MAX_TRACKED_TRANSIENTS {
            warn!("{} delayed block changes pending, discarding them", self.delayed.len());
            self.delayed.clear();
        }
        if self.fireballs.len() > MAX_TRACKED_TRANSIENTS {
            warn!("{} fireballs tracked, resetting", self.fireballs.len());
            self.fireballs.clear();
        }
        if self.explosives.len() > MAX_TRACKED_TRANSIENTS {
            warn!("{} contact explosives tracked, resetting", self.explosives.len());
            self.explosives.clear();
        }
    }

    /// Queues a cobweb marker, then its removal, for every player that can
    /// see a fast explosive.
    pub fn schedule_tracers<W: WorldAccess + ?Sized>(
        &mut self,
        world: &W,
        now: u64,
        view_distance_chunks: i32,
    ) {
        let max_dist = f64::from(view_distance_chunks * CHUNK_DIMENSION - CHUNK_DIMENSION);
        let max_dist_squared = max_dist * max_dist;
        let players = world.players();
        for projectile in world.projectiles() {
            if !matches!(projectile.kind, ProjectileKind::PrimedExplosive { .. })
                || projectile.speed_squared() <= TRACER_MIN_SPEED_SQUARED
            {
                continue;
            }
            let pos = block_pos_of(projectile.location);
            for (player, location) in &players {
                if location.distance2(projectile.location) >= max_dist_squared {
                    continue;
                }
                let change = |due, block| DelayedBlockChange {
                    due,
                    world: world.id(),
                    player: *player,
                    pos,
                    block,
                };
                self.delayed
                    .push(change(now + TRACER_SHOW_DELAY_TICKS, Block::new(BlockType::COBWEB)));
                self.delayed
                    .push(change(now + TRACER_CLEAR_DELAY_TICKS, Block::AIR));
            }
        }
    }

    /// Removes and returns the delayed changes due by `now`, oldest first.
    pub fn take_due_changes(&mut self, now: u64) -> Vec<DelayedBlockChange> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|change| change.due <= now);
        self.delayed = pending;
        due.sort_by_key(|change| change.due);
        due
    }

    /// Starts tracking new dispenser fireballs and returns those that have
    /// outlived `lifespan`.
    pub fn expire_fireballs<W: WorldAccess + ?Sized>(
        &mut self,
        world: &W,
        now: u64,
        lifespan: u64,
    ) -> Vec<EntityId> {
        let world_id = world.id();
        for projectile in world.projectiles() {
            if let ProjectileKind::Fireball {
                living_shooter: false,
            } = projectile.kind
            {
                self.fireballs.entry((world_id, projectile.id)).or_insert(now);
            }
        }

        let mut expired = Vec::new();
        self.fireballs.retain(|(world, id), since| {
            if *world == world_id && now.saturating_sub(*since) > lifespan {
                expired.push(*id);
                false
            } else {
                true
            }
        });
        expired.sort();
        expired
    }

    /// Tracks fast explosives and returns those that slowed down abruptly.
    pub fn check_explosives<W: WorldAccess + ?Sized>(&mut self, world: &W) -> Vec<EntityId> {
        let world_id = world.id();
        let live: HashMap<EntityId, (i32, f64)> = world
            .projectiles()
            .into_iter()
            .filter_map(|projectile| match projectile.kind {
                ProjectileKind::PrimedExplosive { fuse_ticks } => {
                    Some((projectile.id, (fuse_ticks, projectile.speed_squared())))
                }
                ProjectileKind::Fireball { .. } => None,
            })
            .collect();

        for (id, (_, speed_squared)) in &live {
            if *speed_squared > CONTACT_MIN_SPEED_SQUARED {
                self.explosives.entry((world_id, *id)).or_insert(*speed_squared);
            }
        }

        let mut detonate = Vec::new();
        self.explosives.retain(|(world, id), tracked| {
            if *world != world_id {
                return true;
            }
            let Some((fuse_ticks, speed_squared)) = live.get(id) else {
                return false;
            };
            if *fuse_ticks <= 0 {
                return false;
            }
            if *speed_squared < *tracked / 10.0 {
                detonate.push(*id);
            } else {
                *tracked = *speed_squared;
            }
            true
        });
        detonate.sort();
        detonate
    }
}

impl<W: WorldAccess> Coordinator<W> {
    pub(crate) fn transient_pass(&mut self, now: u64) {
        let tracers_due = self.passes.tracer_timer.fire(now);
        let fireballs_due = self.passes.fireball_timer.fire(now);
        let explosives_due = self.passes.tnt_timer.fire(now);
        let settings: &Settings = &self.settings;
        let tracker = &mut self.passes.transients;
        tracker.enforce_bounds();

        let mut world_ids: Vec<WorldId> = self.worlds.keys().copied().collect();
        world_ids.sort();

        let mut due_changes: HashMap<WorldId, Vec<DelayedBlockChange>> = HashMap::new();
        for change in tracker.take_due_changes(now) {
            due_changes.entry(change.world).or_default().push(change);
        }

        for world_id in world_ids {
            let Some(handle) = self.worlds.get(&world_id) else {
                continue;
            };
            let (expired, detonate) = {
                let world = handle.get();
                if tracers_due {
                    let view = world.view_distance().min(settings.tracer_view_distance_chunks);
                    tracker.schedule_tracers(&*world, now, view);
                }
                let expired = if fireballs_due {
                    tracker.expire_fireballs(&*world, now, settings.fireball_lifespan_ticks)
                } else {
                    Vec::new()
                };
                let detonate = if explosives_due {
                    tracker.check_explosives(&*world)
                } else {
                    Vec::new()
                };
                (expired, detonate)
            };

            let changes = due_changes.remove(&world_id).unwrap_or_default();
            if changes.is_empty() && expired.is_empty() && detonate.is_empty() {
                continue;
            }
            let mut world = handle.get_mut();
            for change in changes {
                world.send_block_change(change.player, change.pos, change.block);
            }
            for id in expired {
                debug!("Removing expired fireball {:?}", id);
                world.remove_entity(id);
            }
            for id in detonate {
                debug!("Detonating contact explosive {:?}", id);
                world.set_fuse_ticks(id, 0);
            }
        }

        if !due_changes.is_empty() {
            let dropped: usize = due_changes.values().map(Vec::len).sum();
            warn!("Dropping {} block changes for unmanaged worlds", dropped);
        }
    }
}
