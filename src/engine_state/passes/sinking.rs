//! Integrity checks and the descent of sinking craft.
//!
//! Every idle, floating craft whose type can sink is re-tallied against its
//! fly-block rules once `sink_check_ticks` have passed since its last check.
//! A craft that has lost too much either starts sinking or, when a region
//! policy forbids sinking where it is, is released on the spot.
//!
//! Sinking craft have no controller. They drop one block every sink interval
//! until a descent fails (they hit bottom), they leave the world, or they have
//! been sinking for `sinking_release_ticks`. Then they are removed and their
//! blocks handed to the fade store.

use cgmath::Vector3;
use log::{info, warn};

use crate::engine_state::crafts::craft_type::CompositionTally;
use crate::engine_state::crafts::{Craft, CraftId};
use crate::engine_state::voxels::world::WorldAccess;
use crate::engine_state::Coordinator;
use crate::error::PolicyDenial;

pub const SINKING_MESSAGE: &str = "Player- Craft is sinking";

/// Outcome of one integrity check.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkVerdict {
    Afloat,
    Sinking,
    /// Should sink, but a region policy refuses.
    Denied(PolicyDenial),
}

/// Tallies the live blocks of `craft` and decides whether it sinks.
pub fn check_craft<W, F>(craft: &Craft, world: &W, deny: F) -> SinkVerdict
where
    W: WorldAccess + ?Sized,
    F: Fn(&Craft) -> Option<PolicyDenial>,
{
    let tally = CompositionTally::tally(
        &craft.craft_type,
        craft.block_list().iter().map(|pos| world.block_at(*pos)),
    );
    if !tally.should_sink(&craft.craft_type, craft.orig_block_count) {
        return SinkVerdict::Afloat;
    }
    match deny(craft) {
        Some(denial) => SinkVerdict::Denied(denial),
        None => SinkVerdict::Sinking,
    }
}

impl<W: WorldAccess> Coordinator<W> {
    pub(crate) fn sinking_pass(&mut self, now: u64) {
        self.check_integrity(now);
        self.descend(now);
    }

    fn check_integrity(&mut self, now: u64) {
        let interval = self.settings.sink_check_ticks;
        let due: Vec<CraftId> = self
            .registry
            .iter()
            .filter(|craft| !craft.sinking && craft.craft_type.sinks() && craft.is_idle())
            .filter(|craft| now.saturating_sub(craft.last_block_check) > interval)
            .map(|craft| craft.id)
            .collect();

        for id in due {
            let Some(craft) = self.registry.get(id) else {
                continue;
            };
            let Some(handle) = self.worlds.get(&craft.world) else {
                continue;
            };
            let policy = self.policy.as_deref();
            let verdict = check_craft(craft, &*handle.get(), |craft| {
                policy.and_then(|policy| {
                    craft
                        .block_list()
                        .iter()
                        .find_map(|pos| policy.check_sink(craft.world, *pos))
                })
            });

            match verdict {
                SinkVerdict::Afloat => {
                    if let Some(craft) = self.registry.get_mut(id) {
                        craft.last_block_check = now;
                    }
                }
                SinkVerdict::Denied(denial) => {
                    let target = self.message_target(id);
                    self.notify(target, &denial.to_string());
                    info!("{} should sink but may not here: {}", id, denial);
                    if let Err(error) = self.release(id) {
                        warn!("Could not release {} after a sink denial: {}", id, error);
                    }
                }
                SinkVerdict::Sinking => {
                    let target = self.message_target(id);
                    self.notify(target, SINKING_MESSAGE);
                    info!("{} is sinking", id);
                    self.registry.remove_controller(id);
                    if let Some(craft) = self.registry.get_mut(id) {
                        craft.cruising = false;
                        craft.keep_moving = false;
                        craft.pilot_locked = false;
                        craft.sinking = true;
                        craft.sinking_since = Some(now);
                    }
                }
            }
        }
    }

    fn descend(&mut self, now: u64) {
        let sinking: Vec<CraftId> = self
            .registry
            .iter()
            .filter(|craft| craft.sinking)
            .map(|craft| craft.id)
            .collect();

        for id in sinking {
            let Some(craft) = self.registry.get(id) else {
                continue;
            };
            let floor = self
                .worlds
                .get(&craft.world)
                .map(|world| world.get().height_bounds().0)
                .unwrap_or(i32::MIN);
            let sinking_for = now.saturating_sub(craft.sinking_since.unwrap_or(now));

            if craft.is_empty()
                || craft.bounds().min.y < floor
                || sinking_for >= self.settings.sinking_release_ticks
            {
                self.retire_wreck(id);
                continue;
            }
            if !craft.is_idle() {
                continue;
            }

            let rate = craft
                .craft_type
                .sink_rate_ticks
                .unwrap_or(self.settings.sink_rate_ticks);
            if now.saturating_sub(craft.last_cruise_update) < rate {
                continue;
            }
            let delta = if craft.craft_type.keep_moving_on_sink {
                Vector3::new(craft.last_move.x, -1, craft.last_move.z)
            } else {
                Vector3::new(0, -1, 0)
            };
            self.continue_moving(id, delta, now);
        }
    }

    /// Removes a sunk craft and lets its blocks fade.
    pub(crate) fn retire_wreck(&mut self, id: CraftId) {
        let craft = match self.release(id) {
            Ok(craft) => craft,
            Err(error) => {
                warn!("Could not retire {}: {}", id, error);
                return;
            }
        };
        let fade_after = self.settings.fade_wrecks_after_ticks;
        if fade_after == 0 {
            return;
        }
        if let Some(handle) = self.worlds.get(&craft.world) {
            let world = handle.get();
            let sea_level = world.sea_level();
            let now = self.current_tick;
            for pos in craft.block_list() {
                let block = world.block_at(*pos);
                if !block.is_air() {
                    self.passes.fades.register(
                        craft.world,
                        *pos,
                        block.block_type,
                        pos.y <= sea_level,
                        now,
                    );
                }
            }
        }
    }
}
