//! Movement continuation: cruising, keep-moving and pilot lock.
//!
//! Runs every tick. Each craft is gated by its own timestamps, so only idle,
//! non-sinking craft whose cooldown has run out get a new translation.

use cgmath::{Point3, Vector3};
use log::debug;

use crate::engine_state::crafts::{Craft, CraftId};
use crate::engine_state::voxels::world::WorldAccess;
use crate::engine_state::Coordinator;

/// A pilot command within this many ticks keeps a keep-moving craft going.
pub const KEEP_MOVING_WINDOW_TICKS: u64 = 10;

/// Minimum ticks between two pilot-lock steps.
pub const PILOT_LOCK_DEBOUNCE_TICKS: u64 = 6;

/// Drift from the anchor, in blocks, that steers a pilot-locked craft.
pub const PILOT_LOCK_DEADBAND: f64 = 0.15;

/// Drift beyond this is not steering; the pilot is put back on the anchor.
pub const PILOT_LOCK_MAX_DRIFT: f64 = 0.2;

/// Ticks since `since`, halved while a half-speed craft is under sea level.
fn elapsed_ticks(craft: &Craft, now: u64, since: u64, sea_level: i32) -> u64 {
    let elapsed = now.saturating_sub(since);
    if craft.craft_type.half_speed_underwater && craft.bounds().min.y < sea_level {
        elapsed >> 1
    } else {
        elapsed
    }
}

/// Next cruise step for `craft`.
pub fn cruise_delta(craft: &Craft, sea_level: i32) -> Vector3<i32> {
    let craft_type = &craft.craft_type;
    let direction = craft.cruise_direction;
    let step = craft_type.cruise_skip_blocks.saturating_add(1);
    let vert_step = craft_type.vert_cruise_skip_blocks.saturating_add(1);
    let mut dx = direction.x.saturating_mul(step);
    let mut dz = direction.z.saturating_mul(step);
    let mut dy = direction.y.saturating_mul(vert_step);

    if direction.y == -1 && craft.bounds().min.y <= sea_level {
        dy = -1;
    }
    if craft_type.cruise_on_pilot {
        dy = craft_type.cruise_on_pilot_vert_move;
    }

    // Compound moves go at half the skip speed.
    if (dx != 0 && dz != 0) || ((dx != 0 || dz != 0) && dy != 0) {
        if dx.abs() > 1 {
            dx /= 2;
        }
        if dz.abs() > 1 {
            dz /= 2;
        }
    }
    Vector3::new(dx, dy, dz)
}

/// What the pilot of a locked craft is asking for.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PilotLockStep {
    /// Inside the deadband.
    Hold,
    Steer(Vector3<i32>),
    /// Drifted too far; put the pilot back on the anchor.
    Recenter,
}

pub fn pilot_lock_step(anchor: Point3<f64>, location: Point3<f64>) -> PilotLockStep {
    let moved_x = location.x - anchor.x;
    let moved_z = location.z - anchor.z;
    let axis = |moved: f64| {
        if moved > PILOT_LOCK_DEADBAND {
            1
        } else if moved < -PILOT_LOCK_DEADBAND {
            -1
        } else {
            0
        }
    };
    let (dx, dz) = (axis(moved_x), axis(moved_z));
    if dx == 0 && dz == 0 {
        return PilotLockStep::Hold;
    }
    if moved_x.abs() < PILOT_LOCK_MAX_DRIFT && moved_z.abs() < PILOT_LOCK_MAX_DRIFT {
        PilotLockStep::Steer(Vector3::new(dx, 0, dz))
    } else {
        PilotLockStep::Recenter
    }
}

impl<W: WorldAccess> Coordinator<W> {
    pub(crate) fn cruise_pass(&mut self, now: u64) {
        let candidates: Vec<CraftId> = self
            .registry
            .iter()
            .filter(|craft| craft.is_idle() && !craft.sinking)
            .filter(|craft| craft.cruising || craft.keep_moving || craft.pilot_locked)
            .map(|craft| craft.id)
            .collect();

        for id in candidates {
            let Some(craft) = self.registry.get(id) else {
                continue;
            };
            let Some(sea_level) = self.worlds.get(&craft.world).map(|w| w.get().sea_level())
            else {
                continue;
            };

            if craft.cruising {
                let elapsed = elapsed_ticks(craft, now, craft.last_cruise_update, sea_level);
                if elapsed >= craft.craft_type.cruise_cooldown() {
                    let delta = cruise_delta(craft, sea_level);
                    self.continue_moving(id, delta, now);
                }
                continue;
            }

            if craft.keep_moving {
                let since_click = elapsed_ticks(craft, now, craft.last_right_click, sea_level);
                if since_click <= KEEP_MOVING_WINDOW_TICKS
                    && now.saturating_sub(craft.last_cruise_update) >= craft.craft_type.tick_cooldown
                {
                    let delta = craft.last_move;
                    self.continue_moving(id, delta, now);
                    continue;
                }
            }

            if craft.pilot_locked {
                self.pilot_lock(id, now, sea_level);
            }
        }
    }

    pub(super) fn continue_moving(&mut self, id: CraftId, delta: Vector3<i32>, now: u64) {
        if delta == Vector3::new(0, 0, 0) {
            return;
        }
        match self.translate(id, delta) {
            Ok(_) => {
                if let Some(craft) = self.registry.get_mut(id) {
                    craft.last_cruise_update = now;
                }
            }
            Err(error) => debug!("{} could not continue moving: {}", id, error),
        }
    }

    fn pilot_lock(&mut self, id: CraftId, now: u64, sea_level: i32) {
        let Some(pilot) = self.registry.controller_of(id) else {
            return;
        };
        let Some(craft) = self.registry.get(id) else {
            return;
        };
        let Some(anchor) = craft.pilot_lock_anchor else {
            return;
        };
        let Some(handle) = self.worlds.get(&craft.world).cloned() else {
            return;
        };
        let Some(location) = handle.get().player_location(pilot) else {
            return;
        };
        if !craft.hitbox().contains_location(location) {
            return;
        }

        match pilot_lock_step(anchor, location) {
            PilotLockStep::Hold => {}
            PilotLockStep::Steer(delta) => {
                if now.saturating_sub(craft.last_right_click) <= PILOT_LOCK_DEBOUNCE_TICKS {
                    return;
                }
                let ready = elapsed_ticks(craft, now, craft.last_cruise_update, sea_level)
                    >= craft.craft_type.tick_cooldown;
                if let Some(craft) = self.registry.get_mut(id) {
                    craft.last_right_click = now;
                    craft.last_move = delta;
                    craft.keep_moving = true;
                }
                if ready {
                    self.continue_moving(id, delta, now);
                }
            }
            PilotLockStep::Recenter => handle.get_mut().teleport_player(pilot, anchor),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine_state::crafts::craft_type::CraftType;
    use crate::engine_state::voxels::world::WorldId;

    fn craft(craft_type: CraftType, direction: Vector3<i32>, min_y: i32) -> Craft {
        let mut craft = Craft::new(
            CraftId(1),
            WorldId(0),
            Arc::new(craft_type),
            vec![Point3::new(0, min_y, 0), Point3::new(1, min_y + 1, 0)],
        );
        craft.cruise_direction = direction;
        craft
    }

    #[test]
    fn straight_cruise_uses_the_full_skip() {
        let craft_type = CraftType {
            cruise_skip_blocks: 2,
            ..Default::default()
        };
        let craft = craft(craft_type, Vector3::new(1, 0, 0), 80);
        assert_eq!(cruise_delta(&craft, 62), Vector3::new(3, 0, 0));
    }

    #[test]
    fn diagonal_cruise_halves_the_skip() {
        let craft_type = CraftType {
            cruise_skip_blocks: 3,
            ..Default::default()
        };
        let craft = craft(craft_type, Vector3::new(1, 0, -1), 80);
        assert_eq!(cruise_delta(&craft, 62), Vector3::new(2, 0, -2));
    }

    #[test]
    fn descending_below_sea_level_is_one_block() {
        let craft_type = CraftType {
            vert_cruise_skip_blocks: 4,
            ..Default::default()
        };
        let craft = craft(craft_type, Vector3::new(0, -1, 0), 50);
        assert_eq!(cruise_delta(&craft, 62), Vector3::new(0, -1, 0));
    }

    #[test]
    fn cruise_on_pilot_overrides_vertical_move() {
        let craft_type = CraftType {
            cruise_on_pilot: true,
            cruise_on_pilot_vert_move: -2,
            ..Default::default()
        };
        let craft = craft(craft_type, Vector3::new(0, 0, 1), 80);
        assert_eq!(cruise_delta(&craft, 62), Vector3::new(0, -2, 1));
    }

    #[test]
    fn huge_skip_saturates() {
        let craft_type = CraftType {
            cruise_skip_blocks: i32::MAX,
            ..Default::default()
        };
        let craft = craft(craft_type, Vector3::new(-1, 0, 0), 80);
        assert_eq!(cruise_delta(&craft, 62), Vector3::new(-i32::MAX, 0, 0));
    }

    #[test]
    fn half_speed_underwater_halves_elapsed_time() {
        let craft_type = CraftType {
            half_speed_underwater: true,
            ..Default::default()
        };
        let submerged = craft(craft_type.clone(), Vector3::new(1, 0, 0), 40);
        let surfaced = craft(craft_type, Vector3::new(1, 0, 0), 80);
        assert_eq!(elapsed_ticks(&submerged, 10, 0, 62), 5);
        assert_eq!(elapsed_ticks(&surfaced, 10, 0, 62), 10);
    }

    #[test]
    fn pilot_lock_steps() {
        let anchor = Point3::new(10.5, 65.0, 10.5);
        assert_eq!(
            pilot_lock_step(anchor, Point3::new(10.6, 65.0, 10.5)),
            PilotLockStep::Hold
        );
        assert_eq!(
            pilot_lock_step(anchor, Point3::new(10.68, 65.0, 10.32)),
            PilotLockStep::Steer(Vector3::new(1, 0, -1))
        );
        assert_eq!(
            pilot_lock_step(anchor, Point3::new(12.0, 65.0, 10.5)),
            PilotLockStep::Recenter
        );
    }
}
