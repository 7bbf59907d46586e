//! New-contact notifications.
//!
//! Every controlled craft watches every other craft in its world. A target is
//! in range when the distance between the two bounding-box centers is below
//! `sqrt(orig_block_count) * multiplier` of the *target*, where the multiplier
//! is the type's surface or underwater detection multiplier depending on the
//! target's height. The observer's recipient hears about a contact the first
//! time it shows up and again whenever it was out of sight for longer than
//! `contact_cooldown_ticks`.

use std::collections::HashMap;

use log::{debug, warn};

use crate::config::Settings;
use crate::engine_state::crafts::registry::CraftRegistry;
use crate::engine_state::crafts::{Craft, CraftId};
use crate::engine_state::voxels::entity::PlayerId;
use crate::engine_state::voxels::world::{WorldAccess, WorldId};
use crate::engine_state::Coordinator;

/// Beyond this many observer/target pairs the tracker is reset.
pub const MAX_TRACKED_CONTACTS: usize = 1 << 16;

/// When each observer last saw each target.
#[derive(Debug, Default)]
pub struct ContactTracker {
    seen: HashMap<CraftId, HashMap<CraftId, u64>>,
}

impl ContactTracker {
    pub fn last_seen(&self, observer: CraftId, target: CraftId) -> Option<u64> {
        self.seen.get(&observer)?.get(&target).copied()
    }

    /// Number of tracked observer/target pairs.
    pub fn len(&self) -> usize {
        self.seen.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    /// Forgets every pair that involves a craft no longer registered.
    pub fn prune(&mut self, registry: &CraftRegistry) {
        self.seen.retain(|observer, targets| {
            targets.retain(|target, _| registry.contains(*target));
            registry.contains(*observer)
        });
    }

    fn record(&mut self, observer: CraftId, target: CraftId, now: u64) -> Option<u64> {
        self.seen.entry(observer).or_default().insert(target, now)
    }
}

/// Compass word for a target offset by `(dx, dz)` from the observer, where
/// the offset is observer minus target.
fn bearing(dx: i64, dz: i64) -> &'static str {
    if dx.abs() > dz.abs() {
        if dx < 0 {
            "east"
        } else {
            "west"
        }
    } else if dz < 0 {
        "south"
    } else {
        "north"
    }
}

/// Detection radius of `target`, in blocks.
pub fn detection_range(target: &Craft, surface_height: i32) -> i64 {
    let center = target.bounds().center();
    let multiplier = if center.y > surface_height {
        target.craft_type.detection_multiplier
    } else {
        target.craft_type.underwater_detection_multiplier
    };
    ((target.orig_block_count as f64).sqrt() * multiplier) as i64
}

fn recipient(registry: &CraftRegistry, craft: &Craft) -> Option<PlayerId> {
    craft
        .notification_target
        .or_else(|| registry.controller_of(craft.id))
}

/// Scans one world and returns the notifications due now.
pub fn detect_contacts(
    tracker: &mut ContactTracker,
    registry: &CraftRegistry,
    world: WorldId,
    now: u64,
    settings: &Settings,
) -> Vec<(PlayerId, String)> {
    let mut notifications = Vec::new();

    for observer in registry.crafts_in_world(world) {
        if registry.controller_of(observer.id).is_none() {
            continue;
        }
        let Some(observer_recipient) = recipient(registry, observer) else {
            continue;
        };
        let observer_center = observer.bounds().center();

        for target in registry.crafts_in_world(world) {
            let target_recipient = recipient(registry, target);
            if target_recipient == Some(observer_recipient) {
                continue;
            }
            let target_center = target.bounds().center();
            let dx = i64::from(observer_center.x) - i64::from(target_center.x);
            let dy = i64::from(observer_center.y) - i64::from(target_center.y);
            let dz = i64::from(observer_center.z) - i64::from(target_center.z);
            let dist_squared = dx
                .saturating_mul(dx)
                .saturating_add(dy.saturating_mul(dy))
                .saturating_add(dz.saturating_mul(dz));
            let range = detection_range(target, settings.surface_detection_height);
            if dist_squared >= range.saturating_mul(range) {
                continue;
            }

            let previous = tracker.record(observer.id, target.id, now);
            let fresh = match previous {
                None => true,
                Some(seen) => now.saturating_sub(seen) > settings.contact_cooldown_ticks,
            };
            if !fresh {
                continue;
            }
            let commander = target_recipient
                .map(|player| player.to_string())
                .unwrap_or_else(|| "NULL".to_string());
            notifications.push((
                observer_recipient,
                format!(
                    "New contact: {} commanded by {}, size: {}, range: {} to the {}.",
                    target.craft_type.name,
                    commander,
                    target.orig_block_count,
                    (dist_squared as f64).sqrt() as i64,
                    bearing(dx, dz)
                ),
            ));
        }
    }
    notifications
}

impl<W: WorldAccess> Coordinator<W> {
    pub(crate) fn contact_pass(&mut self, now: u64) {
        if !self.passes.contact_timer.fire(now) {
            return;
        }
        let tracked = self.passes.contacts.len();
        if tracked > MAX_TRACKED_CONTACTS {
            warn!("Contact tracker holds {} pairs, resetting it", tracked);
            self.passes.contacts.clear();
        } else {
            self.passes.contacts.prune(&self.registry);
        }

        let mut notifications = Vec::new();
        for world in self.registry.worlds() {
            notifications.extend(detect_contacts(
                &mut self.passes.contacts,
                &self.registry,
                world,
                now,
                &self.settings,
            ));
        }
        for (player, message) in notifications {
            debug!("Contact for {}: {}", player, message);
            self.notify(Some(player), &message);
        }
    }
}
