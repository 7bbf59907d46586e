//! Siege payouts.

use log::{info, warn};

use crate::config::SiegeConfig;
use crate::engine_state::integration::{Economy, RegionPolicy};
use crate::engine_state::voxels::world::WorldAccess;
use crate::engine_state::Coordinator;

/// Splits each siege's daily income evenly across the owners of its control
/// region. Failed deposits are logged and not retried. Returns the number of
/// successful deposits.
pub fn pay_sieges(sieges: &[SiegeConfig], policy: &dyn RegionPolicy, economy: &dyn Economy) -> usize {
    let mut paid = 0;
    for siege in sieges {
        let owners = policy.region_owners(&siege.control_region);
        if owners.is_empty() {
            continue;
        }
        let share = siege.daily_income / owners.len() as i64;
        for owner in &owners {
            match economy.deposit(owner, share) {
                Ok(()) => {
                    info!("Paid {} to {} for holding {}", share, owner, siege.name);
                    paid += 1;
                }
                Err(error) => warn!("Siege {}: {}", siege.name, error),
            }
        }
    }
    paid
}

impl<W: WorldAccess> Coordinator<W> {
    pub(crate) fn siege_pass(&mut self, now: u64) {
        if self.settings.sieges.is_empty() || !self.passes.siege_timer.fire(now) {
            return;
        }
        let (Some(policy), Some(economy)) = (self.policy.as_deref(), self.economy.as_deref())
        else {
            return;
        };
        pay_sieges(&self.settings.sieges, policy, economy);
    }
}
