//! # Periodic Passes
//!
//! Whole-world maintenance run by the coordinator at the start of every tick,
//! always in this order:
//!
//! 1. `cruise`: cruise, keep-moving and pilot-lock continuation
//! 2. `sinking`: integrity checks and the descent of sinking craft
//! 3. `transient`: tracers, dispenser fireballs and contact explosives
//! 4. `fading`: wreck blocks reverting to air or water
//! 5. `contacts`: new-contact notifications between controlled craft
//! 6. `siege`: daily income for siege control regions
//!
//! Passes that act on individual craft (cruise, sinking) gate themselves per
//! craft from the craft's own timestamps. The others are gated globally by a
//! `PassTimer`.
//!
//! ## State Store
//!
//! Everything a pass remembers between runs lives in `PassState`, owned by the
//! coordinator and lent to the pass that needs it. Each tracking structure has
//! a sanity bound. A structure found over its bound, or referring to things
//! that no longer exist, is treated as corrupt: it is logged at `warn`,
//! discarded and rebuilt from scratch on the next run.

pub mod contacts;
pub mod cruise;
pub mod fading;
pub mod siege;
pub mod sinking;
pub mod transient;

use crate::config::Settings;

use self::contacts::ContactTracker;
use self::fading::FadeStore;
use self::transient::TransientTracker;

/// Interval gate for a pass, counted in ticks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PassTimer {
    interval: u64,
    last_run: u64,
}

impl PassTimer {
    /// A timer that first fires `interval` ticks after tick zero. An interval
    /// of zero never fires.
    pub fn new(interval: u64) -> Self {
        PassTimer {
            interval,
            last_run: 0,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.interval > 0 && now.saturating_sub(self.last_run) >= self.interval
    }

    /// Returns whether the pass should run now, and if so restarts the interval.
    pub fn fire(&mut self, now: u64) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.last_run = now;
        true
    }
}

/// The coordinator-owned memory of the periodic passes.
#[derive(Debug)]
pub struct PassState {
    pub tracer_timer: PassTimer,
    pub fireball_timer: PassTimer,
    pub tnt_timer: PassTimer,
    pub fade_timer: PassTimer,
    pub contact_timer: PassTimer,
    pub siege_timer: PassTimer,
    pub fades: FadeStore,
    pub contacts: ContactTracker,
    pub transients: TransientTracker,
}

impl PassState {
    pub fn new(settings: &Settings) -> Self {
        PassState {
            tracer_timer: PassTimer::new(settings.tracer_rate_ticks),
            fireball_timer: PassTimer::new(settings.fireball_check_ticks),
            tnt_timer: PassTimer::new(if settings.tnt_contact_explosives {
                settings.tnt_check_ticks
            } else {
                0
            }),
            fade_timer: PassTimer::new(if settings.fade_wrecks_after_ticks > 0 {
                settings.fade_check_ticks
            } else {
                0
            }),
            contact_timer: PassTimer::new(settings.contact_check_ticks),
            siege_timer: PassTimer::new(settings.siege_payout_interval_ticks),
            fades: FadeStore::default(),
            contacts: ContactTracker::default(),
            transients: TransientTracker::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_once_per_interval() {
        let mut timer = PassTimer::new(4);
        assert!(!timer.fire(3));
        assert!(timer.fire(4));
        assert!(!timer.fire(7));
        assert!(timer.fire(8));
    }

    #[test]
    fn zero_interval_disables_the_pass() {
        let mut timer = PassTimer::new(0);
        assert!(!timer.fire(0));
        assert!(!timer.fire(1_000_000));
    }

    #[test]
    fn disabled_features_get_disabled_timers() {
        let settings = Settings {
            tnt_contact_explosives: false,
            ..Default::default()
        };
        let state = PassState::new(&settings);
        assert_eq!(state.tnt_timer.interval(), 0);
        // Fading is off by default.
        assert_eq!(state.fade_timer.interval(), 0);
        assert_eq!(state.contact_timer.interval(), 21);
    }
}
