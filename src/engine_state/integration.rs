//! # Integration Points
//!
//! Collaborators a deployment plugs into the coordinator. All of them are
//! optional: a coordinator without a region policy allows everything, one
//! without a notifier logs its messages, and one without an economy skips
//! siege payouts.

use std::sync::Mutex;

use log::info;

use crate::engine_state::voxels::block::BlockPos;
use crate::engine_state::voxels::entity::PlayerId;
use crate::engine_state::voxels::world::WorldId;
use crate::error::{EconomyError, PolicyDenial};

/// Delivers messages to players. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, target: PlayerId, message: &str);
}

/// Region and permission checks. Structural tasks call `can_move` from worker
/// threads.
pub trait RegionPolicy: Send + Sync {
    /// Why a craft at `pos` may not sink, if it may not.
    fn check_sink(&self, _world: WorldId, _pos: BlockPos) -> Option<PolicyDenial> {
        None
    }

    fn can_move(&self, _world: WorldId, _pos: BlockPos, _controller: Option<PlayerId>) -> bool {
        true
    }

    /// Accounts owning a named region, used for siege payouts.
    fn region_owners(&self, _region: &str) -> Vec<String> {
        Vec::new()
    }
}

pub trait Economy: Send + Sync {
    fn deposit(&self, account: &str, amount: i64) -> Result<(), EconomyError>;
}

/// Region policy that allows everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct AllowAll;

impl RegionPolicy for AllowAll {}

/// Notifier that writes every message to the log.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, target: PlayerId, message: &str) {
        info!("[{}] {}", target, message);
    }
}

/// Notifier that keeps every message, for inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(PlayerId, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(PlayerId, String)> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, target: PlayerId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(player, _)| *player == target)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, target: PlayerId, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((target, message.to_string()));
        }
    }
}
