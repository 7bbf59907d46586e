//! # Task System Core Types
//!
//! ## Core Components
//! - `Task`: a unit of work bound to exactly one craft
//! - `TaskOutcome`: what a task produced, one variant per task kind
//! - `CompletedTask`: an outcome tagged with its task and craft, as it comes
//!   off the completion queue
//!
//! ## Task Lifecycle
//! 1. The coordinator marks the craft `Dispatched` and publishes the task via
//!    `TaskManager::publish_task()`
//! 2. The task's `process()` method runs on a worker thread (or inline)
//! 3. The outcome is pushed onto the shared completion queue
//! 4. The coordinator drains a bounded batch per tick and interprets each
//!    outcome with a `match`
//!
//! ## Thread Safety
//! - `Task` must be `Send` to be transferred to a worker
//! - Tasks only ever take read guards on the world

use web_time::Duration;

use crate::engine_state::crafts::tasks::{DetectionResult, MovementFailure, MovementResult};
use crate::engine_state::crafts::CraftId;
use crate::error::CraftError;

/// Identifier of one dispatch. Never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

/// A unit of work that computes off the tick thread.
///
/// Tasks own everything they need: a snapshot of the craft and a handle to the
/// world. They must never write to the world or to the live craft.
pub trait Task: Send {
    /// The craft this task belongs to.
    fn craft(&self) -> CraftId;

    /// Short label for logs.
    fn kind(&self) -> &'static str;

    /// Runs the computation. Consumes the task; it is never reused.
    fn process(self: Box<Self>) -> TaskOutcome;
}

#[derive(Debug)]
pub enum TaskOutcome {
    Detected(Result<DetectionResult, CraftError>),
    Translated(Result<MovementResult, MovementFailure>),
    Rotated(Result<MovementResult, MovementFailure>),
    /// The task panicked on its worker. Nothing was produced.
    Aborted(String),
}

#[derive(Debug)]
pub struct CompletedTask {
    pub id: TaskId,
    pub craft: CraftId,
    pub outcome: TaskOutcome,
    /// Wall time spent inside `process()`.
    pub elapsed: Duration,
}
