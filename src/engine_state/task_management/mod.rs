//! # Task Management System
//!
//! Runs structural tasks off the tick thread and hands their outcomes back
//! through a single completion queue.
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: owns the worker pool, the overflow queue and the
//!   completion queue
//! - `TaskChannel`: the sending half to one worker plus its in-flight count
//! - Completion queue: one `mpsc` channel shared by every worker (many
//!   producers) and read only by the tick loop (one consumer). It is the only
//!   place where worker threads talk back to the tick loop.
//!
//! ## Execution Modes
//!
//! ### Threaded
//! - A fixed pool of `std::thread` workers, each with a dedicated task channel
//! - Round-robin dispatch, at most `MAX_TASKS_IN_FLIGHT` per worker
//! - Tasks that find every worker busy wait in `queued_tasks` and are still
//!   considered dispatched by the coordinator
//!
//! ### Inline
//! - With zero workers, `publish_task` runs the task immediately on the caller's
//!   thread and pushes its outcome onto the completion queue
//! - Outcomes are still only observed at the next drain, so the per-craft state
//!   machine is identical in both modes
//!
//! ## Task Lifecycle
//! 1. `publish_task()` assigns a `TaskId` and sends the task to a free worker,
//!    queues it, or runs it inline
//! 2. The worker calls `process()` and sends a `CompletedTask` back
//! 3. `drain_completed()` pops up to a bounded number of outcomes, in
//!    completion order
//! 4. `process_queued_tasks()` moves queued tasks onto workers that freed up

pub mod task;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use web_time::{Duration, Instant};

use task::{CompletedTask, Task, TaskId, TaskOutcome};

type QueuedTask = (TaskId, Box<dyn Task>);

/// A completion as sent by a worker: the worker's index (`None` when run inline)
/// and the completed task.
type Completion = (Option<usize>, CompletedTask);

/// The sending half to one worker thread.
#[derive(Debug)]
pub struct TaskChannel {
    task_sender: Sender<QueuedTask>,
    num_tasks_in_flight: usize,
    _worker: JoinHandle<()>,
}

/// Maximum number of tasks that can be in flight per worker channel.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

pub struct TaskManager {
    channels: Vec<TaskChannel>,
    queued_tasks: VecDeque<QueuedTask>,
    current_channel: usize,
    completion_receiver: Receiver<Completion>,
    /// Completions already pulled off the channel by `wait_for_completion`.
    received: VecDeque<Completion>,
    next_task_id: u64,
    /// Published and not yet drained.
    outstanding: usize,
}

impl TaskManager {
    /// Creates a manager with `num_workers` worker threads. Zero workers runs
    /// every task inline.
    pub fn new(num_workers: usize) -> Self {
        let (completion_sender, completion_receiver) = channel::<Completion>();
        let mut channels = Vec::with_capacity(num_workers);

        if num_workers > 0 {
            info!(
                "Starting {} task workers (available parallelism: {:?})",
                num_workers,
                thread::available_parallelism()
            );
        }

        for worker_index in 0..num_workers {
            let (task_tx, task_rx) = channel::<QueuedTask>();
            let result_tx = completion_sender.clone();

            let worker = thread::spawn(move || {
                while let Ok((id, task)) = task_rx.recv() {
                    let completed = run_task(id, task);
                    if result_tx.send((Some(worker_index), completed)).is_err() {
                        break;
                    }
                }
            });

            channels.push(TaskChannel {
                task_sender: task_tx,
                num_tasks_in_flight: 0,
                _worker: worker,
            });
        }

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
            completion_receiver,
            received: VecDeque::new(),
            next_task_id: 0,
            outstanding: 0,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.channels.len()
    }

    /// Tasks published and not yet drained, wherever they are.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn queued(&self) -> usize {
        self.queued_tasks.len()
    }

    fn try_send_task(&mut self, task: QueuedTask, channel_idx: usize) -> Result<(), QueuedTask> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(task) => Err(task.0),
        }
    }

    /// Round-robin search for a worker below `MAX_TASKS_IN_FLIGHT`, starting
    /// after the last one used.
    fn find_available_channel(&self) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }
        let start_channel = self.current_channel;
        let mut current = start_channel;
        loop {
            if self.channels[current].num_tasks_in_flight < MAX_TASKS_IN_FLIGHT {
                return Some(current);
            }
            current = (current + 1) % self.channels.len();
            if current == start_channel {
                return None;
            }
        }
    }

    /// Publishes a task for execution and returns its id.
    ///
    /// The task runs immediately (inline mode), goes to a free worker, or waits
    /// in the overflow queue. In every case its outcome is only observed through
    /// `drain_completed`.
    pub fn publish_task(&mut self, task: Box<dyn Task>) -> TaskId {
        self.next_task_id += 1;
        let id = TaskId(self.next_task_id);
        self.outstanding += 1;

        if self.channels.is_empty() {
            let completed = run_task(id, task);
            self.received.push_back((None, completed));
            return id;
        }

        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task((id, task), channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                }
                Err(task) => {
                    error!("Task worker {} disconnected, queueing {:?}", channel_idx, task.0);
                    self.queued_tasks.push_back(task);
                }
            },
            None => {
                debug!("All task workers busy, queueing {:?}", id);
                self.queued_tasks.push_back((id, task));
            }
        }
        id
    }

    /// Moves queued tasks onto workers that have capacity, oldest first.
    pub fn process_queued_tasks(&mut self) {
        while !self.queued_tasks.is_empty() {
            let Some(channel_idx) = self.find_available_channel() else {
                break;
            };
            let Some(task) = self.queued_tasks.pop_front() else {
                break;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                }
                Err(task) => {
                    self.queued_tasks.push_front(task);
                    break;
                }
            }
        }
    }

    /// Pops up to `max` completed tasks, in the order they completed.
    pub fn drain_completed(&mut self, max: usize) -> Vec<CompletedTask> {
        let mut drained = Vec::new();
        while drained.len() < max {
            let next = match self.received.pop_front() {
                Some(completion) => completion,
                None => match self.completion_receiver.try_recv() {
                    Ok(completion) => completion,
                    Err(_) => break,
                },
            };
            drained.push(self.account(next));
        }
        drained
    }

    /// Blocks until at least one completion is ready to drain or `timeout`
    /// passes. Returns whether one is ready.
    pub fn wait_for_completion(&mut self, timeout: Duration) -> bool {
        if !self.received.is_empty() {
            return true;
        }
        match self.completion_receiver.recv_timeout(timeout) {
            Ok(completion) => {
                self.received.push_back(completion);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn account(&mut self, (worker, completed): Completion) -> CompletedTask {
        if let Some(channel) = worker.and_then(|index| self.channels.get_mut(index)) {
            channel.num_tasks_in_flight = channel.num_tasks_in_flight.saturating_sub(1);
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        completed
    }
}

/// Runs one task, turning a panic into an `Aborted` outcome so the craft it
/// belongs to is still released.
fn run_task(id: TaskId, task: Box<dyn Task>) -> CompletedTask {
    let craft = task.craft();
    let kind = task.kind();
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || task.process()))
        .unwrap_or_else(|payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("{} task {:?} for {} panicked: {}", kind, id, craft, reason);
            TaskOutcome::Aborted(reason)
        });
    CompletedTask {
        id,
        craft,
        outcome,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::crafts::CraftId;

    struct Echo(CraftId, bool);

    impl Task for Echo {
        fn craft(&self) -> CraftId {
            self.0
        }

        fn kind(&self) -> &'static str {
            "echo"
        }

        fn process(self: Box<Self>) -> TaskOutcome {
            if self.1 {
                panic!("boom");
            }
            TaskOutcome::Aborted(format!("{}", self.0))
        }
    }

    #[test]
    fn inline_tasks_complete_on_next_drain() {
        let mut manager = TaskManager::new(0);
        let id = manager.publish_task(Box::new(Echo(CraftId(3), false)));
        assert_eq!(manager.outstanding(), 1);

        let drained = manager.drain_completed(10);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, id);
        assert_eq!(drained[0].craft, CraftId(3));
        assert_eq!(manager.outstanding(), 0);
    }

    #[test]
    fn drain_is_bounded() {
        let mut manager = TaskManager::new(0);
        for n in 0..5 {
            manager.publish_task(Box::new(Echo(CraftId(n), false)));
        }
        assert_eq!(manager.drain_completed(2).len(), 2);
        assert_eq!(manager.drain_completed(10).len(), 3);
    }

    #[test]
    fn panicking_task_is_reported_as_aborted() {
        let mut manager = TaskManager::new(0);
        manager.publish_task(Box::new(Echo(CraftId(1), true)));
        let drained = manager.drain_completed(1);
        assert!(matches!(&drained[0].outcome, TaskOutcome::Aborted(reason) if reason == "boom"));
    }

    #[test]
    fn threaded_tasks_overflow_into_the_queue() {
        let mut manager = TaskManager::new(1);
        for n in 0..3 {
            manager.publish_task(Box::new(Echo(CraftId(n), false)));
        }
        assert_eq!(manager.outstanding(), 3);

        let mut drained = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while drained.len() < 3 && Instant::now() < deadline {
            manager.wait_for_completion(Duration::from_millis(50));
            drained.extend(manager.drain_completed(10));
            manager.process_queued_tasks();
        }
        assert_eq!(drained.len(), 3);
        assert_eq!(manager.queued(), 0);
        let mut crafts: Vec<u64> = drained.iter().map(|c| c.craft.0).collect();
        crafts.sort();
        assert_eq!(crafts, vec![0, 1, 2]);
    }
}
