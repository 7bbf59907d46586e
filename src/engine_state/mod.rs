//! # Engine State Module
//!
//! The coordinator that owns every craft, schedules their structural tasks and
//! is the only thing that ever writes to a world.
//!
//! ## Key Components
//!
//! * `Coordinator` - the tick loop state: registry, task manager, update queue
//! * `crafts` - craft model, registry, spatial utilities and structural tasks
//! * `map_updates` - the collision-checked, all-or-nothing world writer
//! * `passes` - cruise, sinking, transient-entity, fading, contact and siege passes
//! * `task_management` - worker pool and completion queue
//! * `integration` - notifier, region policy and economy collaborators
//! * `voxels` - blocks, chunks, entities and the in-memory world
//!
//! ## Tick
//!
//! One call to `Coordinator::tick` runs, in order:
//!
//! 1. The periodic passes (which may dispatch new tasks)
//! 2. A drain of at most `completion_batch_size` completed tasks. Successful
//!    movements are queued for writing; failures are reported and the craft
//!    goes back to idle
//! 3. Dispatch of tasks waiting for a free worker
//! 4. A flush of the update queue. Each batch is validated against the live
//!    craft occupancy and written whole or not at all; only then is the
//!    craft's block list committed and the craft marked idle again
//!
//! Nothing here blocks on a worker. A task dispatched during tick `n` is seen
//! at the earliest by the drain of tick `n` (inline mode) or a later one.

pub mod crafts;
pub mod integration;
pub mod map_updates;
pub mod passes;
pub mod task_management;
pub mod voxels;

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::{Point3, Vector3};
use log::{debug, error, info, warn};
use web_time::{Duration, Instant};

use crate::config::Settings;
use crate::core::MtResource;
use crate::error::{CraftError, OwnershipConflict};

use crafts::craft_type::CraftType;
use crafts::registry::CraftRegistry;
use crafts::spatial::rotate_location;
use crafts::tasks::{
    DetectionResult, DetectionTask, MovementFailure, MovementResult, RotationTask, StructuralTask,
    TranslationTask,
};
use crafts::{Craft, CraftId, ProcessingState};
use integration::{Economy, LogNotifier, Notifier, RegionPolicy};
use map_updates::{apply_update, Occupancy, PendingUpdate, UpdateQueue};
use passes::PassState;
use task_management::task::{CompletedTask, TaskId, TaskOutcome};
use task_management::TaskManager;
use voxels::block::{block_side::Rotation, BlockPos};
use voxels::entity::PlayerId;
use voxels::world::{WorldAccess, WorldId};

/// A requested change of position, kept until its result is committed.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Movement {
    Translate(Vector3<i32>),
    Rotate { rotation: Rotation, pivot: BlockPos },
}

/// What the coordinator remembers about a task while it is in flight.
#[derive(Copy, Clone, Debug)]
enum InFlight {
    Detection {
        world: WorldId,
        controller: Option<PlayerId>,
        notification_target: Option<PlayerId>,
        heading: Vector3<i32>,
    },
    Movement(Movement),
}

/// Who asked for a detection, as remembered until it is drained.
#[derive(Copy, Clone, Debug)]
struct DetectionOrigin {
    world: WorldId,
    controller: Option<PlayerId>,
    target: Option<PlayerId>,
    heading: Vector3<i32>,
}

/// A movement whose world update is waiting in the update queue.
#[derive(Clone, Debug)]
struct PendingMove {
    movement: Movement,
    new_blocks: Vec<BlockPos>,
}

/// Schedules structural tasks for every craft and applies their results.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use cgmath::{Point3, Vector3};
/// use craft_engine::config::Settings;
/// use craft_engine::engine_state::crafts::craft_type::CraftType;
/// use craft_engine::engine_state::voxels::block::{block_type::BlockType, Block};
/// use craft_engine::engine_state::voxels::world::{VoxelWorld, WorldAccess, WorldId};
/// use craft_engine::engine_state::Coordinator;
///
/// let mut world = VoxelWorld::new(WorldId(0));
/// world.set_block(Point3::new(0, 64, 0), Block::new(BlockType::PLANKS));
/// world.set_block(Point3::new(1, 64, 0), Block::new(BlockType::PLANKS));
///
/// let mut coordinator = Coordinator::new(Settings::default());
/// let world = coordinator.add_world(world);
/// let skiff = Arc::new(CraftType {
///     name: "Skiff".to_string(),
///     allowed_blocks: vec![BlockType::PLANKS],
///     ..Default::default()
/// });
///
/// let craft = coordinator
///     .detect(WorldId(0), Point3::new(0, 64, 0), skiff, None, None)
///     .unwrap();
/// coordinator.tick();
/// coordinator.translate(craft, Vector3::new(0, 1, 0)).unwrap();
/// coordinator.tick();
///
/// assert!(coordinator.is_idle());
/// assert_eq!(
///     world.get().block_at(Point3::new(0, 65, 0)).block_type,
///     BlockType::PLANKS
/// );
/// ```
pub struct Coordinator<W: WorldAccess> {
    settings: Settings,
    registry: CraftRegistry,
    task_manager: TaskManager,
    update_queue: UpdateQueue,
    worlds: HashMap<WorldId, MtResource<W>>,
    /// Task to craft ownership. An entry lives exactly from dispatch to drain.
    in_flight: HashMap<TaskId, InFlight>,
    pending_moves: HashMap<CraftId, PendingMove>,
    notifier: Arc<dyn Notifier>,
    policy: Option<Arc<dyn RegionPolicy>>,
    economy: Option<Arc<dyn Economy>>,
    passes: PassState,
    current_tick: u64,
}

impl<W: WorldAccess> Coordinator<W> {
    pub fn new(settings: Settings) -> Self {
        let task_manager = TaskManager::new(settings.worker_threads);
        let passes = PassState::new(&settings);
        Coordinator {
            settings,
            registry: CraftRegistry::new(),
            task_manager,
            update_queue: UpdateQueue::new(),
            worlds: HashMap::new(),
            in_flight: HashMap::new(),
            pending_moves: HashMap::new(),
            notifier: Arc::new(LogNotifier),
            policy: None,
            economy: None,
            passes,
            current_tick: 0,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_region_policy(mut self, policy: Arc<dyn RegionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_economy(mut self, economy: Arc<dyn Economy>) -> Self {
        self.economy = Some(economy);
        self
    }

    /// Starts managing `world` and returns a shared handle to it.
    pub fn add_world(&mut self, world: W) -> MtResource<W> {
        let id = world.id();
        let handle = MtResource::new(world);
        if self.worlds.insert(id, handle.clone()).is_some() {
            warn!("World {:?} was already managed and has been replaced", id);
        }
        handle
    }

    pub fn world(&self, id: WorldId) -> Option<&MtResource<W>> {
        self.worlds.get(&id)
    }

    pub fn registry(&self) -> &CraftRegistry {
        &self.registry
    }

    pub fn craft(&self, id: CraftId) -> Option<&Craft> {
        self.registry.get(id)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pass_state(&self) -> &PassState {
        &self.passes
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Tasks dispatched and not yet drained.
    pub fn tasks_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_updates(&self) -> usize {
        self.update_queue.len()
    }

    /// True when no task is in flight, no update is queued and every craft is idle.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
            && self.update_queue.is_empty()
            && self.task_manager.outstanding() == 0
            && self.registry.iter().all(Craft::is_idle)
    }

    /// Starts detecting a new craft of `craft_type` from `seed`.
    ///
    /// The returned id is reserved for the craft; it only appears in the
    /// registry once the detection has been drained and accepted.
    pub fn detect(
        &mut self,
        world: WorldId,
        seed: BlockPos,
        craft_type: Arc<CraftType>,
        controller: Option<PlayerId>,
        notification_target: Option<PlayerId>,
    ) -> Result<CraftId, CraftError> {
        let heading = Vector3::new(0, 0, 0);
        self.detect_heading(world, seed, craft_type, controller, notification_target, heading)
    }

    /// Like `detect`, with the horizontal direction the pilot faces. A
    /// cruise-on-pilot craft starts cruising that way once it is accepted.
    pub fn detect_heading(
        &mut self,
        world: WorldId,
        seed: BlockPos,
        craft_type: Arc<CraftType>,
        controller: Option<PlayerId>,
        notification_target: Option<PlayerId>,
        heading: Vector3<i32>,
    ) -> Result<CraftId, CraftError> {
        let handle = self
            .worlds
            .get(&world)
            .cloned()
            .ok_or(CraftError::UnknownWorld(world))?;
        let target = notification_target.or(controller);

        if let Some(player) = controller {
            if self.is_commanding(player) {
                let error = CraftError::from(OwnershipConflict::AlreadyCommanding);
                self.notify(target, &error.to_string());
                return Err(error);
            }
        }

        let id = self.registry.allocate_id();
        let task = StructuralTask::Detection(DetectionTask::new(
            id,
            handle,
            craft_type,
            seed,
            controller,
        ));
        let task_id = self.task_manager.publish_task(Box::new(task));
        self.in_flight.insert(
            task_id,
            InFlight::Detection {
                world,
                controller,
                notification_target: target,
                heading: Vector3::new(heading.x.signum(), 0, heading.z.signum()),
            },
        );
        debug!("Dispatched detection {:?} for {} at {:?}", task_id, id, seed);
        Ok(id)
    }

    /// Whether `player` commands a craft or has a detection in flight.
    fn is_commanding(&self, player: PlayerId) -> bool {
        self.registry.craft_by_controller(player).is_some()
            || self.in_flight.values().any(|task| {
                matches!(task, InFlight::Detection { controller: Some(p), .. } if *p == player)
            })
    }

    /// Dispatches a translation of `craft` by `delta`. Refused while the craft
    /// is busy.
    pub fn translate(&mut self, craft: CraftId, delta: Vector3<i32>) -> Result<TaskId, CraftError> {
        self.dispatch_movement(craft, Movement::Translate(delta))
    }

    /// Dispatches a quarter turn of `craft` about `pivot`.
    pub fn rotate(
        &mut self,
        craft: CraftId,
        rotation: Rotation,
        pivot: BlockPos,
    ) -> Result<TaskId, CraftError> {
        self.dispatch_movement(craft, Movement::Rotate { rotation, pivot })
    }

    fn dispatch_movement(&mut self, id: CraftId, movement: Movement) -> Result<TaskId, CraftError> {
        let craft = self.registry.get(id).ok_or(CraftError::UnknownCraft(id))?;
        if !craft.is_idle() {
            return Err(OwnershipConflict::CraftBusy.into());
        }
        let world = self
            .worlds
            .get(&craft.world)
            .cloned()
            .ok_or(CraftError::UnknownWorld(craft.world))?;
        let snapshot = craft.snapshot(self.registry.controller_of(id));
        let policy = self.policy.clone();

        let task = match movement {
            Movement::Translate(delta) => {
                StructuralTask::Translation(TranslationTask::new(snapshot, world, delta, policy))
            }
            Movement::Rotate { rotation, pivot } => StructuralTask::Rotation(RotationTask::new(
                snapshot, world, rotation, pivot, policy,
            )),
        };

        if let Some(craft) = self.registry.get_mut(id) {
            craft.set_processing(ProcessingState::Dispatched);
        }
        let task_id = self.task_manager.publish_task(Box::new(task));
        self.in_flight.insert(task_id, InFlight::Movement(movement));
        debug!("Dispatched {:?} for {} as {:?}", movement, id, task_id);
        Ok(task_id)
    }

    /// Removes a craft from the registry. A task still in flight for it is
    /// discarded when it completes.
    pub fn release(&mut self, id: CraftId) -> Result<Craft, CraftError> {
        let craft = self
            .registry
            .remove_craft(id)
            .ok_or(CraftError::UnknownCraft(id))?;
        self.pending_moves.remove(&id);
        info!("Released {} ({})", id, craft.craft_type.name);
        Ok(craft)
    }

    /// Starts cruising in `direction`, or stops cruising with `None`.
    pub fn set_cruising(
        &mut self,
        id: CraftId,
        direction: Option<Vector3<i32>>,
    ) -> Result<(), CraftError> {
        let now = self.current_tick;
        let craft = self
            .registry
            .get_mut(id)
            .ok_or(CraftError::UnknownCraft(id))?;
        match direction {
            Some(direction) => {
                craft.cruise_direction = direction;
                craft.cruising = true;
                craft.last_cruise_update = now;
            }
            None => craft.cruising = false,
        }
        Ok(())
    }

    /// Records a movement command from the pilot. While these keep arriving
    /// the craft repeats its last move.
    pub fn record_right_click(&mut self, id: CraftId) -> Result<(), CraftError> {
        let now = self.current_tick;
        let craft = self
            .registry
            .get_mut(id)
            .ok_or(CraftError::UnknownCraft(id))?;
        craft.last_right_click = now;
        craft.keep_moving = true;
        Ok(())
    }

    /// Locks the pilot to `anchor`, or unlocks with `None`. While locked, the
    /// pilot walking away from the anchor steers the craft.
    pub fn set_pilot_lock(
        &mut self,
        id: CraftId,
        anchor: Option<Point3<f64>>,
    ) -> Result<(), CraftError> {
        let craft = self
            .registry
            .get_mut(id)
            .ok_or(CraftError::UnknownCraft(id))?;
        craft.pilot_locked = anchor.is_some();
        craft.pilot_lock_anchor = anchor;
        Ok(())
    }

    /// Runs one scheduling tick.
    pub fn tick(&mut self) {
        self.current_tick += 1;
        let now = self.current_tick;

        self.cruise_pass(now);
        self.sinking_pass(now);
        self.transient_pass(now);
        self.fading_pass(now);
        self.contact_pass(now);
        self.siege_pass(now);

        let drain_started = Instant::now();
        let completed = self
            .task_manager
            .drain_completed(self.settings.completion_batch_size);
        let drained = completed.len();
        for task in completed {
            self.handle_completion(task);
        }
        if drained > 0 {
            debug!(
                "Tick {}: drained {} tasks in {:?}",
                now,
                drained,
                drain_started.elapsed()
            );
        }

        self.task_manager.process_queued_tasks();
        self.flush_updates();
    }

    /// Ticks until the coordinator is idle or `max_ticks` have run, waiting up
    /// to `wait` on workers between ticks. Returns whether it went idle.
    pub fn run_until_idle(&mut self, max_ticks: u64, wait: Duration) -> bool {
        for _ in 0..max_ticks {
            self.tick();
            if self.is_idle() {
                return true;
            }
            if self.task_manager.worker_count() > 0 && self.task_manager.outstanding() > 0 {
                self.task_manager.wait_for_completion(wait);
            }
        }
        self.is_idle()
    }

    fn handle_completion(&mut self, completed: CompletedTask) {
        let CompletedTask {
            id: task_id,
            craft,
            outcome,
            elapsed,
        } = completed;
        let Some(in_flight) = self.in_flight.remove(&task_id) else {
            warn!("Completed task {:?} for {} was not in flight", task_id, craft);
            return;
        };
        debug!("{:?} for {} computed in {:?}", task_id, craft, elapsed);

        match (in_flight, outcome) {
            (
                InFlight::Detection {
                    world,
                    controller,
                    notification_target,
                    heading,
                },
                TaskOutcome::Detected(result),
            ) => {
                let origin = DetectionOrigin {
                    world,
                    controller,
                    target: notification_target,
                    heading,
                };
                self.finish_detection(craft, origin, result)
            }
            (InFlight::Movement(movement), TaskOutcome::Translated(result))
            | (InFlight::Movement(movement), TaskOutcome::Rotated(result)) => {
                self.finish_movement(craft, movement, result)
            }
            (in_flight, TaskOutcome::Aborted(reason)) => {
                let target = match in_flight {
                    InFlight::Detection {
                        notification_target,
                        ..
                    } => notification_target,
                    InFlight::Movement(_) => self.message_target(craft),
                };
                self.notify(target, &format!("Craft task failed: {}", reason));
                self.set_idle(craft);
            }
            (in_flight, _) => {
                error!(
                    "Task {:?} for {} returned an outcome that does not match {:?}",
                    task_id, craft, in_flight
                );
                self.set_idle(craft);
            }
        }
    }

    fn finish_detection(
        &mut self,
        id: CraftId,
        origin: DetectionOrigin,
        result: Result<DetectionResult, CraftError>,
    ) {
        let DetectionOrigin {
            world,
            controller,
            target,
            heading,
        } = origin;
        let detected = match result {
            Ok(detected) => detected,
            Err(error) => {
                self.notify(target, &error.to_string());
                return;
            }
        };

        if let Some(player) = controller {
            if self.registry.craft_by_controller(player).is_some() {
                let message = OwnershipConflict::AlreadyCommanding.to_string();
                self.notify(target, &message);
                return;
            }
        }

        let now = self.current_tick;
        let mut craft = Craft::new(id, world, detected.craft_type, detected.blocks);
        craft.notification_target = target;
        craft.last_cruise_update = now;
        craft.last_block_check = now;
        if craft.craft_type.cruise_on_pilot {
            craft.cruise_direction = heading;
            craft.cruising =
                heading != Vector3::new(0, 0, 0) || craft.craft_type.cruise_on_pilot_vert_move != 0;
        }

        let plan = match self.registry.plan_detection(&craft, craft.block_list()) {
            Ok(plan) => plan,
            Err(conflict) => {
                self.notify(target, &conflict.to_string());
                return;
            }
        };

        let size = craft.size();
        let bounds = craft.bounds();
        info!(
            "{} successfully piloted a {} ({}) of size {} at {}, {}",
            controller.map_or("NULL PLAYER".to_string(), |p| p.to_string()),
            craft.craft_type.name,
            id,
            size,
            bounds.min.x,
            bounds.min.z
        );
        // Cruise-on-pilot craft fly themselves.
        let controller = controller.filter(|_| !craft.craft_type.cruise_on_pilot);
        self.registry.commit_detection(craft, controller, plan);
        if target.is_some() {
            self.notify(
                target,
                &format!("Detection - Successfully piloted craft Size: {}", size),
            );
        }
    }

    fn finish_movement(
        &mut self,
        id: CraftId,
        movement: Movement,
        result: Result<MovementResult, MovementFailure>,
    ) {
        let Some(craft) = self.registry.get(id) else {
            debug!("{} is gone, discarding its {:?} result", id, movement);
            return;
        };
        let world = craft.world;
        let sinking = craft.sinking;

        match result {
            Ok(result) if result.updates.blocks.is_empty() => {
                if let Some(craft) = self.registry.get_mut(id) {
                    craft.set_blocks(result.new_blocks);
                    craft.set_processing(ProcessingState::Idle);
                }
            }
            Ok(result) => {
                self.pending_moves.insert(
                    id,
                    PendingMove {
                        movement,
                        new_blocks: result.new_blocks,
                    },
                );
                self.update_queue.enqueue(world, result.updates);
                if let Some(craft) = self.registry.get_mut(id) {
                    craft.set_processing(ProcessingState::Completed);
                }
            }
            Err(failure) if sinking => {
                debug!("Sinking {} stopped: {}", id, failure.error);
                if !failure.effects.is_empty() {
                    // The wreck is gone by the flush, so the effect is world maintenance.
                    let mut effects = failure.effects;
                    effects.craft = None;
                    for command in &mut effects.blocks {
                        command.craft = None;
                    }
                    self.update_queue.enqueue(world, effects);
                }
                self.retire_wreck(id);
            }
            Err(failure) => {
                let target = self.message_target(id);
                self.notify(target, &failure.error.to_string());
                let state = if failure.effects.is_empty() {
                    ProcessingState::Idle
                } else {
                    self.update_queue.enqueue(world, failure.effects);
                    ProcessingState::Completed
                };
                if let Some(craft) = self.registry.get_mut(id) {
                    craft.set_processing(state);
                }
            }
        }
    }

    /// Writes every queued batch, in submission order.
    fn flush_updates(&mut self) {
        let mut occupancies: HashMap<WorldId, Occupancy> = HashMap::new();

        while let Some(PendingUpdate { world, batch }) = self.update_queue.pop() {
            if let Some(id) = batch.craft {
                if !self.registry.contains(id) {
                    debug!("{} is gone, dropping its queued update", id);
                    self.pending_moves.remove(&id);
                    continue;
                }
            }
            let Some(handle) = self.worlds.get(&world) else {
                warn!("Dropping update for unmanaged world {:?}", world);
                continue;
            };

            let registry = &self.registry;
            let occupancy = occupancies
                .entry(world)
                .or_insert_with(|| Occupancy::from_crafts(registry.crafts_in_world(world)));
            let applied = {
                let mut guard = handle.get_mut();
                apply_update(&mut *guard, &batch, occupancy)
            };

            let Some(id) = batch.craft else {
                if let Err(update_error) = applied {
                    error!("World maintenance update rejected: {}", update_error);
                }
                continue;
            };
            let pending = self.pending_moves.remove(&id);
            match applied {
                Ok(()) => {
                    if let Some(pending) = pending {
                        self.commit_move(id, pending, occupancy);
                    }
                }
                Err(update_error) => {
                    error!("{} update rejected: {}", id, update_error);
                }
            }
            self.set_idle(id);
        }
    }

    /// Adopts a written movement as the craft's new state.
    fn commit_move(&mut self, id: CraftId, pending: PendingMove, occupancy: &mut Occupancy) {
        let Some(craft) = self.registry.get_mut(id) else {
            return;
        };
        let old_blocks = craft.block_list().to_vec();
        craft.set_blocks(pending.new_blocks);
        occupancy.replace(id, &old_blocks, craft.block_list());

        match pending.movement {
            Movement::Translate(delta) => {
                craft.last_move = delta;
                if let Some(anchor) = craft.pilot_lock_anchor.as_mut() {
                    *anchor += Vector3::new(delta.x as f64, delta.y as f64, delta.z as f64);
                }
            }
            Movement::Rotate { rotation, pivot } => {
                if let Some(anchor) = craft.pilot_lock_anchor.as_mut() {
                    *anchor = rotate_location(*anchor, pivot, rotation);
                }
            }
        }
        debug!("{} committed {:?}", id, pending.movement);
    }

    fn set_idle(&mut self, id: CraftId) {
        if let Some(craft) = self.registry.get_mut(id) {
            craft.set_processing(ProcessingState::Idle);
        }
    }

    /// Who hears about `id`: its notification target, else its controller.
    fn message_target(&self, id: CraftId) -> Option<PlayerId> {
        self.registry
            .get(id)
            .and_then(|craft| craft.notification_target)
            .or_else(|| self.registry.controller_of(id))
    }

    fn notify(&self, target: Option<PlayerId>, message: &str) {
        match target {
            Some(target) => self.notifier.notify(target, message),
            None => info!("NULL Player: {}", message),
        }
    }
}
