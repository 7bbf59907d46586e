// End-to-end scenarios driven through the public coordinator API.
//
// Every test builds an in-memory world, pilots one or more hulls and ticks the
// coordinator, checking the world and the registry after each step. Unless a
// test says otherwise, tasks run inline (worker_threads = 0), so anything
// dispatched before or during a tick is written by the end of that tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cgmath::{Point3, Vector3};

use craft_engine::config::{Settings, SiegeConfig};
use craft_engine::engine_state::crafts::craft_type::{CraftType, FlyBlockRule};
use craft_engine::engine_state::crafts::CraftId;
use craft_engine::engine_state::integration::{Economy, RecordingNotifier, RegionPolicy};
use craft_engine::engine_state::voxels::block::block_side::{BlockSide, Rotation};
use craft_engine::engine_state::voxels::block::{block_type::BlockType, Block, BlockPos};
use craft_engine::engine_state::voxels::entity::PlayerId;
use craft_engine::engine_state::voxels::world::{VoxelWorld, WorldAccess, WorldId};
use craft_engine::engine_state::Coordinator;
use craft_engine::core::MtResource;
use craft_engine::error::{CraftError, EconomyError, OwnershipConflict, PolicyDenial};

const WORLD: WorldId = WorldId(0);

fn skiff() -> Arc<CraftType> {
    Arc::new(CraftType {
        name: "Skiff".to_string(),
        allowed_blocks: vec![BlockType::PLANKS],
        tick_cooldown: 2,
        ..Default::default()
    })
}

fn balloon() -> Arc<CraftType> {
    Arc::new(CraftType {
        name: "Balloon".to_string(),
        allowed_blocks: vec![BlockType::WOOL, BlockType::PLANKS],
        fly_blocks: vec![FlyBlockRule {
            blocks: vec![BlockType::WOOL],
            min_percent: 100.0,
            max_percent: 100.0,
        }],
        sink_percent: 50.0,
        ..Default::default()
    })
}

struct Harness {
    coordinator: Coordinator<VoxelWorld>,
    world: MtResource<VoxelWorld>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(settings: Settings, build: impl FnOnce(&mut VoxelWorld)) -> Self {
        Self::with_policy(settings, None, build)
    }

    fn with_policy(
        settings: Settings,
        policy: Option<Arc<dyn RegionPolicy>>,
        build: impl FnOnce(&mut VoxelWorld),
    ) -> Self {
        let mut world = VoxelWorld::new(WORLD);
        build(&mut world);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut coordinator = Coordinator::new(settings).with_notifier(notifier.clone());
        if let Some(policy) = policy {
            coordinator = coordinator.with_region_policy(policy);
        }
        let world = coordinator.add_world(world);
        Harness {
            coordinator,
            world,
            notifier,
        }
    }

    fn pilot(&mut self, seed: BlockPos, craft_type: Arc<CraftType>, player: u64) -> CraftId {
        let id = self
            .coordinator
            .detect(WORLD, seed, craft_type, Some(PlayerId(player)), None)
            .unwrap();
        self.coordinator.tick();
        assert!(
            self.coordinator.craft(id).is_some(),
            "detection failed: {:?}",
            self.notifier.messages()
        );
        id
    }

    fn ticks(&mut self, count: usize) {
        for _ in 0..count {
            self.coordinator.tick();
        }
    }

    fn block(&self, x: i32, y: i32, z: i32) -> BlockType {
        self.world.get().block_at(Point3::new(x, y, z)).block_type
    }

    fn sorted_blocks(&self, id: CraftId) -> Vec<(i32, i32, i32)> {
        let mut blocks: Vec<(i32, i32, i32)> = self
            .coordinator
            .craft(id)
            .unwrap()
            .block_list()
            .iter()
            .map(|pos| (pos.x, pos.y, pos.z))
            .collect();
        blocks.sort();
        blocks
    }
}

fn planks() -> Block {
    Block::new(BlockType::PLANKS)
}

fn row(world: &mut VoxelWorld, from: (i32, i32, i32), length: i32, block: Block) {
    let (x, y, z) = from;
    world.fill(Point3::new(x, y, z), Point3::new(x + length - 1, y, z), block);
}

#[test]
fn one_task_per_craft_and_busy_clears_after_the_write() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 5, planks())
    });
    let id = harness.pilot(Point3::new(0, 64, 0), skiff(), 1);

    harness.coordinator.translate(id, Vector3::new(0, 1, 0)).unwrap();
    assert!(!harness.coordinator.craft(id).unwrap().is_idle());
    assert_eq!(
        harness.coordinator.rotate(id, Rotation::CLOCKWISE, Point3::new(2, 64, 0)),
        Err(CraftError::OwnershipConflict(OwnershipConflict::CraftBusy))
    );

    harness.ticks(1);
    assert!(harness.coordinator.craft(id).unwrap().is_idle());
    assert!(harness.coordinator.is_idle());
    assert_eq!(harness.block(0, 65, 0), BlockType::PLANKS);
    assert_eq!(harness.block(0, 64, 0), BlockType::AIR);
}

#[test]
fn translation_round_trip_restores_the_world() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 3, planks());
        row(world, (0, 64, 1), 3, planks());
    });
    let id = harness.pilot(Point3::new(0, 64, 0), skiff(), 1);
    let before = harness.sorted_blocks(id);

    harness.coordinator.translate(id, Vector3::new(3, 0, -2)).unwrap();
    harness.ticks(1);
    assert_eq!(harness.block(3, 64, -2), BlockType::PLANKS);
    assert_eq!(harness.block(0, 64, 0), BlockType::AIR);

    harness.coordinator.translate(id, Vector3::new(-3, 0, 2)).unwrap();
    harness.ticks(1);
    assert_eq!(harness.sorted_blocks(id), before);
    assert_eq!(harness.block(3, 64, -2), BlockType::AIR);
    for (x, y, z) in before {
        assert_eq!(harness.block(x, y, z), BlockType::PLANKS);
    }
}

#[test]
fn four_quarter_turns_are_the_identity() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 3, planks());
        world.set_block(Point3::new(2, 64, 1), planks());
    });
    let id = harness.pilot(Point3::new(0, 64, 0), skiff(), 1);
    let before = harness.sorted_blocks(id);
    let pivot = Point3::new(1, 64, 0);

    harness.coordinator.rotate(id, Rotation::CLOCKWISE, pivot).unwrap();
    harness.ticks(1);
    assert_ne!(harness.sorted_blocks(id), before);

    for _ in 0..3 {
        harness.coordinator.rotate(id, Rotation::CLOCKWISE, pivot).unwrap();
        harness.ticks(1);
    }
    assert_eq!(harness.sorted_blocks(id), before);
}

#[test]
fn stairs_face_the_same_way_after_a_full_turn() {
    let stairs = Block::facing(BlockType::STAIRS, BlockSide::NORTH);
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 3, planks());
        world.set_block(Point3::new(2, 64, 1), stairs);
    });
    let deck = Arc::new(CraftType {
        allowed_blocks: vec![BlockType::PLANKS, BlockType::STAIRS],
        ..(*skiff()).clone()
    });
    let id = harness.pilot(Point3::new(0, 64, 0), deck, 1);
    let pivot = Point3::new(1, 64, 0);

    harness.coordinator.rotate(id, Rotation::CLOCKWISE, pivot).unwrap();
    harness.ticks(1);
    let turned = harness.world.get().block_at(Point3::new(0, 64, 1));
    assert_eq!(turned.block_type, BlockType::STAIRS);
    assert_eq!(turned.side(), Some(BlockSide::EAST));

    for _ in 0..3 {
        harness.coordinator.rotate(id, Rotation::CLOCKWISE, pivot).unwrap();
        harness.ticks(1);
    }
    assert_eq!(harness.world.get().block_at(Point3::new(2, 64, 1)), stairs);
}

#[test]
fn ramming_tnt_explodes_and_leaves_the_craft_in_place() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 3, planks());
        world.set_block(Point3::new(3, 64, 0), Block::new(BlockType::TNT));
    });
    let ram = Arc::new(CraftType {
        collision_explosion: 2.0,
        ..(*skiff()).clone()
    });
    let id = harness.pilot(Point3::new(0, 64, 0), ram, 1);
    let before = harness.sorted_blocks(id);

    harness.coordinator.translate(id, Vector3::new(1, 0, 0)).unwrap();
    harness.ticks(1);

    assert_eq!(
        harness.world.get().explosions,
        vec![(Point3::new(3, 64, 0), 2.0)]
    );
    assert!(harness.coordinator.craft(id).unwrap().is_idle());
    assert!(harness.coordinator.is_idle());
    assert_eq!(harness.sorted_blocks(id), before);
    assert_eq!(harness.block(3, 64, 0), BlockType::TNT);
    assert!(harness
        .notifier
        .messages_for(PlayerId(1))
        .iter()
        .any(|message| message.starts_with("Craft collided with TNT")));
}

#[test]
fn colliding_batches_are_all_or_nothing() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 3, planks());
        row(world, (0, 64, 2), 3, planks());
    });
    let a = harness.pilot(Point3::new(0, 64, 0), skiff(), 1);
    let b = harness.pilot(Point3::new(0, 64, 2), skiff(), 2);
    let a_before = harness.sorted_blocks(a);
    let b_before = harness.sorted_blocks(b);

    // Both tasks see z = 1 as free; only the first write may claim it.
    harness.coordinator.translate(a, Vector3::new(0, 0, 1)).unwrap();
    harness.coordinator.translate(b, Vector3::new(0, 0, -1)).unwrap();
    harness.ticks(1);

    let a_moved = harness.sorted_blocks(a) != a_before;
    let b_moved = harness.sorted_blocks(b) != b_before;
    assert!(a_moved ^ b_moved);
    assert!(harness.coordinator.is_idle());

    let loser_blocks = if a_moved { b_before } else { a_before };
    for (x, y, z) in loser_blocks {
        assert_eq!(harness.block(x, y, z), BlockType::PLANKS);
    }
    for x in 0..3 {
        assert_eq!(harness.block(x, 64, 1), BlockType::PLANKS);
    }
}

#[test]
fn oversize_detection_changes_nothing() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 6, planks())
    });
    let small = Arc::new(CraftType {
        max_size: 3,
        ..(*skiff()).clone()
    });
    harness
        .coordinator
        .detect(WORLD, Point3::new(0, 64, 0), small, Some(PlayerId(1)), None)
        .unwrap();
    harness.ticks(1);

    assert!(harness.coordinator.registry().is_empty());
    assert_eq!(
        harness.notifier.messages_for(PlayerId(1)),
        vec!["Detection - Craft too large - Max size 3".to_string()]
    );
    for x in 0..6 {
        assert_eq!(harness.block(x, 64, 0), BlockType::PLANKS);
    }
}

#[test]
fn overlapping_detection_is_already_controlled() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 4, planks())
    });
    let seed = Point3::new(0, 64, 0);
    let first = harness
        .coordinator
        .detect(WORLD, seed, skiff(), Some(PlayerId(1)), None)
        .unwrap();
    harness
        .coordinator
        .detect(WORLD, Point3::new(3, 64, 0), skiff(), Some(PlayerId(2)), None)
        .unwrap();
    harness.ticks(1);

    assert_eq!(harness.coordinator.registry().len(), 1);
    assert!(harness.coordinator.craft(first).is_some());
    assert_eq!(
        harness.notifier.messages_for(PlayerId(2)),
        vec!["Detection - Failed Craft is already being controlled".to_string()]
    );
    assert!(harness
        .coordinator
        .registry()
        .craft_by_controller(PlayerId(2))
        .is_none());
}

#[test]
fn cruise_moves_once_per_cooldown() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 5, planks())
    });
    let id = harness.pilot(Point3::new(0, 64, 0), skiff(), 1);
    harness
        .coordinator
        .set_cruising(id, Some(Vector3::new(1, 0, 0)))
        .unwrap();

    harness.ticks(1);
    assert_eq!(harness.coordinator.craft(id).unwrap().bounds().min.x, 0);
    harness.ticks(1);
    let craft = harness.coordinator.craft(id).unwrap();
    assert_eq!(craft.bounds().min.x, 1);
    assert!(craft.is_idle());

    harness.ticks(1);
    assert_eq!(harness.coordinator.craft(id).unwrap().bounds().min.x, 1);
    harness.ticks(1);
    assert_eq!(harness.coordinator.craft(id).unwrap().bounds().min.x, 2);

    harness.coordinator.set_cruising(id, None).unwrap();
    harness.ticks(6);
    assert_eq!(harness.coordinator.craft(id).unwrap().bounds().min.x, 2);
}

fn sink_settings() -> Settings {
    Settings {
        sink_check_ticks: 1,
        sink_rate_ticks: 1,
        ..Default::default()
    }
}

fn replace_wool(harness: &Harness, xs: std::ops::Range<i32>, y: i32) {
    let mut world = harness.world.get_mut();
    for x in xs {
        world.set_block(Point3::new(x, y, 0), planks());
    }
}

#[test]
fn damaged_balloon_floats_until_it_drops_below_half() {
    let mut harness = Harness::new(sink_settings(), |world| {
        row(world, (0, 70, 0), 10, Block::new(BlockType::WOOL))
    });
    let id = harness.pilot(Point3::new(0, 70, 0), balloon(), 1);

    replace_wool(&harness, 0..2, 70);
    harness.ticks(5);
    let craft = harness.coordinator.craft(id).unwrap();
    assert!(!craft.sinking);
    assert_eq!(craft.bounds().min.y, 70);

    replace_wool(&harness, 2..6, 70);
    harness.ticks(3);
    let craft = harness.coordinator.craft(id).unwrap();
    assert!(craft.sinking);
    assert!(craft.bounds().min.y < 70);
    assert_eq!(harness.coordinator.registry().controller_of(id), None);
    assert_eq!(
        harness.notifier.messages_for(PlayerId(1)).last(),
        Some(&"Player- Craft is sinking".to_string())
    );
}

#[test]
fn sinking_hull_landing_on_tnt_still_explodes() {
    let mut harness = Harness::new(sink_settings(), |world| {
        row(world, (0, 70, 0), 10, Block::new(BlockType::WOOL));
        row(world, (0, 68, 0), 10, Block::new(BlockType::TNT));
    });
    let bomb = Arc::new(CraftType {
        collision_explosion: 4.0,
        ..(*balloon()).clone()
    });
    let id = harness.pilot(Point3::new(0, 70, 0), bomb, 1);
    replace_wool(&harness, 0..6, 70);

    harness.ticks(8);
    assert!(harness.coordinator.craft(id).is_none());
    let explosions = harness.world.get().explosions.clone();
    assert_eq!(explosions.len(), 1);
    assert_eq!(explosions[0].0.y, 68);
    assert_eq!(explosions[0].1, 4.0);
    assert!(harness.coordinator.is_idle());
    assert!(!harness
        .notifier
        .messages_for(PlayerId(1))
        .iter()
        .any(|message| message.starts_with("Craft collided")));
}

struct NoSinkingHere;

impl RegionPolicy for NoSinkingHere {
    fn check_sink(&self, _world: WorldId, _pos: BlockPos) -> Option<PolicyDenial> {
        Some(PolicyDenial::PvpRegion)
    }
}

#[test]
fn sink_denied_by_policy_releases_the_hull() {
    let mut harness = Harness::with_policy(sink_settings(), Some(Arc::new(NoSinkingHere)), |world| {
        row(world, (0, 70, 0), 10, Block::new(BlockType::WOOL))
    });
    let id = harness.pilot(Point3::new(0, 70, 0), balloon(), 1);
    replace_wool(&harness, 0..6, 70);

    harness.ticks(3);
    assert!(harness.coordinator.craft(id).is_none());
    assert!(harness.coordinator.registry().is_empty());
    assert_eq!(
        harness.notifier.messages_for(PlayerId(1)).last(),
        Some(&"Player- Craft should sink but PVP is not allowed in this region".to_string())
    );
    for x in 0..10 {
        assert_ne!(harness.block(x, 70, 0), BlockType::AIR);
    }
    assert!(harness.coordinator.pass_state().fades.is_empty());
}

#[test]
fn cruise_on_pilot_craft_fly_off_by_themselves() {
    let mut harness = Harness::new(Settings::default(), |world| {
        row(world, (0, 64, 0), 3, planks())
    });
    let drone = Arc::new(CraftType {
        cruise_on_pilot: true,
        cruise_on_pilot_vert_move: 1,
        ..(*skiff()).clone()
    });
    let id = harness
        .coordinator
        .detect_heading(
            WORLD,
            Point3::new(0, 64, 0),
            drone,
            Some(PlayerId(1)),
            None,
            Vector3::new(5, 0, 0),
        )
        .unwrap();
    harness.ticks(1);

    let craft = harness.coordinator.craft(id).unwrap();
    assert!(craft.cruising);
    assert_eq!(craft.cruise_direction, Vector3::new(1, 0, 0));
    assert_eq!(harness.coordinator.registry().controller_of(id), None);

    // Cooldown 2: moves on ticks 3, 5, 7, 9 and 11.
    harness.ticks(10);
    assert_eq!(
        harness.coordinator.craft(id).unwrap().bounds().min,
        Point3::new(5, 69, 0)
    );
    assert_eq!(harness.block(0, 64, 0), BlockType::AIR);
}

#[test]
fn wreck_on_the_seabed_fades_to_water() {
    let settings = Settings {
        fade_wrecks_after_ticks: 5,
        fade_check_ticks: 1,
        ..sink_settings()
    };
    let mut harness = Harness::new(settings, |world| {
        row(world, (0, 3, 0), 10, Block::new(BlockType::WOOL));
        row(world, (0, 1, 0), 10, Block::new(BlockType::STONE));
    });
    let id = harness.pilot(Point3::new(0, 3, 0), balloon(), 1);
    replace_wool(&harness, 0..6, 3);

    // Sinks one block, then hits the stone and is retired.
    harness.ticks(4);
    assert!(harness.coordinator.craft(id).is_none());
    assert_eq!(harness.block(0, 2, 0), BlockType::PLANKS);
    assert_eq!(harness.coordinator.pass_state().fades.len(), 10);

    harness.ticks(10);
    assert!(harness.coordinator.pass_state().fades.is_empty());
    for x in 0..10 {
        assert_eq!(harness.block(x, 2, 0), BlockType::STATIONARY_WATER);
    }
    assert_eq!(harness.block(0, 1, 0), BlockType::STONE);
}

#[test]
fn pilots_hear_about_each_other() {
    let settings = Settings {
        contact_check_ticks: 1,
        ..Default::default()
    };
    let spotted = Arc::new(CraftType {
        detection_multiplier: 20.0,
        ..(*skiff()).clone()
    });
    let mut harness = Harness::new(settings, |world| {
        row(world, (0, 80, 0), 4, planks());
        row(world, (0, 80, 10), 4, planks());
    });
    harness.pilot(Point3::new(0, 80, 0), spotted.clone(), 1);
    harness.pilot(Point3::new(0, 80, 10), spotted, 2);
    harness.ticks(3);

    assert_eq!(
        harness.notifier.messages_for(PlayerId(1)).last(),
        Some(&"New contact: Skiff commanded by player-2, size: 4, range: 10 to the south.".to_string())
    );
    assert_eq!(
        harness.notifier.messages_for(PlayerId(2)).last(),
        Some(&"New contact: Skiff commanded by player-1, size: 4, range: 10 to the north.".to_string())
    );
}

#[test]
fn workers_compute_off_the_tick_thread() {
    let settings = Settings {
        worker_threads: 2,
        ..Default::default()
    };
    let mut harness = Harness::new(settings, |world| {
        for z in 0..4 {
            row(world, (0, 64, z), 4, planks());
        }
    });
    let id = harness
        .coordinator
        .detect(WORLD, Point3::new(0, 64, 0), skiff(), Some(PlayerId(1)), None)
        .unwrap();
    assert!(harness
        .coordinator
        .run_until_idle(200, Duration::from_millis(50)));
    assert_eq!(harness.coordinator.craft(id).unwrap().size(), 16);

    harness.coordinator.translate(id, Vector3::new(0, 2, 0)).unwrap();
    assert!(harness
        .coordinator
        .run_until_idle(200, Duration::from_millis(50)));
    assert_eq!(harness.coordinator.craft(id).unwrap().bounds().min.y, 66);
    assert_eq!(harness.block(3, 66, 3), BlockType::PLANKS);
    assert_eq!(harness.block(3, 64, 3), BlockType::AIR);
}

struct Holders;

impl RegionPolicy for Holders {
    fn region_owners(&self, _region: &str) -> Vec<String> {
        vec!["red".to_string(), "blue".to_string()]
    }
}

#[derive(Default)]
struct Bank {
    deposits: Mutex<Vec<(String, i64)>>,
}

impl Economy for Bank {
    fn deposit(&self, account: &str, amount: i64) -> Result<(), EconomyError> {
        self.deposits
            .lock()
            .unwrap()
            .push((account.to_string(), amount));
        Ok(())
    }
}

#[test]
fn sieges_pay_out_on_their_interval() {
    let settings = Settings {
        siege_payout_interval_ticks: 5,
        sieges: vec![SiegeConfig {
            name: "Harbour".to_string(),
            control_region: "harbour".to_string(),
            daily_income: 100,
        }],
        ..Default::default()
    };
    let bank = Arc::new(Bank::default());
    let mut coordinator: Coordinator<VoxelWorld> = Coordinator::new(settings)
        .with_region_policy(Arc::new(Holders))
        .with_economy(bank.clone());
    for _ in 0..11 {
        coordinator.tick();
    }
    let deposits = bank.deposits.lock().unwrap().clone();
    assert_eq!(deposits.len(), 4);
    assert_eq!(deposits[0], ("red".to_string(), 50));
    assert_eq!(deposits[1], ("blue".to_string(), 50));
}
