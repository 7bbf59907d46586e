#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Craft Engine
//!
//! A tick-driven scheduler for movable voxel structures ("craft").
//!
//! Craft are detected by flood fill, then moved and rotated by structural
//! tasks computed off the tick thread. Their results are applied to the world
//! through a collision-checked update queue, whole or not at all. Between
//! commands the coordinator keeps cruising craft moving, sinks craft that lost
//! too much of their hull and notifies pilots of nearby contacts.
//!
//! ## Key Modules
//!
//! * `config` - Settings and craft-type documents
//! * `core` - Shared-ownership primitives used across threads
//! * `engine_state` - The coordinator, the craft model and the reference world
//! * `error` - Error types for every fallible operation
//!
//! ## Usage
//!
//! ```no_run
//! fn main() {
//!     craft_engine::run();
//! }
//! ```
//!
//! `run` is a headless demo. Applications embed an
//! [`engine_state::Coordinator`] and call `tick` from their own loop.

use std::env;
use std::sync::Arc;
use std::thread;

use cgmath::{Point3, Vector3};
use log::{error, info, warn};
use web_time::{Duration, Instant};

pub mod config;
pub mod core;
pub mod engine_state;
pub mod error;

use config::Settings;
use engine_state::crafts::craft_type::CraftType;
use engine_state::crafts::CraftId;
use engine_state::voxels::block::{block_type::BlockType, Block};
use engine_state::voxels::entity::{EntityKind, PlayerId};
use engine_state::voxels::world::{VoxelWorld, WorldAccess, WorldId};
use engine_state::Coordinator;
use error::CraftError;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "CRAFT_SETTINGS";
/// Environment variable naming the craft-type file.
pub const CRAFT_TYPES_ENV: &str = "CRAFT_TYPES";

pub const TICKS_PER_SECOND: u64 = 20;
/// How long the headless demo runs.
pub const DEMO_TICKS: u64 = 200;

const DEMO_PILOT: PlayerId = PlayerId(1);

/// Craft type used when no craft-type file is given.
pub fn demo_craft_type() -> CraftType {
    CraftType {
        name: "Skiff".to_string(),
        allowed_blocks: vec![
            BlockType::PLANKS,
            BlockType::WOOD,
            BlockType::WOOL,
            BlockType::IRON_BLOCK,
        ],
        tick_cooldown: 4,
        cruise_skip_blocks: 1,
        detection_multiplier: 10.0,
        underwater_detection_multiplier: 5.0,
        ..Default::default()
    }
}

/// Builds a world with a 5x2x3 hull at the configured origin and a pilot
/// standing on it, then starts detecting the hull.
pub fn build_demo(
    settings: Settings,
    craft_type: Arc<CraftType>,
) -> Result<(Coordinator<VoxelWorld>, CraftId), CraftError> {
    let origin = settings.demo_origin();
    let mut world = VoxelWorld::new(WorldId(0));
    for dx in 0..5 {
        for dy in 0..2 {
            for dz in 0..3 {
                let pos = origin + Vector3::new(dx, dy, dz);
                world.set_block(pos, Block::new(BlockType::get_random_hull_type()));
            }
        }
    }
    world.spawn_entity(
        EntityKind::Player(DEMO_PILOT),
        Point3::new(
            f64::from(origin.x) + 2.5,
            f64::from(origin.y) + 2.0,
            f64::from(origin.z) + 1.5,
        ),
    );

    let mut coordinator = Coordinator::new(settings);
    coordinator.add_world(world);
    let craft = coordinator.detect(WorldId(0), origin, craft_type, Some(DEMO_PILOT), None)?;
    Ok((coordinator, craft))
}

fn load_settings() -> Settings {
    match env::var(SETTINGS_ENV) {
        Ok(path) => Settings::from_path(&path).unwrap_or_else(|error| {
            warn!("Falling back to default settings: {}", error);
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

fn load_craft_type() -> Arc<CraftType> {
    let loaded = env::var(CRAFT_TYPES_ENV)
        .ok()
        .map(|path| config::load_craft_types(&path));
    match loaded {
        Some(Ok(types)) if !types.is_empty() => {
            info!("Loaded {} craft types", types.len());
            Arc::clone(&types[0])
        }
        Some(Ok(_)) => {
            warn!("Craft type file is empty, using the demo type");
            Arc::new(demo_craft_type())
        }
        Some(Err(error)) => {
            warn!("Falling back to the demo craft type: {}", error);
            Arc::new(demo_craft_type())
        }
        None => Arc::new(demo_craft_type()),
    }
}

/// Runs the headless demo: pilots a small hull and cruises it east at 20 Hz.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();
    info!("Logger initialized");

    let settings = load_settings();
    let craft_type = load_craft_type();
    let (mut coordinator, craft) = match build_demo(settings, craft_type) {
        Ok(demo) => demo,
        Err(error) => {
            error!("Could not start the demo: {}", error);
            return;
        }
    };

    let tick_interval = Duration::from_millis(1000 / TICKS_PER_SECOND);
    let mut cruising = false;
    for _ in 0..DEMO_TICKS {
        let started = Instant::now();
        coordinator.tick();

        if !cruising && coordinator.craft(craft).is_some() {
            match coordinator.set_cruising(craft, Some(Vector3::new(1, 0, 0))) {
                Ok(()) => {
                    info!("{} is cruising east", craft);
                    cruising = true;
                }
                Err(error) => warn!("Could not start cruising: {}", error),
            }
        }

        let spent = started.elapsed();
        if spent < tick_interval {
            thread::sleep(tick_interval - spent);
        }
    }

    match coordinator.craft(craft) {
        Some(craft) => info!(
            "After {} ticks {} spans {:?}..{:?}",
            coordinator.current_tick(),
            craft.id,
            craft.bounds().min,
            craft.bounds().max
        ),
        None => warn!("The demo craft was never piloted"),
    }
}
