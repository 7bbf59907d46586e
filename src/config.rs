//! # Configuration
//!
//! Global settings and craft-type definitions are plain JSON documents. Every
//! field has a default, so an empty object is a valid settings file. Both are
//! read once at startup and shared immutably afterwards.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine_state::crafts::craft_type::CraftType;
use crate::engine_state::voxels::block::BlockPos;
use crate::error::ConfigError;

/// A siege whose control region pays its owners a daily income.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiegeConfig {
    pub name: String,
    /// Identifier handed to the region policy to look up the owners.
    pub control_region: String,
    pub daily_income: i64,
}

/// Engine-wide tick intervals and limits. All durations are in ticks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sink_check_ticks: u64,
    /// Descent interval for craft types that do not set their own.
    pub sink_rate_ticks: u64,
    /// Sinking craft still registered after this long are released.
    pub sinking_release_ticks: u64,
    pub tracer_rate_ticks: u64,
    pub tracer_view_distance_chunks: i32,
    pub fireball_check_ticks: u64,
    pub fireball_lifespan_ticks: u64,
    pub tnt_check_ticks: u64,
    pub tnt_contact_explosives: bool,
    pub fade_check_ticks: u64,
    /// Zero disables wreck fading.
    pub fade_wrecks_after_ticks: u64,
    pub contact_check_ticks: u64,
    pub contact_cooldown_ticks: u64,
    /// At or below this height the underwater detection multiplier applies.
    pub surface_detection_height: i32,
    pub completion_batch_size: usize,
    /// Zero runs every structural task inline on the tick thread.
    pub worker_threads: usize,
    pub siege_payout_interval_ticks: u64,
    pub sieges: Vec<SiegeConfig>,
    /// Where the demo driver builds its hull.
    pub demo_origin: [i32; 3],
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sink_check_ticks: 100,
            sink_rate_ticks: 20,
            sinking_release_ticks: 12_000,
            tracer_rate_ticks: 5,
            tracer_view_distance_chunks: 4,
            fireball_check_ticks: 4,
            fireball_lifespan_ticks: 120,
            tnt_check_ticks: 4,
            tnt_contact_explosives: true,
            fade_check_ticks: 20,
            fade_wrecks_after_ticks: 0,
            contact_check_ticks: 21,
            contact_cooldown_ticks: 1_200,
            surface_detection_height: 65,
            completion_batch_size: 10,
            worker_threads: 0,
            siege_payout_interval_ticks: 24_000,
            sieges: Vec::new(),
            demo_origin: [0, 80, 0],
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read_file(path.as_ref())?)
    }

    pub fn demo_origin(&self) -> BlockPos {
        cgmath::Point3::new(self.demo_origin[0], self.demo_origin[1], self.demo_origin[2])
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.completion_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "completion_batch_size must be at least 1".to_string(),
            ));
        }
        if self.sink_rate_ticks == 0 {
            return Err(ConfigError::Invalid(
                "sink_rate_ticks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CraftTypeDocument {
    Many(Vec<CraftType>),
    One(Box<CraftType>),
}

/// Parses one craft type object or an array of them.
pub fn craft_types_from_json_str(json: &str) -> Result<Vec<Arc<CraftType>>, ConfigError> {
    let types = match serde_json::from_str::<CraftTypeDocument>(json)? {
        CraftTypeDocument::Many(types) => types,
        CraftTypeDocument::One(craft_type) => vec![*craft_type],
    };
    for craft_type in &types {
        if craft_type.name.is_empty() {
            return Err(ConfigError::Invalid("craft type without a name".to_string()));
        }
        if craft_type.max_size < craft_type.min_size {
            return Err(ConfigError::Invalid(format!(
                "craft type {} has max_size below min_size",
                craft_type.name
            )));
        }
    }
    Ok(types.into_iter().map(Arc::new).collect())
}

pub fn load_craft_types(path: impl AsRef<Path>) -> Result<Vec<Arc<CraftType>>, ConfigError> {
    craft_types_from_json_str(&read_file(path.as_ref())?)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
