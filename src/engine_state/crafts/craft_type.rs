//! # Craft Types
//!
//! A craft type is the immutable rule book shared by every craft built to it:
//! which blocks it may contain, how big it may be, how fast it moves and when it
//! starts to sink. Types are deserialised from JSON and handed around as
//! `Arc<CraftType>`.
//!
//! The same composition tally serves two masters. Detection and movement
//! reject a craft whose fly-block share is outside `[min_percent, max_percent]`,
//! and the sink check compares the share found in the live world against the
//! scaled-down sink threshold.

use serde::{Deserialize, Serialize};

use crate::engine_state::voxels::block::{block_type::BlockType, Block};
use crate::error::ValidationFailure;

/// Required share of a group of blocks, as a percentage of all non-air blocks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyBlockRule {
    pub blocks: Vec<BlockType>,
    pub min_percent: f64,
    pub max_percent: f64,
}

impl Default for FlyBlockRule {
    fn default() -> Self {
        FlyBlockRule {
            blocks: Vec::new(),
            min_percent: 0.0,
            max_percent: 100.0,
        }
    }
}

impl FlyBlockRule {
    pub fn matches(&self, block_type: BlockType) -> bool {
        self.blocks.contains(&block_type)
    }

    /// Human readable block group, for messages.
    pub fn describe(&self) -> String {
        self.blocks
            .iter()
            .map(|block| format!("{:?}", block))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The share below which a craft of this type sinks.
    pub fn sink_threshold(&self, sink_percent: f64) -> f64 {
        self.min_percent * sink_percent / 100.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftType {
    pub name: String,
    pub allowed_blocks: Vec<BlockType>,
    pub forbidden_blocks: Vec<BlockType>,
    pub min_size: usize,
    pub max_size: usize,
    pub min_height_limit: Option<i32>,
    pub max_height_limit: Option<i32>,
    /// Minimum ticks between two manual or keep-moving translations.
    pub tick_cooldown: u64,
    /// Defaults to `tick_cooldown`.
    pub cruise_tick_cooldown: Option<u64>,
    pub cruise_skip_blocks: i32,
    pub vert_cruise_skip_blocks: i32,
    pub half_speed_underwater: bool,
    /// Cruises from the moment it is piloted and has no controller.
    pub cruise_on_pilot: bool,
    pub cruise_on_pilot_vert_move: i32,
    pub keep_moving_on_sink: bool,
    /// Defaults to the global setting.
    pub sink_rate_ticks: Option<u64>,
    pub fly_blocks: Vec<FlyBlockRule>,
    /// Zero means the type never sinks.
    pub sink_percent: f64,
    pub overall_sink_percent: f64,
    pub detection_multiplier: f64,
    pub underwater_detection_multiplier: f64,
    /// Power of the explosion produced when ramming an explosive block.
    pub collision_explosion: f32,
    /// Blocks that puff smoke at their new position whenever the craft moves.
    pub smoke_blocks: Vec<BlockType>,
}

impl Default for CraftType {
    fn default() -> Self {
        CraftType {
            name: String::new(),
            allowed_blocks: Vec::new(),
            forbidden_blocks: Vec::new(),
            min_size: 1,
            max_size: 10_000,
            min_height_limit: None,
            max_height_limit: None,
            tick_cooldown: 10,
            cruise_tick_cooldown: None,
            cruise_skip_blocks: 0,
            vert_cruise_skip_blocks: 0,
            half_speed_underwater: false,
            cruise_on_pilot: false,
            cruise_on_pilot_vert_move: 0,
            keep_moving_on_sink: false,
            sink_rate_ticks: None,
            fly_blocks: Vec::new(),
            sink_percent: 0.0,
            overall_sink_percent: 0.0,
            detection_multiplier: 0.0,
            underwater_detection_multiplier: 0.0,
            collision_explosion: 0.0,
            smoke_blocks: Vec::new(),
        }
    }
}

impl CraftType {
    pub fn allows(&self, block_type: BlockType) -> bool {
        self.allowed_blocks.contains(&block_type)
    }

    pub fn forbids(&self, block_type: BlockType) -> bool {
        self.forbidden_blocks.contains(&block_type)
    }

    pub fn cruise_cooldown(&self) -> u64 {
        self.cruise_tick_cooldown.unwrap_or(self.tick_cooldown)
    }

    pub fn sinks(&self) -> bool {
        self.sink_percent != 0.0
    }

    pub fn emits_smoke(&self, block_type: BlockType) -> bool {
        self.smoke_blocks.contains(&block_type)
    }

    /// Whether two types are the same rule book.
    pub fn same_type(&self, other: &CraftType) -> bool {
        self.name == other.name
    }
}

/// Block counts of a craft measured against its type's fly-block rules.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositionTally {
    /// One count per entry in `CraftType::fly_blocks`, in the same order.
    pub rule_counts: Vec<usize>,
    pub total_non_air: usize,
    /// Non-air blocks that are not water.
    pub total_hull: usize,
}

impl CompositionTally {
    pub fn tally<I>(craft_type: &CraftType, blocks: I) -> Self
    where
        I: IntoIterator<Item = Block>,
    {
        let mut tally = CompositionTally {
            rule_counts: vec![0; craft_type.fly_blocks.len()],
            ..Default::default()
        };
        for block in blocks {
            if block.is_air() {
                continue;
            }
            tally.total_non_air += 1;
            if !block.block_type.is_water() {
                tally.total_hull += 1;
            }
            for (count, rule) in tally.rule_counts.iter_mut().zip(&craft_type.fly_blocks) {
                if rule.matches(block.block_type) {
                    *count += 1;
                }
            }
        }
        tally
    }

    /// Share of rule `index` among all non-air blocks, in percent.
    pub fn percent(&self, index: usize) -> f64 {
        if self.total_non_air == 0 {
            return 0.0;
        }
        self.rule_counts.get(index).copied().unwrap_or(0) as f64 / self.total_non_air as f64
            * 100.0
    }

    /// Movement and detection legality of the fly-block shares.
    pub fn check_fly_blocks(&self, craft_type: &CraftType) -> Result<(), ValidationFailure> {
        for (index, rule) in craft_type.fly_blocks.iter().enumerate() {
            let found = self.percent(index);
            if found < rule.min_percent {
                return Err(ValidationFailure::FlyBlockShortfall {
                    blocks: rule.describe(),
                    found,
                    required: rule.min_percent,
                });
            }
            if found > rule.max_percent {
                return Err(ValidationFailure::FlyBlockExcess {
                    blocks: rule.describe(),
                    found,
                    allowed: rule.max_percent,
                });
            }
        }
        Ok(())
    }

    /// Whether a craft with this composition has lost enough to sink.
    ///
    /// `orig_block_count` is the craft's block count at detection time.
    pub fn should_sink(&self, craft_type: &CraftType, orig_block_count: usize) -> bool {
        if self.total_non_air == 0 {
            return true;
        }
        for (index, rule) in craft_type.fly_blocks.iter().enumerate() {
            if self.percent(index) < rule.sink_threshold(craft_type.sink_percent) {
                return true;
            }
        }
        if craft_type.overall_sink_percent != 0.0 && orig_block_count > 0 {
            let remaining = self.total_hull as f64 / orig_block_count as f64 * 100.0;
            if remaining < craft_type.overall_sink_percent {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airship() -> CraftType {
        CraftType {
            name: "Airship".to_string(),
            allowed_blocks: vec![BlockType::PLANKS, BlockType::WOOL],
            fly_blocks: vec![FlyBlockRule {
                blocks: vec![BlockType::WOOL],
                min_percent: 100.0,
                max_percent: 100.0,
            }],
            sink_percent: 50.0,
            ..Default::default()
        }
    }

    fn hull(wool: usize, planks: usize) -> Vec<Block> {
        let mut blocks = vec![Block::new(BlockType::WOOL); wool];
        blocks.extend(vec![Block::new(BlockType::PLANKS); planks]);
        blocks
    }

    #[test]
    fn eighty_percent_against_a_fifty_percent_threshold_floats() {
        let craft_type = airship();
        let tally = CompositionTally::tally(&craft_type, hull(8, 2));
        assert!((tally.percent(0) - 80.0).abs() < 1e-9);
        assert!(!tally.should_sink(&craft_type, 10));
    }

    #[test]
    fn forty_percent_sinks() {
        let craft_type = airship();
        let tally = CompositionTally::tally(&craft_type, hull(4, 6));
        assert!(tally.should_sink(&craft_type, 10));
    }

    #[test]
    fn empty_craft_sinks() {
        let craft_type = airship();
        let tally = CompositionTally::tally(&craft_type, vec![Block::AIR; 4]);
        assert!(tally.should_sink(&craft_type, 4));
    }

    #[test]
    fn overall_ratio_ignores_water() {
        let craft_type = CraftType {
            overall_sink_percent: 60.0,
            sink_percent: 50.0,
            ..Default::default()
        };
        let mut blocks = hull(0, 5);
        blocks.extend(vec![Block::new(BlockType::WATER); 5]);
        let tally = CompositionTally::tally(&craft_type, blocks);
        assert_eq!(tally.total_non_air, 10);
        assert_eq!(tally.total_hull, 5);
        assert!(tally.should_sink(&craft_type, 10));
        assert!(!tally.should_sink(&craft_type, 8));
    }

    #[test]
    fn fly_block_limits_are_enforced_both_ways() {
        let craft_type = airship();
        let short = CompositionTally::tally(&craft_type, hull(9, 1));
        assert!(matches!(
            short.check_fly_blocks(&craft_type),
            Err(ValidationFailure::FlyBlockShortfall { .. })
        ));
        let full = CompositionTally::tally(&craft_type, hull(10, 0));
        assert!(full.check_fly_blocks(&craft_type).is_ok());

        let capped = CraftType {
            fly_blocks: vec![FlyBlockRule {
                blocks: vec![BlockType::WOOL],
                min_percent: 0.0,
                max_percent: 50.0,
            }],
            ..airship()
        };
        let heavy = CompositionTally::tally(&capped, hull(6, 4));
        assert!(matches!(
            heavy.check_fly_blocks(&capped),
            Err(ValidationFailure::FlyBlockExcess { .. })
        ));
    }

    #[test]
    fn cruise_cooldown_falls_back_to_tick_cooldown() {
        let mut craft_type = airship();
        craft_type.tick_cooldown = 4;
        assert_eq!(craft_type.cruise_cooldown(), 4);
        craft_type.cruise_tick_cooldown = Some(2);
        assert_eq!(craft_type.cruise_cooldown(), 2);
    }
}
