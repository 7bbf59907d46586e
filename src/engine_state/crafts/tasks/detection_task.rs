//! Flood-fill detection of a new craft from a seed block.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use cgmath::Vector3;

use crate::core::MtResource;
use crate::engine_state::crafts::craft_type::{CompositionTally, CraftType};
use crate::engine_state::crafts::spatial::BoundingBox;
use crate::engine_state::crafts::CraftId;
use crate::engine_state::crafts::tasks::WorldView;
use crate::engine_state::voxels::block::BlockPos;
use crate::engine_state::voxels::chunk::Chunk;
use crate::engine_state::voxels::entity::PlayerId;
use crate::engine_state::voxels::world::WorldAccess;
use crate::error::{CraftError, ValidationFailure};

/// Face neighbours visited by the flood fill.
const NEIGHBOURS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// A craft-shaped result. Not registered until the tick loop commits it.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    pub craft: CraftId,
    pub craft_type: Arc<CraftType>,
    pub blocks: Vec<BlockPos>,
    pub bounds: BoundingBox,
    pub controller: Option<PlayerId>,
}

pub struct DetectionTask<W: WorldAccess> {
    pub craft: CraftId,
    pub world: MtResource<W>,
    pub craft_type: Arc<CraftType>,
    pub seed: BlockPos,
    pub controller: Option<PlayerId>,
}

impl<W: WorldAccess> DetectionTask<W> {
    pub fn new(
        craft: CraftId,
        world: MtResource<W>,
        craft_type: Arc<CraftType>,
        seed: BlockPos,
        controller: Option<PlayerId>,
    ) -> Self {
        DetectionTask {
            craft,
            world,
            craft_type,
            seed,
            controller,
        }
    }

    pub fn compute(&self) -> Result<DetectionResult, CraftError> {
        let world = WorldView::new(&self.world);
        let craft_type = &self.craft_type;
        let (world_min, world_max) = world.height_bounds();

        let seed_block = world.block_at(self.seed);
        if !craft_type.allows(seed_block.block_type) {
            return Err(ValidationFailure::SeedNotAllowed {
                block: seed_block.block_type,
                craft_type: craft_type.name.clone(),
            }
            .into());
        }

        let mut visited: HashSet<BlockPos> = HashSet::from([self.seed]);
        let mut frontier: VecDeque<BlockPos> = VecDeque::from([self.seed]);
        let mut blocks: Vec<BlockPos> = Vec::new();

        while let Some(pos) = frontier.pop_front() {
            let chunk = Chunk::chunk_pos_of(pos);
            if !world.is_loaded(chunk) {
                return Err(ValidationFailure::UnloadedChunk { chunk }.into());
            }
            blocks.push(pos);
            if blocks.len() > craft_type.max_size {
                return Err(ValidationFailure::TooLarge {
                    max: craft_type.max_size,
                }
                .into());
            }

            for (dx, dy, dz) in NEIGHBOURS {
                let next = pos + Vector3::new(dx, dy, dz);
                if next.y < world_min || next.y >= world_max || !visited.insert(next) {
                    continue;
                }
                let block = world.block_at(next);
                if craft_type.forbids(block.block_type) {
                    return Err(ValidationFailure::ForbiddenBlock {
                        block: block.block_type,
                        position: next,
                    }
                    .into());
                }
                if craft_type.allows(block.block_type) {
                    frontier.push_back(next);
                }
            }
        }

        if blocks.len() < craft_type.min_size {
            return Err(ValidationFailure::TooSmall {
                min: craft_type.min_size,
                found: blocks.len(),
            }
            .into());
        }

        CompositionTally::tally(craft_type, blocks.iter().map(|pos| world.block_at(*pos)))
            .check_fly_blocks(craft_type)?;

        let Some(bounds) = BoundingBox::from_blocks(&blocks) else {
            return Err(ValidationFailure::TooSmall {
                min: craft_type.min_size,
                found: 0,
            }
            .into());
        };
        if let Some(limit) = craft_type.max_height_limit {
            if bounds.max.y > limit {
                return Err(ValidationFailure::HeightLimit { limit }.into());
            }
        }

        Ok(DetectionResult {
            craft: self.craft,
            craft_type: Arc::clone(&self.craft_type),
            blocks,
            bounds,
            controller: self.controller,
        })
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::engine_state::voxels::block::{block_type::BlockType, Block};
    use crate::engine_state::voxels::world::{VoxelWorld, WorldId};

    fn ship(max_size: usize) -> Arc<CraftType> {
        Arc::new(CraftType {
            name: "Ship".to_string(),
            allowed_blocks: vec![BlockType::PLANKS, BlockType::WOOL],
            forbidden_blocks: vec![BlockType::BEDROCK],
            max_size,
            ..Default::default()
        })
    }

    fn world_with_deck(len: i32) -> MtResource<VoxelWorld> {
        let mut world = VoxelWorld::new(WorldId(0));
        world.fill(
            Point3::new(0, 64, 0),
            Point3::new(len - 1, 64, 1),
            Block::new(BlockType::PLANKS),
        );
        world.set_block(Point3::new(0, 63, 0), Block::new(BlockType::STONE));
        MtResource::new(world)
    }

    #[test]
    fn flood_fill_stops_at_disallowed_blocks() {
        let world = world_with_deck(4);
        let task = DetectionTask::new(CraftId(1), world, ship(100), Point3::new(0, 64, 0), None);
        let result = task.compute().unwrap();
        assert_eq!(result.blocks.len(), 8);
        assert_eq!(result.bounds.min, Point3::new(0, 64, 0));
        assert_eq!(result.bounds.max, Point3::new(3, 64, 1));
    }

    #[test]
    fn oversized_structure_is_rejected() {
        let world = world_with_deck(10);
        let task = DetectionTask::new(CraftId(1), world, ship(5), Point3::new(0, 64, 0), None);
        assert_eq!(
            task.compute().unwrap_err(),
            CraftError::Validation(ValidationFailure::TooLarge { max: 5 })
        );
    }

    #[test]
    fn forbidden_neighbour_aborts() {
        let world = world_with_deck(3);
        world
            .get_mut()
            .set_block(Point3::new(1, 65, 0), Block::new(BlockType::BEDROCK));
        let task = DetectionTask::new(CraftId(1), world, ship(100), Point3::new(0, 64, 0), None);
        assert!(matches!(
            task.compute(),
            Err(CraftError::Validation(ValidationFailure::ForbiddenBlock { .. }))
        ));
    }

    #[test]
    fn seed_must_be_allowed() {
        let world = world_with_deck(3);
        let task = DetectionTask::new(CraftId(1), world, ship(100), Point3::new(0, 63, 0), None);
        assert!(matches!(
            task.compute(),
            Err(CraftError::Validation(ValidationFailure::SeedNotAllowed { .. }))
        ));
    }
}
