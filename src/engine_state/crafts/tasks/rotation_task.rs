//! Turns a craft a quarter turn about a pivot block.

use std::sync::Arc;

use cgmath::{Point3, Vector3};

use super::{plan_movement, MovementFailure, MovementPlan, MovementResult};
use crate::core::MtResource;
use crate::engine_state::crafts::spatial::{rotate_location, rotate_point};
use crate::engine_state::crafts::CraftSnapshot;
use crate::engine_state::integration::RegionPolicy;
use crate::engine_state::voxels::block::{block_side::Rotation, BlockPos};
use crate::engine_state::voxels::world::WorldAccess;

pub struct RotationTask<W: WorldAccess> {
    pub snapshot: CraftSnapshot,
    pub world: MtResource<W>,
    pub rotation: Rotation,
    pub pivot: BlockPos,
    pub policy: Option<Arc<dyn RegionPolicy>>,
}

impl<W: WorldAccess> RotationTask<W> {
    pub fn new(
        snapshot: CraftSnapshot,
        world: MtResource<W>,
        rotation: Rotation,
        pivot: BlockPos,
        policy: Option<Arc<dyn RegionPolicy>>,
    ) -> Self {
        RotationTask {
            snapshot,
            world,
            rotation,
            pivot,
            policy,
        }
    }

    pub fn compute(&self) -> Result<MovementResult, MovementFailure> {
        let pivot = self.pivot;
        let rotation = self.rotation;
        plan_movement(
            &self.world,
            MovementPlan {
                snapshot: &self.snapshot,
                policy: self.policy.as_ref(),
                map_block: |pos: BlockPos| rotate_point(pos, pivot, rotation),
                map_location: |location: Point3<f64>| rotate_location(location, pivot, rotation),
                rotation,
                delta: Vector3::new(0, 0, 0),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::crafts::craft_type::CraftType;
    use crate::engine_state::crafts::spatial::BoundingBox;
    use crate::engine_state::crafts::CraftId;
    use crate::engine_state::voxels::block::{block_side::BlockSide, block_type::BlockType, Block};
    use crate::engine_state::voxels::world::{VoxelWorld, WorldId};
    use crate::error::CraftError;

    fn setup(extra: Option<(BlockPos, Block)>) -> (CraftSnapshot, MtResource<VoxelWorld>) {
        let blocks: Vec<BlockPos> = vec![
            Point3::new(0, 64, 0),
            Point3::new(1, 64, 0),
            Point3::new(2, 64, 0),
        ];
        let mut world = VoxelWorld::new(WorldId(0));
        world.set_block(blocks[0], Block::new(BlockType::PLANKS));
        world.set_block(blocks[1], Block::new(BlockType::PLANKS));
        world.set_block(blocks[2], Block::facing(BlockType::STAIRS, BlockSide::NORTH));
        if let Some((pos, block)) = extra {
            world.set_block(pos, block);
        }
        let snapshot = CraftSnapshot {
            id: CraftId(4),
            world: WorldId(0),
            craft_type: Arc::new(CraftType::default()),
            bounds: BoundingBox::from_blocks(&blocks).unwrap(),
            block_list: blocks,
            orig_block_count: 3,
            sinking: false,
            controller: None,
        };
        (snapshot, MtResource::new(world))
    }

    #[test]
    fn clockwise_turn_maps_east_arm_to_south() {
        let (snapshot, world) = setup(None);
        let task = RotationTask::new(
            snapshot,
            world,
            Rotation::CLOCKWISE,
            Point3::new(0, 64, 0),
            None,
        );
        let result = task.compute().unwrap();
        assert_eq!(
            result.new_blocks,
            vec![Point3::new(0, 64, 0), Point3::new(0, 64, 1), Point3::new(0, 64, 2)]
        );
        let stairs = result.updates.blocks[2];
        assert_eq!(stairs.rotation, Rotation::CLOCKWISE);
        assert_eq!(
            stairs.block.map(|block| block.rotated(stairs.rotation).side()),
            Some(Some(BlockSide::EAST))
        );
    }

    #[test]
    fn obstructed_turn_fails() {
        let (snapshot, world) = setup(Some((Point3::new(0, 64, 2), Block::new(BlockType::STONE))));
        let task = RotationTask::new(
            snapshot,
            world,
            Rotation::CLOCKWISE,
            Point3::new(0, 64, 0),
            None,
        );
        assert_eq!(
            task.compute().unwrap_err().error,
            CraftError::Obstruction {
                position: Point3::new(0, 64, 2),
                block: BlockType::STONE,
            }
        );
    }
}
