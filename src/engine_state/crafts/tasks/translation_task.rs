//! Moves a craft by an integer offset.

use std::sync::Arc;

use cgmath::{Point3, Vector3};

use super::{plan_movement, MovementFailure, MovementPlan, MovementResult};
use crate::core::MtResource;
use crate::engine_state::crafts::CraftSnapshot;
use crate::engine_state::integration::RegionPolicy;
use crate::engine_state::voxels::block::{block_side::Rotation, BlockPos};
use crate::engine_state::voxels::world::WorldAccess;

pub struct TranslationTask<W: WorldAccess> {
    pub snapshot: CraftSnapshot,
    pub world: MtResource<W>,
    pub delta: Vector3<i32>,
    pub policy: Option<Arc<dyn RegionPolicy>>,
}

impl<W: WorldAccess> TranslationTask<W> {
    pub fn new(
        snapshot: CraftSnapshot,
        world: MtResource<W>,
        delta: Vector3<i32>,
        policy: Option<Arc<dyn RegionPolicy>>,
    ) -> Self {
        TranslationTask {
            snapshot,
            world,
            delta,
            policy,
        }
    }

    pub fn compute(&self) -> Result<MovementResult, MovementFailure> {
        let delta = self.delta;
        let offset = Vector3::new(delta.x as f64, delta.y as f64, delta.z as f64);
        plan_movement(
            &self.world,
            MovementPlan {
                snapshot: &self.snapshot,
                policy: self.policy.as_ref(),
                map_block: |pos: BlockPos| pos + delta,
                map_location: |location: Point3<f64>| location + offset,
                rotation: Rotation::NONE,
                delta,
            },
        )
    }
}
