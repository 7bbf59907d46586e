//! # Spatial Utilities
//!
//! Axis-aligned bounds, the per-column hitbox, block-set overlap tests and the
//! quarter-turn math shared by rotation tasks and entity relocation.

use std::collections::{HashMap, HashSet};

use cgmath::Point3;

use crate::engine_state::voxels::block::{block_side::Rotation, BlockPos};

/// Tight axis-aligned box around a set of blocks. Both corners are inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl BoundingBox {
    /// Returns `None` for an empty block set.
    pub fn from_blocks(blocks: &[BlockPos]) -> Option<Self> {
        let first = *blocks.first()?;
        let mut bounds = BoundingBox {
            min: first,
            max: first,
        };
        for block in &blocks[1..] {
            bounds.min.x = bounds.min.x.min(block.x);
            bounds.min.y = bounds.min.y.min(block.y);
            bounds.min.z = bounds.min.z.min(block.z);
            bounds.max.x = bounds.max.x.max(block.x);
            bounds.max.y = bounds.max.y.max(block.y);
            bounds.max.z = bounds.max.z.max(block.z);
        }
        Some(bounds)
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Integer midpoint, rounded toward negative infinity.
    pub fn center(&self) -> BlockPos {
        Point3::new(
            self.min.x + ((self.max.x - self.min.x) >> 1),
            self.min.y + ((self.max.y - self.min.y) >> 1),
            self.min.z + ((self.max.z - self.min.z) >> 1),
        )
    }

    /// Entity-space corners of the box, grown by `margin` blocks on every side
    /// and two blocks upward so that anyone standing on the top deck is included.
    pub fn entity_bounds(&self, margin: f64) -> (Point3<f64>, Point3<f64>) {
        (
            Point3::new(
                self.min.x as f64 - margin,
                self.min.y as f64 - margin,
                self.min.z as f64 - margin,
            ),
            Point3::new(
                self.max.x as f64 + 1.0 + margin,
                self.max.y as f64 + 2.0 + margin,
                self.max.z as f64 + 1.0 + margin,
            ),
        )
    }
}

/// Per-column vertical extent of a craft.
///
/// Keyed by the (x, z) offset of the column from the minimum x/z corner, each
/// entry holds the lowest and highest occupied y in that column.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HitBox {
    pub min_x: i32,
    pub min_z: i32,
    pub columns: HashMap<(i32, i32), (i32, i32)>,
}

impl HitBox {
    pub fn from_blocks(blocks: &[BlockPos]) -> Self {
        let min_x = blocks.iter().map(|b| b.x).min().unwrap_or(0);
        let min_z = blocks.iter().map(|b| b.z).min().unwrap_or(0);
        let mut columns: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
        for block in blocks {
            columns
                .entry((block.x - min_x, block.z - min_z))
                .and_modify(|(low, high)| {
                    *low = (*low).min(block.y);
                    *high = (*high).max(block.y);
                })
                .or_insert((block.y, block.y));
        }
        HitBox {
            min_x,
            min_z,
            columns,
        }
    }

    /// Vertical extent of the column at absolute `x`, `z`.
    pub fn column(&self, x: i32, z: i32) -> Option<(i32, i32)> {
        self.columns
            .get(&(x - self.min_x, z - self.min_z))
            .copied()
    }

    /// Whether an entity at `location` is standing within the craft's
    /// footprint: over an occupied column, no lower than its bottom and at most
    /// two blocks above its top.
    pub fn contains_location(&self, location: Point3<f64>) -> bool {
        let x = location.x.floor() as i32;
        let z = location.z.floor() as i32;
        match self.column(x, z) {
            Some((low, high)) => location.y >= low as f64 && location.y <= high as f64 + 2.0,
            None => false,
        }
    }
}

/// True when the two block lists share at least one position.
pub fn blocks_overlap(a: &[BlockPos], b: &[BlockPos]) -> bool {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let lookup: HashSet<&BlockPos> = small.iter().collect();
    large.iter().any(|block| lookup.contains(block))
}

/// `a` without the positions in `b`, keeping `a`'s order.
pub fn subtract(a: &[BlockPos], b: &[BlockPos]) -> Vec<BlockPos> {
    let removed: HashSet<&BlockPos> = b.iter().collect();
    a.iter().filter(|block| !removed.contains(block)).copied().collect()
}

/// Rotates a block position about `pivot` by a quarter turn.
///
/// Clockwise (seen from above) maps an offset (dx, dz) to (-dz, dx).
pub fn rotate_point(point: BlockPos, pivot: BlockPos, rotation: Rotation) -> BlockPos {
    let dx = point.x - pivot.x;
    let dz = point.z - pivot.z;
    let (rx, rz) = match rotation {
        Rotation::NONE => (dx, dz),
        Rotation::CLOCKWISE => (-dz, dx),
        Rotation::ANTICLOCKWISE => (dz, -dx),
    };
    Point3::new(pivot.x + rx, point.y, pivot.z + rz)
}

/// Rotates an entity location about the centre of the `pivot` block.
pub fn rotate_location(location: Point3<f64>, pivot: BlockPos, rotation: Rotation) -> Point3<f64> {
    let cx = pivot.x as f64 + 0.5;
    let cz = pivot.z as f64 + 0.5;
    let dx = location.x - cx;
    let dz = location.z - cz;
    let (rx, rz) = match rotation {
        Rotation::NONE => (dx, dz),
        Rotation::CLOCKWISE => (-dz, dx),
        Rotation::ANTICLOCKWISE => (dz, -dx),
    };
    Point3::new(cx + rx, location.y, cz + rz)
}
