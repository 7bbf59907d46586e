//! # World Module
//!
//! The engine never owns world storage. Everything it needs from a world goes
//! through the `WorldAccess` trait: reads from structural tasks on worker
//! threads, writes from the tick loop only.
//!
//! `VoxelWorld` is the in-memory implementation shipped with the crate. It backs
//! the demo driver and the tests.
//!
//! ## Architecture
//!
//! Chunks are kept in an LRU of resident chunks. When the LRU is full the least
//! recently touched chunk is evicted into cold storage and reported as unloaded
//! until `load_chunk` brings it back. Chunks that were never written read as
//! air and count as loaded.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use cgmath::{Point3, Vector3};
use lru::LruCache;

use super::block::{Block, BlockPos};
use super::chunk::{Chunk, ChunkPos};
use super::entity::{Entity, EntityId, EntityKind, PlayerId, Projectile, ProjectileKind};

/// Identifier of a world. Craft are registered per world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(pub u32);

/// Synchronous, authoritative access to a world.
///
/// Reads may happen from any thread holding a read guard on the world. Every
/// `&mut self` method is only ever called from the tick loop.
///
/// The entity-related methods have inert defaults so that a deployment without
/// entities only needs to provide block storage.
pub trait WorldAccess: Send + Sync + 'static {
    fn id(&self) -> WorldId;

    fn block_at(&self, pos: BlockPos) -> Block;

    fn set_block(&mut self, pos: BlockPos, block: Block);

    fn is_loaded(&self, chunk: ChunkPos) -> bool;

    fn load_chunk(&mut self, chunk: ChunkPos);

    /// Lowest buildable y (inclusive) and the build limit (exclusive).
    fn height_bounds(&self) -> (i32, i32);

    fn sea_level(&self) -> i32;

    /// Entities whose location lies inside the given box (inclusive).
    fn entities_within(&self, _min: Point3<f64>, _max: Point3<f64>) -> Vec<(EntityId, Point3<f64>)> {
        Vec::new()
    }

    fn move_entity(&mut self, _id: EntityId, _to: Point3<f64>) {}

    fn remove_entity(&mut self, _id: EntityId) {}

    fn spawn_item_drop(&mut self, _at: Point3<f64>, _block: Block) {}

    fn create_explosion(&mut self, _at: BlockPos, _power: f32) {}

    fn spawn_smoke(&mut self, _at: BlockPos) {}

    fn projectiles(&self) -> Vec<Projectile> {
        Vec::new()
    }

    fn set_fuse_ticks(&mut self, _id: EntityId, _ticks: i32) {}

    fn players(&self) -> Vec<(PlayerId, Point3<f64>)> {
        Vec::new()
    }

    fn player_location(&self, player: PlayerId) -> Option<Point3<f64>> {
        self.players()
            .into_iter()
            .find(|(id, _)| *id == player)
            .map(|(_, location)| location)
    }

    fn teleport_player(&mut self, _player: PlayerId, _to: Point3<f64>) {}

    /// Sends a block change to one player's client only.
    fn send_block_change(&mut self, _player: PlayerId, _pos: BlockPos, _block: Block) {}

    /// Client view distance, in chunks.
    fn view_distance(&self) -> i32 {
        10
    }
}

/// Default number of chunks kept resident by a `VoxelWorld`.
pub const DEFAULT_RESIDENT_CHUNKS: usize = 4096;

/// An in-memory voxel world.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use craft_engine::engine_state::voxels::{
///     block::{block_type::BlockType, Block},
///     world::{VoxelWorld, WorldAccess, WorldId},
/// };
///
/// let mut world = VoxelWorld::new(WorldId(0));
/// world.set_block(Point3::new(0, 64, 0), Block::new(BlockType::PLANKS));
/// assert_eq!(world.block_at(Point3::new(0, 64, 0)).block_type, BlockType::PLANKS);
/// ```
pub struct VoxelWorld {
    id: WorldId,
    /// Chunks currently resident, most recently touched first.
    loaded: LruCache<ChunkPos, Chunk>,
    /// Chunks evicted from residency. Reads still see them; `is_loaded` does not.
    unloaded: HashMap<ChunkPos, Chunk>,
    min_y: i32,
    max_y: i32,
    sea_level: i32,
    view_distance: i32,
    entities: HashMap<EntityId, Entity>,
    next_entity: u64,
    /// Item drops spawned by moving craft, in spawn order.
    pub item_drops: Vec<(Point3<f64>, Block)>,
    /// Explosions created through `create_explosion`, in order.
    pub explosions: Vec<(BlockPos, f32)>,
    /// Smoke effects spawned by engines.
    pub smoke: Vec<BlockPos>,
    /// Client-only block changes, in the order they were sent.
    pub block_changes: Vec<(PlayerId, BlockPos, Block)>,
}

impl VoxelWorld {
    /// Creates an empty world spanning y 0..256 with sea level at 62.
    pub fn new(id: WorldId) -> Self {
        Self::with_bounds(id, 0, 256, 62)
    }

    pub fn with_bounds(id: WorldId, min_y: i32, max_y: i32, sea_level: i32) -> Self {
        Self::with_capacity(id, min_y, max_y, sea_level, DEFAULT_RESIDENT_CHUNKS)
    }

    /// Creates a world that keeps at most `resident_chunks` chunks loaded.
    pub fn with_capacity(
        id: WorldId,
        min_y: i32,
        max_y: i32,
        sea_level: i32,
        resident_chunks: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(resident_chunks).unwrap_or(NonZeroUsize::MIN);
        VoxelWorld {
            id,
            loaded: LruCache::new(capacity),
            unloaded: HashMap::new(),
            min_y,
            max_y,
            sea_level,
            view_distance: 10,
            entities: HashMap::new(),
            next_entity: 1,
            item_drops: Vec::new(),
            explosions: Vec::new(),
            smoke: Vec::new(),
            block_changes: Vec::new(),
        }
    }

    fn in_bounds(&self, pos: BlockPos) -> bool {
        pos.y >= self.min_y && pos.y < self.max_y
    }

    fn chunk_for_read(&self, chunk_pos: &ChunkPos) -> Option<&Chunk> {
        self.loaded
            .peek(chunk_pos)
            .or_else(|| self.unloaded.get(chunk_pos))
    }

    /// Moves a resident chunk into cold storage.
    pub fn unload_chunk(&mut self, chunk_pos: ChunkPos) {
        if let Some(chunk) = self.loaded.pop(&chunk_pos) {
            self.unloaded.insert(chunk_pos, chunk);
        }
    }

    pub fn resident_chunk_count(&self) -> usize {
        self.loaded.len()
    }

    /// Fills the inclusive box between `from` and `to` with `block`.
    pub fn fill(&mut self, from: BlockPos, to: BlockPos, block: Block) {
        for y in from.y.min(to.y)..=from.y.max(to.y) {
            for z in from.z.min(to.z)..=from.z.max(to.z) {
                for x in from.x.min(to.x)..=from.x.max(to.x) {
                    self.set_block(Point3::new(x, y, z), block);
                }
            }
        }
    }

    pub fn spawn_entity(&mut self, kind: EntityKind, location: Point3<f64>) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        self.entities.insert(
            id,
            Entity {
                kind,
                location,
                velocity: Vector3::new(0.0, 0.0, 0.0),
            },
        );
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn set_view_distance(&mut self, chunks: i32) {
        self.view_distance = chunks;
    }
}

impl WorldAccess for VoxelWorld {
    fn id(&self) -> WorldId {
        self.id
    }

    fn block_at(&self, pos: BlockPos) -> Block {
        if !self.in_bounds(pos) {
            return Block::AIR;
        }
        self.chunk_for_read(&Chunk::chunk_pos_of(pos))
            .map(|chunk| chunk.get_block_at(pos))
            .unwrap_or(Block::AIR)
    }

    fn set_block(&mut self, pos: BlockPos, block: Block) {
        if !self.in_bounds(pos) {
            return;
        }
        let chunk_pos = Chunk::chunk_pos_of(pos);
        self.load_chunk(chunk_pos);
        if let Some(chunk) = self.loaded.get_mut(&chunk_pos) {
            chunk.set_block_at(pos, block);
        }
    }

    fn is_loaded(&self, chunk: ChunkPos) -> bool {
        !self.unloaded.contains_key(&chunk)
    }

    fn load_chunk(&mut self, chunk_pos: ChunkPos) {
        // `get` also marks the chunk as most recently used.
        if self.loaded.get(&chunk_pos).is_some() {
            return;
        }
        let chunk = self
            .unloaded
            .remove(&chunk_pos)
            .unwrap_or_else(|| Chunk::empty(chunk_pos));
        if let Some((evicted_pos, evicted)) = self.loaded.push(chunk_pos, chunk) {
            if evicted_pos != chunk_pos {
                log::debug!("Evicting chunk {:?} from world {:?}", evicted_pos, self.id);
                self.unloaded.insert(evicted_pos, evicted);
            }
        }
    }

    fn height_bounds(&self) -> (i32, i32) {
        (self.min_y, self.max_y)
    }

    fn sea_level(&self) -> i32 {
        self.sea_level
    }

    fn entities_within(&self, min: Point3<f64>, max: Point3<f64>) -> Vec<(EntityId, Point3<f64>)> {
        let mut found: Vec<(EntityId, Point3<f64>)> = self
            .entities
            .iter()
            .filter(|(_, entity)| !matches!(entity.kind, EntityKind::Projectile(_)))
            .filter(|(_, entity)| {
                let l = entity.location;
                l.x >= min.x && l.x <= max.x && l.y >= min.y && l.y <= max.y && l.z >= min.z && l.z <= max.z
            })
            .map(|(id, entity)| (*id, entity.location))
            .collect();
        found.sort_by_key(|(id, _)| *id);
        found
    }

    fn move_entity(&mut self, id: EntityId, to: Point3<f64>) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.location = to;
        }
    }

    fn remove_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
    }

    fn spawn_item_drop(&mut self, at: Point3<f64>, block: Block) {
        self.item_drops.push((at, block));
    }

    fn create_explosion(&mut self, at: BlockPos, power: f32) {
        self.explosions.push((at, power));
    }

    fn spawn_smoke(&mut self, at: BlockPos) {
        self.smoke.push(at);
    }

    fn projectiles(&self) -> Vec<Projectile> {
        let mut projectiles: Vec<Projectile> = self
            .entities
            .iter()
            .filter_map(|(id, entity)| match entity.kind {
                EntityKind::Projectile(kind) => Some(Projectile {
                    id: *id,
                    kind,
                    location: entity.location,
                    velocity: entity.velocity,
                }),
                _ => None,
            })
            .collect();
        projectiles.sort_by_key(|projectile| projectile.id);
        projectiles
    }

    fn set_fuse_ticks(&mut self, id: EntityId, ticks: i32) {
        if let Some(entity) = self.entities.get_mut(&id) {
            if let EntityKind::Projectile(ProjectileKind::PrimedExplosive { fuse_ticks }) =
                &mut entity.kind
            {
                *fuse_ticks = ticks;
            }
        }
    }

    fn players(&self) -> Vec<(PlayerId, Point3<f64>)> {
        let mut players: Vec<(PlayerId, Point3<f64>)> = self
            .entities
            .values()
            .filter_map(|entity| match entity.kind {
                EntityKind::Player(player) => Some((player, entity.location)),
                _ => None,
            })
            .collect();
        players.sort_by_key(|(player, _)| *player);
        players
    }

    fn teleport_player(&mut self, player: PlayerId, to: Point3<f64>) {
        for entity in self.entities.values_mut() {
            if entity.kind == EntityKind::Player(player) {
                entity.location = to;
                entity.velocity = Vector3::new(0.0, 0.0, 0.0);
            }
        }
    }

    fn send_block_change(&mut self, player: PlayerId, pos: BlockPos, block: Block) {
        self.block_changes.push((player, pos, block));
    }

    fn view_distance(&self) -> i32 {
        self.view_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::BlockType;

    #[test]
    fn unwritten_space_is_loaded_air() {
        let world = VoxelWorld::new(WorldId(1));
        assert!(world.block_at(Point3::new(100, 70, -100)).is_air());
        assert!(world.is_loaded(Point3::new(6, 4, -7)));
    }

    #[test]
    fn writes_outside_height_bounds_are_ignored() {
        let mut world = VoxelWorld::with_bounds(WorldId(1), 0, 32, 10);
        world.set_block(Point3::new(0, 40, 0), Block::new(BlockType::STONE));
        assert!(world.block_at(Point3::new(0, 40, 0)).is_air());
    }

    #[test]
    fn lru_eviction_unloads_but_keeps_data() {
        let mut world = VoxelWorld::with_capacity(WorldId(1), 0, 256, 62, 1);
        let first = Point3::new(0, 0, 0);
        let second = Point3::new(40, 0, 0);
        world.set_block(first, Block::new(BlockType::STONE));
        world.set_block(second, Block::new(BlockType::DIRT));

        let first_chunk = Chunk::chunk_pos_of(first);
        assert!(!world.is_loaded(first_chunk));
        assert_eq!(world.block_at(first).block_type, BlockType::STONE);

        world.load_chunk(first_chunk);
        assert!(world.is_loaded(first_chunk));
        assert!(!world.is_loaded(Chunk::chunk_pos_of(second)));
        assert_eq!(world.resident_chunk_count(), 1);
    }

    #[test]
    fn players_and_passengers_are_reported_separately() {
        let mut world = VoxelWorld::new(WorldId(1));
        let rider = world.spawn_entity(EntityKind::Passenger, Point3::new(1.5, 65.0, 1.5));
        world.spawn_entity(EntityKind::Player(PlayerId(9)), Point3::new(2.5, 65.0, 2.5));
        world.spawn_entity(
            EntityKind::Projectile(ProjectileKind::PrimedExplosive { fuse_ticks: 40 }),
            Point3::new(1.5, 65.0, 1.5),
        );

        let inside = world.entities_within(Point3::new(0.0, 60.0, 0.0), Point3::new(2.0, 70.0, 2.0));
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].0, rider);
        assert_eq!(world.player_location(PlayerId(9)), Some(Point3::new(2.5, 65.0, 2.5)));
        assert_eq!(world.projectiles().len(), 1);
    }
}
