//! # Entity Module
//!
//! Identifiers and lightweight views of the non-block things living in a world:
//! players, passengers riding a craft, and the short-lived projectiles that the
//! transient-entity passes keep an eye on.

use std::fmt;

use cgmath::{InnerSpace, Point3, Vector3};

/// Opaque identifier of an entity inside one world.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Identifier of a player. Players control craft and receive notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

/// The kinds of short-lived projectiles the engine tracks.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ProjectileKind {
    /// A lit explosive. `fuse_ticks <= 0` means it has already gone off.
    PrimedExplosive { fuse_ticks: i32 },
    /// A small fireball. Dispensers launch them without a living shooter.
    Fireball { living_shooter: bool },
}

/// Snapshot of a projectile as reported by the world.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Projectile {
    pub id: EntityId,
    pub kind: ProjectileKind,
    pub location: Point3<f64>,
    pub velocity: Vector3<f64>,
}

impl Projectile {
    pub fn speed_squared(&self) -> f64 {
        self.velocity.magnitude2()
    }
}

/// What an entity stored in the reference world is.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum EntityKind {
    /// Anything that rides along when a craft moves (mobs, dropped items...).
    Passenger,
    Player(PlayerId),
    Projectile(ProjectileKind),
}

/// An entity stored in the reference world.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub location: Point3<f64>,
    pub velocity: Vector3<f64>,
}
