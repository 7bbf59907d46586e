//! # Core Module
//!
//! Concurrency primitives shared by the rest of the engine.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted value behind a read-write lock.
//!   Worlds live behind one of these so structural tasks can read them from
//!   worker threads while the tick loop remains the only writer.

pub mod mt_resource;

pub use mt_resource::MtResource;
