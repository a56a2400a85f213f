//! Aquarium Sync Client Library
//!
//! Client-side mirror of a shared aquarium: reconciles server snapshots and
//! deltas into a local entity registry, interpolates motion every frame,
//! tracks remote users' cursors, and turns local input into outbound intents.

pub mod config;
pub mod metrics;
pub mod net;
pub mod util;
pub mod world;
