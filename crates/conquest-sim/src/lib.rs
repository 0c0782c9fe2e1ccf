//! Simulation engine for CONQUEST.
//!
//! Owns one game's Entity Store, applies player commands at tick
//! boundaries, runs the production, movement, capture, combat, region,
//! economy and victory systems, and produces snapshots and persistence
//! deltas. Headless and deterministic for a given seed and command stream.

pub mod engine;
pub mod store;
pub mod systems;
pub mod world_setup;

pub use conquest_core as core;
pub use engine::{DroppedCommand, GameOver, SimulationEngine, TickOutcome};
pub use store::EntityStore;
