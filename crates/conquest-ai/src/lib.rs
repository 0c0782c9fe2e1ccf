//! Computer opponents for CONQUEST.
//!
//! Pure functions from a game snapshot to player commands. The simulation
//! feeds the returned commands through the same inbox as human input.

pub mod planner;
pub mod profiles;

pub use conquest_core as core;

#[cfg(test)]
mod tests;
