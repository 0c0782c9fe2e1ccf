//! Core types and definitions for the CONQUEST game-state engine.
//!
//! This crate defines the vocabulary shared across all other crates:
//! identifiers, components, commands, records, state snapshots, events,
//! balance catalogs, rules configuration and the error taxonomy.
//! It has no dependency on storage or any runtime framework.

pub mod commands;
pub mod components;
pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod events;
pub mod ids;
pub mod map;
pub mod records;
pub mod state;
pub mod templates;
pub mod types;

pub use error::{EntityRef, SimError, StateViolation};

#[cfg(test)]
mod tests;
