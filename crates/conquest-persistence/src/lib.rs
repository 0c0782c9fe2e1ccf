//! SQLite storage for live games and the background synchronizer that feeds it.

pub mod db;
pub mod error;
pub mod repository;
pub mod rows;
pub mod synchronizer;

pub use db::{init_db, DbConfig};
pub use error::PersistError;
pub use repository::{GameRepository, LoadedGame};
pub use synchronizer::{SyncConfig, SyncHandle, StateSink};

#[cfg(test)]
mod tests;
