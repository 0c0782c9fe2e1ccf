//! CONQUEST game server.
//!
//! Hosts many games in one process: a loop thread per game, a shared
//! persistence synchronizer, and the command and snapshot API the network
//! layer calls into.

pub mod config;
pub mod game_loop;
pub mod server;
pub mod state;

pub use conquest_core as core;
pub use config::ServerConfig;
pub use game_loop::LoopExit;
pub use server::GameServer;
pub use state::ServerError;
