//! Process host: owns the catalogs, the repository, the synchronizer and
//! every running game.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use conquest_core::commands::{CommandEnvelope, PlayerCommand};
use conquest_core::config::{GameSettings, SimConfig};
use conquest_core::enums::AiDifficulty;
use conquest_core::ids::{ConnectionId, GameId, PlayerId, UserId};
use conquest_core::map::MapCatalog;
use conquest_core::state::GameStateSnapshot;
use conquest_core::templates::TemplateCatalog;
use conquest_persistence::{synchronizer, GameRepository, SyncConfig, SyncHandle};
use conquest_sim::engine::SimulationEngine;

use crate::game_loop::{spawn_game_loop, LoopExit};
use crate::state::{GameLoopCommand, GameRegistry, ServerError};

pub struct GameServer {
    repo: GameRepository,
    sync: SyncHandle,
    sync_task: JoinHandle<()>,
    maps: Arc<MapCatalog>,
    catalog: Arc<TemplateCatalog>,
    sim: SimConfig,
    tick: Duration,
    /// Origin of command arrival timestamps.
    epoch: Instant,
    games: GameRegistry,
}

impl GameServer {
    /// Start the synchronizer on the current runtime.
    pub fn new(
        repo: GameRepository,
        sync_config: SyncConfig,
        maps: MapCatalog,
        catalog: TemplateCatalog,
        sim: SimConfig,
        tick: Duration,
    ) -> Self {
        let (sync, sync_task) = synchronizer::spawn(repo.clone(), sync_config);
        Self {
            repo,
            sync,
            sync_task,
            maps: Arc::new(maps),
            catalog: Arc::new(catalog),
            sim,
            tick,
            epoch: Instant::now(),
            games: GameRegistry::default(),
        }
    }

    pub fn repository(&self) -> &GameRepository {
        &self.repo
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Create a lobby game and start its loop.
    pub async fn create_game(
        &self,
        settings: &GameSettings,
        host_user_id: Option<UserId>,
    ) -> Result<GameId, ServerError> {
        let map = Arc::new(self.maps.get(settings.map_id)?.clone());
        let record = self.repo.create_game(settings, host_user_id).await?;
        let game_id = record.id;
        let mut sim = self.sim.clone();
        sim.seed ^= game_id.0;
        let engine = SimulationEngine::new(sim, record, map, Arc::clone(&self.catalog));
        let handle = spawn_game_loop(engine, self.sync.clone(), self.tick)?;
        self.games.insert(handle);
        info!(game = %game_id, map = %settings.map_id, "game created");
        Ok(game_id)
    }

    pub fn join_game(
        &self,
        game_id: GameId,
        user_id: Option<UserId>,
        display_name: impl Into<String>,
        ai_difficulty: Option<AiDifficulty>,
    ) -> Result<PlayerId, ServerError> {
        let display_name = display_name.into();
        self.games.client(game_id)?.request(|reply| GameLoopCommand::AddPlayer {
            user_id,
            display_name,
            ai_difficulty,
            reply,
        })
    }

    pub fn start_game(&self, game_id: GameId) -> Result<(), ServerError> {
        self.games
            .client(game_id)?
            .request(|reply| GameLoopCommand::Start { reply })
    }

    /// Validate a command against the current state and queue it for the
    /// next tick. Rejections leave the game untouched.
    pub fn submit_command(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        connection_id: ConnectionId,
        command: PlayerCommand,
    ) -> Result<u64, ServerError> {
        let received_at_us = self.now_us();
        let envelope = CommandEnvelope::new(player_id, connection_id, received_at_us, command);
        self.games
            .client(game_id)?
            .request(|reply| GameLoopCommand::Submit { envelope, reply })
    }

    pub fn set_connected(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        connected: bool,
    ) -> Result<(), ServerError> {
        self.games.client(game_id)?.request(|reply| GameLoopCommand::SetConnected {
            player_id,
            connected,
            reply,
        })
    }

    /// Snapshot after the most recent tick.
    pub fn get_snapshot(&self, game_id: GameId) -> Result<Option<GameStateSnapshot>, ServerError> {
        Ok(self.games.client(game_id)?.snapshot())
    }

    pub fn abandon_game(&self, game_id: GameId) -> Result<(), ServerError> {
        self.games.client(game_id)?.send(GameLoopCommand::Abandon)
    }

    pub fn running_games(&self) -> Vec<GameId> {
        self.games.running()
    }

    /// Wait for a game's loop to end and forget the game.
    pub async fn wait_for_end(&self, game_id: GameId) -> Result<LoopExit, ServerError> {
        let handle = self
            .games
            .remove(game_id)
            .ok_or(ServerError::UnknownGame(game_id))?;
        join_loop(handle.thread, game_id).await
    }

    /// Stop every game, then flush and stop the synchronizer.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let handles = self.games.drain();
        for handle in &handles {
            let _ = handle.client.send(GameLoopCommand::Shutdown);
        }
        for handle in handles {
            let game_id = handle.client.game_id;
            match join_loop(handle.thread, game_id).await {
                Ok(exit) => info!(game = %game_id, ?exit, "game loop joined"),
                Err(error) => warn!(game = %game_id, %error, "game loop did not exit cleanly"),
            }
        }
        self.sync.shutdown().await?;
        if let Err(error) = self.sync_task.await {
            warn!(%error, "synchronizer task failed");
        }
        info!("server stopped");
        Ok(())
    }

    fn now_us(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

async fn join_loop(
    thread: std::thread::JoinHandle<LoopExit>,
    game_id: GameId,
) -> Result<LoopExit, ServerError> {
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .map_err(|_| ServerError::LoopStopped(game_id))?
        .map_err(|_| ServerError::LoopStopped(game_id))
}
