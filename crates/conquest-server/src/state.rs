//! State shared between the API layer and the game-loop threads.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;

use conquest_core::commands::CommandEnvelope;
use conquest_core::enums::AiDifficulty;
use conquest_core::ids::{GameId, PlayerId, UserId};
use conquest_core::state::GameStateSnapshot;
use conquest_core::SimError;
use conquest_persistence::PersistError;

use crate::game_loop::LoopExit;

pub type Reply<T> = mpsc::Sender<Result<T, SimError>>;

/// Requests sent from the API layer to a game-loop thread. Each carries a
/// reply channel answered before the next tick.
#[derive(Debug)]
pub enum GameLoopCommand {
    AddPlayer {
        user_id: Option<UserId>,
        display_name: String,
        ai_difficulty: Option<AiDifficulty>,
        reply: Reply<PlayerId>,
    },
    Start {
        reply: Reply<()>,
    },
    /// Validate and queue a player command for the next tick.
    Submit {
        envelope: CommandEnvelope,
        reply: Reply<u64>,
    },
    SetConnected {
        player_id: PlayerId,
        connected: bool,
        reply: Reply<()>,
    },
    /// End the game without a result.
    Abandon,
    /// Stop the loop, leaving the game resumable.
    Shutdown,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("no running game {0}")]
    UnknownGame(GameId),
    /// The loop thread exited while a request was in flight.
    #[error("game loop for {0} has stopped")]
    LoopStopped(GameId),
    #[error("failed to spawn game loop: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Cloneable connection to one game-loop thread.
#[derive(Clone)]
pub struct GameClient {
    pub game_id: GameId,
    pub command_tx: mpsc::Sender<GameLoopCommand>,
    /// Latest snapshot for `get_snapshot` polling, written after every tick.
    pub latest_snapshot: Arc<Mutex<Option<GameStateSnapshot>>>,
}

impl GameClient {
    /// Send a request and wait for the loop's answer.
    pub fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> GameLoopCommand,
    ) -> Result<T, ServerError> {
        let (reply, answer) = mpsc::channel();
        self.command_tx
            .send(build(reply))
            .map_err(|_| ServerError::LoopStopped(self.game_id))?;
        let result = answer
            .recv()
            .map_err(|_| ServerError::LoopStopped(self.game_id))?;
        Ok(result?)
    }

    /// Fire-and-forget control message.
    pub fn send(&self, command: GameLoopCommand) -> Result<(), ServerError> {
        self.command_tx
            .send(command)
            .map_err(|_| ServerError::LoopStopped(self.game_id))
    }

    pub fn snapshot(&self) -> Option<GameStateSnapshot> {
        match self.latest_snapshot.lock() {
            Ok(lock) => lock.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// A running game: its client and the thread driving it.
pub struct GameHandle {
    pub client: GameClient,
    pub thread: JoinHandle<LoopExit>,
}

/// Running games keyed by id.
#[derive(Default)]
pub struct GameRegistry {
    games: Mutex<BTreeMap<GameId, GameHandle>>,
}

impl GameRegistry {
    pub fn insert(&self, handle: GameHandle) {
        self.lock().insert(handle.client.game_id, handle);
    }

    pub fn client(&self, game_id: GameId) -> Result<GameClient, ServerError> {
        self.lock()
            .get(&game_id)
            .map(|h| h.client.clone())
            .ok_or(ServerError::UnknownGame(game_id))
    }

    pub fn remove(&self, game_id: GameId) -> Option<GameHandle> {
        self.lock().remove(&game_id)
    }

    pub fn drain(&self) -> Vec<GameHandle> {
        std::mem::take(&mut *self.lock()).into_values().collect()
    }

    /// Games whose loop thread is still running.
    pub fn running(&self) -> Vec<GameId> {
        self.lock()
            .values()
            .filter(|h| !h.thread.is_finished())
            .map(|h| h.client.game_id)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<GameId, GameHandle>> {
        match self.games.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
