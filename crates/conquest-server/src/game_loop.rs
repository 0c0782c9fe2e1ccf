//! Game loop thread: one per game, ticking the engine at a fixed rate.
//!
//! The engine is moved into the thread and never shared. Requests arrive
//! over an `mpsc` channel and are answered between ticks. Each tick's delta
//! goes to the persistence synchronizer; the snapshot is stored for polling.

use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use conquest_core::enums::GameStatus;
use conquest_core::ids::PlayerId;
use conquest_core::records::StateDelta;
use conquest_core::state::GameStateSnapshot;
use conquest_persistence::SyncHandle;
use conquest_sim::engine::{GameOver, SimulationEngine};

use crate::state::{GameClient, GameHandle, GameLoopCommand};

/// Why a game loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Finished { winner: Option<PlayerId> },
    Abandoned,
    /// Stopped from outside; the game can be resumed from storage.
    Shutdown,
}

/// Spawn the loop for `engine`.
pub fn spawn_game_loop(
    engine: SimulationEngine,
    sync: SyncHandle,
    tick: Duration,
) -> std::io::Result<GameHandle> {
    let (command_tx, command_rx) = mpsc::channel::<GameLoopCommand>();
    let latest_snapshot = Arc::new(Mutex::new(None));
    let client = GameClient {
        game_id: engine.game_id(),
        command_tx,
        latest_snapshot: Arc::clone(&latest_snapshot),
    };

    let thread = std::thread::Builder::new()
        .name(format!("conquest-game-{}", engine.game_id().0))
        .spawn(move || {
            let mut game = GameLoop {
                engine,
                sync,
                latest_snapshot,
                tick,
            };
            game.run(command_rx)
        })?;

    Ok(GameHandle { client, thread })
}

struct GameLoop {
    engine: SimulationEngine,
    sync: SyncHandle,
    latest_snapshot: Arc<Mutex<Option<GameStateSnapshot>>>,
    tick: Duration,
}

impl GameLoop {
    fn run(&mut self, command_rx: mpsc::Receiver<GameLoopCommand>) -> LoopExit {
        let game = self.engine.game_id();
        info!(%game, tick_ms = self.tick.as_millis() as u64, "game loop started");
        self.persist_pending();
        self.publish_state();

        // Lobby: nothing ticks until the game starts.
        while self.engine.status() == GameStatus::Waiting {
            let Ok(request) = command_rx.recv() else {
                return self.shutdown();
            };
            if let Some(exit) = self.handle(request) {
                return exit;
            }
            self.publish_state();
        }

        let mut next_tick_time = Instant::now() + self.tick;
        loop {
            // 1. Answer requests until the tick is due
            loop {
                let wait = next_tick_time.saturating_duration_since(Instant::now());
                let request = if wait.is_zero() {
                    match command_rx.try_recv() {
                        Ok(request) => request,
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => return self.shutdown(),
                    }
                } else {
                    match command_rx.recv_timeout(wait) {
                        Ok(request) => request,
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => return self.shutdown(),
                    }
                };
                if let Some(exit) = self.handle(request) {
                    return exit;
                }
            }

            // 2. Advance one tick
            let outcome = self.engine.tick();
            self.persist(outcome.delta);
            self.publish(outcome.snapshot);
            if let Some(over) = outcome.game_over {
                return self.finish(over);
            }

            // 3. Schedule the next tick
            next_tick_time += self.tick;
            let now = Instant::now();
            if now > next_tick_time + self.tick * 2 {
                // Too far behind; skip ahead rather than catch up.
                debug!(%game, "tick overrun, resetting schedule");
                next_tick_time = now;
            }
        }
    }

    fn handle(&mut self, request: GameLoopCommand) -> Option<LoopExit> {
        match request {
            GameLoopCommand::AddPlayer {
                user_id,
                display_name,
                ai_difficulty,
                reply,
            } => {
                let result = self.engine.add_player(user_id, display_name, ai_difficulty);
                self.persist_pending();
                let _ = reply.send(result);
            }
            GameLoopCommand::Start { reply } => {
                let result = self.engine.start();
                self.persist_pending();
                let _ = reply.send(result);
            }
            GameLoopCommand::Submit { envelope, reply } => {
                let _ = reply.send(self.engine.submit(envelope));
            }
            GameLoopCommand::SetConnected {
                player_id,
                connected,
                reply,
            } => {
                let result = self.engine.set_connected(player_id, connected);
                self.persist_pending();
                let _ = reply.send(result);
            }
            GameLoopCommand::Abandon => match self.engine.abandon() {
                Ok(delta) => {
                    self.persist(delta);
                    self.flush("abandon");
                    self.publish_state();
                    return Some(LoopExit::Abandoned);
                }
                Err(error) => warn!(game = %self.engine.game_id(), %error, "cannot abandon"),
            },
            GameLoopCommand::Shutdown => return Some(self.shutdown()),
        }
        None
    }

    /// Final flush of the deciding tick, then record the result.
    fn finish(&mut self, over: GameOver) -> LoopExit {
        self.flush("game over");
        match self.engine.finish() {
            Ok(delta) => {
                self.persist(delta);
                self.flush("result");
            }
            Err(error) => warn!(game = %self.engine.game_id(), %error, "cannot record result"),
        }
        self.publish_state();
        LoopExit::Finished {
            winner: over.winner,
        }
    }

    fn shutdown(&mut self) -> LoopExit {
        self.flush("shutdown");
        info!(game = %self.engine.game_id(), tick = self.engine.time().tick, "game loop stopped");
        LoopExit::Shutdown
    }

    /// Hand changes made between ticks to the synchronizer.
    fn persist_pending(&mut self) {
        let delta = self.engine.take_delta();
        self.persist(delta);
    }

    fn persist(&self, delta: StateDelta) {
        if let Err(error) = self.sync.submit(delta) {
            warn!(game = %self.engine.game_id(), %error, "delta not persisted");
        }
    }

    /// Block until everything submitted so far is stored.
    fn flush(&self, reason: &str) {
        if let Err(error) = self.sync.flush_blocking() {
            warn!(game = %self.engine.game_id(), %error, reason, "final flush failed");
        }
    }

    fn publish_state(&self) {
        match self.engine.get_state(self.engine.game_id()) {
            Ok(snapshot) => self.publish(snapshot),
            Err(error) => warn!(%error, "snapshot unavailable"),
        }
    }

    fn publish(&self, snapshot: GameStateSnapshot) {
        match self.latest_snapshot.lock() {
            Ok(mut lock) => *lock = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }
}
