//! Simulation engine: one authoritative game.
//!
//! `SimulationEngine` owns the game's Entity Store, the inbox of accepted
//! commands and the RNG used by computer players. Commands are validated on
//! submission and applied at the next tick boundary; every tick runs the
//! systems in a fixed order and yields a snapshot plus the persistence delta.
//! Completely headless, enabling deterministic testing.

use std::sync::Arc;

use hecs::World;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use conquest_ai::planner::{plan, AiContext};
use conquest_ai::profiles::profile_for;
use conquest_core::commands::CommandEnvelope;
use conquest_core::config::{RulesConfig, SimConfig};
use conquest_core::enums::{AiDifficulty, GameStatus, PlayerStatus};
use conquest_core::error::{SimError, StateViolation};
use conquest_core::events::GameEvent;
use conquest_core::ids::{ConnectionId, GameId, PlayerId, UserId};
use conquest_core::map::MapTemplate;
use conquest_core::records::{GameRecord, StateDelta};
use conquest_core::state::GameStateSnapshot;
use conquest_core::templates::TemplateCatalog;
use conquest_core::types::SimTime;

use crate::store::EntityStore;
use crate::systems::commands::{Check, QueuedCommand};
use crate::systems::{self, TickContext};
use crate::world_setup;

pub use crate::systems::commands::DroppedCommand;
pub use crate::systems::victory::GameOver;

/// Everything one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub snapshot: GameStateSnapshot,
    /// Records changed during the tick, for the persistence synchronizer.
    pub delta: StateDelta,
    /// Commands accepted earlier that could not be applied.
    pub dropped: Vec<DroppedCommand>,
    /// Set on the tick the game was decided.
    pub game_over: Option<GameOver>,
}

/// The simulation engine. Owns the Entity Store and all per-game state.
pub struct SimulationEngine {
    store: EntityStore,
    map: Arc<MapTemplate>,
    catalog: Arc<TemplateCatalog>,
    rules: RulesConfig,
    time: SimTime,
    rng: ChaCha8Rng,
    inbox: Vec<QueuedCommand>,
    next_seq: u64,
    /// Latest arrival timestamp seen; AI commands are stamped with it.
    last_received_us: u64,
    game_over: Option<GameOver>,
}

impl SimulationEngine {
    /// Create an engine for a game in the lobby.
    pub fn new(
        config: SimConfig,
        game: GameRecord,
        map: Arc<MapTemplate>,
        catalog: Arc<TemplateCatalog>,
    ) -> Self {
        Self {
            store: EntityStore::new(game),
            map,
            catalog,
            rules: config.rules,
            time: SimTime::default(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            inbox: Vec::new(),
            next_seq: 0,
            last_received_us: 0,
            game_over: None,
        }
    }

    pub fn game_id(&self) -> GameId {
        self.store.game_id()
    }

    pub fn status(&self) -> GameStatus {
        self.store.game_record().status
    }

    /// Get the current simulation time.
    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Get a read-only reference to the ECS world.
    pub fn world(&self) -> &World {
        self.store.world()
    }

    pub fn map(&self) -> &MapTemplate {
        &self.map
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Number of accepted commands waiting for the next tick.
    pub fn pending_commands(&self) -> usize {
        self.inbox.len()
    }

    /// The decided result, once the game is over.
    pub fn game_over(&self) -> Option<GameOver> {
        self.game_over
    }

    fn is_running(&self) -> bool {
        self.status() == GameStatus::InProgress && self.game_over.is_none()
    }

    // ---- Lobby ----

    /// Join the game. `user_id` is `None` for computer players.
    pub fn add_player(
        &mut self,
        user_id: Option<UserId>,
        display_name: impl Into<String>,
        ai_difficulty: Option<AiDifficulty>,
    ) -> Result<PlayerId, SimError> {
        let id = self.store.add_player(user_id, display_name, ai_difficulty)?;
        info!(game = %self.game_id(), player = %id, ai = user_id.is_none(), "player joined");
        Ok(id)
    }

    /// Seed the map and start the match.
    pub fn start(&mut self) -> Result<(), SimError> {
        let status = self.status();
        if !status.can_transition_to(GameStatus::InProgress) {
            return Err(StateViolation::IllegalGameTransition {
                from: status,
                to: GameStatus::InProgress,
            }
            .into());
        }
        world_setup::check_capacity(&self.store, &self.map)?;

        let tick = self.time.tick;
        world_setup::seed_match(&mut self.store, &self.map, &self.rules, tick)?;
        self.store.set_game_status(GameStatus::InProgress, tick)?;

        let ctx = TickContext {
            tick,
            speed: self.store.game_record().speed,
            rules: &self.rules,
            catalog: &self.catalog,
            map: &self.map,
        };
        let mut events = Vec::new();
        systems::regions::run(&mut self.store, &ctx, &mut events);
        info!(
            game = %self.game_id(),
            map = %self.map.name,
            players = self.store.all_players().count(),
            "game started"
        );
        Ok(())
    }

    // ---- Commands ----

    /// Validate a command against the current state and queue it for the
    /// next tick. Returns the submission sequence number. Rejections leave
    /// the game untouched.
    ///
    /// Production orders are applied on acceptance: the price is deducted
    /// and the queue slot taken at once, so later submissions see them.
    pub fn submit(&mut self, envelope: CommandEnvelope) -> Result<u64, SimError> {
        let ctx = TickContext {
            tick: self.time.tick,
            speed: self.store.game_record().speed,
            rules: &self.rules,
            catalog: &self.catalog,
            map: &self.map,
        };
        let effect = systems::commands::plan(&self.store, &ctx, &envelope, Check::Submit)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.last_received_us = self.last_received_us.max(envelope.received_at_us);
        debug!(
            game = %self.store.game_id(),
            seq,
            player = %envelope.player_id,
            command = envelope.command.label(),
            "command accepted"
        );
        if effect.applies_on_submit() {
            let mut events = Vec::new();
            systems::commands::apply(&mut self.store, &ctx, effect, &mut events);
        } else {
            self.inbox.push(QueuedCommand { seq, envelope });
        }
        Ok(seq)
    }

    /// Mark a player as disconnected or back online.
    pub fn set_connected(&mut self, player: PlayerId, connected: bool) -> Result<(), SimError> {
        let next = if connected {
            PlayerStatus::Active
        } else {
            PlayerStatus::Disconnected
        };
        self.store.set_player_status(player, next, self.time.tick)?;
        info!(game = %self.game_id(), %player, connected, "connection status changed");
        Ok(())
    }

    // ---- Tick ----

    /// Advance the simulation by one tick.
    pub fn tick(&mut self) -> TickOutcome {
        let mut events = Vec::new();
        let mut dropped = Vec::new();
        let mut game_over = None;

        if self.is_running() {
            self.time.advance();
            let inbox = std::mem::take(&mut self.inbox);
            let ctx = TickContext {
                tick: self.time.tick,
                speed: self.store.game_record().speed,
                rules: &self.rules,
                catalog: &self.catalog,
                map: &self.map,
            };
            let store = &mut self.store;

            // 1. Commands, in arrival order
            systems::commands::run(store, &ctx, inbox, &mut events, &mut dropped);
            // 2. Production completions
            systems::production::run(store, &ctx, &mut events);
            // 3. Movement
            systems::movement::run(store, &ctx);
            // 4. Capture of camps downed on earlier ticks
            systems::capture::run(store, &ctx, &mut events);
            // 5. Combat
            systems::combat::run(store, &ctx, &mut events);
            // 6. Region control
            systems::regions::run(store, &ctx, &mut events);
            // 7. Income and region bonuses
            systems::economy::run(store, &ctx, &mut events);
            // 8. Defeat and victory
            game_over = systems::victory::run(store, &ctx, &mut events);
            // 9. Region control again, eliminated players' camps turned neutral
            systems::regions::run(store, &ctx, &mut events);

            if let Some(over) = game_over {
                events.push(GameEvent::GameFinished { winner: over.winner });
                self.game_over = Some(over);
            }
        }

        let snapshot = systems::snapshot::build_snapshot(
            &self.store,
            &self.catalog,
            &self.map,
            self.time,
            events,
        );
        if self.is_running() {
            self.plan_ai(&snapshot);
        }
        let delta = self.store.take_delta(self.time.tick);
        TickOutcome {
            snapshot,
            delta,
            dropped,
            game_over,
        }
    }

    /// Queue commands for computer players whose decision round is due.
    fn plan_ai(&mut self, snapshot: &GameStateSnapshot) {
        let tick = self.time.tick;
        let due: Vec<(PlayerId, AiDifficulty)> = self
            .store
            .all_players()
            .filter(|p| p.status == PlayerStatus::Active)
            .filter_map(|p| p.ai_difficulty.filter(|_| p.is_ai()).map(|d| (p.id, d)))
            .filter(|(_, d)| tick % profile_for(*d).decision_interval_ticks == 0)
            .collect();

        for (player, difficulty) in due {
            let profile = profile_for(difficulty);
            let ctx = AiContext {
                player,
                snapshot,
                catalog: &self.catalog,
                profile: &profile,
            };
            let commands = plan(&ctx, &mut self.rng);
            for command in commands {
                let envelope = CommandEnvelope::new(
                    player,
                    ConnectionId::LOCAL,
                    self.last_received_us,
                    command,
                );
                if let Err(error) = self.submit(envelope) {
                    debug!(%player, %error, "ai command rejected");
                }
            }
        }
    }

    // ---- Game end ----

    /// Record the decided result and mark the game finished. Call after the
    /// final flush of the deciding tick's delta.
    pub fn finish(&mut self) -> Result<StateDelta, SimError> {
        let status = self.status();
        let Some(over) = self.game_over else {
            return Err(StateViolation::IllegalGameTransition {
                from: status,
                to: GameStatus::Finished,
            }
            .into());
        };
        self.store.set_winner(over.winner);
        self.store.set_game_status(GameStatus::Finished, self.time.tick)?;
        info!(game = %self.game_id(), winner = ?over.winner, tick = self.time.tick, "game finished");
        Ok(self.store.take_delta(self.time.tick))
    }

    /// End the game without a result.
    pub fn abandon(&mut self) -> Result<StateDelta, SimError> {
        self.store.set_game_status(GameStatus::Abandoned, self.time.tick)?;
        self.inbox.clear();
        info!(game = %self.game_id(), tick = self.time.tick, "game abandoned");
        Ok(self.store.take_delta(self.time.tick))
    }

    /// Drain records changed outside of a tick (lobby joins, start, status
    /// changes).
    pub fn take_delta(&mut self) -> StateDelta {
        self.store.take_delta(self.time.tick)
    }

    /// Full aggregate state of the game.
    pub fn get_state(&self, game_id: GameId) -> Result<GameStateSnapshot, SimError> {
        self.store.game(game_id)?;
        Ok(systems::snapshot::build_snapshot(
            &self.store,
            &self.catalog,
            &self.map,
            self.time,
            Vec::new(),
        ))
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }
}
