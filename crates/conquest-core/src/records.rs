//! Typed entity records.
//!
//! These are the persisted shape of every live-game entity. The engine
//! produces them for the snapshot and for persistence deltas; the storage
//! layer converts them to and from database rows.

use serde::{Deserialize, Serialize};

use crate::config::GameSettings;
use crate::enums::*;
use crate::ids::*;
use crate::types::Position;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub host_user_id: Option<UserId>,
    pub map_id: MapId,
    pub name: String,
    pub max_players: u8,
    pub status: GameStatus,
    /// Game speed multiplier (1.0 = normal).
    pub speed: f64,
    pub starting_money: u32,
    /// Seconds of game time between income payouts.
    pub money_interval_secs: f64,
    pub winner_id: Option<PlayerId>,
    pub started_at_tick: Option<u64>,
    pub ended_at_tick: Option<u64>,
}

impl GameRecord {
    /// A new lobby game created from the host's settings.
    pub fn waiting(id: GameId, host_user_id: Option<UserId>, settings: &GameSettings) -> Self {
        Self {
            id,
            host_user_id,
            map_id: settings.map_id,
            name: settings.name.clone(),
            max_players: settings.max_players,
            status: GameStatus::Waiting,
            speed: settings.speed,
            starting_money: settings.starting_money,
            money_interval_secs: settings.money_interval_secs,
            winner_id: None,
            started_at_tick: None,
            ended_at_tick: None,
        }
    }
}

/// Cumulative per-player statistics, incremented from events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub units_killed: u32,
    pub units_lost: u32,
    pub camps_captured: u32,
    pub camps_lost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub game_id: GameId,
    /// `None` for computer-controlled players.
    pub user_id: Option<UserId>,
    pub ai_difficulty: Option<AiDifficulty>,
    pub player_number: u8,
    pub display_name: String,
    pub color: String,
    pub money: u32,
    pub status: PlayerStatus,
    pub stats: PlayerStats,
    pub left_at_tick: Option<u64>,
}

impl PlayerRecord {
    pub fn is_ai(&self) -> bool {
        self.user_id.is_none()
    }

    /// Add income, saturating.
    pub fn credit(&mut self, amount: u32) {
        self.money = self.money.saturating_add(amount);
    }

    /// Remove money, clamping at 0.
    pub fn debit_clamped(&mut self, amount: u32) {
        self.money = self.money.saturating_sub(amount);
    }
}

/// What a production order builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "template_id", rename_all = "snake_case")]
pub enum ProductionItem {
    Unit(UnitTemplateId),
    Ship(ShipTemplateId),
}

/// One pending build in a camp's production queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub item: ProductionItem,
    pub completes_at_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampRecord {
    pub id: CampId,
    pub game_id: GameId,
    pub owner_id: Option<PlayerId>,
    pub tile_x: i32,
    pub tile_y: i32,
    pub camp_type: CampType,
    pub region_id: Option<RegionId>,
    pub current_hp: u32,
    pub max_hp: u32,
    pub turret_damage: u32,
    pub turret_range: f64,
    pub captured_at_tick: Option<u64>,
    pub production_queue: Vec<ProductionOrder>,
}

impl CampRecord {
    pub fn position(&self) -> Position {
        Position::of_tile(self.tile_x, self.tile_y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: UnitId,
    pub game_id: GameId,
    pub owner_id: PlayerId,
    pub template_id: UnitTemplateId,
    pub position: Position,
    pub current_hp: u32,
    pub target: Option<Position>,
    pub is_alive: bool,
    pub source_camp_id: Option<CampId>,
    pub group_number: Option<u8>,
    pub died_at_tick: Option<u64>,
    pub facing: Facing,
    pub mirrored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipRecord {
    pub id: ShipId,
    pub game_id: GameId,
    pub owner_id: PlayerId,
    pub template_id: ShipTemplateId,
    pub position: Position,
    pub current_hp: u32,
    pub target: Option<Position>,
    pub is_alive: bool,
    pub source_camp_id: Option<CampId>,
    pub died_at_tick: Option<u64>,
    pub facing: Facing,
    pub mirrored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionControlRecord {
    pub game_id: GameId,
    pub region_id: RegionId,
    pub owner_id: Option<PlayerId>,
    pub changed_at_tick: u64,
}

/// Records of every entity that changed during one or more ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub game_id: GameId,
    /// Last tick included in this delta.
    pub tick: u64,
    pub game: Option<GameRecord>,
    pub players: Vec<PlayerRecord>,
    pub camps: Vec<CampRecord>,
    pub units: Vec<UnitRecord>,
    pub ships: Vec<ShipRecord>,
    pub region_control: Vec<RegionControlRecord>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Number of entity records carried.
    pub fn record_count(&self) -> usize {
        usize::from(self.game.is_some())
            + self.players.len()
            + self.camps.len()
            + self.units.len()
            + self.ships.len()
            + self.region_control.len()
    }
}
