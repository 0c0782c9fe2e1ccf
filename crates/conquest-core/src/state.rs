//! Game state snapshot: the complete visible state of one game after a tick.
//!
//! Views wrap the persisted records and join in what a presentation layer
//! needs to render without reinterpreting storage rows: owner player
//! numbers, owner colors and template types.

use serde::{Deserialize, Serialize};

use crate::events::GameEvent;
use crate::ids::*;
use crate::records::*;
use crate::types::SimTime;

/// Aggregate state of one game. Dead units and ships are never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub game: GameRecord,
    pub time: SimTime,
    pub players: Vec<PlayerRecord>,
    pub camps: Vec<CampView>,
    pub units: Vec<UnitView>,
    pub ships: Vec<ShipView>,
    pub region_control: Vec<RegionControlView>,
    /// Events raised during the tick that produced this snapshot.
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampView {
    #[serde(flatten)]
    pub record: CampRecord,
    /// `None` for neutral camps.
    pub owner_player_number: Option<u8>,
    pub owner_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitView {
    #[serde(flatten)]
    pub record: UnitRecord,
    pub unit_type: String,
    pub max_hp: u32,
    pub owner_player_number: u8,
    pub owner_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipView {
    #[serde(flatten)]
    pub record: ShipRecord,
    pub ship_type: String,
    pub max_hp: u32,
    pub owner_player_number: u8,
    pub owner_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionControlView {
    #[serde(flatten)]
    pub record: RegionControlRecord,
    pub region_name: String,
    pub owner_player_number: Option<u8>,
    pub owner_color: Option<String>,
}

impl GameStateSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn camp(&self, id: CampId) -> Option<&CampView> {
        self.camps.iter().find(|c| c.record.id == id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitView> {
        self.units.iter().find(|u| u.record.id == id)
    }

    pub fn camps_of(&self, player: PlayerId) -> impl Iterator<Item = &CampView> {
        self.camps
            .iter()
            .filter(move |c| c.record.owner_id == Some(player))
    }

    pub fn units_of(&self, player: PlayerId) -> impl Iterator<Item = &UnitView> {
        self.units.iter().filter(move |u| u.record.owner_id == player)
    }

    pub fn ships_of(&self, player: PlayerId) -> impl Iterator<Item = &ShipView> {
        self.ships.iter().filter(move |s| s.record.owner_id == player)
    }

    /// Controlling player of a region, if any.
    pub fn region_owner(&self, region: RegionId) -> Option<PlayerId> {
        self.region_control
            .iter()
            .find(|r| r.record.region_id == region)
            .and_then(|r| r.record.owner_id)
    }
}
