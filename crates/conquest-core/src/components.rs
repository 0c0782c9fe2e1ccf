//! ECS components for hecs entities.
//!
//! Components are plain data structs. Game logic lives in systems, not
//! components; the few methods here only guard local invariants.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::enums::{CampType, Facing};
use crate::ids::*;
use crate::records::ProductionOrder;
use crate::types::Position;

/// Hit points. `current` never exceeds `max` and never underflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Health {
    pub fn full(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0
    }

    /// Apply `max(0, hp - damage)`. Returns true when this hit took the
    /// entity from alive to 0.
    pub fn apply_damage(&mut self, damage: u32) -> bool {
        let was_alive = self.is_alive();
        self.current = self.current.saturating_sub(damage);
        was_alive && !self.is_alive()
    }

    /// Set HP, clamped to `[0, max]`.
    pub fn set(&mut self, hp: u32) {
        self.current = hp.min(self.max);
    }
}

/// The player controlling a unit or ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner(pub PlayerId);

/// Movement order and speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub target: Option<Position>,
    /// Tiles per second at 1x game speed.
    pub speed: f64,
}

/// Presentation facing derived from the last movement step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub facing: Facing,
    pub mirrored: bool,
}

/// Attack capability of a unit, ship or camp turret.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    /// Range in tiles.
    pub range: f64,
    /// Minimum ticks between two attacks.
    pub hit_interval_ticks: u64,
    /// First tick at which the weapon may fire again.
    pub ready_at_tick: u64,
}

impl Weapon {
    pub fn is_ready(&self, tick: u64) -> bool {
        tick >= self.ready_at_tick
    }

    pub fn fired(&mut self, tick: u64) {
        self.ready_at_tick = tick + self.hit_interval_ticks.max(1);
    }
}

/// Identity and bookkeeping of a land unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub id: UnitId,
    pub template: UnitTemplateId,
    /// Damage class of this unit (template `unit_type`).
    pub unit_type: String,
    pub source_camp: Option<CampId>,
    pub group: Option<u8>,
    pub died_at_tick: Option<u64>,
}

/// Identity and bookkeeping of a ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipInfo {
    pub id: ShipId,
    pub template: ShipTemplateId,
    /// Damage class of this ship (template `ship_type`).
    pub ship_type: String,
    pub source_camp: Option<CampId>,
    pub died_at_tick: Option<u64>,
}

/// A capturable production point. Position and HP are separate components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampInfo {
    pub id: CampId,
    pub camp_type: CampType,
    pub tile_x: i32,
    pub tile_y: i32,
    pub region: Option<RegionId>,
    /// `None` = neutral.
    pub owner: Option<PlayerId>,
    pub captured_at_tick: Option<u64>,
    /// Turret damage per hit.
    pub turret_damage: u32,
    pub queue: VecDeque<ProductionOrder>,
}
