//! Tunable rules and per-game settings.

use serde::{Deserialize, Serialize};

use crate::ids::MapId;

/// Balance rules shared by every game a process hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Money every active player receives per payout.
    pub base_income: u32,
    /// Fraction of max HP a camp keeps after capture.
    pub capture_hp_fraction: f64,
    /// Distance (tiles) within which a unit can capture a camp.
    pub capture_radius: f64,
    /// Shots per second of a camp turret.
    pub turret_hit_speed: f64,
    /// Maximum pending orders per camp.
    pub max_queue_len: usize,
    /// Grid spacing (tiles) between units of a formation.
    pub formation_spacing: f64,
    /// Distance (tiles) from a camp at which produced units appear.
    pub spawn_distance: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            base_income: 10,
            capture_hp_fraction: 0.25,
            capture_radius: 1.5,
            turret_hit_speed: 1.0,
            max_queue_len: 5,
            formation_spacing: 1.0,
            spawn_distance: 1.0,
        }
    }
}

impl RulesConfig {
    /// HP a camp with `max_hp` is reset to when captured, in `[1, max_hp]`.
    pub fn capture_hp(&self, max_hp: u32) -> u32 {
        let hp = (f64::from(max_hp) * self.capture_hp_fraction).ceil();
        let hp = if hp.is_finite() && hp > 0.0 { hp as u32 } else { 1 };
        hp.clamp(1, max_hp.max(1))
    }
}

/// Configuration for one simulation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed for AI decisions. Same seed = same simulation.
    pub seed: u64,
    pub rules: RulesConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            rules: RulesConfig::default(),
        }
    }
}

/// Parameters chosen when a game is created in the lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub name: String,
    pub map_id: MapId,
    pub max_players: u8,
    /// Game speed multiplier (1.0 = normal).
    pub speed: f64,
    pub starting_money: u32,
    /// Seconds of game time between payouts.
    pub money_interval_secs: f64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            name: "Skirmish".into(),
            map_id: MapId(1),
            max_players: 2,
            speed: 1.0,
            starting_money: 100,
            money_interval_secs: 30.0,
        }
    }
}
