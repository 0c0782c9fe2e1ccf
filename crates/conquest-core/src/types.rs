//! Fundamental geometric and simulation types.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Continuous 2D position in map space, measured in tiles.
/// x grows along the tile column axis, y along the tile row axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Simulation time tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTime {
    /// Current tick number (increments by 1 each tick).
    pub tick: u64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Position of a tile origin.
    pub fn of_tile(tile_x: i32, tile_y: i32) -> Self {
        Self::new(f64::from(tile_x), f64::from(tile_y))
    }

    /// Euclidean distance to another position, in tiles.
    pub fn distance_to(&self, other: &Position) -> f64 {
        self.as_vec().distance(other.as_vec())
    }

    pub fn as_vec(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }

    pub fn from_vec(v: DVec2) -> Self {
        Self::new(v.x, v.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl SimTime {
    /// Seconds per tick at 1x game speed.
    pub fn dt(&self) -> f64 {
        crate::constants::DT
    }

    /// Advance by one tick.
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    /// Elapsed simulated seconds at 1x speed.
    pub fn elapsed_secs(&self) -> f64 {
        self.tick as f64 * self.dt()
    }
}

/// Convert a duration in game seconds to a whole number of ticks at the given
/// game speed. Never returns less than one tick.
pub fn secs_to_ticks(secs: f64, game_speed: f64) -> u64 {
    let speed = if game_speed > 0.0 { game_speed } else { 1.0 };
    let ticks = (secs * f64::from(crate::constants::TICK_RATE) / speed).ceil();
    if ticks.is_finite() && ticks >= 1.0 {
        ticks as u64
    } else {
        1
    }
}

/// Ticks between two attacks for an attacker striking `hit_speed` times per
/// second. Non-positive rates never become ready again in practice.
pub fn hit_interval_ticks(hit_speed: f64, game_speed: f64) -> u64 {
    if hit_speed > 0.0 && hit_speed.is_finite() {
        secs_to_ticks(1.0 / hit_speed, game_speed)
    } else {
        u64::MAX / 2
    }
}
