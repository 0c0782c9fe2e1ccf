//! Simulation constants.
//!
//! Balance values that designers tune per deployment live in
//! [`crate::config::RulesConfig`]; what remains here is fixed by the engine.

/// Simulation tick rate (Hz).
pub const TICK_RATE: u32 = 10;

/// Seconds per tick at 1x game speed.
pub const DT: f64 = 1.0 / TICK_RATE as f64;

/// Damage class used in modifier tables when the defender is a camp.
pub const CAMP_DAMAGE_CLASS: &str = "camp";

/// Highest control group number a player can assign.
pub const MAX_CONTROL_GROUP: u8 = 9;

/// Distance under which a moving entity snaps onto its target (tiles).
pub const ARRIVAL_EPSILON: f64 = 0.05;

/// Below this speed (tiles per tick) an entity is considered idle for facing.
pub const IDLE_SPEED_EPSILON: f64 = 1e-6;

/// Player colors, assigned by player number (1-based, wrapping).
pub const PLAYER_COLORS: [&str; 8] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f1c40f", "#9b59b6", "#e67e22", "#1abc9c", "#ecf0f1",
];

/// Color for the given 1-based player number.
pub fn player_color(player_number: u8) -> &'static str {
    let idx = usize::from(player_number.saturating_sub(1)) % PLAYER_COLORS.len();
    PLAYER_COLORS[idx]
}
