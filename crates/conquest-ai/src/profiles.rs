//! Difficulty-specific behavioral profiles.

use conquest_core::enums::AiDifficulty;

/// Tuning for one difficulty level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiProfile {
    /// Ticks between two planning rounds.
    pub decision_interval_ticks: u64,
    /// Money the planner never spends.
    pub money_reserve: u32,
    /// Idle units needed before an attack is launched.
    pub attack_group_size: usize,
    /// Orders the planner keeps queued per camp.
    pub max_orders_per_camp: usize,
}

/// Get the profile for a difficulty.
pub fn profile_for(difficulty: AiDifficulty) -> AiProfile {
    match difficulty {
        AiDifficulty::Easy => AiProfile {
            decision_interval_ticks: 50,
            money_reserve: 60,
            attack_group_size: 6,
            max_orders_per_camp: 1,
        },
        AiDifficulty::Normal => AiProfile {
            decision_interval_ticks: 30,
            money_reserve: 30,
            attack_group_size: 4,
            max_orders_per_camp: 2,
        },
        AiDifficulty::Hard => AiProfile {
            decision_interval_ticks: 15,
            money_reserve: 0,
            attack_group_size: 3,
            max_orders_per_camp: 3,
        },
    }
}
