//! Player commands submitted to the simulation.
//!
//! Commands are validated when submitted and queued for processing at the
//! next tick boundary.

use serde::{Deserialize, Serialize};

use crate::ids::*;

/// All possible player actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerCommand {
    // --- Movement ---
    /// Send units toward a point. Several units spread into a formation.
    Move {
        unit_ids: Vec<UnitId>,
        target_x: f64,
        target_y: f64,
    },
    /// Send every living unit of a control group toward a point.
    MoveGroup { group: u8, target_x: f64, target_y: f64 },
    /// Send ships toward a point on water.
    MoveShips {
        ship_ids: Vec<ShipId>,
        target_x: f64,
        target_y: f64,
    },

    // --- Organisation ---
    /// Assign a unit to a control group, or clear it with `None`.
    SetGroup { unit_id: UnitId, group: Option<u8> },

    // --- Production ---
    /// Queue a unit build at an owned camp. The price is reserved immediately.
    EnqueueProduction {
        camp_id: CampId,
        template_id: UnitTemplateId,
    },
    /// Queue a ship build at an owned harbor camp.
    EnqueueShip {
        camp_id: CampId,
        template_id: ShipTemplateId,
    },

    // --- Game ---
    /// Leave the match. Remaining units disband, camps turn neutral.
    Surrender,
}

impl PlayerCommand {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            PlayerCommand::Move { .. } => "move",
            PlayerCommand::MoveGroup { .. } => "move_group",
            PlayerCommand::MoveShips { .. } => "move_ships",
            PlayerCommand::SetGroup { .. } => "set_group",
            PlayerCommand::EnqueueProduction { .. } => "enqueue_production",
            PlayerCommand::EnqueueShip { .. } => "enqueue_ship",
            PlayerCommand::Surrender => "surrender",
        }
    }
}

/// A command tagged with who sent it and when it arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub player_id: PlayerId,
    pub connection_id: ConnectionId,
    /// Arrival timestamp assigned by the network layer (microseconds,
    /// monotonic within the process).
    pub received_at_us: u64,
    pub command: PlayerCommand,
}

impl CommandEnvelope {
    pub fn new(player_id: PlayerId, connection_id: ConnectionId, received_at_us: u64, command: PlayerCommand) -> Self {
        Self {
            player_id,
            connection_id,
            received_at_us,
            command,
        }
    }
}
