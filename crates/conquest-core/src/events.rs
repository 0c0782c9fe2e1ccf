//! Events emitted by the simulation during a tick, for clients and logs.

use serde::{Deserialize, Serialize};

use crate::ids::*;

/// Something noteworthy that happened during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    /// A unit or camp finished producing.
    UnitProduced {
        camp_id: CampId,
        unit_id: UnitId,
        owner: PlayerId,
    },
    ShipProduced {
        camp_id: CampId,
        ship_id: ShipId,
        owner: PlayerId,
    },
    /// A unit died. `killer` is the owner of the attacker, `None` for neutral turrets.
    UnitKilled {
        unit_id: UnitId,
        owner: PlayerId,
        killer: Option<PlayerId>,
    },
    ShipSunk {
        ship_id: ShipId,
        owner: PlayerId,
        killer: Option<PlayerId>,
    },
    /// A camp dropped to 0 HP and can be captured.
    CampNeutralized {
        camp_id: CampId,
        owner: Option<PlayerId>,
    },
    CampCaptured {
        camp_id: CampId,
        from: Option<PlayerId>,
        to: PlayerId,
    },
    RegionControlChanged {
        region_id: RegionId,
        from: Option<PlayerId>,
        to: Option<PlayerId>,
    },
    IncomePaid { player_id: PlayerId, amount: u32 },
    PlayerSurrendered { player_id: PlayerId },
    PlayerDefeated { player_id: PlayerId },
    GameFinished { winner: Option<PlayerId> },
    GameAbandoned,
}
