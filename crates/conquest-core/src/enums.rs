//! Enumeration types used throughout the simulation.

use serde::{Deserialize, Serialize};

/// Lifecycle of a game. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby open, players joining.
    #[default]
    Waiting,
    /// Simulation running.
    InProgress,
    /// Ended with a result.
    Finished,
    /// Ended without a result (everyone left).
    Abandoned,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Finished | GameStatus::Abandoned)
    }

    /// Whether `self -> next` is a legal status transition.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Waiting, GameStatus::InProgress)
                | (GameStatus::Waiting, GameStatus::Abandoned)
                | (GameStatus::InProgress, GameStatus::Finished)
                | (GameStatus::InProgress, GameStatus::Abandoned)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::InProgress => "in_progress",
            GameStatus::Finished => "finished",
            GameStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(GameStatus::Waiting),
            "in_progress" => Some(GameStatus::InProgress),
            "finished" => Some(GameStatus::Finished),
            "abandoned" => Some(GameStatus::Abandoned),
            _ => None,
        }
    }
}

/// Participation state of a player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    #[default]
    Active,
    Surrendered,
    Defeated,
    /// Connection lost; may come back.
    Disconnected,
}

impl PlayerStatus {
    /// Surrendered and defeated players are out of the game for good.
    pub fn is_eliminated(self) -> bool {
        matches!(self, PlayerStatus::Surrendered | PlayerStatus::Defeated)
    }

    pub fn can_transition_to(self, next: PlayerStatus) -> bool {
        match (self, next) {
            (PlayerStatus::Active, PlayerStatus::Active) => false,
            (PlayerStatus::Active, _) => true,
            (PlayerStatus::Disconnected, PlayerStatus::Active)
            | (PlayerStatus::Disconnected, PlayerStatus::Surrendered)
            | (PlayerStatus::Disconnected, PlayerStatus::Defeated) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerStatus::Active => "active",
            PlayerStatus::Surrendered => "surrendered",
            PlayerStatus::Defeated => "defeated",
            PlayerStatus::Disconnected => "disconnected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PlayerStatus::Active),
            "surrendered" => Some(PlayerStatus::Surrendered),
            "defeated" => Some(PlayerStatus::Defeated),
            "disconnected" => Some(PlayerStatus::Disconnected),
            _ => None,
        }
    }
}

/// What a camp can build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampType {
    /// Builds standard (non-advanced) units.
    #[default]
    Standard,
    /// Neutral outpost: once captured, also builds advanced units.
    Neutral,
    /// Coastal camp: builds ships.
    Harbor,
}

impl CampType {
    /// Whether a camp of this type can produce a land unit.
    pub fn builds_unit(self, advanced: bool) -> bool {
        match self {
            CampType::Standard => !advanced,
            CampType::Neutral => true,
            CampType::Harbor => false,
        }
    }

    pub fn builds_ships(self) -> bool {
        self == CampType::Harbor
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CampType::Standard => "standard",
            CampType::Neutral => "neutral",
            CampType::Harbor => "harbor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(CampType::Standard),
            "neutral" => Some(CampType::Neutral),
            "harbor" => Some(CampType::Harbor),
            _ => None,
        }
    }
}

/// Isometric sprite facing, bucketed from the movement angle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Back,
    BackSide,
    #[default]
    Side,
    FrontSide,
    Front,
}

impl Facing {
    pub fn as_str(self) -> &'static str {
        match self {
            Facing::Back => "back",
            Facing::BackSide => "back_side",
            Facing::Side => "side",
            Facing::FrontSide => "front_side",
            Facing::Front => "front",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "back" => Some(Facing::Back),
            "back_side" => Some(Facing::BackSide),
            "side" => Some(Facing::Side),
            "front_side" => Some(Facing::FrontSide),
            "front" => Some(Facing::Front),
            _ => None,
        }
    }
}

/// Strength of a computer-controlled player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiDifficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl AiDifficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            AiDifficulty::Easy => "easy",
            AiDifficulty::Normal => "normal",
            AiDifficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(AiDifficulty::Easy),
            "normal" => Some(AiDifficulty::Normal),
            "hard" => Some(AiDifficulty::Hard),
            _ => None,
        }
    }
}

/// Terrain of a single map tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    #[default]
    Grass,
    Sand,
    Road,
    Water,
    Mountain,
    Forest,
}

impl TileKind {
    /// Land units may stand here.
    pub fn is_walkable(self) -> bool {
        matches!(self, TileKind::Grass | TileKind::Sand | TileKind::Road)
    }

    /// Ships may sail here.
    pub fn is_navigable(self) -> bool {
        self == TileKind::Water
    }
}

/// Which family of combatant an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    Unit,
    Ship,
}
