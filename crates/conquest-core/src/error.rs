//! Error taxonomy for rejected operations.
//!
//! None of these errors mutate state: every operation validates before it
//! writes.

use std::fmt;

use thiserror::Error;

use crate::enums::{GameStatus, PlayerStatus};
use crate::ids::*;

/// Reference to any entity an operation can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Game(GameId),
    Player(PlayerId),
    Camp(CampId),
    Unit(UnitId),
    Ship(ShipId),
    Region(RegionId),
    UnitTemplate(UnitTemplateId),
    ShipTemplate(ShipTemplateId),
    Map(MapId),
    ControlGroup(u8),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Game(id) => id.fmt(f),
            EntityRef::Player(id) => id.fmt(f),
            EntityRef::Camp(id) => id.fmt(f),
            EntityRef::Unit(id) => id.fmt(f),
            EntityRef::Ship(id) => id.fmt(f),
            EntityRef::Region(id) => id.fmt(f),
            EntityRef::UnitTemplate(id) => id.fmt(f),
            EntityRef::ShipTemplate(id) => id.fmt(f),
            EntityRef::Map(id) => id.fmt(f),
            EntityRef::ControlGroup(n) => write!(f, "group#{n}"),
        }
    }
}

/// Why a command was refused even though the issuer is entitled to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateViolation {
    #[error("game is {0:?}, expected in_progress")]
    GameNotInProgress(GameStatus),
    #[error("game is {0:?}, lobby is closed")]
    LobbyClosed(GameStatus),
    #[error("{joined} players joined, at least {needed} needed")]
    NotEnoughPlayers { needed: usize, joined: usize },
    #[error("player is {0:?}")]
    PlayerInactive(PlayerStatus),
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u32, available: u32 },
    #[error("production queue is full ({0} orders)")]
    QueueFull(usize),
    #[error("camp cannot build this template")]
    NotProducible,
    #[error("camp is disabled (0 HP)")]
    CampDisabled,
    #[error("target ({x}, {y}) is not reachable")]
    UnreachableTarget { x: f64, y: f64 },
    #[error("no units selected")]
    EmptySelection,
    #[error("control group {0} is out of range")]
    InvalidGroup(u8),
    #[error("illegal game status transition {from:?} -> {to:?}")]
    IllegalGameTransition { from: GameStatus, to: GameStatus },
    #[error("illegal player status transition {from:?} -> {to:?}")]
    IllegalPlayerTransition { from: PlayerStatus, to: PlayerStatus },
    #[error("game is full ({0} players)")]
    GameFull(usize),
    #[error("player number {0} already taken")]
    DuplicatePlayerNumber(u8),
    #[error("map has {available} starting positions, {needed} players")]
    NotEnoughStartingPositions { needed: usize, available: usize },
}

/// Errors returned synchronously to the issuer of an operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Unknown id, dead entity, or an id that belongs to another game.
    #[error("{0} not found")]
    NotFound(EntityRef),
    /// The issuer does not own the referenced entity.
    #[error("{player} does not control {entity}")]
    Unauthorized { player: PlayerId, entity: EntityRef },
    #[error("invalid state: {0}")]
    InvalidState(#[from] StateViolation),
}

impl SimError {
    /// Entity-level failures that can appear between acceptance and
    /// application of a command, when a unit dies or a camp changes hands.
    pub fn is_stale_reference(&self) -> bool {
        matches!(
            self,
            SimError::NotFound(
                EntityRef::Unit(_) | EntityRef::Ship(_) | EntityRef::Camp(_)
            ) | SimError::Unauthorized { .. }
                | SimError::InvalidState(StateViolation::CampDisabled)
                | SimError::InvalidState(StateViolation::EmptySelection)
        )
    }
}
