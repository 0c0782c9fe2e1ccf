//! Strongly typed identifiers.
//!
//! Entity ids (players, camps, units, ships) are allocated by the simulation
//! engine and are unique within one game. Template, map and region ids come
//! from the static catalogs.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// A running or persisted match.
    GameId(u64),
    "game"
);
id_type!(
    /// A registered account. Absent for AI players.
    UserId(u64),
    "user"
);
id_type!(
    /// A participant of one game.
    PlayerId(u64),
    "player"
);
id_type!(CampId(u64), "camp");
id_type!(UnitId(u64), "unit");
id_type!(ShipId(u64), "ship");
id_type!(RegionId(u32), "region");
id_type!(UnitTemplateId(u32), "unit-template");
id_type!(ShipTemplateId(u32), "ship-template");
id_type!(MapId(u32), "map");

/// Identifies the network connection a command arrived on.
///
/// AI-issued commands use `ConnectionId::LOCAL`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub const LOCAL: ConnectionId = ConnectionId(0);
}
