//! Database rows and their conversions to and from typed records.
//!
//! SQLite stores every integer as i64. Conversions back into records check
//! ranges and enum spellings and report `CorruptRow` rather than guessing.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use conquest_core::enums::*;
use conquest_core::ids::*;
use conquest_core::records::*;
use conquest_core::types::Position;

use crate::error::PersistError;

fn int<T: TryFrom<i64>>(table: &'static str, field: &str, value: i64) -> Result<T, PersistError> {
    T::try_from(value).map_err(|_| PersistError::corrupt(table, format!("{field} out of range: {value}")))
}

fn opt_int<T: TryFrom<i64>>(
    table: &'static str,
    field: &str,
    value: Option<i64>,
) -> Result<Option<T>, PersistError> {
    value.map(|v| int(table, field, v)).transpose()
}

/// Ticks and ids are u64 in memory; anything past i64::MAX saturates.
pub(crate) fn wide(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn target(x: Option<f64>, y: Option<f64>) -> Option<Position> {
    match (x, y) {
        (Some(x), Some(y)) => Some(Position::new(x, y)),
        _ => None,
    }
}

fn facing(table: &'static str, value: &str) -> Result<Facing, PersistError> {
    Facing::parse(value).ok_or_else(|| PersistError::corrupt(table, format!("unknown facing {value:?}")))
}

// ---- games ----

#[derive(Debug, Clone, FromRow)]
pub struct GameRow {
    pub id: i64,
    pub host_user_id: Option<i64>,
    pub map_id: i64,
    pub name: String,
    pub max_players: i64,
    pub status: String,
    pub speed: f64,
    pub starting_money: i64,
    pub money_interval_secs: f64,
    pub winner_id: Option<i64>,
    pub started_at_tick: Option<i64>,
    pub ended_at_tick: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A game as stored, with its wall-clock lifecycle stamps.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGame {
    pub record: GameRecord,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<GameRow> for StoredGame {
    type Error = PersistError;

    fn try_from(row: GameRow) -> Result<Self, Self::Error> {
        const T: &str = "games";
        let status = GameStatus::parse(&row.status)
            .ok_or_else(|| PersistError::corrupt(T, format!("unknown status {:?}", row.status)))?;
        Ok(StoredGame {
            record: GameRecord {
                id: GameId(int(T, "id", row.id)?),
                host_user_id: opt_int(T, "host_user_id", row.host_user_id)?.map(UserId),
                map_id: MapId(int(T, "map_id", row.map_id)?),
                name: row.name,
                max_players: int(T, "max_players", row.max_players)?,
                status,
                speed: row.speed,
                starting_money: int(T, "starting_money", row.starting_money)?,
                money_interval_secs: row.money_interval_secs,
                winner_id: opt_int(T, "winner_id", row.winner_id)?.map(PlayerId),
                started_at_tick: opt_int(T, "started_at_tick", row.started_at_tick)?,
                ended_at_tick: opt_int(T, "ended_at_tick", row.ended_at_tick)?,
            },
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

/// Lobby listing entry.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct GameSummaryRow {
    pub id: i64,
    pub name: String,
    pub map_id: i64,
    pub max_players: i64,
    pub status: String,
    pub current_players: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub id: GameId,
    pub name: String,
    pub map_id: MapId,
    pub max_players: u8,
    pub status: GameStatus,
    /// Players still active in the game.
    pub current_players: u32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<GameSummaryRow> for GameSummary {
    type Error = PersistError;

    fn try_from(row: GameSummaryRow) -> Result<Self, Self::Error> {
        const T: &str = "games";
        Ok(GameSummary {
            id: GameId(int(T, "id", row.id)?),
            name: row.name,
            map_id: MapId(int(T, "map_id", row.map_id)?),
            max_players: int(T, "max_players", row.max_players)?,
            status: GameStatus::parse(&row.status)
                .ok_or_else(|| PersistError::corrupt(T, format!("unknown status {:?}", row.status)))?,
            current_players: int(T, "current_players", row.current_players)?,
            created_at: row.created_at,
        })
    }
}

// ---- game_players ----

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PlayerRow {
    pub game_id: i64,
    pub id: i64,
    pub user_id: Option<i64>,
    pub ai_difficulty: Option<String>,
    pub player_number: i64,
    pub display_name: String,
    pub color: String,
    pub money: i64,
    pub status: String,
    pub units_killed: i64,
    pub units_lost: i64,
    pub camps_captured: i64,
    pub camps_lost: i64,
    pub left_at_tick: Option<i64>,
}

impl From<&PlayerRecord> for PlayerRow {
    fn from(p: &PlayerRecord) -> Self {
        PlayerRow {
            game_id: wide(p.game_id.0),
            id: wide(p.id.0),
            user_id: p.user_id.map(|u| wide(u.0)),
            ai_difficulty: p.ai_difficulty.map(|d| d.as_str().to_string()),
            player_number: i64::from(p.player_number),
            display_name: p.display_name.clone(),
            color: p.color.clone(),
            money: i64::from(p.money),
            status: p.status.as_str().to_string(),
            units_killed: i64::from(p.stats.units_killed),
            units_lost: i64::from(p.stats.units_lost),
            camps_captured: i64::from(p.stats.camps_captured),
            camps_lost: i64::from(p.stats.camps_lost),
            left_at_tick: p.left_at_tick.map(wide),
        }
    }
}

impl TryFrom<PlayerRow> for PlayerRecord {
    type Error = PersistError;

    fn try_from(row: PlayerRow) -> Result<Self, Self::Error> {
        const T: &str = "game_players";
        let ai_difficulty = match row.ai_difficulty.as_deref() {
            None => None,
            Some(s) => Some(
                AiDifficulty::parse(s)
                    .ok_or_else(|| PersistError::corrupt(T, format!("unknown ai_difficulty {s:?}")))?,
            ),
        };
        Ok(PlayerRecord {
            id: PlayerId(int(T, "id", row.id)?),
            game_id: GameId(int(T, "game_id", row.game_id)?),
            user_id: opt_int(T, "user_id", row.user_id)?.map(UserId),
            ai_difficulty,
            player_number: int(T, "player_number", row.player_number)?,
            display_name: row.display_name,
            color: row.color,
            money: int(T, "money", row.money)?,
            status: PlayerStatus::parse(&row.status)
                .ok_or_else(|| PersistError::corrupt(T, format!("unknown status {:?}", row.status)))?,
            stats: PlayerStats {
                units_killed: int(T, "units_killed", row.units_killed)?,
                units_lost: int(T, "units_lost", row.units_lost)?,
                camps_captured: int(T, "camps_captured", row.camps_captured)?,
                camps_lost: int(T, "camps_lost", row.camps_lost)?,
            },
            left_at_tick: opt_int(T, "left_at_tick", row.left_at_tick)?,
        })
    }
}

// ---- game_camps ----

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CampRow {
    pub game_id: i64,
    pub id: i64,
    pub owner_id: Option<i64>,
    pub tile_x: i64,
    pub tile_y: i64,
    pub camp_type: String,
    pub region_id: Option<i64>,
    pub current_hp: i64,
    pub max_hp: i64,
    pub turret_damage: i64,
    pub turret_range: f64,
    pub captured_at_tick: Option<i64>,
    /// JSON array of pending orders.
    pub production_queue: String,
}

impl TryFrom<&CampRecord> for CampRow {
    type Error = PersistError;

    fn try_from(c: &CampRecord) -> Result<Self, Self::Error> {
        let production_queue = serde_json::to_string(&c.production_queue)
            .map_err(|e| PersistError::corrupt("game_camps", e.to_string()))?;
        Ok(CampRow {
            game_id: wide(c.game_id.0),
            id: wide(c.id.0),
            owner_id: c.owner_id.map(|o| wide(o.0)),
            tile_x: i64::from(c.tile_x),
            tile_y: i64::from(c.tile_y),
            camp_type: c.camp_type.as_str().to_string(),
            region_id: c.region_id.map(|r| i64::from(r.0)),
            current_hp: i64::from(c.current_hp),
            max_hp: i64::from(c.max_hp),
            turret_damage: i64::from(c.turret_damage),
            turret_range: c.turret_range,
            captured_at_tick: c.captured_at_tick.map(wide),
            production_queue,
        })
    }
}

impl TryFrom<CampRow> for CampRecord {
    type Error = PersistError;

    fn try_from(row: CampRow) -> Result<Self, Self::Error> {
        const T: &str = "game_camps";
        let production_queue: Vec<ProductionOrder> = serde_json::from_str(&row.production_queue)
            .map_err(|e| PersistError::corrupt(T, format!("production_queue: {e}")))?;
        Ok(CampRecord {
            id: CampId(int(T, "id", row.id)?),
            game_id: GameId(int(T, "game_id", row.game_id)?),
            owner_id: opt_int(T, "owner_id", row.owner_id)?.map(PlayerId),
            tile_x: int(T, "tile_x", row.tile_x)?,
            tile_y: int(T, "tile_y", row.tile_y)?,
            camp_type: CampType::parse(&row.camp_type)
                .ok_or_else(|| PersistError::corrupt(T, format!("unknown camp_type {:?}", row.camp_type)))?,
            region_id: opt_int(T, "region_id", row.region_id)?.map(RegionId),
            current_hp: int(T, "current_hp", row.current_hp)?,
            max_hp: int(T, "max_hp", row.max_hp)?,
            turret_damage: int(T, "turret_damage", row.turret_damage)?,
            turret_range: row.turret_range,
            captured_at_tick: opt_int(T, "captured_at_tick", row.captured_at_tick)?,
            production_queue,
        })
    }
}

// ---- game_units ----

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UnitRow {
    pub game_id: i64,
    pub id: i64,
    pub owner_id: i64,
    pub unit_template_id: i64,
    pub position_x: f64,
    pub position_y: f64,
    pub current_hp: i64,
    pub target_x: Option<f64>,
    pub target_y: Option<f64>,
    pub is_alive: bool,
    pub source_camp_id: Option<i64>,
    pub group_number: Option<i64>,
    pub died_at_tick: Option<i64>,
    pub facing: String,
    pub mirrored: bool,
}

impl From<&UnitRecord> for UnitRow {
    fn from(u: &UnitRecord) -> Self {
        UnitRow {
            game_id: wide(u.game_id.0),
            id: wide(u.id.0),
            owner_id: wide(u.owner_id.0),
            unit_template_id: i64::from(u.template_id.0),
            position_x: u.position.x,
            position_y: u.position.y,
            current_hp: i64::from(u.current_hp),
            target_x: u.target.map(|t| t.x),
            target_y: u.target.map(|t| t.y),
            is_alive: u.is_alive,
            source_camp_id: u.source_camp_id.map(|c| wide(c.0)),
            group_number: u.group_number.map(i64::from),
            died_at_tick: u.died_at_tick.map(wide),
            facing: u.facing.as_str().to_string(),
            mirrored: u.mirrored,
        }
    }
}

impl TryFrom<UnitRow> for UnitRecord {
    type Error = PersistError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        const T: &str = "game_units";
        Ok(UnitRecord {
            id: UnitId(int(T, "id", row.id)?),
            game_id: GameId(int(T, "game_id", row.game_id)?),
            owner_id: PlayerId(int(T, "owner_id", row.owner_id)?),
            template_id: UnitTemplateId(int(T, "unit_template_id", row.unit_template_id)?),
            position: Position::new(row.position_x, row.position_y),
            current_hp: int(T, "current_hp", row.current_hp)?,
            target: target(row.target_x, row.target_y),
            is_alive: row.is_alive,
            source_camp_id: opt_int(T, "source_camp_id", row.source_camp_id)?.map(CampId),
            group_number: opt_int(T, "group_number", row.group_number)?,
            died_at_tick: opt_int(T, "died_at_tick", row.died_at_tick)?,
            facing: facing(T, &row.facing)?,
            mirrored: row.mirrored,
        })
    }
}

// ---- game_ships ----

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ShipRow {
    pub game_id: i64,
    pub id: i64,
    pub owner_id: i64,
    pub ship_template_id: i64,
    pub position_x: f64,
    pub position_y: f64,
    pub current_hp: i64,
    pub target_x: Option<f64>,
    pub target_y: Option<f64>,
    pub is_alive: bool,
    pub source_camp_id: Option<i64>,
    pub died_at_tick: Option<i64>,
    pub facing: String,
    pub mirrored: bool,
}

impl From<&ShipRecord> for ShipRow {
    fn from(s: &ShipRecord) -> Self {
        ShipRow {
            game_id: wide(s.game_id.0),
            id: wide(s.id.0),
            owner_id: wide(s.owner_id.0),
            ship_template_id: i64::from(s.template_id.0),
            position_x: s.position.x,
            position_y: s.position.y,
            current_hp: i64::from(s.current_hp),
            target_x: s.target.map(|t| t.x),
            target_y: s.target.map(|t| t.y),
            is_alive: s.is_alive,
            source_camp_id: s.source_camp_id.map(|c| wide(c.0)),
            died_at_tick: s.died_at_tick.map(wide),
            facing: s.facing.as_str().to_string(),
            mirrored: s.mirrored,
        }
    }
}

impl TryFrom<ShipRow> for ShipRecord {
    type Error = PersistError;

    fn try_from(row: ShipRow) -> Result<Self, Self::Error> {
        const T: &str = "game_ships";
        Ok(ShipRecord {
            id: ShipId(int(T, "id", row.id)?),
            game_id: GameId(int(T, "game_id", row.game_id)?),
            owner_id: PlayerId(int(T, "owner_id", row.owner_id)?),
            template_id: ShipTemplateId(int(T, "ship_template_id", row.ship_template_id)?),
            position: Position::new(row.position_x, row.position_y),
            current_hp: int(T, "current_hp", row.current_hp)?,
            target: target(row.target_x, row.target_y),
            is_alive: row.is_alive,
            source_camp_id: opt_int(T, "source_camp_id", row.source_camp_id)?.map(CampId),
            died_at_tick: opt_int(T, "died_at_tick", row.died_at_tick)?,
            facing: facing(T, &row.facing)?,
            mirrored: row.mirrored,
        })
    }
}

// ---- game_region_control ----

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RegionControlRow {
    pub game_id: i64,
    pub region_id: i64,
    pub owner_id: Option<i64>,
    pub changed_at_tick: i64,
}

impl From<&RegionControlRecord> for RegionControlRow {
    fn from(r: &RegionControlRecord) -> Self {
        RegionControlRow {
            game_id: wide(r.game_id.0),
            region_id: i64::from(r.region_id.0),
            owner_id: r.owner_id.map(|o| wide(o.0)),
            changed_at_tick: wide(r.changed_at_tick),
        }
    }
}

impl TryFrom<RegionControlRow> for RegionControlRecord {
    type Error = PersistError;

    fn try_from(row: RegionControlRow) -> Result<Self, Self::Error> {
        const T: &str = "game_region_control";
        Ok(RegionControlRecord {
            game_id: GameId(int(T, "game_id", row.game_id)?),
            region_id: RegionId(int(T, "region_id", row.region_id)?),
            owner_id: opt_int(T, "owner_id", row.owner_id)?.map(PlayerId),
            changed_at_tick: int(T, "changed_at_tick", row.changed_at_tick)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_money_is_corrupt() {
        let row = PlayerRow {
            game_id: 1,
            id: 1,
            user_id: None,
            ai_difficulty: Some("hard".into()),
            player_number: 1,
            display_name: "Bot".into(),
            color: "#e74c3c".into(),
            money: -5,
            status: "active".into(),
            units_killed: 0,
            units_lost: 0,
            camps_captured: 0,
            camps_lost: 0,
            left_at_tick: None,
        };
        let err = PlayerRecord::try_from(row).unwrap_err();
        assert!(matches!(err, PersistError::CorruptRow { table: "game_players", .. }));
    }

    #[test]
    fn half_set_target_reads_as_none() {
        assert_eq!(target(Some(1.0), None), None);
        assert_eq!(target(Some(1.0), Some(2.0)), Some(Position::new(1.0, 2.0)));
    }

    #[test]
    fn camp_queue_survives_storage() {
        let camp = CampRecord {
            id: CampId(4),
            game_id: GameId(2),
            owner_id: Some(PlayerId(1)),
            tile_x: 3,
            tile_y: 6,
            camp_type: CampType::Harbor,
            region_id: Some(RegionId(1)),
            current_hp: 120,
            max_hp: 250,
            turret_damage: 10,
            turret_range: 3.0,
            captured_at_tick: Some(40),
            production_queue: vec![ProductionOrder {
                item: ProductionItem::Ship(ShipTemplateId(2)),
                completes_at_tick: 180,
            }],
        };
        let row = CampRow::try_from(&camp).unwrap();
        assert!(row.production_queue.contains("ship"));
        assert_eq!(CampRecord::try_from(row).unwrap(), camp);
    }

    #[test]
    fn unknown_enum_spelling_is_corrupt() {
        let row = RegionControlRow {
            game_id: 1,
            region_id: -1,
            owner_id: None,
            changed_at_tick: 0,
        };
        assert!(RegionControlRecord::try_from(row).is_err());
    }
}
