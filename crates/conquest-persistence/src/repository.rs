//! Game repository: typed reads and batched writes over the SQLite pool.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::QueryBuilder;
use tracing::{debug, warn};

use conquest_core::config::GameSettings;
use conquest_core::enums::{GameStatus, PlayerStatus};
use conquest_core::ids::*;
use conquest_core::records::*;

use crate::db;
use crate::error::PersistError;
use crate::rows::*;

/// Rows per multi-row INSERT. Keeps the bind count well under SQLite's limit.
const BATCH_ROWS: usize = 200;

const GAME_COLUMNS: &str = "id, host_user_id, map_id, name, max_players, status, speed, \
     starting_money, money_interval_secs, winner_id, started_at_tick, ended_at_tick, \
     created_at, started_at, ended_at";

const PLAYER_COLUMNS: &[&str] = &[
    "game_id",
    "id",
    "user_id",
    "ai_difficulty",
    "player_number",
    "display_name",
    "color",
    "money",
    "status",
    "units_killed",
    "units_lost",
    "camps_captured",
    "camps_lost",
    "left_at_tick",
];

const CAMP_COLUMNS: &[&str] = &[
    "game_id",
    "id",
    "owner_id",
    "tile_x",
    "tile_y",
    "camp_type",
    "region_id",
    "current_hp",
    "max_hp",
    "turret_damage",
    "turret_range",
    "captured_at_tick",
    "production_queue",
];

const UNIT_COLUMNS: &[&str] = &[
    "game_id",
    "id",
    "owner_id",
    "unit_template_id",
    "position_x",
    "position_y",
    "current_hp",
    "target_x",
    "target_y",
    "is_alive",
    "source_camp_id",
    "group_number",
    "died_at_tick",
    "facing",
    "mirrored",
];

const SHIP_COLUMNS: &[&str] = &[
    "game_id",
    "id",
    "owner_id",
    "ship_template_id",
    "position_x",
    "position_y",
    "current_hp",
    "target_x",
    "target_y",
    "is_alive",
    "source_camp_id",
    "died_at_tick",
    "facing",
    "mirrored",
];

const REGION_COLUMNS: &[&str] = &["game_id", "region_id", "owner_id", "changed_at_tick"];

/// Everything stored for one game, as loaded on resume.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedGame {
    pub game: StoredGame,
    pub players: Vec<PlayerRecord>,
    pub camps: Vec<CampRecord>,
    /// Living units only.
    pub units: Vec<UnitRecord>,
    /// Living ships only.
    pub ships: Vec<ShipRecord>,
    pub region_control: Vec<RegionControlRecord>,
}

/// Counter increments applied by `increment_player_stats`.
pub type StatsIncrement = PlayerStats;

#[derive(Debug, Clone)]
pub struct GameRepository {
    pool: SqlitePool,
    slow_query: Duration,
}

impl GameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_slow_query(pool, Duration::from_millis(100))
    }

    pub fn with_slow_query(pool: SqlitePool, slow_query: Duration) -> Self {
        Self { pool, slow_query }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn timed<T, E, F>(&self, op: &'static str, fut: F) -> Result<T, PersistError>
    where
        F: Future<Output = Result<T, E>>,
        PersistError: From<E>,
    {
        let started = Instant::now();
        let out = fut.await;
        let elapsed = started.elapsed();
        if elapsed >= self.slow_query {
            warn!(op, elapsed_ms = elapsed.as_millis() as u64, "slow query");
        }
        Ok(out?)
    }

    pub async fn health_check(&self) -> Result<(), PersistError> {
        db::health_check(&self.pool).await
    }

    // ---- games ----

    /// Insert a new lobby game and return its record.
    pub async fn create_game(
        &self,
        settings: &GameSettings,
        host_user_id: Option<UserId>,
    ) -> Result<GameRecord, PersistError> {
        let id: i64 = self
            .timed(
                "create_game",
                sqlx::query_scalar(
                    "INSERT INTO games (host_user_id, map_id, name, max_players, status, speed, \
                     starting_money, money_interval_secs, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                )
                .bind(host_user_id.map(|u| wide(u.0)))
                .bind(i64::from(settings.map_id.0))
                .bind(settings.name.as_str())
                .bind(i64::from(settings.max_players))
                .bind(GameStatus::Waiting.as_str())
                .bind(settings.speed)
                .bind(i64::from(settings.starting_money))
                .bind(settings.money_interval_secs)
                .bind(Utc::now())
                .fetch_one(&self.pool),
            )
            .await?;
        let id = u64::try_from(id).map_err(|_| PersistError::corrupt("games", format!("id {id}")))?;
        debug!(game_id = id, name = %settings.name, "game created");
        Ok(GameRecord::waiting(GameId(id), host_user_id, settings))
    }

    pub async fn find_game(&self, game_id: GameId) -> Result<Option<StoredGame>, PersistError> {
        let row: Option<GameRow> = self
            .timed(
                "find_game",
                sqlx::query_as(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?"))
                    .bind(wide(game_id.0))
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(StoredGame::try_from).transpose()
    }

    /// Waiting and running games, newest first.
    pub async fn list_active_games(&self, limit: u32) -> Result<Vec<GameSummary>, PersistError> {
        let rows: Vec<GameSummaryRow> = self
            .timed(
                "list_active_games",
                sqlx::query_as(
                    "SELECT g.id, g.name, g.map_id, g.max_players, g.status, g.created_at, \
                     (SELECT COUNT(*) FROM game_players p \
                      WHERE p.game_id = g.id AND p.status = 'active') AS current_players \
                     FROM games g \
                     WHERE g.status IN ('waiting', 'in_progress') \
                     ORDER BY g.created_at DESC, g.id DESC \
                     LIMIT ?",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(GameSummary::try_from).collect()
    }

    /// Set the status, stamping start or end time. Returns false if the game
    /// does not exist.
    pub async fn update_status(
        &self,
        game_id: GameId,
        status: GameStatus,
        tick: Option<u64>,
    ) -> Result<bool, PersistError> {
        let now = Utc::now();
        let starting = status == GameStatus::InProgress;
        let ending = status.is_terminal();
        let result = self
            .timed(
                "update_status",
                sqlx::query(
                    "UPDATE games SET status = ?, \
                     started_at = CASE WHEN ? THEN COALESCE(started_at, ?) ELSE started_at END, \
                     started_at_tick = CASE WHEN ? THEN COALESCE(started_at_tick, ?) ELSE started_at_tick END, \
                     ended_at = CASE WHEN ? THEN COALESCE(ended_at, ?) ELSE ended_at END, \
                     ended_at_tick = CASE WHEN ? THEN COALESCE(ended_at_tick, ?) ELSE ended_at_tick END \
                     WHERE id = ?",
                )
                .bind(status.as_str())
                .bind(starting)
                .bind(now)
                .bind(starting)
                .bind(tick.map(wide))
                .bind(ending)
                .bind(now)
                .bind(ending)
                .bind(tick.map(wide))
                .bind(wide(game_id.0))
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the winner. Also marks the game finished.
    pub async fn set_winner(
        &self,
        game_id: GameId,
        winner: PlayerId,
        tick: u64,
    ) -> Result<bool, PersistError> {
        let result = self
            .timed(
                "set_winner",
                sqlx::query(
                    "UPDATE games SET winner_id = ?, status = 'finished', \
                     ended_at = COALESCE(ended_at, ?), ended_at_tick = COALESCE(ended_at_tick, ?) \
                     WHERE id = ?",
                )
                .bind(wide(winner.0))
                .bind(Utc::now())
                .bind(wide(tick))
                .bind(wide(game_id.0))
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- players ----

    pub async fn add_player(&self, player: &PlayerRecord) -> Result<(), PersistError> {
        let mut conn = self.pool.acquire().await?;
        self.timed(
            "add_player",
            upsert_players(&mut conn, std::slice::from_ref(player)),
        )
        .await
    }

    /// Players of a game in seat order.
    pub async fn list_players(&self, game_id: GameId) -> Result<Vec<PlayerRecord>, PersistError> {
        let rows: Vec<PlayerRow> = self
            .timed(
                "list_players",
                sqlx::query_as(&format!(
                    "SELECT {} FROM game_players WHERE game_id = ? ORDER BY player_number",
                    PLAYER_COLUMNS.join(", ")
                ))
                .bind(wide(game_id.0))
                .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(PlayerRecord::try_from).collect()
    }

    /// Add `delta` (possibly negative) to a player's money, clamping at 0.
    /// Returns the new balance, or `None` for an unknown player.
    pub async fn update_player_money(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        delta: i64,
    ) -> Result<Option<u32>, PersistError> {
        let money: Option<i64> = self
            .timed(
                "update_player_money",
                sqlx::query_scalar(
                    "UPDATE game_players SET money = MAX(0, money + ?) \
                     WHERE game_id = ? AND id = ? RETURNING money",
                )
                .bind(delta)
                .bind(wide(game_id.0))
                .bind(wide(player_id.0))
                .fetch_optional(&self.pool),
            )
            .await?;
        money
            .map(|m| {
                u32::try_from(m)
                    .map_err(|_| PersistError::corrupt("game_players", format!("money {m}")))
            })
            .transpose()
    }

    pub async fn update_player_status(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        status: PlayerStatus,
        left_at_tick: Option<u64>,
    ) -> Result<bool, PersistError> {
        let result = self
            .timed(
                "update_player_status",
                sqlx::query(
                    "UPDATE game_players SET status = ?, left_at_tick = COALESCE(?, left_at_tick) \
                     WHERE game_id = ? AND id = ?",
                )
                .bind(status.as_str())
                .bind(left_at_tick.map(wide))
                .bind(wide(game_id.0))
                .bind(wide(player_id.0))
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_player_stats(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        by: StatsIncrement,
    ) -> Result<bool, PersistError> {
        let result = self
            .timed(
                "increment_player_stats",
                sqlx::query(
                    "UPDATE game_players SET units_killed = units_killed + ?, \
                     units_lost = units_lost + ?, camps_captured = camps_captured + ?, \
                     camps_lost = camps_lost + ? WHERE game_id = ? AND id = ?",
                )
                .bind(i64::from(by.units_killed))
                .bind(i64::from(by.units_lost))
                .bind(i64::from(by.camps_captured))
                .bind(i64::from(by.camps_lost))
                .bind(wide(game_id.0))
                .bind(wide(player_id.0))
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- entities ----

    pub async fn upsert_camps(&self, camps: &[CampRecord]) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await?;
        self.timed("upsert_camps", upsert_camps(&mut tx, camps)).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_units(&self, units: &[UnitRecord]) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await?;
        self.timed("upsert_units", upsert_units(&mut tx, units)).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_ships(&self, ships: &[ShipRecord]) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await?;
        self.timed("upsert_ships", upsert_ships(&mut tx, ships)).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_region_control(
        &self,
        regions: &[RegionControlRecord],
    ) -> Result<(), PersistError> {
        let mut tx = self.pool.begin().await?;
        self.timed("upsert_region_control", upsert_region_control(&mut tx, regions))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Write one delta atomically.
    pub async fn apply_delta(&self, delta: &StateDelta) -> Result<(), PersistError> {
        self.apply_deltas(std::slice::from_ref(delta)).await
    }

    /// Write several deltas in a single transaction. Either all land or none.
    pub async fn apply_deltas(&self, deltas: &[StateDelta]) -> Result<(), PersistError> {
        let records: usize = deltas.iter().map(StateDelta::record_count).sum();
        if records == 0 {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for delta in deltas {
            self.timed("apply_delta", apply_delta(&mut tx, delta)).await?;
        }
        tx.commit().await?;
        debug!(deltas = deltas.len(), records, "deltas written");
        Ok(())
    }

    /// Load a game with its living entities.
    pub async fn load_game_state(&self, game_id: GameId) -> Result<Option<LoadedGame>, PersistError> {
        let Some(game) = self.find_game(game_id).await? else {
            return Ok(None);
        };
        let gid = wide(game_id.0);
        let players = self.list_players(game_id).await?;

        let camps: Vec<CampRow> = self
            .timed(
                "load_camps",
                sqlx::query_as(&format!(
                    "SELECT {} FROM game_camps WHERE game_id = ? ORDER BY id",
                    CAMP_COLUMNS.join(", ")
                ))
                .bind(gid)
                .fetch_all(&self.pool),
            )
            .await?;
        let units: Vec<UnitRow> = self
            .timed(
                "load_units",
                sqlx::query_as(&format!(
                    "SELECT {} FROM game_units WHERE game_id = ? AND is_alive = 1 ORDER BY id",
                    UNIT_COLUMNS.join(", ")
                ))
                .bind(gid)
                .fetch_all(&self.pool),
            )
            .await?;
        let ships: Vec<ShipRow> = self
            .timed(
                "load_ships",
                sqlx::query_as(&format!(
                    "SELECT {} FROM game_ships WHERE game_id = ? AND is_alive = 1 ORDER BY id",
                    SHIP_COLUMNS.join(", ")
                ))
                .bind(gid)
                .fetch_all(&self.pool),
            )
            .await?;
        let regions: Vec<RegionControlRow> = self
            .timed(
                "load_region_control",
                sqlx::query_as(&format!(
                    "SELECT {} FROM game_region_control WHERE game_id = ? ORDER BY region_id",
                    REGION_COLUMNS.join(", ")
                ))
                .bind(gid)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(Some(LoadedGame {
            game,
            players,
            camps: camps.into_iter().map(CampRecord::try_from).collect::<Result<_, _>>()?,
            units: units.into_iter().map(UnitRecord::try_from).collect::<Result<_, _>>()?,
            ships: ships.into_iter().map(ShipRecord::try_from).collect::<Result<_, _>>()?,
            region_control: regions
                .into_iter()
                .map(RegionControlRecord::try_from)
                .collect::<Result<_, _>>()?,
        }))
    }

    /// Living units of a player assigned to a control group.
    pub async fn units_by_group(
        &self,
        game_id: GameId,
        player_id: PlayerId,
        group: u8,
    ) -> Result<Vec<UnitRecord>, PersistError> {
        let rows: Vec<UnitRow> = self
            .timed(
                "units_by_group",
                sqlx::query_as(&format!(
                    "SELECT {} FROM game_units \
                     WHERE game_id = ? AND owner_id = ? AND group_number = ? AND is_alive = 1 \
                     ORDER BY id",
                    UNIT_COLUMNS.join(", ")
                ))
                .bind(wide(game_id.0))
                .bind(wide(player_id.0))
                .bind(i64::from(group))
                .fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(UnitRecord::try_from).collect()
    }
}

fn insert_head(table: &str, columns: &[&str]) -> String {
    format!("INSERT INTO {table} ({}) ", columns.join(", "))
}

/// `ON CONFLICT ... DO UPDATE` over every non-key column.
fn upsert_tail(key: &[&str], columns: &[&str]) -> String {
    let sets: Vec<String> = columns
        .iter()
        .filter(|c| !key.contains(c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    format!(" ON CONFLICT ({}) DO UPDATE SET {}", key.join(", "), sets.join(", "))
}

async fn apply_delta(conn: &mut SqliteConnection, delta: &StateDelta) -> Result<(), PersistError> {
    if let Some(game) = &delta.game {
        update_game(conn, game).await?;
    }
    upsert_players(conn, &delta.players).await?;
    upsert_camps(conn, &delta.camps).await?;
    upsert_units(conn, &delta.units).await?;
    upsert_ships(conn, &delta.ships).await?;
    upsert_region_control(conn, &delta.region_control).await
}

/// Mirror the engine's view of the game row. Timestamps are stamped once.
async fn update_game(conn: &mut SqliteConnection, game: &GameRecord) -> Result<(), PersistError> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE games SET status = ?, winner_id = ?, started_at_tick = ?, ended_at_tick = ?, \
         started_at = COALESCE(started_at, ?), ended_at = COALESCE(ended_at, ?) \
         WHERE id = ?",
    )
    .bind(game.status.as_str())
    .bind(game.winner_id.map(|w| wide(w.0)))
    .bind(game.started_at_tick.map(wide))
    .bind(game.ended_at_tick.map(wide))
    .bind(game.started_at_tick.map(|_| now))
    .bind(game.ended_at_tick.map(|_| now))
    .bind(wide(game.id.0))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_players(
    conn: &mut SqliteConnection,
    players: &[PlayerRecord],
) -> Result<(), PersistError> {
    let rows: Vec<PlayerRow> = players.iter().map(PlayerRow::from).collect();
    for chunk in rows.chunks(BATCH_ROWS) {
        let mut qb = QueryBuilder::<Sqlite>::new(insert_head("game_players", PLAYER_COLUMNS));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.game_id)
                .push_bind(r.id)
                .push_bind(r.user_id)
                .push_bind(r.ai_difficulty.clone())
                .push_bind(r.player_number)
                .push_bind(r.display_name.clone())
                .push_bind(r.color.clone())
                .push_bind(r.money)
                .push_bind(r.status.clone())
                .push_bind(r.units_killed)
                .push_bind(r.units_lost)
                .push_bind(r.camps_captured)
                .push_bind(r.camps_lost)
                .push_bind(r.left_at_tick);
        });
        qb.push(upsert_tail(&["game_id", "id"], PLAYER_COLUMNS));
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn upsert_camps(conn: &mut SqliteConnection, camps: &[CampRecord]) -> Result<(), PersistError> {
    let rows = camps.iter().map(CampRow::try_from).collect::<Result<Vec<_>, _>>()?;
    for chunk in rows.chunks(BATCH_ROWS) {
        let mut qb = QueryBuilder::<Sqlite>::new(insert_head("game_camps", CAMP_COLUMNS));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.game_id)
                .push_bind(r.id)
                .push_bind(r.owner_id)
                .push_bind(r.tile_x)
                .push_bind(r.tile_y)
                .push_bind(r.camp_type.clone())
                .push_bind(r.region_id)
                .push_bind(r.current_hp)
                .push_bind(r.max_hp)
                .push_bind(r.turret_damage)
                .push_bind(r.turret_range)
                .push_bind(r.captured_at_tick)
                .push_bind(r.production_queue.clone());
        });
        qb.push(upsert_tail(&["game_id", "id"], CAMP_COLUMNS));
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn upsert_units(conn: &mut SqliteConnection, units: &[UnitRecord]) -> Result<(), PersistError> {
    let rows: Vec<UnitRow> = units.iter().map(UnitRow::from).collect();
    for chunk in rows.chunks(BATCH_ROWS) {
        let mut qb = QueryBuilder::<Sqlite>::new(insert_head("game_units", UNIT_COLUMNS));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.game_id)
                .push_bind(r.id)
                .push_bind(r.owner_id)
                .push_bind(r.unit_template_id)
                .push_bind(r.position_x)
                .push_bind(r.position_y)
                .push_bind(r.current_hp)
                .push_bind(r.target_x)
                .push_bind(r.target_y)
                .push_bind(r.is_alive)
                .push_bind(r.source_camp_id)
                .push_bind(r.group_number)
                .push_bind(r.died_at_tick)
                .push_bind(r.facing.clone())
                .push_bind(r.mirrored);
        });
        qb.push(upsert_tail(&["game_id", "id"], UNIT_COLUMNS));
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn upsert_ships(conn: &mut SqliteConnection, ships: &[ShipRecord]) -> Result<(), PersistError> {
    let rows: Vec<ShipRow> = ships.iter().map(ShipRow::from).collect();
    for chunk in rows.chunks(BATCH_ROWS) {
        let mut qb = QueryBuilder::<Sqlite>::new(insert_head("game_ships", SHIP_COLUMNS));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.game_id)
                .push_bind(r.id)
                .push_bind(r.owner_id)
                .push_bind(r.ship_template_id)
                .push_bind(r.position_x)
                .push_bind(r.position_y)
                .push_bind(r.current_hp)
                .push_bind(r.target_x)
                .push_bind(r.target_y)
                .push_bind(r.is_alive)
                .push_bind(r.source_camp_id)
                .push_bind(r.died_at_tick)
                .push_bind(r.facing.clone())
                .push_bind(r.mirrored);
        });
        qb.push(upsert_tail(&["game_id", "id"], SHIP_COLUMNS));
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn upsert_region_control(
    conn: &mut SqliteConnection,
    regions: &[RegionControlRecord],
) -> Result<(), PersistError> {
    let rows: Vec<RegionControlRow> = regions.iter().map(RegionControlRow::from).collect();
    for chunk in rows.chunks(BATCH_ROWS) {
        let mut qb = QueryBuilder::<Sqlite>::new(insert_head("game_region_control", REGION_COLUMNS));
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.game_id)
                .push_bind(r.region_id)
                .push_bind(r.owner_id)
                .push_bind(r.changed_at_tick);
        });
        qb.push(upsert_tail(&["game_id", "region_id"], REGION_COLUMNS));
        qb.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_tail_skips_key_columns() {
        let tail = upsert_tail(&["game_id", "region_id"], REGION_COLUMNS);
        assert_eq!(
            tail,
            " ON CONFLICT (game_id, region_id) DO UPDATE SET owner_id = excluded.owner_id, \
             changed_at_tick = excluded.changed_at_tick"
        );
    }
}
