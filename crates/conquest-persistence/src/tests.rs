//! Repository tests against in-memory SQLite and synchronizer tests against
//! an in-memory sink with paused time.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conquest_core::config::{GameSettings, SimConfig};
use conquest_core::enums::*;
use conquest_core::ids::*;
use conquest_core::map::MapCatalog;
use conquest_core::records::*;
use conquest_core::templates::TemplateCatalog;
use conquest_core::types::Position;
use conquest_sim::engine::SimulationEngine;

use crate::db::{self, DbConfig};
use crate::error::PersistError;
use crate::repository::GameRepository;
use crate::synchronizer::{self, StateSink, SyncConfig};

async fn repo() -> GameRepository {
    let pool = db::init_db(&DbConfig::in_memory()).await.unwrap();
    GameRepository::new(pool)
}

fn settings(name: &str) -> GameSettings {
    GameSettings {
        name: name.into(),
        ..GameSettings::default()
    }
}

fn player(game_id: GameId, id: u64, money: u32) -> PlayerRecord {
    PlayerRecord {
        id: PlayerId(id),
        game_id,
        user_id: Some(UserId(100 + id)),
        ai_difficulty: None,
        player_number: id as u8,
        display_name: format!("player {id}"),
        color: "#3498db".into(),
        money,
        status: PlayerStatus::Active,
        stats: PlayerStats::default(),
        left_at_tick: None,
    }
}

fn unit(game_id: GameId, id: u64, owner: u64, hp: u32) -> UnitRecord {
    UnitRecord {
        id: UnitId(id),
        game_id,
        owner_id: PlayerId(owner),
        template_id: UnitTemplateId(1),
        position: Position::new(2.5, 4.0),
        current_hp: hp,
        target: None,
        is_alive: hp > 0,
        source_camp_id: Some(CampId(1)),
        group_number: None,
        died_at_tick: None,
        facing: Facing::Side,
        mirrored: false,
    }
}

fn unit_delta(game_id: GameId, tick: u64, units: Vec<UnitRecord>) -> StateDelta {
    StateDelta {
        game_id,
        tick,
        units,
        ..StateDelta::default()
    }
}

// ---- Games and players ----

#[tokio::test]
async fn test_create_and_find_game() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Alpha"), Some(UserId(7))).await.unwrap();
    assert_eq!(game.status, GameStatus::Waiting);

    let stored = repo.find_game(game.id).await.unwrap().unwrap();
    assert_eq!(stored.record, game);
    assert!(stored.started_at.is_none());
    assert!(repo.find_game(GameId(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_status_updates_stamp_times() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Alpha"), None).await.unwrap();

    assert!(repo.update_status(game.id, GameStatus::InProgress, Some(0)).await.unwrap());
    let stored = repo.find_game(game.id).await.unwrap().unwrap();
    assert_eq!(stored.record.status, GameStatus::InProgress);
    assert_eq!(stored.record.started_at_tick, Some(0));
    assert!(stored.started_at.is_some());
    assert!(stored.ended_at.is_none());

    repo.add_player(&player(game.id, 2, 0)).await.unwrap();
    assert!(repo.set_winner(game.id, PlayerId(2), 300).await.unwrap());
    let stored = repo.find_game(game.id).await.unwrap().unwrap();
    assert_eq!(stored.record.status, GameStatus::Finished);
    assert_eq!(stored.record.winner_id, Some(PlayerId(2)));
    assert_eq!(stored.record.ended_at_tick, Some(300));
    assert!(stored.ended_at.is_some());

    assert!(!repo.update_status(GameId(999), GameStatus::Abandoned, None).await.unwrap());
}

#[tokio::test]
async fn test_list_active_games_counts_active_players() {
    let repo = repo().await;
    let open = repo.create_game(&settings("Open"), None).await.unwrap();
    let running = repo.create_game(&settings("Running"), None).await.unwrap();
    let done = repo.create_game(&settings("Done"), None).await.unwrap();
    repo.update_status(running.id, GameStatus::InProgress, Some(0)).await.unwrap();
    repo.update_status(done.id, GameStatus::Abandoned, None).await.unwrap();

    repo.add_player(&player(open.id, 1, 100)).await.unwrap();
    let mut gone = player(open.id, 2, 100);
    gone.status = PlayerStatus::Surrendered;
    repo.add_player(&gone).await.unwrap();

    let active = repo.list_active_games(10).await.unwrap();
    let ids: Vec<GameId> = active.iter().map(|g| g.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&open.id) && ids.contains(&running.id));
    let summary = active.iter().find(|g| g.id == open.id).unwrap();
    assert_eq!(summary.current_players, 1);
    assert_eq!(summary.name, "Open");

    assert_eq!(repo.list_active_games(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_player_money_is_clamped_at_zero() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Alpha"), None).await.unwrap();
    repo.add_player(&player(game.id, 1, 50)).await.unwrap();

    assert_eq!(repo.update_player_money(game.id, PlayerId(1), 30).await.unwrap(), Some(80));
    assert_eq!(repo.update_player_money(game.id, PlayerId(1), -500).await.unwrap(), Some(0));
    assert_eq!(repo.update_player_money(game.id, PlayerId(9), 10).await.unwrap(), None);
}

#[tokio::test]
async fn test_player_status_and_stats() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Alpha"), None).await.unwrap();
    repo.add_player(&player(game.id, 1, 0)).await.unwrap();
    repo.add_player(&player(game.id, 2, 0)).await.unwrap();

    let kills = PlayerStats {
        units_killed: 3,
        camps_captured: 1,
        ..PlayerStats::default()
    };
    repo.increment_player_stats(game.id, PlayerId(1), kills).await.unwrap();
    repo.increment_player_stats(game.id, PlayerId(1), kills).await.unwrap();
    repo.update_player_status(game.id, PlayerId(2), PlayerStatus::Surrendered, Some(42))
        .await
        .unwrap();

    let players = repo.list_players(game.id).await.unwrap();
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].stats.units_killed, 6);
    assert_eq!(players[0].stats.camps_captured, 2);
    assert_eq!(players[0].stats.units_lost, 0);
    assert_eq!(players[1].status, PlayerStatus::Surrendered);
    assert_eq!(players[1].left_at_tick, Some(42));
}

#[tokio::test]
async fn test_duplicate_seat_is_rejected() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Alpha"), None).await.unwrap();
    repo.add_player(&player(game.id, 1, 0)).await.unwrap();
    let mut clash = player(game.id, 2, 0);
    clash.player_number = 1;
    let err = repo.add_player(&clash).await.unwrap_err();
    assert!(matches!(err, PersistError::TransientStorageFailure(_)));
}

// ---- Entities ----

#[tokio::test]
async fn test_upsert_is_idempotent_and_latest_wins() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Alpha"), None).await.unwrap();

    let first = vec![unit(game.id, 1, 1, 100), unit(game.id, 2, 1, 80)];
    repo.upsert_units(&first).await.unwrap();
    repo.upsert_units(&first).await.unwrap();

    let mut wounded = unit(game.id, 1, 1, 40);
    wounded.target = Some(Position::new(9.0, 3.0));
    wounded.group_number = Some(3);
    let mut dead = unit(game.id, 2, 1, 0);
    dead.died_at_tick = Some(12);
    repo.upsert_units(&[wounded.clone(), dead]).await.unwrap();

    let loaded = repo.load_game_state(game.id).await.unwrap().unwrap();
    assert_eq!(loaded.units, vec![wounded.clone()]);
    assert_eq!(
        repo.units_by_group(game.id, PlayerId(1), 3).await.unwrap(),
        vec![wounded]
    );
    assert!(repo.units_by_group(game.id, PlayerId(1), 4).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_entities_are_scoped_to_their_game() {
    let repo = repo().await;
    let a = repo.create_game(&settings("A"), None).await.unwrap();
    let b = repo.create_game(&settings("B"), None).await.unwrap();
    repo.upsert_units(&[unit(a.id, 1, 1, 100)]).await.unwrap();
    repo.upsert_units(&[unit(b.id, 1, 1, 60)]).await.unwrap();

    let loaded_a = repo.load_game_state(a.id).await.unwrap().unwrap();
    let loaded_b = repo.load_game_state(b.id).await.unwrap().unwrap();
    assert_eq!(loaded_a.units[0].current_hp, 100);
    assert_eq!(loaded_b.units[0].current_hp, 60);
}

#[tokio::test]
async fn test_large_batches_are_chunked() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Horde"), None).await.unwrap();
    let units: Vec<UnitRecord> = (1..=450).map(|i| unit(game.id, i, 1, 50)).collect();
    repo.upsert_units(&units).await.unwrap();
    let loaded = repo.load_game_state(game.id).await.unwrap().unwrap();
    assert_eq!(loaded.units.len(), 450);
}

#[tokio::test]
async fn test_engine_deltas_round_trip() {
    let repo = repo().await;
    let maps = MapCatalog::builtin().unwrap();
    let map = Arc::new(maps.get(MapId(1)).unwrap().clone());
    let catalog = Arc::new(TemplateCatalog::builtin().unwrap());
    let game = repo
        .create_game(
            &GameSettings {
                map_id: map.id,
                ..settings("Persisted")
            },
            Some(UserId(1)),
        )
        .await
        .unwrap();

    let mut engine = SimulationEngine::new(SimConfig::default(), game.clone(), map.clone(), catalog);
    engine.add_player(Some(UserId(1)), "Ada", None).unwrap();
    engine.add_player(None, "Bot", Some(AiDifficulty::Hard)).unwrap();
    engine.start().unwrap();
    repo.apply_delta(&engine.take_delta()).await.unwrap();

    let deltas: Vec<StateDelta> = (0..300).map(|_| engine.tick().delta).collect();
    repo.apply_deltas(&deltas).await.unwrap();

    let gid = engine.game_id();
    let loaded = repo.load_game_state(gid).await.unwrap().unwrap();
    assert_eq!(loaded.game.record.status, GameStatus::InProgress);
    assert_eq!(loaded.players.len(), 2);
    assert_eq!(loaded.camps.len(), map.camp_positions.len());
    for camp in &loaded.camps {
        assert_eq!(*camp, engine.store().camp(gid, camp.id).unwrap());
    }
    for player in &loaded.players {
        assert_eq!(player, engine.store().player(gid, player.id).unwrap());
    }
    for unit in &loaded.units {
        assert_eq!(*unit, engine.store().unit(gid, unit.id).unwrap());
    }
    assert_eq!(
        loaded.region_control.len(),
        engine.store().region_control(gid).unwrap().len()
    );
}

#[tokio::test]
async fn test_health_check_and_pool_stats() {
    let repo = repo().await;
    repo.health_check().await.unwrap();
    let stats = db::pool_stats(repo.pool());
    assert_eq!(stats.size, 1);
    db::shutdown(repo.pool()).await;
    assert!(repo.health_check().await.is_err());
}

// ---- Synchronizer ----

#[derive(Default)]
struct SinkState {
    writes: Vec<Vec<StateDelta>>,
    attempts: u32,
    fail_next: u32,
}

#[derive(Clone, Default)]
struct MemorySink(Arc<Mutex<SinkState>>);

impl MemorySink {
    fn failing(times: u32) -> Self {
        let sink = Self::default();
        sink.0.lock().unwrap().fail_next = times;
        sink
    }

    fn writes(&self) -> Vec<Vec<StateDelta>> {
        self.0.lock().unwrap().writes.clone()
    }

    fn attempts(&self) -> u32 {
        self.0.lock().unwrap().attempts
    }
}

impl StateSink for MemorySink {
    fn write(&self, deltas: &[StateDelta]) -> impl Future<Output = Result<(), PersistError>> + Send {
        let result = {
            let mut state = self.0.lock().unwrap();
            state.attempts += 1;
            if state.fail_next > 0 {
                state.fail_next -= 1;
                Err(PersistError::TransientStorageFailure(sqlx::Error::PoolTimedOut))
            } else {
                state.writes.push(deltas.to_vec());
                Ok(())
            }
        };
        async move { result }
    }
}

fn quick() -> SyncConfig {
    SyncConfig {
        flush_max_records: 100,
        flush_interval_ms: 500,
        retry_base_ms: 100,
        retry_max_ms: 1_000,
        degraded_after: 3,
        final_flush_attempts: 3,
    }
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_sync_coalesces_per_entity() {
    let sink = MemorySink::default();
    let (handle, _task) = synchronizer::spawn(sink.clone(), quick());
    let g = GameId(1);
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 100), unit(g, 2, 1, 90)])).unwrap();
    handle.submit(unit_delta(g, 2, vec![unit(g, 1, 1, 70)])).unwrap();
    handle.submit(unit_delta(g, 3, vec![unit(g, 1, 1, 40)])).unwrap();
    handle.flush().await.unwrap();

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    let delta = &writes[0][0];
    assert_eq!(delta.tick, 3);
    assert_eq!(delta.units.len(), 2);
    assert_eq!(delta.units[0].current_hp, 40);
    assert_eq!(delta.units[1].current_hp, 90);
    assert_eq!(handle.stats().records_written(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sync_flushes_when_buffer_is_full() {
    let sink = MemorySink::default();
    let config = SyncConfig {
        flush_max_records: 3,
        ..quick()
    };
    let (handle, _task) = synchronizer::spawn(sink.clone(), config);
    let g = GameId(1);
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 10), unit(g, 2, 1, 10)])).unwrap();
    advance(1).await;
    assert!(sink.writes().is_empty());

    handle.submit(unit_delta(g, 2, vec![unit(g, 3, 1, 10)])).unwrap();
    advance(1).await;
    assert_eq!(sink.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sync_flushes_on_interval() {
    let sink = MemorySink::default();
    let (handle, _task) = synchronizer::spawn(sink.clone(), quick());
    let g = GameId(1);
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 10)])).unwrap();
    advance(100).await;
    assert!(sink.writes().is_empty());
    advance(450).await;
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(handle.stats().flushes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sync_retries_with_backoff_and_keeps_merging() {
    let sink = MemorySink::failing(2);
    let (handle, _task) = synchronizer::spawn(sink.clone(), quick());
    let g = GameId(1);
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 10)])).unwrap();

    // Interval flush at 500ms fails; retries follow at 600ms and 800ms.
    advance(550).await;
    assert_eq!(sink.attempts(), 1);
    handle.submit(unit_delta(g, 2, vec![unit(g, 2, 1, 20)])).unwrap();
    advance(100).await;
    assert_eq!(sink.attempts(), 2);
    assert!(sink.writes().is_empty());
    advance(200).await;
    assert_eq!(sink.attempts(), 3);

    let writes = sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0][0].units.len(), 2);
    assert_eq!(handle.stats().failures(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sync_degrades_and_recovers() {
    let sink = MemorySink::failing(4);
    let (handle, _task) = synchronizer::spawn(sink.clone(), quick());
    let g = GameId(1);
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 10)])).unwrap();

    // Failures at 500, 600, 800 (degraded), 1200; success at 2000.
    advance(900).await;
    assert_eq!(sink.attempts(), 3);
    assert!(handle.stats().is_degraded());
    advance(1_200).await;
    assert_eq!(sink.attempts(), 5);
    assert!(!handle.stats().is_degraded());
    assert_eq!(sink.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_final_flush_reports_failure() {
    let sink = MemorySink::failing(10);
    let (handle, _task) = synchronizer::spawn(sink.clone(), quick());
    let g = GameId(1);
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 10)])).unwrap();
    let err = handle.flush().await.unwrap_err();
    assert!(matches!(err, PersistError::TransientStorageFailure(_)));
    assert_eq!(sink.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_then_closes() {
    let sink = MemorySink::default();
    let (handle, task) = synchronizer::spawn(sink.clone(), quick());
    let g = GameId(1);
    handle.submit(StateDelta { game_id: g, tick: 1, ..StateDelta::default() }).unwrap();
    handle.submit(unit_delta(g, 1, vec![unit(g, 1, 1, 10)])).unwrap();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(sink.writes().len(), 1);
    assert!(handle.is_closed());
    assert!(matches!(
        handle.submit(unit_delta(g, 2, vec![unit(g, 1, 1, 5)])),
        Err(PersistError::SynchronizerClosed)
    ));
    assert!(matches!(handle.flush().await, Err(PersistError::SynchronizerClosed)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_flush_from_game_thread() {
    let repo = repo().await;
    let game = repo.create_game(&settings("Threaded"), None).await.unwrap();
    let (handle, _task) = synchronizer::spawn(repo.clone(), SyncConfig::default());

    let gid = game.id;
    let sender = handle.clone();
    tokio::task::spawn_blocking(move || {
        sender.submit(unit_delta(gid, 1, vec![unit(gid, 1, 1, 25)]))?;
        sender.flush_blocking()
    })
    .await
    .unwrap()
    .unwrap();

    let loaded = repo.load_game_state(gid).await.unwrap().unwrap();
    assert_eq!(loaded.units.len(), 1);
    assert_eq!(loaded.units[0].current_hp, 25);
}
