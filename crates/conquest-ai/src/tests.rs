use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use conquest_core::commands::PlayerCommand;
use conquest_core::enums::*;
use conquest_core::ids::*;
use conquest_core::records::*;
use conquest_core::state::{CampView, GameStateSnapshot, UnitView};
use conquest_core::templates::TemplateCatalog;
use conquest_core::types::{Position, SimTime};

use crate::planner::{plan, AiContext};
use crate::profiles::profile_for;

const ME: PlayerId = PlayerId(2);
const FOE: PlayerId = PlayerId(1);

fn player(id: PlayerId, money: u32, status: PlayerStatus) -> PlayerRecord {
    PlayerRecord {
        id,
        game_id: GameId(1),
        user_id: if id == ME { None } else { Some(UserId(5)) },
        ai_difficulty: (id == ME).then_some(AiDifficulty::Normal),
        player_number: id.0 as u8,
        display_name: format!("p{}", id.0),
        color: "#fff".into(),
        money,
        status,
        stats: PlayerStats::default(),
        left_at_tick: None,
    }
}

fn camp(id: u64, owner: Option<PlayerId>, camp_type: CampType, x: i32, y: i32) -> CampView {
    CampView {
        record: CampRecord {
            id: CampId(id),
            game_id: GameId(1),
            owner_id: owner,
            tile_x: x,
            tile_y: y,
            camp_type,
            region_id: None,
            current_hp: 100,
            max_hp: 100,
            turret_damage: 10,
            turret_range: 3.0,
            captured_at_tick: None,
            production_queue: vec![],
        },
        owner_player_number: owner.map(|p| p.0 as u8),
        owner_color: None,
    }
}

fn unit(id: u64, owner: PlayerId, x: f64, y: f64) -> UnitView {
    UnitView {
        record: UnitRecord {
            id: UnitId(id),
            game_id: GameId(1),
            owner_id: owner,
            template_id: UnitTemplateId(1),
            position: Position::new(x, y),
            current_hp: 100,
            target: None,
            is_alive: true,
            source_camp_id: None,
            group_number: None,
            died_at_tick: None,
            facing: Facing::Side,
            mirrored: false,
        },
        unit_type: "infantry".into(),
        max_hp: 100,
        owner_player_number: owner.0 as u8,
        owner_color: "#fff".into(),
    }
}

fn snapshot(money: u32, camps: Vec<CampView>, units: Vec<UnitView>) -> GameStateSnapshot {
    GameStateSnapshot {
        game: GameRecord {
            id: GameId(1),
            host_user_id: Some(UserId(5)),
            map_id: MapId(1),
            name: "ai".into(),
            max_players: 2,
            status: GameStatus::InProgress,
            speed: 1.0,
            starting_money: 100,
            money_interval_secs: 30.0,
            winner_id: None,
            started_at_tick: Some(0),
            ended_at_tick: None,
        },
        time: SimTime { tick: 30 },
        players: vec![
            player(FOE, 100, PlayerStatus::Active),
            player(ME, money, PlayerStatus::Active),
        ],
        camps,
        units,
        ships: vec![],
        region_control: vec![],
        events: vec![],
    }
}

fn run(snap: &GameStateSnapshot, difficulty: AiDifficulty, seed: u64) -> Vec<PlayerCommand> {
    let catalog = TemplateCatalog::builtin().unwrap();
    let profile = profile_for(difficulty);
    let ctx = AiContext {
        player: ME,
        snapshot: snap,
        catalog: &catalog,
        profile: &profile,
    };
    plan(&ctx, &mut ChaCha8Rng::seed_from_u64(seed))
}

#[test]
fn test_inactive_player_does_nothing() {
    let mut snap = snapshot(1_000, vec![camp(1, Some(ME), CampType::Standard, 2, 2)], vec![]);
    snap.players[1].status = PlayerStatus::Surrendered;
    assert!(run(&snap, AiDifficulty::Hard, 1).is_empty());
}

#[test]
fn test_reserve_is_kept() {
    // Normal keeps 30; 50 leaves 20, below every unit price.
    let snap = snapshot(50, vec![camp(1, Some(ME), CampType::Standard, 2, 2)], vec![]);
    assert!(run(&snap, AiDifficulty::Normal, 1).is_empty());
}

#[test]
fn test_standard_camp_builds_affordable_standard_unit() {
    let catalog = TemplateCatalog::builtin().unwrap();
    let snap = snapshot(100, vec![camp(1, Some(ME), CampType::Standard, 2, 2)], vec![]);
    for seed in 0..20 {
        let cmds = run(&snap, AiDifficulty::Normal, seed);
        assert_eq!(cmds.len(), 1);
        match &cmds[0] {
            PlayerCommand::EnqueueProduction { camp_id, template_id } => {
                assert_eq!(*camp_id, CampId(1));
                let t = catalog.unit(*template_id).unwrap();
                assert!(!t.is_advanced);
                assert!(t.price <= 70);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn test_harbor_builds_warships_only() {
    let snap = snapshot(500, vec![camp(3, Some(ME), CampType::Harbor, 3, 6)], vec![]);
    let cmds = run(&snap, AiDifficulty::Hard, 7);
    assert_eq!(
        cmds,
        vec![PlayerCommand::EnqueueShip {
            camp_id: CampId(3),
            template_id: ShipTemplateId(2),
        }]
    );
}

#[test]
fn test_attack_waits_for_full_group() {
    let camps = vec![
        camp(1, Some(ME), CampType::Standard, 2, 2),
        camp(2, Some(FOE), CampType::Standard, 20, 2),
        camp(3, None, CampType::Neutral, 8, 2),
    ];
    let three: Vec<_> = (1..=3).map(|i| unit(i, ME, 3.0, 3.0)).collect();
    let snap = snapshot(0, camps.clone(), three);
    assert!(run(&snap, AiDifficulty::Normal, 1).is_empty());

    let four: Vec<_> = (1..=4).map(|i| unit(i, ME, 3.0, 3.0)).collect();
    let snap = snapshot(0, camps, four);
    let cmds = run(&snap, AiDifficulty::Normal, 1);
    assert_eq!(
        cmds,
        vec![PlayerCommand::Move {
            unit_ids: vec![UnitId(1), UnitId(2), UnitId(3), UnitId(4)],
            target_x: 8.0,
            target_y: 2.0,
        }]
    );
}

#[test]
fn test_moving_units_are_not_idle() {
    let camps = vec![camp(2, Some(FOE), CampType::Standard, 20, 2)];
    let mut units: Vec<_> = (1..=4).map(|i| unit(i, ME, 3.0, 3.0)).collect();
    units[0].record.target = Some(Position::new(10.0, 10.0));
    let snap = snapshot(0, camps, units);
    assert!(run(&snap, AiDifficulty::Normal, 1).is_empty());
}

#[test]
fn test_same_seed_same_plan() {
    let camps = vec![
        camp(1, Some(ME), CampType::Neutral, 2, 2),
        camp(4, Some(ME), CampType::Standard, 4, 4),
    ];
    let snap = snapshot(400, camps, vec![]);
    assert_eq!(
        run(&snap, AiDifficulty::Hard, 99),
        run(&snap, AiDifficulty::Hard, 99)
    );
}
