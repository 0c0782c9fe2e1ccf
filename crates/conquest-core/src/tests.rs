//! Cross-module tests for the core vocabulary: wire formats, lifecycle rules
//! and numeric invariants.

use proptest::prelude::*;

use crate::commands::{CommandEnvelope, PlayerCommand};
use crate::components::Health;
use crate::enums::*;
use crate::error::{EntityRef, SimError, StateViolation};
use crate::events::GameEvent;
use crate::ids::*;
use crate::map::point_in_polygon;
use crate::records::{ProductionItem, ProductionOrder, StateDelta};
use crate::templates::{calculate_damage, TemplateCatalog, TurretDamage};
use crate::types::{hit_interval_ticks, secs_to_ticks, Position};

// ---- Wire formats ----

#[test]
fn test_status_enums_serialize_snake_case() {
    assert_eq!(
        serde_json::to_string(&GameStatus::InProgress).unwrap(),
        "\"in_progress\""
    );
    assert_eq!(
        serde_json::to_string(&PlayerStatus::Disconnected).unwrap(),
        "\"disconnected\""
    );
    assert_eq!(serde_json::to_string(&Facing::BackSide).unwrap(), "\"back_side\"");
    for status in [
        GameStatus::Waiting,
        GameStatus::InProgress,
        GameStatus::Finished,
        GameStatus::Abandoned,
    ] {
        assert_eq!(GameStatus::parse(status.as_str()), Some(status));
    }
    for status in [
        PlayerStatus::Active,
        PlayerStatus::Surrendered,
        PlayerStatus::Defeated,
        PlayerStatus::Disconnected,
    ] {
        assert_eq!(PlayerStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(CampType::parse("harbor"), Some(CampType::Harbor));
    assert_eq!(AiDifficulty::parse("brutal"), None);
}

#[test]
fn test_command_json_shape() {
    let json = r#"{"type":"Move","unit_ids":[1,2],"target_x":4.5,"target_y":3.0}"#;
    let cmd: PlayerCommand = serde_json::from_str(json).unwrap();
    assert_eq!(
        cmd,
        PlayerCommand::Move {
            unit_ids: vec![UnitId(1), UnitId(2)],
            target_x: 4.5,
            target_y: 3.0,
        }
    );

    let json = r#"{"type":"SetGroup","unit_id":7,"group":null}"#;
    let cmd: PlayerCommand = serde_json::from_str(json).unwrap();
    assert_eq!(cmd.label(), "set_group");

    let env = CommandEnvelope::new(PlayerId(3), ConnectionId(9), 100, PlayerCommand::Surrender);
    let back: CommandEnvelope = serde_json::from_str(&serde_json::to_string(&env).unwrap()).unwrap();
    assert_eq!(back, env);
}

#[test]
fn test_production_queue_json() {
    let queue = vec![
        ProductionOrder {
            item: ProductionItem::Unit(UnitTemplateId(2)),
            completes_at_tick: 60,
        },
        ProductionOrder {
            item: ProductionItem::Ship(ShipTemplateId(1)),
            completes_at_tick: 180,
        },
    ];
    let json = serde_json::to_string(&queue).unwrap();
    assert!(json.contains(r#""kind":"unit","template_id":2"#));
    assert!(json.contains(r#""kind":"ship","template_id":1"#));
    let back: Vec<ProductionOrder> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, queue);
}

#[test]
fn test_event_json_is_tagged() {
    let ev = GameEvent::CampCaptured {
        camp_id: CampId(4),
        from: None,
        to: PlayerId(2),
    };
    let json = serde_json::to_string(&ev).unwrap();
    assert!(json.starts_with(r#"{"type":"CampCaptured""#));
}

#[test]
fn test_empty_delta() {
    let delta = StateDelta::default();
    assert!(delta.is_empty());
    assert_eq!(delta.record_count(), 0);
}

// ---- Lifecycle rules ----

#[test]
fn test_game_status_is_monotonic() {
    use GameStatus::*;
    assert!(Waiting.can_transition_to(InProgress));
    assert!(InProgress.can_transition_to(Finished));
    assert!(InProgress.can_transition_to(Abandoned));
    assert!(!InProgress.can_transition_to(Waiting));
    assert!(!Finished.can_transition_to(Abandoned));
    assert!(!Abandoned.can_transition_to(InProgress));
    assert!(!Waiting.can_transition_to(Finished));
}

#[test]
fn test_player_status_terminal_states() {
    use PlayerStatus::*;
    assert!(Active.can_transition_to(Disconnected));
    assert!(Disconnected.can_transition_to(Active));
    assert!(Active.can_transition_to(Surrendered));
    assert!(!Surrendered.can_transition_to(Active));
    assert!(!Defeated.can_transition_to(Disconnected));
    assert!(Surrendered.is_eliminated());
    assert!(!Disconnected.is_eliminated());
}

#[test]
fn test_stale_reference_classification() {
    assert!(SimError::NotFound(EntityRef::Unit(UnitId(1))).is_stale_reference());
    assert!(SimError::Unauthorized {
        player: PlayerId(1),
        entity: EntityRef::Camp(CampId(1)),
    }
    .is_stale_reference());
    assert!(!SimError::NotFound(EntityRef::Player(PlayerId(1))).is_stale_reference());
    assert!(!SimError::from(StateViolation::InsufficientFunds {
        needed: 100,
        available: 80,
    })
    .is_stale_reference());
}

// ---- Numeric invariants ----

#[test]
fn test_secs_to_ticks_scales_with_speed() {
    assert_eq!(secs_to_ticks(30.0, 1.0), 300);
    assert_eq!(secs_to_ticks(30.0, 2.0), 150);
    assert_eq!(secs_to_ticks(0.0, 1.0), 1);
    assert_eq!(secs_to_ticks(5.0, 0.0), 50);
}

#[test]
fn test_hit_interval() {
    // ceil(10 / (0.8 * 1.0)) = 13
    assert_eq!(hit_interval_ticks(0.8, 1.0), 13);
    assert_eq!(hit_interval_ticks(1.0, 2.0), 5);
    assert_eq!(hit_interval_ticks(50.0, 1.0), 1);
}

#[test]
fn test_camp_type_production_rules() {
    assert!(CampType::Standard.builds_unit(false));
    assert!(!CampType::Standard.builds_unit(true));
    assert!(CampType::Neutral.builds_unit(true));
    assert!(!CampType::Harbor.builds_unit(false));
    assert!(CampType::Harbor.builds_ships());
}

#[test]
fn test_turret_damage_ignores_modifiers() {
    assert_eq!(calculate_damage(&TurretDamage(10), "cavalry"), 10);
    let catalog = TemplateCatalog::builtin().unwrap();
    let spear = catalog.unit_by_type("spearman", false).unwrap();
    assert_eq!(calculate_damage(spear, "cavalry"), 22);
    assert_eq!(calculate_damage(spear, "archer"), 11);
}

proptest! {
    #[test]
    fn prop_hp_never_negative(max in 1u32..10_000, hits in proptest::collection::vec(0u32..5_000, 0..20)) {
        let mut hp = Health::full(max);
        let mut deaths = 0;
        for h in hits {
            if hp.apply_damage(h) {
                deaths += 1;
            }
            prop_assert!(hp.current <= hp.max);
        }
        prop_assert!(deaths <= 1);
        prop_assert_eq!(deaths == 1, !hp.is_alive());
    }

    #[test]
    fn prop_square_containment_matches_bounds(x in -5.0f64..15.0, y in -5.0f64..15.0) {
        let square = [
            Position::new(0.0, 0.0),
            Position::new(10.0, 0.0),
            Position::new(10.0, 10.0),
            Position::new(0.0, 10.0),
        ];
        let inside = point_in_polygon(&Position::new(x, y), &square);
        if x > 0.0 && x < 10.0 && y > 0.0 && y < 10.0 {
            prop_assert!(inside);
        }
        if x < 0.0 || x > 10.0 || y < 0.0 || y > 10.0 {
            prop_assert!(!inside);
        }
    }

    #[test]
    fn prop_ticks_at_least_one(secs in 0.0f64..1_000.0, speed in 0.1f64..8.0) {
        prop_assert!(secs_to_ticks(secs, speed) >= 1);
    }
}
