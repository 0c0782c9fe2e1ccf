//! Combat resolution.
//!
//! Attackers (living units, living ships, and turrets of camps with HP > 0)
//! act in id order: units, then ships, then camps. An attacker whose weapon
//! is ready hits the nearest living hostile unit or ship in range (ties by
//! id); units and ships fall back to the nearest hostile or neutral camp.
//! Hits apply `max(0, hp - damage)`; an entity that reaches 0 HP takes no
//! further part in the tick.

use hecs::Entity;
use tracing::{debug, info};

use conquest_core::components::*;
use conquest_core::constants::CAMP_DAMAGE_CLASS;
use conquest_core::events::GameEvent;
use conquest_core::ids::*;
use conquest_core::templates::{calculate_damage, TemplateCatalog, TurretDamage};
use conquest_core::types::Position;

use crate::store::EntityStore;
use crate::systems::TickContext;

/// Identity of a combatant. The derived order is the resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FighterKey {
    Unit(UnitId),
    Ship(ShipId),
    Camp(CampId),
}

#[derive(Debug, Clone, Copy)]
enum Arms {
    Unit(UnitTemplateId),
    Ship(ShipTemplateId),
    Turret(u32),
}

#[derive(Debug, Clone)]
struct Fighter {
    key: FighterKey,
    entity: Entity,
    owner: Option<PlayerId>,
    position: Position,
    health: Health,
    weapon: Weapon,
    arms: Arms,
    /// Damage class used by attackers' modifier tables.
    class: String,
    armed: bool,
    fired: bool,
    hit: bool,
}

impl Fighter {
    fn is_camp(&self) -> bool {
        matches!(self.key, FighterKey::Camp(_))
    }
}

pub fn run(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let mut fighters = collect(store, ctx.catalog);
    fighters.sort_by_key(|f| f.key);

    let mut kills: Vec<(Option<PlayerId>, Option<PlayerId>)> = Vec::new();
    for i in 0..fighters.len() {
        let attacker = &fighters[i];
        if !attacker.armed || !attacker.health.is_alive() || !attacker.weapon.is_ready(ctx.tick) {
            continue;
        }
        let Some(j) = pick_target(&fighters, i) else {
            continue;
        };
        let damage = damage_of(ctx.catalog, attacker.arms, &fighters[j].class);
        let attacker_owner = attacker.owner;
        let attacker_key = attacker.key;

        fighters[i].weapon.fired(ctx.tick);
        fighters[i].fired = true;
        let target = &mut fighters[j];
        target.hit = true;
        let killed = target.health.apply_damage(damage);
        debug!(attacker = ?attacker_key, target = ?target.key, damage, hp = target.health.current, "hit");
        if !killed {
            continue;
        }
        match target.key {
            FighterKey::Unit(unit_id) => {
                if let Some(owner) = target.owner {
                    events.push(GameEvent::UnitKilled {
                        unit_id,
                        owner,
                        killer: attacker_owner,
                    });
                }
                kills.push((target.owner, attacker_owner));
            }
            FighterKey::Ship(ship_id) => {
                if let Some(owner) = target.owner {
                    events.push(GameEvent::ShipSunk {
                        ship_id,
                        owner,
                        killer: attacker_owner,
                    });
                }
                kills.push((target.owner, attacker_owner));
            }
            FighterKey::Camp(camp_id) => {
                info!(camp = %camp_id, owner = ?target.owner, "camp neutralized");
                events.push(GameEvent::CampNeutralized {
                    camp_id,
                    owner: target.owner,
                });
            }
        }
    }

    write_back(store, ctx.tick, &fighters);
    for (victim, killer) in kills {
        if let Some(p) = victim.and_then(|v| store.player_mut(v)) {
            p.stats.units_lost += 1;
        }
        if let Some(p) = killer.and_then(|k| store.player_mut(k)) {
            p.stats.units_killed += 1;
        }
    }
}

fn collect(store: &EntityStore, catalog: &TemplateCatalog) -> Vec<Fighter> {
    let world = store.world();
    let mut fighters = Vec::new();

    for (entity, (info, owner, pos, hp, weapon)) in world
        .query::<(&UnitInfo, &Owner, &Position, &Health, &Weapon)>()
        .iter()
    {
        if !hp.is_alive() {
            continue;
        }
        let armed = catalog.unit(info.template).is_ok_and(|t| t.base_damage > 0);
        fighters.push(Fighter {
            key: FighterKey::Unit(info.id),
            entity,
            owner: Some(owner.0),
            position: *pos,
            health: *hp,
            weapon: *weapon,
            arms: Arms::Unit(info.template),
            class: info.unit_type.clone(),
            armed,
            fired: false,
            hit: false,
        });
    }

    for (entity, (info, owner, pos, hp, weapon)) in world
        .query::<(&ShipInfo, &Owner, &Position, &Health, &Weapon)>()
        .iter()
    {
        if !hp.is_alive() {
            continue;
        }
        let armed = catalog.ship(info.template).is_ok_and(|t| t.base_damage > 0);
        fighters.push(Fighter {
            key: FighterKey::Ship(info.id),
            entity,
            owner: Some(owner.0),
            position: *pos,
            health: *hp,
            weapon: *weapon,
            arms: Arms::Ship(info.template),
            class: info.ship_type.clone(),
            armed,
            fired: false,
            hit: false,
        });
    }

    for (entity, (info, pos, hp, weapon)) in world
        .query::<(&CampInfo, &Position, &Health, &Weapon)>()
        .iter()
    {
        fighters.push(Fighter {
            key: FighterKey::Camp(info.id),
            entity,
            owner: info.owner,
            position: *pos,
            health: *hp,
            weapon: *weapon,
            arms: Arms::Turret(info.turret_damage),
            class: CAMP_DAMAGE_CLASS.to_string(),
            armed: info.turret_damage > 0,
            fired: false,
            hit: false,
        });
    }

    fighters
}

/// Nearest hostile unit or ship in range; units and ships fall back to
/// camps. Fighters are sorted, so the first of equal distances wins.
fn pick_target(fighters: &[Fighter], attacker: usize) -> Option<usize> {
    let a = &fighters[attacker];
    let nearest = |want_camp: bool| {
        let mut best: Option<(f64, usize)> = None;
        for (j, t) in fighters.iter().enumerate() {
            if j == attacker || t.is_camp() != want_camp || !t.health.is_alive() || t.owner == a.owner {
                continue;
            }
            let d = a.position.distance_to(&t.position);
            if d > a.weapon.range {
                continue;
            }
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, j));
            }
        }
        best.map(|(_, j)| j)
    };
    nearest(false).or_else(|| if a.is_camp() { None } else { nearest(true) })
}

fn damage_of(catalog: &TemplateCatalog, arms: Arms, defender_class: &str) -> u32 {
    match arms {
        Arms::Unit(id) => catalog
            .unit(id)
            .map_or(0, |t| calculate_damage(t, defender_class)),
        Arms::Ship(id) => catalog
            .ship(id)
            .map_or(0, |t| calculate_damage(t, defender_class)),
        Arms::Turret(damage) => calculate_damage(&TurretDamage(damage), defender_class),
    }
}

fn write_back(store: &mut EntityStore, tick: u64, fighters: &[Fighter]) {
    for f in fighters.iter().filter(|f| f.fired || f.hit) {
        {
            let world = store.world();
            if let Ok(mut weapon) = world.get::<&mut Weapon>(f.entity) {
                *weapon = f.weapon;
            }
            if let Ok(mut hp) = world.get::<&mut Health>(f.entity) {
                *hp = f.health;
            }
            if !f.health.is_alive() {
                if let Ok(mut movement) = world.get::<&mut Movement>(f.entity) {
                    movement.target = None;
                }
                match f.key {
                    FighterKey::Unit(_) => {
                        if let Ok(mut info) = world.get::<&mut UnitInfo>(f.entity) {
                            info.died_at_tick.get_or_insert(tick);
                        }
                    }
                    FighterKey::Ship(_) => {
                        if let Ok(mut info) = world.get::<&mut ShipInfo>(f.entity) {
                            info.died_at_tick.get_or_insert(tick);
                        }
                    }
                    FighterKey::Camp(_) => {}
                }
            }
        }
        if f.hit {
            match f.key {
                FighterKey::Unit(id) => store.mark_unit(id),
                FighterKey::Ship(id) => store.mark_ship(id),
                FighterKey::Camp(id) => store.mark_camp(id),
            }
        }
    }
}
