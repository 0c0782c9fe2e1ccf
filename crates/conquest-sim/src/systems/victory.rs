//! Defeat and victory detection, run at the end of each tick.
//!
//! Players left with no camps and no living units or ships are defeated.
//! Eliminated players (surrendered or defeated) lose whatever they still
//! hold: units disband, camps turn neutral. Once at most one player remains
//! in the game, the game is over.

use std::collections::BTreeSet;

use hecs::Entity;
use tracing::info;

use conquest_core::components::{CampInfo, Health, Movement, Owner, ShipInfo, UnitInfo};
use conquest_core::enums::PlayerStatus;
use conquest_core::events::GameEvent;
use conquest_core::ids::{CampId, PlayerId, ShipId, UnitId};

use crate::store::EntityStore;
use crate::systems::TickContext;

/// The result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOver {
    /// `None` when nobody is left standing.
    pub winner: Option<PlayerId>,
}

pub fn run(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) -> Option<GameOver> {
    defeat_empty_handed(store, ctx, events);
    disband_eliminated(store, ctx);

    let remaining: Vec<PlayerId> = store
        .all_players()
        .filter(|p| !p.status.is_eliminated())
        .map(|p| p.id)
        .collect();
    if remaining.len() > 1 {
        return None;
    }
    let winner = remaining.first().copied();
    info!(?winner, tick = ctx.tick, "game over");
    Some(GameOver { winner })
}

/// Owners of at least one camp, living unit or living ship.
fn asset_holders(store: &EntityStore) -> BTreeSet<PlayerId> {
    let world = store.world();
    let mut holders: BTreeSet<PlayerId> = world
        .query::<&CampInfo>()
        .iter()
        .filter_map(|(_, info)| info.owner)
        .collect();
    holders.extend(
        world
            .query::<(&Owner, &Health)>()
            .iter()
            .filter(|(_, (_, hp))| hp.is_alive())
            .map(|(_, (owner, _))| owner.0),
    );
    holders
}

fn defeat_empty_handed(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let holders = asset_holders(store);
    let defeated: Vec<PlayerId> = store
        .all_players()
        .filter(|p| !p.status.is_eliminated() && !holders.contains(&p.id))
        .map(|p| p.id)
        .collect();
    for player in defeated {
        if store
            .set_player_status(player, PlayerStatus::Defeated, ctx.tick)
            .is_ok()
        {
            info!(%player, "player defeated");
            events.push(GameEvent::PlayerDefeated { player_id: player });
        }
    }
}

/// Strip eliminated players of their remaining units, ships and camps.
/// Disbanded units are not counted as losses.
fn disband_eliminated(store: &mut EntityStore, ctx: &TickContext) {
    let eliminated: BTreeSet<PlayerId> = store
        .all_players()
        .filter(|p| p.status.is_eliminated())
        .map(|p| p.id)
        .collect();
    if eliminated.is_empty() {
        return;
    }

    let mut units: Vec<(UnitId, Entity)> = Vec::new();
    let mut ships: Vec<(ShipId, Entity)> = Vec::new();
    let mut camps: Vec<(CampId, Entity)> = Vec::new();
    {
        let world = store.world();
        for (entity, (info, owner, hp)) in world.query::<(&UnitInfo, &Owner, &Health)>().iter() {
            if hp.is_alive() && eliminated.contains(&owner.0) {
                units.push((info.id, entity));
            }
        }
        for (entity, (info, owner, hp)) in world.query::<(&ShipInfo, &Owner, &Health)>().iter() {
            if hp.is_alive() && eliminated.contains(&owner.0) {
                ships.push((info.id, entity));
            }
        }
        for (entity, info) in world.query::<&CampInfo>().iter() {
            if info.owner.is_some_and(|o| eliminated.contains(&o)) {
                camps.push((info.id, entity));
            }
        }
    }
    if units.is_empty() && ships.is_empty() && camps.is_empty() {
        return;
    }
    info!(
        players = ?eliminated,
        units = units.len(),
        ships = ships.len(),
        camps = camps.len(),
        "disbanding eliminated players"
    );

    for (id, entity) in units {
        {
            let world = store.world();
            if let Ok(mut hp) = world.get::<&mut Health>(entity) {
                hp.set(0);
            }
            if let Ok(mut movement) = world.get::<&mut Movement>(entity) {
                movement.target = None;
            }
            if let Ok(mut info) = world.get::<&mut UnitInfo>(entity) {
                info.died_at_tick.get_or_insert(ctx.tick);
            }
        }
        store.mark_unit(id);
    }
    for (id, entity) in ships {
        {
            let world = store.world();
            if let Ok(mut hp) = world.get::<&mut Health>(entity) {
                hp.set(0);
            }
            if let Ok(mut movement) = world.get::<&mut Movement>(entity) {
                movement.target = None;
            }
            if let Ok(mut info) = world.get::<&mut ShipInfo>(entity) {
                info.died_at_tick.get_or_insert(ctx.tick);
            }
        }
        store.mark_ship(id);
    }
    for (id, entity) in camps {
        if let Ok(mut info) = store.world().get::<&mut CampInfo>(entity) {
            info.owner = None;
            info.queue.clear();
        }
        store.mark_camp(id);
    }
}
