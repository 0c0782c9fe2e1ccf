//! Economy tick: periodic income and region unit bonuses.

use tracing::{debug, warn};

use conquest_core::components::{CampInfo, Health};
use conquest_core::enums::{CombatantKind, PlayerStatus};
use conquest_core::events::GameEvent;
use conquest_core::ids::{CampId, PlayerId};
use conquest_core::types::{secs_to_ticks, Position};

use crate::store::EntityStore;
use crate::systems::production::spawn_point;
use crate::systems::TickContext;

pub fn run(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let game = store.game_record();
    let Some(started) = game.started_at_tick else {
        return;
    };
    let interval = secs_to_ticks(game.money_interval_secs, game.speed);
    let elapsed = ctx.tick.saturating_sub(started);
    if elapsed > 0 && elapsed % interval == 0 {
        pay_income(store, ctx, events);
    }
    grant_unit_bonuses(store, ctx, events);
}

/// Income for one payout: base plus the money bonus of every controlled
/// region.
pub fn income_for(store: &EntityStore, ctx: &TickContext, player: PlayerId) -> u32 {
    let region_bonus: u32 = ctx
        .map
        .regions
        .iter()
        .filter(|r| store.region_owner(r.id).and_then(|c| c.owner_id) == Some(player))
        .map(|r| r.money_bonus)
        .sum();
    ctx.rules.base_income.saturating_add(region_bonus)
}

fn pay_income(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let payouts: Vec<(PlayerId, u32)> = store
        .all_players()
        .filter(|p| p.status == PlayerStatus::Active)
        .map(|p| (p.id, income_for(store, ctx, p.id)))
        .collect();

    for (player_id, amount) in payouts {
        if let Some(p) = store.player_mut(player_id) {
            p.credit(amount);
            debug!(player = %player_id, amount, money = p.money, "income paid");
        }
        events.push(GameEvent::IncomePaid { player_id, amount });
    }
}

/// Regions with a unit bonus grant their controller free units every bonus
/// interval, counted from the last change of control.
fn grant_unit_bonuses(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    for region in &ctx.map.regions {
        let Some(bonus) = &region.unit_bonus else {
            continue;
        };
        let Some(control) = store.region_owner(region.id) else {
            continue;
        };
        let Some(owner) = control.owner_id else {
            continue;
        };
        let interval = secs_to_ticks(bonus.interval_secs, ctx.speed);
        let held_for = ctx.tick.saturating_sub(control.changed_at_tick);
        if held_for == 0 || held_for % interval != 0 {
            continue;
        }
        let Some(template) = ctx.catalog.unit_by_type(&bonus.unit_type, false) else {
            warn!(region = %region.id, unit_type = %bonus.unit_type, "no template for region bonus");
            continue;
        };

        let mut home: Vec<(CampId, Position)> = store
            .world()
            .query::<(&CampInfo, &Health)>()
            .iter()
            .filter(|(_, (info, hp))| info.owner == Some(owner) && hp.is_alive())
            .map(|(_, (info, _))| (info.id, Position::of_tile(info.tile_x, info.tile_y)))
            .filter(|(_, pos)| region.contains(pos))
            .collect();
        home.sort_by_key(|(id, _)| *id);
        let Some(&(camp_id, camp_pos)) = home.first() else {
            continue;
        };

        for _ in 0..bonus.count {
            let at = spawn_point(ctx.map, camp_pos, CombatantKind::Unit, ctx.rules.spawn_distance);
            let unit_id = store.spawn_unit(owner, template, at, Some(camp_id));
            events.push(GameEvent::UnitProduced {
                camp_id,
                unit_id,
                owner,
            });
        }
        debug!(region = %region.id, %owner, count = bonus.count, "region bonus granted");
    }
}
