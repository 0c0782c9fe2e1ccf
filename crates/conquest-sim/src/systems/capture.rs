//! Camp capture.
//!
//! A camp at 0 HP is taken by the nearest living enemy unit within the
//! capture radius (ties by unit id). Owner, HP and capture tick change
//! together; the production queue is discarded.

use hecs::Entity;
use tracing::info;

use conquest_core::components::{CampInfo, Health, Owner, UnitInfo};
use conquest_core::events::GameEvent;
use conquest_core::ids::{CampId, PlayerId, UnitId};
use conquest_core::types::Position;

use crate::store::EntityStore;
use crate::systems::TickContext;

struct DownedCamp {
    id: CampId,
    entity: Entity,
    owner: Option<PlayerId>,
    position: Position,
}

pub fn run(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let mut downed: Vec<DownedCamp> = store
        .world()
        .query::<(&CampInfo, &Health, &Position)>()
        .iter()
        .filter(|(_, (_, hp, _))| !hp.is_alive())
        .map(|(entity, (info, _, pos))| DownedCamp {
            id: info.id,
            entity,
            owner: info.owner,
            position: *pos,
        })
        .collect();
    if downed.is_empty() {
        return;
    }
    downed.sort_by_key(|c| c.id);

    let mut units: Vec<(UnitId, PlayerId, Position)> = store
        .world()
        .query::<(&UnitInfo, &Owner, &Health, &Position)>()
        .iter()
        .filter(|(_, (_, _, hp, _))| hp.is_alive())
        .map(|(_, (info, owner, _, pos))| (info.id, owner.0, *pos))
        .collect();
    units.sort_by_key(|(id, ..)| *id);

    for camp in downed {
        let capturer = units
            .iter()
            .filter(|(_, owner, _)| Some(*owner) != camp.owner)
            .map(|(id, owner, pos)| (*id, *owner, pos.distance_to(&camp.position)))
            .filter(|(_, _, d)| *d <= ctx.rules.capture_radius)
            .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
        let Some((unit_id, new_owner, _)) = capturer else {
            continue;
        };

        {
            let world = store.world();
            let (Ok(mut info), Ok(mut hp)) = (
                world.get::<&mut CampInfo>(camp.entity),
                world.get::<&mut Health>(camp.entity),
            ) else {
                continue;
            };
            let reset = ctx.rules.capture_hp(hp.max);
            info.owner = Some(new_owner);
            info.captured_at_tick = Some(ctx.tick);
            info.queue.clear();
            hp.set(reset);
        }
        store.mark_camp(camp.id);

        if let Some(p) = store.player_mut(new_owner) {
            p.stats.camps_captured += 1;
        }
        if let Some(previous) = camp.owner {
            if let Some(p) = store.player_mut(previous) {
                p.stats.camps_lost += 1;
            }
        }
        info!(camp = %camp.id, by = %unit_id, to = %new_owner, from = ?camp.owner, "camp captured");
        events.push(GameEvent::CampCaptured {
            camp_id: camp.id,
            from: camp.owner,
            to: new_owner,
        });
    }
}
