//! Production queue processing.
//!
//! Orders at the front of a camp's queue whose completion tick has passed
//! spawn next to the camp for its current owner. Camps at 0 HP hold their
//! queue until they are captured (which clears it) or repaired.

use tracing::{debug, warn};

use conquest_core::components::{CampInfo, Health};
use conquest_core::enums::CombatantKind;
use conquest_core::events::GameEvent;
use conquest_core::ids::{CampId, PlayerId};
use conquest_core::map::MapTemplate;
use conquest_core::records::ProductionItem;
use conquest_core::types::Position;

use crate::store::EntityStore;
use crate::systems::TickContext;

/// Directions tried, in order, when placing a new unit around a camp.
const SPAWN_DIRECTIONS: [(f64, f64); 8] = [
    (1.0, 0.0),
    (0.0, 1.0),
    (-1.0, 0.0),
    (0.0, -1.0),
    (1.0, 1.0),
    (-1.0, 1.0),
    (1.0, -1.0),
    (-1.0, -1.0),
];

pub fn run(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let mut completed: Vec<(CampId, PlayerId, Position, ProductionItem)> = Vec::new();
    for (_entity, (info, hp, pos)) in store
        .world_mut()
        .query_mut::<(&mut CampInfo, &Health, &Position)>()
    {
        let Some(owner) = info.owner else { continue };
        if !hp.is_alive() {
            continue;
        }
        while let Some(order) = info.queue.front().copied() {
            if order.completes_at_tick > ctx.tick {
                break;
            }
            info.queue.pop_front();
            completed.push((info.id, owner, *pos, order.item));
        }
    }
    completed.sort_by_key(|(camp, ..)| *camp);

    for (camp, owner, camp_pos, item) in completed {
        store.mark_camp(camp);
        match item {
            ProductionItem::Unit(template_id) => match ctx.catalog.unit(template_id) {
                Ok(template) => {
                    let at = spawn_point(ctx.map, camp_pos, CombatantKind::Unit, ctx.rules.spawn_distance);
                    let unit_id = store.spawn_unit(owner, template, at, Some(camp));
                    debug!(%camp, %owner, %unit_id, unit = %template.name, "unit produced");
                    events.push(GameEvent::UnitProduced {
                        camp_id: camp,
                        unit_id,
                        owner,
                    });
                }
                Err(error) => warn!(%camp, %error, "discarding order for unknown template"),
            },
            ProductionItem::Ship(template_id) => match ctx.catalog.ship(template_id) {
                Ok(template) => {
                    let at = spawn_point(ctx.map, camp_pos, CombatantKind::Ship, ctx.rules.spawn_distance);
                    let ship_id = store.spawn_ship(owner, template, at, Some(camp));
                    debug!(%camp, %owner, %ship_id, ship = %template.name, "ship produced");
                    events.push(GameEvent::ShipProduced {
                        camp_id: camp,
                        ship_id,
                        owner,
                    });
                }
                Err(error) => warn!(%camp, %error, "discarding order for unknown template"),
            },
        }
    }
}

/// First free spot around a camp where `kind` may stand, or the camp itself.
pub fn spawn_point(map: &MapTemplate, camp: Position, kind: CombatantKind, distance: f64) -> Position {
    SPAWN_DIRECTIONS
        .iter()
        .map(|&(dx, dy)| Position::new(camp.x + dx * distance, camp.y + dy * distance))
        .find(|p| map.accepts_target(p, kind))
        .unwrap_or(camp)
}
