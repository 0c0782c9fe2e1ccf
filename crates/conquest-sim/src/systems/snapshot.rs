//! Snapshot system: builds the `GameStateSnapshot` after each tick.
//!
//! Reads the store without mutating it. Dead units and ships are left out;
//! owner player numbers and colors are joined in for presentation.

use std::collections::BTreeMap;

use conquest_core::events::GameEvent;
use conquest_core::ids::PlayerId;
use conquest_core::map::MapTemplate;
use conquest_core::records::PlayerRecord;
use conquest_core::state::*;
use conquest_core::templates::TemplateCatalog;
use conquest_core::types::SimTime;

use crate::store::EntityStore;

pub fn build_snapshot(
    store: &EntityStore,
    catalog: &TemplateCatalog,
    map: &MapTemplate,
    time: SimTime,
    events: Vec<GameEvent>,
) -> GameStateSnapshot {
    let players: Vec<PlayerRecord> = store.all_players().cloned().collect();
    let owners: BTreeMap<PlayerId, (u8, String)> = players
        .iter()
        .map(|p| (p.id, (p.player_number, p.color.clone())))
        .collect();
    let number_of = |id: Option<PlayerId>| id.and_then(|id| owners.get(&id)).map(|(n, _)| *n);
    let color_of = |id: Option<PlayerId>| id.and_then(|id| owners.get(&id)).map(|(_, c)| c.clone());

    let camps = store
        .camp_ids()
        .filter_map(|(_, entity)| store.camp_record(entity))
        .map(|record| CampView {
            owner_player_number: number_of(record.owner_id),
            owner_color: color_of(record.owner_id),
            record,
        })
        .collect();

    let units = store
        .unit_ids()
        .filter_map(|(_, entity)| store.unit_record(entity))
        .filter(|record| record.is_alive)
        .map(|record| {
            let template = catalog.unit(record.template_id).ok();
            UnitView {
                unit_type: template.map(|t| t.unit_type.clone()).unwrap_or_default(),
                max_hp: template.map_or(record.current_hp, |t| t.base_hp),
                owner_player_number: number_of(Some(record.owner_id)).unwrap_or_default(),
                owner_color: color_of(Some(record.owner_id)).unwrap_or_default(),
                record,
            }
        })
        .collect();

    let ships = store
        .ship_ids()
        .filter_map(|(_, entity)| store.ship_record(entity))
        .filter(|record| record.is_alive)
        .map(|record| {
            let template = catalog.ship(record.template_id).ok();
            ShipView {
                ship_type: template.map(|t| t.ship_type.clone()).unwrap_or_default(),
                max_hp: template.map_or(record.current_hp, |t| t.base_hp),
                owner_player_number: number_of(Some(record.owner_id)).unwrap_or_default(),
                owner_color: color_of(Some(record.owner_id)).unwrap_or_default(),
                record,
            }
        })
        .collect();

    let region_control = store
        .region_control(store.game_id())
        .unwrap_or_default()
        .into_iter()
        .map(|record| RegionControlView {
            region_name: map
                .region(record.region_id)
                .map(|r| r.name.clone())
                .unwrap_or_default(),
            owner_player_number: number_of(record.owner_id),
            owner_color: color_of(record.owner_id),
            record,
        })
        .collect();

    GameStateSnapshot {
        game: store.game_record().clone(),
        time,
        players,
        camps,
        units,
        ships,
        region_control,
        events,
    }
}
