//! Match seeding: camps and regions from a map template.
//!
//! Starting positions go to the players in player-number order; every other
//! camp position, and starting positions nobody claimed, start neutral.

use tracing::debug;

use conquest_core::config::RulesConfig;
use conquest_core::error::{SimError, StateViolation};
use conquest_core::ids::PlayerId;
use conquest_core::map::MapTemplate;

use crate::store::EntityStore;

/// Check that the joined players fit the map.
pub fn check_capacity(store: &EntityStore, map: &MapTemplate) -> Result<(), SimError> {
    let joined = store.all_players().count();
    let needed = usize::from(map.min_players);
    if joined < needed {
        return Err(StateViolation::NotEnoughPlayers { needed, joined }.into());
    }
    let available = map.starting_positions().count();
    if joined > available {
        return Err(StateViolation::NotEnoughStartingPositions {
            needed: joined,
            available,
        }
        .into());
    }
    Ok(())
}

/// Spawn every camp of the map and register its regions.
pub fn seed_match(
    store: &mut EntityStore,
    map: &MapTemplate,
    rules: &RulesConfig,
    tick: u64,
) -> Result<(), SimError> {
    check_capacity(store, map)?;

    let mut players: Vec<(u8, PlayerId)> = store
        .all_players()
        .map(|p| (p.player_number, p.id))
        .collect();
    players.sort();
    let mut seats = players.into_iter().map(|(_, id)| id);

    for region in &map.regions {
        store.init_region(region.id, tick);
    }
    for slot in &map.camp_positions {
        let owner = if slot.is_starting_position {
            seats.next()
        } else {
            None
        };
        let region = map.find_region_at(&slot.position()).map(|r| r.id);
        let camp = store.spawn_camp(slot, owner, region, rules);
        debug!(%camp, x = slot.tile_x, y = slot.tile_y, ?owner, ?region, "camp seeded");
    }
    Ok(())
}
