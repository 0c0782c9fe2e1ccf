//! Region control.
//!
//! A region belongs to the player holding a strict majority of the camps
//! whose tile position lies inside its polygon, otherwise to nobody. The
//! computation depends only on current camp ownership.

use std::collections::BTreeMap;

use tracing::info;

use conquest_core::components::CampInfo;
use conquest_core::events::GameEvent;
use conquest_core::ids::PlayerId;
use conquest_core::map::RegionDef;
use conquest_core::types::Position;

use crate::store::EntityStore;
use crate::systems::TickContext;

/// Controller of `region` given every camp's position and owner.
pub fn controller(region: &RegionDef, camps: &[(Position, Option<PlayerId>)]) -> Option<PlayerId> {
    let mut total = 0usize;
    let mut held: BTreeMap<PlayerId, usize> = BTreeMap::new();
    for (pos, owner) in camps {
        if !region.contains(pos) {
            continue;
        }
        total += 1;
        if let Some(owner) = owner {
            *held.entry(*owner).or_default() += 1;
        }
    }
    held.into_iter()
        .find(|&(_, count)| count * 2 > total)
        .map(|(player, _)| player)
}

pub fn run(store: &mut EntityStore, ctx: &TickContext, events: &mut Vec<GameEvent>) {
    let camps: Vec<(Position, Option<PlayerId>)> = store
        .world()
        .query::<&CampInfo>()
        .iter()
        .map(|(_, info)| (Position::of_tile(info.tile_x, info.tile_y), info.owner))
        .collect();

    for region in &ctx.map.regions {
        let owner = controller(region, &camps);
        if let Some(from) = store.set_region_owner(region.id, owner, ctx.tick) {
            info!(region = %region.id, name = %region.name, ?from, to = ?owner, "region control changed");
            events.push(GameEvent::RegionControlChanged {
                region_id: region.id,
                from,
                to: owner,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conquest_core::ids::RegionId;

    fn region() -> RegionDef {
        RegionDef {
            id: RegionId(1),
            name: "r".into(),
            color: String::new(),
            money_bonus: 0,
            unit_bonus: None,
            boundary: vec![
                Position::new(0.0, 0.0),
                Position::new(10.0, 0.0),
                Position::new(10.0, 10.0),
                Position::new(0.0, 10.0),
            ],
        }
    }

    #[test]
    fn strict_majority_required() {
        let a = Some(PlayerId(1));
        let b = Some(PlayerId(2));
        let p = |x| Position::new(x, 5.0);
        assert_eq!(controller(&region(), &[(p(1.0), a)]), a);
        assert_eq!(controller(&region(), &[(p(1.0), a), (p(2.0), b)]), None);
        assert_eq!(controller(&region(), &[(p(1.0), a), (p(2.0), None)]), None);
        assert_eq!(controller(&region(), &[(p(1.0), a), (p(2.0), a), (p(3.0), b)]), a);
        // Camps outside the polygon do not count.
        assert_eq!(controller(&region(), &[(p(1.0), a), (p(20.0), b), (p(30.0), b)]), a);
        assert_eq!(controller(&region(), &[]), None);
    }
}
