//! Movement integration and isometric facing.
//!
//! Entities with a target advance `speed × dt × game_speed` tiles per tick
//! and snap onto the target when it is within one step.

use glam::DVec2;

use conquest_core::components::{Heading, Health, Movement, ShipInfo, UnitInfo};
use conquest_core::constants::{ARRIVAL_EPSILON, DT, IDLE_SPEED_EPSILON};
use conquest_core::enums::Facing;
use conquest_core::types::Position;

use crate::store::EntityStore;
use crate::systems::TickContext;

/// Advance every living unit and ship toward its target.
pub fn run(store: &mut EntityStore, ctx: &TickContext) {
    let step_scale = DT * ctx.speed;
    let mut moved_units = Vec::new();
    let mut moved_ships = Vec::new();

    for (_entity, (info, pos, hp, movement, heading)) in store
        .world_mut()
        .query_mut::<(&UnitInfo, &mut Position, &Health, &mut Movement, &mut Heading)>()
    {
        if hp.is_alive() && step(pos, movement, heading, step_scale) {
            moved_units.push(info.id);
        }
    }
    for (_entity, (info, pos, hp, movement, heading)) in store
        .world_mut()
        .query_mut::<(&ShipInfo, &mut Position, &Health, &mut Movement, &mut Heading)>()
    {
        if hp.is_alive() && step(pos, movement, heading, step_scale) {
            moved_ships.push(info.id);
        }
    }

    for id in moved_units {
        store.mark_unit(id);
    }
    for id in moved_ships {
        store.mark_ship(id);
    }
}

/// One integration step. Returns true if anything changed.
pub fn step(pos: &mut Position, movement: &mut Movement, heading: &mut Heading, step_scale: f64) -> bool {
    let Some(target) = movement.target else {
        return false;
    };
    let delta = target.as_vec() - pos.as_vec();
    let dist = delta.length();
    if dist > IDLE_SPEED_EPSILON {
        *heading = facing_for(delta);
    }
    let max_step = movement.speed * step_scale;
    if dist <= max_step || dist < ARRIVAL_EPSILON {
        *pos = target;
        movement.target = None;
    } else {
        *pos = Position::from_vec(pos.as_vec() + delta / dist * max_step);
    }
    true
}

/// Bucket a displacement into one of five isometric facings. Rightward
/// side movement reuses the side sprite mirrored.
pub fn facing_for(delta: DVec2) -> Heading {
    let angle = delta.y.atan2(delta.x).to_degrees();
    let facing = if (-157.5..-112.5).contains(&angle) {
        Facing::Back
    } else if (-112.5..-67.5).contains(&angle) {
        Facing::BackSide
    } else if (67.5..112.5).contains(&angle) {
        Facing::FrontSide
    } else if (22.5..67.5).contains(&angle) {
        Facing::Front
    } else {
        Facing::Side
    };
    Heading {
        facing,
        mirrored: delta.x > 0.0 && facing == Facing::Side,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facing_buckets() {
        assert_eq!(facing_for(DVec2::new(-1.0, -1.0)).facing, Facing::Back);
        assert_eq!(facing_for(DVec2::new(0.0, -1.0)).facing, Facing::BackSide);
        assert_eq!(facing_for(DVec2::new(0.0, 1.0)).facing, Facing::FrontSide);
        assert_eq!(facing_for(DVec2::new(1.0, 1.0)).facing, Facing::Front);
        let left = facing_for(DVec2::new(-1.0, 0.0));
        assert_eq!((left.facing, left.mirrored), (Facing::Side, false));
        let right = facing_for(DVec2::new(1.0, 0.0));
        assert_eq!((right.facing, right.mirrored), (Facing::Side, true));
        // Down-left falls through to the side sprite, unmirrored.
        let down_left = facing_for(DVec2::new(-1.0, 1.0));
        assert_eq!((down_left.facing, down_left.mirrored), (Facing::Side, false));
    }

    #[test]
    fn step_snaps_onto_target() {
        let mut pos = Position::new(0.0, 0.0);
        let mut mv = Movement {
            target: Some(Position::new(0.25, 0.0)),
            speed: 3.0,
        };
        let mut heading = Heading::default();
        assert!(step(&mut pos, &mut mv, &mut heading, DT));
        assert_eq!(pos, Position::new(0.25, 0.0));
        assert!(mv.target.is_none());
        assert!(!step(&mut pos, &mut mv, &mut heading, DT));
    }

    #[test]
    fn step_advances_at_speed() {
        let mut pos = Position::new(0.0, 0.0);
        let mut mv = Movement {
            target: Some(Position::new(10.0, 0.0)),
            speed: 2.0,
        };
        let mut heading = Heading::default();
        step(&mut pos, &mut mv, &mut heading, DT * 2.0);
        assert!((pos.x - 0.4).abs() < 1e-9);
        assert!(heading.mirrored);
    }
}
