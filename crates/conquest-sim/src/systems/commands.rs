//! Command Processor.
//!
//! Every command is first planned against the current store, which validates
//! it completely and yields an [`Effect`], and only then applied. Submission
//! runs the planning step alone, so a rejected command never mutates state.
//! Production orders are applied on acceptance, reserving money and a queue
//! slot. Everything else waits in the inbox. At the tick boundary the inbox
//! is planned again: units may have died or changed hands since acceptance,
//! and such stale commands are dropped and logged.

use std::collections::BTreeSet;

use hecs::Entity;
use tracing::{debug, warn};

use conquest_core::commands::{CommandEnvelope, PlayerCommand};
use conquest_core::components::{CampInfo, Health, Movement, Owner, UnitInfo};
use conquest_core::constants::MAX_CONTROL_GROUP;
use conquest_core::enums::{CombatantKind, GameStatus, PlayerStatus};
use conquest_core::error::{EntityRef, SimError, StateViolation};
use conquest_core::events::GameEvent;
use conquest_core::ids::*;
use conquest_core::records::{PlayerRecord, ProductionItem, ProductionOrder};
use conquest_core::types::{secs_to_ticks, Position};

use crate::store::EntityStore;
use crate::systems::TickContext;

/// An accepted command waiting in the inbox.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    /// Submission sequence number, unique per engine.
    pub seq: u64,
    pub envelope: CommandEnvelope,
}

impl QueuedCommand {
    /// Inbox order: arrival time, then connection, then submission order.
    pub fn order_key(&self) -> (u64, ConnectionId, u64) {
        (
            self.envelope.received_at_us,
            self.envelope.connection_id,
            self.seq,
        )
    }
}

/// A command accepted at submission that could not be applied at the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedCommand {
    pub seq: u64,
    pub player_id: PlayerId,
    pub label: &'static str,
    pub error: SimError,
}

/// When a command is being planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// On submission: every referenced entity must be valid.
    Submit,
    /// At the tick boundary: dead or lost units are left out of selections.
    Apply,
}

/// The validated mutation a command resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    MoveUnits(Vec<(UnitId, Entity, Position)>),
    MoveShips(Vec<(ShipId, Entity, Position)>),
    SetGroup {
        unit: UnitId,
        entity: Entity,
        group: Option<u8>,
    },
    Enqueue {
        player: PlayerId,
        camp: CampId,
        entity: Entity,
        order: ProductionOrder,
        price: u32,
    },
    Surrender(PlayerId),
}

impl Effect {
    /// Whether the effect takes hold at submission instead of the next tick.
    pub fn applies_on_submit(&self) -> bool {
        matches!(self, Effect::Enqueue { .. })
    }
}

/// Drain the inbox in arrival order and apply what is still valid.
pub fn run(
    store: &mut EntityStore,
    ctx: &TickContext,
    mut inbox: Vec<QueuedCommand>,
    events: &mut Vec<GameEvent>,
    dropped: &mut Vec<DroppedCommand>,
) {
    inbox.sort_by_key(QueuedCommand::order_key);
    for queued in inbox {
        let envelope = &queued.envelope;
        match plan(store, ctx, envelope, Check::Apply) {
            Ok(effect) => apply(store, ctx, effect, events),
            Err(error) => {
                if error.is_stale_reference() {
                    debug!(
                        seq = queued.seq,
                        player = %envelope.player_id,
                        command = envelope.command.label(),
                        %error,
                        "dropping stale command"
                    );
                } else {
                    warn!(
                        seq = queued.seq,
                        player = %envelope.player_id,
                        command = envelope.command.label(),
                        %error,
                        "command no longer applicable"
                    );
                }
                dropped.push(DroppedCommand {
                    seq: queued.seq,
                    player_id: envelope.player_id,
                    label: envelope.command.label(),
                    error,
                });
            }
        }
    }
}

/// Validate a command and compute its effect without touching the store.
pub fn plan(
    store: &EntityStore,
    ctx: &TickContext,
    envelope: &CommandEnvelope,
    check: Check,
) -> Result<Effect, SimError> {
    let issuer = authorize_issuer(store, envelope.player_id)?;
    let player = issuer.id;

    match &envelope.command {
        PlayerCommand::Move {
            unit_ids,
            target_x,
            target_y,
        } => {
            let target = checked_target(ctx, *target_x, *target_y, CombatantKind::Unit)?;
            let units = select_units(store, player, unit_ids, check)?;
            Ok(Effect::MoveUnits(assign_slots(ctx, units, target, CombatantKind::Unit)))
        }
        PlayerCommand::MoveGroup {
            group,
            target_x,
            target_y,
        } => {
            if *group > MAX_CONTROL_GROUP {
                return Err(StateViolation::InvalidGroup(*group).into());
            }
            let target = checked_target(ctx, *target_x, *target_y, CombatantKind::Unit)?;
            let ids = store.units_in_group(store.game_id(), player, *group)?;
            if ids.is_empty() {
                return Err(SimError::NotFound(EntityRef::ControlGroup(*group)));
            }
            let units = select_units(store, player, &ids, check)?;
            Ok(Effect::MoveUnits(assign_slots(ctx, units, target, CombatantKind::Unit)))
        }
        PlayerCommand::MoveShips {
            ship_ids,
            target_x,
            target_y,
        } => {
            let target = checked_target(ctx, *target_x, *target_y, CombatantKind::Ship)?;
            let ships = select_ships(store, player, ship_ids, check)?;
            Ok(Effect::MoveShips(assign_slots(ctx, ships, target, CombatantKind::Ship)))
        }
        PlayerCommand::SetGroup { unit_id, group } => {
            if let Some(g) = group {
                if *g > MAX_CONTROL_GROUP {
                    return Err(StateViolation::InvalidGroup(*g).into());
                }
            }
            let entity = owned_living_unit(store, player, *unit_id)?;
            Ok(Effect::SetGroup {
                unit: *unit_id,
                entity,
                group: *group,
            })
        }
        PlayerCommand::EnqueueProduction {
            camp_id,
            template_id,
        } => {
            let entity = producing_camp(store, player, *camp_id)?;
            let template = ctx.catalog.unit(*template_id)?;
            let camp_type = store
                .world()
                .get::<&CampInfo>(entity)
                .map_err(|_| SimError::NotFound(EntityRef::Camp(*camp_id)))?
                .camp_type;
            if !camp_type.builds_unit(template.is_advanced) {
                return Err(StateViolation::NotProducible.into());
            }
            let order = schedule(
                store,
                ctx,
                entity,
                *camp_id,
                ProductionItem::Unit(template.id),
                template.build_time_secs,
            )?;
            check_funds(issuer, template.price)?;
            Ok(Effect::Enqueue {
                player,
                camp: *camp_id,
                entity,
                order,
                price: template.price,
            })
        }
        PlayerCommand::EnqueueShip {
            camp_id,
            template_id,
        } => {
            let entity = producing_camp(store, player, *camp_id)?;
            let template = ctx.catalog.ship(*template_id)?;
            let camp_type = store
                .world()
                .get::<&CampInfo>(entity)
                .map_err(|_| SimError::NotFound(EntityRef::Camp(*camp_id)))?
                .camp_type;
            if !camp_type.builds_ships() {
                return Err(StateViolation::NotProducible.into());
            }
            let order = schedule(
                store,
                ctx,
                entity,
                *camp_id,
                ProductionItem::Ship(template.id),
                template.build_time_secs,
            )?;
            check_funds(issuer, template.price)?;
            Ok(Effect::Enqueue {
                player,
                camp: *camp_id,
                entity,
                order,
                price: template.price,
            })
        }
        PlayerCommand::Surrender => Ok(Effect::Surrender(player)),
    }
}

/// Apply a planned effect. Planning already validated everything.
pub fn apply(store: &mut EntityStore, ctx: &TickContext, effect: Effect, events: &mut Vec<GameEvent>) {
    match effect {
        Effect::MoveUnits(units) => {
            for (id, entity, slot) in units {
                if let Ok(mut movement) = store.world().get::<&mut Movement>(entity) {
                    movement.target = Some(slot);
                }
                store.mark_unit(id);
            }
        }
        Effect::MoveShips(ships) => {
            for (id, entity, slot) in ships {
                if let Ok(mut movement) = store.world().get::<&mut Movement>(entity) {
                    movement.target = Some(slot);
                }
                store.mark_ship(id);
            }
        }
        Effect::SetGroup {
            unit,
            entity,
            group,
        } => {
            if let Ok(mut info) = store.world().get::<&mut UnitInfo>(entity) {
                info.group = group;
            }
            store.mark_unit(unit);
        }
        Effect::Enqueue {
            player,
            camp,
            entity,
            order,
            price,
        } => {
            if let Some(p) = store.player_mut(player) {
                p.debit_clamped(price);
            }
            if let Ok(mut info) = store.world().get::<&mut CampInfo>(entity) {
                info.queue.push_back(order);
            }
            store.mark_camp(camp);
            debug!(%player, %camp, completes_at = order.completes_at_tick, "production queued");
        }
        Effect::Surrender(player) => {
            match store.set_player_status(player, PlayerStatus::Surrendered, ctx.tick) {
                Ok(()) => events.push(GameEvent::PlayerSurrendered { player_id: player }),
                Err(error) => warn!(%player, %error, "surrender not applied"),
            }
        }
    }
}

/// Grid formation around `center`: `ceil(sqrt(n))` columns, `spacing`
/// tiles apart. A single unit goes to the exact point.
pub fn formation_slots(center: Position, count: usize, spacing: f64) -> Vec<Position> {
    if count <= 1 {
        return vec![center; count];
    }
    let columns = (count as f64).sqrt().ceil() as usize;
    let half_rows = (count / columns) as f64 / 2.0;
    let half_cols = columns as f64 / 2.0;
    (0..count)
        .map(|i| {
            let row = (i / columns) as f64;
            let col = (i % columns) as f64;
            Position::new(
                center.x + (col - half_cols) * spacing,
                center.y + (row - half_rows) * spacing,
            )
        })
        .collect()
}

fn assign_slots<I: Copy>(
    ctx: &TickContext,
    selection: Vec<(I, Entity)>,
    target: Position,
    kind: CombatantKind,
) -> Vec<(I, Entity, Position)> {
    let slots = formation_slots(target, selection.len(), ctx.rules.formation_spacing);
    selection
        .into_iter()
        .zip(slots)
        .map(|((id, entity), slot)| {
            let slot = if ctx.map.accepts_target(&slot, kind) {
                slot
            } else {
                target
            };
            (id, entity, slot)
        })
        .collect()
}

fn authorize_issuer(store: &EntityStore, player: PlayerId) -> Result<&PlayerRecord, SimError> {
    let status = store.game_record().status;
    if status != GameStatus::InProgress {
        return Err(StateViolation::GameNotInProgress(status).into());
    }
    let record = store
        .player_by_id(player)
        .ok_or(SimError::NotFound(EntityRef::Player(player)))?;
    if record.status != PlayerStatus::Active {
        return Err(StateViolation::PlayerInactive(record.status).into());
    }
    Ok(record)
}

fn checked_target(ctx: &TickContext, x: f64, y: f64, kind: CombatantKind) -> Result<Position, SimError> {
    let target = Position::new(x, y);
    if ctx.map.accepts_target(&target, kind) {
        Ok(target)
    } else {
        Err(StateViolation::UnreachableTarget { x, y }.into())
    }
}

fn owned_living(
    store: &EntityStore,
    player: PlayerId,
    entity: Option<Entity>,
    entity_ref: EntityRef,
) -> Result<Entity, SimError> {
    let missing = SimError::NotFound(entity_ref);
    let entity = entity.ok_or_else(|| missing.clone())?;
    let alive = store
        .world()
        .get::<&Health>(entity)
        .map_err(|_| missing.clone())?
        .is_alive();
    if !alive {
        return Err(missing);
    }
    let owner = store.world().get::<&Owner>(entity).map_err(|_| missing)?.0;
    if owner != player {
        return Err(SimError::Unauthorized {
            player,
            entity: entity_ref,
        });
    }
    Ok(entity)
}

fn owned_living_unit(store: &EntityStore, player: PlayerId, id: UnitId) -> Result<Entity, SimError> {
    owned_living(store, player, store.unit_entity(id), EntityRef::Unit(id))
}

fn owned_living_ship(store: &EntityStore, player: PlayerId, id: ShipId) -> Result<Entity, SimError> {
    owned_living(store, player, store.ship_entity(id), EntityRef::Ship(id))
}

fn select<I: Copy + Ord + std::fmt::Display>(
    ids: &[I],
    check: Check,
    lookup: impl Fn(I) -> Result<Entity, SimError>,
) -> Result<Vec<(I, Entity)>, SimError> {
    let mut seen = BTreeSet::new();
    let mut selected = Vec::with_capacity(ids.len());
    for &id in ids {
        if !seen.insert(id) {
            continue;
        }
        match lookup(id) {
            Ok(entity) => selected.push((id, entity)),
            Err(error) if check == Check::Apply && error.is_stale_reference() => {
                debug!(%id, %error, "leaving stale entity out of selection");
            }
            Err(error) => return Err(error),
        }
    }
    if selected.is_empty() {
        return Err(StateViolation::EmptySelection.into());
    }
    Ok(selected)
}

fn select_units(
    store: &EntityStore,
    player: PlayerId,
    ids: &[UnitId],
    check: Check,
) -> Result<Vec<(UnitId, Entity)>, SimError> {
    select(ids, check, |id| owned_living_unit(store, player, id))
}

fn select_ships(
    store: &EntityStore,
    player: PlayerId,
    ids: &[ShipId],
    check: Check,
) -> Result<Vec<(ShipId, Entity)>, SimError> {
    select(ids, check, |id| owned_living_ship(store, player, id))
}

/// An owned camp able to take orders.
fn producing_camp(store: &EntityStore, player: PlayerId, id: CampId) -> Result<Entity, SimError> {
    let missing = SimError::NotFound(EntityRef::Camp(id));
    let entity = store.camp_entity(id).ok_or_else(|| missing.clone())?;
    let owner = store
        .world()
        .get::<&CampInfo>(entity)
        .map_err(|_| missing.clone())?
        .owner;
    if owner != Some(player) {
        return Err(SimError::Unauthorized {
            player,
            entity: EntityRef::Camp(id),
        });
    }
    let alive = store
        .world()
        .get::<&Health>(entity)
        .map_err(|_| missing)?
        .is_alive();
    if !alive {
        return Err(StateViolation::CampDisabled.into());
    }
    Ok(entity)
}

/// Completion tick of a new order: after the current last order, or build
/// time from now when the queue is idle.
fn schedule(
    store: &EntityStore,
    ctx: &TickContext,
    entity: Entity,
    camp: CampId,
    item: ProductionItem,
    build_time_secs: f64,
) -> Result<ProductionOrder, SimError> {
    let info = store
        .world()
        .get::<&CampInfo>(entity)
        .map_err(|_| SimError::NotFound(EntityRef::Camp(camp)))?;
    if info.queue.len() >= ctx.rules.max_queue_len {
        return Err(StateViolation::QueueFull(ctx.rules.max_queue_len).into());
    }
    let start = info
        .queue
        .back()
        .map_or(ctx.tick, |last| last.completes_at_tick.max(ctx.tick));
    Ok(ProductionOrder {
        item,
        completes_at_tick: start + secs_to_ticks(build_time_secs, ctx.speed),
    })
}

fn check_funds(player: &PlayerRecord, price: u32) -> Result<(), SimError> {
    if player.money < price {
        return Err(StateViolation::InsufficientFunds {
            needed: price,
            available: player.money,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_unit_gets_exact_target() {
        let c = Position::new(5.0, 5.0);
        assert_eq!(formation_slots(c, 1, 1.0), vec![c]);
        assert!(formation_slots(c, 0, 1.0).is_empty());
    }

    #[test]
    fn formation_is_a_grid() {
        let slots = formation_slots(Position::new(10.0, 10.0), 4, 1.0);
        // 2 columns, 2 rows, offsets (col - 1, row - 1).
        assert_eq!(
            slots,
            vec![
                Position::new(9.0, 9.0),
                Position::new(10.0, 9.0),
                Position::new(9.0, 10.0),
                Position::new(10.0, 10.0),
            ]
        );
        let five = formation_slots(Position::new(0.0, 0.0), 5, 2.0);
        assert_eq!(five.len(), 5);
        let distinct: BTreeSet<(i64, i64)> = five
            .iter()
            .map(|p| ((p.x * 10.0) as i64, (p.y * 10.0) as i64))
            .collect();
        assert_eq!(distinct.len(), 5);
    }

    #[test]
    fn inbox_orders_by_arrival_then_connection() {
        let cmd = |seq, at, conn| QueuedCommand {
            seq,
            envelope: CommandEnvelope::new(PlayerId(1), ConnectionId(conn), at, PlayerCommand::Surrender),
        };
        let mut inbox = vec![cmd(0, 20, 1), cmd(1, 10, 2), cmd(2, 10, 1), cmd(3, 10, 1)];
        inbox.sort_by_key(QueuedCommand::order_key);
        let order: Vec<u64> = inbox.iter().map(|q| q.seq).collect();
        assert_eq!(order, vec![2, 3, 1, 0]);
    }
}
