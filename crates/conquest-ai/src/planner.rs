//! Command planner for AI-controlled players.
//!
//! Each round the planner spends money above its reserve on production and
//! sends idle units, once there are enough of them, toward the nearest camp
//! it does not own.

use glam::DVec2;
use rand::seq::SliceRandom;
use rand::Rng;

use conquest_core::commands::PlayerCommand;
use conquest_core::enums::PlayerStatus;
use conquest_core::ids::{PlayerId, UnitId};
use conquest_core::state::{CampView, GameStateSnapshot};
use conquest_core::templates::TemplateCatalog;

use crate::profiles::AiProfile;

/// Everything the planner reads for one player.
pub struct AiContext<'a> {
    pub player: PlayerId,
    pub snapshot: &'a GameStateSnapshot,
    pub catalog: &'a TemplateCatalog,
    pub profile: &'a AiProfile,
}

/// Plan this round's commands. Returns nothing for players that are no
/// longer active.
pub fn plan<R: Rng + ?Sized>(ctx: &AiContext<'_>, rng: &mut R) -> Vec<PlayerCommand> {
    let mut commands = Vec::new();
    let Some(me) = ctx.snapshot.player(ctx.player) else {
        return commands;
    };
    if me.status != PlayerStatus::Active {
        return commands;
    }
    plan_production(ctx, me.money, rng, &mut commands);
    if let Some(attack) = plan_attack(ctx) {
        commands.push(attack);
    }
    commands
}

fn plan_production<R: Rng + ?Sized>(
    ctx: &AiContext<'_>,
    money: u32,
    rng: &mut R,
    out: &mut Vec<PlayerCommand>,
) {
    let mut budget = money;
    for camp in ctx.snapshot.camps_of(ctx.player) {
        let spendable = budget.saturating_sub(ctx.profile.money_reserve);
        if spendable == 0 {
            break;
        }
        let record = &camp.record;
        if record.current_hp == 0 || record.production_queue.len() >= ctx.profile.max_orders_per_camp {
            continue;
        }
        let choice = if record.camp_type.builds_ships() {
            let options: Vec<_> = ctx
                .catalog
                .ships
                .iter()
                .filter(|s| s.base_damage > 0 && s.price <= spendable)
                .collect();
            options.choose(rng).map(|s| {
                (
                    PlayerCommand::EnqueueShip {
                        camp_id: record.id,
                        template_id: s.id,
                    },
                    s.price,
                )
            })
        } else {
            let options: Vec<_> = ctx
                .catalog
                .units
                .iter()
                .filter(|u| record.camp_type.builds_unit(u.is_advanced) && u.price <= spendable)
                .collect();
            options.choose(rng).map(|u| {
                (
                    PlayerCommand::EnqueueProduction {
                        camp_id: record.id,
                        template_id: u.id,
                    },
                    u.price,
                )
            })
        };
        if let Some((command, price)) = choice {
            budget -= price;
            out.push(command);
        }
    }
}

fn plan_attack(ctx: &AiContext<'_>) -> Option<PlayerCommand> {
    let idle: Vec<_> = ctx
        .snapshot
        .units_of(ctx.player)
        .filter(|u| u.record.target.is_none())
        .collect();
    if idle.is_empty() || idle.len() < ctx.profile.attack_group_size {
        return None;
    }
    let centroid = idle
        .iter()
        .map(|u| u.record.position.as_vec())
        .sum::<DVec2>()
        / idle.len() as f64;
    let target = nearest_foreign_camp(ctx.snapshot, ctx.player, centroid)?;
    let unit_ids: Vec<UnitId> = idle.iter().map(|u| u.record.id).collect();
    let pos = target.record.position();
    Some(PlayerCommand::Move {
        unit_ids,
        target_x: pos.x,
        target_y: pos.y,
    })
}

/// Closest camp not owned by `player`, ties broken by camp id. Enemy camps
/// and neutral outposts are both fair game.
pub fn nearest_foreign_camp(
    snapshot: &GameStateSnapshot,
    player: PlayerId,
    from: DVec2,
) -> Option<&CampView> {
    snapshot
        .camps
        .iter()
        .filter(|c| c.record.owner_id != Some(player))
        .min_by(|a, b| {
            let da = a.record.position().as_vec().distance(from);
            let db = b.record.position().as_vec().distance(from);
            da.total_cmp(&db).then(a.record.id.cmp(&b.record.id))
        })
}

