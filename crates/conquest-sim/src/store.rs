//! Entity Store: the authoritative in-memory state of one game.
//!
//! Units, ships and camps are hecs entities indexed by id; players and region
//! control live in ordered maps. Every public lookup takes the game id and
//! fails with `NotFound` when it does not match. Mutations mark the touched
//! record dirty, and `take_delta` drains the dirty set into a `StateDelta`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use hecs::{Entity, World};

use conquest_core::components::*;
use conquest_core::config::RulesConfig;
use conquest_core::constants::player_color;
use conquest_core::enums::*;
use conquest_core::error::{EntityRef, SimError, StateViolation};
use conquest_core::ids::*;
use conquest_core::map::CampPosition;
use conquest_core::records::*;
use conquest_core::templates::{ShipTemplate, UnitTemplate};
use conquest_core::types::{hit_interval_ticks, Position};

#[derive(Debug, Default)]
struct DirtySet {
    game: bool,
    players: BTreeSet<PlayerId>,
    camps: BTreeSet<CampId>,
    units: BTreeSet<UnitId>,
    ships: BTreeSet<ShipId>,
    regions: BTreeSet<RegionId>,
}

/// All entities of a single game.
pub struct EntityStore {
    game: GameRecord,
    world: World,
    players: BTreeMap<PlayerId, PlayerRecord>,
    camps: BTreeMap<CampId, Entity>,
    units: BTreeMap<UnitId, Entity>,
    ships: BTreeMap<ShipId, Entity>,
    region_control: BTreeMap<RegionId, RegionControlRecord>,
    next_player_id: u64,
    next_camp_id: u64,
    next_unit_id: u64,
    next_ship_id: u64,
    dirty: DirtySet,
}

impl EntityStore {
    pub fn new(game: GameRecord) -> Self {
        Self {
            game,
            world: World::new(),
            players: BTreeMap::new(),
            camps: BTreeMap::new(),
            units: BTreeMap::new(),
            ships: BTreeMap::new(),
            region_control: BTreeMap::new(),
            next_player_id: 1,
            next_camp_id: 1,
            next_unit_id: 1,
            next_ship_id: 1,
            dirty: DirtySet {
                game: true,
                ..Default::default()
            },
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game.id
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub(crate) fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    fn scoped(&self, game_id: GameId, missing: EntityRef) -> Result<(), SimError> {
        if game_id == self.game.id {
            Ok(())
        } else {
            Err(SimError::NotFound(missing))
        }
    }

    // ---- Reads ----

    pub fn game(&self, game_id: GameId) -> Result<&GameRecord, SimError> {
        self.scoped(game_id, EntityRef::Game(game_id))?;
        Ok(&self.game)
    }

    pub(crate) fn game_record(&self) -> &GameRecord {
        &self.game
    }

    pub fn player(&self, game_id: GameId, id: PlayerId) -> Result<&PlayerRecord, SimError> {
        self.scoped(game_id, EntityRef::Player(id))?;
        self.players
            .get(&id)
            .ok_or(SimError::NotFound(EntityRef::Player(id)))
    }

    /// Players of the game, ordered by id.
    pub fn players(
        &self,
        game_id: GameId,
    ) -> Result<impl Iterator<Item = &PlayerRecord> + '_, SimError> {
        self.scoped(game_id, EntityRef::Game(game_id))?;
        Ok(self.players.values())
    }

    pub(crate) fn all_players(&self) -> impl Iterator<Item = &PlayerRecord> + '_ {
        self.players.values()
    }

    pub(crate) fn player_by_id(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    /// Mutable access to a player. The player is marked dirty.
    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerRecord> {
        let player = self.players.get_mut(&id)?;
        self.dirty.players.insert(id);
        Some(player)
    }

    pub fn camp(&self, game_id: GameId, id: CampId) -> Result<CampRecord, SimError> {
        self.scoped(game_id, EntityRef::Camp(id))?;
        self.camps
            .get(&id)
            .and_then(|&e| self.camp_record(e))
            .ok_or(SimError::NotFound(EntityRef::Camp(id)))
    }

    /// A unit record, including dead units retained for statistics.
    pub fn unit(&self, game_id: GameId, id: UnitId) -> Result<UnitRecord, SimError> {
        self.scoped(game_id, EntityRef::Unit(id))?;
        self.units
            .get(&id)
            .and_then(|&e| self.unit_record(e))
            .ok_or(SimError::NotFound(EntityRef::Unit(id)))
    }

    pub fn ship(&self, game_id: GameId, id: ShipId) -> Result<ShipRecord, SimError> {
        self.scoped(game_id, EntityRef::Ship(id))?;
        self.ships
            .get(&id)
            .and_then(|&e| self.ship_record(e))
            .ok_or(SimError::NotFound(EntityRef::Ship(id)))
    }

    pub fn region_control(&self, game_id: GameId) -> Result<Vec<RegionControlRecord>, SimError> {
        self.scoped(game_id, EntityRef::Game(game_id))?;
        Ok(self.region_control.values().cloned().collect())
    }

    pub(crate) fn region_owner(&self, region: RegionId) -> Option<&RegionControlRecord> {
        self.region_control.get(&region)
    }

    /// Living units of `owner` assigned to `group`, in id order.
    pub fn units_in_group(
        &self,
        game_id: GameId,
        owner: PlayerId,
        group: u8,
    ) -> Result<Vec<UnitId>, SimError> {
        self.scoped(game_id, EntityRef::Player(owner))?;
        let mut ids: Vec<UnitId> = self
            .world
            .query::<(&UnitInfo, &Owner, &Health)>()
            .iter()
            .filter(|(_, (info, o, hp))| o.0 == owner && hp.is_alive() && info.group == Some(group))
            .map(|(_, (info, _, _))| info.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub(crate) fn camp_entity(&self, id: CampId) -> Option<Entity> {
        self.camps.get(&id).copied()
    }

    pub(crate) fn unit_entity(&self, id: UnitId) -> Option<Entity> {
        self.units.get(&id).copied()
    }

    pub(crate) fn ship_entity(&self, id: ShipId) -> Option<Entity> {
        self.ships.get(&id).copied()
    }

    pub(crate) fn camp_ids(&self) -> impl Iterator<Item = (CampId, Entity)> + '_ {
        self.camps.iter().map(|(&id, &e)| (id, e))
    }

    pub(crate) fn unit_ids(&self) -> impl Iterator<Item = (UnitId, Entity)> + '_ {
        self.units.iter().map(|(&id, &e)| (id, e))
    }

    pub(crate) fn ship_ids(&self) -> impl Iterator<Item = (ShipId, Entity)> + '_ {
        self.ships.iter().map(|(&id, &e)| (id, e))
    }

    // ---- Record conversion ----

    pub(crate) fn camp_record(&self, entity: Entity) -> Option<CampRecord> {
        let mut q = self
            .world
            .query_one::<(&CampInfo, &Health, &Weapon)>(entity)
            .ok()?;
        let (info, hp, weapon) = q.get()?;
        Some(CampRecord {
            id: info.id,
            game_id: self.game.id,
            owner_id: info.owner,
            tile_x: info.tile_x,
            tile_y: info.tile_y,
            camp_type: info.camp_type,
            region_id: info.region,
            current_hp: hp.current,
            max_hp: hp.max,
            turret_damage: info.turret_damage,
            turret_range: weapon.range,
            captured_at_tick: info.captured_at_tick,
            production_queue: info.queue.iter().copied().collect(),
        })
    }

    pub(crate) fn unit_record(&self, entity: Entity) -> Option<UnitRecord> {
        let mut q = self
            .world
            .query_one::<(&UnitInfo, &Owner, &Position, &Health, &Movement, &Heading)>(entity)
            .ok()?;
        let (info, owner, pos, hp, movement, heading) = q.get()?;
        Some(UnitRecord {
            id: info.id,
            game_id: self.game.id,
            owner_id: owner.0,
            template_id: info.template,
            position: *pos,
            current_hp: hp.current,
            target: movement.target,
            is_alive: hp.is_alive(),
            source_camp_id: info.source_camp,
            group_number: info.group,
            died_at_tick: info.died_at_tick,
            facing: heading.facing,
            mirrored: heading.mirrored,
        })
    }

    pub(crate) fn ship_record(&self, entity: Entity) -> Option<ShipRecord> {
        let mut q = self
            .world
            .query_one::<(&ShipInfo, &Owner, &Position, &Health, &Movement, &Heading)>(entity)
            .ok()?;
        let (info, owner, pos, hp, movement, heading) = q.get()?;
        Some(ShipRecord {
            id: info.id,
            game_id: self.game.id,
            owner_id: owner.0,
            template_id: info.template,
            position: *pos,
            current_hp: hp.current,
            target: movement.target,
            is_alive: hp.is_alive(),
            source_camp_id: info.source_camp,
            died_at_tick: info.died_at_tick,
            facing: heading.facing,
            mirrored: heading.mirrored,
        })
    }

    // ---- Writes ----

    /// Join a waiting game. The player receives the game's starting money
    /// and the next free player number.
    pub fn add_player(
        &mut self,
        user_id: Option<UserId>,
        display_name: impl Into<String>,
        ai_difficulty: Option<AiDifficulty>,
    ) -> Result<PlayerId, SimError> {
        if self.game.status != GameStatus::Waiting {
            return Err(StateViolation::LobbyClosed(self.game.status).into());
        }
        let max = usize::from(self.game.max_players);
        if self.players.len() >= max {
            return Err(StateViolation::GameFull(max).into());
        }
        let number = self.players.values().map(|p| p.player_number).max().unwrap_or(0) + 1;
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        let ai_difficulty = if user_id.is_none() {
            Some(ai_difficulty.unwrap_or_default())
        } else {
            None
        };
        self.players.insert(
            id,
            PlayerRecord {
                id,
                game_id: self.game.id,
                user_id,
                ai_difficulty,
                player_number: number,
                display_name: display_name.into(),
                color: player_color(number).to_string(),
                money: self.game.starting_money,
                status: PlayerStatus::Active,
                stats: PlayerStats::default(),
                left_at_tick: None,
            },
        );
        self.dirty.players.insert(id);
        Ok(id)
    }

    /// Move the game forward in its lifecycle. Stamps start and end ticks.
    pub fn set_game_status(&mut self, next: GameStatus, tick: u64) -> Result<(), SimError> {
        let from = self.game.status;
        if !from.can_transition_to(next) {
            return Err(StateViolation::IllegalGameTransition { from, to: next }.into());
        }
        self.game.status = next;
        match next {
            GameStatus::InProgress => self.game.started_at_tick = Some(tick),
            GameStatus::Finished | GameStatus::Abandoned => self.game.ended_at_tick = Some(tick),
            GameStatus::Waiting => {}
        }
        self.dirty.game = true;
        Ok(())
    }

    pub fn set_winner(&mut self, winner: Option<PlayerId>) {
        self.game.winner_id = winner;
        self.dirty.game = true;
    }

    pub fn set_player_status(
        &mut self,
        id: PlayerId,
        next: PlayerStatus,
        tick: u64,
    ) -> Result<(), SimError> {
        let player = self
            .players
            .get_mut(&id)
            .ok_or(SimError::NotFound(EntityRef::Player(id)))?;
        let from = player.status;
        if !from.can_transition_to(next) {
            return Err(StateViolation::IllegalPlayerTransition { from, to: next }.into());
        }
        player.status = next;
        player.left_at_tick = match next {
            PlayerStatus::Active => None,
            _ => Some(tick),
        };
        self.dirty.players.insert(id);
        Ok(())
    }

    pub fn spawn_camp(
        &mut self,
        slot: &CampPosition,
        owner: Option<PlayerId>,
        region: Option<RegionId>,
        rules: &RulesConfig,
    ) -> CampId {
        let id = CampId(self.next_camp_id);
        self.next_camp_id += 1;
        let entity = self.world.spawn((
            CampInfo {
                id,
                camp_type: slot.camp_type,
                tile_x: slot.tile_x,
                tile_y: slot.tile_y,
                region,
                owner,
                captured_at_tick: None,
                turret_damage: slot.turret_damage,
                queue: VecDeque::new(),
            },
            slot.position(),
            Health::full(slot.max_hp),
            Weapon {
                range: slot.turret_range,
                hit_interval_ticks: hit_interval_ticks(rules.turret_hit_speed, self.game.speed),
                ready_at_tick: 0,
            },
        ));
        self.camps.insert(id, entity);
        self.dirty.camps.insert(id);
        id
    }

    pub fn spawn_unit(
        &mut self,
        owner: PlayerId,
        template: &UnitTemplate,
        position: Position,
        source_camp: Option<CampId>,
    ) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;
        let entity = self.world.spawn((
            UnitInfo {
                id,
                template: template.id,
                unit_type: template.unit_type.clone(),
                source_camp,
                group: None,
                died_at_tick: None,
            },
            Owner(owner),
            position,
            Health::full(template.base_hp),
            Movement {
                target: None,
                speed: template.walk_speed,
            },
            Heading::default(),
            Weapon {
                range: template.range,
                hit_interval_ticks: hit_interval_ticks(template.hit_speed, self.game.speed),
                ready_at_tick: 0,
            },
        ));
        self.units.insert(id, entity);
        self.dirty.units.insert(id);
        id
    }

    pub fn spawn_ship(
        &mut self,
        owner: PlayerId,
        template: &ShipTemplate,
        position: Position,
        source_camp: Option<CampId>,
    ) -> ShipId {
        let id = ShipId(self.next_ship_id);
        self.next_ship_id += 1;
        let entity = self.world.spawn((
            ShipInfo {
                id,
                template: template.id,
                ship_type: template.ship_type.clone(),
                source_camp,
                died_at_tick: None,
            },
            Owner(owner),
            position,
            Health::full(template.base_hp),
            Movement {
                target: None,
                speed: template.speed,
            },
            Heading::default(),
            Weapon {
                range: template.range,
                hit_interval_ticks: hit_interval_ticks(template.hit_speed, self.game.speed),
                ready_at_tick: 0,
            },
        ));
        self.ships.insert(id, entity);
        self.dirty.ships.insert(id);
        id
    }

    /// Register a region with no controller.
    pub(crate) fn init_region(&mut self, region: RegionId, tick: u64) {
        self.region_control.insert(
            region,
            RegionControlRecord {
                game_id: self.game.id,
                region_id: region,
                owner_id: None,
                changed_at_tick: tick,
            },
        );
        self.dirty.regions.insert(region);
    }

    /// Set a region's controller. Returns the previous controller when it
    /// changed, `None` otherwise.
    pub(crate) fn set_region_owner(
        &mut self,
        region: RegionId,
        owner: Option<PlayerId>,
        tick: u64,
    ) -> Option<Option<PlayerId>> {
        let record = self.region_control.get_mut(&region)?;
        if record.owner_id == owner {
            return None;
        }
        let previous = record.owner_id;
        record.owner_id = owner;
        record.changed_at_tick = tick;
        self.dirty.regions.insert(region);
        Some(previous)
    }

    pub(crate) fn mark_camp(&mut self, id: CampId) {
        self.dirty.camps.insert(id);
    }

    pub(crate) fn mark_unit(&mut self, id: UnitId) {
        self.dirty.units.insert(id);
    }

    pub(crate) fn mark_ship(&mut self, id: ShipId) {
        self.dirty.ships.insert(id);
    }

    /// Drain every record changed since the previous call.
    pub fn take_delta(&mut self, tick: u64) -> StateDelta {
        let dirty = std::mem::take(&mut self.dirty);
        StateDelta {
            game_id: self.game.id,
            tick,
            game: dirty.game.then(|| self.game.clone()),
            players: dirty
                .players
                .iter()
                .filter_map(|id| self.players.get(id).cloned())
                .collect(),
            camps: dirty
                .camps
                .iter()
                .filter_map(|id| self.camps.get(id).and_then(|&e| self.camp_record(e)))
                .collect(),
            units: dirty
                .units
                .iter()
                .filter_map(|id| self.units.get(id).and_then(|&e| self.unit_record(e)))
                .collect(),
            ships: dirty
                .ships
                .iter()
                .filter_map(|id| self.ships.get(id).and_then(|&e| self.ship_record(e)))
                .collect(),
            region_control: dirty
                .regions
                .iter()
                .filter_map(|id| self.region_control.get(id).cloned())
                .collect(),
        }
    }
}
