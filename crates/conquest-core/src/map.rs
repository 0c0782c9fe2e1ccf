//! Map templates, regions and the map catalog.
//!
//! Maps are static data used at game creation to seed camps and regions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enums::{CampType, CombatantKind, TileKind};
use crate::error::{EntityRef, SimError};
use crate::ids::{MapId, RegionId};
use crate::templates::CatalogError;
use crate::types::Position;

/// Periodic free units granted to the controller of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitBonus {
    /// Template `unit_type` to spawn (standard variant).
    pub unit_type: String,
    pub count: u32,
    pub interval_secs: f64,
}

/// A polygon-bounded area of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDef {
    pub id: RegionId,
    pub name: String,
    #[serde(default)]
    pub color: String,
    /// Added to the controller's income every payout.
    #[serde(default)]
    pub money_bonus: u32,
    #[serde(default)]
    pub unit_bonus: Option<UnitBonus>,
    /// Polygon vertices in tile coordinates.
    pub boundary: Vec<Position>,
}

impl RegionDef {
    pub fn contains(&self, point: &Position) -> bool {
        point_in_polygon(point, &self.boundary)
    }
}

/// A designated camp location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampPosition {
    pub tile_x: i32,
    pub tile_y: i32,
    #[serde(default)]
    pub camp_type: CampType,
    /// Starting positions are handed to players in order; the rest start neutral.
    #[serde(default)]
    pub is_starting_position: bool,
    pub max_hp: u32,
    #[serde(default = "default_turret_damage")]
    pub turret_damage: u32,
    #[serde(default = "default_turret_range")]
    pub turret_range: f64,
}

fn default_turret_damage() -> u32 {
    10
}

fn default_turret_range() -> f64 {
    3.0
}

impl CampPosition {
    pub fn position(&self) -> Position {
        Position::of_tile(self.tile_x, self.tile_y)
    }
}

/// A playable map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapTemplate {
    pub id: MapId,
    pub name: String,
    /// Width in tiles.
    pub width: u32,
    /// Height in tiles.
    pub height: u32,
    #[serde(default = "default_min_players")]
    pub min_players: u8,
    #[serde(default = "default_max_players")]
    pub max_players: u8,
    /// Row-major terrain. Empty means every tile is walkable grass.
    #[serde(default)]
    pub tiles: Vec<Vec<TileKind>>,
    #[serde(default)]
    pub regions: Vec<RegionDef>,
    pub camp_positions: Vec<CampPosition>,
}

fn default_min_players() -> u8 {
    2
}

fn default_max_players() -> u8 {
    2
}

impl MapTemplate {
    /// Whether a continuous position lies on the map.
    pub fn in_bounds(&self, p: &Position) -> bool {
        p.is_finite()
            && p.x >= 0.0
            && p.y >= 0.0
            && p.x < f64::from(self.width)
            && p.y < f64::from(self.height)
    }

    /// Terrain at a tile. `None` off the map; grass when the map has no tiles.
    pub fn tile_at(&self, x: i64, y: i64) -> Option<TileKind> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        if self.tiles.is_empty() {
            return Some(TileKind::Grass);
        }
        self.tiles
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    fn tile_under(&self, p: &Position) -> Option<TileKind> {
        if !self.in_bounds(p) {
            return None;
        }
        self.tile_at(p.x.floor() as i64, p.y.floor() as i64)
    }

    pub fn is_walkable(&self, p: &Position) -> bool {
        self.tile_under(p).is_some_and(TileKind::is_walkable)
    }

    pub fn is_navigable(&self, p: &Position) -> bool {
        self.tile_under(p).is_some_and(TileKind::is_navigable)
    }

    /// Whether the map carries a terrain grid.
    pub fn has_terrain(&self) -> bool {
        !self.tiles.is_empty()
    }

    /// Whether a unit or ship may be ordered to `p`. Without terrain any
    /// in-bounds point is accepted.
    pub fn accepts_target(&self, p: &Position, kind: CombatantKind) -> bool {
        if !self.in_bounds(p) {
            return false;
        }
        if !self.has_terrain() {
            return true;
        }
        match kind {
            CombatantKind::Unit => self.is_walkable(p),
            CombatantKind::Ship => self.is_navigable(p),
        }
    }

    /// The first region whose polygon contains `p`.
    pub fn find_region_at(&self, p: &Position) -> Option<&RegionDef> {
        self.regions.iter().find(|r| r.contains(p))
    }

    pub fn region(&self, id: RegionId) -> Option<&RegionDef> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn starting_positions(&self) -> impl Iterator<Item = &CampPosition> {
        self.camp_positions.iter().filter(|c| c.is_starting_position)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.width == 0 || self.height == 0 {
            return Err(CatalogError::Invalid(format!("{}: empty map", self.name)));
        }
        if !self.tiles.is_empty()
            && (self.tiles.len() != self.height as usize
                || self.tiles.iter().any(|row| row.len() != self.width as usize))
        {
            return Err(CatalogError::Invalid(format!(
                "{}: tile grid does not match {}x{}",
                self.name, self.width, self.height
            )));
        }
        let mut region_ids = BTreeSet::new();
        for r in &self.regions {
            if !region_ids.insert(r.id) {
                return Err(CatalogError::Invalid(format!("{}: duplicate {}", self.name, r.id)));
            }
            if r.boundary.len() < 3 {
                return Err(CatalogError::Invalid(format!(
                    "{}: {} needs at least 3 boundary points",
                    self.name, r.id
                )));
            }
        }
        for c in &self.camp_positions {
            if c.max_hp == 0 || !self.in_bounds(&c.position()) {
                return Err(CatalogError::Invalid(format!(
                    "{}: bad camp at ({}, {})",
                    self.name, c.tile_x, c.tile_y
                )));
            }
        }
        if self.starting_positions().count() < usize::from(self.min_players) {
            return Err(CatalogError::Invalid(format!(
                "{}: fewer starting positions than min_players",
                self.name
            )));
        }
        Ok(())
    }
}

/// Read-only lookup of all maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapCatalog {
    pub maps: Vec<MapTemplate>,
}

const BUILTIN_MAPS: &str = include_str!("../data/maps.yaml");

impl MapCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: MapCatalog = serde_yaml::from_str(yaml)?;
        let mut ids = BTreeSet::new();
        for map in &catalog.maps {
            if !ids.insert(map.id) {
                return Err(CatalogError::Invalid(format!("duplicate {}", map.id)));
            }
            map.validate()?;
        }
        Ok(catalog)
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_MAPS)
    }

    pub fn get(&self, id: MapId) -> Result<&MapTemplate, SimError> {
        self.maps
            .iter()
            .find(|m| m.id == id)
            .ok_or(SimError::NotFound(EntityRef::Map(id)))
    }

    pub fn by_name(&self, name: &str) -> Option<&MapTemplate> {
        self.maps.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Maps that can host `players` players.
    pub fn for_player_count(&self, players: u8) -> Vec<&MapTemplate> {
        self.maps
            .iter()
            .filter(|m| m.min_players <= players && players <= m.max_players)
            .collect()
    }
}

/// Ray casting point-in-polygon test. Degenerate polygons contain nothing.
pub fn point_in_polygon(p: &Position, polygon: &[Position]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > p.y) != (pj.y > p.y) && p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Position> {
        vec![
            Position::new(x0, y0),
            Position::new(x1, y0),
            Position::new(x1, y1),
            Position::new(x0, y1),
        ]
    }

    #[test]
    fn point_in_square() {
        let poly = square(0.0, 0.0, 10.0, 10.0);
        assert!(point_in_polygon(&Position::new(5.0, 5.0), &poly));
        assert!(!point_in_polygon(&Position::new(15.0, 5.0), &poly));
        assert!(!point_in_polygon(&Position::new(5.0, -1.0), &poly));
    }

    #[test]
    fn concave_polygon() {
        // An L shape: the notch at (7, 7) is outside.
        let poly = vec![
            Position::new(0.0, 0.0),
            Position::new(10.0, 0.0),
            Position::new(10.0, 5.0),
            Position::new(5.0, 5.0),
            Position::new(5.0, 10.0),
            Position::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(&Position::new(2.0, 8.0), &poly));
        assert!(!point_in_polygon(&Position::new(7.0, 7.0), &poly));
    }

    #[test]
    fn degenerate_polygon_is_empty() {
        let line = vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)];
        assert!(!point_in_polygon(&Position::new(0.5, 0.5), &line));
    }

    #[test]
    fn builtin_maps_load() {
        let maps = MapCatalog::builtin().unwrap();
        assert!(!maps.maps.is_empty());
        for map in &maps.maps {
            for camp in &map.camp_positions {
                assert!(map.in_bounds(&camp.position()));
            }
        }
        assert!(!maps.for_player_count(2).is_empty());
    }

    #[test]
    fn walkability_follows_tiles() {
        let map = MapTemplate {
            id: MapId(9),
            name: "tiny".into(),
            width: 2,
            height: 1,
            min_players: 1,
            max_players: 2,
            tiles: vec![vec![TileKind::Grass, TileKind::Water]],
            regions: vec![],
            camp_positions: vec![],
        };
        assert!(map.is_walkable(&Position::new(0.5, 0.5)));
        assert!(!map.is_walkable(&Position::new(1.5, 0.5)));
        assert!(map.is_navigable(&Position::new(1.5, 0.5)));
        assert!(!map.is_walkable(&Position::new(2.5, 0.5)));
        assert!(map.accepts_target(&Position::new(1.2, 0.2), CombatantKind::Ship));
        assert!(!map.accepts_target(&Position::new(1.2, 0.2), CombatantKind::Unit));
    }

    #[test]
    fn open_field_accepts_any_in_bounds_target() {
        let maps = MapCatalog::builtin().unwrap();
        let highlands = maps.by_name("highlands").unwrap();
        assert!(!highlands.has_terrain());
        assert!(highlands.accepts_target(&Position::new(3.0, 3.0), CombatantKind::Ship));
        assert!(!highlands.accepts_target(&Position::new(-1.0, 3.0), CombatantKind::Unit));
        let heart = highlands.find_region_at(&Position::of_tile(12, 8)).unwrap();
        assert_eq!(heart.name, "Heartland");
        assert!(heart.unit_bonus.is_some());
    }
}
