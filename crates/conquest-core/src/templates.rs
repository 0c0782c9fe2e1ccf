//! Unit and ship balance templates.
//!
//! Templates are static: loaded once per process, wrapped in an `Arc` and
//! shared read-only by every running game.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EntityRef, SimError};
use crate::ids::{ShipTemplateId, UnitTemplateId};

/// Balance data for a land unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTemplate {
    pub id: UnitTemplateId,
    pub name: String,
    /// Damage class, e.g. "infantry", "archer", "cavalry".
    pub unit_type: String,
    pub base_hp: u32,
    pub base_damage: u32,
    /// Attacks per second.
    pub hit_speed: f64,
    /// Attack range in tiles.
    pub range: f64,
    /// Tiles per second.
    pub walk_speed: f64,
    pub build_time_secs: f64,
    pub price: u32,
    /// Advanced units are only built at captured neutral camps.
    #[serde(default)]
    pub is_advanced: bool,
    /// Multipliers applied against defender damage classes.
    #[serde(default)]
    pub damage_modifiers: BTreeMap<String, f64>,
}

/// Balance data for a ship type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipTemplate {
    pub id: ShipTemplateId,
    pub name: String,
    pub ship_type: String,
    pub base_hp: u32,
    pub base_damage: u32,
    pub hit_speed: f64,
    pub range: f64,
    /// Tiles per second.
    pub speed: f64,
    pub build_time_secs: f64,
    pub price: u32,
    #[serde(default)]
    pub cargo_capacity: u32,
    #[serde(default)]
    pub damage_modifiers: BTreeMap<String, f64>,
}

/// Anything that deals damage.
pub trait DamageSource {
    fn base_damage(&self) -> u32;

    /// Modifier against a defender damage class, if the table has an entry.
    fn modifier_against(&self, _defender_class: &str) -> Option<f64> {
        None
    }
}

impl DamageSource for UnitTemplate {
    fn base_damage(&self) -> u32 {
        self.base_damage
    }

    fn modifier_against(&self, defender_class: &str) -> Option<f64> {
        self.damage_modifiers.get(defender_class).copied()
    }
}

impl DamageSource for ShipTemplate {
    fn base_damage(&self) -> u32 {
        self.base_damage
    }

    fn modifier_against(&self, defender_class: &str) -> Option<f64> {
        self.damage_modifiers.get(defender_class).copied()
    }
}

/// A camp turret: flat damage, no modifier table.
#[derive(Debug, Clone, Copy)]
pub struct TurretDamage(pub u32);

impl DamageSource for TurretDamage {
    fn base_damage(&self) -> u32 {
        self.0
    }
}

/// Damage dealt by one hit: base damage times the modifier for the defender's
/// class (1 when absent), rounded to the nearest integer.
pub fn calculate_damage<A: DamageSource + ?Sized>(attacker: &A, defender_class: &str) -> u32 {
    let base = attacker.base_damage();
    match attacker.modifier_against(defender_class) {
        Some(m) if m.is_finite() && m >= 0.0 => {
            let scaled = (f64::from(base) * m).round();
            if scaled >= f64::from(u32::MAX) {
                u32::MAX
            } else {
                scaled as u32
            }
        }
        _ => base,
    }
}

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid catalog entry: {0}")]
    Invalid(String),
}

/// Read-only lookup of all unit and ship templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateCatalog {
    #[serde(default)]
    pub units: Vec<UnitTemplate>,
    #[serde(default)]
    pub ships: Vec<ShipTemplate>,
}

const BUILTIN_TEMPLATES: &str = include_str!("../data/templates.yaml");

impl TemplateCatalog {
    /// Parse and validate a catalog from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let catalog: TemplateCatalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// The catalog shipped with the engine.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_TEMPLATES)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut ids = BTreeSet::new();
        for u in &self.units {
            if !ids.insert(u.id) {
                return Err(CatalogError::Invalid(format!("duplicate {}", u.id)));
            }
            check_stats(&u.name, u.base_hp, u.hit_speed, u.range, u.walk_speed, u.build_time_secs)?;
        }
        let mut ids = BTreeSet::new();
        for s in &self.ships {
            if !ids.insert(s.id) {
                return Err(CatalogError::Invalid(format!("duplicate {}", s.id)));
            }
            check_stats(&s.name, s.base_hp, s.hit_speed, s.range, s.speed, s.build_time_secs)?;
        }
        Ok(())
    }

    pub fn unit(&self, id: UnitTemplateId) -> Result<&UnitTemplate, SimError> {
        self.units
            .iter()
            .find(|u| u.id == id)
            .ok_or(SimError::NotFound(EntityRef::UnitTemplate(id)))
    }

    pub fn ship(&self, id: ShipTemplateId) -> Result<&ShipTemplate, SimError> {
        self.ships
            .iter()
            .find(|s| s.id == id)
            .ok_or(SimError::NotFound(EntityRef::ShipTemplate(id)))
    }

    pub fn unit_by_type(&self, unit_type: &str, advanced: bool) -> Option<&UnitTemplate> {
        self.units
            .iter()
            .find(|u| u.unit_type == unit_type && u.is_advanced == advanced)
    }

    pub fn ship_by_type(&self, ship_type: &str) -> Option<&ShipTemplate> {
        self.ships.iter().find(|s| s.ship_type == ship_type)
    }

    pub fn transport_ship(&self) -> Option<&ShipTemplate> {
        self.ship_by_type("transport")
    }

    /// Units buildable at standard camps, cheapest first.
    pub fn standard_units(&self) -> Vec<&UnitTemplate> {
        sorted_by_price(self.units.iter().filter(|u| !u.is_advanced))
    }

    /// Units only buildable at neutral camps, cheapest first.
    pub fn advanced_units(&self) -> Vec<&UnitTemplate> {
        sorted_by_price(self.units.iter().filter(|u| u.is_advanced))
    }

    /// Damage of every standard attacker against every standard defender,
    /// keyed by unit type.
    pub fn damage_table(&self) -> BTreeMap<String, BTreeMap<String, u32>> {
        let standard = self.standard_units();
        let mut table = BTreeMap::new();
        for attacker in &standard {
            let row: BTreeMap<String, u32> = standard
                .iter()
                .map(|d| (d.unit_type.clone(), calculate_damage(*attacker, &d.unit_type)))
                .collect();
            table.insert(attacker.unit_type.clone(), row);
        }
        table
    }

    /// Standard units sorted by damage-per-second per unit of price, best first.
    pub fn units_by_efficiency(&self) -> Vec<(&UnitTemplate, f64)> {
        let mut ranked: Vec<_> = self
            .standard_units()
            .into_iter()
            .map(|u| (u, cost_efficiency(u)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
        ranked
    }

    /// Standard units dealing more than 1.5x damage to `unit_type`, strongest first.
    pub fn counters(&self, unit_type: &str) -> Vec<&UnitTemplate> {
        let mut counters: Vec<&UnitTemplate> = self
            .standard_units()
            .into_iter()
            .filter(|u| u.modifier_against(unit_type).is_some_and(|m| m > 1.5))
            .collect();
        counters.sort_by(|a, b| {
            let ma = a.modifier_against(unit_type).unwrap_or(1.0);
            let mb = b.modifier_against(unit_type).unwrap_or(1.0);
            mb.total_cmp(&ma).then(a.id.cmp(&b.id))
        });
        counters
    }
}

/// Damage per second per unit of price.
pub fn cost_efficiency(unit: &UnitTemplate) -> f64 {
    if unit.price == 0 {
        return f64::INFINITY;
    }
    f64::from(unit.base_damage) * unit.hit_speed / f64::from(unit.price)
}

/// HP with a small bonus for fast units, which are harder to pin down.
pub fn effective_hp(unit: &UnitTemplate) -> f64 {
    f64::from(unit.base_hp) * (1.0 + unit.walk_speed / 10.0)
}

fn sorted_by_price<'a>(iter: impl Iterator<Item = &'a UnitTemplate>) -> Vec<&'a UnitTemplate> {
    let mut v: Vec<_> = iter.collect();
    v.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)));
    v
}

fn check_stats(
    name: &str,
    hp: u32,
    hit_speed: f64,
    range: f64,
    speed: f64,
    build_time: f64,
) -> Result<(), CatalogError> {
    if hp == 0 {
        return Err(CatalogError::Invalid(format!("{name}: base_hp must be > 0")));
    }
    let positive = [hit_speed, range, speed];
    if positive.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(CatalogError::Invalid(format!(
            "{name}: hit_speed, range and speed must be > 0"
        )));
    }
    if !build_time.is_finite() || build_time < 0.0 {
        return Err(CatalogError::Invalid(format!("{name}: build_time_secs must be >= 0")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archer() -> UnitTemplate {
        UnitTemplate {
            id: UnitTemplateId(2),
            name: "Archer".into(),
            unit_type: "archer".into(),
            base_hp: 60,
            base_damage: 15,
            hit_speed: 1.0,
            range: 4.0,
            walk_speed: 2.0,
            build_time_secs: 6.0,
            price: 40,
            is_advanced: false,
            damage_modifiers: BTreeMap::from([("infantry".to_string(), 1.25), ("cavalry".to_string(), 0.5)]),
        }
    }

    #[test]
    fn modifier_defaults_to_one() {
        assert_eq!(calculate_damage(&archer(), "ship"), 15);
    }

    #[test]
    fn modifier_is_rounded() {
        // 15 * 1.25 = 18.75
        assert_eq!(calculate_damage(&archer(), "infantry"), 19);
        // 15 * 0.5 = 7.5 rounds away from zero
        assert_eq!(calculate_damage(&archer(), "cavalry"), 8);
    }

    #[test]
    fn turret_has_flat_damage() {
        assert_eq!(calculate_damage(&TurretDamage(10), "cavalry"), 10);
    }

    #[test]
    fn builtin_catalog_loads() {
        let catalog = TemplateCatalog::builtin().unwrap();
        assert!(!catalog.standard_units().is_empty());
        assert!(!catalog.advanced_units().is_empty());
        assert!(catalog.transport_ship().is_some());
        let table = catalog.damage_table();
        assert_eq!(table.len(), catalog.standard_units().len());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let yaml = r#"
units:
  - { id: 1, name: A, unit_type: a, base_hp: 10, base_damage: 1, hit_speed: 1.0, range: 1.0, walk_speed: 1.0, build_time_secs: 1.0, price: 1 }
  - { id: 1, name: B, unit_type: b, base_hp: 10, base_damage: 1, hit_speed: 1.0, range: 1.0, walk_speed: 1.0, build_time_secs: 1.0, price: 1 }
"#;
        assert!(matches!(
            TemplateCatalog::from_yaml_str(yaml),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn counters_sorted_strongest_first() {
        let catalog = TemplateCatalog::builtin().unwrap();
        let counters = catalog.counters("cavalry");
        let mods: Vec<f64> = counters
            .iter()
            .map(|u| u.modifier_against("cavalry").unwrap())
            .collect();
        assert!(mods.windows(2).all(|w| w[0] >= w[1]));
        assert!(mods.iter().all(|m| *m > 1.5));
    }

    #[test]
    fn effective_hp_rewards_speed() {
        let a = archer();
        assert!((effective_hp(&a) - 72.0).abs() < 1e-9);
    }
}
