//! Systems that operate on the Entity Store each tick.
//!
//! Systems are free functions over `&mut EntityStore` (or `&EntityStore` for
//! read-only work). They own no state: everything persistent lives in the
//! store, everything tick-scoped arrives through [`TickContext`].

use conquest_core::config::RulesConfig;
use conquest_core::map::MapTemplate;
use conquest_core::templates::TemplateCatalog;

pub mod capture;
pub mod combat;
pub mod commands;
pub mod economy;
pub mod movement;
pub mod production;
pub mod regions;
pub mod snapshot;
pub mod victory;

/// Read-only inputs shared by every system during one tick.
pub struct TickContext<'a> {
    /// The tick being simulated.
    pub tick: u64,
    /// Game speed multiplier.
    pub speed: f64,
    pub rules: &'a RulesConfig,
    pub catalog: &'a TemplateCatalog,
    pub map: &'a MapTemplate,
}
