//! Process configuration, loaded from YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use conquest_core::config::SimConfig;
use conquest_core::constants::TICK_RATE;
use conquest_core::map::MapCatalog;
use conquest_core::templates::TemplateCatalog;
use conquest_persistence::{DbConfig, SyncConfig};

/// Overrides `db.url`.
pub const DATABASE_URL_ENV: &str = "CONQUEST_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub sync: SyncConfig,
    pub sim: SimConfig,
    /// Simulation ticks per second for every game. 0 runs unthrottled.
    pub tick_rate_hz: u32,
    /// Unit and ship templates. Built-in catalog when unset.
    pub templates_path: Option<PathBuf>,
    /// Map catalog. Built-in maps when unset.
    pub maps_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            sync: SyncConfig::default(),
            sim: SimConfig::default(),
            tick_rate_hz: TICK_RATE,
            templates_path: None,
            maps_path: None,
        }
    }
}

impl ServerConfig {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("invalid server config")
    }

    /// Read `path` if given, otherwise start from defaults. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_yaml_str(&yaml)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(DATABASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.db.url = url;
        }
    }

    /// Wall-clock length of one tick. Zero when unthrottled.
    pub fn tick_duration(&self) -> Duration {
        if self.tick_rate_hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz))
        }
    }

    pub fn load_templates(&self) -> anyhow::Result<TemplateCatalog> {
        match &self.templates_path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                TemplateCatalog::from_yaml_str(&yaml)
                    .with_context(|| format!("loading templates from {}", path.display()))
            }
            None => TemplateCatalog::builtin().context("built-in templates"),
        }
    }

    pub fn load_maps(&self) -> anyhow::Result<MapCatalog> {
        match &self.maps_path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                MapCatalog::from_yaml_str(&yaml)
                    .with_context(|| format!("loading maps from {}", path.display()))
            }
            None => MapCatalog::builtin().context("built-in maps"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_tick_at_ten_hz() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_duration(), Duration::from_millis(100));
        assert_eq!(config.sync.flush_interval_ms, 500);
    }

    #[test]
    fn test_partial_yaml_and_env_override() {
        let mut config = ServerConfig::from_yaml_str(
            "tick_rate_hz: 20\nsync:\n  flush_max_records: 64\nsim:\n  seed: 9\n",
        )
        .unwrap();
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
        assert_eq!(config.sync.flush_max_records, 64);
        assert_eq!(config.sync.retry_max_ms, SyncConfig::default().retry_max_ms);
        assert_eq!(config.sim.seed, 9);

        config.apply_env(|key| (key == DATABASE_URL_ENV).then(|| "sqlite::memory:".to_string()));
        assert!(config.db.is_memory());
        config.apply_env(|_| Some("  ".to_string()));
        assert!(config.db.is_memory());
    }

    #[test]
    fn test_unthrottled_ticks() {
        let config = ServerConfig {
            tick_rate_hz: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::ZERO);
    }

    #[test]
    fn test_builtin_catalogs_load() {
        let config = ServerConfig::default();
        assert!(!config.load_maps().unwrap().maps.is_empty());
        assert!(!config.load_templates().unwrap().units.is_empty());
    }
}
