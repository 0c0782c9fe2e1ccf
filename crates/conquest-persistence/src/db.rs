//! Connection pool setup and maintenance.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::PersistError;

/// Default location of the local database.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./data/conquest.db"
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    /// Give up acquiring a connection after this long.
    pub acquire_timeout_ms: u64,
    /// Statements slower than this are logged.
    pub slow_query_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_sqlite_url().to_string(),
            max_connections: 8,
            acquire_timeout_ms: 5_000,
            slow_query_ms: 100,
        }
    }
}

impl DbConfig {
    /// An isolated in-memory database, used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    fn file_path(&self) -> Option<&Path> {
        if self.is_memory() {
            return None;
        }
        let path = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = path.split('?').next().unwrap_or(path);
        Some(Path::new(path))
    }
}

/// Pool occupancy, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

/// Open the pool and bring the schema up to date.
pub async fn init_db(config: &DbConfig) -> Result<SqlitePool, PersistError> {
    if let Some(parent) = config.file_path().and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let mut pool_options = SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms));
    if config.is_memory() {
        // Every connection to :memory: is its own database.
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        options = options.journal_mode(SqliteJournalMode::Wal);
        pool_options = pool_options.max_connections(config.max_connections.max(1));
    }

    let pool = pool_options.connect_with(options).await?;
    migrate(&pool).await?;
    info!(url = %config.url, "database ready");
    Ok(pool)
}

/// Apply embedded migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), PersistError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<(), PersistError> {
    let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    if one == 1 {
        Ok(())
    } else {
        Err(PersistError::corrupt("health", format!("SELECT 1 returned {one}")))
    }
}

pub fn pool_stats(pool: &SqlitePool) -> PoolStats {
    PoolStats {
        size: pool.size(),
        idle: pool.num_idle(),
    }
}

/// Close every connection. Pending acquisitions fail afterwards.
pub async fn shutdown(pool: &SqlitePool) {
    pool.close().await;
    info!("database pool closed");
}
