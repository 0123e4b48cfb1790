use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let max_connections = env::var("ZSK_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let acquire_timeout_secs = env::var("ZSK_DB_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS);

        Self { max_connections, acquire_timeout: Duration::from_secs(acquire_timeout_secs) }
    }
}

/// Open the SQLite database, creating the file (and its directory) when missing.
pub async fn create_sqlite_pool(database_url: &str, config: PoolConfig) -> Result<SqlitePool> {
    let connect_options = connect_options(database_url)?;

    let parent = connect_options.get_filename().parent().map(ToOwned::to_owned);
    if let Some(dir) = parent.filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create database directory {}", dir.display()))?;
    }

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(connect_options)
        .await
        .context("failed to open SQLite database")
}

/// Single-connection in-memory pool; every connection to `:memory:` is a
/// fresh database, so the pool must never replace its connection.
pub async fn create_memory_pool() -> Result<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("failed to parse in-memory SQLite options")?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await
        .context("failed to open in-memory SQLite database")
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("failed to parse SQLite connection string `{database_url}`"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true))
}

pub async fn check_pool_health(pool: &SqlitePool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("SQLite health check failed")?;

    Ok(())
}
