use anyhow::{Context, Result};
use sqlx::{migrate::Migrator, SqlitePool};

pub static MIGRATOR: Migrator = sqlx::migrate!("./src/db/migrations");

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    MIGRATOR.run(pool).await.context("failed to apply SQLite migrations")
}
