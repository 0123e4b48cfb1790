// zsk-server entry point.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use zsk_server::{
    backup::apply_pending_restore,
    config::ServerConfig,
    db::{
        migrations::run_migrations,
        pool::{create_sqlite_pool, PoolConfig},
    },
    maintenance, server,
};

#[derive(Parser)]
#[command(name = "zsk-server", about = "Knowledge base server", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API (default)
    Serve,
    /// Collapse double-encoded tags/blocks/code columns in place
    NormalizeFields,
    /// Delete every row and clear the uploads directory
    ResetDb {
        /// Confirm the irreversible reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(config).await,
        Command::NormalizeFields => {
            let pool = open_store(&config).await?;
            let report = maintenance::normalize_stored_fields(&pool).await?;
            pool.close().await;
            if report.is_clean() {
                println!("stored fields are already canonical");
            } else {
                println!(
                    "normalized {} document field(s) and {} bookmark(s)",
                    report.documents, report.bookmarks
                );
            }
            Ok(())
        }
        Command::ResetDb { yes } => {
            if !yes {
                bail!("reset-db deletes every row and upload; pass --yes to confirm");
            }
            let pool = open_store(&config).await?;
            let report = maintenance::reset(&pool, &config.uploads_dir).await?;
            pool.close().await;
            println!(
                "removed {} user(s), {} document(s), {} bookmark(s), {} category(s), {} upload(s)",
                report.users,
                report.documents,
                report.bookmarks,
                report.categories,
                report.uploads_removed
            );
            Ok(())
        }
    }
}

async fn open_store(config: &ServerConfig) -> anyhow::Result<sqlx::SqlitePool> {
    apply_pending_restore(&config.database_url).await?;
    let pool = create_sqlite_pool(&config.database_url, PoolConfig::from_env())
        .await
        .with_context(|| format!("failed to open store at {}", config.database_url))?;
    run_migrations(&pool).await?;
    Ok(pool)
}
