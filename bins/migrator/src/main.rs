//! Database migration runner for Stockreg.
//!
//! Usage:
//!   migrator          - Run all pending migrations (same as `up`)
//!   migrator up       - Run all pending migrations
//!   migrator down     - Rollback last migration
//!   migrator status   - Show migration status
//!   migrator fresh    - Drop all tables and re-run migrations
//!   migrator refresh  - Rollback all migrations, then re-run them
//!
//! The database comes from the usual configuration sources
//! (`STOCKREG__DATABASE__URL`, `config/*.toml`).

use anyhow::{Context, bail};
use sea_orm_migration::MigratorTrait;
use stockreg_db::migration::Migrator;
use stockreg_shared::AppConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockreg=debug,sea_orm_migration=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_owned());

    let config = AppConfig::load().context("failed to load configuration")?;
    let db = stockreg_db::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    match command.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => Migrator::down(&db, Some(1)).await?,
        "status" => Migrator::status(&db).await?,
        "fresh" => Migrator::fresh(&db).await?,
        "refresh" => Migrator::refresh(&db).await?,
        other => bail!("unknown command `{other}` (expected up, down, status, fresh or refresh)"),
    }

    info!(command = %command, "Migration command finished");
    Ok(())
}
