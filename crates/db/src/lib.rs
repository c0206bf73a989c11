//! Database layer for the stock register.
//!
//! This crate provides:
//! - `SeaORM` entity definitions and the schema migration
//! - Repositories for movements, balances, documents and counterparties
//! - The transaction manager (scopes, savepoints, time limits)
//! - The stock register service and the posting engine

pub mod engine;
pub mod entities;
pub mod migration;
pub mod register;
pub mod repositories;
pub mod tx;

pub use engine::PostingEngine;
pub use register::StockRegister;
pub use repositories::{
    BalanceRepository, CounterpartyRepository, DocumentRepository, MovementRepository,
};
pub use tx::{Nesting, TransactionManager, TxError, TxFuture, TxScope};

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use stockreg_shared::config::DatabaseConfig;
use tracing::info;

/// Opens a connection pool sized by `config`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    info!(
        backend = ?db.get_database_backend(),
        max_connections = config.max_connections,
        "Database connected"
    );
    Ok(db)
}
