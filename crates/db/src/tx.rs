//! Transaction manager: atomic scopes, savepoints and time limits.
//!
//! A [`TxScope`] owns one open database transaction (or savepoint). It is
//! released on every exit path: `commit`, `rollback`, or drop. Dropping an
//! uncommitted scope (a panic, a timed-out or cancelled future) queues the
//! rollback on the connection before it goes back to the pool, so row locks
//! never outlive the scope.
//!
//! Nesting is explicit. Code that already holds a scope either passes it on
//! (`Nesting::Reuse`, joining the caller's transaction) or opens a savepoint
//! with [`TxScope::savepoint`] / `Nesting::Savepoint`, which contains a
//! failure without aborting the outer unit of work.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, TransactionTrait,
};
use stockreg_core::RegisterError;
use stockreg_shared::config::DatabaseConfig;
use tracing::{debug, warn};

/// Boxed future returned by transaction closures.
pub type TxFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

/// Errors raised by the transaction manager itself.
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// Begin, commit, rollback or a statement failed.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// The whole transaction ran longer than allowed.
    #[error("Transaction exceeded its time limit of {0:?}")]
    Timeout(Duration),
}

impl From<TxError> for RegisterError {
    fn from(err: TxError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Maps a storage error into the register taxonomy.
pub(crate) fn internal(err: DbErr) -> RegisterError {
    RegisterError::Internal(err.to_string())
}

/// How a nested unit of work joins an open scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Nesting {
    /// Run directly in the caller's transaction. A failure aborts the caller
    /// too once it propagates.
    #[default]
    Reuse,
    /// Run inside a savepoint: released on success, rolled back to on failure.
    Savepoint,
}

/// An open transaction or savepoint.
pub struct TxScope {
    txn: DatabaseTransaction,
    depth: u32,
}

impl TxScope {
    /// The connection to run statements on.
    #[must_use]
    pub const fn conn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// 0 for the outermost transaction, +1 per savepoint.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Backend of the underlying connection.
    #[must_use]
    pub fn backend(&self) -> DbBackend {
        self.txn.get_database_backend()
    }

    /// Opens a savepoint inside this scope.
    ///
    /// While the savepoint is open, statements must go through it, not
    /// through the parent.
    pub async fn savepoint(&self) -> Result<Self, TxError> {
        let txn = self.txn.begin().await?;
        debug!(depth = self.depth + 1, "Savepoint created");
        Ok(Self {
            txn,
            depth: self.depth + 1,
        })
    }

    /// Commits the transaction, or releases the savepoint.
    pub async fn commit(self) -> Result<(), TxError> {
        let depth = self.depth;
        self.txn.commit().await?;
        debug!(depth, "Transaction scope committed");
        Ok(())
    }

    /// Rolls back the transaction, or rolls back to the savepoint.
    pub async fn rollback(self) -> Result<(), TxError> {
        let depth = self.depth;
        self.txn.rollback().await?;
        debug!(depth, "Transaction scope rolled back");
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err`, and hands the result through.
    ///
    /// A failed rollback is logged; the original error is what the caller sees.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<TxError> + Display,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let depth = self.depth;
                warn!(error = %err, depth, "Rolling back transaction scope");
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, depth, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs `f` as a nested unit of work.
    pub async fn run_nested<F, T, E>(&self, nesting: Nesting, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c TxScope) -> TxFuture<'c, T, E> + Send,
        T: Send,
        E: From<TxError> + Display + Send,
    {
        match nesting {
            Nesting::Reuse => f(self).await,
            Nesting::Savepoint => {
                let savepoint = self.savepoint().await?;
                let result = f(&savepoint).await;
                savepoint.finish(result).await
            }
        }
    }
}

/// Opens transaction scopes and bounds how long they may run.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    db: DatabaseConnection,
    statement_timeout: Duration,
    transaction_timeout: Duration,
}

impl TransactionManager {
    /// Creates a manager over a connection pool.
    #[must_use]
    pub const fn new(
        db: DatabaseConnection,
        statement_timeout: Duration,
        transaction_timeout: Duration,
    ) -> Self {
        Self {
            db,
            statement_timeout,
            transaction_timeout,
        }
    }

    /// Creates a manager with the configured time limits.
    #[must_use]
    pub const fn from_config(db: DatabaseConnection, config: &DatabaseConfig) -> Self {
        Self::new(
            db,
            Duration::from_millis(config.statement_timeout_ms),
            Duration::from_millis(config.transaction_timeout_ms),
        )
    }

    /// The pool, for reads that need no transaction.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Limit applied to the whole of [`Self::run_in_transaction`].
    #[must_use]
    pub const fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    /// Begins an outermost transaction.
    ///
    /// On PostgreSQL every statement in it is bounded by `statement_timeout`.
    pub async fn begin(&self) -> Result<TxScope, TxError> {
        let txn = self.db.begin().await?;
        if txn.get_database_backend() == DbBackend::Postgres {
            let millis = self.statement_timeout.as_millis();
            txn.execute_unprepared(&format!("SET LOCAL statement_timeout = {millis}"))
                .await?;
        }
        debug!("Transaction started");
        Ok(TxScope { txn, depth: 0 })
    }

    /// Bounds `fut` by the transaction time limit.
    ///
    /// When the limit is hit the future is dropped, together with any scope it
    /// owns, and `TxError::Timeout` is returned.
    pub async fn with_timeout<F, T, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<TxError>,
    {
        match tokio::time::timeout(self.transaction_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.transaction_timeout, "Transaction timed out, rolling back");
                Err(TxError::Timeout(self.transaction_timeout).into())
            }
        }
    }

    /// Runs `f` in a new transaction: commit on `Ok`, rollback on `Err`,
    /// rollback on timeout.
    pub async fn run_in_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c TxScope) -> TxFuture<'c, T, E> + Send,
        T: Send,
        E: From<TxError> + Display + Send,
    {
        self.with_timeout(async {
            let scope = self.begin().await?;
            let result = f(&scope).await;
            scope.finish(result).await
        })
        .await
    }
}
