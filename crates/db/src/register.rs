//! Stock register service: the ledger and the balance store behind one API.
//!
//! Reads work on any connection. Everything that mutates the ledger or the
//! balances is only available on a `DatabaseTransaction`, so a caller cannot
//! write movements without also committing (or rolling back) the matching
//! balance change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseTransaction, DbBackend};
use stockreg_core::register::{
    Balance, BalanceFilter, BalanceScope, Dimension, Movement, MovementFilter,
    RecalculationReport, StockRequirement, Turnover, TurnoverFilter, compare_balances,
    net_by_dimension, reservation_plan,
};
use stockreg_core::{Clock, RegisterError};
use stockreg_shared::types::{
    DocumentId, PageRequest, PageResponse, ProductId, Quantity, WarehouseId,
};
use tracing::{debug, info, warn};

use crate::repositories::{BalanceRepository, MovementRepository};
use crate::tx::internal;

/// The accumulation register for stock on hand.
pub struct StockRegister<'c, C> {
    conn: &'c C,
    clock: &'c dyn Clock,
}

impl<'c, C: ConnectionTrait> StockRegister<'c, C> {
    /// Creates a register over `conn`.
    #[must_use]
    pub const fn new(conn: &'c C, clock: &'c dyn Clock) -> Self {
        Self { conn, clock }
    }

    const fn movements(&self) -> MovementRepository<'c, C> {
        MovementRepository::new(self.conn)
    }

    const fn balances(&self) -> BalanceRepository<'c, C> {
        BalanceRepository::new(self.conn)
    }

    /// Materialized balance of a pair. Absence reads as zero.
    pub async fn get_balance(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Balance, RegisterError> {
        self.balances()
            .get(Dimension::new(warehouse_id, product_id), self.clock.now())
            .await
    }

    /// Every balance in one warehouse matching `filter`.
    pub async fn balances_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
        filter: BalanceFilter,
    ) -> Result<Vec<Balance>, RegisterError> {
        let filter = BalanceFilter {
            warehouse_id: Some(warehouse_id),
            ..filter
        };
        self.balances().list_all(&filter).await
    }

    /// Every balance of one product across warehouses matching `filter`.
    pub async fn balances_by_product(
        &self,
        product_id: ProductId,
        filter: BalanceFilter,
    ) -> Result<Vec<Balance>, RegisterError> {
        let filter = BalanceFilter {
            product_id: Some(product_id),
            ..filter
        };
        self.balances().list_all(&filter).await
    }

    /// Paginated balance listing.
    pub async fn list_balances(
        &self,
        filter: &BalanceFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Balance>, RegisterError> {
        self.balances().list(filter, page).await
    }

    /// Balance of a pair recomputed from movements with `period <= at`.
    ///
    /// Ignores the balance table entirely.
    pub async fn balance_at_date(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        at: DateTime<Utc>,
    ) -> Result<Quantity, RegisterError> {
        self.movements()
            .net_at(Dimension::new(warehouse_id, product_id), at)
            .await
    }

    /// Balances of every pair in `scope` recomputed as of `at`.
    pub async fn balances_at_date(
        &self,
        scope: BalanceScope,
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<Dimension, Quantity>, RegisterError> {
        self.movements().balances_at(scope, at).await
    }

    /// Opening, receipt, expense and closing quantities over a window.
    pub async fn get_turnover(&self, filter: &TurnoverFilter) -> Result<Turnover, RegisterError> {
        self.movements().turnover(filter).await
    }

    /// Movement history.
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Movement>, RegisterError> {
        self.movements().list(filter, page).await
    }

    /// Every movement a document produced, oldest first.
    pub async fn movements_by_recorder(
        &self,
        recorder_id: DocumentId,
    ) -> Result<Vec<Movement>, RegisterError> {
        self.movements().get_by_recorder(recorder_id).await
    }

    /// Compares the balance table with the ledger without changing anything.
    pub async fn verify_balances(
        &self,
        scope: BalanceScope,
    ) -> Result<RecalculationReport, RegisterError> {
        let materialized = self.balances().materialized(scope).await?;
        let recomputed = self
            .movements()
            .balances_at(scope, self.clock.now())
            .await?;
        let report = compare_balances(scope, &materialized, &recomputed);
        if !report.is_consistent() {
            warn!(
                ?scope,
                drifts = report.drifts.len(),
                "Balance table disagrees with movement ledger"
            );
        }
        Ok(report)
    }
}

impl StockRegister<'_, DatabaseTransaction> {
    /// Balance of a pair, locked until the transaction ends.
    pub async fn get_balance_for_update(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<Balance, RegisterError> {
        self.balances()
            .get_for_update(Dimension::new(warehouse_id, product_id), self.clock.now())
            .await
    }

    /// Locks every requested pair and checks that enough is on hand.
    ///
    /// Requirements for the same pair are summed. Pairs are locked in sorted
    /// order; the first shortfall aborts with `InsufficientStock`. The locks
    /// stay held until the transaction ends, so the caller must write its
    /// expense movements in the same transaction.
    pub async fn check_and_reserve_stock(
        &self,
        items: &[StockRequirement],
    ) -> Result<Vec<Balance>, RegisterError> {
        let plan = reservation_plan(items)?;
        let mut locked = Vec::with_capacity(plan.len());
        for requirement in plan {
            let balance = self
                .get_balance_for_update(requirement.warehouse_id, requirement.product_id)
                .await?;
            requirement.check(balance.quantity)?;
            debug!(
                dimension = %requirement.dimension(),
                required = %requirement.required,
                available = %balance.quantity,
                "Stock reserved"
            );
            locked.push(balance);
        }
        Ok(locked)
    }

    /// Appends movements to the ledger and adds them to the balances.
    ///
    /// No stock check is made here; call [`Self::check_and_reserve_stock`]
    /// first when the batch contains expenses. Movements dated after the
    /// clock's "now" are rejected: the balance counts only what the ledger
    /// holds up to now.
    pub async fn record_movements(&self, batch: &[Movement]) -> Result<(), RegisterError> {
        if batch.is_empty() {
            return Ok(());
        }
        let now = self.clock.now();
        if let Some(index) = batch.iter().position(|m| m.period > now) {
            return Err(RegisterError::validation(
                format!("movements[{index}].period"),
                format!("period {} is after {now}", batch[index].period),
            ));
        }
        self.movements().create_movements(batch).await?;
        let deltas = net_by_dimension(batch)?;
        let latest = batch.iter().map(|m| m.period).max();
        self.balances().apply_deltas(&deltas, latest, now).await
    }

    /// Removes a recorder's movements below `before_version` and takes them
    /// back out of the balances. Returns how many movements were removed.
    ///
    /// Balances may go negative here; removing a receipt that later
    /// expenses depended on is the caller's decision.
    pub async fn reverse_movements(
        &self,
        recorder_id: DocumentId,
        before_version: i32,
    ) -> Result<u64, RegisterError> {
        let old = self
            .movements()
            .get_by_recorder_before(recorder_id, before_version)
            .await?;
        if old.is_empty() {
            return Ok(0);
        }
        let deltas: BTreeMap<Dimension, Quantity> = net_by_dimension(&old)?
            .into_iter()
            .map(|(dimension, quantity)| (dimension, -quantity))
            .collect();
        let removed = self
            .movements()
            .delete_by_recorder(recorder_id, before_version)
            .await?;
        self.balances()
            .apply_deltas(&deltas, None, self.clock.now())
            .await?;
        Ok(removed)
    }

    /// Rebuilds the balance rows in `scope` from the ledger.
    ///
    /// On PostgreSQL the movement table is share-locked (no inserts or
    /// deletes, reads allowed) and the balance table exclusively locked for
    /// the rest of the transaction, so the rebuilt rows match the ledger at
    /// commit. Returns what was out of line before the rebuild.
    pub async fn recalculate_balances(
        &self,
        scope: BalanceScope,
    ) -> Result<RecalculationReport, RegisterError> {
        if self.conn.get_database_backend() == DbBackend::Postgres {
            self.conn
                .execute_unprepared("LOCK TABLE movements IN SHARE MODE")
                .await
                .map_err(internal)?;
            self.conn
                .execute_unprepared("LOCK TABLE balances IN EXCLUSIVE MODE")
                .await
                .map_err(internal)?;
        }

        let now = self.clock.now();
        let materialized = self.balances().materialized(scope).await?;
        let rows = self.movements().net_by_dimension_at(scope, now).await?;
        let recomputed: BTreeMap<Dimension, Quantity> = rows
            .iter()
            .map(|row| (row.dimension(), Quantity::from_scaled(row.quantity)))
            .collect();
        let report = compare_balances(scope, &materialized, &recomputed);

        let rebuilt: Vec<Balance> = rows
            .into_iter()
            .map(|row| Balance {
                warehouse_id: WarehouseId::from_uuid(row.warehouse_id),
                product_id: ProductId::from_uuid(row.product_id),
                quantity: Quantity::from_scaled(row.quantity),
                last_movement_at: row.last_movement_at,
                updated_at: now,
            })
            .collect();
        let deleted = self.balances().delete_scope(scope).await?;
        self.balances().insert_rows(&rebuilt).await?;

        for drift in &report.drifts {
            warn!(
                dimension = %drift.dimension,
                materialized = %drift.materialized,
                recomputed = %drift.recomputed,
                "Balance drift repaired"
            );
        }
        info!(
            ?scope,
            checked = report.checked,
            drifts = report.drifts.len(),
            deleted,
            inserted = rebuilt.len(),
            "Balances recalculated"
        );
        Ok(report)
    }
}
