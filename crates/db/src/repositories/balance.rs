//! Balance store repository.
//!
//! One row per (warehouse, product) pair. A missing row reads as zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict, SimpleExpr};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use stockreg_core::RegisterError;
use stockreg_core::register::{Balance, BalanceFilter, BalanceScope, Dimension};
use stockreg_shared::types::{PageRequest, PageResponse, ProductId, Quantity, WarehouseId};

use crate::entities::balances;
use crate::tx::internal;

/// Keeps the later of the stored and incoming `last_movement_at`.
///
/// Written as CASE rather than GREATEST so it runs on SQLite too.
const LATEST_MOVEMENT: &str = "CASE WHEN balances.last_movement_at IS NULL \
     OR balances.last_movement_at < excluded.last_movement_at \
     THEN excluded.last_movement_at ELSE balances.last_movement_at END";

impl From<balances::Model> for Balance {
    fn from(model: balances::Model) -> Self {
        Self {
            warehouse_id: WarehouseId::from_uuid(model.warehouse_id),
            product_id: ProductId::from_uuid(model.product_id),
            quantity: Quantity::from_scaled(model.quantity),
            last_movement_at: model.last_movement_at,
            updated_at: model.updated_at,
        }
    }
}

fn to_active_model(balance: &Balance) -> balances::ActiveModel {
    balances::ActiveModel {
        warehouse_id: Set(balance.warehouse_id.into_inner()),
        product_id: Set(balance.product_id.into_inner()),
        quantity: Set(balance.quantity.scaled()),
        last_movement_at: Set(balance.last_movement_at),
        updated_at: Set(balance.updated_at),
    }
}

fn scope_condition(scope: BalanceScope) -> Option<SimpleExpr> {
    match scope {
        BalanceScope::All => None,
        BalanceScope::Warehouse(w) => Some(balances::Column::WarehouseId.eq(w.into_inner())),
        BalanceScope::Product(p) => Some(balances::Column::ProductId.eq(p.into_inner())),
        BalanceScope::Dimension(d) => Some(
            balances::Column::WarehouseId
                .eq(d.warehouse_id.into_inner())
                .and(balances::Column::ProductId.eq(d.product_id.into_inner())),
        ),
    }
}

fn apply_filter(mut query: Select<balances::Entity>, filter: &BalanceFilter) -> Select<balances::Entity> {
    if let Some(w) = filter.warehouse_id {
        query = query.filter(balances::Column::WarehouseId.eq(w.into_inner()));
    }
    if let Some(p) = filter.product_id {
        query = query.filter(balances::Column::ProductId.eq(p.into_inner()));
    }
    if filter.exclude_zero {
        query = query.filter(balances::Column::Quantity.ne(0_i64));
    }
    if let Some(min) = filter.min_quantity {
        query = query.filter(balances::Column::Quantity.gte(min.scaled()));
    }
    if let Some(max) = filter.max_quantity {
        query = query.filter(balances::Column::Quantity.lte(max.scaled()));
    }
    query
}

/// Balance store repository.
#[derive(Debug, Clone, Copy)]
pub struct BalanceRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> BalanceRepository<'c, C> {
    /// Creates a repository over `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Current balance of a pair; a zero balance stamped `now` when there is
    /// no row.
    pub async fn get(
        &self,
        dimension: Dimension,
        now: DateTime<Utc>,
    ) -> Result<Balance, RegisterError> {
        self.fetch(dimension, false, now).await
    }

    /// Current balance of a pair, holding a row lock until the enclosing
    /// transaction ends.
    ///
    /// The lock is taken on PostgreSQL. SQLite has no row locks; there the
    /// write transaction already serializes access.
    pub async fn get_for_update(
        &self,
        dimension: Dimension,
        now: DateTime<Utc>,
    ) -> Result<Balance, RegisterError> {
        self.fetch(dimension, true, now).await
    }

    async fn fetch(
        &self,
        dimension: Dimension,
        lock: bool,
        now: DateTime<Utc>,
    ) -> Result<Balance, RegisterError> {
        let mut query = balances::Entity::find_by_id((
            dimension.warehouse_id.into_inner(),
            dimension.product_id.into_inner(),
        ));
        if lock && self.conn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let row = query.one(self.conn).await.map_err(internal)?;
        Ok(row.map_or_else(|| Balance::zero(dimension, now), Balance::from))
    }

    /// Balances matching `filter`, ordered by warehouse then product.
    pub async fn list(
        &self,
        filter: &BalanceFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Balance>, RegisterError> {
        let query = apply_filter(balances::Entity::find(), filter);
        let total = query.clone().count(self.conn).await.map_err(internal)?;
        let rows = query
            .order_by_asc(balances::Column::WarehouseId)
            .order_by_asc(balances::Column::ProductId)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.conn)
            .await
            .map_err(internal)?;
        Ok(PageResponse::new(
            rows.into_iter().map(Balance::from).collect(),
            page,
            total,
        ))
    }

    /// All balances matching `filter`, unpaginated.
    pub async fn list_all(&self, filter: &BalanceFilter) -> Result<Vec<Balance>, RegisterError> {
        Ok(apply_filter(balances::Entity::find(), filter)
            .order_by_asc(balances::Column::WarehouseId)
            .order_by_asc(balances::Column::ProductId)
            .all(self.conn)
            .await
            .map_err(internal)?
            .into_iter()
            .map(Balance::from)
            .collect())
    }

    /// Adds each delta to its pair's row, creating missing rows.
    ///
    /// Rows are written in key order so two transactions touching the same
    /// pairs lock them in the same order. `period` moves `last_movement_at`
    /// forward, never back.
    pub async fn apply_deltas(
        &self,
        deltas: &BTreeMap<Dimension, Quantity>,
        period: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), RegisterError> {
        for (dimension, delta) in deltas {
            if delta.is_zero() {
                continue;
            }
            let row = balances::ActiveModel {
                warehouse_id: Set(dimension.warehouse_id.into_inner()),
                product_id: Set(dimension.product_id.into_inner()),
                quantity: Set(delta.scaled()),
                last_movement_at: Set(period),
                updated_at: Set(now),
            };
            let on_conflict = OnConflict::columns([
                balances::Column::WarehouseId,
                balances::Column::ProductId,
            ])
            .value(
                balances::Column::Quantity,
                Expr::cust("balances.quantity + excluded.quantity"),
            )
            .value(balances::Column::LastMovementAt, Expr::cust(LATEST_MOVEMENT))
            .value(balances::Column::UpdatedAt, Expr::cust("excluded.updated_at"))
            .to_owned();

            balances::Entity::insert(row)
                .on_conflict(on_conflict)
                .exec_without_returning(self.conn)
                .await
                .map_err(internal)?;
        }
        Ok(())
    }

    /// Stored quantities in `scope`, keyed by pair.
    pub async fn materialized(
        &self,
        scope: BalanceScope,
    ) -> Result<BTreeMap<Dimension, Quantity>, RegisterError> {
        let mut query = balances::Entity::find();
        if let Some(condition) = scope_condition(scope) {
            query = query.filter(condition);
        }
        Ok(query
            .all(self.conn)
            .await
            .map_err(internal)?
            .into_iter()
            .map(|row| {
                let balance = Balance::from(row);
                (balance.dimension(), balance.quantity)
            })
            .collect())
    }

    /// Removes every row in `scope`.
    pub async fn delete_scope(&self, scope: BalanceScope) -> Result<u64, RegisterError> {
        let mut delete = balances::Entity::delete_many();
        if let Some(condition) = scope_condition(scope) {
            delete = delete.filter(condition);
        }
        Ok(delete.exec(self.conn).await.map_err(internal)?.rows_affected)
    }

    /// Inserts fresh rows. The pairs must not exist yet.
    pub async fn insert_rows(&self, rows: &[Balance]) -> Result<(), RegisterError> {
        for chunk in rows.chunks(500) {
            balances::Entity::insert_many(chunk.iter().map(to_active_model))
                .exec_without_returning(self.conn)
                .await
                .map_err(internal)?;
        }
        Ok(())
    }
}
