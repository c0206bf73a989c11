//! Movement ledger repository.
//!
//! Movements are only ever inserted and deleted. Every method runs on
//! whatever connection it is given, so inside a [`crate::TxScope`] it joins
//! that transaction and on the pool it runs standalone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use stockreg_core::register::{
    BalanceScope, Dimension, Movement, MovementFilter, RecordType, Turnover, TurnoverFilter,
    validate_batch,
};
use stockreg_core::RegisterError;
use stockreg_shared::types::{
    DocumentId, MovementId, PageRequest, PageResponse, ProductId, Quantity, WarehouseId,
};

use crate::entities::{movements, sea_orm_active_enums};
use crate::tx::internal;

/// Rows per INSERT statement; keeps SQLite under its bound-parameter limit.
const INSERT_CHUNK: usize = 500;

/// `Σ receipts − Σ expenses` as a BIGINT on both PostgreSQL and SQLite.
const SIGNED_SUM: &str = "CAST(COALESCE(SUM(CASE WHEN record_type = 'receipt' THEN quantity ELSE -quantity END), 0) AS BIGINT)";

/// Plain `Σ quantity` as a BIGINT.
const PLAIN_SUM: &str = "CAST(COALESCE(SUM(quantity), 0) AS BIGINT)";

impl From<movements::Model> for Movement {
    fn from(model: movements::Model) -> Self {
        Self {
            id: MovementId::from_uuid(model.id),
            recorder_id: DocumentId::from_uuid(model.recorder_id),
            recorder_type: model.recorder_type,
            recorder_version: model.recorder_version,
            line_number: model.line_number,
            period: model.period,
            record_type: model.record_type.into(),
            warehouse_id: WarehouseId::from_uuid(model.warehouse_id),
            product_id: ProductId::from_uuid(model.product_id),
            quantity: Quantity::from_scaled(model.quantity),
            created_at: model.created_at,
        }
    }
}

fn to_active_model(movement: &Movement) -> movements::ActiveModel {
    movements::ActiveModel {
        id: Set(movement.id.into_inner()),
        recorder_id: Set(movement.recorder_id.into_inner()),
        recorder_type: Set(movement.recorder_type.clone()),
        recorder_version: Set(movement.recorder_version),
        line_number: Set(movement.line_number),
        period: Set(movement.period),
        record_type: Set(movement.record_type.into()),
        warehouse_id: Set(movement.warehouse_id.into_inner()),
        product_id: Set(movement.product_id.into_inner()),
        quantity: Set(movement.quantity.scaled()),
        created_at: Set(movement.created_at),
    }
}

#[derive(Debug, FromQueryResult)]
struct SumRow {
    quantity: i64,
}

/// Per-pair aggregate row.
#[derive(Debug, FromQueryResult)]
pub(crate) struct DimensionSumRow {
    pub warehouse_id: uuid::Uuid,
    pub product_id: uuid::Uuid,
    pub quantity: i64,
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl DimensionSumRow {
    pub(crate) const fn dimension(&self) -> Dimension {
        Dimension::new(
            WarehouseId::from_uuid(self.warehouse_id),
            ProductId::from_uuid(self.product_id),
        )
    }
}

/// Restricts a movement query to a balance scope.
pub(crate) fn scope_condition(scope: BalanceScope) -> Option<SimpleExpr> {
    match scope {
        BalanceScope::All => None,
        BalanceScope::Warehouse(w) => Some(movements::Column::WarehouseId.eq(w.into_inner())),
        BalanceScope::Product(p) => Some(movements::Column::ProductId.eq(p.into_inner())),
        BalanceScope::Dimension(d) => Some(
            movements::Column::WarehouseId
                .eq(d.warehouse_id.into_inner())
                .and(movements::Column::ProductId.eq(d.product_id.into_inner())),
        ),
    }
}

/// Movement ledger repository.
#[derive(Debug, Clone, Copy)]
pub struct MovementRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> MovementRepository<'c, C> {
    /// Creates a repository over `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Inserts a batch of movements.
    ///
    /// The batch is validated as a whole first; one bad movement rejects all
    /// of them and nothing is written. Run inside a transaction when the
    /// batch spans several INSERT statements.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad batch, `Internal` on storage failure.
    pub async fn create_movements(&self, batch: &[Movement]) -> Result<(), RegisterError> {
        validate_batch(batch)?;
        for chunk in batch.chunks(INSERT_CHUNK) {
            movements::Entity::insert_many(chunk.iter().map(to_active_model))
                .exec_without_returning(self.conn)
                .await
                .map_err(internal)?;
        }
        Ok(())
    }

    /// Deletes every movement of `recorder_id` whose version is strictly
    /// below `before_version`. Returns the number of rows removed.
    pub async fn delete_by_recorder(
        &self,
        recorder_id: DocumentId,
        before_version: i32,
    ) -> Result<u64, RegisterError> {
        let result = movements::Entity::delete_many()
            .filter(movements::Column::RecorderId.eq(recorder_id.into_inner()))
            .filter(movements::Column::RecorderVersion.lt(before_version))
            .exec(self.conn)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected)
    }

    /// All movements of a recorder, oldest first.
    pub async fn get_by_recorder(
        &self,
        recorder_id: DocumentId,
    ) -> Result<Vec<Movement>, RegisterError> {
        Ok(movements::Entity::find()
            .filter(movements::Column::RecorderId.eq(recorder_id.into_inner()))
            .order_by_asc(movements::Column::CreatedAt)
            .order_by_asc(movements::Column::RecorderVersion)
            .order_by_asc(movements::Column::LineNumber)
            .all(self.conn)
            .await
            .map_err(internal)?
            .into_iter()
            .map(Movement::from)
            .collect())
    }

    /// Movements of a recorder below `before_version`.
    pub async fn get_by_recorder_before(
        &self,
        recorder_id: DocumentId,
        before_version: i32,
    ) -> Result<Vec<Movement>, RegisterError> {
        Ok(self
            .get_by_recorder(recorder_id)
            .await?
            .into_iter()
            .filter(|m| m.recorder_version < before_version)
            .collect())
    }

    /// Movement history, ordered by period then creation.
    pub async fn list(
        &self,
        filter: &MovementFilter,
        page: PageRequest,
    ) -> Result<PageResponse<Movement>, RegisterError> {
        let query = apply_filter(movements::Entity::find(), filter);

        let total = query.clone().count(self.conn).await.map_err(internal)?;

        let rows = query
            .order_by_asc(movements::Column::Period)
            .order_by_asc(movements::Column::CreatedAt)
            .order_by_asc(movements::Column::LineNumber)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.conn)
            .await
            .map_err(internal)?;

        Ok(PageResponse::new(
            rows.into_iter().map(Movement::from).collect(),
            page,
            total,
        ))
    }

    /// Net quantity of one pair over movements with `period <= at`.
    pub async fn net_at(&self, dimension: Dimension, at: DateTime<Utc>) -> Result<Quantity, RegisterError> {
        let query = movements::Entity::find()
            .filter(movements::Column::WarehouseId.eq(dimension.warehouse_id.into_inner()))
            .filter(movements::Column::ProductId.eq(dimension.product_id.into_inner()))
            .filter(movements::Column::Period.lte(at));
        self.sum(query, SIGNED_SUM).await
    }

    /// Net quantity per pair in `scope` over movements with `period <= at`.
    pub(crate) async fn net_by_dimension_at(
        &self,
        scope: BalanceScope,
        at: DateTime<Utc>,
    ) -> Result<Vec<DimensionSumRow>, RegisterError> {
        let mut query = movements::Entity::find()
            .select_only()
            .column(movements::Column::WarehouseId)
            .column(movements::Column::ProductId)
            .column_as(Expr::cust(SIGNED_SUM), "quantity")
            .column_as(movements::Column::Period.max(), "last_movement_at")
            .filter(movements::Column::Period.lte(at));
        if let Some(condition) = scope_condition(scope) {
            query = query.filter(condition);
        }
        query
            .group_by(movements::Column::WarehouseId)
            .group_by(movements::Column::ProductId)
            .order_by_asc(movements::Column::WarehouseId)
            .order_by_asc(movements::Column::ProductId)
            .into_model::<DimensionSumRow>()
            .all(self.conn)
            .await
            .map_err(internal)
    }

    /// Same as [`Self::net_by_dimension_at`], keyed by pair.
    pub async fn balances_at(
        &self,
        scope: BalanceScope,
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<Dimension, Quantity>, RegisterError> {
        Ok(self
            .net_by_dimension_at(scope, at)
            .await?
            .into_iter()
            .map(|row| (row.dimension(), Quantity::from_scaled(row.quantity)))
            .collect())
    }

    /// Turnover over `[from, to)` computed with three aggregate queries.
    pub async fn turnover(&self, filter: &TurnoverFilter) -> Result<Turnover, RegisterError> {
        filter.validate()?;
        let base = || {
            let mut query = movements::Entity::find();
            if let Some(w) = filter.warehouse_id {
                query = query.filter(movements::Column::WarehouseId.eq(w.into_inner()));
            }
            if let Some(p) = filter.product_id {
                query = query.filter(movements::Column::ProductId.eq(p.into_inner()));
            }
            query
        };
        let in_window = |record_type: RecordType| {
            base()
                .filter(movements::Column::Period.gte(filter.from))
                .filter(movements::Column::Period.lt(filter.to))
                .filter(
                    movements::Column::RecordType
                        .eq(sea_orm_active_enums::RecordType::from(record_type)),
                )
        };

        let opening = self
            .sum(base().filter(movements::Column::Period.lt(filter.from)), SIGNED_SUM)
            .await?;
        let receipt = self.sum(in_window(RecordType::Receipt), PLAIN_SUM).await?;
        let expense = self.sum(in_window(RecordType::Expense), PLAIN_SUM).await?;
        Turnover::new(opening, receipt, expense)
    }

    async fn sum(
        &self,
        query: Select<movements::Entity>,
        expression: &str,
    ) -> Result<Quantity, RegisterError> {
        let row = query
            .select_only()
            .column_as(Expr::cust(expression), "quantity")
            .into_model::<SumRow>()
            .one(self.conn)
            .await
            .map_err(internal)?;
        Ok(Quantity::from_scaled(row.map_or(0, |r| r.quantity)))
    }
}

fn apply_filter(
    mut query: Select<movements::Entity>,
    filter: &MovementFilter,
) -> Select<movements::Entity> {
    if let Some(w) = filter.warehouse_id {
        query = query.filter(movements::Column::WarehouseId.eq(w.into_inner()));
    }
    if let Some(p) = filter.product_id {
        query = query.filter(movements::Column::ProductId.eq(p.into_inner()));
    }
    if let Some(r) = filter.recorder_id {
        query = query.filter(movements::Column::RecorderId.eq(r.into_inner()));
    }
    if let Some(record_type) = filter.record_type {
        query = query.filter(
            movements::Column::RecordType.eq(sea_orm_active_enums::RecordType::from(record_type)),
        );
    }
    if let Some(from) = filter.period_from {
        query = query.filter(movements::Column::Period.gte(from));
    }
    if let Some(to) = filter.period_to {
        query = query.filter(movements::Column::Period.lt(to));
    }
    query
}
