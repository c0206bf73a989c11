//! Shared fixtures for the register integration tests.
//!
//! Every test gets its own in-memory SQLite database built by the production
//! migration. The pool holds exactly one connection, so one transaction at a
//! time owns the database and concurrent postings queue behind each other.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use stockreg_core::document::{Document, DocumentDraft, DocumentKind, DocumentLine};
use stockreg_core::posting::{OpenPolicy, PostingPolicy};
use stockreg_core::{FixedClock, SequentialIdGenerator};
use stockreg_db::migration::Migrator;
use stockreg_db::{PostingEngine, TransactionManager};
use stockreg_shared::types::{ProductId, Quantity, WarehouseId};
use uuid::Uuid;

/// Frozen "now" for every test: 2026-03-15 10:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 15, 10, 0, 0).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

pub fn qty(s: &str) -> Quantity {
    s.parse().unwrap()
}

pub fn warehouse(n: u128) -> WarehouseId {
    WarehouseId::from_uuid(Uuid::from_u128(0xAA00 + n))
}

pub fn product(n: u128) -> ProductId {
    ProductId::from_uuid(Uuid::from_u128(0xBB00 + n))
}

/// A migrated single-connection in-memory database.
pub async fn sqlite() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub struct Harness {
    pub engine: PostingEngine,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_policy(Arc::new(OpenPolicy)).await
    }

    pub async fn with_policy(policy: Arc<dyn PostingPolicy>) -> Self {
        let db = sqlite().await;
        let tm = TransactionManager::new(db, Duration::from_secs(5), Duration::from_secs(30));
        let clock = Arc::new(FixedClock::new(now()));
        let engine = PostingEngine::new(
            tm,
            policy,
            clock.clone(),
            Arc::new(SequentialIdGenerator::default()),
        );
        Self { engine, clock }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.engine.transaction_manager().connection()
    }

    /// Creates a draft without posting it.
    pub async fn draft(
        &self,
        kind: DocumentKind,
        number: &str,
        day: u32,
        warehouse_id: WarehouseId,
        lines: &[(ProductId, &str)],
    ) -> Document {
        self.engine
            .create_document(&draft(kind, number, day, warehouse_id, lines))
            .await
            .unwrap()
    }

    /// Creates and posts a goods receipt.
    pub async fn receive(
        &self,
        number: &str,
        day: u32,
        warehouse_id: WarehouseId,
        lines: &[(ProductId, &str)],
    ) -> Document {
        let doc = self
            .draft(DocumentKind::GoodsReceipt, number, day, warehouse_id, lines)
            .await;
        self.engine.post(doc.id).await.unwrap()
    }

    /// Creates and posts a goods issue.
    pub async fn issue(
        &self,
        number: &str,
        day: u32,
        warehouse_id: WarehouseId,
        lines: &[(ProductId, &str)],
    ) -> Document {
        let doc = self
            .draft(DocumentKind::GoodsIssue, number, day, warehouse_id, lines)
            .await;
        self.engine.post(doc.id).await.unwrap()
    }

    pub async fn balance(&self, warehouse_id: WarehouseId, product_id: ProductId) -> Quantity {
        self.engine
            .register()
            .get_balance(warehouse_id, product_id)
            .await
            .unwrap()
            .quantity
    }

    pub async fn balance_at_now(&self, warehouse_id: WarehouseId, product_id: ProductId) -> Quantity {
        self.engine
            .register()
            .balance_at_date(warehouse_id, product_id, now())
            .await
            .unwrap()
    }
}

pub fn draft(
    kind: DocumentKind,
    number: &str,
    day: u32,
    warehouse_id: WarehouseId,
    lines: &[(ProductId, &str)],
) -> DocumentDraft {
    DocumentDraft {
        kind,
        number: number.to_owned(),
        date: date(day),
        warehouse_id,
        counterparty_id: None,
        comment: None,
        lines: lines
            .iter()
            .zip(1..)
            .map(|((product_id, quantity), line_number)| DocumentLine {
                line_number,
                product_id: *product_id,
                quantity: qty(quantity),
            })
            .collect(),
    }
}
