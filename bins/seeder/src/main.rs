//! Demo data seeder for Stockreg development and testing.
//!
//! Seeds one supplier, posts a goods receipt into the main warehouse and a
//! goods issue out of it, then checks the balance table against the ledger.
//! Running it twice is harmless: an existing supplier means the data is
//! already there.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use stockreg_core::document::{DocumentDraft, DocumentKind, DocumentLine};
use stockreg_core::posting::build_policy;
use stockreg_core::register::{BalanceFilter, BalanceScope};
use stockreg_core::{Clock, RegisterError, SystemClock, UuidV7Generator};
use stockreg_db::{CounterpartyRepository, PostingEngine, TransactionManager};
use stockreg_shared::AppConfig;
use stockreg_shared::types::{CounterpartyId, ProductId, Quantity, WarehouseId};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Main warehouse (consistent for all seeds)
const MAIN_WAREHOUSE_ID: u128 = 0x0000_0000_0000_0000_0000_0000_0000_0001;
/// Demo supplier (consistent for all seeds)
const SUPPLIER_ID: u128 = 0x0000_0000_0000_0000_0000_0000_0000_0002;
/// Demo products
const PRODUCT_IDS: [u128; 3] = [0x101, 0x102, 0x103];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockreg=info,seeder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let db = stockreg_db::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = build_policy(&config.posting, Arc::clone(&clock))?;
    let tm = TransactionManager::from_config(db, &config.database);
    let engine = PostingEngine::new(tm, policy, Arc::clone(&clock), Arc::new(UuidV7Generator));

    let supplier_id = CounterpartyId::from_uuid(Uuid::from_u128(SUPPLIER_ID));
    let counterparties = CounterpartyRepository::new(engine.transaction_manager().connection());
    match counterparties.get(supplier_id).await {
        Ok(_) => {
            info!("Demo data already present, skipping");
            return Ok(());
        }
        Err(RegisterError::NotFound { .. }) => {}
        Err(err) => return Err(err.into()),
    }

    info!("Seeding supplier...");
    counterparties
        .create(supplier_id, "SUP-001", "Demo Supplier", Utc::now())
        .await?;

    let warehouse_id = WarehouseId::from_uuid(Uuid::from_u128(MAIN_WAREHOUSE_ID));
    let today = clock.today();

    info!("Seeding goods receipt...");
    let receipt = engine
        .create_document(&DocumentDraft {
            kind: DocumentKind::GoodsReceipt,
            number: "GR-0001".into(),
            date: today,
            warehouse_id,
            counterparty_id: Some(supplier_id),
            comment: Some("Opening stock".into()),
            lines: lines(&["100", "250.5", "12.0001"])?,
        })
        .await?;
    engine.post(receipt.id).await?;

    info!("Seeding goods issue...");
    let issue = engine
        .create_document(&DocumentDraft {
            kind: DocumentKind::GoodsIssue,
            number: "GI-0001".into(),
            date: today,
            warehouse_id,
            counterparty_id: None,
            comment: None,
            lines: lines(&["30", "0.5", "2"])?,
        })
        .await?;
    engine.post(issue.id).await?;

    let register = engine.register();
    for balance in register
        .balances_by_warehouse(warehouse_id, BalanceFilter::default().non_zero())
        .await?
    {
        info!(product_id = %balance.product_id, quantity = %balance.quantity, "Balance");
    }

    let report = register.verify_balances(BalanceScope::All).await?;
    info!(
        checked = report.checked,
        consistent = report.is_consistent(),
        "Seeding complete"
    );
    Ok(())
}

fn lines(quantities: &[&str]) -> anyhow::Result<Vec<DocumentLine>> {
    PRODUCT_IDS
        .iter()
        .zip(quantities)
        .zip(1..)
        .map(|((product, quantity), line_number)| {
            Ok(DocumentLine {
                line_number,
                product_id: ProductId::from_uuid(Uuid::from_u128(*product)),
                quantity: quantity.parse::<Quantity>()?,
            })
        })
        .collect()
}
