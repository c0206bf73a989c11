//! Stock register integration tests: balances, point-in-time reads,
//! turnovers, reservation and recalculation.

mod common;

use chrono::{DateTime, Duration, Utc};
use common::{Harness, date, now, product, qty, warehouse};
use proptest::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stockreg_core::RegisterError;
use stockreg_core::document::DocumentKind;
use stockreg_core::register::{
    BalanceFilter, BalanceScope, Dimension, Movement, MovementFilter, RecordType,
    StockRequirement, Turnover, TurnoverFilter,
};
use stockreg_db::entities::balances;
use stockreg_shared::types::{DocumentId, MovementId, PageRequest, ProductId, Quantity, WarehouseId};
use uuid::Uuid;

fn midnight(day: u32) -> DateTime<Utc> {
    date(day).and_hms_opt(0, 0, 0).unwrap().and_utc()
}

fn movement(
    n: u128,
    record_type: RecordType,
    warehouse_id: WarehouseId,
    product_id: ProductId,
    quantity: Quantity,
) -> Movement {
    Movement {
        id: MovementId::from_uuid(Uuid::from_u128(0xCC00_0000 + n)),
        recorder_id: DocumentId::from_uuid(Uuid::from_u128(0xDD00)),
        recorder_type: "goods_receipt".into(),
        recorder_version: 1,
        line_number: i32::try_from(n).unwrap() + 1,
        period: midnight(1),
        record_type,
        warehouse_id,
        product_id,
        quantity,
        created_at: now(),
    }
}

#[tokio::test]
async fn test_missing_balance_reads_as_zero() {
    let h = Harness::new().await;
    let balance = h
        .engine
        .register()
        .get_balance(warehouse(9), product(9))
        .await
        .unwrap();
    assert_eq!(balance.quantity, Quantity::ZERO);
    assert!(balance.last_movement_at.is_none());
    assert_eq!(balance.updated_at, now());

    // The zero row is stamped by the register's clock
    h.clock.set(now() + Duration::hours(2));
    let balance = h
        .engine
        .register()
        .get_balance(warehouse(9), product(9))
        .await
        .unwrap();
    assert_eq!(balance.updated_at, now() + Duration::hours(2));
}

#[tokio::test]
async fn test_balance_tracks_latest_movement_period() {
    let h = Harness::new().await;
    let (w1, p1) = (warehouse(1), product(1));
    h.receive("GR-1", 3, w1, &[(p1, "5")]).await;
    h.receive("GR-2", 1, w1, &[(p1, "5")]).await;

    let balance = h.engine.register().get_balance(w1, p1).await.unwrap();
    assert_eq!(balance.quantity, qty("10"));
    assert_eq!(balance.last_movement_at, Some(midnight(3)));
}

#[tokio::test]
async fn test_balance_lists_by_warehouse_and_product() {
    let h = Harness::new().await;
    let (w1, w2) = (warehouse(1), warehouse(2));
    let (p1, p2, p3) = (product(1), product(2), product(3));

    h.receive("GR-1", 1, w1, &[(p1, "10"), (p2, "1"), (p3, "4")]).await;
    h.receive("GR-2", 1, w2, &[(p1, "2")]).await;
    h.issue("GI-1", 2, w1, &[(p2, "1")]).await;

    let register = h.engine.register();
    let all_w1 = register
        .balances_by_warehouse(w1, BalanceFilter::default())
        .await
        .unwrap();
    assert_eq!(all_w1.len(), 3);

    let non_zero = register
        .balances_by_warehouse(w1, BalanceFilter::default().non_zero())
        .await
        .unwrap();
    assert_eq!(non_zero.len(), 2);
    assert!(non_zero.iter().all(|b| b.product_id != p2));

    let bounded = register
        .balances_by_warehouse(
            w1,
            BalanceFilter {
                min_quantity: Some(qty("5")),
                ..BalanceFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(bounded.len(), 1);
    assert_eq!(bounded[0].product_id, p1);

    let p1_everywhere = register
        .balances_by_product(p1, BalanceFilter::default())
        .await
        .unwrap();
    assert_eq!(p1_everywhere.len(), 2);
    let total: Quantity = p1_everywhere.iter().map(|b| b.quantity).sum();
    assert_eq!(total, qty("12"));

    let page = register
        .list_balances(&BalanceFilter::default(), PageRequest::new(1, 3))
        .await
        .unwrap();
    assert_eq!(page.data.len(), 3);
    assert_eq!(page.meta.total, 4);
    assert_eq!(page.meta.total_pages, 2);
}

#[tokio::test]
async fn test_balance_at_date_ignores_later_movements() {
    let h = Harness::new().await;
    let (w1, p1) = (warehouse(1), product(1));
    h.receive("GR-1", 1, w1, &[(p1, "10")]).await;
    h.issue("GI-1", 5, w1, &[(p1, "4")]).await;
    h.receive("GR-2", 10, w1, &[(p1, "1.5")]).await;

    let register = h.engine.register();
    let at = |day| register.balance_at_date(w1, p1, midnight(day));
    assert_eq!(at(1).await.unwrap(), qty("10"));
    assert_eq!(at(4).await.unwrap(), qty("10"));
    assert_eq!(at(5).await.unwrap(), qty("6"));
    assert_eq!(at(12).await.unwrap(), qty("7.5"));
    assert_eq!(h.balance_at_now(w1, p1).await, h.balance(w1, p1).await);

    let scoped = register
        .balances_at_date(BalanceScope::Warehouse(w1), midnight(5))
        .await
        .unwrap();
    assert_eq!(scoped.get(&Dimension::new(w1, p1)), Some(&qty("6")));
}

#[tokio::test]
async fn test_turnover_over_window() {
    let h = Harness::new().await;
    let (w1, p1, p2) = (warehouse(1), product(1), product(2));
    h.receive("GR-1", 1, w1, &[(p1, "10"), (p2, "100")]).await;
    h.receive("GR-2", 5, w1, &[(p1, "5")]).await;
    h.issue("GI-1", 6, w1, &[(p1, "3")]).await;
    h.issue("GI-2", 10, w1, &[(p1, "2")]).await;

    let filter = TurnoverFilter {
        warehouse_id: Some(w1),
        product_id: Some(p1),
        from: midnight(5),
        to: midnight(10),
    };
    let turnover = h.engine.register().get_turnover(&filter).await.unwrap();
    assert_eq!(turnover.opening, qty("10"));
    assert_eq!(turnover.receipt, qty("5"));
    assert_eq!(turnover.expense, qty("3"));
    assert_eq!(turnover.closing, qty("12"));
    assert!(turnover.is_consistent());

    // Same numbers computed in memory from the movement history
    let history = h
        .engine
        .register()
        .list_movements(&MovementFilter::default(), PageRequest::new(1, 100))
        .await
        .unwrap();
    assert_eq!(Turnover::from_movements(&filter, &history.data).unwrap(), turnover);

    let inverted = TurnoverFilter {
        from: midnight(10),
        to: midnight(5),
        ..filter
    };
    assert!(matches!(
        h.engine.register().get_turnover(&inverted).await,
        Err(RegisterError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_movement_history_filters_and_pages() {
    let h = Harness::new().await;
    let (w1, p1, p2) = (warehouse(1), product(1), product(2));
    let receipt = h.receive("GR-1", 1, w1, &[(p1, "10"), (p2, "1")]).await;
    h.issue("GI-1", 2, w1, &[(p1, "1")]).await;
    h.issue("GI-2", 3, w1, &[(p1, "1")]).await;

    let register = h.engine.register();
    let p1_history = register
        .list_movements(
            &MovementFilter {
                product_id: Some(p1),
                ..MovementFilter::default()
            },
            PageRequest::new(1, 2),
        )
        .await
        .unwrap();
    assert_eq!(p1_history.meta.total, 3);
    assert_eq!(p1_history.meta.total_pages, 2);
    assert_eq!(p1_history.data[0].period, midnight(1));
    assert_eq!(p1_history.data[1].period, midnight(2));

    let expenses = register
        .list_movements(
            &MovementFilter {
                record_type: Some(RecordType::Expense),
                period_from: Some(midnight(3)),
                ..MovementFilter::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(expenses.data.len(), 1);

    let by_recorder = register
        .list_movements(
            &MovementFilter {
                recorder_id: Some(receipt.id),
                ..MovementFilter::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_recorder.meta.total, 2);
}

#[tokio::test]
async fn test_invalid_batch_writes_nothing() {
    let h = Harness::new().await;
    let (w1, p1) = (warehouse(1), product(1));
    let batch = vec![
        movement(0, RecordType::Receipt, w1, p1, qty("1")),
        movement(1, RecordType::Receipt, w1, p1, qty("2")),
        movement(2, RecordType::Receipt, w1, p1, Quantity::ZERO),
    ];

    let tm = h.engine.transaction_manager();
    let scope = tm.begin().await.unwrap();
    let result = h.engine.register_in(&scope).record_movements(&batch).await;
    let err = scope.finish(result).await.unwrap_err();
    assert!(matches!(err, RegisterError::Validation { ref field, .. } if field.starts_with("movements[2]")));

    assert_eq!(h.balance(w1, p1).await, Quantity::ZERO);
    let history = h
        .engine
        .register()
        .list_movements(&MovementFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert!(history.data.is_empty());
}

#[tokio::test]
async fn test_record_and_reverse_movements() {
    let h = Harness::new().await;
    let (w1, p1, p2) = (warehouse(1), product(1), product(2));
    let mut batch = vec![
        movement(0, RecordType::Receipt, w1, p1, qty("3")),
        movement(1, RecordType::Receipt, w1, p2, qty("2")),
    ];
    let mut second = movement(2, RecordType::Expense, w1, p1, qty("1"));
    second.recorder_version = 2;
    batch.push(second);

    let tm = h.engine.transaction_manager();
    let scope = tm.begin().await.unwrap();
    let register = h.engine.register_in(&scope);
    let result = async {
        register.record_movements(&batch).await?;
        // Only version 1 is below the cut
        register
            .reverse_movements(DocumentId::from_uuid(Uuid::from_u128(0xDD00)), 2)
            .await
    }
    .await;
    let removed = scope.finish(result).await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(h.balance(w1, p1).await, qty("-1"));
    assert_eq!(h.balance(w1, p2).await, Quantity::ZERO);
    assert_eq!(h.balance_at_now(w1, p1).await, qty("-1"));
}

#[tokio::test]
async fn test_check_and_reserve_stock() {
    let h = Harness::new().await;
    let (w1, p1, p2) = (warehouse(1), product(1), product(2));
    h.receive("GR-1", 1, w1, &[(p1, "5"), (p2, "1")]).await;

    let tm = h.engine.transaction_manager();
    let requirement = |product_id, required: &str| StockRequirement {
        warehouse_id: w1,
        product_id,
        required: qty(required),
    };

    let scope = tm.begin().await.unwrap();
    let result = h
        .engine
        .register_in(&scope)
        .check_and_reserve_stock(&[requirement(p2, "1"), requirement(p1, "2"), requirement(p1, "3")])
        .await;
    let locked = scope.finish(result).await.unwrap();
    assert_eq!(locked.len(), 2);
    assert!(locked.iter().any(|b| b.product_id == p1 && b.quantity == qty("5")));
    assert!(locked.iter().any(|b| b.product_id == p2 && b.quantity == qty("1")));

    // Merged requirements for p1 exceed what is on hand
    let scope = tm.begin().await.unwrap();
    let result = h
        .engine
        .register_in(&scope)
        .check_and_reserve_stock(&[requirement(p1, "3"), requirement(p1, "2.0001")])
        .await;
    let err = scope.finish(result).await.unwrap_err();
    assert_eq!(
        err,
        RegisterError::InsufficientStock {
            warehouse_id: w1,
            product_id: p1,
            requested: qty("5.0001"),
            available: qty("5"),
        }
    );
}

#[tokio::test]
async fn test_recalculate_repairs_drift() {
    let h = Harness::new().await;
    let (w1, w2, p1, p2) = (warehouse(1), warehouse(2), product(1), product(2));
    h.receive("GR-1", 1, w1, &[(p1, "10"), (p2, "2")]).await;
    h.receive("GR-2", 1, w2, &[(p1, "7")]).await;
    h.issue("GI-1", 2, w1, &[(p1, "4")]).await;

    // Corrupt one row and drop another
    balances::Entity::update_many()
        .col_expr(balances::Column::Quantity, Expr::value(999_i64))
        .filter(balances::Column::WarehouseId.eq(w1.into_inner()))
        .filter(balances::Column::ProductId.eq(p1.into_inner()))
        .exec(h.db())
        .await
        .unwrap();
    balances::Entity::delete_many()
        .filter(balances::Column::WarehouseId.eq(w2.into_inner()))
        .exec(h.db())
        .await
        .unwrap();

    let register = h.engine.register();
    let before = register.verify_balances(BalanceScope::All).await.unwrap();
    assert_eq!(before.checked, 3);
    assert_eq!(before.drifts.len(), 2);

    // A scoped rebuild only touches its scope
    let report = h
        .engine
        .recalculate_balances(BalanceScope::Warehouse(w1))
        .await
        .unwrap();
    assert_eq!(report.drifts.len(), 1);
    assert_eq!(report.drifts[0].materialized, Quantity::from_scaled(999));
    assert_eq!(report.drifts[0].recomputed, qty("6"));
    assert_eq!(h.balance(w1, p1).await, qty("6"));
    assert_eq!(h.balance(w2, p1).await, Quantity::ZERO);

    let report = h.engine.recalculate_balances(BalanceScope::All).await.unwrap();
    assert_eq!(report.drifts.len(), 1);
    assert_eq!(h.balance(w2, p1).await, qty("7"));
    assert_eq!(
        h.engine.register().get_balance(w2, p1).await.unwrap().last_movement_at,
        Some(midnight(1))
    );

    let after = h.engine.register().verify_balances(BalanceScope::All).await.unwrap();
    assert!(after.is_consistent());
}

#[tokio::test]
async fn test_verify_ignores_movements_after_now() {
    let h = Harness::new().await;
    let (w1, p1) = (warehouse(1), product(1));
    h.receive("GR-1", 1, w1, &[(p1, "1")]).await;

    // Travel back before the receipt: the ledger has nothing "yet"
    h.clock.set(midnight(1) - Duration::hours(1));
    let report = h.engine.register().verify_balances(BalanceScope::All).await.unwrap();
    assert_eq!(report.drifts.len(), 1);
    assert_eq!(report.drifts[0].recomputed, Quantity::ZERO);
}

#[tokio::test]
async fn test_issue_without_stock_leaves_draft() {
    let h = Harness::new().await;
    let doc = h
        .draft(DocumentKind::GoodsIssue, "GI-1", 1, warehouse(1), &[(product(1), "0.0001")])
        .await;
    assert!(matches!(
        h.engine.post(doc.id).await,
        Err(RegisterError::InsufficientStock { .. })
    ));
}

#[tokio::test]
async fn test_future_dated_movements_are_rejected() {
    let h = Harness::new().await;
    let (w1, p1) = (warehouse(1), product(1));
    let mut ahead = movement(1, RecordType::Receipt, w1, p1, qty("10"));
    ahead.period = now() + Duration::days(3);
    let batch = vec![movement(0, RecordType::Receipt, w1, p1, qty("1")), ahead];

    let scope = h.engine.transaction_manager().begin().await.unwrap();
    let result = h.engine.register_in(&scope).record_movements(&batch).await;
    let err = scope.finish(result).await.unwrap_err();
    assert!(matches!(err, RegisterError::Validation { ref field, .. } if field == "movements[1].period"));

    // Nothing from the batch reached the ledger or the balances
    assert_eq!(h.balance(w1, p1).await, Quantity::ZERO);
    assert_eq!(h.balance_at_now(w1, p1).await, Quantity::ZERO);
    let report = h.engine.register().verify_balances(BalanceScope::All).await.unwrap();
    assert!(report.is_consistent());

    // Dated exactly now is fine
    let mut on_time = movement(2, RecordType::Receipt, w1, p1, qty("10"));
    on_time.period = now();
    let scope = h.engine.transaction_manager().begin().await.unwrap();
    let result = h.engine.register_in(&scope).record_movements(&[on_time]).await;
    scope.finish(result).await.unwrap();
    assert_eq!(h.balance(w1, p1).await, h.balance_at_now(w1, p1).await);
    assert_eq!(h.balance(w1, p1).await, qty("10"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// The materialized balance always equals the ledger sum at "now".
    #[test]
    fn prop_materialized_matches_ledger(
        ops in prop::collection::vec((any::<bool>(), 0u128..3, 1i64..5_000_000), 1..25)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let h = Harness::new().await;
            let w1 = warehouse(1);
            let batch: Vec<Movement> = ops
                .iter()
                .zip(0u128..)
                .map(|(&(receipt, p, scaled), n)| {
                    let record_type = if receipt { RecordType::Receipt } else { RecordType::Expense };
                    movement(n, record_type, w1, product(p), Quantity::from_scaled(scaled))
                })
                .collect();

            let tm = h.engine.transaction_manager();
            for chunk in batch.chunks(4) {
                let scope = tm.begin().await.unwrap();
                let result = h.engine.register_in(&scope).record_movements(chunk).await;
                scope.finish(result).await.unwrap();
            }

            for p in 0..3 {
                assert_eq!(h.balance(w1, product(p)).await, h.balance_at_now(w1, product(p)).await);
            }
            let report = h.engine.register().verify_balances(BalanceScope::All).await.unwrap();
            assert!(report.is_consistent());
        });
    }
}
