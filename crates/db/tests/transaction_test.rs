//! Transaction manager tests: commit/rollback, nesting, savepoints and the
//! transaction time limit.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::sqlite;
use rstest::rstest;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use stockreg_core::RegisterError;
use stockreg_db::entities::counterparties;
use stockreg_db::{CounterpartyRepository, Nesting, TransactionManager, TxScope};
use stockreg_shared::types::CounterpartyId;
use uuid::Uuid;

fn id(n: u128) -> CounterpartyId {
    CounterpartyId::from_uuid(Uuid::from_u128(n))
}

async fn add(scope: &TxScope, n: u128) -> Result<(), RegisterError> {
    CounterpartyRepository::new(scope.conn())
        .create(id(n), &format!("CP-{n}"), "Counterparty", Utc::now())
        .await
        .map(|_| ())
}

async fn exists(db: &DatabaseConnection, n: u128) -> bool {
    CounterpartyRepository::new(db).get(id(n)).await.is_ok()
}

async fn manager() -> TransactionManager {
    TransactionManager::new(sqlite().await, Duration::from_secs(5), Duration::from_secs(30))
}

#[tokio::test]
async fn test_commit_on_ok_rollback_on_err() {
    let tm = manager().await;

    tm.run_in_transaction(|scope| Box::pin(async move { add(scope, 1).await }))
        .await
        .unwrap();

    let err = tm
        .run_in_transaction(|scope| {
            Box::pin(async move {
                add(scope, 2).await?;
                Err::<(), _>(RegisterError::validation("test", "abort"))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RegisterError::Validation { .. }));

    assert!(exists(tm.connection(), 1).await);
    assert!(!exists(tm.connection(), 2).await);
}

#[tokio::test]
async fn test_savepoint_contains_failure() {
    let tm = manager().await;
    let scope = tm.begin().await.unwrap();
    assert_eq!(scope.depth(), 0);

    add(&scope, 1).await.unwrap();
    let nested = scope
        .run_nested(Nesting::Savepoint, |sp| {
            Box::pin(async move {
                assert_eq!(sp.depth(), 1);
                add(sp, 2).await?;
                Err::<(), _>(RegisterError::validation("test", "inner failure"))
            })
        })
        .await;
    assert!(nested.is_err());

    // The outer unit of work carries on
    add(&scope, 3).await.unwrap();
    scope.commit().await.unwrap();

    assert!(exists(tm.connection(), 1).await);
    assert!(!exists(tm.connection(), 2).await);
    assert!(exists(tm.connection(), 3).await);
}

#[tokio::test]
async fn test_savepoint_released_on_success() {
    let tm = manager().await;
    let scope = tm.begin().await.unwrap();

    scope
        .run_nested(Nesting::Savepoint, |sp| Box::pin(async move { add(sp, 1).await }))
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert!(exists(tm.connection(), 1).await);
}

#[tokio::test]
async fn test_outer_rollback_discards_released_savepoint() {
    let tm = manager().await;
    let scope = tm.begin().await.unwrap();

    let sp = scope.savepoint().await.unwrap();
    add(&sp, 1).await.unwrap();
    sp.commit().await.unwrap();
    scope.rollback().await.unwrap();

    assert!(!exists(tm.connection(), 1).await);
}

#[tokio::test]
async fn test_nested_savepoints_roll_back_to_their_marker() {
    let tm = manager().await;
    let scope = tm.begin().await.unwrap();

    let outer = scope.savepoint().await.unwrap();
    add(&outer, 1).await.unwrap();
    let inner = outer.savepoint().await.unwrap();
    assert_eq!(inner.depth(), 2);
    add(&inner, 2).await.unwrap();
    inner.rollback().await.unwrap();
    outer.commit().await.unwrap();
    scope.commit().await.unwrap();

    assert!(exists(tm.connection(), 1).await);
    assert!(!exists(tm.connection(), 2).await);
}

#[rstest]
#[case::savepoint(Nesting::Savepoint, 1, true)]
#[case::reuse(Nesting::Reuse, 0, false)]
#[tokio::test]
async fn test_inner_failure_by_nesting(
    #[case] nesting: Nesting,
    #[case] inner_depth: u32,
    #[case] outer_survives: bool,
) {
    let tm = manager().await;
    let scope = tm.begin().await.unwrap();

    let result = async {
        add(&scope, 1).await?;
        let _ = scope
            .run_nested(nesting, |inner| {
                Box::pin(async move {
                    assert_eq!(inner.depth(), inner_depth);
                    add(inner, 2).await?;
                    Err::<(), _>(RegisterError::validation("test", "inner failure"))
                })
            })
            .await;
        // A savepoint rollback leaves the transaction usable; a reused scope
        // has the failed write in it and the caller gives up
        if nesting == Nesting::Reuse {
            return Err(RegisterError::validation("test", "outer gives up"));
        }
        Ok(())
    }
    .await;
    let _ = scope.finish(result).await;

    assert_eq!(exists(tm.connection(), 1).await, outer_survives);
    assert!(!exists(tm.connection(), 2).await);
}

#[tokio::test]
async fn test_transaction_time_limit_rolls_back() {
    let tm = TransactionManager::new(
        sqlite().await,
        Duration::from_secs(5),
        Duration::from_millis(50),
    );

    let err = tm
        .run_in_transaction(|scope| {
            Box::pin(async move {
                add(scope, 1).await?;
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<_, RegisterError>(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RegisterError::Internal(ref msg) if msg.contains("time limit")));

    // The abandoned scope released the connection and its writes
    let count = counterparties::Entity::find().count(tm.connection()).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_dropped_scope_rolls_back() {
    let tm = manager().await;
    {
        let scope = tm.begin().await.unwrap();
        add(&scope, 1).await.unwrap();
    }
    assert!(!exists(tm.connection(), 1).await);
}
