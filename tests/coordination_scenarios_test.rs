// Integration tests for the coordination layer
// Exercises locks, counters, optimistic and pessimistic updates through the public API

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use sea_orm::{
    DatabaseBackend, DbErr, EntityTrait, MockDatabase, MockExecResult, TransactionTrait, Value,
};
use warden::{
    Clock, Coordinator, LockManager, LockMode, LockOptions, ManualClock, MemoryFastStore,
    MemoryVersionedRepository, OptimisticController, RecordingSleeper, Versioned, Warden,
    WardenConfig, WardenError,
};

const KEY: &str = "u:42:pts";
const TTL: Duration = Duration::from_secs(30);

fn warden() -> Warden {
    let mut config = WardenConfig::default();
    config.store.sweep_interval_ms = 0;
    Warden::with_store(config, Arc::new(MemoryFastStore::new()))
}

#[derive(Debug, Clone, PartialEq)]
struct Wallet {
    user_id: u64,
    points: i64,
    version: u64,
}

impl Versioned for Wallet {
    type Id = u64;

    fn entity_name() -> &'static str {
        "wallet"
    }

    fn id(&self) -> u64 {
        self.user_id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

mod account {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "account")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub balance: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

fn exec_ok() -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected: 0,
    }
}

fn wait_bound(value: &str) -> Vec<BTreeMap<&'static str, Value>> {
    vec![BTreeMap::from([("wait_bound", Value::from(value))])]
}

#[tokio::test]
async fn test_second_acquire_fails_while_held() {
    let warden = warden();

    let first = warden.locks().acquire(KEY, TTL, 0, Duration::ZERO).await;
    let second = warden.locks().acquire(KEY, TTL, 0, Duration::ZERO).await;

    assert!(first.is_some());
    assert!(second.is_none());
}

#[tokio::test]
async fn test_release_then_reacquire() {
    let warden = warden();
    let locks = warden.locks();

    let token = locks.acquire(KEY, TTL, 0, Duration::ZERO).await.unwrap();
    assert!(locks.release(KEY, &token).await.unwrap());

    let next = locks.acquire(KEY, TTL, 0, Duration::ZERO).await.unwrap();
    assert_ne!(next, token);
}

#[tokio::test]
async fn test_bogus_token_cannot_release() {
    let warden = warden();
    let locks = warden.locks();

    let token = locks.acquire(KEY, TTL, 0, Duration::ZERO).await.unwrap();

    assert!(!locks.release(KEY, "bogus").await.unwrap());
    assert!(locks.acquire(KEY, TTL, 0, Duration::ZERO).await.is_none());
    assert_eq!(
        locks.holder(KEY).await.unwrap().as_deref(),
        Some(token.as_str())
    );
}

#[tokio::test]
async fn test_stale_optimistic_update_surfaces_conflict() {
    let repo = MemoryVersionedRepository::new();
    repo.insert(Wallet {
        user_id: 42,
        points: 10,
        version: 6,
    });
    let sleeper = Arc::new(RecordingSleeper::new());
    let controller =
        OptimisticController::new(3, Duration::from_millis(20)).with_sleeper(sleeper.clone());
    let calls = AtomicU32::new(0);

    let stale = Wallet {
        user_id: 42,
        points: 10,
        version: 5,
    };
    let err = controller
        .update(&repo, stale, |w| {
            calls.fetch_add(1, Ordering::SeqCst);
            Wallet { version: 5, ..w }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::VersionConflict { attempts: 4, .. }));
    assert!(err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(sleeper.total(), Duration::from_millis(60));
    assert_eq!(repo.get(&42).unwrap().version, 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_download_counter() {
    let warden = Arc::new(warden());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let warden = warden.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                warden.counters().increment("dl:game:7", 1).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(warden.counters().read("dl:game:7").await, 100);
}

#[tokio::test]
async fn test_abandoned_lock_expires_after_ttl() {
    let clock = ManualClock::new(1_700_000_000_000);
    let store = Arc::new(MemoryFastStore::with_clock(Arc::new(clock.clone())));
    let locks = LockManager::new(store)
        .with_sleeper(Arc::new(RecordingSleeper::advancing(clock.clone())));

    // Holder crashes without releasing
    let crashed = locks.acquire(KEY, TTL, 0, Duration::ZERO).await.unwrap();

    clock.advance(Duration::from_secs(29));
    assert!(locks.acquire(KEY, TTL, 0, Duration::ZERO).await.is_none());

    clock.advance(Duration::from_secs(1));
    let next = locks.acquire(KEY, TTL, 0, Duration::ZERO).await.unwrap();
    assert_ne!(next, crashed);

    // The crashed holder's late release must not free the new lock
    assert!(!locks.release(KEY, &crashed).await.unwrap());
    assert_eq!(
        locks.holder(KEY).await.unwrap().as_deref(),
        Some(next.as_str())
    );
}

#[tokio::test]
async fn test_retrying_acquire_waits_out_the_ttl() {
    let clock = ManualClock::new(0);
    let store = Arc::new(MemoryFastStore::with_clock(Arc::new(clock.clone())));
    let sleeper = Arc::new(RecordingSleeper::advancing(clock.clone()));
    let locks = LockManager::new(store).with_sleeper(sleeper.clone());

    locks
        .acquire(KEY, Duration::from_secs(10), 0, Duration::ZERO)
        .await
        .unwrap();
    let started = clock.now_millis();

    let token = locks
        .acquire(KEY, TTL, 5, Duration::from_secs(4))
        .await
        .unwrap();

    // Attempts at t=0, 4, 8 fail; t=12 succeeds
    assert_eq!(sleeper.count(), 3);
    assert_eq!(clock.now_millis() - started, 12_000);
    assert!(locks.release(KEY, &token).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_with_lock_serializes_read_modify_write() {
    let warden = Arc::new(warden());
    let balance = Arc::new(AtomicI64::new(0));
    let options = LockOptions::try_once(TTL).with_retries(10_000, Duration::from_millis(1));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let coordinator: Coordinator = warden.coordinator().clone();
        let balance = balance.clone();
        let options = options.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .with_lock(KEY, &options, || async move {
                    // Unprotected this would lose updates
                    let current = balance.load(Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    balance.store(current + 1, Ordering::SeqCst);
                    Ok::<_, WardenError>(())
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(balance.load(Ordering::SeqCst), 16);
    assert!(warden.locks().holder(KEY).await.unwrap().is_none());
    assert_eq!(warden.locks().stats().acquisitions, 16);
    assert_eq!(warden.locks().stats().releases, 16);
}

#[tokio::test]
async fn test_with_lock_reports_unavailable_key() -> anyhow::Result<()> {
    let warden = warden();
    let _held = warden.locks().acquire(KEY, TTL, 0, Duration::ZERO).await;

    let result = warden
        .coordinator()
        .with_lock(KEY, &LockOptions::try_once(TTL), || async {
            Ok::<_, WardenError>(())
        })
        .await;

    match result {
        Err(WardenError::LockUnavailable { key, attempts }) => {
            assert_eq!(key, KEY);
            assert_eq!(attempts, 1);
        }
        other => anyhow::bail!("expected LockUnavailable, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_row_lock_wait_exceeded() -> anyhow::Result<()> {
    let warden = warden();
    let db = MockDatabase::new(DatabaseBackend::MySql)
        .append_query_results([wait_bound("50")])
        .append_exec_results([exec_ok(), exec_ok()])
        .append_query_errors([DbErr::Custom(
            "Lock wait timeout exceeded; try restarting transaction".to_string(),
        )])
        .into_connection();

    let txn = db.begin().await?;
    let err = warden
        .pessimistic()
        .lock(
            &txn,
            account::Entity::find_by_id(7),
            LockMode::Exclusive,
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
    txn.rollback().await?;

    assert!(matches!(
        err,
        WardenError::LockTimeout { ref entity, timeout_ms: 2000 } if entity == "account"
    ));
    assert!(err.is_retryable());

    let log = format!("{:?}", db.into_transaction_log());
    assert!(log.contains("innodb_lock_wait_timeout = 2"));
    assert!(log.contains("FOR UPDATE"));
    // The pooled session gets its own wait bound back
    assert!(log.contains("SET SESSION innodb_lock_wait_timeout = 50"));
    Ok(())
}

#[tokio::test]
async fn test_row_lock_returns_locked_row() -> anyhow::Result<()> {
    let warden = warden();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([wait_bound("0")])
        .append_exec_results([exec_ok(), exec_ok()])
        .append_query_results([vec![account::Model {
            id: 7,
            balance: 250,
        }]])
        .into_connection();

    let txn = db.begin().await?;
    let row = warden
        .pessimistic()
        .lock_shared(&txn, account::Entity::find_by_id(7))
        .await?;
    txn.commit().await?;

    assert_eq!(row.balance, 250);
    let log = format!("{:?}", db.into_transaction_log());
    assert!(log.contains("SET LOCAL lock_timeout = '5000ms'"));
    assert!(log.contains("FOR SHARE"));
    assert!(log.contains("SET LOCAL lock_timeout = '0'"));
    Ok(())
}
