//! Pessimistic row locking
//!
//! Wraps `SELECT ... FOR UPDATE | FOR SHARE` inside a transaction the caller
//! already opened. The lock lives exactly as long as that transaction: it is
//! released by the database on commit or rollback, never by this module.
//!
//! The wait bound is applied per backend before the locking select:
//! - PostgreSQL: `SET LOCAL lock_timeout` (scoped to the transaction)
//! - MySQL: `SET SESSION innodb_lock_wait_timeout` (whole seconds, minimum 1)
//! - A zero timeout uses `NOWAIT` instead of a wait bound
//!
//! The previous setting is read before the bound is applied and put back right
//! after the locking select, so the bound covers that one statement only.
//!
//! On PostgreSQL a timed-out statement aborts the transaction; the caller has to
//! roll it back before retrying.

use std::time::Duration;

use sea_orm::sea_query::{LockBehavior, LockType};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, DbErr, EntityName, EntityTrait,
    QuerySelect, Select, Statement,
};
use tracing::{debug, warn};
use warden_common::config::PessimisticConfig;
use warden_common::{WardenError, WardenResult};

/// Row lock strength
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// `FOR UPDATE`: excludes other exclusive and shared lockers
    Exclusive,
    /// `FOR SHARE`: compatible with other shared lockers
    Shared,
}

impl LockMode {
    fn lock_type(self) -> LockType {
        match self {
            LockMode::Exclusive => LockType::Update,
            LockMode::Shared => LockType::Share,
        }
    }
}

/// Error messages that mean "another transaction holds a conflicting row lock"
const LOCK_TIMEOUT_MARKERS: &[&str] = &[
    // PostgreSQL 55P03 lock_not_available
    "lock timeout",
    "could not obtain lock",
    // MySQL 1205 / 3572
    "lock wait timeout exceeded",
    "nowait is set",
];

/// Column alias for the saved wait bound
const WAIT_BOUND_COLUMN: &str = "wait_bound";

/// Acquires relational row locks inside caller-owned transactions
#[derive(Debug, Clone)]
pub struct PessimisticLockController {
    default_timeout: Duration,
}

impl Default for PessimisticLockController {
    fn default() -> Self {
        Self::from_config(&PessimisticConfig::default())
    }
}

impl PessimisticLockController {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn from_config(config: &PessimisticConfig) -> Self {
        Self::new(config.timeout())
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Lock the single row matched by `select` and return it
    ///
    /// Fails with `NotFound` when no row matches and with `LockTimeout` when a
    /// conflicting lock was not released within `timeout`. Neither is retried.
    pub async fn lock<E>(
        &self,
        txn: &DatabaseTransaction,
        select: Select<E>,
        mode: LockMode,
        timeout: Duration,
    ) -> WardenResult<E::Model>
    where
        E: EntityTrait,
    {
        let entity = E::default().table_name().to_string();
        let backend = txn.get_database_backend();
        let timeout_ms = timeout.as_millis() as u64;
        ensure_row_locks(backend)?;

        let (select, previous_bound) = if timeout.is_zero() {
            (
                select.lock_with_behavior(mode.lock_type(), LockBehavior::Nowait),
                None,
            )
        } else {
            let previous = current_wait_bound(txn, backend)
                .await
                .map_err(|e| classify(e, &entity, timeout_ms))?;
            txn.execute_unprepared(&lock_timeout_sql(backend, timeout)?)
                .await
                .map_err(|e| classify(e, &entity, timeout_ms))?;
            (select.lock(mode.lock_type()), Some(previous))
        };

        let selected = select.one(txn).await;

        // A failed statement aborts a PostgreSQL transaction and its SET LOCAL
        // ends with the rollback; MySQL keeps the transaction and the session
        if let Some(previous) = previous_bound
            && (selected.is_ok() || backend == DatabaseBackend::MySql)
        {
            let restored = restore_wait_bound(txn, backend, &previous).await;
            match (&selected, restored) {
                (_, Ok(())) => {}
                (Ok(_), Err(e)) => return Err(e),
                (Err(_), Err(e)) => {
                    warn!(entity = %entity, error = %e, "Failed to restore lock wait bound");
                }
            }
        }

        match selected {
            Ok(Some(model)) => {
                debug!(entity = %entity, mode = ?mode, "Row lock granted");
                Ok(model)
            }
            Ok(None) => Err(WardenError::NotFound(format!(
                "{} row matching lock selector",
                entity
            ))),
            Err(e) => {
                let err = classify(e, &entity, timeout_ms);
                if matches!(err, WardenError::LockTimeout { .. }) {
                    warn!(entity = %entity, timeout_ms, "Row lock wait timed out");
                }
                Err(err)
            }
        }
    }

    /// Exclusive lock with the controller's default timeout
    pub async fn lock_exclusive<E>(
        &self,
        txn: &DatabaseTransaction,
        select: Select<E>,
    ) -> WardenResult<E::Model>
    where
        E: EntityTrait,
    {
        self.lock(txn, select, LockMode::Exclusive, self.default_timeout)
            .await
    }

    /// Shared lock with the controller's default timeout
    pub async fn lock_shared<E>(
        &self,
        txn: &DatabaseTransaction,
        select: Select<E>,
    ) -> WardenResult<E::Model>
    where
        E: EntityTrait,
    {
        self.lock(txn, select, LockMode::Shared, self.default_timeout)
            .await
    }
}

fn ensure_row_locks(backend: DatabaseBackend) -> WardenResult<()> {
    match backend {
        DatabaseBackend::Postgres | DatabaseBackend::MySql => Ok(()),
        other => Err(WardenError::UnsupportedBackend(format!(
            "{:?} has no row-level locks",
            other
        ))),
    }
}

/// Statement that bounds the lock wait of subsequent statements
fn lock_timeout_sql(backend: DatabaseBackend, timeout: Duration) -> WardenResult<String> {
    ensure_row_locks(backend)?;
    let millis = timeout.as_millis().max(1);
    match backend {
        DatabaseBackend::Postgres => Ok(format!("SET LOCAL lock_timeout = '{}ms'", millis)),
        _ => {
            // innodb_lock_wait_timeout only takes whole seconds
            let secs = millis.div_ceil(1000).max(1);
            Ok(format!("SET SESSION innodb_lock_wait_timeout = {}", secs))
        }
    }
}

fn current_wait_bound_sql(backend: DatabaseBackend) -> &'static str {
    match backend {
        DatabaseBackend::Postgres => "SELECT current_setting('lock_timeout') AS wait_bound",
        _ => "SELECT CAST(@@SESSION.innodb_lock_wait_timeout AS CHAR) AS wait_bound",
    }
}

/// Wait bound in effect before this controller changes it
async fn current_wait_bound(
    txn: &DatabaseTransaction,
    backend: DatabaseBackend,
) -> Result<String, DbErr> {
    let row = txn
        .query_one(Statement::from_string(
            backend,
            current_wait_bound_sql(backend),
        ))
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("lock wait bound setting".to_string()))?;
    row.try_get::<String>("", WAIT_BOUND_COLUMN)
}

/// Statement that puts a saved wait bound back
fn restore_wait_bound_sql(backend: DatabaseBackend, previous: &str) -> WardenResult<String> {
    match backend {
        DatabaseBackend::Postgres => Ok(format!(
            "SET LOCAL lock_timeout = '{}'",
            previous.replace('\'', "''")
        )),
        _ => {
            let secs: u64 = previous.trim().parse().map_err(|_| {
                WardenError::Database(format!(
                    "unexpected innodb_lock_wait_timeout value '{}'",
                    previous
                ))
            })?;
            Ok(format!("SET SESSION innodb_lock_wait_timeout = {}", secs))
        }
    }
}

async fn restore_wait_bound(
    txn: &DatabaseTransaction,
    backend: DatabaseBackend,
    previous: &str,
) -> WardenResult<()> {
    let sql = restore_wait_bound_sql(backend, previous)?;
    txn.execute_unprepared(&sql)
        .await
        .map(|_| ())
        .map_err(|e| WardenError::Database(e.to_string()))
}

fn classify(err: DbErr, entity: &str, timeout_ms: u64) -> WardenError {
    let message = err.to_string();
    if is_lock_timeout(&message) {
        WardenError::LockTimeout {
            entity: entity.to_string(),
            timeout_ms,
        }
    } else {
        WardenError::Database(message)
    }
}

fn is_lock_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    LOCK_TIMEOUT_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
