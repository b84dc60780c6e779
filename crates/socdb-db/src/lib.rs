//! Postgres storage for collected social records, the collection ledger,
//! and batch-run bookkeeping.
//!
//! Every write of collected data goes through [`upsert()`], which makes a
//! re-run of the same job leave the tables unchanged.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use socdb_core::AppConfig;

// Relative to crates/socdb-db/Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// A worker runs one job, so it never needs more than a couple of connections.
const WORKER_MAX_CONNECTIONS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }

    /// Pool sized for a single-job worker process.
    #[must_use]
    pub fn for_worker(config: &AppConfig) -> Self {
        let max_connections = config.db_max_connections.min(WORKER_MAX_CONNECTIONS);
        Self {
            max_connections,
            min_connections: config.db_min_connections.min(max_connections),
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("batch run {id} is not in '{expected_status}' status")]
    InvalidBatchRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Applies pending migrations and returns how many were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from((after - before).max(0)).unwrap_or(0))
}

// Zero when the bookkeeping table does not exist yet.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// # Errors
///
/// Returns [`sqlx::Error`] if the round trip fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Saturating conversion for count columns declared as `INTEGER`.
pub(crate) fn count_to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_conversion_saturates() {
        assert_eq!(count_to_i32(7), 7);
        assert_eq!(count_to_i32(usize::MAX), i32::MAX);
    }
}

pub mod accounts;
pub mod batch_runs;
pub mod history;
pub mod social;
pub mod upsert;

pub use accounts::{
    is_account_active, list_user_snapshots, set_account_active, UserSnapshotRow,
};
pub use batch_runs::{
    complete_batch_run, create_batch_run, fail_batch_run, get_batch_run, list_batch_runs,
    start_batch_run, BatchRunRow, BatchRunTotals,
};
pub use history::{
    list_history, record_history, record_history_best_effort, HistoryEntry, HistoryRow,
};
pub use social::{
    list_platform_usernames, save_collected, save_hashtag_posts, save_posts, save_stories,
    save_user,
};
pub use upsert::{dedupe_keep_last, upsert, StorageWriteError, TableSpec, UpsertRecord, WritePhase};
