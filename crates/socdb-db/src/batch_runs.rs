//! Database operations for `batch_runs`, one row per locked multi-job run.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `batch_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BatchRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub mode: String,
    pub discipline: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub job_count: i32,
    pub succeeded_count: i32,
    pub failed_count: i32,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Final tallies written when a run leaves `running`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchRunTotals {
    pub job_count: i32,
    pub succeeded_count: i32,
    pub failed_count: i32,
    pub records_processed: i32,
}

const RETURNING: &str = "id, public_id, mode, discipline, trigger_source, status, \
     started_at, completed_at, job_count, succeeded_count, failed_count, \
     records_processed, error_message, created_at";

/// Creates a new batch run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_batch_run(
    pool: &PgPool,
    mode: &str,
    discipline: &str,
    trigger_source: &str,
) -> Result<BatchRunRow, DbError> {
    let row = sqlx::query_as::<_, BatchRunRow>(&format!(
        "INSERT INTO batch_runs (public_id, mode, discipline, trigger_source, status) \
         VALUES ($1, $2, $3, $4, 'queued') \
         RETURNING {RETURNING}"
    ))
    .bind(Uuid::new_v4())
    .bind(mode)
    .bind(discipline)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchRunTransition`] if the run is not `queued`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn start_batch_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE batch_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidBatchRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and records its totals.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchRunTransition`] if the run is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_batch_run(
    pool: &PgPool,
    id: i64,
    totals: BatchRunTotals,
) -> Result<(), DbError> {
    finish_batch_run(pool, id, "succeeded", totals, None).await
}

/// Marks a run as `failed`, recording whatever totals were reached.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchRunTransition`] if the run is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_batch_run(
    pool: &PgPool,
    id: i64,
    totals: BatchRunTotals,
    error_message: &str,
) -> Result<(), DbError> {
    finish_batch_run(pool, id, "failed", totals, Some(error_message)).await
}

async fn finish_batch_run(
    pool: &PgPool,
    id: i64,
    status: &str,
    totals: BatchRunTotals,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE batch_runs \
         SET status = $1, completed_at = NOW(), \
             job_count = $2, succeeded_count = $3, failed_count = $4, \
             records_processed = $5, error_message = $6 \
         WHERE id = $7 AND status = 'running'",
    )
    .bind(status)
    .bind(totals.job_count)
    .bind(totals.succeeded_count)
    .bind(totals.failed_count)
    .bind(totals.records_processed)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidBatchRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_batch_run(pool: &PgPool, id: i64) -> Result<BatchRunRow, DbError> {
    sqlx::query_as::<_, BatchRunRow>(&format!(
        "SELECT {RETURNING} FROM batch_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_batch_runs(pool: &PgPool, limit: i64) -> Result<Vec<BatchRunRow>, DbError> {
    let rows = sqlx::query_as::<_, BatchRunRow>(&format!(
        "SELECT {RETURNING} FROM batch_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
