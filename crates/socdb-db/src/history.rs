//! Append-only `collection_history` ledger: one row per executed job.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use socdb_core::JobOutcome;

use crate::{count_to_i32, DbError};

/// A ledger entry, built from a finished job.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub batch_run_id: Option<i64>,
    pub platform: String,
    pub subject: String,
    pub job_kind: String,
    pub success: bool,
    pub user_count: i32,
    pub post_count: i32,
    pub story_count: i32,
    pub hashtag_post_count: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl HistoryEntry {
    #[must_use]
    pub fn from_outcome(outcome: &JobOutcome, batch_run_id: Option<i64>) -> Self {
        Self {
            batch_run_id,
            platform: outcome.job.platform.to_string(),
            subject: outcome.job.ledger_subject(),
            job_kind: outcome.job.kind().to_string(),
            success: outcome.success,
            user_count: count_to_i32(outcome.counts.users),
            post_count: count_to_i32(outcome.counts.posts),
            story_count: count_to_i32(outcome.counts.stories),
            hashtag_post_count: count_to_i32(outcome.counts.hashtag_posts),
            error_message: outcome.error.clone(),
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            duration_seconds: outcome.duration_seconds,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    pub id: i64,
    pub batch_run_id: Option<i64>,
    pub platform: String,
    pub subject: String,
    pub job_kind: String,
    pub success: bool,
    pub user_count: i32,
    pub post_count: i32,
    pub story_count: i32,
    pub hashtag_post_count: i32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Append one entry. Returns the new row id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_history(pool: &PgPool, entry: &HistoryEntry) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO collection_history \
             (batch_run_id, platform, subject, job_kind, success, \
              user_count, post_count, story_count, hashtag_post_count, \
              error_message, started_at, finished_at, duration_seconds) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         RETURNING id",
    )
    .bind(entry.batch_run_id)
    .bind(&entry.platform)
    .bind(&entry.subject)
    .bind(&entry.job_kind)
    .bind(entry.success)
    .bind(entry.user_count)
    .bind(entry.post_count)
    .bind(entry.story_count)
    .bind(entry.hashtag_post_count)
    .bind(&entry.error_message)
    .bind(entry.started_at)
    .bind(entry.finished_at)
    .bind(entry.duration_seconds)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Append the ledger entry for `outcome`, logging instead of returning on failure.
///
/// Ledger completeness is best-effort relative to the job itself.
pub async fn record_history_best_effort(
    pool: &PgPool,
    outcome: &JobOutcome,
    batch_run_id: Option<i64>,
) {
    let entry = HistoryEntry::from_outcome(outcome, batch_run_id);
    if let Err(e) = record_history(pool, &entry).await {
        tracing::error!(
            platform = %entry.platform,
            subject = %entry.subject,
            error = %e,
            "failed to append collection history"
        );
    }
}

/// Returns the most recent `limit` entries, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_history(pool: &PgPool, limit: i64) -> Result<Vec<HistoryRow>, DbError> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, batch_run_id, platform, subject, job_kind, success, \
                user_count, post_count, story_count, hashtag_post_count, \
                error_message, started_at, finished_at, duration_seconds, recorded_at \
         FROM collection_history \
         ORDER BY recorded_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
