//! Per-account state kept beside the entity tables: the active flag that
//! gates stored-account re-collection and the profile snapshot history.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use socdb_core::Platform;

use crate::DbError;

/// Mark `username` active or inactive on `platform`. Inactive accounts are
/// skipped by [`crate::list_platform_usernames`]; their stored rows stay.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the write fails.
pub async fn set_account_active(
    pool: &PgPool,
    platform: Platform,
    username: &str,
    active: bool,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO account_status (platform, username, is_active) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (platform, username) \
         DO UPDATE SET is_active = EXCLUDED.is_active, updated_at = NOW()",
    )
    .bind(platform.as_str())
    .bind(username)
    .bind(active)
    .execute(pool)
    .await?;
    Ok(())
}

/// Whether `username` is collected in stored-account runs. Accounts never
/// marked either way are active.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn is_account_active(
    pool: &PgPool,
    platform: Platform,
    username: &str,
) -> Result<bool, DbError> {
    let active = sqlx::query_scalar::<_, bool>(
        "SELECT is_active FROM account_status WHERE platform = $1 AND username = $2",
    )
    .bind(platform.as_str())
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(active.unwrap_or(true))
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSnapshotRow {
    pub id: i64,
    pub platform: String,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub is_verified: bool,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub collected_at: DateTime<Utc>,
}

/// Most recent snapshots for one user, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_user_snapshots(
    pool: &PgPool,
    platform: Platform,
    user_id: &str,
    limit: i64,
) -> Result<Vec<UserSnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, UserSnapshotRow>(
        "SELECT id, platform, user_id, username, display_name, is_verified, \
                follower_count, following_count, post_count, collected_at \
         FROM social_user_snapshots \
         WHERE platform = $1 AND user_id = $2 \
         ORDER BY collected_at DESC, id DESC \
         LIMIT $3",
    )
    .bind(platform.as_str())
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
