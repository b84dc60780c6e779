//! Entity tables for collected social records and their upsert bindings.

use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres};

use socdb_core::{
    normalize_optional_text, CollectedRecords, HashtagPost, MediaKind, Platform, PlatformUser,
    RecordCounts, SocialPost,
};

use crate::upsert::{upsert, StorageWriteError, TableSpec, UpsertRecord, WritePhase};
use crate::{count_to_i32, DbError};

type Row<'q, 'args> = Separated<'q, 'args, Postgres, &'static str>;

fn text(value: Option<&String>) -> Option<&str> {
    normalize_optional_text(value.map(String::as_str))
}

fn urls_of(post: &SocialPost, kind: MediaKind) -> Vec<String> {
    post.media_of(kind).map(|m| m.url.clone()).collect()
}

impl UpsertRecord for PlatformUser {
    const TABLE: TableSpec = TableSpec {
        table: "social_users",
        diff_table: "social_users_diff",
        key_columns: &["platform", "user_id"],
        columns: &[
            "platform",
            "user_id",
            "username",
            "display_name",
            "is_verified",
            "is_private",
            "is_business",
            "description",
            "profile_image_url",
            "category",
            "external_url",
            "follower_count",
            "following_count",
            "post_count",
            "raw_data",
        ],
    };

    fn natural_key(&self) -> Vec<&str> {
        vec![self.platform.as_str(), self.user_id.as_str()]
    }

    fn bind_key<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.platform.as_str())
            .push_bind(self.user_id.as_str());
    }

    fn bind_row<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.platform.as_str())
            .push_bind(self.user_id.as_str())
            .push_bind(self.username.as_str())
            .push_bind(text(self.display_name.as_ref()))
            .push_bind(self.is_verified)
            .push_bind(self.is_private)
            .push_bind(self.is_business)
            .push_bind(text(self.description.as_ref()))
            .push_bind(text(self.profile_image_url.as_ref()))
            .push_bind(text(self.category.as_ref()))
            .push_bind(text(self.external_url.as_ref()))
            .push_bind(self.follower_count)
            .push_bind(self.following_count)
            .push_bind(self.post_count)
            .push_bind(self.raw_data.as_ref());
    }
}

/// Columns shared by `social_posts` and `social_hashtag_posts` after the key.
fn bind_post_body<'args>(post: &'args SocialPost, row: &mut Row<'_, 'args>) {
    row.push_bind(post.content_type.as_str())
        .push_bind(post.author_id.as_str())
        .push_bind(post.author_username.as_str())
        .push_bind(text(post.author_display_name.as_ref()))
        .push_bind(text(post.text.as_ref()))
        .push_bind(text(post.language.as_ref()))
        .push_bind(post.like_count)
        .push_bind(post.comment_count)
        .push_bind(post.share_count)
        .push_bind(post.view_count)
        .push_bind(post.is_pinned)
        .push_bind(&post.hashtags)
        .push_bind(&post.mentions)
        .push_bind(post.created_at)
        .push_bind(text(post.post_url.as_ref()))
        .push_bind(count_to_i32(post.media.len()))
        .push_bind(post.primary_media().map(|m| m.kind.label()))
        .push_bind(post.primary_media().map(|m| m.url.as_str()))
        .push_bind(urls_of(post, MediaKind::Image))
        .push_bind(urls_of(post, MediaKind::Video))
        .push_bind(post.raw_data.as_ref());
}

impl UpsertRecord for SocialPost {
    const TABLE: TableSpec = TableSpec {
        table: "social_posts",
        diff_table: "social_posts_diff",
        key_columns: &["platform", "post_id"],
        columns: &[
            "platform",
            "post_id",
            "content_type",
            "author_id",
            "author_username",
            "author_display_name",
            "text",
            "language",
            "like_count",
            "comment_count",
            "share_count",
            "view_count",
            "is_pinned",
            "hashtags",
            "mentions",
            "posted_at",
            "post_url",
            "media_count",
            "primary_media_type",
            "primary_media_url",
            "image_urls",
            "video_urls",
            "raw_data",
        ],
    };

    fn natural_key(&self) -> Vec<&str> {
        vec![self.platform.as_str(), self.post_id.as_str()]
    }

    fn bind_key<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.platform.as_str())
            .push_bind(self.post_id.as_str());
    }

    fn bind_row<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.platform.as_str())
            .push_bind(self.post_id.as_str());
        bind_post_body(self, row);
    }
}

/// A story routed to `social_stories`, which flattens media into single columns.
#[derive(Debug, Clone, Copy)]
pub struct Story<'a>(pub &'a SocialPost);

impl UpsertRecord for Story<'_> {
    const TABLE: TableSpec = TableSpec {
        table: "social_stories",
        diff_table: "social_stories_diff",
        key_columns: &["platform", "post_id"],
        columns: &[
            "platform",
            "post_id",
            "author_id",
            "author_username",
            "author_display_name",
            "media_type",
            "video_url",
            "image_url",
            "thumbnail_url",
            "posted_at",
            "expires_at",
            "raw_data",
        ],
    };

    fn natural_key(&self) -> Vec<&str> {
        vec![self.0.platform.as_str(), self.0.post_id.as_str()]
    }

    fn bind_key<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.0.platform.as_str())
            .push_bind(self.0.post_id.as_str());
    }

    fn bind_row<'args>(&'args self, row: &mut Row<'_, 'args>) {
        let story = self.0;
        row.push_bind(story.platform.as_str())
            .push_bind(story.post_id.as_str())
            .push_bind(story.author_id.as_str())
            .push_bind(story.author_username.as_str())
            .push_bind(text(story.author_display_name.as_ref()))
            .push_bind(story.primary_media().map(|m| m.kind.label()))
            .push_bind(story.first_url_of(MediaKind::Video))
            .push_bind(story.first_url_of(MediaKind::Image))
            .push_bind(story.first_thumbnail())
            .push_bind(story.created_at)
            .push_bind(story.expires_at)
            .push_bind(story.raw_data.as_ref());
    }
}

impl UpsertRecord for HashtagPost {
    const TABLE: TableSpec = TableSpec {
        table: "social_hashtag_posts",
        diff_table: "social_hashtag_posts_diff",
        key_columns: &["platform", "hashtag", "post_id"],
        columns: &[
            "platform",
            "hashtag",
            "post_id",
            "content_type",
            "author_id",
            "author_username",
            "author_display_name",
            "text",
            "language",
            "like_count",
            "comment_count",
            "share_count",
            "view_count",
            "is_pinned",
            "hashtags",
            "mentions",
            "posted_at",
            "post_url",
            "media_count",
            "primary_media_type",
            "primary_media_url",
            "image_urls",
            "video_urls",
            "raw_data",
        ],
    };

    fn natural_key(&self) -> Vec<&str> {
        vec![
            self.post.platform.as_str(),
            self.hashtag.as_str(),
            self.post.post_id.as_str(),
        ]
    }

    fn bind_key<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.post.platform.as_str())
            .push_bind(self.hashtag.as_str())
            .push_bind(self.post.post_id.as_str());
    }

    fn bind_row<'args>(&'args self, row: &mut Row<'_, 'args>) {
        row.push_bind(self.post.platform.as_str())
            .push_bind(self.hashtag.as_str())
            .push_bind(self.post.post_id.as_str());
        bind_post_body(&self.post, row);
    }
}

/// Merges the latest profile into `social_users` and appends it to
/// `social_user_snapshots`, so follower and post counts keep their history.
///
/// # Errors
///
/// Returns [`StorageWriteError`] if the upsert or the snapshot insert fails.
pub async fn save_user(pool: &PgPool, user: &PlatformUser) -> Result<usize, StorageWriteError> {
    let written = upsert(pool, std::slice::from_ref(user)).await?;
    append_user_snapshot(pool, user).await?;
    Ok(written)
}

async fn append_user_snapshot(pool: &PgPool, user: &PlatformUser) -> Result<(), StorageWriteError> {
    sqlx::query(
        "INSERT INTO social_user_snapshots \
             (platform, user_id, username, display_name, is_verified, \
              follower_count, following_count, post_count, raw_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(user.platform.as_str())
    .bind(user.user_id.as_str())
    .bind(user.username.as_str())
    .bind(text(user.display_name.as_ref()))
    .bind(user.is_verified)
    .bind(user.follower_count)
    .bind(user.following_count)
    .bind(user.post_count)
    .bind(user.raw_data.as_ref())
    .execute(pool)
    .await
    .map_err(|source| StorageWriteError {
        table: "social_user_snapshots",
        phase: WritePhase::Append,
        source,
    })?;
    Ok(())
}

/// # Errors
///
/// Returns [`StorageWriteError`] if the upsert fails.
pub async fn save_posts(pool: &PgPool, posts: &[SocialPost]) -> Result<usize, StorageWriteError> {
    upsert(pool, posts).await
}

/// # Errors
///
/// Returns [`StorageWriteError`] if the upsert fails.
pub async fn save_stories(
    pool: &PgPool,
    stories: &[SocialPost],
) -> Result<usize, StorageWriteError> {
    let rows: Vec<Story<'_>> = stories.iter().map(Story).collect();
    upsert(pool, &rows).await
}

/// Hashtag search can return the same post under several keyword matches;
/// the engine keeps the last occurrence of each `(platform, hashtag, post_id)`.
///
/// # Errors
///
/// Returns [`StorageWriteError`] if the upsert fails.
pub async fn save_hashtag_posts(
    pool: &PgPool,
    posts: &[HashtagPost],
) -> Result<usize, StorageWriteError> {
    upsert(pool, posts).await
}

/// Persist everything one job collected, table by table.
///
/// Each table commits independently; on error, tables written before the
/// failing one stay written.
///
/// # Errors
///
/// Returns the first [`StorageWriteError`] encountered.
pub async fn save_collected(
    pool: &PgPool,
    records: &CollectedRecords,
) -> Result<RecordCounts, StorageWriteError> {
    match records {
        CollectedRecords::Profile {
            user,
            posts,
            stories,
        } => Ok(RecordCounts {
            users: save_user(pool, user).await?,
            posts: save_posts(pool, posts).await?,
            stories: save_stories(pool, stories).await?,
            hashtag_posts: 0,
        }),
        CollectedRecords::Hashtag { posts, .. } => Ok(RecordCounts {
            hashtag_posts: save_hashtag_posts(pool, posts).await?,
            ..RecordCounts::default()
        }),
    }
}

/// Distinct usernames already collected for `platform`, used as the subject
/// list for batch re-collection. Accounts marked inactive are left out.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_platform_usernames(
    pool: &PgPool,
    platform: Platform,
) -> Result<Vec<String>, DbError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT u.username FROM social_users u \
         WHERE u.platform = $1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM account_status s \
               WHERE s.platform = u.platform \
                 AND s.username = u.username \
                 AND NOT s.is_active) \
         ORDER BY u.username",
    )
    .bind(platform.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
