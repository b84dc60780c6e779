//! Live integration tests for socdb-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/socdb-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{TimeZone, Utc};
use socdb_core::{
    CollectedRecords, CollectionJob, HashtagPost, JobOutcome, JobParams, MediaItem, MediaKind,
    Platform, PlatformSettings, PlatformUser, RecordCounts, SocialPost,
};
use socdb_db::{
    complete_batch_run, create_batch_run, fail_batch_run, get_batch_run, is_account_active,
    list_history, list_platform_usernames, list_user_snapshots, record_history_best_effort,
    save_collected, save_hashtag_posts, save_posts, save_stories, save_user, set_account_active,
    start_batch_run, BatchRunTotals, DbError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn post(platform: Platform, post_id: &str, text: &str, likes: i64) -> SocialPost {
    SocialPost {
        platform,
        post_id: post_id.to_string(),
        content_type: "post".to_string(),
        author_id: "1001".to_string(),
        author_username: "nasa".to_string(),
        author_display_name: Some("NASA".to_string()),
        text: Some(text.to_string()),
        language: Some("en".to_string()),
        media: vec![MediaItem {
            kind: MediaKind::Image,
            url: format!("https://cdn.example/{post_id}.jpg"),
            thumbnail_url: None,
        }],
        like_count: likes,
        comment_count: 0,
        share_count: 0,
        view_count: 0,
        is_pinned: false,
        hashtags: vec!["space".to_string()],
        mentions: Vec::new(),
        created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        expires_at: None,
        post_url: Some("None".to_string()),
        raw_data: Some(serde_json::json!({ "id": post_id })),
    }
}

fn user(platform: Platform, user_id: &str, username: &str, followers: i64) -> PlatformUser {
    PlatformUser {
        platform,
        user_id: user_id.to_string(),
        username: username.to_string(),
        display_name: Some(username.to_uppercase()),
        is_verified: true,
        is_private: false,
        is_business: false,
        description: None,
        profile_image_url: None,
        category: Some("null".to_string()),
        external_url: None,
        follower_count: followers,
        following_count: 10,
        post_count: 100,
        raw_data: None,
    }
}

async fn count(pool: &sqlx::PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("count({table}) failed: {e}"))
}

fn params() -> JobParams {
    JobParams::from_settings(&PlatformSettings::default())
}

// ---------------------------------------------------------------------------
// Section 1: Upsert semantics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_is_idempotent(pool: sqlx::PgPool) {
    let posts = vec![
        post(Platform::Instagram, "a", "first", 1),
        post(Platform::Instagram, "b", "second", 2),
    ];

    save_posts(&pool, &posts).await.expect("first upsert");
    save_posts(&pool, &posts).await.expect("second upsert");

    assert_eq!(count(&pool, "social_posts").await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_replaces_matching_keys_and_keeps_others(pool: sqlx::PgPool) {
    save_posts(&pool, &[post(Platform::Twitter, "a", "v1", 1)])
        .await
        .expect("seed upsert");
    save_posts(&pool, &[post(Platform::Twitter, "c", "untouched", 0)])
        .await
        .expect("unrelated upsert");

    save_posts(
        &pool,
        &[
            post(Platform::Twitter, "a", "v2", 5),
            post(Platform::Twitter, "b", "v1", 1),
        ],
    )
    .await
    .expect("merge upsert");

    assert_eq!(count(&pool, "social_posts").await, 3);
    let a: (String, i64) =
        sqlx::query_as("SELECT text, like_count FROM social_posts WHERE post_id = 'a'")
            .fetch_one(&pool)
            .await
            .expect("fetch a");
    assert_eq!(a, ("v2".to_string(), 5));
    let c: String = sqlx::query_scalar("SELECT text FROM social_posts WHERE post_id = 'c'")
        .fetch_one(&pool)
        .await
        .expect("fetch c");
    assert_eq!(c, "untouched");
}

#[sqlx::test(migrations = "../../migrations")]
async fn same_post_id_on_different_platforms_are_distinct(pool: sqlx::PgPool) {
    save_posts(
        &pool,
        &[
            post(Platform::Threads, "x", "threads", 0),
            post(Platform::Facebook, "x", "facebook", 0),
        ],
    )
    .await
    .expect("upsert");

    assert_eq!(count(&pool, "social_posts").await, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_keys_in_one_batch_keep_the_last(pool: sqlx::PgPool) {
    let posts = vec![
        HashtagPost::new("space", post(Platform::Instagram, "k", "val1", 1)),
        HashtagPost::new("#space", post(Platform::Instagram, "k", "val2", 2)),
    ];

    let written = save_hashtag_posts(&pool, &posts).await.expect("upsert");
    assert_eq!(written, 1);

    let (text, likes): (String, i64) = sqlx::query_as(
        "SELECT text, like_count FROM social_hashtag_posts \
         WHERE platform = 'instagram' AND hashtag = 'space' AND post_id = 'k'",
    )
    .fetch_one(&pool)
    .await
    .expect("fetch");
    assert_eq!(text, "val2");
    assert_eq!(likes, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn placeholder_text_is_stored_as_null(pool: sqlx::PgPool) {
    save_posts(&pool, &[post(Platform::Instagram, "n", "x", 0)])
        .await
        .expect("upsert");
    save_user(&pool, &user(Platform::Instagram, "1", "nasa", 5))
        .await
        .expect("user upsert");

    let url: Option<String> = sqlx::query_scalar("SELECT post_url FROM social_posts")
        .fetch_one(&pool)
        .await
        .expect("fetch post_url");
    assert!(url.is_none());
    let category: Option<String> = sqlx::query_scalar("SELECT category FROM social_users")
        .fetch_one(&pool)
        .await
        .expect("fetch category");
    assert!(category.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn media_columns_are_derived_from_items(pool: sqlx::PgPool) {
    save_posts(&pool, &[post(Platform::Instagram, "m", "x", 0)])
        .await
        .expect("upsert");

    let (kind, count, images): (Option<String>, i32, Vec<String>) = sqlx::query_as(
        "SELECT primary_media_type, media_count, image_urls FROM social_posts",
    )
    .fetch_one(&pool)
    .await
    .expect("fetch");
    assert_eq!(kind.as_deref(), Some("IMAGE"));
    assert_eq!(count, 1);
    assert_eq!(images, vec!["https://cdn.example/m.jpg".to_string()]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn stories_flatten_media_into_single_columns(pool: sqlx::PgPool) {
    let mut story = post(Platform::Instagram, "s", "story", 0);
    story.media.push(MediaItem {
        kind: MediaKind::Video,
        url: "https://cdn.example/s.mp4".to_string(),
        thumbnail_url: Some("https://cdn.example/s-thumb.jpg".to_string()),
    });

    save_stories(&pool, &[story.clone()]).await.expect("upsert");
    save_stories(&pool, &[story]).await.expect("re-upsert");

    assert_eq!(count(&pool, "social_stories").await, 1);
    let (video, thumb): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT video_url, thumbnail_url FROM social_stories")
            .fetch_one(&pool)
            .await
            .expect("fetch");
    assert_eq!(video.as_deref(), Some("https://cdn.example/s.mp4"));
    assert_eq!(thumb.as_deref(), Some("https://cdn.example/s-thumb.jpg"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_batch_is_a_no_op(pool: sqlx::PgPool) {
    let written = save_posts(&pool, &[]).await.expect("upsert");
    assert_eq!(written, 0);
    assert_eq!(count(&pool, "social_posts").await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_upserts_into_one_table_both_land(pool: sqlx::PgPool) {
    let left = vec![post(Platform::Twitter, "l1", "l", 0), post(Platform::Twitter, "l2", "l", 0)];
    let right = vec![post(Platform::Twitter, "r1", "r", 0)];

    let (a, b) = tokio::join!(save_posts(&pool, &left), save_posts(&pool, &right));
    a.expect("left upsert");
    b.expect("right upsert");

    assert_eq!(count(&pool, "social_posts").await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn save_collected_profile_reports_counts(pool: sqlx::PgPool) {
    let records = CollectedRecords::Profile {
        user: user(Platform::Instagram, "1001", "nasa", 10),
        posts: vec![
            post(Platform::Instagram, "p1", "x", 0),
            post(Platform::Instagram, "p2", "x", 0),
        ],
        stories: vec![post(Platform::Instagram, "s1", "x", 0)],
    };

    let counts = save_collected(&pool, &records).await.expect("save");
    assert_eq!(
        counts,
        RecordCounts {
            users: 1,
            posts: 2,
            stories: 1,
            hashtag_posts: 0
        }
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn user_upsert_refreshes_profile_and_lists_usernames(pool: sqlx::PgPool) {
    save_user(&pool, &user(Platform::Twitter, "1", "nasa", 5))
        .await
        .expect("first");
    save_user(&pool, &user(Platform::Twitter, "1", "nasa", 6))
        .await
        .expect("second");
    save_user(&pool, &user(Platform::Twitter, "2", "esa", 1))
        .await
        .expect("third");
    save_user(&pool, &user(Platform::Instagram, "3", "jaxa", 1))
        .await
        .expect("fourth");

    assert_eq!(count(&pool, "social_users").await, 3);
    let followers: i64 =
        sqlx::query_scalar("SELECT follower_count FROM social_users WHERE user_id = '1'")
            .fetch_one(&pool)
            .await
            .expect("fetch");
    assert_eq!(followers, 6);

    let names = list_platform_usernames(&pool, Platform::Twitter)
        .await
        .expect("list");
    assert_eq!(names, vec!["esa".to_string(), "nasa".to_string()]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn each_user_save_appends_a_snapshot(pool: sqlx::PgPool) {
    save_user(&pool, &user(Platform::Twitter, "1", "nasa", 5))
        .await
        .expect("first");
    save_user(&pool, &user(Platform::Twitter, "1", "nasa", 9))
        .await
        .expect("second");

    assert_eq!(count(&pool, "social_users").await, 1);
    assert_eq!(count(&pool, "social_user_snapshots").await, 2);

    let snapshots = list_user_snapshots(&pool, Platform::Twitter, "1", 10)
        .await
        .expect("snapshots");
    let followers: Vec<i64> = snapshots.iter().map(|s| s.follower_count).collect();
    assert_eq!(followers, vec![9, 5]);
    assert!(list_user_snapshots(&pool, Platform::Instagram, "1", 10)
        .await
        .expect("other platform")
        .is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn inactive_accounts_are_left_out_of_stored_usernames(pool: sqlx::PgPool) {
    save_user(&pool, &user(Platform::Twitter, "1", "nasa", 5))
        .await
        .expect("nasa");
    save_user(&pool, &user(Platform::Twitter, "2", "esa", 1))
        .await
        .expect("esa");
    save_user(&pool, &user(Platform::Instagram, "3", "esa", 1))
        .await
        .expect("instagram esa");
    assert!(is_account_active(&pool, Platform::Twitter, "esa")
        .await
        .expect("default"));

    set_account_active(&pool, Platform::Twitter, "esa", false)
        .await
        .expect("deactivate");
    assert!(!is_account_active(&pool, Platform::Twitter, "esa")
        .await
        .expect("status"));
    assert_eq!(
        list_platform_usernames(&pool, Platform::Twitter)
            .await
            .expect("list"),
        vec!["nasa".to_string()]
    );
    assert_eq!(
        list_platform_usernames(&pool, Platform::Instagram)
            .await
            .expect("other platform"),
        vec!["esa".to_string()]
    );

    // Re-collecting an inactive account keeps it inactive.
    save_user(&pool, &user(Platform::Twitter, "2", "esa", 2))
        .await
        .expect("recollect");
    assert!(!is_account_active(&pool, Platform::Twitter, "esa")
        .await
        .expect("still inactive"));

    set_account_active(&pool, Platform::Twitter, "esa", true)
        .await
        .expect("reactivate");
    assert_eq!(
        list_platform_usernames(&pool, Platform::Twitter)
            .await
            .expect("list again"),
        vec!["esa".to_string(), "nasa".to_string()]
    );
}

// ---------------------------------------------------------------------------
// Section 2: Ledger and batch runs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn ledger_appends_one_row_per_outcome(pool: sqlx::PgPool) {
    let run = create_batch_run(&pool, "daily", "sequential", "cli")
        .await
        .expect("create run");

    let ok = JobOutcome::succeeded(
        CollectionJob::user(Platform::Instagram, "nasa", params()),
        RecordCounts {
            users: 1,
            posts: 4,
            ..RecordCounts::default()
        },
        Utc::now(),
    );
    let failed = JobOutcome::failed(
        CollectionJob::user(Platform::Instagram, "ghost", params()),
        "profile not found",
        Utc::now(),
    );

    record_history_best_effort(&pool, &ok, Some(run.id)).await;
    record_history_best_effort(&pool, &failed, Some(run.id)).await;
    record_history_best_effort(&pool, &ok, None).await;

    let rows = list_history(&pool, 10).await.expect("list");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r.success).count(), 2);
    let ghost = rows
        .iter()
        .find(|r| r.subject == "ghost")
        .expect("ghost row");
    assert_eq!(ghost.error_message.as_deref(), Some("profile not found"));
    assert_eq!(ghost.batch_run_id, Some(run.id));
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_batch_run(&pool, "batch", "bounded", "cli")
        .await
        .expect("create");
    assert_eq!(run.status, "queued");

    start_batch_run(&pool, run.id).await.expect("start");
    complete_batch_run(
        &pool,
        run.id,
        BatchRunTotals {
            job_count: 3,
            succeeded_count: 2,
            failed_count: 1,
            records_processed: 40,
        },
    )
    .await
    .expect("complete");

    let row = get_batch_run(&pool, run.id).await.expect("get");
    assert_eq!(row.status, "succeeded");
    assert_eq!(row.failed_count, 1);
    assert_eq!(row.records_processed, 40);
    assert!(row.started_at.is_some());
    assert!(row.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_run_cannot_complete_before_start(pool: sqlx::PgPool) {
    let run = create_batch_run(&pool, "all", "parallel", "cli")
        .await
        .expect("create");

    let err = fail_batch_run(&pool, run.id, BatchRunTotals::default(), "boom")
        .await
        .expect_err("transition should be rejected");
    assert!(
        matches!(
            err,
            DbError::InvalidBatchRunTransition {
                expected_status: "running",
                ..
            }
        ),
        "expected InvalidBatchRunTransition, got {err:?}"
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_missing_batch_run_is_not_found(pool: sqlx::PgPool) {
    let err = get_batch_run(&pool, 999_999).await.expect_err("missing");
    assert!(matches!(err, DbError::NotFound));
}
