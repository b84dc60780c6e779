//! End-to-end collector dispatch against a mocked scraping backend.

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use socdb_core::{
    CollectedRecords, CollectionJob, JobParams, Platform, PlatformSettings, TimeInterval,
};
use socdb_scraper::{ApifyClient, Collect, CollectorRegistry, ScraperError};

fn actor_path(actor: &str) -> String {
    format!(
        "/v2/acts/{}/run-sync-get-dataset-items",
        actor.replace('/', "~")
    )
}

fn registry(server: &MockServer) -> CollectorRegistry {
    let client = ApifyClient::new(&server.uri(), "tok", 5, 0, 0).expect("client");
    CollectorRegistry::new(client)
}

fn params() -> JobParams {
    JobParams::from_settings(&PlatformSettings {
        enabled: true,
        post_limit: 5,
        ..PlatformSettings::default()
    })
}

async fn mount(server: &MockServer, actor: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(actor_path(actor)))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn instagram_user_job_collects_profile_posts_and_stories() {
    let server = MockServer::start().await;
    mount(
        &server,
        "apify/instagram-profile-scraper",
        201,
        json!([{"id": "528817151", "username": "nasa", "followersCount": 10}]),
    )
    .await;
    mount(
        &server,
        "apify/instagram-post-scraper",
        201,
        json!([
            {"shortCode": "A1", "ownerUsername": "nasa", "displayUrl": "https://cdn/a.jpg"},
            {"shortCode": "A2", "ownerUsername": "nasa"},
            {"caption": "no id, dropped"},
        ]),
    )
    .await;
    mount(
        &server,
        "igview-owner/instagram-story-viewer",
        201,
        json!([{"requested": "nasa", "stories": [
            {"pk": "S1", "taken_at": 1_709_296_200},
            {"pk": "S2", "taken_at": 1_709_296_300},
        ]}]),
    )
    .await;

    let mut job_params = params();
    job_params.story_limit = Some(1);
    let job = CollectionJob::user(Platform::Instagram, "nasa", job_params);
    let records = registry(&server).collect(&job).await.expect("collect");

    let counts = records.counts();
    assert_eq!(counts.users, 1);
    assert_eq!(counts.posts, 2);
    assert_eq!(counts.stories, 1, "story limit truncates");
}

#[tokio::test]
async fn call_timeout_applies_to_each_backend_call_not_the_whole_job() {
    let server = MockServer::start().await;
    let slow = |body: serde_json::Value| {
        ResponseTemplate::new(201)
            .set_body_json(body)
            .set_delay(std::time::Duration::from_millis(700))
    };
    for (actor, body) in [
        (
            "apify/instagram-profile-scraper",
            json!([{"id": "1", "username": "nasa"}]),
        ),
        (
            "apify/instagram-post-scraper",
            json!([{"shortCode": "A1", "ownerUsername": "nasa"}]),
        ),
        (
            "igview-owner/instagram-story-viewer",
            json!([{"requested": "nasa", "stories": [{"pk": "S1"}]}]),
        ),
    ] {
        Mock::given(method("POST"))
            .and(path(actor_path(actor)))
            .respond_with(slow(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    // Three calls of 0.7s each add up to more than the 1s limit.
    let client = ApifyClient::new(&server.uri(), "tok", 1, 0, 0).expect("client");
    let job = CollectionJob::user(Platform::Instagram, "nasa", params());
    let records = CollectorRegistry::new(client)
        .collect(&job)
        .await
        .expect("every call finished inside its own timeout");

    let counts = records.counts();
    assert_eq!(counts.users, 1);
    assert_eq!(counts.posts, 1);
    assert_eq!(counts.stories, 1);
}

#[tokio::test]
async fn instagram_story_failure_does_not_fail_the_job() {
    let server = MockServer::start().await;
    mount(
        &server,
        "apify/instagram-profile-scraper",
        201,
        json!([{"id": "1", "username": "nasa"}]),
    )
    .await;
    mount(&server, "apify/instagram-post-scraper", 201, json!([])).await;
    mount(
        &server,
        "igview-owner/instagram-story-viewer",
        400,
        json!({"error": "bad input"}),
    )
    .await;

    let job = CollectionJob::user(Platform::Instagram, "nasa", params());
    let records = registry(&server).collect(&job).await.expect("collect");
    assert_eq!(records.counts().stories, 0);
}

#[tokio::test]
async fn zero_story_limit_skips_the_story_actor() {
    let server = MockServer::start().await;
    mount(
        &server,
        "apify/instagram-profile-scraper",
        201,
        json!([{"id": "1", "username": "nasa"}]),
    )
    .await;
    mount(&server, "apify/instagram-post-scraper", 201, json!([])).await;
    Mock::given(method("POST"))
        .and(path(actor_path("igview-owner/instagram-story-viewer")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let mut job_params = params();
    job_params.story_limit = Some(0);
    let job = CollectionJob::user(Platform::Instagram, "nasa", job_params);
    registry(&server).collect(&job).await.expect("collect");
}

#[tokio::test]
async fn empty_profile_response_is_profile_not_found() {
    let server = MockServer::start().await;
    mount(&server, "apify/instagram-profile-scraper", 201, json!([])).await;

    let job = CollectionJob::user(Platform::Instagram, "ghost", params());
    let err = registry(&server).collect(&job).await.unwrap_err();
    assert!(
        matches!(err, ScraperError::ProfileNotFound { platform: Platform::Instagram, ref username } if username == "ghost"),
        "got {err:?}"
    );
}

#[tokio::test]
async fn instagram_hashtag_job_filters_to_interval() {
    let server = MockServer::start().await;
    mount(
        &server,
        "apify/instagram-hashtag-scraper",
        201,
        json!([
            {"shortCode": "in", "timestamp": "2024-02-10T00:00:00Z"},
            {"shortCode": "out", "timestamp": "2024-04-10T00:00:00Z"},
            {"shortCode": "untimed"},
        ]),
    )
    .await;

    let interval = TimeInterval {
        start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
    };
    let job = CollectionJob::hashtag(Platform::Instagram, "#space", Some(interval), params());
    let records = registry(&server).collect(&job).await.expect("collect");

    let CollectedRecords::Hashtag { hashtag, posts } = records else {
        panic!("expected hashtag records");
    };
    assert_eq!(hashtag, "space");
    let ids: Vec<&str> = posts.iter().map(|hp| hp.post.post_id.as_str()).collect();
    assert_eq!(ids, vec!["in"]);
}

#[tokio::test]
async fn twitter_hashtag_job_sends_interval_as_search_operators() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(actor_path("xtdata/twitter-x-scraper")))
        .and(body_partial_json(json!({
            "searchTerms": ["#moon since:2024-01-01 until:2024-03-01"],
            "sort": "Latest",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {"id": "1", "text": "#moon", "createdAt": "2023-12-31T23:00:00Z"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let interval = TimeInterval {
        start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
    };
    let job = CollectionJob::hashtag(Platform::Twitter, "moon", Some(interval), params());
    let records = registry(&server).collect(&job).await.expect("collect");

    // The backend owns the window for Twitter; nothing is filtered locally.
    assert_eq!(records.counts().hashtag_posts, 1);
}

#[tokio::test]
async fn hashtag_jobs_on_facebook_and_threads_are_unsupported() {
    let server = MockServer::start().await;
    for platform in [Platform::Facebook, Platform::Threads] {
        let job = CollectionJob::hashtag(platform, "moon", None, params());
        let err = registry(&server).collect(&job).await.unwrap_err();
        assert!(
            matches!(err, ScraperError::UnsupportedJob { platform: p, .. } if p == platform),
            "got {err:?}"
        );
    }
}

#[tokio::test]
async fn threads_user_job_uses_two_actor_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(actor_path("apify/threads-scraper")))
        .and(body_partial_json(json!({"maxPostsPerProfile": 0})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([{"userId": "77", "username": "nasa"}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(actor_path("apify/threads-scraper")))
        .and(body_partial_json(json!({"maxPostsPerProfile": 5})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            {"threadId": "T1", "userId": "77", "text": "hi"},
            {"threadId": "T2", "userId": "77", "text": "again"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let job = CollectionJob::user(Platform::Threads, "nasa", params());
    let records = registry(&server).collect(&job).await.expect("collect");
    assert_eq!(records.counts().posts, 2);
}
