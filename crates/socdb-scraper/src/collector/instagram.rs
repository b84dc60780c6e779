use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use socdb_core::{
    CollectedRecords, CollectionJob, JobTarget, MediaItem, MediaKind, Platform, PlatformUser,
    SocialPost,
};

use super::hashtag_records;
use crate::apify::ApifyClient;
use crate::error::ScraperError;
use crate::payload::{array, count, extract_tags, flag, string, string_list, timestamp};

const PROFILE_ACTOR: &str = "apify/instagram-profile-scraper";
const POST_ACTOR: &str = "apify/instagram-post-scraper";
const STORY_ACTOR: &str = "igview-owner/instagram-story-viewer";
const HASHTAG_ACTOR: &str = "apify/instagram-hashtag-scraper";

/// Daily runs only need the last week of posts.
const RECENT_WINDOW: &str = "7 day";

pub(super) async fn collect(
    client: &ApifyClient,
    job: &CollectionJob,
) -> Result<CollectedRecords, ScraperError> {
    match &job.target {
        JobTarget::User { username } => {
            let user = fetch_profile(client, username).await?;
            let posts = fetch_posts(client, username, job.params.post_limit).await?;
            let stories = if job.params.include_stories() {
                fetch_stories(client, username, job.params.story_limit).await
            } else {
                Vec::new()
            };
            Ok(CollectedRecords::Profile {
                user,
                posts,
                stories,
            })
        }
        JobTarget::Hashtag { hashtag, .. } => {
            let input = json!({
                "hashtags": [hashtag],
                "resultsType": "posts",
                "resultsLimit": job.params.results_limit,
            });
            let items = client.run_actor(HASHTAG_ACTOR, &input).await?;
            let posts = items.iter().filter_map(|raw| parse_post(raw, "")).collect();
            Ok(hashtag_records(hashtag, posts))
        }
    }
}

async fn fetch_profile(client: &ApifyClient, username: &str) -> Result<PlatformUser, ScraperError> {
    let input = json!({
        "usernames": [format!("https://www.instagram.com/{username}/")],
        "resultsLimit": 1,
    });
    let items = client.run_actor(PROFILE_ACTOR, &input).await?;
    items
        .first()
        .and_then(|raw| parse_user(raw, username))
        .ok_or_else(|| ScraperError::ProfileNotFound {
            platform: Platform::Instagram,
            username: username.to_string(),
        })
}

async fn fetch_posts(
    client: &ApifyClient,
    username: &str,
    limit: u32,
) -> Result<Vec<SocialPost>, ScraperError> {
    let input = json!({
        "username": [username],
        "resultsLimit": limit,
        "addParentData": true,
        "skipPinnedPosts": true,
        "onlyPostsNewerThan": RECENT_WINDOW,
    });
    let items = client.run_actor(POST_ACTOR, &input).await?;
    Ok(items
        .iter()
        .filter_map(|raw| parse_post(raw, username))
        .collect())
}

#[derive(Debug, Deserialize)]
struct StoryViewerItem {
    #[serde(default)]
    stories: Vec<Value>,
}

/// Stories are optional extras: a failing story actor is logged and the
/// profile and posts still go through.
async fn fetch_stories(client: &ApifyClient, username: &str, limit: Option<u32>) -> Vec<SocialPost> {
    let input = json!({ "username": username });
    let items = match client.run_actor(STORY_ACTOR, &input).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(username, error = %e, "instagram story fetch failed");
            return Vec::new();
        }
    };

    let limit = limit.map_or(usize::MAX, |n| n as usize);
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<StoryViewerItem>(item).ok())
        .flat_map(|item| item.stories)
        .filter_map(|raw| parse_story(&raw, username))
        .take(limit)
        .collect()
}

pub(crate) fn parse_user(raw: &Value, username: &str) -> Option<PlatformUser> {
    let user_id = string(raw, &["id", "pk"])?;
    Some(PlatformUser {
        platform: Platform::Instagram,
        user_id,
        username: string(raw, &["username"]).unwrap_or_else(|| username.to_string()),
        display_name: string(raw, &["fullName"]),
        is_verified: flag(raw, &["verified", "isVerified"]),
        is_private: flag(raw, &["private", "isPrivate"]),
        is_business: flag(raw, &["isBusinessAccount"]),
        description: string(raw, &["biography"]),
        profile_image_url: string(raw, &["profilePicUrlHD", "profilePicUrl"]),
        category: string(raw, &["businessCategoryName"]),
        external_url: string(raw, &["externalUrl"]),
        follower_count: count(raw, &["followersCount"]),
        following_count: count(raw, &["followsCount"]),
        post_count: count(raw, &["postsCount"]),
        raw_data: Some(raw.clone()),
    })
}

fn content_type(raw: &Value) -> &'static str {
    let product = string(raw, &["productType"])
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(product.as_str(), "clips" | "reel" | "reels") {
        return "reel";
    }
    match string(raw, &["type"]).as_deref() {
        Some("Sidecar") => "carousel",
        Some("Video") => "video",
        _ => "post",
    }
}

fn parse_media(raw: &Value) -> Vec<MediaItem> {
    let children = array(raw, &["childPosts", "sidecarChildren"]);
    if !children.is_empty() {
        return children.iter().filter_map(single_media).collect();
    }
    single_media(raw).into_iter().collect()
}

fn single_media(raw: &Value) -> Option<MediaItem> {
    let display = string(raw, &["displayUrl", "imageUrl"]);
    if let Some(video) = string(raw, &["videoUrl"]) {
        return Some(MediaItem {
            kind: MediaKind::Video,
            url: video,
            thumbnail_url: display,
        });
    }
    display.map(|url| MediaItem {
        kind: MediaKind::Image,
        url,
        thumbnail_url: None,
    })
}

pub(crate) fn parse_post(raw: &Value, username: &str) -> Option<SocialPost> {
    let post_id = string(raw, &["shortCode", "code"])?;
    let text = string(raw, &["caption", "captionsText"]);
    let mut hashtags = string_list(raw, &["hashtags"]);
    if hashtags.is_empty() {
        hashtags = text.as_deref().map(|t| extract_tags(t, '#')).unwrap_or_default();
    }

    Some(SocialPost {
        author_id: string(raw, &["ownerId", "owner.id"]).unwrap_or_default(),
        author_username: string(raw, &["ownerUsername", "owner.username"])
            .unwrap_or_else(|| username.to_string()),
        author_display_name: string(raw, &["ownerFullName", "owner.full_name"]),
        media: parse_media(raw),
        like_count: count(raw, &["likesCount"]),
        comment_count: count(raw, &["commentsCount"]),
        view_count: count(raw, &["videoViewCount", "videoPlayCount", "playCount"]),
        is_pinned: flag(raw, &["isPinned"]),
        hashtags,
        mentions: string_list(raw, &["mentions"]),
        created_at: timestamp(raw, &["timestamp"]),
        post_url: string(raw, &["url"])
            .or_else(|| Some(format!("https://www.instagram.com/p/{post_id}/"))),
        raw_data: Some(raw.clone()),
        text,
        ..SocialPost::new(Platform::Instagram, post_id.clone(), content_type(raw))
    })
}

pub(crate) fn parse_story(raw: &Value, username: &str) -> Option<SocialPost> {
    let story_id = string(raw, &["pk", "id"])?;
    let taken_at = timestamp(raw, &["taken_at"]);
    let expires_at =
        timestamp(raw, &["expiring_at"]).or_else(|| taken_at.map(|t| t + Duration::days(1)));

    let image = array(raw, &["image_versions2.candidates"])
        .first()
        .and_then(|c| string(c, &["url"]));
    let media = match array(raw, &["video_versions"])
        .first()
        .and_then(|v| string(v, &["url"]))
    {
        Some(video) => vec![MediaItem {
            kind: MediaKind::Video,
            url: video,
            thumbnail_url: image,
        }],
        None => image
            .map(|url| MediaItem {
                kind: MediaKind::Image,
                url,
                thumbnail_url: None,
            })
            .into_iter()
            .collect(),
    };

    Some(SocialPost {
        author_id: string(raw, &["user.pk", "user.id"]).unwrap_or_default(),
        author_username: string(raw, &["user.username"]).unwrap_or_else(|| username.to_string()),
        author_display_name: string(raw, &["user.full_name"]),
        media,
        created_at: taken_at,
        expires_at,
        raw_data: Some(raw.clone()),
        ..SocialPost::new(Platform::Instagram, story_id, "story")
    })
}
