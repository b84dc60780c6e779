use serde_json::{json, Value};

use socdb_core::{
    CollectedRecords, CollectionJob, JobTarget, MediaKind, Platform, PlatformUser, SocialPost,
};

use super::{media_list, unsupported_hashtag};
use crate::apify::ApifyClient;
use crate::error::ScraperError;
use crate::payload::{count, extract_tags, flag, string, timestamp};

const ACTOR: &str = "apify/threads-scraper";

pub(super) async fn collect(
    client: &ApifyClient,
    job: &CollectionJob,
) -> Result<CollectedRecords, ScraperError> {
    let JobTarget::User { username } = &job.target else {
        return Err(unsupported_hashtag(Platform::Threads));
    };
    let profile_url = format!("https://www.threads.net/@{username}");

    // A zero post budget makes the actor return only the profile.
    let items = client
        .run_actor(
            ACTOR,
            &json!({ "directUrls": [profile_url], "maxPostsPerProfile": 0 }),
        )
        .await?;
    let user = items
        .iter()
        .find_map(|raw| parse_user(raw, username))
        .ok_or_else(|| ScraperError::ProfileNotFound {
            platform: Platform::Threads,
            username: username.clone(),
        })?;

    let input = json!({
        "directUrls": [profile_url],
        "maxPostsPerProfile": job.params.post_limit,
    });
    let posts = client
        .run_actor(ACTOR, &input)
        .await?
        .iter()
        .filter_map(|raw| parse_post(raw, username))
        .collect();

    Ok(CollectedRecords::Profile {
        user,
        posts,
        stories: Vec::new(),
    })
}

pub(crate) fn parse_user(raw: &Value, username: &str) -> Option<PlatformUser> {
    Some(PlatformUser {
        platform: Platform::Threads,
        user_id: string(raw, &["userId", "id"])?,
        username: string(raw, &["username"]).unwrap_or_else(|| username.to_string()),
        display_name: string(raw, &["fullName"]),
        is_verified: flag(raw, &["isVerified"]),
        is_private: flag(raw, &["isPrivate"]),
        is_business: false,
        description: string(raw, &["bio"]),
        profile_image_url: string(raw, &["profilePictureUrl"]),
        category: None,
        external_url: string(raw, &["externalUrl"]),
        follower_count: count(raw, &["followersCount"]),
        following_count: 0,
        post_count: count(raw, &["threadsCount"]),
        raw_data: Some(raw.clone()),
    })
}

pub(crate) fn parse_post(raw: &Value, username: &str) -> Option<SocialPost> {
    let post_id = string(raw, &["threadId"])?;
    let text = string(raw, &["text"]);
    let (hashtags, mentions) = text.as_deref().map_or_else(Default::default, |t| {
        (extract_tags(t, '#'), extract_tags(t, '@'))
    });
    let mut media = media_list(raw, &["images"], MediaKind::Image);
    media.extend(media_list(raw, &["videos"], MediaKind::Video));

    Some(SocialPost {
        author_id: string(raw, &["userId"]).unwrap_or_default(),
        author_username: string(raw, &["username"]).unwrap_or_else(|| username.to_string()),
        author_display_name: string(raw, &["fullName"]),
        media,
        like_count: count(raw, &["likesCount"]),
        comment_count: count(raw, &["repliesCount"]),
        share_count: count(raw, &["repostsCount"]),
        hashtags,
        mentions,
        created_at: timestamp(raw, &["timestamp"]),
        post_url: string(raw, &["url"]),
        raw_data: Some(raw.clone()),
        text,
        ..SocialPost::new(Platform::Threads, post_id, "thread")
    })
}
