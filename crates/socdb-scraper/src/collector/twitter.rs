use serde_json::{json, Value};

use socdb_core::{
    CollectedRecords, CollectionJob, JobTarget, MediaItem, MediaKind, Platform, PlatformUser,
    SocialPost, TimeInterval,
};

use super::{hashtag_records, media_list};
use crate::apify::ApifyClient;
use crate::error::ScraperError;
use crate::payload::{array, count, flag, string, string_list, timestamp};

const PROFILE_ACTOR: &str = "deepanshusharm/twitter-profile-scraper-no-cookies";
const SEARCH_ACTOR: &str = "xtdata/twitter-x-scraper";

pub(super) async fn collect(
    client: &ApifyClient,
    job: &CollectionJob,
) -> Result<CollectedRecords, ScraperError> {
    match &job.target {
        JobTarget::User { username } => {
            let input = json!({ "usernames": [username] });
            let items = client.run_actor(PROFILE_ACTOR, &input).await?;
            let user = items
                .first()
                .and_then(|raw| parse_user(raw, username))
                .ok_or_else(|| ScraperError::ProfileNotFound {
                    platform: Platform::Twitter,
                    username: username.clone(),
                })?;

            let posts = search(
                client,
                &format!("from:{username}"),
                job.params.post_limit,
                &job.params.search_sort,
            )
            .await?;

            Ok(CollectedRecords::Profile {
                user,
                posts,
                stories: Vec::new(),
            })
        }
        JobTarget::Hashtag { hashtag, interval } => {
            let term = hashtag_query(hashtag, interval.as_ref());
            let posts = search(
                client,
                &term,
                job.params.results_limit,
                &job.params.search_sort,
            )
            .await?;
            Ok(hashtag_records(hashtag, posts))
        }
    }
}

/// `#tag since:YYYY-MM-DD until:YYYY-MM-DD`; `until` is exclusive, matching
/// the half-open interval.
pub(crate) fn hashtag_query(hashtag: &str, interval: Option<&TimeInterval>) -> String {
    match interval {
        Some(iv) => format!(
            "#{hashtag} since:{} until:{}",
            iv.start.format("%Y-%m-%d"),
            iv.end.format("%Y-%m-%d")
        ),
        None => format!("#{hashtag}"),
    }
}

async fn search(
    client: &ApifyClient,
    term: &str,
    limit: u32,
    sort: &str,
) -> Result<Vec<SocialPost>, ScraperError> {
    let input = json!({
        "searchTerms": [term],
        "maxItems": limit,
        "sort": sort,
        "onlyImage": false,
        "onlyQuote": false,
        "onlyTwitterBlue": false,
        "onlyVerifiedUsers": false,
        "onlyVideo": false,
    });
    let items = client.run_actor(SEARCH_ACTOR, &input).await?;
    Ok(items.iter().filter_map(parse_tweet).collect())
}

pub(crate) fn parse_user(raw: &Value, username: &str) -> Option<PlatformUser> {
    Some(PlatformUser {
        platform: Platform::Twitter,
        user_id: string(raw, &["user_id", "id", "rest_id"])?,
        username: string(raw, &["username", "screen_name"]).unwrap_or_else(|| username.to_string()),
        display_name: string(raw, &["display_name", "name"]),
        is_verified: flag(raw, &["verified", "is_blue_verified"]),
        is_private: flag(raw, &["protected"]),
        is_business: false,
        description: string(raw, &["bio", "description"]),
        profile_image_url: string(raw, &["profile_image_url", "profile_image_url_https"]),
        category: None,
        external_url: string(raw, &["website", "url"]),
        follower_count: count(raw, &["followers_count"]),
        following_count: count(raw, &["following_count", "friends_count"]),
        post_count: count(raw, &["tweet_count", "posts_count", "statuses_count"]),
        raw_data: Some(raw.clone()),
    })
}

fn content_type(raw: &Value) -> &'static str {
    if flag(raw, &["isRetweet"]) {
        "retweet"
    } else if flag(raw, &["isQuote"]) {
        "quote"
    } else if flag(raw, &["isReply"]) {
        "reply"
    } else {
        "tweet"
    }
}

fn parse_media(raw: &Value) -> Vec<MediaItem> {
    let mut media = media_list(raw, &["photos"], MediaKind::Image);
    media.extend(media_list(raw, &["videos"], MediaKind::Video));
    if media.is_empty() {
        media = array(raw, &["extendedEntities.media", "media"])
            .iter()
            .filter_map(|entity| {
                let thumb = string(entity, &["media_url_https", "media_url"]);
                let kind = string(entity, &["type"]);
                if matches!(kind.as_deref(), Some("video" | "animated_gif")) {
                    let best = array(entity, &["video_info.variants"])
                        .iter()
                        .filter(|v| string(v, &["content_type"]).as_deref() == Some("video/mp4"))
                        .max_by_key(|v| count(v, &["bitrate"]))
                        .and_then(|v| string(v, &["url"]));
                    best.map(|url| MediaItem {
                        kind: MediaKind::Video,
                        url,
                        thumbnail_url: thumb,
                    })
                } else {
                    thumb.map(|url| MediaItem {
                        kind: MediaKind::Image,
                        url,
                        thumbnail_url: None,
                    })
                }
            })
            .collect();
    }
    media
}

pub(crate) fn parse_tweet(raw: &Value) -> Option<SocialPost> {
    let post_id = string(raw, &["id", "id_str", "tweetId"])?;
    let author_username = string(raw, &["author.userName", "author.username", "user.screen_name"])
        .unwrap_or_default();
    let post_url = string(raw, &["url", "twitterUrl"]).or_else(|| {
        (!author_username.is_empty())
            .then(|| format!("https://x.com/{author_username}/status/{post_id}"))
    });

    Some(SocialPost {
        author_id: string(raw, &["author.id", "authorId", "user.id_str"]).unwrap_or_default(),
        author_display_name: string(raw, &["author.name", "user.name"]),
        text: string(raw, &["full_text", "text"]),
        language: string(raw, &["lang"]),
        media: parse_media(raw),
        like_count: count(raw, &["likeCount", "favorite_count"]),
        comment_count: count(raw, &["replyCount", "reply_count"]),
        share_count: count(raw, &["retweetCount", "retweet_count"]),
        view_count: count(raw, &["viewCount", "views"]),
        hashtags: string_list(raw, &["hashtags", "entities.hashtags"]),
        mentions: string_list(raw, &["mentions", "entities.user_mentions"]),
        created_at: timestamp(raw, &["createdAt", "created_at"]),
        post_url,
        raw_data: Some(raw.clone()),
        author_username,
        ..SocialPost::new(Platform::Twitter, post_id, content_type(raw))
    })
}
