use serde_json::{json, Value};

use socdb_core::{
    CollectedRecords, CollectionJob, JobTarget, MediaItem, MediaKind, Platform, PlatformUser,
    SocialPost,
};

use super::unsupported_hashtag;
use crate::apify::ApifyClient;
use crate::error::ScraperError;
use crate::payload::{array, count, extract_tags, flag, string, timestamp};

const PAGE_ACTOR: &str = "apify/facebook-pages-scraper";
const POSTS_ACTOR: &str = "apify/facebook-posts-scraper";

pub(super) async fn collect(
    client: &ApifyClient,
    job: &CollectionJob,
) -> Result<CollectedRecords, ScraperError> {
    let JobTarget::User { username } = &job.target else {
        return Err(unsupported_hashtag(Platform::Facebook));
    };

    let url = page_url(username);
    let items = client
        .run_actor(PAGE_ACTOR, &json!({ "startUrls": [{ "url": url }] }))
        .await?;
    let user = items
        .first()
        .and_then(|raw| parse_page(raw, username))
        .ok_or_else(|| ScraperError::ProfileNotFound {
            platform: Platform::Facebook,
            username: username.clone(),
        })?;

    let input = json!({
        "startUrls": [{ "url": url }],
        "resultsLimit": job.params.post_limit,
    });
    let posts = client
        .run_actor(POSTS_ACTOR, &input)
        .await?
        .iter()
        .filter_map(|raw| parse_post(raw, &user))
        .collect();

    Ok(CollectedRecords::Profile {
        user,
        posts,
        stories: Vec::new(),
    })
}

/// Accounts may be listed as a page slug or a full URL.
pub(crate) fn page_url(username: &str) -> String {
    if username.starts_with("http://") || username.starts_with("https://") {
        username.to_string()
    } else {
        format!("https://www.facebook.com/{username}")
    }
}

pub(crate) fn parse_page(raw: &Value, username: &str) -> Option<PlatformUser> {
    let categories: Vec<String> = array(raw, &["categories"])
        .iter()
        .filter_map(|c| c.as_str().map(str::to_string))
        .collect();
    Some(PlatformUser {
        platform: Platform::Facebook,
        user_id: string(raw, &["facebookId", "pageId", "id"])?,
        username: username.to_string(),
        display_name: string(raw, &["title", "pageName"]),
        is_verified: flag(raw, &["verified"]),
        is_private: false,
        is_business: true,
        description: string(raw, &["intro", "about"]),
        profile_image_url: string(raw, &["profilePictureUrl", "profilePhoto"]),
        category: (!categories.is_empty()).then(|| categories.join(", ")),
        external_url: string(raw, &["website"]),
        follower_count: count(raw, &["followers", "followersCount"]),
        following_count: 0,
        post_count: 0,
        raw_data: Some(raw.clone()),
    })
}

fn parse_media(raw: &Value) -> Vec<MediaItem> {
    array(raw, &["media"])
        .iter()
        .filter_map(|m| {
            let thumb = string(m, &["thumbnail", "photo_image.uri"]);
            let is_video = string(m, &["__typename"]).as_deref() == Some("Video");
            match string(m, &["videoUrl", "video_url"]) {
                Some(url) => Some(MediaItem {
                    kind: MediaKind::Video,
                    url,
                    thumbnail_url: thumb,
                }),
                None if is_video => None,
                None => thumb.map(|url| MediaItem {
                    kind: MediaKind::Image,
                    url,
                    thumbnail_url: None,
                }),
            }
        })
        .collect()
}

fn parse_post(raw: &Value, page: &PlatformUser) -> Option<SocialPost> {
    let post_id = string(raw, &["postId", "postFacebookId", "id"])?;
    let text = string(raw, &["text", "message"]);
    Some(SocialPost {
        author_id: string(raw, &["user.id"]).unwrap_or_else(|| page.user_id.clone()),
        author_username: page.username.clone(),
        author_display_name: string(raw, &["user.name"]).or_else(|| page.display_name.clone()),
        media: parse_media(raw),
        like_count: count(raw, &["likes", "reactionsCount"]),
        comment_count: count(raw, &["comments", "commentsCount"]),
        share_count: count(raw, &["shares", "sharesCount"]),
        view_count: count(raw, &["viewsCount"]),
        hashtags: text.as_deref().map(|t| extract_tags(t, '#')).unwrap_or_default(),
        created_at: timestamp(raw, &["time", "timestamp"]),
        post_url: string(raw, &["url", "topLevelUrl"]),
        raw_data: Some(raw.clone()),
        text,
        ..SocialPost::new(Platform::Facebook, post_id, "post")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_accepts_slugs_and_urls() {
        assert_eq!(page_url("NASA"), "https://www.facebook.com/NASA");
        assert_eq!(
            page_url("https://www.facebook.com/NASA/"),
            "https://www.facebook.com/NASA/"
        );
    }

    #[test]
    fn parses_page_and_post() {
        let page = parse_page(
            &json!({
                "facebookId": "100044561550831",
                "title": "NASA - National Aeronautics and Space Administration",
                "categories": ["Government organization", "Science"],
                "followers": 27_000_000,
                "verified": true,
            }),
            "NASA",
        )
        .unwrap();
        assert_eq!(page.username, "NASA");
        assert_eq!(
            page.category.as_deref(),
            Some("Government organization, Science")
        );

        let post = parse_post(
            &json!({
                "postId": "pfbid02",
                "text": "Webb sees #galaxies",
                "likes": 1200,
                "shares": 30,
                "time": "2024-03-01T12:30:00.000Z",
                "media": [{"thumbnail": "https://scontent/1.jpg"}],
            }),
            &page,
        )
        .unwrap();
        assert_eq!(post.author_id, "100044561550831");
        assert_eq!(post.hashtags, vec!["galaxies"]);
        assert_eq!(post.media.len(), 1);
        assert_eq!(post.media[0].kind, MediaKind::Image);
    }
}
