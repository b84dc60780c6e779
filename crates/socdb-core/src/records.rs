//! Typed records produced by platform collectors.
//!
//! Collectors own the field mapping from backend payloads into these types;
//! storage only routes them by their natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::RecordCounts;
use crate::platform::Platform;

/// Literal placeholders some backends emit instead of an absent value.
const NULL_PLACEHOLDERS: [&str; 3] = ["None", "null", "NULL"];

/// Map placeholder strings (`"None"`, `"null"`, `"NULL"`) to `None`.
#[must_use]
pub fn normalize_optional_text(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !NULL_PLACEHOLDERS.contains(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Carousel,
    Album,
    Live,
    Story,
    Unknown(i32),
}

impl MediaKind {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MediaKind::Image,
            2 => MediaKind::Video,
            8 => MediaKind::Carousel,
            9 => MediaKind::Album,
            10 => MediaKind::Live,
            11 => MediaKind::Story,
            other => MediaKind::Unknown(other),
        }
    }

    /// Label persisted in `media_type` columns.
    #[must_use]
    pub fn label(self) -> String {
        match self {
            MediaKind::Image => "IMAGE".to_string(),
            MediaKind::Video => "VIDEO".to_string(),
            MediaKind::Carousel => "CAROUSEL".to_string(),
            MediaKind::Album => "ALBUM".to_string(),
            MediaKind::Live => "LIVE".to_string(),
            MediaKind::Story => "STORY".to_string(),
            MediaKind::Unknown(code) => format!("UNKNOWN_{code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub platform: Platform,
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub is_verified: bool,
    pub is_private: bool,
    pub is_business: bool,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
    pub category: Option<String>,
    pub external_url: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub raw_data: Option<serde_json::Value>,
}

/// A post, tweet, thread or story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub platform: Platform,
    pub post_id: String,
    /// `post`, `story`, `reel`, `tweet`, `thread`, ...
    pub content_type: String,
    pub author_id: String,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub text: Option<String>,
    pub language: Option<String>,
    pub media: Vec<MediaItem>,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub view_count: i64,
    pub is_pinned: bool,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub post_url: Option<String>,
    pub raw_data: Option<serde_json::Value>,
}

impl SocialPost {
    /// An empty record for `post_id`; collectors fill in the rest.
    #[must_use]
    pub fn new(platform: Platform, post_id: impl Into<String>, content_type: &str) -> Self {
        Self {
            platform,
            post_id: post_id.into(),
            content_type: content_type.to_string(),
            author_id: String::new(),
            author_username: String::new(),
            author_display_name: None,
            text: None,
            language: None,
            media: Vec::new(),
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            view_count: 0,
            is_pinned: false,
            hashtags: Vec::new(),
            mentions: Vec::new(),
            created_at: None,
            expires_at: None,
            post_url: None,
            raw_data: None,
        }
    }

    #[must_use]
    pub fn primary_media(&self) -> Option<&MediaItem> {
        self.media.first()
    }

    pub fn media_of(&self, kind: MediaKind) -> impl Iterator<Item = &MediaItem> {
        self.media.iter().filter(move |m| m.kind == kind)
    }

    /// First URL of the given kind, used by single-valued story columns.
    #[must_use]
    pub fn first_url_of(&self, kind: MediaKind) -> Option<&str> {
        self.media_of(kind).next().map(|m| m.url.as_str())
    }

    #[must_use]
    pub fn first_thumbnail(&self) -> Option<&str> {
        self.media.iter().find_map(|m| m.thumbnail_url.as_deref())
    }
}

/// A post surfaced by a hashtag search. `hashtag` never carries a leading `#`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashtagPost {
    pub hashtag: String,
    pub post: SocialPost,
}

impl HashtagPost {
    #[must_use]
    pub fn new(hashtag: &str, post: SocialPost) -> Self {
        Self {
            hashtag: hashtag.trim_start_matches('#').to_string(),
            post,
        }
    }
}

/// Everything one job collected, routed to storage by the job runner.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectedRecords {
    Profile {
        user: PlatformUser,
        posts: Vec<SocialPost>,
        stories: Vec<SocialPost>,
    },
    Hashtag {
        hashtag: String,
        posts: Vec<HashtagPost>,
    },
}

impl CollectedRecords {
    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        match self {
            CollectedRecords::Profile {
                posts, stories, ..
            } => RecordCounts {
                users: 1,
                posts: posts.len(),
                stories: stories.len(),
                hashtag_posts: 0,
            },
            CollectedRecords::Hashtag { posts, .. } => RecordCounts {
                hashtag_posts: posts.len(),
                ..RecordCounts::default()
            },
        }
    }

    /// Posts and stories whose media may be downloaded.
    pub fn media_posts(&self) -> Box<dyn Iterator<Item = &SocialPost> + '_> {
        match self {
            CollectedRecords::Profile { posts, stories, .. } => {
                Box::new(posts.iter().chain(stories.iter()))
            }
            CollectedRecords::Hashtag { posts, .. } => Box::new(posts.iter().map(|hp| &hp.post)),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn post(platform: Platform, post_id: &str) -> SocialPost {
        SocialPost {
            author_id: "42".to_string(),
            author_username: "nasa".to_string(),
            text: Some("hello".to_string()),
            ..SocialPost::new(platform, post_id, "post")
        }
    }
}
