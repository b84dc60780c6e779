//! Platform collectors: one module per platform, dispatched by a closed match.

mod facebook;
mod instagram;
mod threads;
mod twitter;

use std::future::Future;

use serde_json::Value;

use socdb_core::{
    AppConfig, CollectedRecords, CollectionJob, HashtagPost, JobTarget, MediaItem, MediaKind,
    Platform, SocialPost, TimeInterval,
};

use crate::apify::ApifyClient;
use crate::error::ScraperError;
use crate::payload;

/// Anything that can turn a job into collected records.
///
/// The job runner is generic over this so orchestration can be exercised
/// without a scraping backend.
pub trait Collect: Send + Sync {
    fn collect(
        &self,
        job: &CollectionJob,
    ) -> impl Future<Output = Result<CollectedRecords, ScraperError>> + Send;
}

/// The per-process set of platform collectors, sharing one backend client.
#[derive(Debug)]
pub struct CollectorRegistry {
    client: ApifyClient,
}

impl CollectorRegistry {
    #[must_use]
    pub fn new(client: ApifyClient) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::MissingToken`] if no backend token is
    /// configured, or [`ScraperError::Http`] if the client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Ok(Self::new(ApifyClient::from_config(config)?))
    }
}

impl Collect for CollectorRegistry {
    async fn collect(&self, job: &CollectionJob) -> Result<CollectedRecords, ScraperError> {
        let mut records = match job.platform {
            Platform::Instagram => instagram::collect(&self.client, job).await?,
            Platform::Facebook => facebook::collect(&self.client, job).await?,
            Platform::Twitter => twitter::collect(&self.client, job).await?,
            Platform::Threads => threads::collect(&self.client, job).await?,
        };

        // Twitter applies the window server-side through search operators.
        if job.platform != Platform::Twitter {
            if let (
                JobTarget::Hashtag {
                    interval: Some(interval),
                    ..
                },
                CollectedRecords::Hashtag { posts, .. },
            ) = (&job.target, &mut records)
            {
                retain_in_interval(posts, interval);
            }
        }

        Ok(records)
    }
}

/// Drops posts created outside `interval`, and posts with no timestamp.
pub fn retain_in_interval(posts: &mut Vec<HashtagPost>, interval: &TimeInterval) {
    let before = posts.len();
    posts.retain(|hp| hp.post.created_at.is_some_and(|at| interval.contains(at)));
    let dropped = before - posts.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = posts.len(), %interval, "filtered hashtag posts to interval");
    }
}

fn hashtag_records(hashtag: &str, posts: Vec<SocialPost>) -> CollectedRecords {
    CollectedRecords::Hashtag {
        hashtag: hashtag.to_string(),
        posts: posts
            .into_iter()
            .map(|post| HashtagPost::new(hashtag, post))
            .collect(),
    }
}

fn unsupported_hashtag(platform: Platform) -> ScraperError {
    ScraperError::UnsupportedJob {
        platform,
        what: "hashtag collection",
    }
}

/// Media from an array of bare URL strings or objects with a `url` field.
fn media_list(raw: &Value, keys: &[&str], kind: MediaKind) -> Vec<MediaItem> {
    payload::array(raw, keys)
        .iter()
        .filter_map(|item| match item {
            Value::String(url) if !url.is_empty() => Some(MediaItem {
                kind,
                url: url.clone(),
                thumbnail_url: None,
            }),
            Value::Object(_) => payload::string(item, &["url", "uri", "src"]).map(|url| MediaItem {
                kind,
                url,
                thumbnail_url: payload::string(item, &["thumbnailUrl", "thumbnail", "preview"]),
            }),
            _ => None,
        })
        .collect()
}
