//! Job descriptors and outcomes exchanged between the orchestrator, the
//! job runner, and worker processes. Everything here is serialisable so a
//! job can cross a process boundary as plain JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::TimeInterval;
use crate::platform::{Platform, PlatformSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    User,
    Hashtag,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::User => write!(f, "user"),
            JobKind::Hashtag => write!(f, "hashtag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTarget {
    User {
        username: String,
    },
    Hashtag {
        hashtag: String,
        /// Restricts collected posts to this window when set.
        interval: Option<TimeInterval>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    pub post_limit: u32,
    /// `None` collects every available story.
    pub story_limit: Option<u32>,
    pub download_media: bool,
    pub results_limit: u32,
    pub search_sort: String,
}

impl JobParams {
    #[must_use]
    pub fn from_settings(settings: &PlatformSettings) -> Self {
        Self {
            post_limit: settings.post_limit,
            story_limit: settings.story_limit,
            download_media: settings.download_media,
            results_limit: settings.hashtag_limit,
            search_sort: settings.search_sort.clone(),
        }
    }

    /// Stories are skipped only when the limit is explicitly zero.
    #[must_use]
    pub fn include_stories(&self) -> bool {
        self.story_limit != Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionJob {
    pub platform: Platform,
    pub target: JobTarget,
    pub params: JobParams,
}

impl CollectionJob {
    #[must_use]
    pub fn user(platform: Platform, username: impl Into<String>, params: JobParams) -> Self {
        Self {
            platform,
            target: JobTarget::User {
                username: username.into(),
            },
            params,
        }
    }

    #[must_use]
    pub fn hashtag(
        platform: Platform,
        hashtag: &str,
        interval: Option<TimeInterval>,
        params: JobParams,
    ) -> Self {
        Self {
            platform,
            target: JobTarget::Hashtag {
                hashtag: hashtag.trim_start_matches('#').to_string(),
                interval,
            },
            params,
        }
    }

    #[must_use]
    pub fn kind(&self) -> JobKind {
        match self.target {
            JobTarget::User { .. } => JobKind::User,
            JobTarget::Hashtag { .. } => JobKind::Hashtag,
        }
    }

    /// Human-readable subject for logs and notifications.
    #[must_use]
    pub fn subject(&self) -> String {
        match &self.target {
            JobTarget::User { username } => username.clone(),
            JobTarget::Hashtag {
                hashtag,
                interval: Some(interval),
            } => format!("#{hashtag} ({interval})"),
            JobTarget::Hashtag { hashtag, .. } => format!("#{hashtag}"),
        }
    }

    /// Subject written to the collection history ledger.
    #[must_use]
    pub fn ledger_subject(&self) -> String {
        match &self.target {
            JobTarget::User { username } => username.clone(),
            JobTarget::Hashtag {
                hashtag,
                interval: Some(interval),
            } => format!("hashtag_{hashtag}_{}", interval.compact_label()),
            JobTarget::Hashtag { hashtag, .. } => format!("hashtag_{hashtag}"),
        }
    }
}

/// Number of records a job persisted, per entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub users: usize,
    pub posts: usize,
    pub stories: usize,
    pub hashtag_posts: usize,
}

impl RecordCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.users + self.posts + self.stories + self.hashtag_posts
    }
}

impl std::ops::AddAssign for RecordCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.users += rhs.users;
        self.posts += rhs.posts;
        self.stories += rhs.stories;
        self.hashtag_posts += rhs.hashtag_posts;
    }
}

/// Terminal result of running one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: CollectionJob,
    pub success: bool,
    pub counts: RecordCounts,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl JobOutcome {
    #[must_use]
    pub fn succeeded(job: CollectionJob, counts: RecordCounts, started_at: DateTime<Utc>) -> Self {
        Self::finish(job, true, counts, None, started_at)
    }

    #[must_use]
    pub fn failed(job: CollectionJob, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finish(
            job,
            false,
            RecordCounts::default(),
            Some(error.into()),
            started_at,
        )
    }

    fn finish(
        job: CollectionJob,
        success: bool,
        counts: RecordCounts,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        #[allow(clippy::cast_precision_loss)]
        let duration_seconds = (finished_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        Self {
            job,
            success,
            counts,
            error,
            started_at,
            finished_at,
            duration_seconds,
        }
    }
}
