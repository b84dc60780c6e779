use socdb_core::Platform;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by actor {actor} (retry after {retry_after_secs}s)")]
    RateLimited {
        actor: String,
        retry_after_secs: u64,
    },

    #[error("actor not found: {actor}")]
    ActorNotFound { actor: String },

    #[error("unexpected HTTP status {status} from actor {actor}")]
    UnexpectedStatus { status: u16, actor: String },

    #[error("no scraping backend token configured (set APIFY_TOKEN_1..APIFY_TOKEN_19)")]
    MissingToken,

    #[error("collector call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{platform} profile not found: {username}")]
    ProfileNotFound { platform: Platform, username: String },

    #[error("{platform} does not support {what}")]
    UnsupportedJob {
        platform: Platform,
        what: &'static str,
    },

    #[error("webhook returned HTTP {status}")]
    WebhookStatus { status: u16 },

    #[error("media I/O error for {path}: {source}")]
    MediaIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
