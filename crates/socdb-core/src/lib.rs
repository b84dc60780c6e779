pub mod accounts;
pub mod app_config;
pub mod config;
pub mod delay;
pub mod interval;
pub mod job;
pub mod platform;
pub mod records;

use thiserror::Error;

pub use accounts::{load_accounts, parse_accounts, AccountsFile};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use delay::DelayRange;
pub use interval::{parse_date, split_range, IntervalError, TimeInterval, TimeUnit};
pub use job::{CollectionJob, JobKind, JobOutcome, JobParams, JobTarget, RecordCounts};
pub use platform::{load_platform_settings, Platform, PlatformSettings, PlatformsFile};
pub use records::{
    normalize_optional_text, CollectedRecords, HashtagPost, MediaItem, MediaKind, PlatformUser,
    SocialPost,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse platform settings: {0}")]
    PlatformsFileParse(#[source] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
