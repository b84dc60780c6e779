use std::path::PathBuf;

use crate::delay::DelayRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Scraping-backend tokens from `APIFY_TOKEN_1..=19`; one is picked per process.
    pub apify_tokens: Vec<String>,
    pub apify_base_url: String,
    pub collector_timeout_secs: u64,
    pub collector_max_retries: u32,
    pub collector_retry_backoff_base_secs: u64,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    pub batch_size: usize,
    pub batch_delay_min_secs: u64,
    pub batch_delay_max_secs: u64,
    pub max_concurrent_jobs: usize,
    /// `None` means one worker per available core, capped at the job count.
    pub worker_count: Option<usize>,
    pub lock_path: PathBuf,
    pub media_path: PathBuf,
    pub platforms_path: PathBuf,
    pub accounts_path: PathBuf,
    pub discord_webhook_url: Option<String>,
}

impl AppConfig {
    #[must_use]
    pub fn inter_job_delay(&self) -> DelayRange {
        DelayRange::from_secs(self.min_delay_secs, self.max_delay_secs)
    }

    #[must_use]
    pub fn batch_delay(&self) -> DelayRange {
        DelayRange::from_secs(self.batch_delay_min_secs, self.batch_delay_max_secs)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "apify_tokens",
                &format_args!("[{} redacted]", self.apify_tokens.len()),
            )
            .field("apify_base_url", &self.apify_base_url)
            .field("collector_timeout_secs", &self.collector_timeout_secs)
            .field("collector_max_retries", &self.collector_max_retries)
            .field(
                "collector_retry_backoff_base_secs",
                &self.collector_retry_backoff_base_secs,
            )
            .field("min_delay_secs", &self.min_delay_secs)
            .field("max_delay_secs", &self.max_delay_secs)
            .field("batch_size", &self.batch_size)
            .field("batch_delay_min_secs", &self.batch_delay_min_secs)
            .field("batch_delay_max_secs", &self.batch_delay_max_secs)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("worker_count", &self.worker_count)
            .field("lock_path", &self.lock_path)
            .field("media_path", &self.media_path)
            .field("platforms_path", &self.platforms_path)
            .field("accounts_path", &self.accounts_path)
            .field(
                "discord_webhook_url",
                &self.discord_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}
