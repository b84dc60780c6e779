//! The production [`JobRunner`]: collect, persist, download media, and
//! append to the history ledger.

use chrono::Utc;
use thiserror::Error;

use socdb_core::{AppConfig, CollectionJob, JobOutcome, RecordCounts, SocialPost};
use socdb_db::StorageWriteError;
use socdb_scraper::{Collect, DownloadReport, MediaDownloader, ScraperError};

use crate::orchestrate::JobRunner;

/// Why a single job failed. Never escapes the per-job boundary.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Collect(#[from] ScraperError),

    #[error(transparent)]
    Storage(#[from] StorageWriteError),
}

pub struct CollectionRunner<C> {
    collector: C,
    pool: sqlx::PgPool,
    media: Option<MediaDownloader>,
    batch_run_id: Option<i64>,
}

impl<C: Collect> CollectionRunner<C> {
    #[must_use]
    pub fn new(collector: C, pool: sqlx::PgPool) -> Self {
        Self {
            collector,
            pool,
            media: None,
            batch_run_id: None,
        }
    }

    /// Builds a runner with media downloads rooted at `config.media_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the download client cannot be built.
    pub fn from_config(
        collector: C,
        pool: sqlx::PgPool,
        config: &AppConfig,
    ) -> Result<Self, ScraperError> {
        let media = MediaDownloader::new(&config.media_path, config.collector_timeout_secs)?;
        Ok(Self::new(collector, pool).with_media(media))
    }

    #[must_use]
    pub fn with_media(mut self, media: MediaDownloader) -> Self {
        self.media = Some(media);
        self
    }

    #[must_use]
    pub fn with_batch_run(mut self, batch_run_id: Option<i64>) -> Self {
        self.batch_run_id = batch_run_id;
        self
    }

    /// Runs `job` and surfaces its error instead of folding it into an outcome.
    ///
    /// Each backend call inside the collector carries its own timeout, so a
    /// job with several calls is not limited as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] if collection or persistence fails.
    pub async fn execute(&self, job: &CollectionJob) -> Result<RecordCounts, JobError> {
        let records = self.collector.collect(job).await?;

        let counts = socdb_db::save_collected(&self.pool, &records).await?;

        if job.params.download_media {
            if let Some(media) = &self.media {
                let posts: Vec<&SocialPost> = records.media_posts().collect();
                let mut report = DownloadReport::default();
                for post in posts {
                    report += media.download_post(post).await;
                }
                tracing::info!(
                    platform = %job.platform,
                    subject = %job.subject(),
                    downloaded = report.downloaded,
                    skipped = report.skipped,
                    failed = report.failed,
                    "media download finished"
                );
            }
        }

        Ok(counts)
    }
}

impl<C: Collect> JobRunner for CollectionRunner<C> {
    async fn run(&self, job: CollectionJob) -> JobOutcome {
        let started_at = Utc::now();
        let outcome = match self.execute(&job).await {
            Ok(counts) => JobOutcome::succeeded(job, counts, started_at),
            Err(e) => JobOutcome::failed(job, e.to_string(), started_at),
        };
        socdb_db::record_history_best_effort(&self.pool, &outcome, self.batch_run_id).await;
        outcome
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod runner_test;
