//! Drives a job list through a [`JobRunner`] under one of three disciplines.
//!
//! Every discipline isolates job failures: a runner that errors or panics
//! yields a failed [`JobOutcome`] and the batch carries on. Only shared
//! infrastructure failures (see [`parallel`]) abort a batch.

pub mod bounded;
pub mod parallel;
pub mod sequential;

use std::future::Future;
use std::panic::AssertUnwindSafe;

use chrono::Utc;
use futures::FutureExt as _;
use rand::seq::SliceRandom as _;

use socdb_core::{AppConfig, CollectionJob, DelayRange, JobOutcome, RecordCounts};
use socdb_scraper::Notify;

pub use bounded::run_bounded;
pub use parallel::{run_parallel, ProcessLauncher};
pub use sequential::run_sequential;

/// Upper bound on the pre-run jitter each bounded-discipline task sleeps.
const JITTER_MAX_MS: u64 = 2_000;

/// Executes exactly one job. Implementations report failure through the
/// returned outcome rather than an error.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: CollectionJob) -> impl Future<Output = JobOutcome> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Discipline {
    Sequential,
    Bounded,
    Parallel,
}

impl Discipline {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Bounded => "bounded",
            Self::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for Discipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pauses applied around jobs.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub inter_job: DelayRange,
    pub batch: DelayRange,
    pub batch_size: usize,
    pub jitter: DelayRange,
}

impl Pacing {
    /// No pauses at all.
    #[cfg(test)]
    pub const NONE: Pacing = Pacing {
        inter_job: DelayRange::NONE,
        batch: DelayRange::NONE,
        batch_size: usize::MAX,
        jitter: DelayRange::NONE,
    };

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            inter_job: config.inter_job_delay(),
            batch: config.batch_delay(),
            batch_size: config.batch_size.max(1),
            jitter: DelayRange::new(
                std::time::Duration::ZERO,
                std::time::Duration::from_millis(JITTER_MAX_MS),
            ),
        }
    }
}

/// Summary of a finished batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_secs: f64,
    pub avg_duration_secs: f64,
    pub records: RecordCounts,
}

impl AggregateStats {
    #[must_use]
    pub fn from_outcomes(outcomes: &[JobOutcome]) -> Self {
        let mut stats = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            if outcome.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            stats.total_duration_secs += outcome.duration_seconds;
            stats.records += outcome.counts;
        }
        if stats.total > 0 {
            #[allow(clippy::cast_precision_loss)]
            let n = stats.total as f64;
            stats.avg_duration_secs = stats.total_duration_secs / n;
        }
        stats
    }

    /// True when there was at least one job and none succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }
}

/// Outcomes of a batch in completion order, with their summary.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    pub stats: AggregateStats,
}

impl BatchReport {
    #[must_use]
    pub fn new(outcomes: Vec<JobOutcome>) -> Self {
        let stats = AggregateStats::from_outcomes(&outcomes);
        Self { outcomes, stats }
    }
}

/// Uniform shuffle, applied once before dispatch.
pub fn shuffle_jobs(jobs: &mut [CollectionJob]) {
    jobs.shuffle(&mut rand::rng());
}

/// Runs one job, converting a panic into a failed outcome.
pub(crate) async fn run_isolated<R: JobRunner>(runner: &R, job: CollectionJob) -> JobOutcome {
    let started_at = Utc::now();
    match AssertUnwindSafe(runner.run(job.clone())).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            JobOutcome::failed(job, format!("job panicked: {reason}"), started_at)
        }
    }
}

/// Logs a finished job and forwards failures to the notifier.
pub(crate) fn report_outcome(outcome: &JobOutcome, notifier: &dyn Notify) {
    let platform = outcome.job.platform;
    let subject = outcome.job.subject();
    if outcome.success {
        tracing::info!(
            %platform,
            %subject,
            records = outcome.counts.total(),
            duration_secs = outcome.duration_seconds,
            "job succeeded"
        );
    } else {
        let error = outcome.error.as_deref().unwrap_or("unknown error");
        tracing::error!(%platform, %subject, error, "job failed");
        notifier.notify(&format!(
            "socdb: {platform} job for {subject} failed: {error}"
        ));
    }
}
