//! Process-parallel discipline: each job runs in a fresh `socdb worker`
//! subprocess that builds its own pool and collectors. Only the job and its
//! outcome cross the process boundary, as JSON.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::Stdio;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

use socdb_core::{CollectionJob, JobOutcome};
use socdb_scraper::Notify;

use super::{report_outcome, BatchReport};

/// Failures of the worker pool itself. Any of these aborts the batch.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot locate the socdb executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to spawn worker {exe}: {source}")]
    Spawn {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode job for worker: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Starts one isolated worker for a job and waits for its outcome.
///
/// A worker that crashes or reports garbage is a failed job, not an error.
pub trait WorkerLauncher: Send + Sync {
    fn launch(
        &self,
        job: CollectionJob,
    ) -> impl Future<Output = Result<JobOutcome, LaunchError>> + Send;
}

/// Launches `socdb worker` subprocesses of the running executable.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exe: PathBuf,
    batch_run_id: Option<i64>,
}

impl ProcessLauncher {
    #[must_use]
    pub fn new(exe: PathBuf, batch_run_id: Option<i64>) -> Self {
        Self { exe, batch_run_id }
    }

    /// # Errors
    ///
    /// Returns [`LaunchError::CurrentExe`] if the executable path is unavailable.
    pub fn current(batch_run_id: Option<i64>) -> Result<Self, LaunchError> {
        let exe = std::env::current_exe().map_err(LaunchError::CurrentExe)?;
        Ok(Self::new(exe, batch_run_id))
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.exe);
        command.arg("worker");
        if let Some(id) = self.batch_run_id {
            command.arg("--batch-run-id").arg(id.to_string());
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, job: CollectionJob) -> Result<JobOutcome, LaunchError> {
        let started_at = Utc::now();
        let payload = serde_json::to_vec(&job)?;

        let mut child = self.command().spawn().map_err(|source| LaunchError::Spawn {
            exe: self.exe.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&payload).await {
                return Ok(JobOutcome::failed(
                    job,
                    format!("failed to hand job to worker: {e}"),
                    started_at,
                ));
            }
        }

        let output = match child.wait_with_output().await {
            Ok(output) => output,
            Err(e) => {
                return Ok(JobOutcome::failed(
                    job,
                    format!("lost worker process: {e}"),
                    started_at,
                ))
            }
        };

        Ok(decode_outcome(&output.stdout).unwrap_or_else(|| {
            JobOutcome::failed(
                job,
                format!("worker exited with {} without an outcome", output.status),
                started_at,
            )
        }))
    }
}

/// Parses the last non-blank stdout line as a [`JobOutcome`].
pub(crate) fn decode_outcome(stdout: &[u8]) -> Option<JobOutcome> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    match serde_json::from_str(line) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(error = %e, "worker printed an unreadable outcome");
            None
        }
    }
}

/// `configured` if set, else the core count, never more than `jobs`.
#[must_use]
pub fn default_worker_count(configured: Option<usize>, jobs: usize) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    configured.unwrap_or(cores).min(jobs).max(1)
}

/// Runs every job through a pool of `workers` concurrent subprocesses.
///
/// Outcomes keep submission order.
///
/// # Errors
///
/// Returns the first [`LaunchError`]; workers still in flight are killed.
pub async fn run_parallel<L: WorkerLauncher>(
    launcher: &L,
    jobs: Vec<CollectionJob>,
    workers: usize,
    notifier: &dyn Notify,
) -> Result<BatchReport, LaunchError> {
    let workers = workers.max(1);
    let total = jobs.len();
    tracing::info!(total, workers, "dispatching jobs to worker processes");

    let mut results = stream::iter(jobs)
        .map(|job| launcher.launch(job))
        .buffered(workers);

    let mut outcomes = Vec::with_capacity(total);
    while let Some(result) = results.next().await {
        let outcome = result?;
        report_outcome(&outcome, notifier);
        outcomes.push(outcome);
    }

    Ok(BatchReport::new(outcomes))
}
