//! Bounded-concurrent discipline: every job is a future on the calling
//! task, gated by a counting semaphore.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use socdb_core::CollectionJob;
use socdb_scraper::Notify;

use super::{report_outcome, run_isolated, BatchReport, JobRunner, Pacing};

/// Runs at most `limit` jobs at once and waits for all of them to settle.
///
/// Each job holds its permit through a random jitter, the job itself, and
/// the inter-job pause. Outcomes are returned in completion order.
pub async fn run_bounded<R: JobRunner>(
    runner: &R,
    jobs: Vec<CollectionJob>,
    limit: usize,
    pacing: &Pacing,
    notifier: &dyn Notify,
) -> BatchReport {
    let limit = limit.max(1);
    let semaphore = Semaphore::new(limit);
    let total = jobs.len();
    tracing::info!(total, limit, "dispatching jobs");

    let mut in_flight: FuturesUnordered<_> = jobs
        .into_iter()
        .map(|job| {
            let semaphore = &semaphore;
            async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = semaphore.acquire().await.ok();
                pacing.jitter.wait().await;
                let outcome = run_isolated(runner, job).await;
                pacing.inter_job.wait().await;
                outcome
            }
        })
        .collect();

    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = in_flight.next().await {
        report_outcome(&outcome, notifier);
        outcomes.push(outcome);
    }

    BatchReport::new(outcomes)
}
