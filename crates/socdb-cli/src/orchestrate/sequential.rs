use socdb_core::CollectionJob;
use socdb_scraper::Notify;

use super::{report_outcome, run_isolated, BatchReport, JobRunner, Pacing};

/// Runs jobs one at a time in list order.
///
/// A longer batch pause precedes every `batch_size`-th job after the first,
/// and the inter-job pause follows every job except the last.
pub async fn run_sequential<R: JobRunner>(
    runner: &R,
    jobs: Vec<CollectionJob>,
    pacing: &Pacing,
    notifier: &dyn Notify,
) -> BatchReport {
    let total = jobs.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, job) in jobs.into_iter().enumerate() {
        if i != 0 && i % pacing.batch_size == 0 {
            let pause = pacing.batch.wait().await;
            tracing::info!(
                completed = i,
                total,
                pause_secs = pause.as_secs_f64(),
                "batch pause"
            );
        }

        tracing::info!(
            index = i + 1,
            total,
            platform = %job.platform,
            subject = %job.subject(),
            "running job"
        );
        let outcome = run_isolated(runner, job).await;
        report_outcome(&outcome, notifier);
        outcomes.push(outcome);

        if i + 1 < total {
            pacing.inter_job.wait().await;
        }
    }

    BatchReport::new(outcomes)
}
