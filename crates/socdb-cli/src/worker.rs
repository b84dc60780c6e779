//! `socdb worker`: runs one job handed over on stdin and prints its outcome
//! as a single JSON line on stdout.
//!
//! The worker shares nothing with its parent. It loads configuration from
//! the inherited environment and opens its own pool and collectors. Setup
//! failures are reported as a failed outcome so the parent counts the job
//! rather than losing it.

use std::io::Write as _;

use anyhow::Context as _;
use chrono::Utc;
use tokio::io::AsyncReadExt as _;

use socdb_core::{AppConfig, CollectionJob, JobOutcome};
use socdb_scraper::CollectorRegistry;

use crate::orchestrate::JobRunner;
use crate::runner::CollectionRunner;

pub(crate) async fn run_worker(
    config: &AppConfig,
    batch_run_id: Option<i64>,
) -> anyhow::Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read job from stdin")?;
    let job: CollectionJob =
        serde_json::from_str(input.trim()).context("stdin is not a collection job")?;

    let outcome = match execute(config, batch_run_id, job.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(
                platform = %job.platform,
                subject = %job.subject(),
                error = %e,
                "worker setup failed"
            );
            JobOutcome::failed(job, format!("worker setup failed: {e:#}"), Utc::now())
        }
    };

    let line = serde_json::to_string(&outcome)?;
    {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }

    config.inter_job_delay().wait().await;
    Ok(())
}

async fn execute(
    config: &AppConfig,
    batch_run_id: Option<i64>,
    job: CollectionJob,
) -> anyhow::Result<JobOutcome> {
    let pool =
        socdb_db::connect_pool(&config.database_url, socdb_db::PoolConfig::for_worker(config))
            .await
            .context("worker failed to connect to database")?;
    let collectors = CollectorRegistry::from_config(config)?;
    let runner = CollectionRunner::from_config(collectors, pool.clone(), config)?
        .with_batch_run(batch_run_id);

    let outcome = runner.run(job).await;
    pool.close().await;
    Ok(outcome)
}
