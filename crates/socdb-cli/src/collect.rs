//! Collection command handlers for the CLI.
//!
//! `single` runs one job in the foreground and surfaces its raw error. Every
//! other mode builds a job list, takes the singleton lock, records a batch
//! run, and hands the shuffled list to the chosen discipline. Individual job
//! failures are counted, never propagated; the run fails only when every job
//! fails or shared infrastructure breaks.

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;

use socdb_core::{
    parse_date, split_range, AppConfig, CollectionJob, JobParams, Platform, PlatformsFile,
    TimeUnit,
};
use socdb_db::BatchRunTotals;
use socdb_scraper::{notifier_from_url, CollectorRegistry, Notify};

use crate::lock::with_singleton_lock;
use crate::orchestrate::parallel::default_worker_count;
use crate::orchestrate::{
    run_bounded, run_parallel, run_sequential, shuffle_jobs, AggregateStats, BatchReport,
    Discipline, JobRunner, Pacing, ProcessLauncher,
};
use crate::runner::CollectionRunner;

/// How long a finished batch waits for failure alerts still being sent.
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Options shared by every multi-job mode.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ExecArgs {
    /// How jobs are scheduled.
    #[arg(long, value_enum, default_value_t = Discipline::Sequential)]
    pub discipline: Discipline,
    /// In-flight job limit for the bounded discipline.
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Worker process count for the parallel discipline.
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Parameters of a hashtag range run.
#[derive(Debug, Clone)]
pub(crate) struct HashtagRange<'a> {
    pub platform: Platform,
    pub hashtag: &'a str,
    pub start: &'a str,
    pub end: &'a str,
    pub unit: TimeUnit,
    pub size: u32,
}

fn load_platforms(config: &AppConfig) -> anyhow::Result<PlatformsFile> {
    socdb_core::load_platform_settings(&config.platforms_path).with_context(|| {
        format!(
            "failed to load platform settings from {}",
            config.platforms_path.display()
        )
    })
}

fn build_runner(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    batch_run_id: Option<i64>,
) -> anyhow::Result<CollectionRunner<CollectorRegistry>> {
    let collectors =
        CollectorRegistry::from_config(config).context("failed to build collectors")?;
    let runner = CollectionRunner::from_config(collectors, pool.clone(), config)?
        .with_batch_run(batch_run_id);
    Ok(runner)
}

/// One job in the foreground: no lock, no batch run.
///
/// # Errors
///
/// Returns the job's own error message if it fails.
pub(crate) async fn run_single(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    platform: Platform,
    username: &str,
) -> anyhow::Result<()> {
    let platforms = load_platforms(config)?;
    let params = JobParams::from_settings(&platforms.settings(platform));
    let job = CollectionJob::user(platform, username, params);
    let runner = build_runner(pool, config, None)?;

    let outcome = runner.run(job).await;
    if !outcome.success {
        anyhow::bail!(
            "{}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    println!(
        "collected {platform} {username}: {} users, {} posts, {} stories in {:.1}s",
        outcome.counts.users,
        outcome.counts.posts,
        outcome.counts.stories,
        outcome.duration_seconds
    );
    Ok(())
}

/// User jobs for every enabled platform listed in the accounts file.
pub(crate) fn daily_jobs(
    platforms: &PlatformsFile,
    accounts_path: &Path,
) -> anyhow::Result<Vec<CollectionJob>> {
    let accounts = socdb_core::load_accounts(accounts_path)
        .with_context(|| format!("failed to load accounts from {}", accounts_path.display()))?;

    let mut jobs = Vec::new();
    for (platform, subjects) in accounts.non_empty() {
        if !platforms.is_enabled(platform) {
            tracing::warn!(
                %platform,
                accounts = subjects.len(),
                "platform disabled; skipping accounts"
            );
            continue;
        }
        let params = JobParams::from_settings(&platforms.settings(platform));
        jobs.extend(
            subjects
                .iter()
                .map(|subject| CollectionJob::user(platform, subject.as_str(), params.clone())),
        );
    }
    Ok(jobs)
}

/// User jobs for every username already stored for `platform`.
pub(crate) async fn stored_account_jobs(
    pool: &sqlx::PgPool,
    platforms: &PlatformsFile,
    platform: Platform,
) -> anyhow::Result<Vec<CollectionJob>> {
    let usernames = socdb_db::list_platform_usernames(pool, platform).await?;
    let params = JobParams::from_settings(&platforms.settings(platform));
    Ok(usernames
        .into_iter()
        .map(|username| CollectionJob::user(platform, username, params.clone()))
        .collect())
}

/// One hashtag job per interval of the requested range.
pub(crate) fn hashtag_jobs(
    platforms: &PlatformsFile,
    range: &HashtagRange<'_>,
) -> anyhow::Result<Vec<CollectionJob>> {
    let start = parse_date(range.start)?;
    let end = parse_date(range.end)?;
    let intervals = split_range(start, end, range.unit, range.size)?;
    let params = JobParams::from_settings(&platforms.settings(range.platform));

    tracing::info!(
        platform = %range.platform,
        hashtag = range.hashtag,
        intervals = intervals.len(),
        "split hashtag range"
    );
    Ok(intervals
        .into_iter()
        .map(|interval| {
            CollectionJob::hashtag(range.platform, range.hashtag, Some(interval), params.clone())
        })
        .collect())
}

pub(crate) async fn run_daily(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    accounts_file: Option<&Path>,
    exec: &ExecArgs,
) -> anyhow::Result<()> {
    let platforms = load_platforms(config)?;
    let jobs = daily_jobs(&platforms, accounts_file.unwrap_or(config.accounts_path.as_path()))?;
    run_locked(pool, config, "daily", jobs, exec).await
}

pub(crate) async fn run_batch(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    platform: Platform,
    exec: &ExecArgs,
) -> anyhow::Result<()> {
    let platforms = load_platforms(config)?;
    let jobs = stored_account_jobs(pool, &platforms, platform).await?;
    run_locked(pool, config, "batch", jobs, exec).await
}

pub(crate) async fn run_all(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    exec: &ExecArgs,
) -> anyhow::Result<()> {
    let platforms = load_platforms(config)?;
    let mut jobs = Vec::new();
    for platform in platforms.enabled_platforms() {
        jobs.extend(stored_account_jobs(pool, &platforms, platform).await?);
    }
    run_locked(pool, config, "all", jobs, exec).await
}

pub(crate) async fn run_hashtag(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    range: &HashtagRange<'_>,
    exec: &ExecArgs,
) -> anyhow::Result<()> {
    let platforms = load_platforms(config)?;
    let jobs = hashtag_jobs(&platforms, range)?;
    run_locked(pool, config, "hashtag", jobs, exec).await
}

/// Runs a multi-job mode under the singleton lock.
async fn run_locked(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    mode: &'static str,
    jobs: Vec<CollectionJob>,
    exec: &ExecArgs,
) -> anyhow::Result<()> {
    if jobs.is_empty() {
        tracing::warn!(mode, "no jobs to run");
        println!("{mode}: nothing to collect");
        return Ok(());
    }

    let stats = with_singleton_lock(
        &config.lock_path,
        run_batch_lifecycle(pool, config, mode, jobs, exec),
    )
    .await??;

    if stats.all_failed() {
        anyhow::bail!("all {} {mode} jobs failed", stats.total);
    }
    Ok(())
}

/// Create, start, dispatch, then complete or fail the batch run.
async fn run_batch_lifecycle(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    mode: &'static str,
    mut jobs: Vec<CollectionJob>,
    exec: &ExecArgs,
) -> anyhow::Result<AggregateStats> {
    let run = socdb_db::create_batch_run(pool, mode, exec.discipline.as_str(), "cli").await?;
    if let Err(e) = socdb_db::start_batch_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, BatchRunTotals::default(), format!("{e:#}")).await;
        return Err(e.into());
    }

    shuffle_jobs(&mut jobs);
    let job_count = jobs.len();
    tracing::info!(
        run_id = run.id,
        mode,
        discipline = %exec.discipline,
        jobs = job_count,
        "starting batch run"
    );

    let notifier = notifier_from_url(config.discord_webhook_url.as_deref());
    let dispatched = tokio::select! {
        result = dispatch(pool, config, run.id, jobs, exec, notifier.as_ref()) => result,
        () = shutdown_signal() => Err(anyhow::anyhow!("interrupted by shutdown signal")),
    };
    notifier.flush(NOTIFY_FLUSH_TIMEOUT).await;

    let report = match dispatched {
        Ok(report) => report,
        Err(e) => {
            let totals = BatchRunTotals {
                job_count: to_i32(job_count),
                ..BatchRunTotals::default()
            };
            fail_run_best_effort(pool, run.id, totals, format!("{e:#}")).await;
            return Err(e);
        }
    };

    print_summary(mode, exec.discipline, &report);
    let stats = report.stats;
    let totals = BatchRunTotals {
        job_count: to_i32(stats.total),
        succeeded_count: to_i32(stats.succeeded),
        failed_count: to_i32(stats.failed),
        records_processed: to_i32(stats.records.total()),
    };

    if stats.all_failed() {
        let message = format!("all {} jobs failed", stats.total);
        fail_run_best_effort(pool, run.id, totals, message).await;
    } else if let Err(e) = socdb_db::complete_batch_run(pool, run.id, totals).await {
        fail_run_best_effort(pool, run.id, totals, format!("{e:#}")).await;
        return Err(e.into());
    }

    Ok(stats)
}

async fn dispatch(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    run_id: i64,
    jobs: Vec<CollectionJob>,
    exec: &ExecArgs,
    notifier: &dyn Notify,
) -> anyhow::Result<BatchReport> {
    let pacing = Pacing::from_config(config);
    match exec.discipline {
        Discipline::Sequential => {
            let runner = build_runner(pool, config, Some(run_id))?;
            Ok(run_sequential(&runner, jobs, &pacing, notifier).await)
        }
        Discipline::Bounded => {
            let runner = build_runner(pool, config, Some(run_id))?;
            let limit = exec.concurrency.unwrap_or(config.max_concurrent_jobs);
            Ok(run_bounded(&runner, jobs, limit, &pacing, notifier).await)
        }
        Discipline::Parallel => {
            let launcher = ProcessLauncher::current(Some(run_id))?;
            let workers = default_worker_count(exec.workers.or(config.worker_count), jobs.len());
            Ok(run_parallel(&launcher, jobs, workers, notifier).await?)
        }
    }
}

fn print_summary(mode: &str, discipline: Discipline, report: &BatchReport) {
    let stats = &report.stats;
    tracing::info!(
        mode,
        %discipline,
        total = stats.total,
        succeeded = stats.succeeded,
        failed = stats.failed,
        total_duration_secs = stats.total_duration_secs,
        avg_duration_secs = stats.avg_duration_secs,
        records = stats.records.total(),
        "batch run finished"
    );
    println!("{mode} run ({discipline}) finished");
    println!(
        "  jobs:     {} total, {} succeeded, {} failed",
        stats.total, stats.succeeded, stats.failed
    );
    println!(
        "  timing:   {:.1}s total, {:.1}s average per job",
        stats.total_duration_secs, stats.avg_duration_secs
    );
    println!(
        "  records:  {} users, {} posts, {} stories, {} hashtag posts",
        stats.records.users,
        stats.records.posts,
        stats.records.stories,
        stats.records.hashtag_posts
    );
    for outcome in report.outcomes.iter().filter(|o| !o.success) {
        println!(
            "  failed:   {} {}: {}",
            outcome.job.platform,
            outcome.job.subject(),
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    totals: BatchRunTotals,
    message: String,
) {
    if let Err(mark_err) = socdb_db::fail_batch_run(pool, run_id, totals, &message).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark batch run as failed"
        );
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::warn!("received shutdown signal; abandoning in-flight jobs");
}

#[cfg(test)]
#[path = "collect_test.rs"]
mod collect_test;
