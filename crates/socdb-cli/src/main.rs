mod collect;
mod lock;
mod orchestrate;
mod runner;
mod worker;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use socdb_core::{AppConfig, Platform, TimeUnit};

use crate::collect::{ExecArgs, HashtagRange};
use crate::lock::LockError;

/// Exit status when another collection run holds the singleton lock.
const LOCK_HELD_EXIT: u8 = 1;
/// Exit status for every other failure, so schedulers can tell it apart
/// from a skipped run.
const FAILURE_EXIT: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "socdb")]
#[command(about = "Social media collection and storage")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Collect accounts or hashtags from the scraping backend
    Collect {
        #[command(subcommand)]
        command: CollectCommands,
    },
    /// Include or exclude stored accounts from re-collection
    Accounts {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Show the most recent collection history entries
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show the most recent batch runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Run one job from stdin (spawned by the parallel discipline)
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        batch_run_id: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
enum CollectCommands {
    /// Collect one account in the foreground
    Single {
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        username: String,
    },
    /// Collect every account in the accounts file
    Daily {
        #[arg(long)]
        accounts_file: Option<PathBuf>,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Re-collect every stored account of one platform
    Batch {
        #[arg(long)]
        platform: Platform,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Re-collect every stored account of every enabled platform
    All {
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Collect a hashtag over a date range split into intervals
    Hashtag {
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        hashtag: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "months")]
        unit: TimeUnit,
        #[arg(long, default_value_t = 2)]
        size: u32,
        #[command(flatten)]
        exec: ExecArgs,
    },
}

#[derive(Debug, Subcommand)]
enum AccountCommands {
    /// Collect this account again in batch runs
    Activate {
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        username: String,
    },
    /// Skip this account in batch runs; stored rows are kept
    Deactivate {
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        username: String,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let status = exit_status(&e);
            if status == LOCK_HELD_EXIT {
                tracing::error!(error = %e, "another collection run is active; exiting");
            } else {
                tracing::error!(error = %format!("{e:#}"), "command failed");
            }
            eprintln!("error: {e:#}");
            ExitCode::from(status)
        }
    }
}

fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LockError>() {
        Some(LockError::Held { .. }) => LOCK_HELD_EXIT,
        _ => FAILURE_EXIT,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Workers inherit the parent's environment and must not re-read `.env`.
    let config = if matches!(command, Commands::Worker { .. }) {
        socdb_core::load_app_config_from_env()
    } else {
        socdb_core::load_app_config()
    }
    .context("failed to load configuration")?;
    init_tracing(&config)?;

    match command {
        Commands::Worker { batch_run_id } => worker::run_worker(&config, batch_run_id).await,
        Commands::Db { command } => run_db(&config, command).await,
        Commands::Accounts { command } => {
            let pool = connect(&config).await?;
            let result = run_accounts(&pool, command).await;
            pool.close().await;
            result
        }
        Commands::History { limit } => {
            let pool = connect(&config).await?;
            print_history(&pool, limit).await
        }
        Commands::Runs { limit } => {
            let pool = connect(&config).await?;
            print_runs(&pool, limit).await
        }
        Commands::Collect { command } => {
            let pool = connect(&config).await?;
            let result = run_collect(&pool, &config, command).await;
            pool.close().await;
            result
        }
    }
}

/// Logs go to stderr so stdout carries only command output and worker outcomes.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = socdb_db::PoolConfig::from_app_config(config);
    socdb_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")
}

async fn run_db(config: &AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    match command {
        DbCommands::Ping => {
            socdb_db::ping(&pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = socdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
    }
    pool.close().await;
    Ok(())
}

async fn run_accounts(pool: &sqlx::PgPool, command: AccountCommands) -> anyhow::Result<()> {
    let (platform, username, active) = match command {
        AccountCommands::Activate { platform, username } => (platform, username, true),
        AccountCommands::Deactivate { platform, username } => (platform, username, false),
    };
    socdb_db::set_account_active(pool, platform, &username, active).await?;
    let state = if active { "active" } else { "inactive" };
    tracing::info!(%platform, username = %username, state, "account status updated");
    println!("{platform} {username}: {state}");
    Ok(())
}

async fn run_collect(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: CollectCommands,
) -> anyhow::Result<()> {
    match command {
        CollectCommands::Single { platform, username } => {
            collect::run_single(pool, config, platform, &username).await
        }
        CollectCommands::Daily {
            accounts_file,
            exec,
        } => collect::run_daily(pool, config, accounts_file.as_deref(), &exec).await,
        CollectCommands::Batch { platform, exec } => {
            collect::run_batch(pool, config, platform, &exec).await
        }
        CollectCommands::All { exec } => collect::run_all(pool, config, &exec).await,
        CollectCommands::Hashtag {
            platform,
            hashtag,
            start,
            end,
            unit,
            size,
            exec,
        } => {
            let range = HashtagRange {
                platform,
                hashtag: &hashtag,
                start: &start,
                end: &end,
                unit,
                size,
            };
            collect::run_hashtag(pool, config, &range, &exec).await
        }
    }
}

async fn print_history(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let rows = socdb_db::list_history(pool, limit).await?;
    if rows.is_empty() {
        println!("no collection history");
        return Ok(());
    }
    for row in rows {
        let status = if row.success { "ok" } else { "FAILED" };
        println!(
            "{}  {:<9} {:<40} {:<6} users={} posts={} stories={} hashtag_posts={} {:.1}s{}",
            row.started_at.format("%Y-%m-%d %H:%M:%S"),
            row.platform,
            row.subject,
            status,
            row.user_count,
            row.post_count,
            row.story_count,
            row.hashtag_post_count,
            row.duration_seconds,
            row.error_message
                .map(|e| format!("  {e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn print_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = socdb_db::list_batch_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no batch runs");
        return Ok(());
    }
    for run in runs {
        println!(
            "#{:<5} {}  {:<8} {:<10} {:<9} jobs={} ok={} failed={} records={}{}",
            run.id,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.mode,
            run.discipline,
            run.status,
            run.job_count,
            run.succeeded_count,
            run.failed_count,
            run.records_processed,
            run.error_message
                .map(|e| format!("  {e}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
