use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Highest `APIFY_TOKEN_<n>` suffix that is looked up.
const MAX_APIFY_TOKENS: usize = 19;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files. Used by
/// worker subprocesses, which inherit the parent's environment.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup, with no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SOCDB_ENV", "development"))?;
    let log_level = or_default("SOCDB_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SOCDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SOCDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SOCDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let apify_tokens: Vec<String> = (1..=MAX_APIFY_TOKENS)
        .filter_map(|i| lookup(&format!("APIFY_TOKEN_{i}")).ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let apify_base_url = or_default("SOCDB_APIFY_BASE_URL", "https://api.apify.com");

    let collector_timeout_secs = parse_u64("SOCDB_COLLECTOR_TIMEOUT_SECS", "300")?;
    let collector_max_retries = parse_u32("SOCDB_COLLECTOR_MAX_RETRIES", "3")?;
    let collector_retry_backoff_base_secs =
        parse_u64("SOCDB_COLLECTOR_RETRY_BACKOFF_BASE_SECS", "5")?;

    let min_delay_secs = parse_u64("SOCDB_MIN_DELAY_SECS", "5")?;
    let max_delay_secs = parse_u64("SOCDB_MAX_DELAY_SECS", "10")?;
    if min_delay_secs > max_delay_secs {
        return Err(invalid(
            "SOCDB_MIN_DELAY_SECS",
            format!("{min_delay_secs} exceeds SOCDB_MAX_DELAY_SECS ({max_delay_secs})"),
        ));
    }

    let batch_size = parse_usize("SOCDB_BATCH_SIZE", "3")?;
    if batch_size == 0 {
        return Err(invalid("SOCDB_BATCH_SIZE", "must be at least 1".to_string()));
    }

    let batch_delay_min_secs = parse_u64("SOCDB_BATCH_DELAY_MIN_SECS", "5")?;
    let batch_delay_max_secs = parse_u64("SOCDB_BATCH_DELAY_MAX_SECS", "60")?;
    if batch_delay_min_secs > batch_delay_max_secs {
        return Err(invalid(
            "SOCDB_BATCH_DELAY_MIN_SECS",
            format!(
                "{batch_delay_min_secs} exceeds SOCDB_BATCH_DELAY_MAX_SECS ({batch_delay_max_secs})"
            ),
        ));
    }

    let max_concurrent_jobs = parse_usize("SOCDB_MAX_CONCURRENT_JOBS", "3")?;
    if max_concurrent_jobs == 0 {
        return Err(invalid(
            "SOCDB_MAX_CONCURRENT_JOBS",
            "must be at least 1".to_string(),
        ));
    }

    let worker_count = match lookup("SOCDB_WORKER_COUNT") {
        Ok(raw) => {
            let n = raw
                .parse::<usize>()
                .map_err(|e| invalid("SOCDB_WORKER_COUNT", e.to_string()))?;
            if n == 0 {
                return Err(invalid(
                    "SOCDB_WORKER_COUNT",
                    "must be at least 1".to_string(),
                ));
            }
            Some(n)
        }
        Err(_) => None,
    };

    let lock_path = lookup("SOCDB_LOCK_PATH")
        .map_or_else(|_| std::env::temp_dir().join("socdb.lock"), PathBuf::from);
    let media_path = PathBuf::from(or_default("SOCDB_MEDIA_PATH", "./media"));
    let platforms_path = PathBuf::from(or_default(
        "SOCDB_PLATFORMS_PATH",
        "./config/platforms.yaml",
    ));
    let accounts_path = PathBuf::from(or_default("SOCDB_ACCOUNTS_PATH", "./config/accounts.txt"));
    let discord_webhook_url = lookup("DISCORD_WEBHOOK_URL")
        .ok()
        .filter(|url| !url.trim().is_empty());

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        apify_tokens,
        apify_base_url,
        collector_timeout_secs,
        collector_max_retries,
        collector_retry_backoff_base_secs,
        min_delay_secs,
        max_delay_secs,
        batch_size,
        batch_delay_min_secs,
        batch_delay_max_secs,
        max_concurrent_jobs,
        worker_count,
        lock_path,
        media_path,
        platforms_path,
        accounts_path,
        discord_webhook_url,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SOCDB_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
