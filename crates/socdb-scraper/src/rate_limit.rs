//! Retry with exponential backoff for scraping-backend calls.
//!
//! Transient failures (429, network errors, 5xx from the backend) are retried.
//! Everything else is returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

/// Whether `err` is worth another attempt after a backoff delay.
///
/// A 5xx from the backend usually means the actor run crashed upstream; a
/// 4xx other than 429 means the request itself is wrong and will stay wrong.
fn is_retriable(err: &ScraperError) -> bool {
    match err {
        ScraperError::RateLimited { .. } | ScraperError::Http(_) => true,
        ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Wait before the retry that follows failed attempt `attempt` (0-based).
///
/// A 429 is never retried sooner than the backend's `Retry-After`.
fn retry_delay(err: &ScraperError, backoff_base_secs: u64, attempt: u32) -> Duration {
    let backoff = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
    let secs = match err {
        ScraperError::RateLimited {
            retry_after_secs, ..
        } => backoff.max(*retry_after_secs),
        _ => backoff,
    };
    Duration::from_secs(secs)
}

/// Executes `operation`, retrying transient errors up to `max_retries` times.
///
/// The wait before retry `n` (1-based) is `backoff_base_secs * 2^(n-1)`
/// seconds, or the server's `Retry-After` for a 429 if that is longer. With
/// `max_retries = 3` the operation runs at most 4 times. Non-retriable
/// errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut last_err;
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                last_err = err;
            }
        }

        let delay = retry_delay(&last_err, backoff_base_secs, attempt);
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs = delay.as_secs(),
            error = %last_err,
            "transient backend error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
