//! HTTP client for the scraping backend's synchronous actor-run endpoint.

use std::time::Duration;

use rand::seq::IndexedRandom;
use reqwest::Client;
use serde_json::Value;

use socdb_core::AppConfig;

use crate::error::ScraperError;
use crate::rate_limit::retry_with_backoff;

const USER_AGENT: &str = concat!("socdb/", env!("CARGO_PKG_VERSION"));

/// Runs scraping actors and returns their dataset items.
///
/// Each call is `POST {base}/v2/acts/{actor}/run-sync-get-dataset-items`
/// with the actor input as the JSON body. Every attempt, body included, is
/// bounded by the call timeout. Rate limits (429), network failures and
/// backend 5xx responses are retried with exponential backoff up to
/// `max_retries` additional attempts.
pub struct ApifyClient {
    client: Client,
    base_url: String,
    token: String,
    call_timeout: Duration,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl std::fmt::Debug for ApifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApifyClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .field("call_timeout", &self.call_timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_secs", &self.backoff_base_secs)
            .finish_non_exhaustive()
    }
}

impl ApifyClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
            call_timeout: Duration::from_secs(timeout_secs),
            max_retries,
            backoff_base_secs,
        })
    }

    /// Builds a client from configuration, picking one of the configured
    /// tokens at random so quota spreads across accounts.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::MissingToken`] if no token is configured, or
    /// [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        let token = pick_token(&config.apify_tokens).ok_or(ScraperError::MissingToken)?;
        Self::new(
            &config.apify_base_url,
            token,
            config.collector_timeout_secs,
            config.collector_max_retries,
            config.collector_retry_backoff_base_secs,
        )
    }

    fn run_url(&self, actor: &str) -> String {
        format!(
            "{}/v2/acts/{}/run-sync-get-dataset-items",
            self.base_url,
            actor.replace('/', "~")
        )
    }

    /// Runs `actor` with `input` and returns the dataset items it produced.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::RateLimited`]: HTTP 429 after all retries.
    /// - [`ScraperError::ActorNotFound`]: HTTP 404 (not retried).
    /// - [`ScraperError::UnexpectedStatus`]: any other non-2xx status (5xx retried).
    /// - [`ScraperError::Http`]: network or TLS failure after all retries.
    /// - [`ScraperError::Timeout`]: one attempt exceeded the call timeout (not retried).
    /// - [`ScraperError::Deserialize`]: body is not a JSON array (not retried).
    pub async fn run_actor(&self, actor: &str, input: &Value) -> Result<Vec<Value>, ScraperError> {
        let url = self.run_url(actor);
        tracing::debug!(actor, "running scraping actor");

        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.clone();
            async move {
                tokio::time::timeout(self.call_timeout, self.attempt(&url, actor, input))
                    .await
                    .map_err(|_| ScraperError::Timeout {
                        secs: self.call_timeout.as_secs(),
                    })?
            }
        })
        .await
    }

    async fn attempt(
        &self,
        url: &str,
        actor: &str,
        input: &Value,
    ) -> Result<Vec<Value>, ScraperError> {
        let response = self
            .client
            .post(url)
            .query(&[("token", self.token.as_str())])
            .json(input)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ScraperError::RateLimited {
                actor: actor.to_owned(),
                retry_after_secs,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ScraperError::ActorNotFound {
                actor: actor.to_owned(),
            });
        }

        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                actor: actor.to_owned(),
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<Vec<Value>>(&body).map_err(|e| ScraperError::Deserialize {
            context: format!("dataset items from {actor}"),
            source: e,
        })
    }
}

/// One token chosen uniformly from `tokens`, or `None` if the list is empty.
#[must_use]
pub fn pick_token(tokens: &[String]) -> Option<&String> {
    tokens.choose(&mut rand::rng())
}

#[cfg(test)]
#[path = "apify_test.rs"]
mod tests;
