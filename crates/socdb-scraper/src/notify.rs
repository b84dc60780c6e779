//! Failure notifications.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::json;
use tokio::task::JoinSet;

use crate::error::ScraperError;

/// Fire-and-forget notification sink. Implementations must never block the
/// caller or surface delivery failures.
pub trait Notify: Send + Sync {
    fn notify(&self, message: &str);

    /// Waits up to `within` for deliveries still in flight. Call before the
    /// runtime shuts down, or the last messages are dropped with it.
    fn flush(&self, _within: Duration) -> BoxFuture<'_, ()> {
        Box::pin(std::future::ready(()))
    }
}

/// Drops every message. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notify for NoopNotifier {
    fn notify(&self, _message: &str) {}
}

/// Discord incoming webhook.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    webhook_url: String,
    http: reqwest::Client,
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl DiscordNotifier {
    #[must_use]
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http: reqwest::Client::new(),
            pending: Arc::default(),
        }
    }

    /// Delivers one message and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] on network failure or
    /// [`ScraperError::WebhookStatus`] on a non-2xx reply.
    pub async fn send(&self, message: &str) -> Result<(), ScraperError> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "content": message }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScraperError::WebhookStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl Notify for DiscordNotifier {
    /// Spawns delivery onto the current runtime; does nothing outside one.
    fn notify(&self, message: &str) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; dropping notification");
            return;
        };
        let notifier = self.clone();
        let message = message.to_string();
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn_on(
            async move {
                if let Err(e) = notifier.send(&message).await {
                    tracing::warn!(error = %e, "discord notification failed");
                }
            },
            &handle,
        );
    }

    fn flush(&self, within: Duration) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut pending =
                std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
            let drained = tokio::time::timeout(within, async {
                while pending.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    undelivered = pending.len(),
                    "gave up waiting for discord notifications"
                );
            }
        })
    }
}

/// A notifier for the optional webhook URL.
#[must_use]
pub fn notifier_from_url(webhook_url: Option<&str>) -> Box<dyn Notify> {
    match webhook_url {
        Some(url) if !url.trim().is_empty() => Box::new(DiscordNotifier::new(url)),
        _ => Box::new(NoopNotifier),
    }
}
