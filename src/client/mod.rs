//! Subscriber client for relay streams.
//!
//! [`RelayClient`] opens `GET /executions/{id}/stream` over plain HTTP and
//! hands back a [`Subscription`] whose background task parses frames,
//! maintains a [`StreamView`], and reconnects with doubling backoff when the
//! transport drops. Duplicate events after a reconnect are kept; consumers
//! that need exact counts dedup on their own keys.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::RetryPolicy;

pub mod sse;
pub mod subscription;
pub mod view;

pub use sse::{FrameParser, SseFrame};
pub use subscription::{Subscription, Watcher};
pub use view::{StreamUpdate, StreamView, TerminalSummary};

/// Terminal failure of a subscription. Transient transport errors are logged
/// and retried, never surfaced here; this only reports giving up.
#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    #[error("connection failed after {attempts} reconnect attempts")]
    #[diagnostic(
        code(flowrelay::client::retries_exhausted),
        help("The relay stayed unreachable through every backoff window; check the base URL and that the server is up.")
    )]
    RetriesExhausted { attempts: u32 },

    #[error("connection failed and automatic reconnection is disabled")]
    #[diagnostic(
        code(flowrelay::client::reconnect_disabled),
        help("Enable auto reconnection on the retry policy or resubscribe manually.")
    )]
    ReconnectDisabled,
}

/// Entry point for subscribing to execution streams.
#[derive(Clone, Debug)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
    retry: RetryPolicy,
}

impl RelayClient {
    /// Client for a relay at `base_url` (scheme and authority, no trailing
    /// path), with the default retry policy.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Send `Authorization: Bearer <token>` on every stream request.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Swap the underlying HTTP client, e.g. one with custom timeouts.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Subscribe to one execution's stream. Spawns the subscription task on
    /// the current Tokio runtime.
    pub fn subscribe(&self, execution_id: impl Into<String>) -> Subscription {
        Subscription::spawn(self, execution_id.into())
    }

    /// Watcher bound to this client.
    pub fn watcher(&self) -> Watcher {
        Watcher::new(self.clone())
    }

    pub(crate) fn stream_url(&self, execution_id: &str) -> String {
        format!("{}/executions/{execution_id}/stream", self.base_url)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}
