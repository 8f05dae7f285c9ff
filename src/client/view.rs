//! Client-observable stream state.
//!
//! A subscription exposes two complementary views: a live [`StreamUpdate`]
//! channel for callers that want to react to frames as they land, and a
//! [`StreamView`] snapshot for callers that render current state on their
//! own schedule. Both are fed by the subscription task; the snapshot is the
//! fold of every update seen so far.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::client::ClientError;
use crate::event::ExecutionEvent;
use crate::execution::ExecutionStatus;
use crate::metrics::{DerivedMetrics, ExecutionMetrics};

/// One notification from the subscription task.
#[derive(Debug)]
pub enum StreamUpdate {
    /// The stream opened (first connect or a reconnect).
    Connected,
    /// An event record landed, either from the init snapshot or live.
    Event(ExecutionEvent),
    /// The execution finished; no further events follow.
    Terminal(TerminalSummary),
    /// The relay gave up waiting for the execution and closed the stream.
    TimedOut { message: String },
    /// The transport dropped; a reconnect is scheduled after `retry_in`.
    Disconnected { retry_in: std::time::Duration },
    /// The subscription gave up. Sent at most once, always last.
    Failed(ClientError),
}

/// Parsed body of a terminal frame.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSummary {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Total run time in milliseconds, when the relay could compute it.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parsed body of the init snapshot frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitSnapshot {
    pub execution_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub events: Vec<ExecutionEvent>,
}

/// Point-in-time state of a subscription.
#[derive(Clone, Debug, Default)]
pub struct StreamView {
    /// True while a stream is open.
    pub connected: bool,
    /// Terminal status once one arrived.
    pub finished: Option<ExecutionStatus>,
    /// Reconnect attempts since the last successful open.
    pub retries: u32,
    /// Every event seen so far, snapshot first, duplicates included.
    pub events: Vec<ExecutionEvent>,
}

impl StreamView {
    /// Metrics derived from the events seen so far.
    pub fn metrics(&self) -> DerivedMetrics {
        DerivedMetrics::from_events(&self.events)
    }
}

/// Handle the subscription task and its owner both hold.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedView {
    inner: Arc<Mutex<StreamView>>,
}

impl SharedView {
    pub fn snapshot(&self) -> StreamView {
        self.inner.lock().clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().connected = connected;
    }

    pub fn set_retries(&self, retries: u32) {
        self.inner.lock().retries = retries;
    }

    pub fn append(&self, event: ExecutionEvent) {
        self.inner.lock().events.push(event);
    }

    pub fn finish(&self, status: ExecutionStatus) {
        self.inner.lock().finished = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_summary_parses_relay_payload() {
        let body = r#"{
            "status": "completed",
            "endTime": "2026-03-01T10:00:05Z",
            "duration": 5000,
            "totalCost": 0.015,
            "metrics": {"totalTokens": 150, "totalCost": 0.015, "costByProvider": {}},
            "error": null
        }"#;
        let summary: TerminalSummary = serde_json::from_str(body).unwrap();
        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(summary.duration, Some(5000));
        assert_eq!(summary.metrics.total_tokens, 150);
        assert!(summary.error.is_none());
    }

    #[test]
    fn terminal_summary_tolerates_sparse_payload() {
        let summary: TerminalSummary = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        assert_eq!(summary.status, ExecutionStatus::Failed);
        assert!(summary.end_time.is_none());
        assert_eq!(summary.total_cost, 0.0);
    }

    #[test]
    fn view_metrics_fold_snapshot_and_live_events() {
        let view = SharedView::default();
        view.append(ExecutionEvent::token_usage(100, 0.01));
        view.append(ExecutionEvent::token_usage(50, 0.005));

        let metrics = view.snapshot().metrics();
        assert_eq!(metrics.totals.total_tokens, 150);
        assert!((metrics.totals.total_cost - 0.015).abs() < 1e-9);
    }
}
