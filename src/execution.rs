//! Persisted execution state.
//!
//! The relay consumes this state through the [`crate::store::ExecutionStore`]
//! collaborator: the subscriber endpoint only reads it, the in-process
//! publisher appends through it. Records transition status exactly once,
//! from `pending`/`running` to a terminal state, and their event list is
//! append-only while running.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::ExecutionEvent;
use crate::metrics::ExecutionMetrics;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Lower-case wire form; the terminal variants double as the SSE event
    /// name of the terminal frame.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution's durable state: identity, status, accumulated events, and
/// folded metrics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub owner_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub events: Vec<ExecutionEvent>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            status: ExecutionStatus::Pending,
            events: Vec::new(),
            metrics: ExecutionMetrics::default(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        }
    }

    #[must_use]
    pub fn running(mut self) -> Self {
        self.status = ExecutionStatus::Running;
        self
    }

    /// Append an event and fold it into the stored metrics. Callers (the
    /// store backends) reject appends on terminal records before this runs.
    pub fn append(&mut self, event: ExecutionEvent) {
        self.metrics.apply(&event);
        self.events.push(event);
    }

    /// Move to a terminal status. Callers validate that `status` is terminal
    /// and that the record has not already finished.
    pub fn complete(&mut self, status: ExecutionStatus, error: Option<String>) {
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.error = error;
    }

    /// Wall-clock duration in milliseconds, once the record has ended.
    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|ended| (ended - self.started_at).num_milliseconds())
    }
}
