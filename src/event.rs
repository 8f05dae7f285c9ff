//! Event records emitted during a workflow execution.
//!
//! An [`ExecutionEvent`] is an immutable value describing one occurrence
//! during an execution: lifecycle markers, node progress, token usage,
//! reasoning traces. Events carry an open `data` map for event-specific
//! fields so producers can attach whatever the consumer UI needs without
//! schema churn.

use std::fmt;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed enumeration of event types.
///
/// The serialized form (kebab-case) is the wire contract: it appears as the
/// `type` field of every event payload and, unchanged, as the SSE `event:`
/// name of live frames.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Start,
    Progress,
    Completion,
    Error,
    TokenUsageUpdate,
    ReasoningStart,
    ReasoningUpdate,
    ReasoningComplete,
    NodeStart,
    NodeProgress,
    NodeComplete,
    NodeError,
    WorkflowComplete,
    WorkflowError,
}

impl EventKind {
    /// Every kind, in declaration order. Handy for exhaustive tests.
    pub const ALL: [EventKind; 14] = [
        EventKind::Start,
        EventKind::Progress,
        EventKind::Completion,
        EventKind::Error,
        EventKind::TokenUsageUpdate,
        EventKind::ReasoningStart,
        EventKind::ReasoningUpdate,
        EventKind::ReasoningComplete,
        EventKind::NodeStart,
        EventKind::NodeProgress,
        EventKind::NodeComplete,
        EventKind::NodeError,
        EventKind::WorkflowComplete,
        EventKind::WorkflowError,
    ];

    /// Stable wire name, also used verbatim as the SSE event name.
    pub fn wire_name(&self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Progress => "progress",
            EventKind::Completion => "completion",
            EventKind::Error => "error",
            EventKind::TokenUsageUpdate => "token-usage-update",
            EventKind::ReasoningStart => "reasoning-start",
            EventKind::ReasoningUpdate => "reasoning-update",
            EventKind::ReasoningComplete => "reasoning-complete",
            EventKind::NodeStart => "node-start",
            EventKind::NodeProgress => "node-progress",
            EventKind::NodeComplete => "node-complete",
            EventKind::NodeError => "node-error",
            EventKind::WorkflowComplete => "workflow-complete",
            EventKind::WorkflowError => "workflow-error",
        }
    }

    /// True for kinds that mark the end of an execution from the consumer's
    /// point of view. Node-level completion is not terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Completion
                | EventKind::Error
                | EventKind::WorkflowComplete
                | EventKind::WorkflowError
        )
    }
}

impl AsRef<str> for EventKind {
    fn as_ref(&self) -> &str {
        self.wire_name()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One occurrence during an execution.
///
/// `timestamp` is assigned by the producer; when a producer leaves it empty
/// the relay stamps the event at forwarding time, so consumers always see a
/// normalized timestamp on the wire. `stream_id` correlates the event to one
/// execution and is filled in by the publisher when absent.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub data: FxHashMap<String, Value>,
}

impl ExecutionEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: None,
            stream_id: None,
            node_id: None,
            node_name: None,
            data: FxHashMap::default(),
        }
    }

    pub fn start() -> Self {
        Self::new(EventKind::Start)
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(EventKind::Progress).with_data_field("message", Value::String(message.into()))
    }

    pub fn node_start(node_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self::new(EventKind::NodeStart).with_node(node_id, node_name)
    }

    pub fn node_complete(node_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self::new(EventKind::NodeComplete).with_node(node_id, node_name)
    }

    pub fn node_error(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        let mut event = Self::new(EventKind::NodeError);
        event.node_id = Some(node_id.into());
        event.with_data_field("error", Value::String(message.into()))
    }

    /// Token accounting delta. `tokens` and `cost` land in `data` under the
    /// keys the metrics fold reads.
    pub fn token_usage(tokens: u64, cost: f64) -> Self {
        Self::new(EventKind::TokenUsageUpdate)
            .with_data_field("tokens", Value::from(tokens))
            .with_data_field("cost", Value::from(cost))
    }

    pub fn workflow_complete() -> Self {
        Self::new(EventKind::WorkflowComplete)
    }

    pub fn workflow_error(message: impl Into<String>) -> Self {
        Self::new(EventKind::WorkflowError).with_data_field("error", Value::String(message.into()))
    }

    #[must_use]
    pub fn with_stream_id(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    #[must_use]
    pub fn with_node(mut self, node_id: impl Into<String>, node_name: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.node_name = Some(node_name.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_data_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Attribute cost to a provider; the per-provider metrics fold groups by
    /// this field.
    #[must_use]
    pub fn with_provider(self, provider: impl Into<String>) -> Self {
        self.with_data_field("provider", Value::String(provider.into()))
    }

    /// Fill in the timestamp if the producer left it empty.
    #[must_use]
    pub fn stamped(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }

    pub fn tokens(&self) -> Option<u64> {
        self.data.get("tokens").and_then(Value::as_u64)
    }

    pub fn cost(&self) -> Option<f64> {
        self.data.get("cost").and_then(Value::as_f64)
    }

    pub fn provider(&self) -> Option<&str> {
        self.data.get("provider").and_then(Value::as_str)
    }

    /// Human-readable detail carried in `data`, if any.
    pub fn message(&self) -> Option<&str> {
        self.data
            .get("message")
            .or_else(|| self.data.get("error"))
            .and_then(Value::as_str)
    }
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.node_id.as_deref(), self.message()) {
            (Some(node), Some(msg)) => write!(f, "{} [{node}] {msg}", self.kind),
            (Some(node), None) => write!(f, "{} [{node}]", self.kind),
            (None, Some(msg)) => write!(f, "{} {msg}", self.kind),
            (None, None) => write!(f, "{}", self.kind),
        }
    }
}
