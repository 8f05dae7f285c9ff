//! Aggregate counters folded from execution events.
//!
//! The same fold runs in two places: storage backends apply it incrementally
//! as events are appended, and the subscriber client recomputes it on demand
//! over its accumulated event list. Keeping one implementation keeps both
//! views consistent.

use chrono::Duration;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::event::{EventKind, ExecutionEvent};

/// Counters persisted alongside an execution and shipped in snapshot and
/// terminal frames.
///
/// Any event kind may carry numeric `tokens`/`cost` fields in its data map;
/// a string `provider` field attributes the cost delta per provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionMetrics {
    pub total_tokens: u64,
    pub total_cost: f64,
    #[serde(skip_serializing_if = "FxHashMap::is_empty")]
    pub cost_by_provider: FxHashMap<String, f64>,
}

impl ExecutionMetrics {
    /// Fold one event into the counters.
    pub fn apply(&mut self, event: &ExecutionEvent) {
        if let Some(tokens) = event.tokens() {
            self.total_tokens += tokens;
        }
        if let Some(cost) = event.cost() {
            self.total_cost += cost;
            if let Some(provider) = event.provider() {
                *self
                    .cost_by_provider
                    .entry(provider.to_string())
                    .or_insert(0.0) += cost;
            }
        }
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ExecutionEvent>) -> Self {
        let mut metrics = Self::default();
        for event in events {
            metrics.apply(event);
        }
        metrics
    }
}

/// Metrics the subscriber client derives from its event list on demand.
///
/// Never stored; always a pure function of the accumulated events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedMetrics {
    pub totals: ExecutionMetrics,
    pub completed_nodes: usize,
    pub errored_nodes: usize,
    pub duration: Option<Duration>,
}

impl DerivedMetrics {
    pub fn from_events(events: &[ExecutionEvent]) -> Self {
        let totals = ExecutionMetrics::from_events(events);
        let completed_nodes = events
            .iter()
            .filter(|e| e.kind == EventKind::NodeComplete)
            .count();
        let errored_nodes = events
            .iter()
            .filter(|e| e.kind == EventKind::NodeError)
            .count();
        Self {
            totals,
            completed_nodes,
            errored_nodes,
            duration: execution_duration(events),
        }
    }
}

/// Delta between the first `start` event and the first terminal event, or
/// `None` when either side (or its timestamp) is missing.
pub fn execution_duration(events: &[ExecutionEvent]) -> Option<Duration> {
    let started = events
        .iter()
        .find(|e| e.kind == EventKind::Start)
        .and_then(|e| e.timestamp)?;
    let ended = events
        .iter()
        .find(|e| e.kind.is_terminal())
        .and_then(|e| e.timestamp)?;
    Some(ended - started)
}
