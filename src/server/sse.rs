//! Wire framing for the subscriber endpoint.
//!
//! Every frame is named SSE with a single-line JSON payload:
//!
//! ```text
//! event: <name>
//! data: {...}
//! ```
//!
//! Frame names are the kebab-case event kind for live frames, `init` for the
//! snapshot, the lowercased status for terminal frames, and `timeout` when
//! the poll budget runs out. Heartbeats are comment frames (`: heartbeat`)
//! so they keep intermediaries from idling the connection without being
//! dispatched as events on the client side.

use axum::http::{HeaderName, HeaderValue, header};
use axum::response::Response;
use axum::response::sse::Event;
use chrono::Utc;
use serde_json::{Value, json};

use crate::event::ExecutionEvent;
use crate::execution::ExecutionRecord;

/// Comment text carried by keep-alive frames.
pub const HEARTBEAT_COMMENT: &str = "heartbeat";

/// Payload of the `timeout` frame.
pub const TIMEOUT_MESSAGE: &str = "stream timed out; reconnect for a fresh snapshot";

/// Snapshot frame sent once per connection, before anything else.
pub fn init_frame(record: &ExecutionRecord) -> Event {
    Event::default()
        .event("init")
        .data(init_payload(record).to_string())
}

/// Live frame for one event record. The payload is the record itself plus
/// the owning execution id, with the timestamp normalized server-side so
/// clients never see an unstamped event.
pub fn event_frame(execution_id: &str, event: &ExecutionEvent) -> Event {
    let stamped = event.clone().stamped();
    let name = stamped.kind.wire_name();
    Event::default()
        .event(name)
        .data(live_payload(execution_id, &stamped).to_string())
}

/// Final frame of a stream. The frame name is the lowercased status, so
/// clients can bind listeners per outcome. Callers only build this once the
/// record is in a terminal status.
pub fn terminal_frame(record: &ExecutionRecord) -> Event {
    Event::default()
        .event(record.status.as_str())
        .data(terminal_payload(record).to_string())
}

/// Sent when the poll budget is exhausted while the execution still runs.
pub fn timeout_frame() -> Event {
    let payload = json!({ "message": TIMEOUT_MESSAGE });
    Event::default().event("timeout").data(payload.to_string())
}

/// Keep-alive comment frame.
pub fn heartbeat_frame() -> Event {
    Event::default().comment(HEARTBEAT_COMMENT)
}

/// Response headers the stream contract requires beyond what [`axum`]'s
/// `Sse` already sets (it owns `Content-Type: text/event-stream`).
/// `X-Accel-Buffering: no` keeps nginx-style proxies from buffering frames.
pub fn apply_stream_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
}

pub(crate) fn init_payload(record: &ExecutionRecord) -> Value {
    json!({
        "type": "init",
        "executionId": record.id,
        "status": record.status,
        "events": record.events,
        "metrics": record.metrics,
        "timestamp": Utc::now(),
    })
}

pub(crate) fn live_payload(execution_id: &str, stamped: &ExecutionEvent) -> Value {
    let mut payload = serde_json::to_value(stamped).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut payload {
        map.insert(
            "executionId".to_string(),
            Value::String(execution_id.to_string()),
        );
    }
    payload
}

pub(crate) fn terminal_payload(record: &ExecutionRecord) -> Value {
    json!({
        "status": record.status,
        "endTime": record.ended_at,
        "duration": record.duration_ms(),
        "totalCost": record.metrics.total_cost,
        "metrics": record.metrics,
        "error": record.error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::execution::ExecutionStatus;

    fn record_with_events() -> ExecutionRecord {
        let mut record = ExecutionRecord::new("exec-42", "user-1");
        record.append(ExecutionEvent::start());
        record.append(ExecutionEvent::token_usage(150, 0.015));
        record
    }

    #[test]
    fn init_payload_carries_snapshot() {
        let record = record_with_events();
        let payload = init_payload(&record);

        assert_eq!(payload["type"], "init");
        assert_eq!(payload["executionId"], "exec-42");
        assert_eq!(payload["events"].as_array().map(Vec::len), Some(2));
        assert_eq!(payload["metrics"]["totalTokens"], 150);
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn live_payload_is_event_plus_execution_id() {
        let event = ExecutionEvent::new(EventKind::NodeProgress)
            .with_node("node-3", "fetch")
            .with_data_field("message", "halfway".into());
        let payload = live_payload("exec-42", &event.stamped());

        assert_eq!(payload["type"], "node-progress");
        assert_eq!(payload["executionId"], "exec-42");
        assert_eq!(payload["nodeId"], "node-3");
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn terminal_payload_reports_outcome() {
        let mut record = record_with_events();
        record.complete(ExecutionStatus::Completed, None);
        let payload = terminal_payload(&record);

        assert_eq!(payload["status"], "completed");
        assert!(payload["endTime"].is_string());
        assert!(payload["duration"].as_i64().is_some());
        assert!((payload["totalCost"].as_f64().unwrap() - 0.015).abs() < 1e-9);
        assert!(payload["error"].is_null());
    }

    #[test]
    fn terminal_payload_keeps_failure_error() {
        let mut record = record_with_events();
        record.complete(ExecutionStatus::Failed, Some("boom".to_string()));
        let payload = terminal_payload(&record);

        assert_eq!(payload["status"], "failed");
        assert_eq!(payload["error"], "boom");
    }

    #[test]
    fn payloads_fit_on_one_data_line() {
        let record = record_with_events();
        for payload in [
            init_payload(&record).to_string(),
            terminal_payload(&record).to_string(),
        ] {
            assert!(!payload.contains('\n'));
        }
    }
}
