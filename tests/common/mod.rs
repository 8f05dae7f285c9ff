#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use flowrelay::client::{FrameParser, SseFrame};
use flowrelay::config::RelayConfig;
use flowrelay::event::ExecutionEvent;
use flowrelay::execution::ExecutionRecord;
use flowrelay::server::{RelayContext, relay_router};
use flowrelay::store::{ExecutionStore, MemoryStore};

pub const OWNER: &str = "user-1";

/// Relay tuned so tests observe polls and timeouts without waiting out
/// production intervals.
pub fn fast_config() -> RelayConfig {
    RelayConfig::default()
        .with_poll_interval(Duration::from_millis(20))
        .with_max_poll_iterations(500)
}

pub fn memory_ctx(config: RelayConfig) -> (RelayContext, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (RelayContext::new(store.clone(), config), store)
}

/// A short run with usage on two providers' worth of work: 150 tokens and
/// 0.015 total cost once folded.
pub fn usage_script() -> Vec<ExecutionEvent> {
    vec![
        ExecutionEvent::start(),
        ExecutionEvent::node_start("n1", "Fetch"),
        ExecutionEvent::token_usage(100, 0.01).with_provider("openai"),
        ExecutionEvent::node_complete("n1", "Fetch"),
        ExecutionEvent::token_usage(50, 0.005).with_provider("openai"),
    ]
}

/// Create a running execution pre-seeded with `events` as its history.
pub async fn seed_running(store: &Arc<MemoryStore>, id: &str, events: Vec<ExecutionEvent>) {
    let mut record = ExecutionRecord::new(id, OWNER).running();
    for event in events {
        record.append(event.stamped());
    }
    store.create(record).await.expect("create execution");
}

/// Relay server on an ephemeral port, torn down on drop.
pub struct TestRelay {
    pub addr: SocketAddr,
    server: JoinHandle<()>,
}

impl TestRelay {
    pub async fn spawn(ctx: RelayContext) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let router = relay_router(ctx);
        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router.into_make_service()).await {
                tracing::error!("test server error: {err:?}");
            }
        });
        Self { addr, server }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stream_url(&self, execution_id: &str) -> String {
        format!("http://{}/executions/{execution_id}/stream", self.addr)
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Frame-at-a-time reader over a live stream response.
pub struct SseReader {
    response: reqwest::Response,
    parser: FrameParser,
    pending: VecDeque<SseFrame>,
}

impl SseReader {
    /// Open the stream and assert it switched to `text/event-stream`.
    pub async fn connect(url: &str, owner: &str) -> Self {
        let response = reqwest::Client::new()
            .get(url)
            .header("x-relay-owner", owner)
            .send()
            .await
            .expect("connect stream");
        assert_eq!(response.status(), 200, "stream should open");
        assert_eq!(
            response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        Self {
            response,
            parser: FrameParser::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next frame, or `None` once the server closed the stream. Panics if
    /// nothing arrives within `wait`.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<SseFrame> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            let chunk = timeout(wait, self.response.chunk())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream transport error");
            match chunk {
                Some(bytes) => self.pending.extend(self.parser.push(&bytes)),
                None => return None,
            }
        }
    }

    /// Next non-comment frame as `(name, payload)`.
    pub async fn next_message(&mut self, wait: Duration) -> Option<(String, serde_json::Value)> {
        loop {
            match self.next_frame(wait).await? {
                SseFrame::Comment(_) => continue,
                SseFrame::Message { event, data } => {
                    let payload = serde_json::from_str(&data).expect("frame payload is JSON");
                    return Some((event.unwrap_or_default(), payload));
                }
            }
        }
    }

    pub async fn expect_closed(&mut self, wait: Duration) {
        assert!(
            self.next_frame(wait).await.is_none(),
            "expected the stream to close"
        );
    }
}
