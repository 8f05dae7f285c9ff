//! The subscription task and its handles.
//!
//! [`Subscription`] owns a background task that opens the stream, parses
//! frames, folds them into the shared view, and reconnects on transport
//! drops with doubling backoff. Dropping the handle aborts the task;
//! [`Subscription::disconnect`] shuts it down gracefully.

use futures_util::StreamExt;
use reqwest::header;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, instrument, trace, warn};

use crate::client::sse::{FrameParser, SseFrame};
use crate::client::view::{InitSnapshot, SharedView, StreamUpdate, StreamView, TerminalSummary};
use crate::client::{ClientError, RelayClient};
use crate::config::RetryPolicy;
use crate::event::ExecutionEvent;
use crate::execution::ExecutionStatus;

/// Handle to one live stream subscription.
///
/// Updates arrive on [`Subscription::updates`]; [`Subscription::snapshot`]
/// returns the folded state at any point. The background task keeps running
/// if the updates receiver is ignored, so snapshot-only callers work too.
pub struct Subscription {
    execution_id: String,
    updates: flume::Receiver<StreamUpdate>,
    view: SharedView,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn(client: &RelayClient, execution_id: String) -> Self {
        let url = client.stream_url(&execution_id);
        let (updates_tx, updates_rx) = flume::unbounded();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let view = SharedView::default();

        let task = SubscriptionTask {
            http: client.http().clone(),
            url,
            bearer: client.bearer().map(str::to_string),
            retry: client.retry_policy().clone(),
            execution_id: execution_id.clone(),
            view: view.clone(),
            updates: updates_tx,
        };
        let handle = tokio::spawn(task.run(shutdown_rx));

        Self {
            execution_id,
            updates: updates_rx,
            view,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Live update channel. Reading is optional.
    pub fn updates(&self) -> &flume::Receiver<StreamUpdate> {
        &self.updates
    }

    /// Folded state as of now.
    pub fn snapshot(&self) -> StreamView {
        self.view.snapshot()
    }

    /// True once a terminal frame arrived.
    pub fn is_finished(&self) -> bool {
        self.view.snapshot().finished.is_some()
    }

    /// Stop the task and wait for it to wind down.
    pub async fn disconnect(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let handle = &mut self.handle;
        let _ = handle.await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.abort();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("execution_id", &self.execution_id)
            .field("finished", &self.view.snapshot().finished)
            .finish_non_exhaustive()
    }
}

/// Tracks at most one live subscription, the way a dashboard pane follows
/// whichever execution is currently selected.
#[derive(Debug)]
pub struct Watcher {
    client: RelayClient,
    active: Option<Subscription>,
}

impl Watcher {
    pub fn new(client: RelayClient) -> Self {
        Self {
            client,
            active: None,
        }
    }

    /// Subscribe to `execution_id`, tearing down any previous subscription
    /// first so a stale stream can never feed the current view.
    pub async fn watch(&mut self, execution_id: impl Into<String>) -> &Subscription {
        self.clear().await;
        self.active
            .insert(self.client.subscribe(execution_id.into()))
    }

    /// Drop the current subscription, if any.
    pub async fn clear(&mut self) {
        if let Some(subscription) = self.active.take() {
            subscription.disconnect().await;
        }
    }

    pub fn active(&self) -> Option<&Subscription> {
        self.active.as_ref()
    }
}

/// Why a consume loop returned.
enum StreamEnd {
    /// Terminal frame seen; the subscription is complete.
    Finished,
    /// Shutdown requested by the handle.
    Shutdown,
    /// EOF or transport error before a terminal frame.
    Disconnected,
}

enum FrameOutcome {
    Continue,
    Finished,
}

#[derive(Deserialize)]
struct TimeoutBody {
    #[serde(default)]
    message: String,
}

struct SubscriptionTask {
    http: reqwest::Client,
    url: String,
    bearer: Option<String>,
    retry: RetryPolicy,
    execution_id: String,
    view: SharedView,
    updates: flume::Sender<StreamUpdate>,
}

impl SubscriptionTask {
    #[instrument(skip_all, fields(execution_id = %self.execution_id))]
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut retries: u32 = 0;
        loop {
            match self.open().await {
                Ok(response) => {
                    retries = 0;
                    self.view.set_retries(0);
                    self.view.set_connected(true);
                    let _ = self.updates.send(StreamUpdate::Connected);

                    let ended = self.consume(response, &mut shutdown).await;
                    self.view.set_connected(false);
                    match ended {
                        StreamEnd::Finished | StreamEnd::Shutdown => return,
                        StreamEnd::Disconnected => {}
                    }
                }
                Err(error) => {
                    warn!(%error, "stream open failed");
                }
            }

            if !self.retry.auto_reconnect {
                let _ = self
                    .updates
                    .send(StreamUpdate::Failed(ClientError::ReconnectDisabled));
                return;
            }
            if retries >= self.retry.max_retries {
                let _ = self.updates.send(StreamUpdate::Failed(
                    ClientError::RetriesExhausted { attempts: retries },
                ));
                return;
            }

            let delay = self.retry.backoff_delay(retries);
            retries += 1;
            self.view.set_retries(retries);
            debug!(retry = retries, ?delay, "reconnecting after backoff");
            let _ = self
                .updates
                .send(StreamUpdate::Disconnected { retry_in: delay });

            tokio::select! {
                _ = &mut shutdown => return,
                _ = sleep(delay) => {}
            }
        }
    }

    async fn open(&self) -> reqwest::Result<reqwest::Response> {
        let mut request = self
            .http
            .get(&self.url)
            .header(header::ACCEPT, "text/event-stream");
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        response.error_for_status()
    }

    async fn consume(
        &self,
        response: reqwest::Response,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> StreamEnd {
        let stream = response.bytes_stream();
        futures_util::pin_mut!(stream);
        let mut parser = FrameParser::new();

        loop {
            let chunk = tokio::select! {
                _ = &mut *shutdown => return StreamEnd::Shutdown,
                chunk = stream.next() => chunk,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(error)) => {
                    warn!(%error, "transport error mid-stream");
                    return StreamEnd::Disconnected;
                }
                // EOF without a terminal frame: the relay timed the stream
                // out or died; reconnecting gets a fresh snapshot.
                None => return StreamEnd::Disconnected,
            };
            for frame in parser.push(&bytes) {
                if let FrameOutcome::Finished = self.handle_frame(frame) {
                    return StreamEnd::Finished;
                }
            }
        }
    }

    fn handle_frame(&self, frame: SseFrame) -> FrameOutcome {
        let (event, data) = match frame {
            SseFrame::Comment(text) => {
                trace!(comment = %text, "keep-alive");
                return FrameOutcome::Continue;
            }
            SseFrame::Message { event, data } => (event.unwrap_or_default(), data),
        };

        match event.as_str() {
            "init" => match serde_json::from_str::<InitSnapshot>(&data) {
                Ok(snapshot) => {
                    trace!(
                        execution_id = %snapshot.execution_id,
                        status = %snapshot.status,
                        events = snapshot.events.len(),
                        "snapshot received"
                    );
                    for event in snapshot.events {
                        self.view.append(event.clone());
                        let _ = self.updates.send(StreamUpdate::Event(event));
                    }
                }
                Err(error) => warn!(%error, "malformed init frame, skipping"),
            },
            "timeout" => {
                let message = serde_json::from_str::<TimeoutBody>(&data)
                    .map(|body| body.message)
                    .unwrap_or_default();
                debug!(message = %message, "relay timed the stream out");
                let _ = self.updates.send(StreamUpdate::TimedOut { message });
            }
            name => {
                if let Some(status) = ExecutionStatus::parse(name).filter(|s| s.is_terminal()) {
                    return self.handle_terminal(status, &data);
                }
                match serde_json::from_str::<ExecutionEvent>(&data) {
                    Ok(event) => {
                        self.view.append(event.clone());
                        let _ = self.updates.send(StreamUpdate::Event(event));
                    }
                    Err(error) => warn!(%error, frame = name, "malformed frame, skipping"),
                }
            }
        }
        FrameOutcome::Continue
    }

    fn handle_terminal(&self, status: ExecutionStatus, data: &str) -> FrameOutcome {
        match serde_json::from_str::<TerminalSummary>(data) {
            Ok(summary) => {
                self.view.finish(summary.status);
                let _ = self.updates.send(StreamUpdate::Terminal(summary));
                FrameOutcome::Finished
            }
            Err(error) => {
                // Fall back to the frame name so the outcome still lands.
                warn!(%error, "malformed terminal frame, using frame name");
                self.view.finish(status);
                let _ = self.updates.send(StreamUpdate::Terminal(TerminalSummary {
                    status,
                    end_time: None,
                    duration: None,
                    total_cost: 0.0,
                    metrics: Default::default(),
                    error: None,
                }));
                FrameOutcome::Finished
            }
        }
    }
}
