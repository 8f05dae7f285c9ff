//! Process-wide rendezvous between event producers and live subscribers.
//!
//! The registry is a concurrency-safe map from stream id to the set of open
//! subscriber channels for that id. It fans out: any number of listeners may
//! register for the same stream, and none of them is dropped when another
//! arrives. Entries come and go with their subscribers; `close` tears an
//! entry down eagerly after a terminal event.
//!
//! Delivery through the registry is a same-process latency optimization.
//! Correctness comes from polling persisted state, so a missing entry is an
//! outcome, not an error.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::event::ExecutionEvent;

/// Outcome of a publish attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The event was written to this many live subscriber channels.
    Delivered(usize),
    /// No live channel is registered for the stream id.
    NoSubscribers,
}

impl PublishOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }
}

struct RegistryInner {
    channels: FxHashMap<String, Vec<(u64, flume::Sender<ExecutionEvent>)>>,
    next_token: u64,
}

/// Fan-out map from stream id to subscriber channels.
///
/// Cheap to clone; clones share the same underlying map. The lock is only
/// held for map surgery and non-blocking channel writes, never across an
/// await point.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                channels: FxHashMap::default(),
                next_token: 0,
            })),
        }
    }

    /// Add a subscriber channel for `stream_id` and hand back its receiving
    /// half. The entry is created on first registration; earlier listeners
    /// stay live. Dropping the returned listener removes only its channel.
    pub fn register(&self, stream_id: impl Into<String>) -> RegistryListener {
        let stream_id = stream_id.into();
        let (sender, receiver) = flume::unbounded();
        let token = {
            let mut inner = self.inner.lock();
            let token = inner.next_token;
            inner.next_token += 1;
            inner
                .channels
                .entry(stream_id.clone())
                .or_default()
                .push((token, sender));
            token
        };
        trace!(stream_id = %stream_id, token, "registered subscriber channel");
        RegistryListener {
            stream_id,
            token,
            receiver,
            registry: self.clone(),
        }
    }

    /// Write `event` to every live channel for `stream_id`, stamping a
    /// timestamp if the producer left it empty. Channels whose receiver is
    /// gone are pruned during the write pass; a send failure never reaches
    /// the caller.
    pub fn publish(&self, stream_id: &str, event: ExecutionEvent) -> PublishOutcome {
        let event = event.stamped();
        let mut inner = self.inner.lock();
        let mut delivered = 0;
        let now_empty = match inner.channels.get_mut(stream_id) {
            None => return PublishOutcome::NoSubscribers,
            Some(channels) => {
                channels.retain(|(token, sender)| match sender.send(event.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(_) => {
                        trace!(stream_id, token, "pruned dead subscriber channel");
                        false
                    }
                });
                channels.is_empty()
            }
        };
        if now_empty {
            inner.channels.remove(stream_id);
        }
        if delivered == 0 {
            PublishOutcome::NoSubscribers
        } else {
            PublishOutcome::Delivered(delivered)
        }
    }

    /// Send a terminal `workflow-complete` event to any live channels, then
    /// remove the registry entry.
    pub fn close(&self, stream_id: &str) {
        let removed = self.inner.lock().channels.remove(stream_id);
        if let Some(channels) = removed {
            let event = ExecutionEvent::workflow_complete()
                .with_stream_id(stream_id)
                .stamped();
            for (_, sender) in channels {
                let _ = sender.send(event.clone());
            }
            debug!(stream_id, "closed stream entry");
        }
    }

    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        self.inner
            .lock()
            .channels
            .get(stream_id)
            .map_or(0, Vec::len)
    }

    /// Number of stream ids with at least one registered channel.
    pub fn active_streams(&self) -> usize {
        self.inner.lock().channels.len()
    }

    fn unregister(&self, stream_id: &str, token: u64) {
        let mut inner = self.inner.lock();
        if let Some(channels) = inner.channels.get_mut(stream_id) {
            channels.retain(|(t, _)| *t != token);
            if channels.is_empty() {
                inner.channels.remove(stream_id);
            }
        }
        trace!(stream_id, token, "unregistered subscriber channel");
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of one registered subscriber channel.
///
/// Unregisters itself on drop, so an aborted HTTP connection cleans up its
/// registry slot without any explicit teardown call.
pub struct RegistryListener {
    stream_id: String,
    token: u64,
    receiver: flume::Receiver<ExecutionEvent>,
    registry: StreamRegistry,
}

impl RegistryListener {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn receiver(&self) -> &flume::Receiver<ExecutionEvent> {
        &self.receiver
    }
}

impl Drop for RegistryListener {
    fn drop(&mut self) {
        self.registry.unregister(&self.stream_id, self.token);
    }
}
