//! Producer-facing facade over the store and the registry.
//!
//! Execution logic holds one [`EventPublisher`] per running execution and
//! never touches the registry or the store directly. Persisting the event
//! comes first; the registry write is a same-process wake-up that may find
//! no subscribers at all, which is fine.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{instrument, trace};

use crate::event::ExecutionEvent;
use crate::execution::ExecutionStatus;
use crate::store::{ExecutionStore, StoreError};

use super::registry::{PublishOutcome, StreamRegistry};

#[derive(Debug, Error, Diagnostic)]
pub enum PublishError {
    #[error("failed to persist event for stream {stream_id}")]
    #[diagnostic(
        code(flowrelay::publish::persist),
        help("The execution must exist and still be running to accept events.")
    )]
    Persist {
        stream_id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to finish stream {stream_id}")]
    #[diagnostic(code(flowrelay::publish::finish))]
    Finish {
        stream_id: String,
        #[source]
        source: StoreError,
    },
}

/// Appends events to one execution's stream and closes it.
pub struct EventPublisher {
    stream_id: String,
    registry: StreamRegistry,
    store: Arc<dyn ExecutionStore>,
}

impl EventPublisher {
    pub fn new(
        stream_id: impl Into<String>,
        registry: StreamRegistry,
        store: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            registry,
            store,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Persist the event, then fan it out to same-process subscribers.
    ///
    /// The returned outcome reports registry delivery only; `NoSubscribers`
    /// just means nobody is connected to this process right now. Subscribers
    /// elsewhere still pick the event up from storage on their next poll.
    #[instrument(skip(self, event), fields(stream_id = %self.stream_id), err)]
    pub async fn publish(&self, event: ExecutionEvent) -> Result<PublishOutcome, PublishError> {
        let mut event = event.stamped();
        if event.stream_id.is_none() {
            event.stream_id = Some(self.stream_id.clone());
        }

        self.store
            .append_event(&self.stream_id, event.clone())
            .await
            .map_err(|source| PublishError::Persist {
                stream_id: self.stream_id.clone(),
                source,
            })?;

        let outcome = self.registry.publish(&self.stream_id, event);
        if !outcome.delivered() {
            trace!("no live subscribers in this process");
        }
        Ok(outcome)
    }

    /// Move the execution to a terminal status and close the registry entry,
    /// which sends `workflow-complete` to any live subscribers.
    #[instrument(skip(self, error), fields(stream_id = %self.stream_id, status = %status), err)]
    pub async fn close(
        &self,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), PublishError> {
        self.store
            .finish(&self.stream_id, status, error)
            .await
            .map_err(|source| PublishError::Finish {
                stream_id: self.stream_id.clone(),
                source,
            })?;
        self.registry.close(&self.stream_id);
        Ok(())
    }
}
