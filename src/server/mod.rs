//! HTTP surface of the relay.
//!
//! Handlers get everything through [`RelayContext`], a cloneable bundle of
//! registry, store, and config owned by the server process and injected via
//! router state. Nothing in here reaches for process-global state.

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::config::RelayConfig;
use crate::relay::{EventPublisher, StreamRegistry};
use crate::store::ExecutionStore;

pub mod auth;
pub mod sse;
pub mod stream;

pub use auth::OwnerId;
pub use stream::subscribe_execution;

/// Shared handler state: one registry, one store, one config, all owned by
/// whoever built the router and torn down with it.
#[derive(Clone)]
pub struct RelayContext {
    pub registry: StreamRegistry,
    pub store: Arc<dyn ExecutionStore>,
    pub config: RelayConfig,
}

impl RelayContext {
    pub fn new(store: Arc<dyn ExecutionStore>, config: RelayConfig) -> Self {
        Self {
            registry: StreamRegistry::new(),
            store,
            config,
        }
    }

    /// Publisher for one execution's stream, wired to this context's
    /// registry and store. Execution logic should hold one per run.
    pub fn publisher(&self, stream_id: impl Into<String>) -> EventPublisher {
        EventPublisher::new(stream_id, self.registry.clone(), self.store.clone())
    }
}

/// Routes for the relay.
pub fn relay_router(ctx: RelayContext) -> Router {
    Router::new()
        .route("/executions/{id}/stream", get(stream::subscribe_execution))
        .with_state(ctx)
}
