//! # Flowrelay: Execution Event Relay
//!
//! Flowrelay streams workflow execution progress to subscribers over
//! Server-Sent Events. Executions publish typed events as they run; the
//! relay persists them, folds usage metrics, and replays live streams to any
//! number of HTTP subscribers with snapshot-then-tail semantics.
//!
//! ## Core Concepts
//!
//! - **Events**: Typed progress records (`start`, `node-complete`,
//!   `token-usage-update`, ...) carrying a free-form data map
//! - **Store**: Persistent execution records, the single source every
//!   stream forwards from
//! - **Registry**: In-process fan-out that wakes subscriber streams the
//!   moment a publish lands
//! - **Server**: The `GET /executions/{id}/stream` endpoint with init
//!   snapshot, live tail, heartbeats, and a bounded poll budget
//! - **Client**: A reconnecting subscriber with doubling backoff and a
//!   foldable stream view
//!
//! ## Quick Start
//!
//! ### Events and Metrics
//!
//! ```
//! use flowrelay::event::ExecutionEvent;
//! use flowrelay::metrics::ExecutionMetrics;
//!
//! let events = vec![
//!     ExecutionEvent::start(),
//!     ExecutionEvent::node_complete("n1", "Fetch"),
//!     ExecutionEvent::token_usage(150, 0.015),
//! ];
//!
//! let metrics = ExecutionMetrics::from_events(&events);
//! assert_eq!(metrics.total_tokens, 150);
//! ```
//!
//! ### Serving Streams
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use flowrelay::config::RelayConfig;
//! use flowrelay::server::{RelayContext, relay_router};
//! use flowrelay::store::MemoryStore;
//! use miette::IntoDiagnostic;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = RelayConfig::from_env();
//!     let ctx = RelayContext::new(Arc::new(MemoryStore::new()), config.clone());
//!
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr)
//!         .await
//!         .into_diagnostic()?;
//!     axum::serve(listener, relay_router(ctx).into_make_service())
//!         .await
//!         .into_diagnostic()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Subscribing
//!
//! ```no_run
//! use flowrelay::client::{RelayClient, StreamUpdate};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = RelayClient::new("http://localhost:3000").with_bearer("user-1");
//!     let subscription = client.subscribe("exec-42");
//!
//!     while let Ok(update) = subscription.updates().recv_async().await {
//!         match update {
//!             StreamUpdate::Terminal(summary) => {
//!                 println!("finished: {}", summary.status);
//!                 break;
//!             }
//!             other => println!("{other:?}"),
//!         }
//!     }
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`event`] - Event kinds, records, and wire names
//! - [`metrics`] - Usage counters folded from events
//! - [`execution`] - Execution records and status lifecycle
//! - [`config`] - Relay configuration and client retry policy
//! - [`relay`] - In-process registry and the publisher facade
//! - [`store`] - Persistence backends (in-memory and SQLite)
//! - [`server`] - HTTP endpoint, auth, and wire framing
//! - [`client`] - Reconnecting subscriber client

pub mod client;
pub mod config;
pub mod event;
pub mod execution;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod store;
