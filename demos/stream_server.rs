//! Demo: serve execution event streams over SSE.
//!
//! Starts a relay backed by the in-memory store, drives one scripted
//! execution through a handful of node and token-usage events, and serves
//! its stream. Connect while the execution runs to watch the live tail, or
//! after it finishes to see the snapshot-plus-terminal replay.
//!
//! Run with:
//!   cargo run --example stream_server
//!
//! Then, in another terminal:
//!   curl -N -H 'X-Relay-Owner: demo-user' \
//!     http://127.0.0.1:3000/executions/exec-demo/stream

use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, time::sleep};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use flowrelay::{
    config::RelayConfig,
    event::ExecutionEvent,
    execution::{ExecutionRecord, ExecutionStatus},
    relay::EventPublisher,
    server::{RelayContext, relay_router},
    store::{ExecutionStore, MemoryStore},
};

const EXECUTION_ID: &str = "exec-demo";
const OWNER: &str = "demo-user";

/// Scripted workflow run: a couple of nodes, some usage, then completion.
async fn drive_execution(publisher: EventPublisher) {
    let script = [
        ExecutionEvent::start(),
        ExecutionEvent::node_start("fetch", "Fetch Data"),
        ExecutionEvent::progress("fetching upstream records"),
        ExecutionEvent::node_complete("fetch", "Fetch Data"),
        ExecutionEvent::node_start("summarize", "Summarize"),
        ExecutionEvent::token_usage(150, 0.015).with_provider("openai"),
        ExecutionEvent::node_complete("summarize", "Summarize"),
        ExecutionEvent::workflow_complete(),
    ];

    for event in script {
        sleep(Duration::from_millis(800)).await;
        if let Err(err) = publisher.publish(event).await {
            tracing::error!("publish failed: {err}");
            return;
        }
    }

    if let Err(err) = publisher.close(ExecutionStatus::Completed, None).await {
        tracing::error!("close failed: {err}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = RelayConfig::from_env();
    let store = Arc::new(MemoryStore::new());
    store
        .create(ExecutionRecord::new(EXECUTION_ID, OWNER).running())
        .await?;

    let ctx = RelayContext::new(store, config.clone());
    tokio::spawn(drive_execution(ctx.publisher(EXECUTION_ID)));

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        "Streaming http://{}/executions/{EXECUTION_ID}/stream (owner: {OWNER})",
        config.bind_addr
    );
    axum::serve(listener, relay_router(ctx).into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
