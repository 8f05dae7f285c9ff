//! Persisted execution state backends.
//!
//! The subscriber endpoint polls this interface; the in-process
//! [`crate::relay::EventPublisher`] writes through it. Storage may be
//! mutated by other processes between polls, which is exactly why the
//! endpoint treats it as the source of truth.
//!
//! # Backends
//!
//! - [`MemoryStore`] - volatile storage for tests, demos, and single-process
//!   deployments
//! - [`SqliteStore`] - durable SQLite-backed storage (feature `sqlite`,
//!   enabled by default)

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::event::ExecutionEvent;
use crate::execution::{ExecutionRecord, ExecutionStatus};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("execution not found: {0}")]
    #[diagnostic(
        code(flowrelay::store::not_found),
        help("Create the execution before publishing events to it.")
    )]
    NotFound(String),

    #[error("execution already exists: {0}")]
    #[diagnostic(code(flowrelay::store::duplicate))]
    Duplicate(String),

    #[error("execution {0} already reached a terminal status")]
    #[diagnostic(
        code(flowrelay::store::already_finished),
        help("Executions transition to completed/failed exactly once and are never reused.")
    )]
    AlreadyFinished(String),

    #[error("{0} is not a terminal status")]
    #[diagnostic(code(flowrelay::store::not_terminal))]
    NotTerminal(ExecutionStatus),

    #[error("serialization error: {0}")]
    #[diagnostic(code(flowrelay::store::serde))]
    Serde(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    #[diagnostic(
        code(flowrelay::store::backend),
        help("Ensure the database is reachable and migrated.")
    )]
    Backend(String),
}

/// Durable execution state, scoped reads and exactly-once terminal writes.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a fresh record. Identifiers are never reused, so an existing
    /// id is a [`StoreError::Duplicate`].
    async fn create(&self, record: ExecutionRecord) -> Result<()>;

    /// Owner-scoped lookup. Returns `None` both for unknown ids and for
    /// records owned by someone else, so callers cannot probe existence.
    async fn fetch(&self, id: &str, owner_id: &str) -> Result<Option<ExecutionRecord>>;

    /// Append an event and fold it into the stored metrics. Rejected once
    /// the record is terminal.
    async fn append_event(&self, id: &str, event: ExecutionEvent) -> Result<()>;

    /// Move the record to a terminal status, stamping `ended_at`.
    async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<()>;
}
