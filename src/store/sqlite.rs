/*!
SQLite Execution Store

Durable [`ExecutionStore`] backend used when executions must outlive the
process or be shared between a worker process and the relay server.

## Behavior

- Events and metrics are stored as JSON text columns and re-folded in Rust,
  so the schema stays stable while event payloads evolve.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.
- Append and finish run inside a transaction: read, validate the lifecycle
  invariant, write.

## Database Schema

- `executions.id` ← `ExecutionRecord.id`
- `executions.owner_id` ← `ExecutionRecord.owner_id`
- `executions.status` ← lower-case status string
- `executions.events_json` ← JSON array of event records
- `executions.metrics_json` ← folded metrics object
- `executions.started_at` / `ended_at` ← RFC3339 text timestamps
- `executions.error` ← terminal error text, if any
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::event::ExecutionEvent;
use crate::execution::{ExecutionRecord, ExecutionStatus};
use crate::metrics::ExecutionMetrics;

use super::{ExecutionStore, Result, StoreError};

pub struct SqliteStore {
    /// Shared connection pool; clones of the store reuse it.
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish()
    }
}

impl SqliteStore {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: "sqlite://flowrelay.db?mode=rwc"
    #[must_use = "store must be used to persist executions"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("connect error: {e}")))?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(StoreError::Backend(format!("migration failure: {e}")));
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn record_from_row(row: &SqliteRow) -> Result<ExecutionRecord> {
        let status_text: String = row
            .try_get("status")
            .map_err(|e| StoreError::Backend(format!("read status: {e}")))?;
        let status = ExecutionStatus::parse(&status_text)
            .ok_or_else(|| StoreError::Backend(format!("unknown status: {status_text}")))?;
        let events_json: String = row
            .try_get("events_json")
            .map_err(|e| StoreError::Backend(format!("read events: {e}")))?;
        let metrics_json: String = row
            .try_get("metrics_json")
            .map_err(|e| StoreError::Backend(format!("read metrics: {e}")))?;

        Ok(ExecutionRecord {
            id: row
                .try_get("id")
                .map_err(|e| StoreError::Backend(format!("read id: {e}")))?,
            owner_id: row
                .try_get("owner_id")
                .map_err(|e| StoreError::Backend(format!("read owner: {e}")))?,
            status,
            events: serde_json::from_str(&events_json)?,
            metrics: serde_json::from_str(&metrics_json)?,
            started_at: row
                .try_get::<DateTime<Utc>, _>("started_at")
                .map_err(|e| StoreError::Backend(format!("read started_at: {e}")))?,
            ended_at: row
                .try_get::<Option<DateTime<Utc>>, _>("ended_at")
                .map_err(|e| StoreError::Backend(format!("read ended_at: {e}")))?,
            error: row
                .try_get::<Option<String>, _>("error")
                .map_err(|e| StoreError::Backend(format!("read error: {e}")))?,
        })
    }
}

#[async_trait::async_trait]
impl ExecutionStore for SqliteStore {
    #[instrument(skip(self, record), err)]
    async fn create(&self, record: ExecutionRecord) -> Result<()> {
        let events_json = serde_json::to_string(&record.events)?;
        let metrics_json = serde_json::to_string(&record.metrics)?;

        sqlx::query(
            r#"
            INSERT INTO executions (
                id, owner_id, status, events_json, metrics_json,
                started_at, ended_at, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        )
        .bind(&record.id)
        .bind(&record.owner_id)
        .bind(record.status.as_str())
        .bind(&events_json)
        .bind(&metrics_json)
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(&record.error)
        .execute(&*self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(record.id.clone())
            }
            _ => StoreError::Backend(format!("insert execution: {e}")),
        })?;

        Ok(())
    }

    #[instrument(skip(self, owner_id), err)]
    async fn fetch(&self, id: &str, owner_id: &str) -> Result<Option<ExecutionRecord>> {
        let row: Option<SqliteRow> = sqlx::query(
            r#"
            SELECT id, owner_id, status, events_json, metrics_json,
                   started_at, ended_at, error
            FROM executions
            WHERE id = ?1 AND owner_id = ?2
        "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("fetch execution: {e}")))?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    #[instrument(skip(self, event), err)]
    async fn append_event(&self, id: &str, event: ExecutionEvent) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(format!("tx begin: {e}")))?;

        let row: Option<SqliteRow> =
            sqlx::query("SELECT status, events_json, metrics_json FROM executions WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StoreError::Backend(format!("read execution: {e}")))?;
        let row = row.ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let status_text: String = row
            .try_get("status")
            .map_err(|e| StoreError::Backend(format!("read status: {e}")))?;
        let status = ExecutionStatus::parse(&status_text)
            .ok_or_else(|| StoreError::Backend(format!("unknown status: {status_text}")))?;
        if status.is_terminal() {
            return Err(StoreError::AlreadyFinished(id.to_string()));
        }

        let events_json: String = row
            .try_get("events_json")
            .map_err(|e| StoreError::Backend(format!("read events: {e}")))?;
        let metrics_json: String = row
            .try_get("metrics_json")
            .map_err(|e| StoreError::Backend(format!("read metrics: {e}")))?;
        let mut events: Vec<ExecutionEvent> = serde_json::from_str(&events_json)?;
        let mut metrics: ExecutionMetrics = serde_json::from_str(&metrics_json)?;
        metrics.apply(&event);
        events.push(event);

        sqlx::query("UPDATE executions SET events_json = ?1, metrics_json = ?2 WHERE id = ?3")
            .bind(serde_json::to_string(&events)?)
            .bind(serde_json::to_string(&metrics)?)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(format!("update events: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(format!("tx commit: {e}")))?;
        Ok(())
    }

    #[instrument(skip(self, error), err)]
    async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(StoreError::NotTerminal(status));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(format!("tx begin: {e}")))?;

        let row: Option<SqliteRow> = sqlx::query("SELECT status FROM executions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(format!("read execution: {e}")))?;
        let row = row.ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let status_text: String = row
            .try_get("status")
            .map_err(|e| StoreError::Backend(format!("read status: {e}")))?;
        let current = ExecutionStatus::parse(&status_text)
            .ok_or_else(|| StoreError::Backend(format!("unknown status: {status_text}")))?;
        if current.is_terminal() {
            return Err(StoreError::AlreadyFinished(id.to_string()));
        }

        sqlx::query("UPDATE executions SET status = ?1, ended_at = ?2, error = ?3 WHERE id = ?4")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(&error)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(format!("update status: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(format!("tx commit: {e}")))?;
        Ok(())
    }
}
