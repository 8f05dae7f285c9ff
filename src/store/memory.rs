//! Volatile in-memory execution store.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::event::ExecutionEvent;
use crate::execution::{ExecutionRecord, ExecutionStatus};

use super::{ExecutionStore, Result, StoreError};

/// Keeps everything in a process-local map. Reads clone the record out, so
/// the lock is released before any caller awaits.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<FxHashMap<String, ExecutionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.len())
            .finish()
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create(&self, record: ExecutionRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn fetch(&self, id: &str, owner_id: &str) -> Result<Option<ExecutionRecord>> {
        let records = self.records.read();
        Ok(records
            .get(id)
            .filter(|record| record.owner_id == owner_id)
            .cloned())
    }

    async fn append_event(&self, id: &str, event: ExecutionEvent) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.status.is_terminal() {
            return Err(StoreError::AlreadyFinished(id.to_string()));
        }
        record.append(event);
        Ok(())
    }

    async fn finish(
        &self,
        id: &str,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(StoreError::NotTerminal(status));
        }
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.status.is_terminal() {
            return Err(StoreError::AlreadyFinished(id.to_string()));
        }
        record.complete(status, error);
        Ok(())
    }
}
