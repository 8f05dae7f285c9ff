use flowrelay::event::ExecutionEvent;
use flowrelay::execution::{ExecutionRecord, ExecutionStatus};
use flowrelay::store::{ExecutionStore, MemoryStore, StoreError};

mod common;
use common::{OWNER, usage_script};

#[tokio::test]
async fn create_then_fetch_roundtrip() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER).running())
        .await
        .expect("create");

    let record = store
        .fetch("exec-1", OWNER)
        .await
        .expect("fetch")
        .expect("record exists");
    assert_eq!(record.id, "exec-1");
    assert_eq!(record.status, ExecutionStatus::Running);
    assert!(record.events.is_empty());
    assert!(record.ended_at.is_none());
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER))
        .await
        .expect("first create");

    let err = store
        .create(ExecutionRecord::new("exec-1", "someone-else"))
        .await
        .expect_err("duplicate id");
    assert!(matches!(err, StoreError::Duplicate(id) if id == "exec-1"));
}

#[tokio::test]
async fn fetch_is_owner_scoped() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER))
        .await
        .expect("create");

    let foreign = store.fetch("exec-1", "intruder").await.expect("fetch");
    assert!(foreign.is_none(), "foreign owner must not see the record");

    let missing = store.fetch("exec-unknown", OWNER).await.expect("fetch");
    assert!(missing.is_none());
}

#[tokio::test]
async fn append_folds_metrics_incrementally() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER).running())
        .await
        .expect("create");

    for event in usage_script() {
        store.append_event("exec-1", event).await.expect("append");
    }

    let record = store
        .fetch("exec-1", OWNER)
        .await
        .expect("fetch")
        .expect("record exists");
    assert_eq!(record.events.len(), 5);
    assert_eq!(record.metrics.total_tokens, 150);
    assert!((record.metrics.total_cost - 0.015).abs() < 1e-9);
    assert!((record.metrics.cost_by_provider["openai"] - 0.015).abs() < 1e-9);
}

#[tokio::test]
async fn append_to_unknown_execution_fails() {
    let store = MemoryStore::new();
    let err = store
        .append_event("exec-ghost", ExecutionEvent::start())
        .await
        .expect_err("unknown id");
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn finish_stamps_terminal_state() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER).running())
        .await
        .expect("create");

    store
        .finish("exec-1", ExecutionStatus::Failed, Some("node exploded".into()))
        .await
        .expect("finish");

    let record = store
        .fetch("exec-1", OWNER)
        .await
        .expect("fetch")
        .expect("record exists");
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.error.as_deref(), Some("node exploded"));
    assert!(record.ended_at.is_some());
    assert!(record.duration_ms().is_some());
}

#[tokio::test]
async fn finish_requires_terminal_status() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER).running())
        .await
        .expect("create");

    let err = store
        .finish("exec-1", ExecutionStatus::Running, None)
        .await
        .expect_err("running is not terminal");
    assert!(matches!(err, StoreError::NotTerminal(_)));
}

#[tokio::test]
async fn terminal_records_reject_further_writes() {
    let store = MemoryStore::new();
    store
        .create(ExecutionRecord::new("exec-1", OWNER).running())
        .await
        .expect("create");
    store
        .finish("exec-1", ExecutionStatus::Completed, None)
        .await
        .expect("finish");

    let append_err = store
        .append_event("exec-1", ExecutionEvent::progress("too late"))
        .await
        .expect_err("append after finish");
    assert!(matches!(append_err, StoreError::AlreadyFinished(_)));

    let finish_err = store
        .finish("exec-1", ExecutionStatus::Failed, None)
        .await
        .expect_err("second finish");
    assert!(matches!(finish_err, StoreError::AlreadyFinished(_)));
}
