use flowrelay::event::{EventKind, ExecutionEvent};
use flowrelay::relay::{PublishOutcome, StreamRegistry};

#[test]
fn fan_out_delivers_to_every_listener() {
    let registry = StreamRegistry::new();
    let first = registry.register("exec-1");
    let second = registry.register("exec-1");

    let outcome = registry.publish("exec-1", ExecutionEvent::progress("tick"));
    assert_eq!(outcome, PublishOutcome::Delivered(2));

    for listener in [&first, &second] {
        let event = listener.receiver().try_recv().expect("event delivered");
        assert_eq!(event.kind, EventKind::Progress);
    }
}

#[test]
fn registering_twice_keeps_earlier_listener() {
    let registry = StreamRegistry::new();
    let _first = registry.register("exec-1");
    assert_eq!(registry.subscriber_count("exec-1"), 1);

    let _second = registry.register("exec-1");
    assert_eq!(registry.subscriber_count("exec-1"), 2);
}

#[test]
fn publish_without_subscribers_reports_no_delivery() {
    let registry = StreamRegistry::new();
    let outcome = registry.publish("exec-unknown", ExecutionEvent::start());
    assert_eq!(outcome, PublishOutcome::NoSubscribers);
    assert!(!outcome.delivered());
}

#[test]
fn dropped_listener_unregisters_its_channel() {
    let registry = StreamRegistry::new();
    let first = registry.register("exec-1");
    let second = registry.register("exec-1");

    drop(first);
    assert_eq!(registry.subscriber_count("exec-1"), 1);

    drop(second);
    assert_eq!(registry.subscriber_count("exec-1"), 0);
    assert_eq!(registry.active_streams(), 0);
}

#[test]
fn close_notifies_listeners_then_clears_entry() {
    let registry = StreamRegistry::new();
    let listener = registry.register("exec-1");

    registry.close("exec-1");

    let event = listener.receiver().try_recv().expect("close notification");
    assert_eq!(event.kind, EventKind::WorkflowComplete);
    assert_eq!(event.stream_id.as_deref(), Some("exec-1"));
    assert!(event.timestamp.is_some());

    assert_eq!(registry.subscriber_count("exec-1"), 0);
    let outcome = registry.publish("exec-1", ExecutionEvent::progress("late"));
    assert_eq!(outcome, PublishOutcome::NoSubscribers);
}

#[test]
fn close_without_entry_is_a_no_op() {
    let registry = StreamRegistry::new();
    registry.close("exec-never-registered");
    assert_eq!(registry.active_streams(), 0);
}

#[test]
fn publish_stamps_missing_timestamp() {
    let registry = StreamRegistry::new();
    let listener = registry.register("exec-1");

    registry.publish("exec-1", ExecutionEvent::start());
    let event = listener.receiver().try_recv().expect("event delivered");
    assert!(event.timestamp.is_some());
}

#[test]
fn publish_keeps_producer_timestamp() {
    let registry = StreamRegistry::new();
    let listener = registry.register("exec-1");

    let stamped_at = chrono::Utc::now() - chrono::Duration::seconds(60);
    registry.publish("exec-1", ExecutionEvent::start().with_timestamp(stamped_at));

    let event = listener.receiver().try_recv().expect("event delivered");
    assert_eq!(event.timestamp, Some(stamped_at));
}

#[test]
fn streams_are_isolated_by_id() {
    let registry = StreamRegistry::new();
    let one = registry.register("exec-1");
    let two = registry.register("exec-2");

    registry.publish("exec-1", ExecutionEvent::progress("only for one"));

    assert!(one.receiver().try_recv().is_ok());
    assert!(two.receiver().try_recv().is_err());
}

#[test]
fn events_arrive_in_publish_order() {
    let registry = StreamRegistry::new();
    let listener = registry.register("exec-1");

    for i in 0..5 {
        registry.publish("exec-1", ExecutionEvent::progress(format!("step {i}")));
    }

    let received: Vec<String> = listener
        .receiver()
        .drain()
        .filter_map(|event| event.message().map(str::to_string))
        .collect();
    assert_eq!(
        received,
        vec!["step 0", "step 1", "step 2", "step 3", "step 4"]
    );
}
