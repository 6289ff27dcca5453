//! Tests for audit sink

use connector_scheduler::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, TracingAuditSink,
};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("mod-A/cfg-1/poll", AuditAction::Create, Some("custom".to_string()));
    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].scheduler, "mod-A/cfg-1/poll");
    assert_eq!(events[0].owner, "mod-A/cfg-1");
    assert_eq!(events[0].action, AuditAction::Create);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("m/c/a", AuditAction::Create, None));
    sink.record(build_audit_event("m/c/b", AuditAction::Create, None));
    sink.record(build_audit_event("m/c/c", AuditAction::Create, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].scheduler, "m/c/b"); // First one popped
    assert_eq!(events[1].scheduler, "m/c/c");
}

#[test]
fn test_zero_capacity_sink_keeps_nothing() {
    let sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event("m/c/a", AuditAction::Create, None));
    sink.record(build_audit_event("m/c/a", AuditAction::Stop, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_events_for_filters_by_scheduler() {
    let sink = InMemoryAuditSink::new(8);
    sink.record(build_audit_event("m/c/a", AuditAction::Create, None));
    sink.record(build_audit_event("m/c/b", AuditAction::Create, None));
    sink.record(build_audit_event("m/c/a", AuditAction::Stop, None));

    let actions: Vec<_> = sink.events_for("m/c/a").iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Create, AuditAction::Stop]);
}

#[test]
fn test_event_ids_unique_and_serializable() {
    let a = build_audit_event("m/c/a", AuditAction::StopTimeout, Some("2 abandoned".into()));
    let b = build_audit_event("m/c/a", AuditAction::StopTimeout, None);
    assert_ne!(a.event_id, b.event_id);

    let json = serde_json::to_value(&a).expect("serialize");
    assert_eq!(json["action"], "stop_timeout");
    assert_eq!(json["detail"], "2 abandoned");
    assert_eq!(AuditAction::DuplicateName.to_string(), "duplicate_name");

    // Forwarding to tracing never fails, with or without a subscriber.
    TracingAuditSink.record(a);
}
