//! Tests for utility functions

use connector_scheduler::core::{owner_of, PoolKind, SchedulerName};
use connector_scheduler::util::{init_tracing, now_ms};

#[test]
fn test_scheduler_name_parts() {
    let name = SchedulerName::new("mod-A", "cfg-1", "validation");
    assert_eq!(name.to_string(), "mod-A/cfg-1/validation");
    assert_eq!(name.owner(), "mod-A/cfg-1");
    assert_eq!(SchedulerName::parse("mod-A/cfg-1/validation"), Some(name));
    assert_eq!(SchedulerName::parse("mod-A/cfg-1"), None);
}

#[test]
fn test_owner_of() {
    assert_eq!(owner_of("mod-A/cfg-1/poll/fast"), "mod-A/cfg-1");
    assert_eq!(owner_of("mod-A/poll"), "mod-A");
    assert_eq!(owner_of("standalone"), "");
}

#[test]
fn test_pool_kind_prefixes() {
    assert_eq!(PoolKind::Light.thread_prefix(), "cpu-light");
    assert_eq!(PoolKind::BlockingIo.to_string(), "io");
    assert!(PoolKind::SHARED.iter().all(|k| k.is_shared()));
    assert!(!PoolKind::Custom.is_shared());
}

#[test]
fn test_clock_and_tracing() {
    let before = now_ms();
    init_tracing();
    // A second call keeps the first subscriber.
    init_tracing();
    assert!(now_ms() >= before);
}
