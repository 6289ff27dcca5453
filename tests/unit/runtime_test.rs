//! Tests for the diagnostics surface

use connector_scheduler::config::{PoolConfig, RegistryConfig};
use connector_scheduler::core::{SchedulerRegistry, SchedulerState};
use connector_scheduler::runtime::{health, snapshot, snapshot_json};
use std::time::Duration;

fn small_registry() -> SchedulerRegistry {
    let mut cfg = RegistryConfig::default();
    cfg.light = PoolConfig::new(1);
    cfg.intensive = PoolConfig::new(1).with_queue_depth(2);
    cfg.io = PoolConfig::new(1);
    SchedulerRegistry::new(cfg).expect("registry")
}

#[test]
fn test_snapshot_lists_pools_and_schedulers() {
    let registry = small_registry();
    registry.cpu_light_scheduler("mod-A/cfg-1/a").expect("light");
    registry.custom_scheduler("mod-A/cfg-1/b", 2).expect("custom");
    registry.io_scheduler("mod-B/cfg-1/a").expect("io");

    let snap = snapshot(&registry);
    assert_eq!(snap.pools.len(), 3);
    assert_eq!(snap.schedulers.len(), 3);
    assert_eq!(snap.schedulers_of("mod-A/cfg-1").len(), 2);
    assert!(snap.schedulers.iter().all(|s| s.state == SchedulerState::Running));
    assert!(!snap.shutdown);

    let json = snapshot_json(&registry).expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(value["schedulers"].as_array().map(Vec::len), Some(3));
    assert_eq!(registry.snapshot().schedulers.len(), 3);

    registry.shutdown(Duration::from_secs(1));
}

#[test]
fn test_health_follows_shutdown() {
    let registry = small_registry();
    registry.cpu_light_scheduler("mod-A/cfg-1/a").expect("light");
    let before = health(&registry);
    assert!(before.ok);
    assert_eq!(before.active_schedulers, 1);

    registry.shutdown(Duration::from_secs(1));
    let after = health(&registry);
    assert!(!after.ok);
    assert_eq!(after.active_schedulers, 0);
}
