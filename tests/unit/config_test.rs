//! Tests for configuration validation

use connector_scheduler::config::{
    DuplicateNamePolicy, PoolConfig, RegistryConfig, SchedulerOptions, ENV_PREFIX,
};
use connector_scheduler::core::PoolKind;
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig::new(4).with_queue_depth(8);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_worker_count() {
    let invalid = PoolConfig::new(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_registry_config_defaults() {
    let cfg = RegistryConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.light.queue_depth >= cfg.light.worker_count);
    assert!(cfg.io.queue_depth >= cfg.io.worker_count);
    assert!(cfg.io.worker_count >= cfg.light.worker_count);
    assert_eq!(cfg.duplicate_names, DuplicateNamePolicy::Reject);
    assert_eq!(cfg.default_stop_timeout(), Duration::from_secs(5));
    assert!(cfg.pool(PoolKind::Custom).is_none());
}

#[test]
fn test_registry_config_invalid_timeout() {
    let mut cfg = RegistryConfig::default();
    cfg.default_stop_timeout_ms = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_registry_config_from_json() {
    let json = r#"{
        "light": { "worker_count": 2, "queue_depth": 0 },
        "io": { "worker_count": 8, "queue_depth": 16 },
        "duplicate_names": "warn",
        "default_stop_timeout_ms": 250
    }"#;
    let cfg = RegistryConfig::from_json_str(json).expect("valid config");
    assert_eq!(cfg.light.worker_count, 2);
    assert_eq!(cfg.io.queue_depth, 16);
    assert_eq!(cfg.duplicate_names, DuplicateNamePolicy::Warn);
    assert_eq!(cfg.default_stop_timeout_ms, 250);

    let bad = r#"{ "light": { "worker_count": 0, "queue_depth": 0 } }"#;
    assert!(RegistryConfig::from_json_str(bad).is_err());
    assert!(RegistryConfig::from_json_str("not json").is_err());
}

#[test]
fn test_registry_config_from_lookup() {
    let vars: HashMap<String, String> = [
        ("LIGHT_WORKERS", "3"),
        ("IO_WORKERS", "5"),
        ("DUPLICATE_NAMES", "Warn"),
        ("STOP_TIMEOUT_MS", "1500"),
    ]
    .into_iter()
    .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
    .collect();

    let cfg = RegistryConfig::from_lookup(|key| vars.get(key).cloned()).expect("valid env");
    assert_eq!(cfg.light.worker_count, 3);
    assert_eq!(cfg.io.worker_count, 5);
    assert_eq!(cfg.duplicate_names, DuplicateNamePolicy::Warn);
    assert_eq!(cfg.default_stop_timeout(), Duration::from_millis(1500));

    let err = RegistryConfig::from_lookup(|key| {
        (key == format!("{ENV_PREFIX}LIGHT_WORKERS")).then(|| "many".to_string())
    })
    .unwrap_err();
    assert!(err.contains("LIGHT_WORKERS"));
}

#[test]
fn test_scheduler_options_validation() {
    assert!(SchedulerOptions::new().validate(PoolKind::Light).is_ok());
    assert!(SchedulerOptions::new().validate(PoolKind::Custom).is_err());
    assert!(SchedulerOptions::new()
        .with_max_concurrent_tasks(0)
        .validate(PoolKind::Custom)
        .is_err());
    assert!(SchedulerOptions::new()
        .with_max_concurrent_tasks(2)
        .validate(PoolKind::Custom)
        .is_ok());
    assert!(SchedulerOptions::new()
        .with_max_concurrent_tasks(2)
        .validate(PoolKind::BlockingIo)
        .is_err());
    assert!(SchedulerOptions::new()
        .with_shutdown_timeout(Duration::ZERO)
        .validate(PoolKind::Light)
        .is_err());
}
