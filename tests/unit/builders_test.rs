//! Tests for builder modules

use connector_scheduler::builders::RegistryBuilder;
use connector_scheduler::config::{DuplicateNamePolicy, PoolConfig, RegistryConfig};
use connector_scheduler::core::{PoolKind, SchedulerError};
use std::time::Duration;

#[test]
fn test_registry_builder_overrides() {
    let builder = RegistryBuilder::new()
        .with_pool(PoolKind::Light, PoolConfig::new(1))
        .with_pool(PoolKind::Custom, PoolConfig::new(99))
        .with_duplicate_policy(DuplicateNamePolicy::Warn)
        .with_stop_timeout(Duration::from_millis(750));

    let cfg = builder.config();
    assert_eq!(cfg.light.worker_count, 1);
    assert_eq!(cfg.duplicate_names, DuplicateNamePolicy::Warn);
    assert_eq!(cfg.default_stop_timeout_ms, 750);

    let registry = builder.build().expect("registry");
    assert_eq!(registry.config().light.worker_count, 1);
    assert_eq!(registry.pool_stats(PoolKind::Light).map(|s| s.worker_count), Some(1));
    registry.shutdown(Duration::from_secs(1));
}

#[test]
fn test_registry_builder_rejects_invalid_config() {
    let mut cfg = RegistryConfig::default();
    cfg.io.worker_count = 0;
    let err = RegistryBuilder::from_config(cfg).build().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}
