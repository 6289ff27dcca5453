//! Builder to construct a scheduler registry from configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DuplicateNamePolicy, PoolConfig, RegistryConfig};
use crate::core::{AuditSink, PoolKind, SchedulerError, SchedulerRegistry};

/// Step-wise registry construction. Starts from [`RegistryConfig::default`].
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl RegistryBuilder {
    /// Builder with CPU-derived defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder starting from an existing configuration.
    #[must_use]
    pub fn from_config(config: RegistryConfig) -> Self {
        Self { config, audit: None }
    }

    /// Replace the sizing of one shared pool. Ignored for `Custom`.
    #[must_use]
    pub fn with_pool(mut self, kind: PoolKind, pool: PoolConfig) -> Self {
        match kind {
            PoolKind::Light => self.config.light = pool,
            PoolKind::Intensive => self.config.intensive = pool,
            PoolKind::BlockingIo => self.config.io = pool,
            PoolKind::Custom => {}
        }
        self
    }

    /// Behaviour on duplicate active names.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicateNamePolicy) -> Self {
        self.config.duplicate_names = policy;
        self
    }

    /// Stop timeout for schedulers without their own.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_stop_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Record registry events into `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Configuration as built so far.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Validate and start the registry.
    ///
    /// # Errors
    ///
    /// See [`SchedulerRegistry::new`].
    pub fn build(self) -> Result<SchedulerRegistry, SchedulerError> {
        SchedulerRegistry::new_with(self.config, self.audit)
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}
