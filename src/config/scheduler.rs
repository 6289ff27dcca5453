//! Per-scheduler creation options.

use std::time::Duration;

use crate::core::PoolKind;

/// Options passed to `SchedulerRegistry::create_scheduler`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Worker count of a `Custom` scheduler's exclusive pool. Ignored otherwise.
    pub max_concurrent_tasks: Option<usize>,
    /// Block the submitter until a worker frees instead of failing with `PoolBusy`.
    pub wait_allowed: bool,
    /// Stop timeout applied when the owner stops this scheduler.
    pub shutdown_timeout: Option<Duration>,
    /// Queue depth of a `Custom` scheduler's exclusive pool.
    pub queue_depth: usize,
}

impl SchedulerOptions {
    /// Options with every field at its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count for a custom pool.
    #[must_use]
    pub const fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = Some(n);
        self
    }

    /// Allow submitters to block while the pool is saturated.
    #[must_use]
    pub const fn with_wait_allowed(mut self, wait_allowed: bool) -> Self {
        self.wait_allowed = wait_allowed;
        self
    }

    /// Set the stop timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Set the queue depth for a custom pool.
    #[must_use]
    pub const fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Validate the options against the kind they are used with.
    pub fn validate(&self, kind: PoolKind) -> Result<(), String> {
        match (kind, self.max_concurrent_tasks) {
            (PoolKind::Custom, None) => {
                Err("custom schedulers require max_concurrent_tasks".into())
            }
            (PoolKind::Custom, Some(0)) => {
                Err("max_concurrent_tasks must be greater than 0".into())
            }
            (PoolKind::Custom, Some(_)) => Ok(()),
            (_, Some(_)) => Err(format!(
                "max_concurrent_tasks only applies to custom schedulers, not `{kind}`"
            )),
            (_, None) => Ok(()),
        }?;
        if self.shutdown_timeout == Some(Duration::ZERO) {
            return Err("shutdown_timeout must be greater than 0".into());
        }
        Ok(())
    }
}
