//! Process-wide scheduler registry.
//!
//! The registry owns one shared worker pool per shared [`PoolKind`] and creates
//! named schedulers on top of them. Custom schedulers get an exclusive pool sized
//! by their `max_concurrent_tasks`. Every active scheduler is tracked so
//! diagnostics can list what each owner still has running.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{DuplicateNamePolicy, PoolConfig, RegistryConfig, SchedulerOptions};
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::lifecycle::{stop_all, StopReport};
use crate::core::scheduler::{PoolBinding, SchedulerHandle, SchedulerInfo};
use crate::core::worker_pool::{PoolStats, WorkerPool};
use crate::core::{PoolKind, SchedulerError};
use crate::runtime::api::RegistrySnapshot;

struct RegistryInner {
    config: RegistryConfig,
    pools: HashMap<PoolKind, Arc<WorkerPool>>,
    schedulers: RwLock<Vec<SchedulerHandle>>,
    audit: Option<Arc<dyn AuditSink>>,
    shutdown: AtomicBool,
}

/// Creates and tracks schedulers. Clones share the same registry.
#[derive(Clone)]
pub struct SchedulerRegistry {
    inner: Arc<RegistryInner>,
}

impl SchedulerRegistry {
    /// Build a registry and start its shared pools.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if `config` fails validation,
    /// `SchedulerError::Internal` if a worker thread cannot be spawned.
    pub fn new(config: RegistryConfig) -> Result<Self, SchedulerError> {
        Self::new_with(config, None)
    }

    /// Registry with default sizing derived from the CPU count.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_defaults() -> Result<Self, SchedulerError> {
        Self::new(RegistryConfig::default())
    }

    pub(crate) fn new_with(
        config: RegistryConfig,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let mut pools = HashMap::new();
        for kind in PoolKind::SHARED {
            let Some(pool_config) = config.pool(kind) else {
                continue;
            };
            let pool = WorkerPool::new(kind.thread_prefix(), pool_config.clone())?;
            pools.insert(kind, Arc::new(pool));
        }

        info!(
            light = config.light.worker_count,
            intensive = config.intensive.worker_count,
            io = config.io.worker_count,
            duplicate_names = ?config.duplicate_names,
            "Scheduler registry started"
        );

        Ok(Self {
            inner: Arc::new(RegistryInner {
                config,
                pools,
                schedulers: RwLock::new(Vec::new()),
                audit,
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Create a named scheduler of `kind`.
    ///
    /// Names conventionally follow `module/config/purpose`; the prefix is used to
    /// group schedulers by owner.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if `options` do not fit `kind`
    /// - `SchedulerError::DuplicateName` if an active scheduler uses the name and
    ///   the policy is `Reject`
    /// - `SchedulerError::Rejected` after [`shutdown`](Self::shutdown)
    /// - `SchedulerError::Internal` if a custom pool cannot spawn its workers
    pub fn create_scheduler(
        &self,
        kind: PoolKind,
        name: impl Into<String>,
        options: SchedulerOptions,
    ) -> Result<SchedulerHandle, SchedulerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig("scheduler name must not be empty".into()));
        }
        options.validate(kind).map_err(SchedulerError::InvalidConfig)?;
        if self.is_shutdown() {
            return Err(SchedulerError::Rejected(name));
        }

        // Spawned before locking so lookups are not blocked on thread startup. A
        // pool that ends up unused exits when dropped.
        let binding = match self.inner.pools.get(&kind) {
            Some(pool) => PoolBinding::Shared(Arc::clone(pool)),
            None => {
                let workers = options.max_concurrent_tasks.unwrap_or(1);
                let config = PoolConfig::new(workers).with_queue_depth(options.queue_depth);
                PoolBinding::Exclusive(WorkerPool::new(name.as_str(), config)?)
            }
        };

        // Held across the duplicate check and the insert.
        let mut schedulers = self.inner.schedulers.write();
        if self.is_shutdown() {
            return Err(SchedulerError::Rejected(name));
        }
        schedulers.retain(|s| !s.is_stopped());

        if schedulers.iter().any(|s| s.name() == name) {
            let policy = self.inner.config.duplicate_names;
            self.record(&name, AuditAction::DuplicateName, Some(format!("{policy:?}")));
            match policy {
                DuplicateNamePolicy::Reject => {
                    warn!(scheduler = %name, "Duplicate scheduler name rejected");
                    return Err(SchedulerError::DuplicateName(name));
                }
                DuplicateNamePolicy::Warn => {
                    warn!(scheduler = %name, "Duplicate scheduler name; creating anyway");
                }
            }
        }

        let handle = SchedulerHandle::new(
            name,
            kind,
            options,
            binding,
            self.inner.config.default_stop_timeout(),
            self.inner.audit.clone(),
        );
        handle.mark_running();
        handle.record(AuditAction::Create, Some(kind.to_string()));
        info!(
            scheduler = %handle.name(),
            kind = %kind,
            max_concurrent_tasks = ?handle.max_concurrent_tasks(),
            "Scheduler created"
        );
        schedulers.push(handle.clone());
        Ok(handle)
    }

    /// `Light` scheduler with default options.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn cpu_light_scheduler(&self, name: impl Into<String>) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(PoolKind::Light, name, SchedulerOptions::new())
    }

    /// `Intensive` scheduler with default options.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn cpu_intensive_scheduler(
        &self,
        name: impl Into<String>,
    ) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(PoolKind::Intensive, name, SchedulerOptions::new())
    }

    /// `BlockingIo` scheduler with default options.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn io_scheduler(&self, name: impl Into<String>) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(PoolKind::BlockingIo, name, SchedulerOptions::new())
    }

    /// `Custom` scheduler with `max_concurrent_tasks` exclusive workers.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn custom_scheduler(
        &self,
        name: impl Into<String>,
        max_concurrent_tasks: usize,
    ) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(
            PoolKind::Custom,
            name,
            SchedulerOptions::new().with_max_concurrent_tasks(max_concurrent_tasks),
        )
    }

    /// Active scheduler with `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SchedulerHandle> {
        self.inner
            .schedulers
            .read()
            .iter()
            .find(|s| s.name() == name && !s.is_stopped())
            .cloned()
    }

    /// Every scheduler not yet stopped.
    #[must_use]
    pub fn active_schedulers(&self) -> Vec<SchedulerInfo> {
        self.inner
            .schedulers
            .read()
            .iter()
            .filter(|s| !s.is_stopped())
            .map(SchedulerHandle::info)
            .collect()
    }

    /// Active schedulers whose name starts with the `owner` prefix (`module/config`).
    #[must_use]
    pub fn active_schedulers_of(&self, owner: &str) -> Vec<SchedulerInfo> {
        self.inner
            .schedulers
            .read()
            .iter()
            .filter(|s| !s.is_stopped() && s.owner() == owner)
            .map(SchedulerHandle::info)
            .collect()
    }

    /// Number of active schedulers of `owner`.
    #[must_use]
    pub fn active_count_of(&self, owner: &str) -> usize {
        self.active_schedulers_of(owner).len()
    }

    /// Counters of the shared pool behind `kind`; `None` for `Custom`.
    #[must_use]
    pub fn pool_stats(&self, kind: PoolKind) -> Option<PoolStats> {
        self.inner.pools.get(&kind).map(|pool| pool.stats())
    }

    /// Serializable view of pools and active schedulers.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        crate::runtime::api::snapshot(self)
    }

    /// Configuration the registry was built with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stop every active scheduler, then the shared pools.
    ///
    /// `timeout` applies to each scheduler and to each pool. Idempotent: later
    /// calls return an empty report.
    pub fn shutdown(&self, timeout: Duration) -> StopReport {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            debug!("Scheduler registry already shut down");
            return StopReport::default();
        }

        let handles = std::mem::take(&mut *self.inner.schedulers.write());
        let active: Vec<SchedulerHandle> = handles.into_iter().filter(|s| !s.is_stopped()).collect();
        info!(active = active.len(), "Shutting down scheduler registry");
        let report = stop_all(&active, Some(timeout));

        for kind in PoolKind::SHARED {
            if let Some(pool) = self.inner.pools.get(&kind) {
                let detached = pool.shutdown(timeout);
                if detached > 0 {
                    warn!(pool = %kind, detached, "Shared pool workers did not exit in time");
                }
            }
        }

        info!(
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            "Scheduler registry shut down"
        );
        report
    }

    fn record(&self, name: &str, action: AuditAction, detail: Option<String>) {
        if let Some(audit) = &self.inner.audit {
            audit.record(build_audit_event(name, action, detail));
        }
    }
}

impl fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerRegistry")
            .field("schedulers", &self.inner.schedulers.read().len())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RegistryConfig {
        RegistryConfig {
            light: PoolConfig::new(2),
            intensive: PoolConfig::new(2).with_queue_depth(4),
            io: PoolConfig::new(2).with_queue_depth(4),
            duplicate_names: DuplicateNamePolicy::Reject,
            default_stop_timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_duplicate_name_rejected_while_active() {
        let registry = SchedulerRegistry::new(small_config()).unwrap();
        let first = registry.cpu_light_scheduler("m/c/p").unwrap();
        assert_eq!(
            registry.cpu_light_scheduler("m/c/p").unwrap_err(),
            SchedulerError::DuplicateName("m/c/p".into())
        );

        first.stop_default().unwrap();
        // The name is free again once the holder stopped.
        assert!(registry.cpu_light_scheduler("m/c/p").is_ok());
        registry.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_lookup_not_blocked_by_custom_pool_startup() {
        let registry = SchedulerRegistry::new(small_config()).unwrap();
        registry.cpu_light_scheduler("m/c/light").unwrap();

        let creator = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                (0..20)
                    .map(|i| registry.custom_scheduler(format!("m/c/custom-{i}"), 4).is_ok())
                    .all(|ok| ok)
            })
        };
        for _ in 0..20 {
            assert!(registry.lookup("m/c/light").is_some());
        }
        assert!(creator.join().unwrap());
        assert_eq!(registry.active_count_of("m/c"), 21);

        // A rejected duplicate leaves nothing behind.
        assert!(matches!(
            registry.custom_scheduler("m/c/custom-0", 2),
            Err(SchedulerError::DuplicateName(_))
        ));
        assert_eq!(registry.active_count_of("m/c"), 21);
        assert!(registry.shutdown(Duration::from_secs(2)).is_clean());
    }

    #[test]
    fn test_duplicate_name_warn_policy() {
        let mut config = small_config();
        config.duplicate_names = DuplicateNamePolicy::Warn;
        let registry = SchedulerRegistry::new(config).unwrap();
        let a = registry.io_scheduler("m/c/p").unwrap();
        let b = registry.io_scheduler("m/c/p").unwrap();
        assert!(!a.same_scheduler(&b));
        assert_eq!(registry.active_count_of("m/c"), 2);
        registry.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_options() {
        let registry = SchedulerRegistry::new(small_config()).unwrap();
        assert!(matches!(
            registry.custom_scheduler("m/c/p", 0),
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert!(matches!(
            registry.create_scheduler(
                PoolKind::Light,
                "m/c/q",
                SchedulerOptions::new().with_max_concurrent_tasks(2)
            ),
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert!(matches!(
            registry.cpu_light_scheduler("  "),
            Err(SchedulerError::InvalidConfig(_))
        ));
        registry.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_lookup_and_owner_listing() {
        let registry = SchedulerRegistry::new(small_config()).unwrap();
        registry.cpu_light_scheduler("m/c/a").unwrap();
        registry.cpu_intensive_scheduler("m/c/b").unwrap();
        registry.io_scheduler("other/c/a").unwrap();

        assert!(registry.lookup("m/c/a").is_some());
        assert!(registry.lookup("missing").is_none());
        assert_eq!(registry.active_schedulers().len(), 3);
        assert_eq!(registry.active_count_of("m/c"), 2);
        assert!(registry.pool_stats(PoolKind::Light).is_some());
        assert!(registry.pool_stats(PoolKind::Custom).is_none());
        registry.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_shutdown_stops_everything_once() {
        let registry = SchedulerRegistry::new(small_config()).unwrap();
        let light = registry.cpu_light_scheduler("m/c/a").unwrap();
        let custom = registry.custom_scheduler("m/c/b", 1).unwrap();

        let report = registry.shutdown(Duration::from_secs(1));
        assert!(report.is_clean());
        assert_eq!(report.stopped.len(), 2);
        assert!(light.is_stopped());
        assert!(custom.is_stopped());

        assert_eq!(registry.shutdown(Duration::from_secs(1)), StopReport::default());
        assert_eq!(
            registry.cpu_light_scheduler("m/c/c").unwrap_err(),
            SchedulerError::Rejected("m/c/c".into())
        );
    }
}
