//! Owner lifecycle and scheduler binding.
//!
//! Every scheduler an owner creates is bound to it; when the owner stops (or is
//! disposed) the binder stops each bound scheduler. One scheduler failing to stop
//! cleanly never keeps the others running.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerOptions;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::{AppResult, PoolKind, SchedulerError, SchedulerHandle, SchedulerName, SchedulerRegistry};

/// Identity of an owner: the module and config that created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId {
    module: String,
    config: String,
}

impl OwnerId {
    /// Owner for `module` / `config`.
    pub fn new(module: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            config: config.into(),
        }
    }

    /// Owning module.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Owning config.
    #[must_use]
    pub fn config(&self) -> &str {
        &self.config
    }

    /// Scheduler name for one of this owner's purposes.
    #[must_use]
    pub fn scheduler_name(&self, purpose: &str) -> SchedulerName {
        SchedulerName::new(self.module.as_str(), self.config.as_str(), purpose)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.config)
    }
}

/// Kind of component owning schedulers. Selects the lifecycle vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    /// Message source (start/stop).
    Source,
    /// Connection provider (start/stop).
    ConnectionProvider,
    /// Module configuration (initialise/dispose).
    Config,
}

impl OwnerKind {
    /// Verb for the start transition.
    #[must_use]
    pub const fn start_verb(self) -> &'static str {
        match self {
            Self::Source | Self::ConnectionProvider => "start",
            Self::Config => "initialise",
        }
    }

    /// Verb for the stop transition.
    #[must_use]
    pub const fn stop_verb(self) -> &'static str {
        match self {
            Self::Source | Self::ConnectionProvider => "stop",
            Self::Config => "dispose",
        }
    }
}

/// Outcome of stopping a group of schedulers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Schedulers that stopped after draining.
    pub stopped: Vec<String>,
    /// Per-scheduler failures. Those schedulers are stopped too.
    pub failures: Vec<SchedulerError>,
}

impl StopReport {
    /// No failures.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Schedulers handled, clean or not.
    #[must_use]
    pub fn total(&self) -> usize {
        self.stopped.len() + self.failures.len()
    }

    /// Append another report.
    pub fn merge(&mut self, other: Self) {
        self.stopped.extend(other.stopped);
        self.failures.extend(other.failures);
    }
}

/// Stop every handle, collecting failures instead of returning on the first.
///
/// `timeout` of `None` uses each handle's own shutdown timeout.
pub(crate) fn stop_all(handles: &[SchedulerHandle], timeout: Option<Duration>) -> StopReport {
    let mut report = StopReport::default();
    for handle in handles {
        let outcome = match timeout {
            Some(timeout) => handle.stop(timeout),
            None => handle.stop_default(),
        };
        match outcome {
            Ok(()) => report.stopped.push(handle.name().to_string()),
            Err(e) => {
                warn!(scheduler = %handle.name(), error = %e, "Scheduler did not stop cleanly");
                report.failures.push(e);
            }
        }
    }
    report
}

/// Records which schedulers each owner must stop.
#[derive(Clone, Default)]
pub struct LifecycleBinder {
    bindings: Arc<Mutex<HashMap<OwnerId, Vec<SchedulerHandle>>>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl LifecycleBinder {
    /// Empty binder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty binder recording bind/release events.
    #[must_use]
    pub fn with_audit(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            bindings: Arc::default(),
            audit: Some(audit),
        }
    }

    /// Record that `handle` must be stopped when `owner` stops. Binding the same
    /// scheduler twice is a no-op.
    pub fn bind(&self, owner: &OwnerId, handle: SchedulerHandle) {
        let mut bindings = self.bindings.lock();
        let bound = bindings.entry(owner.clone()).or_default();
        if bound.iter().any(|h| h.same_scheduler(&handle)) {
            return;
        }
        debug!(owner = %owner, scheduler = %handle.name(), "Scheduler bound");
        if let Some(audit) = &self.audit {
            audit.record(build_audit_event(handle.name(), AuditAction::Bind, Some(owner.to_string())));
        }
        bound.push(handle);
    }

    /// Remove `handle` from `owner` without stopping it. Returns `true` if it was bound.
    pub fn unbind(&self, owner: &OwnerId, handle: &SchedulerHandle) -> bool {
        let mut bindings = self.bindings.lock();
        let Some(bound) = bindings.get_mut(owner) else {
            return false;
        };
        let before = bound.len();
        bound.retain(|h| !h.same_scheduler(handle));
        let removed = bound.len() != before;
        if bound.is_empty() {
            bindings.remove(owner);
        }
        removed
    }

    /// Handles currently bound to `owner`.
    #[must_use]
    pub fn bound(&self, owner: &OwnerId) -> Vec<SchedulerHandle> {
        self.bindings.lock().get(owner).cloned().unwrap_or_default()
    }

    /// Number of handles bound to `owner`.
    #[must_use]
    pub fn bound_count(&self, owner: &OwnerId) -> usize {
        self.bindings.lock().get(owner).map_or(0, Vec::len)
    }

    /// Stop and unbind every scheduler of `owner`, each with its own timeout.
    pub fn release(&self, owner: &OwnerId) -> StopReport {
        self.release_inner(owner, None)
    }

    /// Stop and unbind every scheduler of `owner` with one timeout per scheduler.
    pub fn release_with_timeout(&self, owner: &OwnerId, timeout: Duration) -> StopReport {
        self.release_inner(owner, Some(timeout))
    }

    fn release_inner(&self, owner: &OwnerId, timeout: Option<Duration>) -> StopReport {
        // Taken out first so stop() never runs under the bindings lock.
        let handles = self.bindings.lock().remove(owner).unwrap_or_default();
        if handles.is_empty() {
            return StopReport::default();
        }

        let report = stop_all(&handles, timeout);
        info!(
            owner = %owner,
            stopped = report.stopped.len(),
            failed = report.failures.len(),
            "Owner schedulers released"
        );
        if let Some(audit) = &self.audit {
            let mut event = build_audit_event(
                owner.to_string(),
                AuditAction::Release,
                Some(format!("stopped={} failed={}", report.stopped.len(), report.failures.len())),
            );
            event.owner = owner.to_string();
            audit.record(event);
        }
        report
    }
}

impl fmt::Debug for LifecycleBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBinder")
            .field("owners", &self.bindings.lock().len())
            .finish_non_exhaustive()
    }
}

/// Capability implemented by every scheduler-owning component.
pub trait Lifecycle: Send {
    /// Create schedulers and start work. Schedulers created through `ctx` are bound
    /// to this owner.
    ///
    /// # Errors
    ///
    /// Any error aborts the start; schedulers already bound are stopped.
    fn on_start(&mut self, ctx: &mut StartContext<'_>) -> AppResult<()>;

    /// Release component resources. Bound schedulers are stopped afterwards.
    ///
    /// # Errors
    ///
    /// Errors are logged; the stop sequence continues.
    fn on_stop(&mut self) -> AppResult<()> {
        Ok(())
    }
}

/// What a component sees during `on_start`.
pub struct StartContext<'a> {
    owner: &'a OwnerId,
    registry: &'a SchedulerRegistry,
    binder: &'a LifecycleBinder,
    created: Vec<SchedulerHandle>,
}

impl StartContext<'_> {
    /// The starting owner.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        self.owner
    }

    /// The registry, for lookups.
    #[must_use]
    pub const fn registry(&self) -> &SchedulerRegistry {
        self.registry
    }

    /// Create `module/config/<purpose>` and bind it to the owner.
    ///
    /// # Errors
    ///
    /// See `SchedulerRegistry::create_scheduler`.
    pub fn create_scheduler(
        &mut self,
        kind: PoolKind,
        purpose: &str,
        options: SchedulerOptions,
    ) -> Result<SchedulerHandle, SchedulerError> {
        let handle = self
            .registry
            .create_scheduler(kind, self.owner.scheduler_name(purpose), options)?;
        self.binder.bind(self.owner, handle.clone());
        self.created.push(handle.clone());
        Ok(handle)
    }

    /// Bound `Light` scheduler.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn cpu_light_scheduler(&mut self, purpose: &str) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(PoolKind::Light, purpose, SchedulerOptions::new())
    }

    /// Bound `Intensive` scheduler.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn cpu_intensive_scheduler(&mut self, purpose: &str) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(PoolKind::Intensive, purpose, SchedulerOptions::new())
    }

    /// Bound `BlockingIo` scheduler.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn io_scheduler(&mut self, purpose: &str) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(PoolKind::BlockingIo, purpose, SchedulerOptions::new())
    }

    /// Bound `Custom` scheduler with `max_concurrent_tasks` exclusive workers.
    ///
    /// # Errors
    ///
    /// See [`create_scheduler`](Self::create_scheduler).
    pub fn custom_scheduler(
        &mut self,
        purpose: &str,
        max_concurrent_tasks: usize,
    ) -> Result<SchedulerHandle, SchedulerError> {
        self.create_scheduler(
            PoolKind::Custom,
            purpose,
            SchedulerOptions::new().with_max_concurrent_tasks(max_concurrent_tasks),
        )
    }
}

/// Lifecycle state of a managed owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerState {
    /// Never started.
    Initial,
    /// Started; schedulers may be bound.
    Started,
    /// Stopped; no schedulers bound.
    Stopped,
}

/// Drives a [`Lifecycle`] component and guarantees its schedulers never outlive it.
pub struct ManagedOwner<C: Lifecycle> {
    id: OwnerId,
    kind: OwnerKind,
    component: C,
    state: OwnerState,
    registry: SchedulerRegistry,
    binder: LifecycleBinder,
}

impl<C: Lifecycle> ManagedOwner<C> {
    /// Wrap `component`. Nothing starts until [`start`](Self::start).
    pub fn new(
        id: OwnerId,
        kind: OwnerKind,
        component: C,
        registry: &SchedulerRegistry,
        binder: &LifecycleBinder,
    ) -> Self {
        Self {
            id,
            kind,
            component,
            state: OwnerState::Initial,
            registry: registry.clone(),
            binder: binder.clone(),
        }
    }

    /// Owner identity.
    pub const fn id(&self) -> &OwnerId {
        &self.id
    }

    /// Owner kind.
    pub const fn kind(&self) -> OwnerKind {
        self.kind
    }

    /// Current state.
    pub const fn state(&self) -> OwnerState {
        self.state
    }

    /// The wrapped component.
    pub const fn component(&self) -> &C {
        &self.component
    }

    /// The wrapped component, mutably.
    pub fn component_mut(&mut self) -> &mut C {
        &mut self.component
    }

    /// Schedulers currently bound to this owner.
    pub fn schedulers(&self) -> Vec<SchedulerHandle> {
        self.binder.bound(&self.id)
    }

    /// Start the component. A no-op when already started.
    ///
    /// # Errors
    ///
    /// Returns the component's error after stopping whatever it had bound.
    pub fn start(&mut self) -> AppResult<()> {
        if self.state == OwnerState::Started {
            return Ok(());
        }
        let verb = self.kind.start_verb();
        info!(owner = %self.id, kind = ?self.kind, "Owner {verb}");

        let mut ctx = StartContext {
            owner: &self.id,
            registry: &self.registry,
            binder: &self.binder,
            created: Vec::new(),
        };
        let started = self.component.on_start(&mut ctx);
        let created = ctx.created;
        if let Err(e) = started {
            error!(owner = %self.id, error = %e, "Owner failed to {verb}; rolling back");
            // Only what this start created; another owner may share the id.
            for handle in &created {
                self.binder.unbind(&self.id, handle);
            }
            let report = stop_all(&created, None);
            if !report.is_clean() {
                warn!(owner = %self.id, failures = report.failures.len(), "Rollback left failures");
            }
            self.state = OwnerState::Stopped;
            return Err(e).with_context(|| format!("failed to {verb} {}", self.id));
        }

        self.state = OwnerState::Started;
        Ok(())
    }

    /// Stop the component, then every scheduler bound to it.
    ///
    /// Component and scheduler failures are logged and reported, never raised.
    /// A no-op returning an empty report unless started.
    pub fn stop(&mut self) -> StopReport {
        if self.state != OwnerState::Started {
            return StopReport::default();
        }
        let verb = self.kind.stop_verb();
        info!(owner = %self.id, kind = ?self.kind, "Owner {verb}");

        if let Err(e) = self.component.on_stop() {
            warn!(owner = %self.id, error = %e, "Component failed to {verb}; stopping schedulers anyway");
        }
        let report = self.binder.release(&self.id);
        self.state = OwnerState::Stopped;
        report
    }
}

impl<C: Lifecycle> Drop for ManagedOwner<C> {
    fn drop(&mut self) {
        if self.state == OwnerState::Started {
            warn!(owner = %self.id, "Owner dropped while started; stopping");
            let _ = self.stop();
        }
    }
}

impl<C: Lifecycle> fmt::Debug for ManagedOwner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedOwner")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_kind_verbs() {
        assert_eq!(OwnerKind::Source.start_verb(), "start");
        assert_eq!(OwnerKind::ConnectionProvider.stop_verb(), "stop");
        assert_eq!(OwnerKind::Config.start_verb(), "initialise");
        assert_eq!(OwnerKind::Config.stop_verb(), "dispose");
    }

    #[test]
    fn test_owner_id_names() {
        let owner = OwnerId::new("mod-A", "cfg-1");
        assert_eq!(owner.to_string(), "mod-A/cfg-1");
        assert_eq!(owner.scheduler_name("poll").to_string(), "mod-A/cfg-1/poll");
    }

    #[test]
    fn test_stop_report_merge() {
        let mut report = StopReport {
            stopped: vec!["a".into()],
            failures: vec![],
        };
        report.merge(StopReport {
            stopped: vec!["b".into()],
            failures: vec![SchedulerError::StopTimeout {
                name: "c".into(),
                abandoned: 1,
            }],
        });
        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_release_unknown_owner_is_empty() {
        let binder = LifecycleBinder::new();
        let report = binder.release(&OwnerId::new("x", "y"));
        assert_eq!(report, StopReport::default());
    }
}
