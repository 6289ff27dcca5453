//! Audit trail of scheduler lifecycle events.
//!
//! The registry records every create, stop and bind so diagnostics can answer
//! "who created this scheduler and did they stop it".

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::pool_kind::owner_of;
use crate::util::clock::now_ms;

/// Action recorded in an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Scheduler created.
    Create,
    /// Creation refused because the name was taken.
    DuplicateName,
    /// Scheduler stopped after draining.
    Stop,
    /// Scheduler stopped after abandoning in-flight work.
    StopTimeout,
    /// Scheduler bound to an owner.
    Bind,
    /// Owner released its schedulers.
    Release,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::DuplicateName => "duplicate_name",
            Self::Stop => "stop",
            Self::StopTimeout => "stop_timeout",
            Self::Bind => "bind",
            Self::Release => "release",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Scheduler name (or owner id for `Release`).
    pub scheduler: String,
    /// Owner prefix derived from the scheduler name.
    pub owner: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// Bounded in-memory audit sink.
pub struct InMemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink keeping at most `max_events`.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events recorded for one scheduler.
    #[must_use]
    pub fn events_for(&self, scheduler: &str) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.scheduler == scheduler)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink forwarding every event to `tracing` at debug level.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::debug!(
            event_id = %event.event_id,
            scheduler = %event.scheduler,
            owner = %event.owner,
            action = %event.action,
            detail = ?event.detail,
            "scheduler audit"
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    scheduler: impl Into<String>,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    let scheduler = scheduler.into();
    AuditEvent {
        event_id: Uuid::new_v4().to_string(),
        owner: owner_of(&scheduler),
        scheduler,
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
