//! Core scheduling abstractions: pools, schedulers, the registry and owner lifecycle.

pub mod error;
pub mod pool_kind;
pub mod audit;
pub mod task;
pub mod worker_pool;
pub mod scheduler;
pub mod registry;
pub mod lifecycle;
pub mod external;

pub use error::{AppResult, SchedulerError};
pub use pool_kind::{owner_of, PoolKind, SchedulerName};
pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use task::{TaskHandle, TaskResult};
pub use worker_pool::{PoolStats, WorkerPool};
pub use scheduler::{CancellableHandle, SchedulerHandle, SchedulerInfo, SchedulerState, SchedulerStats};
pub use registry::SchedulerRegistry;
pub use lifecycle::{
    Lifecycle, LifecycleBinder, ManagedOwner, OwnerId, OwnerKind, OwnerState, StartContext,
    StopReport,
};
pub use external::{current_thread_name, ExternalThread};
