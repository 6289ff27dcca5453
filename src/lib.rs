//! # Connector Scheduler
//!
//! Lifecycle-aware task schedulers for connector modules.
//!
//! Every module instance (a source, a connection provider, a module config) needs
//! background work: polling, reconnect loops, blocking I/O, periodic housekeeping.
//! Letting each component spin up its own threads leaks them on redeploy and makes
//! thread dumps unreadable. This crate centralises that:
//!
//! - **Shared pools**: a process-wide pool per [`PoolKind`](core::PoolKind)
//!   (`Light`, `Intensive`, `BlockingIo`) backs every scheduler of that kind;
//!   `Custom` schedulers get an exclusive pool.
//! - **Named schedulers**: every scheduler is named `module/config/purpose`, so
//!   diagnostics know which owner created it.
//! - **Lifecycle binding**: schedulers created while an owner starts are bound to it
//!   and stopped when it stops, even when one of them fails to drain.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use connector_scheduler::core::SchedulerRegistry;
//!
//! # fn main() -> Result<(), connector_scheduler::core::SchedulerError> {
//! let registry = SchedulerRegistry::with_defaults()?;
//! let scheduler = registry.cpu_light_scheduler("mod-A/cfg-1/validation")?;
//!
//! let handle = scheduler.submit(|| 6 * 7)?;
//! assert_eq!(handle.wait(Duration::from_secs(1))?, 42);
//!
//! scheduler.stop(Duration::from_secs(5))?;
//! registry.shutdown(Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```
//!
//! Components implement [`Lifecycle`](core::Lifecycle) and are driven by a
//! [`ManagedOwner`](core::ManagedOwner); see `tests/lifecycle_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Pools, schedulers, the registry and owner lifecycle.
pub mod core;
/// Configuration models for pools, schedulers and timeouts.
pub mod config;
/// Builders to construct registries from configuration.
pub mod builders;
/// Diagnostics surface over a running registry.
pub mod runtime;
/// Shared utilities.
pub mod util;
