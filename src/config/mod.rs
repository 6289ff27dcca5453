//! Configuration models for pools, the registry, and per-scheduler options.

pub mod pool;
pub mod scheduler;

pub use pool::{DuplicateNamePolicy, PoolConfig, RegistryConfig, ENV_PREFIX};
pub use scheduler::SchedulerOptions;
