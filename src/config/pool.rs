//! Shared pool and registry configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::PoolKind;

/// Prefix of every environment variable read by [`RegistryConfig::from_env`].
pub const ENV_PREFIX: &str = "CONNECTOR_SCHEDULER_";

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// What the registry does when an active scheduler already uses a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateNamePolicy {
    /// Fail creation with `DuplicateName`.
    #[default]
    Reject,
    /// Log a warning and create the scheduler anyway.
    Warn,
}

impl FromStr for DuplicateNamePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "warn" => Ok(Self::Warn),
            other => Err(format!("unknown duplicate name policy `{other}`")),
        }
    }
}

/// Sizing of one shared worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks that may wait for a worker. `0` means a submit only succeeds while a
    /// worker is free.
    pub queue_depth: usize,
    /// Stack size of each worker thread in bytes.
    #[serde(default = "default_stack_size")]
    pub thread_stack_size: usize,
}

const fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

impl PoolConfig {
    /// Pool with `worker_count` workers, no queue and the default stack size.
    #[must_use]
    pub const fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            queue_depth: 0,
            thread_stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Set the queue depth.
    #[must_use]
    pub const fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Root registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Pool shared by `Light` schedulers.
    pub light: PoolConfig,
    /// Pool shared by `Intensive` schedulers.
    pub intensive: PoolConfig,
    /// Pool shared by `BlockingIo` schedulers.
    pub io: PoolConfig,
    /// Name collision policy.
    pub duplicate_names: DuplicateNamePolicy,
    /// Stop timeout used when a scheduler has none of its own.
    pub default_stop_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let cores = num_cpus::get().max(1);
        Self {
            light: PoolConfig::new(cores * 2).with_queue_depth(cores * 2),
            intensive: PoolConfig::new(cores * 2).with_queue_depth(cores * 2),
            io: PoolConfig::new(cores * 4).with_queue_depth(cores * 4),
            duplicate_names: DuplicateNamePolicy::Reject,
            default_stop_timeout_ms: 5_000,
        }
    }
}

impl RegistryConfig {
    /// Pool configuration for a shared kind. `None` for `Custom`.
    #[must_use]
    pub const fn pool(&self, kind: PoolKind) -> Option<&PoolConfig> {
        match kind {
            PoolKind::Light => Some(&self.light),
            PoolKind::Intensive => Some(&self.intensive),
            PoolKind::BlockingIo => Some(&self.io),
            PoolKind::Custom => None,
        }
    }

    /// Default stop timeout as a `Duration`.
    #[must_use]
    pub const fn default_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.default_stop_timeout_ms)
    }

    /// Validate all pools.
    pub fn validate(&self) -> Result<(), String> {
        for kind in PoolKind::SHARED {
            if let Some(pool) = self.pool(kind) {
                pool.validate()
                    .map_err(|e| format!("pool `{kind}` invalid: {e}"))?;
            }
        }
        if self.default_stop_timeout_ms == 0 {
            return Err("default_stop_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse registry configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `CONNECTOR_SCHEDULER_*` variables, after loading a
    /// `.env` file if one exists.
    ///
    /// Recognised suffixes: `LIGHT_WORKERS`, `INTENSIVE_WORKERS`,
    /// `INTENSIVE_QUEUE_DEPTH`, `IO_WORKERS`, `DUPLICATE_NAMES`, `STOP_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let read = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(v) = read("LIGHT_WORKERS") {
            cfg.light.worker_count = parse_var("LIGHT_WORKERS", &v)?;
        }
        if let Some(v) = read("INTENSIVE_WORKERS") {
            cfg.intensive.worker_count = parse_var("INTENSIVE_WORKERS", &v)?;
        }
        if let Some(v) = read("INTENSIVE_QUEUE_DEPTH") {
            cfg.intensive.queue_depth = parse_var("INTENSIVE_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = read("IO_WORKERS") {
            cfg.io.worker_count = parse_var("IO_WORKERS", &v)?;
        }
        if let Some(v) = read("DUPLICATE_NAMES") {
            cfg.duplicate_names = v.parse()?;
        }
        if let Some(v) = read("STOP_TIMEOUT_MS") {
            cfg.default_stop_timeout_ms = parse_var("STOP_TIMEOUT_MS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T: FromStr>(suffix: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{ENV_PREFIX}{suffix}: cannot parse `{value}`"))
}
