//! Diagnostics models exposed to whatever surface embeds the registry.

use serde::{Deserialize, Serialize};

use crate::core::{PoolKind, PoolStats, SchedulerInfo, SchedulerRegistry};
use crate::util::clock::now_ms;

/// One shared pool in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Pool kind.
    pub kind: PoolKind,
    /// Live counters.
    pub stats: PoolStats,
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Capture time (ms since epoch).
    pub taken_at_ms: u128,
    /// Whether the registry was shut down.
    pub shutdown: bool,
    /// Shared pools.
    pub pools: Vec<PoolSnapshot>,
    /// Active schedulers.
    pub schedulers: Vec<SchedulerInfo>,
}

impl RegistrySnapshot {
    /// Active schedulers of one owner (`module/config`).
    #[must_use]
    pub fn schedulers_of(&self, owner: &str) -> Vec<&SchedulerInfo> {
        self.schedulers.iter().filter(|s| s.owner == owner).collect()
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Active scheduler count.
    pub active_schedulers: usize,
}

/// Capture a snapshot of `registry`.
#[must_use]
pub fn snapshot(registry: &SchedulerRegistry) -> RegistrySnapshot {
    let pools = PoolKind::SHARED
        .iter()
        .filter_map(|&kind| registry.pool_stats(kind).map(|stats| PoolSnapshot { kind, stats }))
        .collect();
    RegistrySnapshot {
        taken_at_ms: now_ms(),
        shutdown: registry.is_shutdown(),
        pools,
        schedulers: registry.active_schedulers(),
    }
}

/// Snapshot serialized as JSON.
///
/// # Errors
///
/// Returns the serialization error message.
pub fn snapshot_json(registry: &SchedulerRegistry) -> Result<String, String> {
    serde_json::to_string_pretty(&snapshot(registry)).map_err(|e| e.to_string())
}

/// Healthy while the registry has not been shut down.
#[must_use]
pub fn health(registry: &SchedulerRegistry) -> Health {
    Health {
        ok: !registry.is_shutdown(),
        active_schedulers: registry.active_schedulers().len(),
    }
}
