//! Pool kinds and scheduler naming.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Workload shape a scheduler is created for.
///
/// The policy attached to each kind is advisory; nothing stops a task from
/// blocking on a `Light` scheduler, but doing so starves every other owner that
/// shares the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Short tasks that never block.
    Light,
    /// CPU-heavy tasks that must not block on I/O.
    Intensive,
    /// Tasks that may block (I/O, locks, remote calls).
    BlockingIo,
    /// Periodic or pool-shaped work with its own exclusive workers.
    Custom,
}

impl PoolKind {
    /// The three kinds backed by a process-wide shared pool.
    pub const SHARED: [Self; 3] = [Self::Light, Self::Intensive, Self::BlockingIo];

    /// Whether schedulers of this kind share one process-wide pool.
    #[must_use]
    pub const fn is_shared(self) -> bool {
        !matches!(self, Self::Custom)
    }

    /// Prefix used for worker thread names.
    #[must_use]
    pub const fn thread_prefix(self) -> &'static str {
        match self {
            Self::Light => "cpu-light",
            Self::Intensive => "cpu-intensive",
            Self::BlockingIo => "io",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.thread_prefix())
    }
}

/// Human-meaningful scheduler name: `module/config/purpose`.
///
/// The `module/config` prefix identifies the owner, so diagnostics can tell which
/// component created which scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedulerName {
    module: String,
    config: String,
    purpose: String,
}

impl SchedulerName {
    /// Build a name from its three parts.
    pub fn new(
        module: impl Into<String>,
        config: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            config: config.into(),
            purpose: purpose.into(),
        }
    }

    /// Parse `module/config/purpose`. Extra separators stay in the purpose.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, '/');
        let module = parts.next().filter(|s| !s.is_empty())?;
        let config = parts.next().filter(|s| !s.is_empty())?;
        let purpose = parts.next().filter(|s| !s.is_empty())?;
        Some(Self::new(module, config, purpose))
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

    /// What the scheduler is used for.
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// `module/config`.
    #[must_use]
    pub fn owner(&self) -> String {
        format!("{}/{}", self.module, self.config)
    }
}

impl fmt::Display for SchedulerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.module, self.config, self.purpose)
    }
}

impl From<SchedulerName> for String {
    fn from(name: SchedulerName) -> Self {
        name.to_string()
    }
}

impl From<&SchedulerName> for String {
    fn from(name: &SchedulerName) -> Self {
        name.to_string()
    }
}

/// Owner prefix of a raw scheduler name.
///
/// Structured names yield `module/config`; anything else yields what precedes the
/// last `/`, or an empty string.
#[must_use]
pub fn owner_of(name: &str) -> String {
    SchedulerName::parse(name).map_or_else(
        || {
            name.rsplit_once('/')
                .map(|(owner, _)| owner.to_string())
                .unwrap_or_default()
        },
        |parsed| parsed.owner(),
    )
}
