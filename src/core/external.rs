//! Named threads created outside the registry.
//!
//! Some integrations must own their thread (a vendor client's event loop, a
//! blocking accept loop). Those threads still get the owner-prefixed name so they
//! show up recognisably in thread dumps, but the registry neither tracks nor stops
//! them. The caller owns the join handle.

use std::io;
use std::thread::{self, Builder, JoinHandle};

use tracing::debug;

use crate::core::SchedulerName;

/// Naming helper for an untracked thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalThread {
    name: SchedulerName,
}

impl ExternalThread {
    /// Helper for a thread named after `name`.
    #[must_use]
    pub const fn new(name: SchedulerName) -> Self {
        Self { name }
    }

    /// Thread name: `module/config/purpose`.
    #[must_use]
    pub fn name(&self) -> String {
        self.name.to_string()
    }

    /// Owner prefix (`module/config`).
    #[must_use]
    pub fn owner(&self) -> String {
        self.name.owner()
    }

    /// A `thread::Builder` carrying the name, for callers that need more settings.
    #[must_use]
    pub fn builder(&self) -> Builder {
        Builder::new().name(self.name())
    }

    /// Spawn `f` on a thread carrying the name.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn<F, T>(&self, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        debug!(thread = %self.name, "Spawning external thread");
        self.builder().spawn(f)
    }
}

/// Name of the calling thread, if it has one.
#[must_use]
pub fn current_thread_name() -> Option<String> {
    thread::current().name().map(str::to_string)
}
