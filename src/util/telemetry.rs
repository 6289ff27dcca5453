//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_DIRECTIVE: &str = "connector_scheduler=info";

/// Install a default env-based subscriber if none is set.
///
/// Hosts embedding the registry usually install their own subscriber; this is for
/// standalone use and tests.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_DIRECTIVE);
}

/// Same as [`init_tracing`] with a caller-supplied fallback directive.
pub fn init_tracing_with(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
