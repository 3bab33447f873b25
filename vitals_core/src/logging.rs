//! Logging infrastructure for Vitals.
//!
//! Every binary calls [`init`] before doing anything else so that the
//! scheduler's per-gate decisions and channel failures end up in one place.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging at INFO, overridable with RUST_LOG.
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific default level
///
/// `verbose` callers pass `"debug"` to see every gate decision the scheduler
/// makes. RUST_LOG still wins when it is set.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false))
        .init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
