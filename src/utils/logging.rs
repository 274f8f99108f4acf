//! # Logging Setup
//!
//! Structured logging configuration built on `tracing-subscriber`.
//! Library code only emits `tracing` events; binaries and tests opt into
//! a subscriber through these helpers.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initialize a global subscriber honoring `RUST_LOG`, defaulting to the
/// given level when the variable is unset.
///
/// Safe to call once per process; later calls are ignored.
pub fn init_with_level(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Initialize with the default level of `INFO`.
pub fn init() {
    init_with_level(Level::INFO);
}
