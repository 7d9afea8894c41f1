//! Tracing subscriber setup for hosts that don't install their own

use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info,savestate=debug";

/// Install a compact stderr subscriber
///
/// Respects `RUST_LOG`, falling back to `info,savestate=debug`. Does nothing
/// if a global subscriber is already set.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Install a JSON subscriber for machine-read logs
pub fn init_logging_json() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = fmt().with_env_filter(env_filter).json().try_init();
}
