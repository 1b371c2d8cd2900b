//! Log output for the simulator and embedding binaries.
//!
//! The library only emits `tracing` events. Installing a subscriber is left to
//! whoever runs it.

use tracing_subscriber::EnvFilter;

/// Installs a stderr fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. "info"). Does nothing if a subscriber is already set.
pub fn init(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // a subscriber installed earlier wins
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
