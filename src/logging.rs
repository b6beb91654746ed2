//! Tracing setup for the `rch-gate` binary.
//!
//! Library code only emits events; installing a subscriber is left to the
//! binary (or to tests that want output).

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set and valid, else `default_filter`.
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a stderr `fmt` subscriber. Later calls are ignored.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(default_filter))
        .try_init();
}
