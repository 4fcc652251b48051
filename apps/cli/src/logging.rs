//! Logging setup for the CLI.
//!
//! The core library only emits `tracing` events; this is the one place a
//! subscriber gets installed.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber honoring `RUST_LOG` (default: `info`).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
