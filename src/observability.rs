//! Structured logging setup (SPEC_FULL.md §1.1's ambient logging
//! requirement). The runtime itself instruments its boundaries directly
//! with `#[tracing::instrument]` ([`crate::coordinator::Coordinator`],
//! [`crate::scheduler::GlobalScheduler::tick`]); this module only wires up
//! the subscriber `bin/junction-cli` installs at startup.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing_subscriber::fmt` subscriber reading its filter from
/// `RUST_LOG`, defaulting to `junction=info` when unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("junction=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// As [`init_tracing`], but emitting newline-delimited JSON instead of the
/// human-readable default — for production deployments that ship logs to
/// a collector rather than a terminal.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init_json_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("junction=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}
