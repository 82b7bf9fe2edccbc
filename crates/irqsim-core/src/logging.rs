//! Diagnostic logging.
//!
//! This is the program's own `tracing` output, written to stderr. It is
//! separate from the trace log, which is simulator state.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives (e.g. `irqsim_core=debug`).
pub const LOG_ENV: &str = "IRQSIM_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Installs the global subscriber.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init() -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("install tracing subscriber: {err}"))?;
    Ok(guard)
}

/// Filter from `IRQSIM_LOG`, falling back to warnings only.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
