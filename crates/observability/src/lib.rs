//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, LogFormatError, TracingConfig};

/// Initialize tracing from the environment (`RUST_LOG`, `ROLEGATE_LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops. An unparseable
/// log format falls back to JSON.
pub fn init() {
    let config = TracingConfig::from_env().unwrap_or_default();
    crate::tracing::init(&config);
}
