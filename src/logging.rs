//! Logging initialization.
//!
//! Thin tracing-subscriber setup for binaries and tests embedding this
//! crate. File handling and rotation belong to the consumer.

use tracing_subscriber::EnvFilter;

/// Default log level when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Initializes a stderr tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs the
/// global subscriber.
pub fn init_logging() {
    init_logging_with_level(DEFAULT_LOG_LEVEL);
}

/// Initializes logging with an explicit fallback level.
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging();
        init_logging_with_level("debug");
    }
}
