//! Process-wide tracing setup.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Builds the filter for `level`. An unparseable directive falls back to
/// `info` so a typo in the config never silences the server.
pub fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber, as plain text or JSON lines.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter(&config.level));
    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}
