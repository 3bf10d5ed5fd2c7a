//! Default configuration values
//!
//! Provides default configuration instances and helper functions.

use super::schema::Config;
use std::time::Duration;

/// Poll interval used when the configured one cannot be parsed
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Executor readiness timeout used when none is given
pub const DEFAULT_EXECUTOR_TIMEOUT: Duration = Duration::from_secs(120);

/// Get the default configuration
pub fn default_config() -> Config {
    Config::default()
}
