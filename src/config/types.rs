//! Config value types and serde defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log verbosity accepted in config, `CMDGPT_LOG_LEVEL` and `--log-level`.
///
/// Names are case-insensitive; `critical` is accepted as an alias of `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "critical" => Ok(LogLevel::Error),
            other => Err(format!(
                "invalid log level '{}' (expected TRACE, DEBUG, INFO, WARN, ERROR or CRITICAL)",
                other
            )),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Default value functions for serde
pub(crate) fn default_model() -> String {
    "gpt-4".to_string()
}
pub(crate) fn default_system_prompt() -> String {
    "You are a helpful assistant!".to_string()
}
pub(crate) fn default_backend_timeout_seconds() -> u64 {
    120
}
pub(crate) fn default_cache_ttl_hours() -> u64 {
    24
}
pub(crate) fn default_cache_max_entries() -> usize {
    1000
}
pub(crate) fn default_cache_max_size_mb() -> u64 {
    100
}
pub(crate) fn default_rate_limit_per_second() -> f64 {
    3.0
}
pub(crate) fn default_rate_limit_burst() -> u64 {
    5
}
pub(crate) fn default_rate_limit_max_wait_ms() -> u64 {
    30_000
}
pub(crate) fn default_lock_timeout_ms() -> u64 {
    5000
}
pub(crate) fn default_lock_stale_minutes() -> u32 {
    120
}
pub(crate) fn default_true() -> bool {
    true
}
