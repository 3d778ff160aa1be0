//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for cmdgpt.
///
/// This struct represents the contents of `<state_dir>/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Request settings
    // =========================================================================
    /// Model name passed to the backend (`OPENAI_GPT_MODEL`).
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt passed to the backend (`OPENAI_SYS_PROMPT`).
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Backend command template (`CMDGPT_BACKEND`); `{model}` and
    /// `{system_prompt}` are substituted. Shell-words parsed, no shell.
    #[serde(default)]
    pub backend_command: String,

    /// Seconds before the backend is killed (0 disables the limit).
    #[serde(default = "default_backend_timeout_seconds")]
    pub backend_timeout_seconds: u64,

    // =========================================================================
    // Cache settings
    // =========================================================================
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    #[serde(default = "default_cache_max_size_mb")]
    pub cache_max_size_mb: u64,

    // =========================================================================
    // Rate limit settings
    // =========================================================================
    /// Sustained requests per second shared by all cmdgpt processes.
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: f64,

    /// Bucket capacity (requests allowed in a burst).
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u64,

    /// Longest `ask` waits for a token, in milliseconds (0 waits forever).
    #[serde(default = "default_rate_limit_max_wait_ms")]
    pub rate_limit_max_wait_ms: u64,

    /// Limiter state file (default: `<state_dir>/ratelimit/api.ratelimit`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_state_file: Option<PathBuf>,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Milliseconds to wait for any file lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Minutes after which a lock marker is reported stale.
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u32,

    // =========================================================================
    // Logging settings
    // =========================================================================
    #[serde(default)]
    pub log_level: LogLevel,

    /// Append logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            backend_command: String::new(),
            backend_timeout_seconds: default_backend_timeout_seconds(),
            cache_enabled: default_true(),
            cache_ttl_hours: default_cache_ttl_hours(),
            cache_max_entries: default_cache_max_entries(),
            cache_max_size_mb: default_cache_max_size_mb(),
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_burst: default_rate_limit_burst(),
            rate_limit_max_wait_ms: default_rate_limit_max_wait_ms(),
            rate_limit_state_file: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_stale_minutes: default_lock_stale_minutes(),
            log_level: LogLevel::default(),
            log_file: None,
        }
    }
}
