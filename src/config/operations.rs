//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::cache::CacheSettings;
use crate::error::{CmdGptError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(CmdGptError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            CmdGptError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| CmdGptError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            CmdGptError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// The file written by `cmdgpt config init`.
    pub fn default_template() -> Result<String> {
        Ok(format!(
            "# cmdgpt configuration\n\
             #\n\
             # backend_command is run for every cache miss with the prompt on stdin;\n\
             # its stdout is the response. {{model}} and {{system_prompt}} are substituted.\n\
             # Example: backend_command: \"llm -m {{model}} -s '{{system_prompt}}'\"\n\
             \n{}",
            Self::default().to_yaml()?
        ))
    }

    /// Apply environment overrides, reading variables through `lookup`.
    ///
    /// Recognized: `OPENAI_GPT_MODEL`, `OPENAI_SYS_PROMPT`, `CMDGPT_BACKEND`,
    /// `CMDGPT_LOG_LEVEL`, `CMDGPT_LOG_FILE`. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("OPENAI_GPT_MODEL") {
            self.model = model;
        }
        if let Some(prompt) = get("OPENAI_SYS_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(backend) = get("CMDGPT_BACKEND") {
            self.backend_command = backend;
        }
        if let Some(level) = get("CMDGPT_LOG_LEVEL") {
            self.log_level = level
                .parse()
                .map_err(|e| CmdGptError::UserError(format!("CMDGPT_LOG_LEVEL: {}", e)))?;
        }
        if let Some(file) = get("CMDGPT_LOG_FILE") {
            self.log_file = Some(PathBuf::from(file));
        }

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env_overrides(|name| std::env::var(name).ok())
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `model` must be non-empty
    /// - `rate_limit_per_second` must be a positive number
    /// - `rate_limit_burst`, `cache_ttl_hours`, `cache_max_entries`,
    ///   `cache_max_size_mb`, `lock_timeout_ms`, `lock_stale_minutes` must be positive
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(invalid("model must not be empty"));
        }

        if !self.rate_limit_per_second.is_finite() || self.rate_limit_per_second <= 0.0 {
            return Err(invalid(&format!(
                "rate_limit_per_second must be greater than 0 (found {})",
                self.rate_limit_per_second
            )));
        }

        let positive = [
            ("rate_limit_burst", self.rate_limit_burst),
            ("cache_ttl_hours", self.cache_ttl_hours),
            ("cache_max_entries", self.cache_max_entries as u64),
            ("cache_max_size_mb", self.cache_max_size_mb),
            ("lock_timeout_ms", self.lock_timeout_ms),
            ("lock_stale_minutes", u64::from(self.lock_stale_minutes)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(invalid(&format!("{} must be greater than 0", name)));
            }
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_seconds)
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_millis(self.rate_limit_max_wait_ms)
    }

    /// Cache limits derived from the cache settings.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600)),
            max_entries: self.cache_max_entries,
            max_bytes: self.cache_max_size_mb.saturating_mul(1024 * 1024),
            lock_timeout: self.lock_timeout(),
        }
    }
}

fn invalid(detail: &str) -> CmdGptError {
    CmdGptError::UserError(format!("config validation failed: {}", detail))
}
