//! Tracing subscriber setup.
//!
//! Level precedence is `--log-level` > `CMDGPT_LOG_LEVEL` > config `log_level`.
//! The env override is already folded into [`Config`] by
//! [`Config::apply_env_overrides`], so only the flag is layered on here.

use crate::config::{Config, LogLevel};
use crate::error::{CmdGptError, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// The level that wins for this invocation.
pub fn effective_level(flag: Option<LogLevel>, config: &Config) -> LogLevel {
    flag.unwrap_or(config.log_level)
}

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(level.as_str())
}

/// Install the global subscriber.
///
/// Logs go to stderr, or are appended to `config.log_file` without ANSI
/// colors when one is configured. Calling this twice is harmless; the
/// first subscriber stays installed.
pub fn init(flag: Option<LogLevel>, config: &Config) -> Result<()> {
    let filter = filter_for(effective_level(flag, config));

    let installed = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CmdGptError::UserError(format!(
                        "failed to create log directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    CmdGptError::UserError(format!(
                        "failed to open log file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_config_level() {
        let config = Config {
            log_level: LogLevel::Info,
            ..Config::default()
        };
        assert_eq!(effective_level(Some(LogLevel::Trace), &config), LogLevel::Trace);
        assert_eq!(effective_level(None, &config), LogLevel::Info);
    }

    #[test]
    fn default_level_is_warn() {
        assert_eq!(effective_level(None, &Config::default()), LogLevel::Warn);
    }

    #[test]
    fn unopenable_log_file_is_user_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let config = Config {
            log_file: Some(temp_dir.path().to_path_buf()),
            ..Config::default()
        };
        let err = init(None, &config).unwrap_err();
        assert!(matches!(err, CmdGptError::UserError(_)));
        assert!(err.to_string().contains("failed to open log file"));
    }
}
