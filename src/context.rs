//! State directory resolution and the per-process context for cmdgpt.
//!
//! Every command receives an [`AppContext`] built once in `main`. It carries
//! the resolved [`AppPaths`], the effective [`Config`], and the shared cache
//! instance, so no command reaches for global state.

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::{CmdGptError, Result};
use crate::ratelimit::{FileRateLimiter, STATE_EXTENSION};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default state directory name under the user's home directory.
pub const DEFAULT_STATE_DIR: &str = ".cmdgpt";

/// Config file name within the state directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolved on-disk layout. All paths are absolute when the inputs are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Root of all cmdgpt state (default: `~/.cmdgpt`).
    pub state_dir: PathBuf,

    /// Config file (default: `{state_dir}/config.yaml`).
    pub config_file: PathBuf,

    /// True when `config_file` was named explicitly and so must exist.
    pub config_explicit: bool,

    /// Response cache directory (`{state_dir}/cache`).
    pub cache_dir: PathBuf,

    /// Directory holding rate limiter state (`{state_dir}/ratelimit`).
    pub ratelimit_dir: PathBuf,
}

impl AppPaths {
    /// Resolve paths from the command line and the process environment.
    ///
    /// State dir precedence: `--state-dir` > `CMDGPT_STATE_DIR` > `~/.cmdgpt`.
    pub fn resolve(state_dir: Option<PathBuf>, config_file: Option<PathBuf>) -> Result<Self> {
        Self::resolve_with(state_dir, config_file, |name| std::env::var(name).ok())
    }

    /// Like [`AppPaths::resolve`], reading the environment through `lookup`.
    pub fn resolve_with<F>(
        state_dir: Option<PathBuf>,
        config_file: Option<PathBuf>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => match lookup("CMDGPT_STATE_DIR").filter(|v| !v.trim().is_empty()) {
                Some(dir) => PathBuf::from(dir),
                None => dirs::home_dir()
                    .map(|home| home.join(DEFAULT_STATE_DIR))
                    .ok_or_else(|| {
                        CmdGptError::UserError(
                            "could not determine the home directory\n\
                             Fix: pass --state-dir or set CMDGPT_STATE_DIR."
                                .to_string(),
                        )
                    })?,
            },
        };

        Ok(Self::from_state_dir(state_dir, config_file))
    }

    /// Lay out paths under an already-chosen state directory.
    pub fn from_state_dir(state_dir: PathBuf, config_file: Option<PathBuf>) -> Self {
        let config_explicit = config_file.is_some();
        let config_file = config_file.unwrap_or_else(|| state_dir.join(CONFIG_FILE_NAME));

        Self {
            cache_dir: state_dir.join("cache"),
            ratelimit_dir: state_dir.join("ratelimit"),
            config_file,
            config_explicit,
            state_dir,
        }
    }

    /// Load the config this layout points at, with env overrides applied.
    ///
    /// An explicit `--config` file must exist; the default one may be absent.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = if self.config_explicit {
            Config::load(&self.config_file)?
        } else {
            Config::load_or_default(&self.config_file)?
        };
        config.apply_process_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Rate limiter state file: configured path or `{ratelimit_dir}/api.ratelimit`.
    pub fn ratelimit_state_file(&self, config: &Config) -> PathBuf {
        config
            .rate_limit_state_file
            .clone()
            .unwrap_or_else(|| self.ratelimit_dir.join(format!("api.{}", STATE_EXTENSION)))
    }

    /// Directories scanned for lock markers.
    pub fn marker_dirs(&self) -> Vec<&Path> {
        vec![
            self.state_dir.as_path(),
            self.cache_dir.as_path(),
            self.ratelimit_dir.as_path(),
        ]
    }
}

/// Per-process shared state handed to every command.
#[derive(Debug)]
pub struct AppContext {
    pub paths: AppPaths,
    pub config: Config,
    cache: Option<ResponseCache>,
}

impl AppContext {
    /// Build the context. A cache that cannot be opened is logged and disabled.
    pub fn open(paths: AppPaths, config: Config) -> Self {
        let cache = if config.cache_enabled {
            match ResponseCache::open(&paths.cache_dir, config.cache_settings()) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(dir = %paths.cache_dir.display(), error = %e, "cache unavailable; continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Self {
            paths,
            config,
            cache,
        }
    }

    /// The response cache, if enabled and available.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// The cache, or a user error explaining why there is none.
    pub fn require_cache(&self) -> Result<&ResponseCache> {
        self.cache.as_ref().ok_or_else(|| {
            let reason = if self.config.cache_enabled {
                "could not be opened (see warnings above)"
            } else {
                "is disabled (cache_enabled: false)"
            };
            CmdGptError::UserError(format!(
                "the response cache at '{}' {}",
                self.paths.cache_dir.display(),
                reason
            ))
        })
    }

    pub fn ratelimit_state_file(&self) -> PathBuf {
        self.paths.ratelimit_state_file(&self.config)
    }

    /// Open the shared rate limiter.
    pub fn limiter(&self) -> Result<FileRateLimiter> {
        FileRateLimiter::new(
            self.ratelimit_state_file(),
            self.config.rate_limit_per_second,
            self.config.rate_limit_burst,
            self.config.lock_timeout(),
        )
    }
}
