//! CLI argument parsing for cmdgpt.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use crate::config::LogLevel;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cmdgpt: send prompts to a configurable backend with a shared response
/// cache and a rate limit shared by every cmdgpt process on the machine.
#[derive(Parser, Debug)]
#[command(name = "cmdgpt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// State directory (default: $CMDGPT_STATE_DIR or ~/.cmdgpt).
    #[arg(long, global = true, value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// Config file (default: <state-dir>/config.yaml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level: TRACE, DEBUG, INFO, WARN, ERROR or CRITICAL.
    #[arg(short = 'L', long, global = true, value_name = "LEVEL", value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for cmdgpt.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a prompt and print the response.
    ///
    /// Cached responses are returned without spending rate budget.
    Ask(AskArgs),

    /// Response cache maintenance.
    Cache(CacheCommand),

    /// Shared rate limiter inspection and maintenance.
    Limit(LimitCommand),

    /// List or clear lock marker files.
    Locks(LocksCommand),

    /// Create or show the configuration.
    Config(ConfigCommand),
}

/// Output format for `ask`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

/// Arguments for the `ask` command.
#[derive(Parser, Debug)]
pub struct AskArgs {
    /// Prompt text. Read from stdin when omitted.
    pub prompt: Option<String>,

    /// Model name (overrides config and OPENAI_GPT_MODEL).
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt (overrides config and OPENAI_SYS_PROMPT).
    #[arg(short, long = "system-prompt")]
    pub system_prompt: Option<String>,

    /// Skip the cache lookup and do not store the response.
    #[arg(long)]
    pub no_cache: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    pub format: OutputFormat,

    /// Longest wait for rate budget, in milliseconds (0 waits forever).
    #[arg(long)]
    pub max_wait_ms: Option<u64>,
}

/// Cache subcommands.
#[derive(Parser, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show entry count, size and this process's hit/miss counts.
    Stats,

    /// Remove every cache entry.
    Clear,

    /// Remove expired entries.
    Clean,
}

/// Rate limiter subcommands.
#[derive(Parser, Debug)]
pub struct LimitCommand {
    #[command(subcommand)]
    pub action: LimitAction,
}

#[derive(Subcommand, Debug)]
pub enum LimitAction {
    /// Show available tokens and the wait for the next one.
    Status,

    /// Empty the bucket and adopt the configured rate and burst.
    Reset,

    /// Remove rate limiter state files that have not been used recently.
    Cleanup(LimitCleanupArgs),
}

/// Arguments for the `limit cleanup` command.
#[derive(Parser, Debug)]
pub struct LimitCleanupArgs {
    /// Remove state files not modified for this many hours.
    #[arg(long, default_value_t = 24)]
    pub max_age_hours: u64,
}

/// Lock marker subcommands.
#[derive(Parser, Debug)]
pub struct LocksCommand {
    #[command(subcommand)]
    pub action: LocksAction,
}

#[derive(Subcommand, Debug)]
pub enum LocksAction {
    /// List lock marker files with holder and age.
    List,

    /// Remove a leaked lock marker.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(LocksClearArgs),
}

/// Arguments for the `locks clear` command.
#[derive(Parser, Debug)]
pub struct LocksClearArgs {
    /// Marker file name as shown by `locks list` (e.g. `.maintenance.lock`).
    pub name: String,

    /// Force clearing the marker (required for safety).
    #[arg(long)]
    pub force: bool,
}

/// Config subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default config file.
    Init(ConfigInitArgs),

    /// Print the effective configuration as YAML.
    Show,
}

/// Arguments for the `config init` command.
#[derive(Parser, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_ask_minimal() {
        let cli = Cli::try_parse_from(["cmdgpt", "ask", "hello"]).unwrap();
        if let Command::Ask(args) = cli.command {
            assert_eq!(args.prompt.as_deref(), Some("hello"));
            assert_eq!(args.format, OutputFormat::Plain);
            assert!(!args.no_cache);
            assert!(args.model.is_none());
            assert!(args.max_wait_ms.is_none());
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn parse_ask_full() {
        let cli = Cli::try_parse_from([
            "cmdgpt",
            "ask",
            "-m",
            "gpt-4o",
            "-s",
            "Be terse.",
            "--no-cache",
            "--format",
            "json",
            "--max-wait-ms",
            "250",
            "What is Rust?",
        ])
        .unwrap();
        if let Command::Ask(args) = cli.command {
            assert_eq!(args.prompt.as_deref(), Some("What is Rust?"));
            assert_eq!(args.model.as_deref(), Some("gpt-4o"));
            assert_eq!(args.system_prompt.as_deref(), Some("Be terse."));
            assert!(args.no_cache);
            assert_eq!(args.format, OutputFormat::Json);
            assert_eq!(args.max_wait_ms, Some(250));
        } else {
            panic!("Expected Ask command");
        }
    }

    #[test]
    fn parse_ask_without_prompt_reads_stdin() {
        let cli = Cli::try_parse_from(["cmdgpt", "ask"]).unwrap();
        assert!(matches!(cli.command, Command::Ask(AskArgs { prompt: None, .. })));
    }

    #[test]
    fn parse_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cmdgpt",
            "cache",
            "stats",
            "--state-dir",
            "/tmp/state",
            "-L",
            "critical",
        ])
        .unwrap();
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(cli.log_level, Some(LogLevel::Error));
        assert!(matches!(
            cli.command,
            Command::Cache(CacheCommand {
                action: CacheAction::Stats
            })
        ));
    }

    #[test]
    fn parse_bad_log_level() {
        assert!(Cli::try_parse_from(["cmdgpt", "-L", "loud", "cache", "stats"]).is_err());
    }

    #[test]
    fn cache_clean_help_matches_behavior() {
        let cli = Cli::command();
        let about = cli
            .find_subcommand("cache")
            .and_then(|cache| cache.find_subcommand("clean"))
            .and_then(|clean| clean.get_about())
            .unwrap()
            .to_string();
        assert!(about.starts_with("Remove expired entries"));
        assert!(!about.contains("unreadable"));
    }

    #[test]
    fn parse_limit_cleanup() {
        let cli = Cli::try_parse_from(["cmdgpt", "limit", "cleanup"]).unwrap();
        if let Command::Limit(LimitCommand {
            action: LimitAction::Cleanup(args),
        }) = cli.command
        {
            assert_eq!(args.max_age_hours, 24);
        } else {
            panic!("Expected limit cleanup");
        }

        let cli =
            Cli::try_parse_from(["cmdgpt", "limit", "cleanup", "--max-age-hours", "2"]).unwrap();
        if let Command::Limit(LimitCommand {
            action: LimitAction::Cleanup(args),
        }) = cli.command
        {
            assert_eq!(args.max_age_hours, 2);
        } else {
            panic!("Expected limit cleanup");
        }
    }

    #[test]
    fn parse_locks_clear() {
        let cli =
            Cli::try_parse_from(["cmdgpt", "locks", "clear", ".maintenance.lock", "--force"])
                .unwrap();
        if let Command::Locks(LocksCommand {
            action: LocksAction::Clear(args),
        }) = cli.command
        {
            assert_eq!(args.name, ".maintenance.lock");
            assert!(args.force);
        } else {
            panic!("Expected locks clear");
        }
    }

    #[test]
    fn parse_locks_clear_requires_name() {
        assert!(Cli::try_parse_from(["cmdgpt", "locks", "clear"]).is_err());
    }

    #[test]
    fn parse_config_init_force() {
        let cli = Cli::try_parse_from(["cmdgpt", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand {
                action: ConfigAction::Init(ConfigInitArgs { force: true })
            })
        ));
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["cmdgpt"]).is_err());
    }
}
