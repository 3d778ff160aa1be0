//! Command implementations for cmdgpt.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every handler receives the per-process [`AppContext`].

mod ask;
mod cache;
mod config_cmd;
mod limit;
mod locks;


use crate::cli::{CacheAction, Command, ConfigAction, LimitAction, LocksAction};
use crate::context::AppContext;
use crate::error::Result;

/// Dispatch a command to its implementation.
pub fn dispatch(ctx: &AppContext, command: Command) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Ask(args) => ask::cmd_ask(ctx, args, &mut std::io::stdin().lock(), &mut out),
        Command::Cache(cache_cmd) => match cache_cmd.action {
            CacheAction::Stats => cache::cmd_stats(ctx, &mut out),
            CacheAction::Clear => cache::cmd_clear(ctx, &mut out),
            CacheAction::Clean => cache::cmd_clean(ctx, &mut out),
        },
        Command::Limit(limit_cmd) => match limit_cmd.action {
            LimitAction::Status => limit::cmd_status(ctx, &mut out),
            LimitAction::Reset => limit::cmd_reset(ctx, &mut out),
            LimitAction::Cleanup(args) => limit::cmd_cleanup(ctx, args, &mut out),
        },
        Command::Locks(locks_cmd) => match locks_cmd.action {
            LocksAction::List => locks::cmd_list(ctx, &mut out),
            LocksAction::Clear(args) => locks::cmd_clear(ctx, args, &mut out),
        },
        Command::Config(config_cmd) => match config_cmd.action {
            ConfigAction::Init(args) => config_cmd::cmd_init(ctx, args, &mut out),
            ConfigAction::Show => config_cmd::cmd_show(ctx, &mut out),
        },
    }
}

/// Map a failed write to stdout into a user-facing error.
pub(crate) fn output_error(e: std::io::Error) -> crate::error::CmdGptError {
    crate::error::CmdGptError::UserError(format!("failed to write output: {}", e))
}
