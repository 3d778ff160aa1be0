//! Implementation of the `cmdgpt limit` subcommands.

use super::output_error;
use crate::cli::LimitCleanupArgs;
use crate::context::AppContext;
use crate::error::{CmdGptError, Result};
use crate::locks::{FileLock, sidecar_path};
use crate::ratelimit::FileRateLimiter;
use std::fs;
use std::io::{ErrorKind, Write};
use std::time::Duration;
use tracing::warn;

pub fn cmd_status<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    let limiter = ctx.limiter()?;
    let available = limiter.get_available_tokens()?;
    let wait = limiter.time_until_available()?;

    writeln!(out, "State file: {}", limiter.state_file().display()).map_err(output_error)?;
    writeln!(
        out,
        "Rate:       {} requests/second (burst {})",
        limiter.rate(),
        limiter.capacity()
    )
    .map_err(output_error)?;
    writeln!(out, "Available:  {:.2} tokens", available).map_err(output_error)?;
    writeln!(out, "Next token: {}ms", wait.as_millis()).map_err(output_error)
}

/// Empty the bucket. An unreadable state file is replaced first.
pub fn cmd_reset<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    let limiter = match ctx.limiter() {
        Ok(limiter) => limiter,
        Err(CmdGptError::RateLimiterStateError(detail)) => {
            let state_file = ctx.ratelimit_state_file();
            warn!(path = %state_file.display(), %detail, "replacing unreadable rate limiter state");
            discard_state(&state_file, ctx.config.lock_timeout())?;
            ctx.limiter()?
        }
        Err(e) => return Err(e),
    };

    limiter.reset()?;
    writeln!(
        out,
        "Rate limiter reset: {} requests/second, burst {}.",
        limiter.rate(),
        limiter.capacity()
    )
    .map_err(output_error)
}

pub fn cmd_cleanup<W: Write>(ctx: &AppContext, args: LimitCleanupArgs, out: &mut W) -> Result<()> {
    let max_age = Duration::from_secs(args.max_age_hours.saturating_mul(3600));
    let state_file = ctx.ratelimit_state_file();
    let dir = state_file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ctx.paths.ratelimit_dir.clone());

    let removed = FileRateLimiter::cleanup_stale_files(&dir, max_age)?;
    writeln!(
        out,
        "Removed {} stale rate limiter file(s) from {}.",
        removed,
        dir.display()
    )
    .map_err(output_error)
}

fn discard_state(state_file: &std::path::Path, timeout: Duration) -> Result<()> {
    let _lock = FileLock::exclusive(sidecar_path(state_file), timeout)?;
    match fs::remove_file(state_file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CmdGptError::RateLimiterStateError(format!(
            "failed to remove '{}': {}",
            state_file.display(),
            e
        ))),
    }
}
