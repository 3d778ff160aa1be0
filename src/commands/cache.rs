//! Implementation of the `cmdgpt cache` subcommands.

use super::output_error;
use crate::context::AppContext;
use crate::error::Result;
use std::io::Write;

pub fn cmd_stats<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    let cache = ctx.require_cache()?;
    writeln!(out, "Cache:   {}", cache.dir().display()).map_err(output_error)?;
    writeln!(out, "{}", cache.get_stats()).map_err(output_error)
}

pub fn cmd_clear<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    let removed = ctx.require_cache()?.clear();
    writeln!(out, "Removed {} cache entries.", removed).map_err(output_error)
}

/// Remove expired entries only.
pub fn cmd_clean<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    let removed = ctx.require_cache()?.clean_expired();
    writeln!(out, "Removed {} expired cache entries.", removed).map_err(output_error)
}
