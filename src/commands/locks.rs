//! Implementation of the `cmdgpt locks` subcommands.
//!
//! Markers left behind by a crashed process are never reclaimed
//! automatically; `locks clear --force` is the manual path.

use super::output_error;
use crate::cli::LocksClearArgs;
use crate::context::AppContext;
use crate::error::{CmdGptError, Result};
use crate::locks::{clear_marker, list_markers};
use std::io::Write;

pub fn cmd_list<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    let dirs = ctx.paths.marker_dirs();
    let markers = list_markers(&dirs, ctx.config.lock_stale_minutes)?;

    if markers.is_empty() {
        return writeln!(out, "No lock markers.").map_err(output_error);
    }

    for marker in &markers {
        writeln!(out, "{}", marker).map_err(output_error)?;
        writeln!(out, "  {}", marker.path.display()).map_err(output_error)?;
    }

    let stale = markers.iter().filter(|m| m.is_stale).count();
    if stale > 0 {
        writeln!(
            out,
            "\n{} stale marker(s). Clear with `cmdgpt locks clear <NAME> --force`.",
            stale
        )
        .map_err(output_error)?;
    }
    Ok(())
}

pub fn cmd_clear<W: Write>(ctx: &AppContext, args: LocksClearArgs, out: &mut W) -> Result<()> {
    if !args.force {
        return Err(CmdGptError::UserError(format!(
            "refusing to clear '{}' without --force\n\
             A marker may belong to a running process; check `cmdgpt locks list` first.",
            args.name
        )));
    }

    let dirs = ctx.paths.marker_dirs();
    let info = clear_marker(&dirs, &args.name, ctx.config.lock_stale_minutes)?;
    writeln!(out, "Cleared {}", info).map_err(output_error)
}
