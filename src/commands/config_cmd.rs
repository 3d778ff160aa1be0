//! Implementation of the `cmdgpt config` subcommands.

use super::output_error;
use crate::cli::ConfigInitArgs;
use crate::config::Config;
use crate::context::AppContext;
use crate::error::{CmdGptError, Result};
use crate::fs::atomic_write_file;
use std::io::Write;

/// Write the default config template to the resolved config path.
pub fn cmd_init<W: Write>(ctx: &AppContext, args: ConfigInitArgs, out: &mut W) -> Result<()> {
    let path = &ctx.paths.config_file;
    if path.exists() && !args.force {
        return Err(CmdGptError::UserError(format!(
            "config file already exists: {}\n\
             Fix: pass --force to overwrite it.",
            path.display()
        )));
    }

    atomic_write_file(path, &Config::default_template()?)?;
    writeln!(out, "Wrote {}", path.display()).map_err(output_error)
}

/// Print the effective config (file plus environment overrides).
pub fn cmd_show<W: Write>(ctx: &AppContext, out: &mut W) -> Result<()> {
    writeln!(out, "# {}", ctx.paths.config_file.display()).map_err(output_error)?;
    write!(out, "{}", ctx.config.to_yaml()?).map_err(output_error)
}
