//! cmdgpt: prompt proxy with a cross-process response cache and a shared
//! rate limiter.
//!
//! This is the main entry point for the `cmdgpt` CLI. It parses arguments,
//! resolves state and configuration, installs logging, dispatches to the
//! appropriate command handler, and handles errors with proper exit codes.

mod backend;
mod cache;
mod cli;
mod commands;
mod config;
mod context;
mod error;
mod exit_codes;
mod fs;
mod locks;
mod logging;
mod ratelimit;

use cli::Cli;
use context::{AppContext, AppPaths};
use std::process::ExitCode;

fn run(cli: Cli) -> error::Result<()> {
    let paths = AppPaths::resolve(cli.state_dir, cli.config)?;
    let config = paths.load_config()?;
    logging::init(cli.log_level, &config)?;

    let ctx = AppContext::open(paths, config);
    commands::dispatch(&ctx, cli.command)
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match run(cli) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
