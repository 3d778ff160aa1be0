//! Implementation of the `cmdgpt ask` command.
//!
//! 1. Read the prompt (argument or stdin)
//! 2. Return a cached response if one is valid
//! 3. Otherwise wait for rate budget, run the backend, and cache the result

use super::output_error;
use crate::backend::{Backend, BackendRequest};
use crate::cache::generate_key;
use crate::cli::{AskArgs, OutputFormat};
use crate::context::AppContext;
use crate::error::{CmdGptError, Result};
use serde::Serialize;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Largest accepted prompt, in bytes.
pub const MAX_PROMPT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
struct AskOutput<'a> {
    response: &'a str,
    model: &'a str,
    cached: bool,
    key: &'a str,
}

/// Execute the `cmdgpt ask` command, reading a missing prompt from `input`.
pub fn cmd_ask<R: Read, W: Write>(
    ctx: &AppContext,
    args: AskArgs,
    input: &mut R,
    out: &mut W,
) -> Result<()> {
    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => read_prompt(input)?,
    };
    check_prompt(&prompt)?;

    let model = args.model.unwrap_or_else(|| ctx.config.model.clone());
    let system_prompt = args
        .system_prompt
        .unwrap_or_else(|| ctx.config.system_prompt.clone());
    let key = generate_key(&[prompt.as_str(), model.as_str(), system_prompt.as_str()]);

    let cache = if args.no_cache { None } else { ctx.cache() };

    if let Some(cache) = cache
        && let Some(response) = cache.get(&key)?
    {
        return emit(out, args.format, &response, &model, true, &key);
    }

    let max_wait = args
        .max_wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| ctx.config.rate_limit_max_wait());
    let limiter = ctx.limiter()?;
    if !limiter.acquire(1, max_wait)? {
        return Err(CmdGptError::RateLimited(format!(
            "no request budget became available within {}ms\n\
             Shared limit: {} requests/second, burst {} (state: {})",
            max_wait.as_millis(),
            limiter.rate(),
            limiter.capacity(),
            limiter.state_file().display()
        )));
    }

    let backend = Backend::new(ctx.config.backend_command.clone(), ctx.config.backend_timeout());
    let response = backend.run(&BackendRequest {
        prompt: &prompt,
        model: &model,
        system_prompt: &system_prompt,
    })?;

    if let Some(cache) = cache {
        if response.trim().is_empty() {
            debug!(key = %key, "empty response not cached");
        } else {
            cache.put(&key, &response)?;
        }
    }

    emit(out, args.format, &response, &model, false, &key)
}

fn read_prompt<R: Read>(input: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    input
        .take(MAX_PROMPT_BYTES as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| CmdGptError::UserError(format!("failed to read prompt from stdin: {}", e)))?;

    // The cut may split a character; report the size first.
    if bytes.len() > MAX_PROMPT_BYTES {
        return Err(oversized_prompt());
    }
    String::from_utf8(bytes)
        .map_err(|_| CmdGptError::UserError("prompt on stdin is not valid UTF-8".to_string()))
}

fn check_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(CmdGptError::UserError(
            "prompt is empty\n\
             Fix: pass the prompt as an argument or pipe it on stdin."
                .to_string(),
        ));
    }
    if prompt.len() > MAX_PROMPT_BYTES {
        return Err(oversized_prompt());
    }
    Ok(())
}

fn oversized_prompt() -> CmdGptError {
    CmdGptError::UserError(format!("prompt exceeds {} bytes", MAX_PROMPT_BYTES))
}

fn emit<W: Write>(
    out: &mut W,
    format: OutputFormat,
    response: &str,
    model: &str,
    cached: bool,
    key: &str,
) -> Result<()> {
    let written = match format {
        OutputFormat::Plain => writeln!(out, "{}", response),
        OutputFormat::Json => {
            let json = serde_json::to_string(&AskOutput {
                response,
                model,
                cached,
                key,
            })
            .map_err(|e| CmdGptError::UserError(format!("failed to encode output: {}", e)))?;
            writeln!(out, "{}", json)
        }
    };

    written.map_err(output_error)
}
