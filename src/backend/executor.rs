//! Backend subprocess executor.
//!
//! Runs the configured backend command with the prompt on stdin, a timeout,
//! and stdout captured as the response.

use super::template::{TemplateError, render_template, variable_names};
use crate::error::{CmdGptError, Result};
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The request handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub system_prompt: &'a str,
}

/// A backend command template plus its execution limits.
#[derive(Debug, Clone)]
pub struct Backend {
    /// Command template, e.g. `llm -m {model} -s {system_prompt}`.
    pub command: String,
    /// Maximum run time before the process is killed. Zero disables the limit.
    pub timeout: Duration,
}

impl Backend {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Render the command template into program and arguments.
    pub fn argv(&self, request: &BackendRequest<'_>) -> Result<Vec<String>> {
        if self.command.trim().is_empty() {
            return Err(CmdGptError::UserError(
                "no backend command configured\n\
                 Fix: set `backend_command` in config.yaml or export CMDGPT_BACKEND, \
                 e.g. CMDGPT_BACKEND='llm -m {model} -s {system_prompt}'"
                    .to_string(),
            ));
        }

        let variables = HashMap::from([
            ("model", request.model),
            ("system_prompt", request.system_prompt),
        ]);

        let rendered = render_template(&self.command, &variables).map_err(|e| match e {
            TemplateError::UndefinedVariable { name, .. } => CmdGptError::UserError(format!(
                "backend command references undefined variable '{}'\n\
                 Command: {}\n\
                 Available variables: {}",
                name,
                self.command,
                variable_names(&variables)
            )),
            other => CmdGptError::UserError(format!("invalid backend command: {}", other)),
        })?;

        let args = shell_words::split(&rendered).map_err(|e| {
            CmdGptError::UserError(format!(
                "failed to parse backend command '{}': {}\n\
                 Fix: check for unmatched quotes or invalid escape sequences.",
                rendered, e
            ))
        })?;

        if args.is_empty() {
            return Err(CmdGptError::UserError(format!(
                "backend command is empty after parsing: '{}'",
                rendered
            )));
        }

        Ok(args)
    }

    /// Run the backend for `request` and return its trimmed stdout.
    ///
    /// # Errors
    ///
    /// * `CmdGptError::UserError` - the command template is missing or invalid
    /// * `CmdGptError::BackendError` - spawn failure, non-zero exit, timeout,
    ///   or output that is not UTF-8
    pub fn run(&self, request: &BackendRequest<'_>) -> Result<String> {
        let args = self.argv(request)?;
        let program = &args[0];

        // Stdout goes to an anonymous temp file so a large response cannot
        // fill a pipe while we are polling for exit.
        let mut stdout = tempfile::tempfile().map_err(|e| {
            CmdGptError::BackendError(format!("failed to create output buffer: {}", e))
        })?;
        let stdout_handle = stdout.try_clone().map_err(|e| {
            CmdGptError::BackendError(format!("failed to create output buffer: {}", e))
        })?;

        let mut command = Command::new(program);
        command
            .args(&args[1..])
            .env("CMDGPT_MODEL", request.model)
            .env("CMDGPT_SYSTEM_PROMPT", request.system_prompt)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout_handle))
            .stderr(Stdio::inherit());

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            CmdGptError::BackendError(format!(
                "failed to execute backend command '{}': {}\n\
                 Fix: ensure the command is installed and in PATH.",
                program, e
            ))
        })?;
        debug!(program = %program, pid = child.id(), "backend started");

        let feeder = child.stdin.take().map(|mut stdin| {
            let prompt = request.prompt.to_string();
            // The backend may exit without reading its input: a broken pipe is fine.
            thread::spawn(move || {
                let _ = stdin.write_all(prompt.as_bytes());
            })
        });

        let status = wait_with_timeout(&mut child, self.timeout);
        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        let status = status?;
        debug!(program = %program, elapsed_ms = start.elapsed().as_millis() as u64, "backend finished");

        let Some(status) = status else {
            return Err(CmdGptError::BackendError(format!(
                "'{}' timed out after {}s and was killed",
                program,
                self.timeout.as_secs()
            )));
        };

        if !status.success() {
            let detail = match status.code() {
                Some(code) => format!("exit code {}", code),
                None => "termination by signal".to_string(),
            };
            return Err(CmdGptError::BackendError(format!(
                "'{}' failed with {}",
                program, detail
            )));
        }

        let mut bytes = Vec::new();
        stdout
            .seek(SeekFrom::Start(0))
            .and_then(|_| stdout.read_to_end(&mut bytes))
            .map_err(|e| CmdGptError::BackendError(format!("failed to read output: {}", e)))?;

        let text = String::from_utf8(bytes)
            .map_err(|_| CmdGptError::BackendError(format!("'{}' wrote non-UTF-8 output", program)))?;

        Ok(text.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Wait for a child process, killing it once `timeout` elapses.
///
/// Returns `None` when the process was killed. A zero `timeout` waits forever.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {
                if !timeout.is_zero() && start.elapsed() >= timeout {
                    // SIGKILL on Unix, TerminateProcess on Windows.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(None);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(CmdGptError::BackendError(format!(
                    "failed to check backend status: {}",
                    e
                )));
            }
        }
    }
}
