//! External command runner for build-domain.
//!
//! Every call to `sfp` and `git` goes through this module. Captured runs keep
//! both output channels and the exit status so callers can interpret them;
//! a non-zero status is *not* an error here. Only a failure to spawn the
//! program at all is reported as `CommandError`.

use crate::error::{BuildDomainError, Result};
use std::process::{Command, Output};
use tracing::debug;

/// Placeholder written in place of secrets when a command line is displayed.
const MASK: &str = "***";

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output (trimmed).
    pub stdout: String,
    /// Standard error (trimmed).
    pub stderr: String,
    /// Exit status; -1 when the process was terminated by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The most useful diagnostic text: stderr, falling back to stdout.
    pub fn diagnostics(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    /// Returns true if either channel contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

/// Render a command line for logs, replacing every secret with `***`.
pub fn display_command(program: &str, args: &[String], secrets: &[&str]) -> String {
    let masked: Vec<&str> = std::iter::once(program)
        .chain(args.iter().map(|arg| {
            if secrets.iter().any(|s| !s.is_empty() && arg == s) {
                MASK
            } else {
                arg.as_str()
            }
        }))
        .collect();
    shell_words::join(masked)
}

/// Run a command and capture stdout/stderr.
///
/// # Returns
///
/// * `Ok(CommandOutput)` - The command ran to completion (any exit status)
/// * `Err(BuildDomainError::CommandError)` - The program could not be spawned
pub fn run_captured(program: &str, args: &[String], secrets: &[&str]) -> Result<CommandOutput> {
    debug!(command = %display_command(program, args, secrets), "running");

    let output = Command::new(program).args(args).output().map_err(|e| {
        BuildDomainError::CommandError(format!(
            "failed to execute {} {}: {}",
            program,
            args.first().map(String::as_str).unwrap_or(""),
            e
        ))
    })?;

    let captured = CommandOutput::from_output(&output);
    debug!(exit_code = captured.exit_code, "finished");
    Ok(captured)
}

/// Run a command with stdout/stderr inherited, for long-running steps whose
/// output should stream straight to the job log.
///
/// Returns the exit status; -1 when terminated by a signal.
pub fn run_streaming(program: &str, args: &[String], secrets: &[&str]) -> Result<i32> {
    debug!(command = %display_command(program, args, secrets), "running (streamed)");

    let status = Command::new(program).args(args).status().map_err(|e| {
        BuildDomainError::CommandError(format!(
            "failed to execute {} {}: {}\n\
             Fix: ensure the command is installed and in PATH.",
            program,
            args.first().map(String::as_str).unwrap_or(""),
            e
        ))
    })?;

    Ok(status.code().unwrap_or(-1))
}

/// Build an owned argument vector from string slices.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
