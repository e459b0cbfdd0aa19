//! Child process execution with a time budget.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::{HostError, Result};

/// Output from a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    /// Whether the command succeeded (exit code 0).
    pub success: bool,
}

impl CommandOutput {
    /// Standard output as trimmed text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Turn a failed command into a classified error, passing successes through.
    pub fn check(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let detail = if self.stderr.trim().is_empty() {
                self.stdout_text()
            } else {
                self.stderr.clone()
            };
            Err(HostError::classify(&detail))
        }
    }
}

/// Run `program args...` and collect its output.
///
/// `stdin` is written and closed before waiting. A command that outlives
/// `limit` is killed and reported as [`HostError::Timeout`].
pub async fn run_command(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    stdin: Option<&[u8]>,
    limit: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    tracing::debug!(program, args = ?args, cwd = ?cwd, "Running command");

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|e| HostError::Command {
        program: program.to_string(),
        source: e,
    })?;

    if let Some(input) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        pipe.write_all(input).await?;
        pipe.shutdown().await?;
    }

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            Ok(CommandOutput {
                stdout: output.stdout,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code,
                success: output.status.success(),
            })
        }
        Ok(Err(e)) => Err(HostError::Command {
            program: program.to_string(),
            source: e,
        }),
        Err(_) => Err(HostError::Timeout {
            program: program.to_string(),
            elapsed: started.elapsed(),
        }),
    }
}
