//! run tool - shell command execution with timeout and kill escalation

use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::context::SandboxContext;
use super::params::RunParams;
use super::ToolError;

/// Longest command output before truncation, in bytes
const MAX_OUTPUT_BYTES: usize = 30_000;

/// Delay between graceful termination and forced kill
const KILL_GRACE: Duration = Duration::from_millis(2_000);

/// Execute a shell command in the project root
///
/// The command runs through the host's default shell with a bounded
/// timeout. On timeout or cancellation the process receives SIGTERM, then
/// SIGKILL after a grace period if it has not exited.
pub async fn run(ctx: &SandboxContext, params: RunParams, cancel: &CancellationToken) -> Result<String, ToolError> {
    debug!(command = %params.command, "shell::run: called");

    let timeout_ms = params.timeout_ms.unwrap_or(ctx.command_timeout_ms);
    let command = preprocess_search_command(&params.command, &ctx.denylist);
    if command != params.command {
        debug!(%command, "shell::run: search command rewritten with exclusions");
    }

    let mut child = tokio::process::Command::new(&ctx.shell_path)
        .arg("-c")
        .arg(&command)
        .current_dir(&ctx.root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let pid = child.id();

    let output = tokio::select! {
        result = child.wait_with_output() => result?,
        _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
            debug!(%timeout_ms, "shell::run: command timed out");
            terminate(pid);
            return Err(ToolError::CommandTimeout { timeout_ms });
        }
        _ = cancel.cancelled() => {
            debug!("shell::run: run cancelled while command in flight");
            terminate(pid);
            return Err(ToolError::RunCancelled);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(status = ?output.status, stdout_len = %stdout.len(), stderr_len = %stderr.len(), "shell::run: command completed");

    let result = if stdout.is_empty() && !stderr.is_empty() {
        stderr.to_string()
    } else if stderr.is_empty() {
        stdout.to_string()
    } else {
        format!("{}\n\nSTDERR:\n{}", stdout, stderr)
    };

    let truncated = truncate_output(&result);

    if output.status.success() {
        Ok(truncated)
    } else {
        Err(ToolError::CommandFailed {
            code: output.status.code().unwrap_or(-1),
            output: truncated,
        })
    }
}

/// SIGTERM now, SIGKILL after the grace period if still alive
///
/// The forced kill runs detached so the caller reports the timeout without
/// waiting out the grace period.
fn terminate(pid: Option<u32>) {
    let Some(raw) = pid else {
        return;
    };
    let pid = Pid::from_raw(raw as i32);
    let _ = signal::kill(pid, Signal::SIGTERM);
    tokio::spawn(async move {
        tokio::time::sleep(KILL_GRACE).await;
        if signal::kill(pid, None).is_ok() {
            debug!(%pid, "shell::terminate: process survived SIGTERM, sending SIGKILL");
            let _ = signal::kill(pid, Signal::SIGKILL);
        }
    });
}

/// Append directory-exclusion flags to recognized recursive search commands
///
/// Only bare invocations are rewritten; anything with pipes or chaining is
/// left alone.
fn preprocess_search_command(command: &str, denylist: &[String]) -> String {
    let trimmed = command.trim_start();

    if command.contains('|') || command.contains(';') || command.contains("&&") {
        return command.to_string();
    }

    let is_recursive_grep = trimmed.starts_with("grep ")
        && (trimmed.contains(" -r") || trimmed.contains(" -R"))
        && !trimmed.contains("--exclude-dir");
    if is_recursive_grep {
        let flags: String = denylist.iter().map(|d| format!(" --exclude-dir={}", d)).collect();
        return format!("{}{}", command, flags);
    }

    let is_rg = (trimmed.starts_with("rg ") || trimmed == "rg")
        && !trimmed.contains(" -g ")
        && !trimmed.contains("--glob");
    if is_rg {
        let flags: String = denylist.iter().map(|d| format!(" -g '!{}'", d)).collect();
        return format!("{}{}", command, flags);
    }

    command.to_string()
}

/// Cut command output at the cap, on a char boundary
fn truncate_output(result: &str) -> String {
    if result.len() <= MAX_OUTPUT_BYTES {
        return result.to_string();
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !result.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...\n[truncated, {} bytes total]", &result[..end], result.len())
}
