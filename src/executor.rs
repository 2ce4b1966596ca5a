//! Running the configured command inside a request workspace.
//!
//! Every failure mode is folded into the returned [`ExecutionResult`]: a
//! command that cannot be found, cannot be started, is killed by a signal or
//! runs past the configured timeout reports status `-1`. Output is captured
//! with stdout and stderr kept apart.

use crate::artifacts::{self, Artifacts};
use crate::config::Config;
use serde::Serialize;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Status reported when the command could not run or did not exit normally.
pub const FAILED_STATUS: i32 = -1;

/// Outcome of one run, serialized as the `/process` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub artifacts: Artifacts,
}

struct Captured {
    status: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Captured {
    fn failed() -> Self {
        Self {
            status: FAILED_STATUS,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Clear stale artifacts, run the command in `workspace`, then collect artifacts.
pub async fn run(config: &Config, workspace: &Path) -> ExecutionResult {
    artifacts::clear(&config.artifacts, workspace).await;

    let captured = execute(config, workspace).await;
    let artifacts = artifacts::collect(&config.artifacts, workspace).await;

    ExecutionResult {
        status: captured.status,
        stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
        artifacts,
    }
}

async fn execute(config: &Config, workspace: &Path) -> Captured {
    info!(command = %config.command, arguments = ?config.arguments, "Starting the command");

    let program = match lookup_command(&config.command) {
        Ok(program) => program,
        Err(e) => {
            error!(command = %config.command, error = %e, "Failed to find the command");
            return Captured::failed();
        }
    };

    let mut child = match Command::new(&program)
        .args(&config.arguments)
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!(program = %program.display(), error = %e, "Failed to start the command");
            return Captured::failed();
        }
    };

    let (Some(mut child_stdout), Some(mut child_stderr)) = (child.stdout.take(), child.stderr.take())
    else {
        error!("Command output pipes are unavailable");
        let _ = child.kill().await;
        return Captured::failed();
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    // The child is borrowed, not moved, so it can still be killed on timeout.
    let finished = async {
        let (out, err) = tokio::join!(
            child_stdout.read_to_end(&mut stdout),
            child_stderr.read_to_end(&mut stderr),
        );
        if let Err(e) = out {
            warn!(error = %e, "Failed to read command stdout");
        }
        if let Err(e) = err {
            warn!(error = %e, "Failed to read command stderr");
        }
        child.wait().await
    };

    let waited = match config.timeout {
        Some(limit) => tokio::time::timeout(limit, finished).await.ok(),
        None => Some(finished.await),
    };

    let status = match waited {
        Some(Ok(status)) => exit_status(status),
        Some(Err(e)) => {
            error!(error = %e, "Failed to wait for the command");
            FAILED_STATUS
        }
        None => {
            warn!(timeout = ?config.timeout, "Command timed out, killing it");
            if let Err(e) = child.kill().await {
                error!(error = %e, "Failed to kill the timed out command");
            }
            FAILED_STATUS
        }
    };

    info!(status, stdout_len = stdout.len(), stderr_len = stderr.len(), "Command finished");

    Captured {
        status,
        stdout,
        stderr,
    }
}

fn exit_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    match status.signal() {
        Some(signal) => {
            let name = nix::sys::signal::Signal::try_from(signal)
                .map(|s| s.as_str())
                .unwrap_or("unknown");
            warn!(signal, name, "Command terminated by a signal");
        }
        None => warn!(?status, "Command terminated abnormally"),
    }
    FAILED_STATUS
}

/// Find the executable for `command`.
///
/// Names containing a `/` are taken as paths relative to the agent's own
/// directory; bare names are searched in `PATH`.
pub fn lookup_command(command: &str) -> io::Result<PathBuf> {
    if command.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no command configured",
        ));
    }

    if command.contains('/') {
        let path = std::env::current_dir()?.join(command);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{command} is not an executable file"),
            ))
        };
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&search)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{command} not found in PATH"),
            )
        })
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
