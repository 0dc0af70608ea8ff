//! Subprocess execution with combined output capture and a wall-clock bound.
//!
//! This module defines the [`ProcessRunner`] trait, the single seam through
//! which the rest of the crate talks to external tools. A runner receives a
//! structured [`CommandSpec`] (program plus argument list, never a shell
//! string), a log file that collects stdout and stderr verbatim, and an
//! optional timeout. It reports how the process ended and nothing else; the
//! output is interpreted elsewhere.
//!
//! [`SystemRunner`] is the real implementation built on `tokio::process`.
//! Tests substitute scripted fakes.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CommandSpec;

/// Errors that prevent a process from being run at all.
///
/// A process that runs and exits non-zero, or that times out, is not an
/// error; see [`ProcessOutcome`].
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The log file could not be opened for appending.
    #[error("Failed to open log {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The program could not be started (not found, not executable, ...).
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or killing the child failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a launched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own. `code` is `None` when it was ended by
    /// a signal.
    Exited { code: Option<i32> },

    /// The timeout elapsed and the process was killed.
    TimedOut,
}

impl ProcessOutcome {
    /// True only for a normal exit with status 0.
    pub fn success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited { code: Some(0) })
    }
}

/// Runs external commands on behalf of the invoker and coverage merger.
///
/// Implementations must append (not truncate) to `log`, so callers can write
/// header lines before the command output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `command` to completion or until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Log`] if the log file cannot be opened
    /// - [`ProcessError::Spawn`] if the program cannot be started
    /// - [`ProcessError::Io`] if waiting on the child fails
    async fn run(
        &self,
        command: &CommandSpec,
        log: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome, ProcessError>;
}

/// [`ProcessRunner`] backed by real operating-system processes.
///
/// Stdin is closed. Stdout and stderr share one append-mode handle on the
/// log file so their interleaving is preserved. On timeout the child is
/// killed and reaped before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        log: &Path,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .map_err(|source| ProcessError::Log {
                path: log.to_path_buf(),
                source,
            })?;
        let stderr = stdout.try_clone()?;

        debug!(cmd = %command.display_line(), log = %log.display(), "spawning");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let status = match timeout {
            None => child.wait().await?,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        cmd = %command.display_line(),
                        timeout_secs = limit.as_secs_f64(),
                        "timeout elapsed, killing process"
                    );
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill timed-out process");
                    }
                    return Ok(ProcessOutcome::TimedOut);
                }
            },
        };

        debug!(cmd = %command.program, code = ?status.code(), "process exited");
        Ok(ProcessOutcome::Exited {
            code: status.code(),
        })
    }
}
