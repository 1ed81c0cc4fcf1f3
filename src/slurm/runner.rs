//! Child process execution with timeouts and a bounded health history.
//!
//! One call runs exactly one child. There is no retry at this level; the
//! refresh scheduler decides when to try again.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Entries kept in the command health ring.
pub const HISTORY_CAPACITY: usize = 300;

/// Failure modes of a single command invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("command not found: {program}")]
    NotFound { program: String },

    #[error("{program} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with code {exit_code}: {stderr}")]
    Failed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to execute {program}: {message}")]
    Io { program: String, message: String },
}

/// Captured result of a successful (exit 0) invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// One entry of the command health history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStat {
    pub command: String,
    pub ok: bool,
    pub latency_ms: u64,
    pub stderr: String,
    pub finished_at: DateTime<Local>,
}

/// Aggregate over the retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthSummary {
    pub total: usize,
    pub failures: usize,
    pub mean_latency_ms: f64,
}

/// Bounded ring of recent command outcomes, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    inner: Arc<Mutex<VecDeque<CommandStat>>>,
}

impl CommandHistory {
    pub fn record(&self, stat: CommandStat) {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.len() == HISTORY_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(stat);
    }

    /// The most recent `limit` entries, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<CommandStat> {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn summary(&self) -> HealthSummary {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if ring.is_empty() {
            return HealthSummary::default();
        }
        let total_latency: u64 = ring.iter().map(|s| s.latency_ms).sum();
        HealthSummary {
            total: ring.len(),
            failures: ring.iter().filter(|s| !s.ok).count(),
            mean_latency_ms: total_latency as f64 / ring.len() as f64,
        }
    }
}

/// Runs query commands with a fixed timeout and records their outcomes.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    history: CommandHistory,
}

impl CommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            history: CommandHistory::default(),
        }
    }

    #[must_use]
    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Run `program` with `args`, stdin closed, output captured.
    ///
    /// The child is killed if the timeout elapses or the returned future is
    /// dropped (for example when the fetch task is aborted).
    pub async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, CommandError> {
        let command_line = command_line(program, args);
        let started = Instant::now();
        let result = run_command(program, args, self.timeout).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (ok, stderr) = match &result {
            Ok(output) => (true, output.stderr.trim().to_string()),
            Err(CommandError::Failed { stderr, .. }) => (false, stderr.trim().to_string()),
            Err(e) => (false, e.to_string()),
        };
        debug!(command = %command_line, ok, latency_ms, "command finished");

        self.history.record(CommandStat {
            command: command_line,
            ok,
            latency_ms,
            stderr,
            finished_at: Local::now(),
        });
        result
    }
}

fn command_line(program: &Path, args: &[String]) -> String {
    let name = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
    std::iter::once(name)
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execute one child process, bounded by `timeout`.
pub async fn run_command(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    let name = program.display().to_string();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CommandError::NotFound {
                program: name.clone(),
            },
            _ => CommandError::Io {
                program: name.clone(),
                message: e.to_string(),
            },
        })?;

    // Dropping `wait_with_output` on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(CommandError::Io {
                program: name,
                message: e.to_string(),
            });
        }
        Err(_) => {
            return Err(CommandError::Timeout {
                program: name,
                timeout,
            });
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    } else {
        Err(CommandError::Failed {
            program: name,
            exit_code,
            stderr: stderr.trim().to_string(),
        })
    }
}
