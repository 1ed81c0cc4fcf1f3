//! Job output files: where Slurm writes them and their last lines.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::runner::{CommandError, CommandRunner};
use crate::parser::field;

/// Lines shown by the log viewer and `sqtop log`
pub const LOG_TAIL_LINES: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    #[default]
    Stdout,
    Stderr,
}

impl LogStream {
    /// Key of the path in `scontrol show job` output
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            LogStream::Stdout => "StdOut",
            LogStream::Stderr => "StdErr",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("job {job_id} has no {stream} file")]
    NoPath { job_id: String, stream: LogStream },

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// The tail of one output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    pub path: String,
    pub text: String,
}

/// Path of `stream` in job detail fields, if Slurm reported a usable one.
#[must_use]
pub fn log_path(fields: &[(String, String)], stream: LogStream) -> Option<String> {
    field(fields, stream.field_name())
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "(null)")
        .map(str::to_string)
}

/// Last `lines` lines of `path` through `tail`, so the read is bounded by the
/// runner's timeout even on a stuck network filesystem.
pub async fn tail(runner: &CommandRunner, path: &str, lines: usize) -> Result<String, CommandError> {
    let args = vec!["-n".to_string(), lines.to_string(), "--".to_string(), path.to_string()];
    let output = runner.run(Path::new("tail"), &args).await?;
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_key_values;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_log_path_from_job_detail() {
        let fields = parse_key_values(
            "JobId=7 JobName=train StdErr=/home/alice/train-7.err StdIn=/dev/null StdOut=/home/alice/train-7.out",
        );
        assert_eq!(log_path(&fields, LogStream::Stdout).as_deref(), Some("/home/alice/train-7.out"));
        assert_eq!(log_path(&fields, LogStream::Stderr).as_deref(), Some("/home/alice/train-7.err"));
    }

    #[test]
    fn test_missing_log_path() {
        let fields = parse_key_values("JobId=7 StdErr=(null) StdOut=");
        assert_eq!(log_path(&fields, LogStream::Stdout), None);
        assert_eq!(log_path(&fields, LogStream::Stderr), None);
        assert_eq!(log_path(&[], LogStream::Stdout), None);
    }

    #[tokio::test]
    async fn test_tail_keeps_last_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 1..=300 {
            writeln!(file, "line {i}").unwrap();
        }
        let runner = CommandRunner::new(Duration::from_secs(5));
        let path = file.path().to_string_lossy().into_owned();

        let text = tail(&runner, &path, LOG_TAIL_LINES).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), LOG_TAIL_LINES);
        assert_eq!(lines.first(), Some(&"line 101"));
        assert_eq!(lines.last(), Some(&"line 300"));

        let stat = runner.history().recent(1).pop().unwrap();
        assert!(stat.command.starts_with("tail -n 200"));
    }

    #[tokio::test]
    async fn test_tail_of_missing_file_fails() {
        let runner = CommandRunner::new(Duration::from_secs(5));
        let result = tail(&runner, "/nonexistent/sqtop/job.out", 10).await;
        assert!(matches!(result, Err(CommandError::Failed { .. })));
    }
}
