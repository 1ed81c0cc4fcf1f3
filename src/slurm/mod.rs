//! Interface to the Slurm command line tools.
//!
//! Resolves where the binaries live, builds the argument lists for the
//! three periodic queries and the drill-down queries, and builds the `srun`
//! attach command. Execution goes through [`runner::CommandRunner`].

pub mod logs;
pub mod runner;
pub mod shell;

use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::warn;

use crate::config::{AttachConfig, QueryLayouts};
use crate::models::EntityKind;
use crate::parser::{DetailFields, parse_key_values};
use logs::{LogError, LogStream, LogTail};
use runner::{CommandError, CommandRunner};
use shell::{ShellSplitError, split_words};

/// How the Slurm binary path was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathResolution {
    /// Explicitly configured via config file or environment variable
    Configured,
    /// Found `sinfo` in PATH
    AutoDetected,
    /// Fell back to /usr/bin and sinfo was found there
    Fallback,
    /// Fell back to /usr/bin but sinfo was NOT found (likely misconfigured)
    FallbackUnverified,
}

/// Result of finding the Slurm binary path
#[derive(Debug, Clone)]
pub struct SlurmPathResult {
    pub path: PathBuf,
    pub resolution: PathResolution,
}

/// Find the directory containing Slurm binaries.
///
/// Resolution order:
/// 1. Explicit path from configuration, if it is an existing directory.
/// 2. The parent directory of `sinfo` found via PATH.
/// 3. `/usr/bin`.
pub fn find_slurm_bin_path(config_path: Option<&Path>) -> SlurmPathResult {
    if let Some(path) = config_path {
        if path.is_dir() {
            return SlurmPathResult {
                path: path.to_path_buf(),
                resolution: PathResolution::Configured,
            };
        }
        warn!(
            path = %path.display(),
            "configured slurm_bin_path is not a directory, trying auto-detection"
        );
    }

    if let Ok(sinfo_path) = which::which("sinfo")
        && let Some(parent) = sinfo_path.parent()
    {
        return SlurmPathResult {
            path: parent.to_path_buf(),
            resolution: PathResolution::AutoDetected,
        };
    }

    let fallback_path = PathBuf::from("/usr/bin");
    let resolution = if fallback_path.join("sinfo").exists() {
        PathResolution::Fallback
    } else {
        PathResolution::FallbackUnverified
    };
    SlurmPathResult {
        path: fallback_path,
        resolution,
    }
}

/// Source of raw query output for the refresh scheduler.
///
/// The returned future must not borrow `self` so the scheduler can spawn it
/// and abort it independently.
pub trait ClusterSource: Send + Sync + 'static {
    fn fetch(&self, kind: EntityKind) -> BoxFuture<'static, Result<String, CommandError>>;

    /// Per-node detail carrying GPU allocation, run alongside every node
    /// query. Sources without GPU accounting report nothing.
    fn fetch_gpu_usage(&self) -> BoxFuture<'static, Result<String, CommandError>> {
        async { Ok(String::new()) }.boxed()
    }
}

/// A fully built attach command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl std::fmt::Display for AttachCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .program
            .file_name()
            .map_or_else(|| self.program.display().to_string(), |n| n.to_string_lossy().into_owned());
        write!(f, "{}", name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Build `srun --pty --overlap [extra...] --jobid ID [-w NODE] [command...]`.
///
/// `lookup` resolves `$VAR` references in both configurable parts.
pub fn build_attach_command<F>(
    srun: PathBuf,
    job_id: &str,
    node: Option<&str>,
    settings: &AttachConfig,
    lookup: F,
) -> Result<AttachCommand, ShellSplitError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut args: Vec<String> = vec!["--pty".to_string(), "--overlap".to_string()];
    args.extend(split_words(&settings.extra_args, &lookup)?);
    args.push("--jobid".to_string());
    args.push(job_id.to_string());
    if let Some(node) = node.map(str::trim).filter(|n| !n.is_empty()) {
        args.push("-w".to_string());
        args.push(node.to_string());
    }
    args.extend(split_words(&settings.default_command, &lookup)?);

    Ok(AttachCommand { program: srun, args })
}

/// Handle to the Slurm tools. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SlurmInterface {
    pub slurm_bin_path: PathBuf,
    resolution: PathResolution,
    runner: CommandRunner,
    layouts: QueryLayouts,
}

impl SlurmInterface {
    pub fn with_config(config_path: Option<&Path>, runner: CommandRunner, layouts: QueryLayouts) -> Self {
        let result = find_slurm_bin_path(config_path);
        Self {
            slurm_bin_path: result.path,
            resolution: result.resolution,
            runner,
            layouts,
        }
    }

    /// True when sinfo could not be found anywhere; commands will fail.
    #[must_use]
    pub fn is_unverified_fallback(&self) -> bool {
        self.resolution == PathResolution::FallbackUnverified
    }

    #[must_use]
    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Program and arguments for the periodic query of `kind`.
    #[must_use]
    pub fn query(&self, kind: EntityKind) -> (PathBuf, Vec<String>) {
        match kind {
            EntityKind::Jobs => (
                self.slurm_bin_path.join("squeue"),
                vec![
                    "--noheader".to_string(),
                    "-o".to_string(),
                    self.layouts.jobs.format().to_string(),
                ],
            ),
            EntityKind::Nodes => (
                self.slurm_bin_path.join("sinfo"),
                vec![
                    "-N".to_string(),
                    "--noheader".to_string(),
                    "-o".to_string(),
                    self.layouts.nodes.format().to_string(),
                ],
            ),
            EntityKind::Partitions => (
                self.slurm_bin_path.join("scontrol"),
                vec![
                    "show".to_string(),
                    "partition".to_string(),
                    "--oneliner".to_string(),
                ],
            ),
        }
    }

    /// Program and arguments for the GPU allocation query.
    #[must_use]
    pub fn gpu_query(&self) -> (PathBuf, Vec<String>) {
        (
            self.slurm_bin_path.join("scontrol"),
            vec!["show".to_string(), "nodes".to_string(), "--oneliner".to_string()],
        )
    }

    /// `scontrol show job <id>` as ordered key/value pairs.
    pub async fn show_job(&self, job_id: &str) -> Result<DetailFields, CommandError> {
        self.show("job", job_id).await
    }

    /// `scontrol show node <name>` as ordered key/value pairs.
    pub async fn show_node(&self, hostname: &str) -> Result<DetailFields, CommandError> {
        self.show("node", hostname).await
    }

    /// Path and last `lines` lines of a job's stdout or stderr file.
    pub async fn fetch_log(&self, job_id: &str, stream: LogStream, lines: usize) -> Result<LogTail, LogError> {
        let fields = self.show_job(job_id).await?;
        let path = logs::log_path(&fields, stream).ok_or_else(|| LogError::NoPath {
            job_id: job_id.to_string(),
            stream,
        })?;
        let text = logs::tail(&self.runner, &path, lines).await?;
        Ok(LogTail { path, text })
    }

    async fn show(&self, entity: &str, name: &str) -> Result<DetailFields, CommandError> {
        let program = self.slurm_bin_path.join("scontrol");
        let args = vec!["show".to_string(), entity.to_string(), name.to_string()];
        let output = self.runner.run(&program, &args).await?;
        Ok(parse_key_values(&output.stdout))
    }

    /// Current username from the environment
    #[must_use]
    pub fn current_user() -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| {
                warn!("could not determine username from USER or LOGNAME");
                "unknown".to_string()
            })
    }
}

impl ClusterSource for SlurmInterface {
    fn fetch(&self, kind: EntityKind) -> BoxFuture<'static, Result<String, CommandError>> {
        let runner = self.runner.clone();
        let (program, args) = self.query(kind);
        async move { runner.run(&program, &args).await.map(|out| out.stdout) }.boxed()
    }

    fn fetch_gpu_usage(&self) -> BoxFuture<'static, Result<String, CommandError>> {
        let runner = self.runner.clone();
        let (program, args) = self.gpu_query();
        async move { runner.run(&program, &args).await.map(|out| out.stdout) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(default_command: &str, extra_args: &str) -> AttachConfig {
        AttachConfig {
            enabled: true,
            default_command: default_command.to_string(),
            extra_args: extra_args.to_string(),
        }
    }

    fn no_vars(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_attach_command_with_node_and_extra_args() {
        let cmd = build_attach_command(
            PathBuf::from("/usr/bin/srun"),
            "12345",
            Some("c2"),
            &settings("bash -l", "--mpi=none"),
            no_vars,
        )
        .unwrap();
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/srun"));
        assert_eq!(
            cmd.args,
            vec!["--pty", "--overlap", "--mpi=none", "--jobid", "12345", "-w", "c2", "bash", "-l"]
        );
        assert_eq!(
            cmd.to_string(),
            "srun --pty --overlap --mpi=none --jobid 12345 -w c2 bash -l"
        );
    }

    #[test]
    fn test_attach_command_without_node() {
        let cmd = build_attach_command(
            PathBuf::from("srun"),
            "12345",
            None,
            &settings("bash -l", ""),
            no_vars,
        )
        .unwrap();
        assert!(!cmd.args.iter().any(|a| a == "-w"));
    }

    #[test]
    fn test_attach_command_expands_shell() {
        let cmd = build_attach_command(
            PathBuf::from("srun"),
            "7",
            Some("g01"),
            &AttachConfig::default(),
            |name| (name == "SHELL").then(|| "/bin/zsh".to_string()),
        )
        .unwrap();
        assert_eq!(&cmd.args[cmd.args.len() - 2..], ["/bin/zsh", "-l"]);
    }

    #[test]
    fn test_attach_command_rejects_bad_quoting() {
        let result = build_attach_command(
            PathBuf::from("srun"),
            "7",
            None,
            &settings("bash -c 'oops", ""),
            no_vars,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_query_arguments_follow_layouts() {
        let slurm = SlurmInterface::with_config(
            Some(Path::new("/")),
            CommandRunner::new(std::time::Duration::from_secs(1)),
            QueryLayouts::default(),
        );
        let (program, args) = slurm.query(EntityKind::Nodes);
        assert_eq!(program, PathBuf::from("/sinfo"));
        assert_eq!(args[0], "-N");
        assert_eq!(args.last().map(String::as_str), Some(crate::parser::layout::DEFAULT_NODES_FORMAT));

        let (program, args) = slurm.query(EntityKind::Partitions);
        assert_eq!(program, PathBuf::from("/scontrol"));
        assert_eq!(args, vec!["show", "partition", "--oneliner"]);

        let (program, args) = slurm.gpu_query();
        assert_eq!(program, PathBuf::from("/scontrol"));
        assert_eq!(args, vec!["show", "nodes", "--oneliner"]);
    }

    #[test]
    fn test_find_slurm_bin_path_prefers_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = find_slurm_bin_path(Some(dir.path()));
        assert_eq!(result.path, dir.path());
        assert_eq!(result.resolution, PathResolution::Configured);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_log_reads_path_from_job_detail() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("train-7.out");
        std::fs::write(&log, "epoch 1\nepoch 2\nepoch 3\n").unwrap();
        let script = dir.path().join("scontrol");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"JobId=$3 StdErr=(null) StdOut={}\"\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let slurm = SlurmInterface::with_config(
            Some(dir.path()),
            CommandRunner::new(std::time::Duration::from_secs(5)),
            QueryLayouts::default(),
        );
        let tail = slurm.fetch_log("7", LogStream::Stdout, 2).await.unwrap();
        assert_eq!(tail.path, log.display().to_string());
        assert_eq!(tail.text, "epoch 2\nepoch 3\n");

        let missing = slurm.fetch_log("7", LogStream::Stderr, 2).await;
        assert!(matches!(missing, Err(LogError::NoPath { stream: LogStream::Stderr, .. })));
    }
}
