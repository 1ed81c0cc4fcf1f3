//! Attach orchestration: hand the terminal to an interactive `srun` shell.
//!
//! Single-flight state machine:
//!
//! ```text
//! Normal --request_attach--> AttachRequested --run_attach--> Suspended --exit--> Normal
//! ```
//!
//! While `Suspended` the refresh scheduler is paused and the dashboard has
//! released the terminal. Whatever the child does, the orchestrator returns to
//! `Normal`, reacquires the terminal and resumes refreshing.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Local;
use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AttachConfig;
use crate::models::Job;
use crate::refresh::{RefreshError, RefreshHandle, SchedulerState};
use crate::slurm::runner::{CommandHistory, CommandStat};
use crate::slurm::shell::{ShellSplitError, env_lookup};
use crate::slurm::{AttachCommand, build_attach_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Normal,
    AttachRequested,
    Suspended,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachError {
    #[error("cannot attach: {0}")]
    InvalidAttachTarget(String),

    #[error("an attach session is already in progress")]
    AttachInProgress,

    #[error("attach is disabled in configuration")]
    AttachDisabled,

    #[error("invalid attach command: {0}")]
    Command(#[from] ShellSplitError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error("terminal handover failed: {0}")]
    Terminal(String),
}

/// Gives the terminal away to a child and takes it back.
pub trait TerminalControl {
    fn release(&mut self) -> BoxFuture<'_, std::io::Result<()>>;

    fn reacquire(&mut self) -> BoxFuture<'_, std::io::Result<()>>;
}

/// Runs the attach command in the foreground and reports its exit code.
pub trait ShellLauncher {
    fn launch(&self, command: &AttachCommand) -> BoxFuture<'static, std::io::Result<i32>>;
}

/// Launches with inherited stdio on a blocking thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForegroundLauncher;

impl ShellLauncher for ForegroundLauncher {
    fn launch(&self, command: &AttachCommand) -> BoxFuture<'static, std::io::Result<i32>> {
        let command = command.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let status = std::process::Command::new(&command.program)
                    .args(&command.args)
                    .status()?;
                Ok(exit_code(status))
            })
            .await
            .map_err(std::io::Error::other)?
        }
        .boxed()
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Validated attach request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachPlan {
    pub job_id: String,
    pub node: String,
    pub command: AttachCommand,
}

/// Result of a finished attach session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOutcome {
    pub job_id: String,
    pub node: String,
    /// Child exit code, or the reason it could not be started.
    pub exit: Result<i32, String>,
}

impl AttachOutcome {
    #[must_use]
    pub fn summary(&self) -> String {
        match &self.exit {
            Ok(0) => format!("Session on {} (job {}) ended", self.node, self.job_id),
            Ok(code) => format!(
                "Session on {} (job {}) exited with code {}",
                self.node, self.job_id, code
            ),
            Err(e) => format!("Attach to job {} failed: {}", self.job_id, e),
        }
    }
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Single-flight attach coordinator. Clones share state.
#[derive(Clone)]
pub struct ActionOrchestrator {
    state: Arc<Mutex<AttachState>>,
    srun: PathBuf,
    settings: AttachConfig,
    lookup: Lookup,
    history: CommandHistory,
}

impl std::fmt::Debug for ActionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionOrchestrator")
            .field("state", &self.state())
            .field("srun", &self.srun)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ActionOrchestrator {
    pub fn new(srun: PathBuf, settings: AttachConfig) -> Self {
        Self::with_lookup(srun, settings, env_lookup)
    }

    /// Use `lookup` instead of the process environment for `$VAR` expansion.
    pub fn with_lookup<F>(srun: PathBuf, settings: AttachConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(AttachState::Normal)),
            srun,
            settings,
            lookup: Arc::new(lookup),
            history: CommandHistory::default(),
        }
    }

    /// Record finished sessions in `history` next to the query commands.
    #[must_use]
    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn state(&self) -> AttachState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: AttachState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            info!(from = ?*state, to = ?next, "attach state");
            *state = next;
        }
    }

    /// Validate `job` as an attach target and move to `AttachRequested`.
    ///
    /// The node is `node_override` when given, otherwise the first host of
    /// the job's allocation. Rejections leave the state at `Normal`.
    pub fn request_attach(&self, job: Option<&Job>, node_override: Option<&str>) -> Result<AttachPlan, AttachError> {
        if !self.settings.enabled {
            return Err(AttachError::AttachDisabled);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != AttachState::Normal {
            return Err(AttachError::AttachInProgress);
        }

        let job = job.ok_or_else(|| AttachError::InvalidAttachTarget("no job selected".to_string()))?;
        if !job.is_running() {
            return Err(AttachError::InvalidAttachTarget(format!(
                "job {} is {}, not RUNNING",
                job.id, job.state
            )));
        }

        let node = node_override
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| job.first_node())
            .ok_or_else(|| AttachError::InvalidAttachTarget(format!("job {} has no allocated node", job.id)))?;

        let command = build_attach_command(
            self.srun.clone(),
            &job.id,
            Some(&node),
            &self.settings,
            |name| (self.lookup)(name),
        )?;

        info!(job_id = %job.id, %node, "attach requested");
        *state = AttachState::AttachRequested;
        Ok(AttachPlan {
            job_id: job.id.clone(),
            node,
            command,
        })
    }

    /// Drop a pending request without running it.
    pub fn cancel_request(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == AttachState::AttachRequested {
            *state = AttachState::Normal;
        }
    }

    /// Run a requested attach to completion.
    ///
    /// Pauses refreshing, releases the terminal, waits for the child, then
    /// always reacquires the terminal, returns to `Normal` and resumes
    /// refreshing (unless refreshing was already paused beforehand).
    pub async fn run_attach<T, L>(
        &self,
        plan: AttachPlan,
        refresh: &RefreshHandle,
        terminal: &mut T,
        launcher: &L,
    ) -> Result<AttachOutcome, AttachError>
    where
        T: TerminalControl + ?Sized,
        L: ShellLauncher + ?Sized,
    {
        if self.state() != AttachState::AttachRequested {
            return Err(AttachError::AttachInProgress);
        }

        let was_paused = refresh.state() == SchedulerState::Paused;
        if let Err(e) = refresh.pause().await {
            self.set_state(AttachState::Normal);
            return Err(e.into());
        }
        self.set_state(AttachState::Suspended);

        let exit = match terminal.release().await {
            Ok(()) => {
                info!(command = %plan.command, "launching attach session");
                let started = Instant::now();
                let exit = launcher.launch(&plan.command).await;
                self.record_session(&plan.command, &exit, started);
                exit
            }
            Err(e) => Err(e),
        };
        let reacquired = terminal.reacquire().await;

        self.set_state(AttachState::Normal);
        if !was_paused && let Err(e) = refresh.resume().await {
            warn!(error = %e, "could not resume refreshing after attach");
        }

        if let Err(e) = &exit {
            warn!(job_id = %plan.job_id, error = %e, "attach session failed");
        }
        reacquired.map_err(|e| AttachError::Terminal(e.to_string()))?;

        Ok(AttachOutcome {
            job_id: plan.job_id,
            node: plan.node,
            exit: exit.map_err(|e| e.to_string()),
        })
    }

    fn record_session(&self, command: &AttachCommand, exit: &std::io::Result<i32>, started: Instant) {
        let (ok, stderr) = match exit {
            Ok(0) => (true, String::new()),
            Ok(code) => (false, format!("exit {}", code)),
            Err(e) => (false, e.to_string()),
        };
        self.history.record(CommandStat {
            command: command.to_string(),
            ok,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            stderr,
            finished_at: Local::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryLayouts;
    use crate::models::JobState;
    use crate::refresh::tests::FakeCluster;
    use crate::refresh::{Poller, RefreshEvent, spawn_scheduler};
    use crate::store::SnapshotStore;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct FakeTerminal {
        released: usize,
        reacquired: usize,
    }

    impl TerminalControl for FakeTerminal {
        fn release(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
            self.released += 1;
            async { Ok(()) }.boxed()
        }

        fn reacquire(&mut self) -> BoxFuture<'_, std::io::Result<()>> {
            self.reacquired += 1;
            async { Ok(()) }.boxed()
        }
    }

    /// Records the scheduler and orchestrator state seen at launch.
    struct FakeLauncher {
        exit: Result<i32, std::io::ErrorKind>,
        refresh: RefreshHandle,
        orchestrator: ActionOrchestrator,
        seen: Mutex<Option<(SchedulerState, AttachState)>>,
    }

    impl ShellLauncher for FakeLauncher {
        fn launch(&self, _command: &AttachCommand) -> BoxFuture<'static, std::io::Result<i32>> {
            *self.seen.lock().unwrap() = Some((self.refresh.state(), self.orchestrator.state()));
            let exit = self.exit.map_err(std::io::Error::from);
            async move { exit }.boxed()
        }
    }

    fn running_job() -> Job {
        Job {
            id: "4242".to_string(),
            state: JobState::Running,
            node_list: "c[07-08]".to_string(),
            ..Default::default()
        }
    }

    fn orchestrator() -> ActionOrchestrator {
        ActionOrchestrator::with_lookup(PathBuf::from("/usr/bin/srun"), AttachConfig::default(), |name| {
            (name == "SHELL").then(|| "/bin/bash".to_string())
        })
    }

    async fn scheduler() -> (RefreshHandle, CancellationToken) {
        let cluster = Arc::new(FakeCluster::default());
        let store = Arc::new(SnapshotStore::new(Duration::from_secs(60)));
        let (tx, _rx) = mpsc::channel::<RefreshEvent>(64);
        let cancel = CancellationToken::new();
        let (handle, _task) = spawn_scheduler(
            Poller::new(cluster, store, QueryLayouts::default()),
            Duration::from_secs(3600),
            tx,
            cancel.clone(),
        );
        handle
            .subscribe()
            .wait_for(|s| *s == SchedulerState::Idle)
            .await
            .unwrap();
        (handle, cancel)
    }

    #[test]
    fn test_request_builds_plan_for_first_node() {
        let orch = orchestrator();
        let plan = orch.request_attach(Some(&running_job()), None).unwrap();
        assert_eq!(plan.node, "c07");
        assert_eq!(
            plan.command.to_string(),
            "srun --pty --overlap --jobid 4242 -w c07 /bin/bash -l"
        );
        assert_eq!(orch.state(), AttachState::AttachRequested);

        assert_eq!(
            orch.request_attach(Some(&running_job()), None),
            Err(AttachError::AttachInProgress)
        );
        orch.cancel_request();
        assert_eq!(orch.state(), AttachState::Normal);
    }

    #[test]
    fn test_node_override() {
        let orch = orchestrator();
        let plan = orch.request_attach(Some(&running_job()), Some("c08")).unwrap();
        assert_eq!(plan.node, "c08");
    }

    #[test]
    fn test_invalid_targets_stay_normal() {
        let orch = orchestrator();
        let pending = Job {
            state: JobState::Pending,
            ..running_job()
        };
        assert!(matches!(
            orch.request_attach(Some(&pending), None),
            Err(AttachError::InvalidAttachTarget(_))
        ));
        let no_nodes = Job {
            node_list: String::new(),
            ..running_job()
        };
        assert!(matches!(
            orch.request_attach(Some(&no_nodes), None),
            Err(AttachError::InvalidAttachTarget(_))
        ));
        assert!(matches!(
            orch.request_attach(None, None),
            Err(AttachError::InvalidAttachTarget(_))
        ));
        assert_eq!(orch.state(), AttachState::Normal);
    }

    #[test]
    fn test_disabled() {
        let settings = AttachConfig {
            enabled: false,
            ..AttachConfig::default()
        };
        let orch = ActionOrchestrator::new(PathBuf::from("srun"), settings);
        assert_eq!(
            orch.request_attach(Some(&running_job()), None),
            Err(AttachError::AttachDisabled)
        );
    }

    #[tokio::test]
    async fn test_invalid_attach_leaves_scheduler_running() {
        let (handle, cancel) = scheduler().await;
        let orch = orchestrator();
        let pending = Job {
            state: JobState::Pending,
            ..running_job()
        };
        assert!(orch.request_attach(Some(&pending), None).is_err());
        assert_eq!(handle.state(), SchedulerState::Idle);
        cancel.cancel();
    }

    async fn run_with_exit(
        exit: Result<i32, std::io::ErrorKind>,
    ) -> (AttachOutcome, FakeTerminal, FakeLauncher, CommandHistory) {
        let (handle, _cancel) = scheduler().await;
        let history = CommandHistory::default();
        let orch = orchestrator().with_history(history.clone());
        let launcher = FakeLauncher {
            exit,
            refresh: handle.clone(),
            orchestrator: orch.clone(),
            seen: Mutex::new(None),
        };
        let mut terminal = FakeTerminal::default();

        let plan = orch.request_attach(Some(&running_job()), None).unwrap();
        let outcome = orch
            .run_attach(plan, &handle, &mut terminal, &launcher)
            .await
            .unwrap();

        assert_eq!(orch.state(), AttachState::Normal);
        assert_ne!(handle.state(), SchedulerState::Paused);
        (outcome, terminal, launcher, history)
    }

    #[tokio::test]
    async fn test_attach_pauses_and_resumes_on_success() {
        let (outcome, terminal, launcher, history) = run_with_exit(Ok(0)).await;
        assert_eq!(outcome.exit, Ok(0));
        let sessions = history.recent(10);
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].ok);
        assert_eq!(
            sessions[0].command,
            "srun --pty --overlap --jobid 4242 -w c07 /bin/bash -l"
        );
        assert_eq!(
            *launcher.seen.lock().unwrap(),
            Some((SchedulerState::Paused, AttachState::Suspended))
        );
        assert_eq!((terminal.released, terminal.reacquired), (1, 1));
    }

    #[tokio::test]
    async fn test_attach_resumes_after_killed_child() {
        let (outcome, _terminal, _launcher, history) = run_with_exit(Ok(137)).await;
        assert_eq!(outcome.exit, Ok(137));
        assert!(outcome.summary().contains("137"));
        let sessions = history.recent(10);
        assert!(!sessions[0].ok);
        assert_eq!(sessions[0].stderr, "exit 137");
        assert_eq!(history.summary().failures, 1);
    }

    #[tokio::test]
    async fn test_attach_resumes_after_spawn_failure() {
        let (outcome, terminal, _launcher, _history) = run_with_exit(Err(std::io::ErrorKind::NotFound)).await;
        assert!(outcome.exit.is_err());
        assert_eq!(terminal.reacquired, 1);
    }

    #[tokio::test]
    async fn test_attach_keeps_user_pause() {
        let (handle, cancel) = scheduler().await;
        handle.pause().await.unwrap();

        let orch = orchestrator();
        let launcher = FakeLauncher {
            exit: Ok(0),
            refresh: handle.clone(),
            orchestrator: orch.clone(),
            seen: Mutex::new(None),
        };
        let plan = orch.request_attach(Some(&running_job()), None).unwrap();
        orch.run_attach(plan, &handle, &mut FakeTerminal::default(), &launcher)
            .await
            .unwrap();

        assert_eq!(handle.state(), SchedulerState::Paused);
        cancel.cancel();
    }
}
