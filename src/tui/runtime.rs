//! Async runtime and task management for the TUI
//!
//! Dual-channel event-driven architecture:
//! - Input channel (priority): user input events that are never dropped
//! - Data channel: refresh notifications that may be dropped under backpressure
//!
//! The main loop uses `tokio::select!` biased toward the input channel to
//! prevent input starvation. Side effects that need the terminal or the
//! scheduler (attach, pause/resume, drill-down queries) are queued by the
//! [`App`] as [`AppCommand`]s and executed here between events.

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attach::{ActionOrchestrator, ForegroundLauncher};
use crate::refresh::RefreshHandle;
use crate::slurm::SlurmInterface;
use crate::slurm::logs::{LOG_TAIL_LINES, LogStream, LogTail};
use crate::tui::TuiSession;
use crate::tui::app::{App, AppCommand};
use crate::tui::event::{DataEvent, EventResult, InputEvent};

const INPUT_CHANNEL_CAPACITY: usize = 16;
const DATA_CHANNEL_CAPACITY: usize = 32;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Owns the cancellation token and handles of background tasks.
pub struct TuiRuntime {
    cancel_token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl Default for TuiRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiRuntime {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            task_handles: Vec::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Signal shutdown and wait for tasks to complete
    pub async fn shutdown(self) {
        self.cancel_token.cancel();

        let shutdown = async {
            for handle in self.task_handles {
                let _ = handle.await;
            }
        };

        tokio::select! {
            _ = shutdown => {}
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                debug!("background tasks did not stop in time");
            }
        }
    }
}

/// Terminal input reader that can be stopped while a child owns the terminal.
pub struct InputReader {
    tx: mpsc::Sender<InputEvent>,
    parent: CancellationToken,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl InputReader {
    pub fn new(tx: mpsc::Sender<InputEvent>, parent: CancellationToken) -> Self {
        Self {
            tx,
            parent,
            running: None,
        }
    }

    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        let token = self.parent.child_token();
        let handle = spawn_input_task(self.tx.clone(), token.clone());
        self.running = Some((token, handle));
    }

    /// Stop reading and wait until the reader task has exited.
    pub async fn stop(&mut self) {
        if let Some((token, handle)) = self.running.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!("input task ended abnormally: {}", e);
            }
        }
    }
}

/// Spawn the input event reader task
pub fn spawn_input_task(tx: mpsc::Sender<InputEvent>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = EventStream::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_event = reader.next() => {
                    match maybe_event {
                        Some(Ok(event)) => {
                            let input_event = match event {
                                Event::Key(key) => Some(InputEvent::Key(key)),
                                Event::Mouse(mouse) => Some(InputEvent::Mouse(mouse)),
                                Event::Resize(_, height) => Some(InputEvent::Resize(height)),
                                _ => None,
                            };

                            if let Some(evt) = input_event
                                && tx.send(evt).await.is_err()
                            {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            let is_fatal = matches!(
                                e.kind(),
                                std::io::ErrorKind::BrokenPipe
                                    | std::io::ErrorKind::ConnectionReset
                                    | std::io::ErrorKind::UnexpectedEof
                            );

                            if is_fatal {
                                info!("Terminal disconnected: {:?}", e);
                                break;
                            }
                            warn!("Terminal event read error: {:?}", e);
                        }
                        None => break,
                    }
                }
            }
        }
    })
}

/// Spawn the one-second tick that keeps ages current
pub fn spawn_tick(tx: mpsc::Sender<DataEvent>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let _ = tx.try_send(DataEvent::Tick);
                }
            }
        }
    })
}

/// Collaborators the loop needs to execute queued commands.
pub struct LoopContext {
    pub refresh: RefreshHandle,
    pub orchestrator: ActionOrchestrator,
    pub slurm: SlurmInterface,
    pub data_tx: mpsc::Sender<DataEvent>,
}

/// Run the main TUI event loop
pub async fn run_event_loop(
    mut app: App,
    mut input_rx: mpsc::Receiver<InputEvent>,
    mut data_rx: mpsc::Receiver<DataEvent>,
    session: &mut TuiSession,
    ctx: LoopContext,
) -> Result<()> {
    let mut needs_render = true;
    let mut scheduler_state = ctx.refresh.subscribe();

    loop {
        if needs_render {
            session.draw(&mut app)?;
            needs_render = false;
        }

        if !app.running {
            break;
        }

        let result = tokio::select! {
            biased;

            Some(input) = input_rx.recv() => app.handle_input(input),
            Some(data) = data_rx.recv() => app.handle_data(data),
            Ok(()) = scheduler_state.changed() => EventResult::Continue,
            else => break,
        };

        match result {
            EventResult::Continue => needs_render = true,
            EventResult::Unchanged => {}
            EventResult::Quit => break,
        }

        for command in app.take_commands() {
            execute_command(command, &mut app, session, &ctx).await;
            needs_render = true;
        }
    }

    discard_commands(app.take_commands(), &ctx.orchestrator);
    Ok(())
}

/// Commands queued by the final event are never run; release any attach
/// request they hold.
fn discard_commands(commands: Vec<AppCommand>, orchestrator: &ActionOrchestrator) {
    for command in commands {
        if let AppCommand::Attach(plan) = command {
            debug!(job_id = %plan.job_id, "dropping queued attach on exit");
            orchestrator.cancel_request();
        }
    }
}

async fn execute_command(command: AppCommand, app: &mut App, session: &mut TuiSession, ctx: &LoopContext) {
    match command {
        AppCommand::Attach(plan) => {
            let result = ctx
                .orchestrator
                .run_attach(plan, &ctx.refresh, session, &ForegroundLauncher)
                .await;
            app.finish_attach(result);
        }
        AppCommand::Pause => {
            if let Err(e) = ctx.refresh.pause().await {
                app.feedback.set_error(e.to_string());
            }
        }
        AppCommand::Resume => {
            if let Err(e) = ctx.refresh.resume().await {
                app.feedback.set_error(e.to_string());
            }
        }
        AppCommand::FetchJobDetail(job_id) => {
            let slurm = ctx.slurm.clone();
            let tx = ctx.data_tx.clone();
            tokio::spawn(async move {
                let result = slurm.show_job(&job_id).await.map_err(|e| e.to_string());
                send_detail(&tx, format!("Job {}", job_id), result);
            });
        }
        AppCommand::FetchNodeDetail(hostname) => {
            let slurm = ctx.slurm.clone();
            let tx = ctx.data_tx.clone();
            tokio::spawn(async move {
                let result = slurm.show_node(&hostname).await.map_err(|e| e.to_string());
                send_detail(&tx, format!("Node {}", hostname), result);
            });
        }
        AppCommand::FetchLog { job_id, stream } => {
            let slurm = ctx.slurm.clone();
            let tx = ctx.data_tx.clone();
            tokio::spawn(async move {
                let result = slurm
                    .fetch_log(&job_id, stream, LOG_TAIL_LINES)
                    .await
                    .map_err(|e| e.to_string());
                if let Err(e) = &result {
                    debug!(%job_id, %stream, error = %e, "log tail failed");
                }
                send_log(&tx, job_id, stream, result);
            });
        }
    }
}

fn send_log(tx: &mpsc::Sender<DataEvent>, job_id: String, stream: LogStream, result: Result<LogTail, String>) {
    if tx.try_send(DataEvent::Log { job_id, stream, result }).is_err() {
        warn!("Could not deliver log tail (channel full)");
    }
}

fn send_detail(tx: &mpsc::Sender<DataEvent>, title: String, result: Result<crate::parser::DetailFields, String>) {
    if tx.try_send(DataEvent::Detail { title, result }).is_err() {
        warn!("Could not deliver detail result (channel full)");
    }
}

/// Create the dual channels for the TUI
pub fn create_channels() -> (
    mpsc::Sender<InputEvent>,
    mpsc::Receiver<InputEvent>,
    mpsc::Sender<DataEvent>,
    mpsc::Receiver<DataEvent>,
) {
    let (input_tx, input_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let (data_tx, data_rx) = mpsc::channel(DATA_CHANNEL_CAPACITY);
    (input_tx, input_rx, data_tx, data_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::AttachState;

    #[tokio::test]
    async fn test_runtime_shutdown_cancels_tasks() {
        let mut runtime = TuiRuntime::new();
        let (tx, mut rx) = mpsc::channel(4);
        runtime.track(spawn_tick(tx, runtime.cancel_token()));

        assert!(matches!(rx.recv().await, Some(DataEvent::Tick)));
        runtime.shutdown().await;

        // Drain whatever was queued; the sender is gone afterwards.
        while rx.recv().await.is_some() {}
    }

    #[test]
    fn test_discarded_attach_releases_request() {
        let orchestrator = ActionOrchestrator::with_lookup(
            std::path::PathBuf::from("srun"),
            crate::config::AttachConfig::default(),
            |_| None,
        );
        let job = crate::models::Job {
            id: "9".to_string(),
            state: crate::models::JobState::Running,
            node_list: "c1".to_string(),
            ..Default::default()
        };
        let plan = orchestrator.request_attach(Some(&job), None).unwrap();
        assert_eq!(orchestrator.state(), AttachState::AttachRequested);

        discard_commands(vec![AppCommand::Pause, AppCommand::Attach(plan)], &orchestrator);
        assert_eq!(orchestrator.state(), AttachState::Normal);
    }

    #[test]
    fn test_channel_capacities() {
        let (input_tx, _input_rx, data_tx, _data_rx) = create_channels();
        assert_eq!(input_tx.capacity(), INPUT_CHANNEL_CAPACITY);
        assert_eq!(data_tx.capacity(), DATA_CHANNEL_CAPACITY);
    }
}
