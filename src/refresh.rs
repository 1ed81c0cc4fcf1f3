//! Periodic and on-demand refresh of the snapshot store.
//!
//! The scheduler is a single task that owns the refresh timeline. Each tick
//! dispatches one fetch per entity kind as independent tasks; each fetch runs
//! the query command, parses the output and commits into the store under its
//! own sequence number. The scheduler moves between three states:
//!
//! - `Idle`: waiting for the next tick or an explicit refresh.
//! - `Polling`: fetches are in flight. Further refresh requests are ignored.
//! - `Paused`: no timer, no polling. Entered on request; in-flight fetches
//!   are aborted and fenced first.
//!
//! Failures never escalate. A failed fetch records its error in the store
//! and the next attempt is simply the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::QueryLayouts;
use crate::models::EntityKind;
use crate::parser::{Parsed, apply_gpu_allocation, parse_gpu_allocation, parse_jobs, parse_nodes, parse_partitions};
use crate::slurm::ClusterSource;
use crate::slurm::runner::CommandError;
use crate::store::{Commit, SnapshotStore, Stored};

const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Errors of a single refresh or of talking to the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("all {count} lines of output were malformed")]
    AllMalformed { count: usize },

    #[error("fetch task failed: {0}")]
    TaskFailed(String),

    #[error("refresh scheduler is not running")]
    SchedulerStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
    Paused,
}

impl SchedulerState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Paused => "paused",
        }
    }
}

/// Notifications for the renderer, one per finished fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Committed { kind: EntityKind, version: u64, malformed: usize },
    Failed { kind: EntityKind, error: String },
}

#[derive(Debug)]
enum RefreshCommand {
    RefreshNow,
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
}

// ============================================================================
// Poller
// ============================================================================

/// Successful fetch details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSuccess {
    pub commit: Commit,
    pub malformed: usize,
}

/// What a dispatched fetch task returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub kind: EntityKind,
    pub seq: u64,
    pub result: Result<FetchSuccess, RefreshError>,
}

/// Dispatches sequence-tagged fetches into the store.
pub struct Poller {
    source: Arc<dyn ClusterSource>,
    store: Arc<SnapshotStore>,
    layouts: Arc<QueryLayouts>,
    sequences: HashMap<EntityKind, AtomicU64>,
}

impl Poller {
    pub fn new(source: Arc<dyn ClusterSource>, store: Arc<SnapshotStore>, layouts: QueryLayouts) -> Self {
        Self {
            source,
            store,
            layouts: Arc::new(layouts),
            sequences: EntityKind::ALL.into_iter().map(|k| (k, AtomicU64::new(0))).collect(),
        }
    }

    fn next_seq(&self, kind: EntityKind) -> u64 {
        self.sequences
            .get(&kind)
            .map_or(0, |counter| counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// A fetch of `kind` tagged with a fresh sequence number.
    ///
    /// Nothing runs until the future is polled. Dropping it early drops the
    /// query command, which kills the child.
    pub fn fetch(&self, kind: EntityKind) -> (u64, BoxFuture<'static, FetchOutcome>) {
        let seq = self.next_seq(kind);
        let fetch = fetch_and_commit(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.layouts),
            kind,
            seq,
        )
        .boxed();
        (seq, fetch)
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }
}

async fn fetch_and_commit(
    source: Arc<dyn ClusterSource>,
    store: Arc<SnapshotStore>,
    layouts: Arc<QueryLayouts>,
    kind: EntityKind,
    seq: u64,
) -> FetchOutcome {
    let result = match kind {
        EntityKind::Jobs => match source.fetch(kind).await {
            Ok(text) => commit(&store, parse_jobs(&text, &layouts.jobs), seq),
            Err(e) => Err(RefreshError::Command(e)),
        },
        EntityKind::Nodes => {
            let (nodes, gpus) = tokio::join!(source.fetch(kind), source.fetch_gpu_usage());
            match nodes {
                Ok(text) => {
                    let mut parsed = parse_nodes(&text, &layouts.nodes);
                    match gpus {
                        Ok(detail) => apply_gpu_allocation(&mut parsed.records, &parse_gpu_allocation(&detail)),
                        Err(e) => warn!(seq, error = %e, "GPU allocation query failed"),
                    }
                    commit(&store, parsed, seq)
                }
                Err(e) => Err(RefreshError::Command(e)),
            }
        }
        EntityKind::Partitions => match source.fetch(kind).await {
            Ok(text) => commit(&store, parse_partitions(&text), seq),
            Err(e) => Err(RefreshError::Command(e)),
        },
    };

    if let Err(e) = &result {
        warn!(%kind, seq, error = %e, "fetch failed");
        store.record_failure(kind, seq, e.to_string());
    }

    FetchOutcome { kind, seq, result }
}

fn commit<T: Stored>(store: &SnapshotStore, parsed: Parsed<T>, seq: u64) -> Result<FetchSuccess, RefreshError> {
    if parsed.all_malformed() {
        return Err(RefreshError::AllMalformed {
            count: parsed.malformed.len(),
        });
    }
    for defect in &parsed.malformed {
        warn!(kind = %T::KIND, "{defect}");
    }
    Ok(FetchSuccess {
        commit: store.replace(parsed.records, seq),
        malformed: parsed.malformed.len(),
    })
}

// ============================================================================
// Scheduler
// ============================================================================

/// Cloneable control surface of a running scheduler.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    commands: mpsc::Sender<RefreshCommand>,
    state: watch::Receiver<SchedulerState>,
}

impl RefreshHandle {
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Receiver that wakes on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Request an immediate refresh. Ignored unless the scheduler is idle.
    pub fn refresh_now(&self) -> Result<(), RefreshError> {
        match self.commands.try_send(RefreshCommand::RefreshNow) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RefreshError::SchedulerStopped),
        }
    }

    /// Pause and wait until the scheduler is `Paused` with nothing in flight.
    pub async fn pause(&self) -> Result<(), RefreshError> {
        let (ack, done) = oneshot::channel();
        self.send(RefreshCommand::Pause(ack)).await?;
        done.await.map_err(|_| RefreshError::SchedulerStopped)
    }

    /// Resume from `Paused` and trigger an immediate refresh.
    pub async fn resume(&self) -> Result<(), RefreshError> {
        let (ack, done) = oneshot::channel();
        self.send(RefreshCommand::Resume(ack)).await?;
        done.await.map_err(|_| RefreshError::SchedulerStopped)
    }

    async fn send(&self, command: RefreshCommand) -> Result<(), RefreshError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RefreshError::SchedulerStopped)
    }
}

/// Start the scheduler task. The first refresh starts immediately.
///
/// `events` receives one notification per finished fetch; it is fed with
/// `try_send` so a slow consumer never stalls refreshing.
pub fn spawn_scheduler<E>(
    poller: Poller,
    interval: Duration,
    events: mpsc::Sender<E>,
    cancel: CancellationToken,
) -> (RefreshHandle, JoinHandle<()>)
where
    E: From<RefreshEvent> + Send + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);

    let scheduler = Scheduler {
        poller,
        interval,
        events,
        state: state_tx,
        in_flight: JoinSet::new(),
        pending: HashMap::new(),
    };
    let handle = tokio::spawn(scheduler.run(commands_rx, cancel));

    (
        RefreshHandle {
            commands: commands_tx,
            state: state_rx,
        },
        handle,
    )
}

struct Scheduler<E> {
    poller: Poller,
    interval: Duration,
    events: mpsc::Sender<E>,
    state: watch::Sender<SchedulerState>,
    in_flight: JoinSet<FetchOutcome>,
    /// Sequence of the in-flight fetch per kind.
    pending: HashMap<EntityKind, u64>,
}

impl<E> Scheduler<E>
where
    E: From<RefreshEvent> + Send + 'static,
{
    async fn run(mut self, mut commands: mpsc::Receiver<RefreshCommand>, cancel: CancellationToken) {
        self.start_poll();
        let mut next_tick = Instant::now() + self.interval;

        loop {
            let state = *self.state.borrow();
            match state {
                SchedulerState::Idle => {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,

                        command = commands.recv() => match command {
                            Some(RefreshCommand::RefreshNow) => self.start_poll(),
                            Some(RefreshCommand::Pause(ack)) => {
                                self.set_state(SchedulerState::Paused);
                                let _ = ack.send(());
                            }
                            Some(RefreshCommand::Resume(ack)) => {
                                let _ = ack.send(());
                            }
                            None => break,
                        },

                        _ = tokio::time::sleep_until(next_tick) => self.start_poll(),
                    }
                }
                SchedulerState::Polling => {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,

                        command = commands.recv() => match command {
                            Some(RefreshCommand::RefreshNow) => {
                                debug!("refresh already in progress");
                            }
                            Some(RefreshCommand::Pause(ack)) => {
                                self.abandon_in_flight();
                                self.set_state(SchedulerState::Paused);
                                let _ = ack.send(());
                            }
                            Some(RefreshCommand::Resume(ack)) => {
                                let _ = ack.send(());
                            }
                            None => break,
                        },

                        Some(joined) = self.in_flight.join_next() => {
                            self.finish_fetch(joined);
                            if self.in_flight.is_empty() {
                                self.fail_orphaned();
                                self.set_state(SchedulerState::Idle);
                                next_tick = Instant::now() + self.interval;
                            }
                        }
                    }
                }
                SchedulerState::Paused => {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,

                        command = commands.recv() => match command {
                            Some(RefreshCommand::Resume(ack)) => {
                                info!("refresh resumed");
                                self.start_poll();
                                next_tick = Instant::now() + self.interval;
                                let _ = ack.send(());
                            }
                            Some(RefreshCommand::Pause(ack)) => {
                                let _ = ack.send(());
                            }
                            Some(RefreshCommand::RefreshNow) => {
                                debug!("refresh ignored while paused");
                            }
                            None => break,
                        },
                    }
                }
            }
        }

        self.abandon_in_flight();
    }

    fn set_state(&self, state: SchedulerState) {
        if *self.state.borrow() != state {
            info!(state = state.as_str(), "refresh scheduler state");
            self.state.send_replace(state);
        }
    }

    fn start_poll(&mut self) {
        for kind in EntityKind::ALL {
            let (seq, fetch) = self.poller.fetch(kind);
            self.pending.insert(kind, seq);
            self.in_flight.spawn(fetch);
        }
        self.set_state(SchedulerState::Polling);
    }

    fn finish_fetch(&mut self, joined: Result<FetchOutcome, tokio::task::JoinError>) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                // The kind is unknown here; `fail_orphaned` reports it once
                // the poll is over.
                warn!(error = %e, "fetch task failed");
                return;
            }
        };

        if self.pending.get(&outcome.kind) == Some(&outcome.seq) {
            self.pending.remove(&outcome.kind);
        }

        let event = match outcome.result {
            Ok(FetchSuccess {
                commit: Commit::Committed { version },
                malformed,
            }) => RefreshEvent::Committed {
                kind: outcome.kind,
                version,
                malformed,
            },
            Ok(FetchSuccess {
                commit: Commit::Discarded { .. },
                ..
            }) => return,
            Err(e) => RefreshEvent::Failed {
                kind: outcome.kind,
                error: e.to_string(),
            },
        };

        self.emit(event);
    }

    fn emit(&self, event: RefreshEvent) {
        if self.events.try_send(E::from(event)).is_err() {
            debug!("refresh event dropped (channel full)");
        }
    }

    /// Kinds whose outcome never arrived are recorded as failed.
    fn fail_orphaned(&mut self) {
        let orphaned: Vec<(EntityKind, u64)> = self.pending.drain().collect();
        for (kind, seq) in orphaned {
            let error = RefreshError::TaskFailed("fetch task ended without a result".to_string()).to_string();
            if self.poller.store().record_failure(kind, seq, error.clone()) {
                self.emit(RefreshEvent::Failed { kind, error });
            }
        }
    }

    /// Abort in-flight fetches and fence their sequence numbers.
    ///
    /// Aborting drops each fetch future with its query command, so the
    /// children are killed rather than left running unobserved.
    fn abandon_in_flight(&mut self) {
        self.in_flight.abort_all();
        self.in_flight.detach_all();
        for (kind, seq) in self.pending.drain() {
            self.poller.store().fence(kind, seq);
        }
    }
}
