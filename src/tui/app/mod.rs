//! Application state and core logic for the TUI
//!
//! TEA-inspired: mutable state, method-based updates. The app only reads
//! snapshots from the store and records user intents; anything that needs
//! the terminal or awaits the scheduler is queued as an [`AppCommand`] for
//! the event loop.

mod state;

pub use state::{DetailContent, FeedbackState, ListView, LogContent, LogViewer, ModalState, View};

use std::sync::Arc;
use std::time::Duration;

use crate::attach::{ActionOrchestrator, AttachError, AttachOutcome, AttachPlan, AttachState};
use crate::config::SqtopConfig;
use crate::models::{EntityKind, Job, JobState, Node, Partition, Record};
use crate::refresh::{RefreshEvent, RefreshHandle, SchedulerState};
use crate::slurm::logs::LogStream;
use crate::slurm::runner::CommandHistory;
use crate::store::SnapshotStore;
use crate::tui::event::{DataEvent, EventResult, InputEvent, KeyAction};
use crate::view::{
    Filter, JobSortField, NodeSortField, PartitionSortField, Selection, SortDirection, SortSpec, ViewQuery,
    WatchSet,
};

/// Rows of chrome above the first table row (tabs, info bar, border, header)
const CONTENT_START_ROW: u16 = 4;
/// Rows of chrome in total (the above plus bottom border and status bar)
const CHROME_ROWS: u16 = 7;
/// How often a following log viewer re-reads the file
const LOG_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
enum Movement {
    By(isize),
    First,
    Last,
    /// Row `n` of the visible window
    Visible(usize),
}

impl Movement {
    fn apply<T: Record>(self, selection: &mut Selection, rows: &[&T]) {
        match self {
            Movement::By(delta) => selection.move_by(rows, delta),
            Movement::First => selection.first(rows),
            Movement::Last => selection.last(rows),
            Movement::Visible(n) => {
                let target = selection.offset() + n;
                if target < rows.len() {
                    selection.select_index(rows, target);
                }
            }
        }
    }
}

/// Side effects queued for the event loop
#[derive(Debug)]
pub enum AppCommand {
    Attach(AttachPlan),
    Pause,
    Resume,
    FetchJobDetail(String),
    FetchNodeDetail(String),
    FetchLog { job_id: String, stream: LogStream },
}

pub struct App {
    pub running: bool,
    pub current_view: View,
    pub modal: ModalState,

    pub jobs: ListView<Job>,
    pub nodes: ListView<Node>,
    pub partitions: ListView<Partition>,
    pub watch: WatchSet,

    pub username: String,
    pub only_mine: bool,

    pub feedback: FeedbackState,
    pub config: SqtopConfig,
    pub history: CommandHistory,

    /// Visible table rows, updated before each draw
    pub page_size: usize,

    store: Arc<SnapshotStore>,
    refresh: RefreshHandle,
    orchestrator: ActionOrchestrator,
    commands: Vec<AppCommand>,
}

impl App {
    pub fn new(
        config: SqtopConfig,
        config_warnings: Vec<String>,
        username: String,
        store: Arc<SnapshotStore>,
        refresh: RefreshHandle,
        orchestrator: ActionOrchestrator,
        history: CommandHistory,
    ) -> Self {
        let only_mine = config.display.only_mine;
        let jobs_query = ViewQuery::new(SortSpec::new(JobSortField::Id, SortDirection::Ascending))
            .with_only_user(only_mine.then(|| username.clone()));

        Self {
            running: true,
            current_view: View::from_name(&config.display.default_view).unwrap_or_default(),
            modal: ModalState::None,

            jobs: ListView::new(&store, jobs_query),
            nodes: ListView::new(
                &store,
                ViewQuery::new(SortSpec::new(NodeSortField::Hostname, SortDirection::Ascending)),
            ),
            partitions: ListView::new(
                &store,
                ViewQuery::new(SortSpec::new(PartitionSortField::Name, SortDirection::Ascending)),
            ),
            watch: WatchSet::default(),

            username,
            only_mine,

            feedback: FeedbackState::new(config_warnings),
            config,
            history,

            page_size: 20,

            store,
            refresh,
            orchestrator,
            commands: Vec::new(),
        }
    }

    /// Record the terminal height so scrolling matches what is drawn.
    pub fn set_viewport_height(&mut self, height: u16) {
        let page = usize::from(height.saturating_sub(CHROME_ROWS)).max(1);
        if page != self.page_size {
            self.page_size = page;
            self.resync_current();
        }
    }

    pub fn take_commands(&mut self) -> Vec<AppCommand> {
        std::mem::take(&mut self.commands)
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.refresh.state()
    }

    #[must_use]
    pub fn attach_state(&self) -> AttachState {
        self.orchestrator.state()
    }

    /// Handle an input event
    pub fn handle_input(&mut self, event: InputEvent) -> EventResult {
        match event {
            InputEvent::Key(key_event) => {
                let action = if matches!(self.modal, ModalState::Log(_)) {
                    KeyAction::from_log_key_event(key_event)
                } else {
                    KeyAction::from_key_event(key_event, self.modal.is_text_input())
                };
                self.handle_action(action)
            }
            InputEvent::Resize(height) => {
                self.set_viewport_height(height);
                EventResult::Continue
            }
            InputEvent::Mouse(mouse_event) => self.handle_action(KeyAction::from_mouse_event(mouse_event)),
        }
    }

    fn handle_action(&mut self, action: KeyAction) -> EventResult {
        match self.modal {
            ModalState::Help | ModalState::Health => {
                return match action {
                    KeyAction::Escape | KeyAction::ShowHelp | KeyAction::ShowHealth | KeyAction::Quit => {
                        self.modal = ModalState::None;
                        EventResult::Continue
                    }
                    _ => EventResult::Unchanged,
                };
            }
            ModalState::Filter { .. } => return self.handle_filter_action(action),
            ModalState::AttachNode { .. } => return self.handle_attach_node_action(action),
            ModalState::Detail { .. } => {
                return match action {
                    KeyAction::Escape | KeyAction::Select | KeyAction::Quit => {
                        self.modal = ModalState::None;
                        EventResult::Continue
                    }
                    KeyAction::Attach => self.request_attach(None),
                    _ => EventResult::Unchanged,
                };
            }
            ModalState::Log(_) => return self.handle_log_action(action),
            ModalState::None => {}
        }

        if let Some(result) = self.handle_navigation(&action) {
            return result;
        }

        match action {
            KeyAction::Quit => {
                self.running = false;
                EventResult::Quit
            }

            KeyAction::SwitchToJobs => self.switch_view(View::Jobs),
            KeyAction::SwitchToNodes => self.switch_view(View::Nodes),
            KeyAction::SwitchToPartitions => self.switch_view(View::Partitions),
            KeyAction::NextView => self.switch_view(self.current_view.next()),

            KeyAction::Select => self.open_detail(),
            KeyAction::Attach => self.request_attach(None),
            KeyAction::AttachToNode => {
                if self.current_view != View::Jobs {
                    return EventResult::Unchanged;
                }
                if let Some(job) = self.jobs.selected() {
                    self.modal = ModalState::AttachNode {
                        job_id: job.id.clone(),
                        edit_buffer: job.first_node().unwrap_or_default(),
                    };
                }
                EventResult::Continue
            }
            KeyAction::ToggleWatch => {
                if self.current_view != View::Jobs {
                    return EventResult::Unchanged;
                }
                if let Some(id) = self.jobs.selected().map(|j| j.id.clone()) {
                    let watched = self.watch.toggle(&id);
                    self.feedback
                        .set_info(format!("{} job {}", if watched { "Watching" } else { "Unwatched" }, id));
                }
                EventResult::Continue
            }
            KeyAction::ToggleMine => {
                self.only_mine = !self.only_mine;
                self.jobs.query.only_user = self.only_mine.then(|| self.username.clone());
                self.jobs.resync(self.page_size);
                EventResult::Continue
            }
            KeyAction::Refresh => {
                match self.refresh.refresh_now() {
                    Ok(()) if self.scheduler_state() == SchedulerState::Paused => {
                        self.feedback.set_info("Refreshing is paused (p to resume)");
                    }
                    Ok(()) => {}
                    Err(e) => self.feedback.set_error(e.to_string()),
                }
                EventResult::Continue
            }
            KeyAction::TogglePause => {
                if self.scheduler_state() == SchedulerState::Paused {
                    self.commands.push(AppCommand::Resume);
                    self.feedback.set_info("Refreshing resumed");
                } else {
                    self.commands.push(AppCommand::Pause);
                    self.feedback.set_info("Refreshing paused");
                }
                EventResult::Continue
            }
            KeyAction::OpenFilter => {
                let current = self.current_filter().to_string();
                self.modal = ModalState::Filter {
                    cursor: current.chars().count(),
                    edit_buffer: current,
                };
                EventResult::Continue
            }
            KeyAction::CycleSort => {
                self.with_sort(|jobs, nodes, partitions| {
                    if let Some(spec) = jobs {
                        spec.select(spec.field.next());
                    }
                    if let Some(spec) = nodes {
                        spec.select(spec.field.next());
                    }
                    if let Some(spec) = partitions {
                        spec.select(spec.field.next());
                    }
                });
                EventResult::Continue
            }
            KeyAction::ReverseSort => {
                self.with_sort(|jobs, nodes, partitions| {
                    if let Some(spec) = jobs {
                        spec.direction = spec.direction.toggle();
                    }
                    if let Some(spec) = nodes {
                        spec.direction = spec.direction.toggle();
                    }
                    if let Some(spec) = partitions {
                        spec.direction = spec.direction.toggle();
                    }
                });
                EventResult::Continue
            }
            KeyAction::ShowHealth => {
                self.modal = ModalState::Health;
                EventResult::Continue
            }
            KeyAction::ShowStdout => self.open_log(LogStream::Stdout),
            KeyAction::ShowStderr => self.open_log(LogStream::Stderr),
            KeyAction::ShowHelp => {
                self.modal = ModalState::Help;
                EventResult::Continue
            }
            KeyAction::MouseClick { row } => {
                self.handle_mouse_click(row);
                EventResult::Continue
            }
            _ => EventResult::Unchanged,
        }
    }

    /// Handle navigation actions (returns Some if action was handled)
    fn handle_navigation(&mut self, action: &KeyAction) -> Option<EventResult> {
        let step = isize::try_from(self.page_size).unwrap_or(isize::MAX);
        let movement = match action {
            KeyAction::MoveUp | KeyAction::MouseScrollUp => Movement::By(-1),
            KeyAction::MoveDown | KeyAction::MouseScrollDown => Movement::By(1),
            KeyAction::PageUp => Movement::By(-step),
            KeyAction::PageDown => Movement::By(step),
            KeyAction::MoveToTop => Movement::First,
            KeyAction::MoveToBottom => Movement::Last,
            _ => return None,
        };
        self.navigate_current(movement);
        Some(EventResult::Continue)
    }

    fn handle_mouse_click(&mut self, row: u16) {
        if self.modal.is_active() || row < CONTENT_START_ROW {
            return;
        }
        self.navigate_current(Movement::Visible(usize::from(row - CONTENT_START_ROW)));
    }

    fn navigate_current(&mut self, movement: Movement) {
        let page = self.page_size;
        match self.current_view {
            View::Jobs => self.jobs.navigate(page, |sel, rows| movement.apply(sel, rows)),
            View::Nodes => self.nodes.navigate(page, |sel, rows| movement.apply(sel, rows)),
            View::Partitions => self.partitions.navigate(page, |sel, rows| movement.apply(sel, rows)),
        }
    }

    fn handle_log_action(&mut self, action: KeyAction) -> EventResult {
        let page = self.page_size;
        let ModalState::Log(viewer) = &mut self.modal else {
            return EventResult::Unchanged;
        };
        match action {
            KeyAction::Escape | KeyAction::Quit => self.modal = ModalState::None,
            KeyAction::ToggleFollow => {
                viewer.follow = !viewer.follow;
                if viewer.follow {
                    viewer.scroll_back = 0;
                    request_log(viewer, &mut self.commands);
                }
            }
            KeyAction::Refresh => request_log(viewer, &mut self.commands),
            KeyAction::MoveUp | KeyAction::MouseScrollUp => viewer.scroll_up(1),
            KeyAction::MoveDown | KeyAction::MouseScrollDown => viewer.scroll_down(1),
            KeyAction::PageUp => viewer.scroll_up(page),
            KeyAction::PageDown => viewer.scroll_down(page),
            KeyAction::MoveToTop => viewer.scroll_up(usize::MAX),
            KeyAction::MoveToBottom => viewer.scroll_back = 0,
            KeyAction::ShowStdout | KeyAction::ShowStderr => {
                let stream = if action == KeyAction::ShowStdout {
                    LogStream::Stdout
                } else {
                    LogStream::Stderr
                };
                if stream == viewer.stream {
                    return EventResult::Unchanged;
                }
                let job_id = viewer.job_id.clone();
                self.show_log(job_id, stream);
            }
            _ => return EventResult::Unchanged,
        }
        EventResult::Continue
    }

    fn handle_filter_action(&mut self, action: KeyAction) -> EventResult {
        match action {
            KeyAction::Escape => {
                self.modal = ModalState::None;
                EventResult::Continue
            }
            KeyAction::Select => {
                if let ModalState::Filter { edit_buffer, .. } = std::mem::take(&mut self.modal) {
                    self.set_current_filter(&edit_buffer);
                }
                EventResult::Continue
            }
            other => self.edit_text(other),
        }
    }

    fn handle_attach_node_action(&mut self, action: KeyAction) -> EventResult {
        match action {
            KeyAction::Escape => {
                self.modal = ModalState::None;
                EventResult::Continue
            }
            KeyAction::Select => {
                if let ModalState::AttachNode { job_id, edit_buffer } = std::mem::take(&mut self.modal) {
                    let job = self.jobs.view.snapshot.get(&job_id).cloned();
                    return self.request_attach_for(job.as_ref(), Some(&edit_buffer));
                }
                EventResult::Continue
            }
            other => self.edit_text(other),
        }
    }

    fn edit_text(&mut self, action: KeyAction) -> EventResult {
        match action {
            KeyAction::InputClear => self.modal.edit(|buf, cursor| {
                buf.clear();
                *cursor = 0;
            }),
            KeyAction::InputBackspace => self.modal.edit(|buf, cursor| {
                if *cursor > 0 {
                    *cursor -= 1;
                    if let Some((byte, _)) = buf.char_indices().nth(*cursor) {
                        buf.remove(byte);
                    }
                }
            }),
            KeyAction::InputChar(c) => self.modal.edit(|buf, cursor| {
                let byte = buf.char_indices().nth(*cursor).map_or(buf.len(), |(b, _)| b);
                buf.insert(byte, c);
                *cursor += 1;
            }),
            _ => return EventResult::Unchanged,
        }
        EventResult::Continue
    }

    fn switch_view(&mut self, view: View) -> EventResult {
        self.current_view = view;
        self.resync_current();
        EventResult::Continue
    }

    fn resync_current(&mut self) {
        let page = self.page_size;
        match self.current_view {
            View::Jobs => self.jobs.resync(page),
            View::Nodes => self.nodes.resync(page),
            View::Partitions => self.partitions.resync(page),
        }
    }

    #[must_use]
    pub fn current_filter(&self) -> &str {
        match self.current_view {
            View::Jobs => self.jobs.query.filter.as_str(),
            View::Nodes => self.nodes.query.filter.as_str(),
            View::Partitions => self.partitions.query.filter.as_str(),
        }
    }

    fn set_current_filter(&mut self, text: &str) {
        let filter = Filter::parse(text);
        match self.current_view {
            View::Jobs => self.jobs.query.filter = filter,
            View::Nodes => self.nodes.query.filter = filter,
            View::Partitions => self.partitions.query.filter = filter,
        }
        self.resync_current();
    }

    /// Run `f` with the sort spec of the current view, then re-resolve.
    fn with_sort<F>(&mut self, f: F)
    where
        F: FnOnce(
            Option<&mut SortSpec<JobSortField>>,
            Option<&mut SortSpec<NodeSortField>>,
            Option<&mut SortSpec<PartitionSortField>>,
        ),
    {
        match self.current_view {
            View::Jobs => f(Some(&mut self.jobs.query.sort), None, None),
            View::Nodes => f(None, Some(&mut self.nodes.query.sort), None),
            View::Partitions => f(None, None, Some(&mut self.partitions.query.sort)),
        }
        self.resync_current();
    }

    /// Human-readable sort of the current view, e.g. `cpus ▼`
    #[must_use]
    pub fn sort_label(&self) -> String {
        let (field, direction) = match self.current_view {
            View::Jobs => (self.jobs.query.sort.field.as_str(), self.jobs.query.sort.direction),
            View::Nodes => (self.nodes.query.sort.field.as_str(), self.nodes.query.sort.direction),
            View::Partitions => (
                self.partitions.query.sort.field.as_str(),
                self.partitions.query.sort.direction,
            ),
        };
        format!("{} {}", field, direction.arrow())
    }

    fn open_detail(&mut self) -> EventResult {
        let request = match self.current_view {
            View::Jobs => self
                .jobs
                .selected()
                .map(|j| (format!("Job {}", j.id), AppCommand::FetchJobDetail(j.id.clone()))),
            View::Nodes => self
                .nodes
                .selected()
                .map(|n| (format!("Node {}", n.hostname), AppCommand::FetchNodeDetail(n.hostname.clone()))),
            View::Partitions => None,
        };

        match request {
            Some((title, command)) => {
                self.modal = ModalState::Detail {
                    title,
                    content: DetailContent::Loading,
                };
                self.commands.push(command);
                EventResult::Continue
            }
            None => EventResult::Unchanged,
        }
    }

    fn open_log(&mut self, stream: LogStream) -> EventResult {
        if self.current_view != View::Jobs {
            return EventResult::Unchanged;
        }
        match self.jobs.selected().map(|j| j.id.clone()) {
            Some(job_id) => {
                self.show_log(job_id, stream);
                EventResult::Continue
            }
            None => EventResult::Unchanged,
        }
    }

    fn show_log(&mut self, job_id: String, stream: LogStream) {
        self.commands.push(AppCommand::FetchLog {
            job_id: job_id.clone(),
            stream,
        });
        self.modal = ModalState::Log(LogViewer::new(job_id, stream));
    }

    fn request_attach(&mut self, node_override: Option<&str>) -> EventResult {
        if self.current_view != View::Jobs {
            self.feedback.set_error("Attach works from the Jobs view");
            return EventResult::Continue;
        }
        let job = self.jobs.selected().cloned();
        self.request_attach_for(job.as_ref(), node_override)
    }

    fn request_attach_for(&mut self, job: Option<&Job>, node_override: Option<&str>) -> EventResult {
        match self.orchestrator.request_attach(job, node_override) {
            Ok(plan) => {
                self.modal = ModalState::None;
                self.feedback
                    .set_info(format!("Attaching to job {} on {}", plan.job_id, plan.node));
                self.commands.push(AppCommand::Attach(plan));
            }
            Err(e) => self.feedback.set_error(e.to_string()),
        }
        EventResult::Continue
    }

    /// Called by the event loop once an attach session is over.
    pub fn finish_attach(&mut self, result: Result<AttachOutcome, AttachError>) {
        match result {
            Ok(outcome) if outcome.exit.is_ok() => self.feedback.set_info(outcome.summary()),
            Ok(outcome) => self.feedback.set_error(outcome.summary()),
            Err(e) => self.feedback.set_error(e.to_string()),
        }
        self.reload_all();
    }

    /// Handle a data event
    pub fn handle_data(&mut self, event: DataEvent) -> EventResult {
        match event {
            DataEvent::Tick => {
                self.reload_all();
                if let ModalState::Log(viewer) = &mut self.modal
                    && viewer.due(LOG_REFRESH_INTERVAL)
                {
                    request_log(viewer, &mut self.commands);
                }
                EventResult::Continue
            }
            DataEvent::Refresh(RefreshEvent::Committed { kind, .. }) => {
                self.reload(kind);
                EventResult::Continue
            }
            DataEvent::Refresh(RefreshEvent::Failed { kind, error }) => {
                self.reload(kind);
                self.feedback.set_error(format!("{}: {}", kind, error));
                EventResult::Continue
            }
            DataEvent::Detail { title, result } => {
                if let ModalState::Detail {
                    title: open_title,
                    content,
                } = &mut self.modal
                    && *open_title == title
                {
                    *content = match result {
                        Ok(fields) => DetailContent::Loaded(fields),
                        Err(e) => DetailContent::Failed(e),
                    };
                    return EventResult::Continue;
                }
                EventResult::Unchanged
            }
            DataEvent::Log { job_id, stream, result } => {
                if let ModalState::Log(viewer) = &mut self.modal
                    && viewer.job_id == job_id
                    && viewer.stream == stream
                {
                    viewer.in_flight = false;
                    viewer.content = match result {
                        Ok(tail) => LogContent::Loaded {
                            path: tail.path,
                            text: tail.text,
                        },
                        Err(e) => LogContent::Failed(e),
                    };
                    viewer.scroll_back = viewer.scroll_back.min(viewer.line_count().saturating_sub(1));
                    return EventResult::Continue;
                }
                EventResult::Unchanged
            }
        }
    }

    fn reload(&mut self, kind: EntityKind) {
        let page = self.page_size;
        match kind {
            EntityKind::Jobs => {
                self.jobs.reload(&self.store, page);
                let removed = self
                    .watch
                    .retain_present(self.jobs.view.snapshot.records().iter().map(|j| j.id.as_str()));
                if removed > 0 {
                    tracing::debug!(removed, "watched jobs left the queue");
                }
            }
            EntityKind::Nodes => self.nodes.reload(&self.store, page),
            EntityKind::Partitions => self.partitions.reload(&self.store, page),
        }
    }

    fn reload_all(&mut self) {
        for kind in EntityKind::ALL {
            self.reload(kind);
        }
    }

    pub fn running_job_count(&self) -> usize {
        self.jobs.view.snapshot.records().iter().filter(|j| j.is_running()).count()
    }

    pub fn pending_job_count(&self) -> usize {
        self.jobs
            .view
            .snapshot
            .records()
            .iter()
            .filter(|j| j.state == JobState::Pending)
            .count()
    }

    pub fn unavailable_node_count(&self) -> usize {
        self.nodes
            .view
            .snapshot
            .records()
            .iter()
            .filter(|n| n.state.is_unavailable())
            .count()
    }
}

/// Queue a re-read unless one is already running.
fn request_log(viewer: &mut LogViewer, commands: &mut Vec<AppCommand>) {
    if viewer.in_flight {
        return;
    }
    viewer.mark_requested();
    commands.push(AppCommand::FetchLog {
        job_id: viewer.job_id.clone(),
        stream: viewer.stream,
    });
}
