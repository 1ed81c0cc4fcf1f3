//! Application state types for the TUI
//!
//! - View selection and modal overlays
//! - `ListView`: one live table (snapshot, query, selection)
//! - Feedback messages for the status bar

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::parser::DetailFields;
use crate::slurm::logs::LogStream;
use crate::store::{Diff, SnapshotStore, SnapshotView, Stored};
use crate::view::{Filterable, Selection, Sortable, ViewQuery};

/// How long a status message stays visible
const MESSAGE_TTL: Duration = Duration::from_secs(8);

// ============================================================================
// Views and modals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Jobs,
    Nodes,
    Partitions,
}

impl View {
    pub const ALL: [View; 3] = [View::Jobs, View::Nodes, View::Partitions];

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            View::Jobs => "Jobs",
            View::Nodes => "Nodes",
            View::Partitions => "Partitions",
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        match self {
            View::Jobs => View::Nodes,
            View::Nodes => View::Partitions,
            View::Partitions => View::Jobs,
        }
    }

    /// Parse the `display.default_view` setting
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "jobs" => Some(View::Jobs),
            "nodes" => Some(View::Nodes),
            "partitions" => Some(View::Partitions),
            _ => None,
        }
    }
}

/// Drill-down popup contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailContent {
    Loading,
    Loaded(DetailFields),
    Failed(String),
}

/// Log viewer contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogContent {
    Loading,
    Loaded { path: String, text: String },
    Failed(String),
}

/// Tail of a job's stdout or stderr file.
///
/// `scroll_back` counts lines up from the end; following pins it to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogViewer {
    pub job_id: String,
    pub stream: LogStream,
    pub content: LogContent,
    pub follow: bool,
    pub scroll_back: usize,
    pub requested_at: Instant,
    pub in_flight: bool,
}

impl LogViewer {
    #[must_use]
    pub fn new(job_id: String, stream: LogStream) -> Self {
        Self {
            job_id,
            stream,
            content: LogContent::Loading,
            follow: true,
            scroll_back: 0,
            requested_at: Instant::now(),
            in_flight: true,
        }
    }

    /// Whether a following viewer is due for another tail.
    #[must_use]
    pub fn due(&self, interval: Duration) -> bool {
        self.follow && !self.in_flight && self.requested_at.elapsed() >= interval
    }

    pub fn mark_requested(&mut self) {
        self.requested_at = Instant::now();
        self.in_flight = true;
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        match &self.content {
            LogContent::Loaded { text, .. } => text.lines().count(),
            _ => 0,
        }
    }

    /// Scroll towards the start. Leaving the end stops following.
    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.line_count().saturating_sub(1);
        self.scroll_back = self.scroll_back.saturating_add(lines).min(max);
        if self.scroll_back > 0 {
            self.follow = false;
        }
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModalState {
    #[default]
    None,
    Help,
    Health,
    Filter {
        edit_buffer: String,
        cursor: usize,
    },
    AttachNode {
        job_id: String,
        edit_buffer: String,
    },
    Detail {
        title: String,
        content: DetailContent,
    },
    Log(LogViewer),
}

impl ModalState {
    /// Modals that capture typed characters
    #[must_use]
    pub fn is_text_input(&self) -> bool {
        matches!(self, ModalState::Filter { .. } | ModalState::AttachNode { .. })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, ModalState::None)
    }

    /// Append or delete in whichever text buffer is open.
    pub fn edit(&mut self, f: impl FnOnce(&mut String, &mut usize)) {
        match self {
            ModalState::Filter { edit_buffer, cursor } => f(edit_buffer, cursor),
            ModalState::AttachNode { edit_buffer, .. } => {
                let mut end = edit_buffer.chars().count();
                f(edit_buffer, &mut end);
            }
            _ => {}
        }
    }
}

// ============================================================================
// ListView
// ============================================================================

/// One table: the latest snapshot of `T`, the active query and the cursor.
pub struct ListView<T: Stored + Sortable> {
    pub view: SnapshotView<T>,
    pub diff: Arc<Diff>,
    pub query: ViewQuery<T::Field>,
    pub selection: Selection,
}

impl<T> ListView<T>
where
    T: Stored + Sortable + Filterable,
{
    pub fn new(store: &SnapshotStore, query: ViewQuery<T::Field>) -> Self {
        Self {
            view: store.current::<T>(),
            diff: store.diff::<T>(),
            query,
            selection: Selection::default(),
        }
    }

    /// Pull the latest snapshot, then re-resolve the cursor.
    pub fn reload(&mut self, store: &SnapshotStore, page: usize) {
        self.view = store.current::<T>();
        self.diff = store.diff::<T>();
        self.resync(page);
    }

    /// Re-resolve the cursor after the snapshot or the query changed.
    pub fn resync(&mut self, page: usize) {
        let rows = self.query.apply(self.view.snapshot.records());
        self.selection.resolve(&rows);
        self.selection.scroll_into_view(page);
    }

    #[must_use]
    pub fn rows(&self) -> Vec<&T> {
        self.query.apply(self.view.snapshot.records())
    }

    #[must_use]
    pub fn selected(&self) -> Option<&T> {
        let rows = self.rows();
        self.selection.selected(&rows)
    }

    /// Apply a cursor movement against the current rows.
    pub fn navigate(&mut self, page: usize, f: impl FnOnce(&mut Selection, &[&T])) {
        let rows = self.query.apply(self.view.snapshot.records());
        f(&mut self.selection, &rows);
        self.selection.scroll_into_view(page);
    }

    /// Whether `key` changed or appeared in the latest refresh
    #[must_use]
    pub fn is_fresh(&self, key: &str) -> bool {
        self.diff.added.contains(key) || self.diff.changed.contains(key)
    }
}

// ============================================================================
// Feedback
// ============================================================================

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    pub shown_at: Instant,
}

/// Status bar messages and persistent config warnings
#[derive(Debug, Clone, Default)]
pub struct FeedbackState {
    message: Option<StatusMessage>,
    pub config_warnings: Vec<String>,
}

impl FeedbackState {
    pub fn new(config_warnings: Vec<String>) -> Self {
        Self {
            message: None,
            config_warnings,
        }
    }

    pub fn set_info(&mut self, text: impl Into<String>) {
        self.message = Some(StatusMessage {
            text: text.into(),
            is_error: false,
            shown_at: Instant::now(),
        });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.message = Some(StatusMessage {
            text: text.into(),
            is_error: true,
            shown_at: Instant::now(),
        });
    }

    /// The current message, unless it has expired
    #[must_use]
    pub fn current(&self) -> Option<&StatusMessage> {
        self.message
            .as_ref()
            .filter(|m| m.shown_at.elapsed() < MESSAGE_TTL)
    }
}
