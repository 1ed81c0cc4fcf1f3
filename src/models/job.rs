//! Job records produced by the job query parser.

use serde::Serialize;

use super::limit::TimeLimit;
use super::state::JobState;
use crate::formatting::format_duration_hms;
use crate::parser::hostlist;

/// A job as reported by one run of the job query.
///
/// Fields the query did not report stay at their defaults; nothing is
/// derived from other rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Opaque identifier, e.g. `12345` or `12345_7` for array tasks.
    pub id: String,
    pub name: String,
    pub user: String,
    pub state: JobState,
    pub partition: String,
    /// Compressed hostlist expression (`c[01-04]`), empty while pending.
    pub node_list: String,
    pub node_count: u32,
    pub cpus: u32,
    pub elapsed_seconds: u64,
    pub time_limit: TimeLimit,
    /// Pending reason without the surrounding parentheses (`Resources`).
    pub reason: String,
}

impl Job {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    /// First hostname of the allocation, expanded from the hostlist.
    #[must_use]
    pub fn first_node(&self) -> Option<String> {
        hostlist::first_host(&self.node_list)
    }

    #[must_use]
    pub fn elapsed_display(&self) -> String {
        format_duration_hms(self.elapsed_seconds)
    }

    /// The squeue-style NODELIST(REASON) cell.
    #[must_use]
    pub fn nodelist_or_reason(&self) -> String {
        if !self.node_list.is_empty() {
            self.node_list.clone()
        } else if !self.reason.is_empty() {
            format!("({})", self.reason)
        } else {
            String::new()
        }
    }
}
