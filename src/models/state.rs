//! Job and node state enums.
//!
//! Both enums are produced exclusively by the record parser from the state
//! column of the query output. Unrecognized tokens map to `Unknown`, so a new
//! scheduler state never fails a parse.

use serde::Serialize;

// ============================================================================
// Job State
// ============================================================================

/// Job state as reported by the job query.
///
/// Covers the base states the dashboard distinguishes. Everything else
/// (`COMPLETING`, `BOOT_FAIL`, site-specific tokens) is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Pending,
    Suspended,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    #[default]
    Unknown,
}

impl JobState {
    /// Parse a state token.
    ///
    /// Handles full names ("RUNNING"), short codes ("R") and annotated states
    /// like "CANCELLED by 12345". Matching is case-insensitive.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        let first = token.split_whitespace().next().unwrap_or_default();
        match first.to_ascii_uppercase().as_str() {
            "RUNNING" | "R" => Self::Running,
            "PENDING" | "PD" => Self::Pending,
            "SUSPENDED" | "S" => Self::Suspended,
            "COMPLETED" | "CD" => Self::Completed,
            "FAILED" | "F" => Self::Failed,
            "CANCELLED" | "CA" => Self::Cancelled,
            "TIMEOUT" | "TO" => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Pending => "PENDING",
            Self::Suspended => "SUSPENDED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Short display string for narrow columns.
    #[must_use]
    pub fn short_str(&self) -> &'static str {
        match self {
            Self::Running => "R",
            Self::Pending => "PD",
            Self::Suspended => "S",
            Self::Completed => "CD",
            Self::Failed => "F",
            Self::Cancelled => "CA",
            Self::Timeout => "TO",
            Self::Unknown => "?",
        }
    }

    /// Ordering used by the state sort column: active work first.
    #[must_use]
    pub fn sort_rank(&self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Pending => 1,
            Self::Suspended => 2,
            Self::Failed => 3,
            Self::Timeout => 4,
            Self::Cancelled => 5,
            Self::Completed => 6,
            Self::Unknown => 7,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Node State
// ============================================================================

/// Flag characters sinfo appends to long state names
/// (`*` not responding, `~` powered off, `#` powering up, `-` planned, ...).
const NODE_STATE_FLAGS: &[char] = &['*', '~', '#', '!', '%', '$', '@', '^', '-'];

/// Node state as reported by the node query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Idle,
    Allocated,
    Mixed,
    Down,
    Draining,
    #[default]
    Unknown,
}

impl NodeState {
    /// Parse a node state token such as `idle`, `mix`, `down*` or `idle+drain`.
    ///
    /// Compound states resolve by severity: any `down` component wins, then any
    /// drain component, then the first component.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        let lowered = token.trim().to_ascii_lowercase();
        let parts: Vec<Self> = lowered
            .split('+')
            .map(|part| Self::from_base(part.trim_end_matches(NODE_STATE_FLAGS)))
            .collect();

        if parts.contains(&Self::Down) {
            Self::Down
        } else if parts.contains(&Self::Draining) {
            Self::Draining
        } else {
            parts.first().copied().unwrap_or_default()
        }
    }

    fn from_base(base: &str) -> Self {
        match base {
            "idle" => Self::Idle,
            "allocated" | "alloc" => Self::Allocated,
            "mixed" | "mix" => Self::Mixed,
            "down" | "fail" | "failing" | "failg" => Self::Down,
            "draining" | "drain" | "drained" | "drng" => Self::Draining,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Allocated => "ALLOCATED",
            Self::Mixed => "MIXED",
            Self::Down => "DOWN",
            Self::Draining => "DRAINING",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether the node cannot accept new work.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Down | Self::Draining)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
