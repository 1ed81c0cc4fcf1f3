//! Typed records for the three entity kinds the dashboard mirrors.
//!
//! Every record type is keyed by a string identifier that is unique within a
//! snapshot and stable across consecutive snapshots.

mod job;
mod limit;
mod node;
mod partition;
mod state;

use serde::Serialize;

pub use job::Job;
pub use limit::TimeLimit;
pub use node::Node;
pub use partition::Partition;
pub use state::{JobState, NodeState};

/// Entity kinds with their own query command and snapshot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Jobs,
    Nodes,
    Partitions,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Jobs, EntityKind::Nodes, EntityKind::Partitions];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Nodes => "nodes",
            Self::Partitions => "partitions",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that can live in a snapshot.
pub trait Record: Clone + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Identifier used to match this record across snapshots.
    fn key(&self) -> &str;
}

impl Record for Job {
    const KIND: EntityKind = EntityKind::Jobs;

    fn key(&self) -> &str {
        &self.id
    }
}

impl Record for Node {
    const KIND: EntityKind = EntityKind::Nodes;

    fn key(&self) -> &str {
        &self.hostname
    }
}

impl Record for Partition {
    const KIND: EntityKind = EntityKind::Partitions;

    fn key(&self) -> &str {
        &self.name
    }
}
