//! Versioned snapshots of cluster state, one slot per entity kind.
//!
//! A slot holds the live snapshot and its diff against the snapshot it
//! replaced. Snapshots are immutable and shared through `Arc`; a replace swaps
//! the pointer under a write lock, so readers see either the old or the new
//! snapshot in full.
//!
//! Every write carries the sequence number of the fetch that produced it.
//! A slot only accepts a sequence above its floor, and every accepted
//! commit, failure or fence raises the floor. A slow fetch that finishes after
//! a newer one is therefore discarded.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::models::{EntityKind, Job, Node, Partition, Record};

// ============================================================================
// Snapshot
// ============================================================================

/// An immutable set of records of one kind as of one successful refresh.
#[derive(Debug)]
pub struct Snapshot<T> {
    version: u64,
    taken_at: Instant,
    records: Vec<T>,
}

impl<T> Snapshot<T> {
    fn empty() -> Self {
        Self {
            version: 0,
            taken_at: Instant::now(),
            records: Vec::new(),
        }
    }

    /// 0 until the first successful refresh.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.taken_at.elapsed()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Record> Snapshot<T> {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.records.iter().find(|r| r.key() == key)
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Identifiers that differ between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub changed: BTreeSet<String>,
}

impl Diff {
    /// Compare `new` against `old` by key.
    #[must_use]
    pub fn between<T: Record>(old: &[T], new: &[T]) -> Self {
        let old_by_key: HashMap<&str, &T> = old.iter().map(|r| (r.key(), r)).collect();
        let new_keys: HashSet<&str> = new.iter().map(|r| r.key()).collect();

        let mut diff = Self::default();
        for record in new {
            match old_by_key.get(record.key()) {
                None => {
                    diff.added.insert(record.key().to_string());
                }
                Some(previous) if *previous != record => {
                    diff.changed.insert(record.key().to_string());
                }
                Some(_) => {}
            }
        }
        for key in old_by_key.keys() {
            if !new_keys.contains(key) {
                diff.removed.insert((*key).to_string());
            }
        }
        diff
    }
}

// ============================================================================
// Slot
// ============================================================================

/// Outcome of a replace call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Committed { version: u64 },
    /// The sequence was at or below the slot's floor.
    Discarded { seq: u64, floor: u64 },
}

/// Read-only view of a slot for renderers.
#[derive(Debug, Clone)]
pub struct SnapshotView<T> {
    pub snapshot: Arc<Snapshot<T>>,
    pub age: Duration,
    pub last_error: Option<String>,
    pub is_stale: bool,
}

struct SlotState<T> {
    current: Arc<Snapshot<T>>,
    diff: Arc<Diff>,
    floor: u64,
    last_error: Option<String>,
}

/// Storage for one entity kind.
pub struct Slot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T: Record> Slot<T> {
    fn new() -> Self {
        Self {
            state: RwLock::new(SlotState {
                current: Arc::new(Snapshot::empty()),
                diff: Arc::new(Diff::default()),
                floor: 0,
                last_error: None,
            }),
        }
    }

    fn replace(&self, mut records: Vec<T>, seq: u64) -> Commit {
        dedupe_by_key(&mut records);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if seq <= state.floor {
            debug!(kind = %T::KIND, seq, floor = state.floor, "discarding stale snapshot");
            return Commit::Discarded {
                seq,
                floor: state.floor,
            };
        }

        let version = state.current.version + 1;
        let diff = Diff::between(state.current.records(), &records);
        let snapshot = Arc::new(Snapshot {
            version,
            taken_at: Instant::now(),
            records,
        });

        debug!(
            kind = %T::KIND,
            version,
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            "snapshot committed"
        );

        state.current = snapshot;
        state.diff = Arc::new(diff);
        state.floor = seq;
        state.last_error = None;
        Commit::Committed { version }
    }

    fn record_failure(&self, seq: u64, error: String) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if seq <= state.floor {
            return false;
        }
        state.floor = seq;
        state.last_error = Some(error);
        true
    }

    fn fence(&self, seq: u64) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if seq > state.floor {
            info!(kind = %T::KIND, seq, "fencing in-flight fetch");
            state.floor = seq;
        }
    }

    fn view(&self, stale_after: Duration) -> SnapshotView<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let age = state.current.age();
        SnapshotView {
            snapshot: Arc::clone(&state.current),
            age,
            last_error: state.last_error.clone(),
            is_stale: state.last_error.is_some() || (state.current.version > 0 && age > stale_after),
        }
    }

    fn diff(&self) -> Arc<Diff> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.diff)
    }
}

/// Keep the first record for each key.
fn dedupe_by_key<T: Record>(records: &mut Vec<T>) {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    records.retain(|r| seen.insert(r.key().to_string()));
}

// ============================================================================
// Store
// ============================================================================

/// Record types with a slot in the store.
pub trait Stored: Record + Sized {
    fn slot(store: &SnapshotStore) -> &Slot<Self>;
}

impl Stored for Job {
    fn slot(store: &SnapshotStore) -> &Slot<Self> {
        &store.jobs
    }
}

impl Stored for Node {
    fn slot(store: &SnapshotStore) -> &Slot<Self> {
        &store.nodes
    }
}

impl Stored for Partition {
    fn slot(store: &SnapshotStore) -> &Slot<Self> {
        &store.partitions
    }
}

/// The only shared mutable state of the dashboard.
pub struct SnapshotStore {
    jobs: Slot<Job>,
    nodes: Slot<Node>,
    partitions: Slot<Partition>,
    stale_after: Duration,
}

impl SnapshotStore {
    /// `stale_after` is the age at which a snapshot counts as stale even
    /// without a recorded error.
    #[must_use]
    pub fn new(stale_after: Duration) -> Self {
        Self {
            jobs: Slot::new(),
            nodes: Slot::new(),
            partitions: Slot::new(),
            stale_after,
        }
    }

    /// Swap in a new snapshot if `seq` is newer than anything seen so far.
    pub fn replace<T: Stored>(&self, records: Vec<T>, seq: u64) -> Commit {
        T::slot(self).replace(records, seq)
    }

    #[must_use]
    pub fn current<T: Stored>(&self) -> SnapshotView<T> {
        T::slot(self).view(self.stale_after)
    }

    /// Diff between the live snapshot and the one it replaced.
    #[must_use]
    pub fn diff<T: Stored>(&self) -> Arc<Diff> {
        T::slot(self).diff()
    }

    /// Keep the snapshot, remember the error. Returns false for a late
    /// failure that was superseded.
    pub fn record_failure(&self, kind: EntityKind, seq: u64, error: impl Into<String>) -> bool {
        let error = error.into();
        match kind {
            EntityKind::Jobs => self.jobs.record_failure(seq, error),
            EntityKind::Nodes => self.nodes.record_failure(seq, error),
            EntityKind::Partitions => self.partitions.record_failure(seq, error),
        }
    }

    /// Raise the commit floor so fetches tagged `<= seq` are discarded.
    pub fn fence(&self, kind: EntityKind, seq: u64) {
        match kind {
            EntityKind::Jobs => self.jobs.fence(seq),
            EntityKind::Nodes => self.nodes.fence(seq),
            EntityKind::Partitions => self.partitions.fence(seq),
        }
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobState;

    fn job(id: &str, state: JobState) -> Job {
        Job {
            id: id.to_string(),
            name: format!("job-{id}"),
            state,
            ..Default::default()
        }
    }

    fn store() -> SnapshotStore {
        SnapshotStore::new(Duration::from_secs(60))
    }

    #[test]
    fn test_replace_then_current_returns_same_records() {
        let store = store();
        let records = vec![job("1", JobState::Running), job("2", JobState::Pending)];
        assert_eq!(
            store.replace(records.clone(), 1),
            Commit::Committed { version: 1 }
        );

        let view = store.current::<Job>();
        assert_eq!(view.snapshot.records(), records.as_slice());
        assert_eq!(view.snapshot.version(), 1);
        assert!(!view.is_stale);
        assert!(view.last_error.is_none());
    }

    #[test]
    fn test_diff_reports_added_removed_changed() {
        let store = store();
        store.replace(vec![job("1", JobState::Pending), job("2", JobState::Running)], 1);
        store.replace(vec![job("1", JobState::Running), job("3", JobState::Pending)], 2);

        let diff = store.diff::<Job>();
        assert_eq!(diff.added, BTreeSet::from(["3".to_string()]));
        assert_eq!(diff.removed, BTreeSet::from(["2".to_string()]));
        assert_eq!(diff.changed, BTreeSet::from(["1".to_string()]));
        assert_eq!(store.current::<Job>().snapshot.version(), 2);
    }

    #[test]
    fn test_out_of_order_commit_is_discarded() {
        let store = store();
        // Fetch #2 completes first.
        store.replace(vec![job("new", JobState::Running)], 2);
        // Fetch #1 arrives late.
        let outcome = store.replace(vec![job("old", JobState::Running)], 1);
        assert_eq!(outcome, Commit::Discarded { seq: 1, floor: 2 });

        let view = store.current::<Job>();
        assert!(view.snapshot.get("new").is_some());
        assert!(view.snapshot.get("old").is_none());
    }

    #[test]
    fn test_failure_keeps_snapshot_and_marks_stale() {
        let store = store();
        store.replace(vec![job("1", JobState::Running)], 1);
        assert!(store.record_failure(EntityKind::Jobs, 2, "squeue timed out"));

        let view = store.current::<Job>();
        assert_eq!(view.snapshot.len(), 1);
        assert!(view.is_stale);
        assert_eq!(view.last_error.as_deref(), Some("squeue timed out"));

        store.replace(vec![job("1", JobState::Running)], 3);
        assert!(!store.current::<Job>().is_stale);
    }

    #[test]
    fn test_late_failure_is_ignored() {
        let store = store();
        store.replace(vec![job("1", JobState::Running)], 5);
        assert!(!store.record_failure(EntityKind::Jobs, 4, "late"));
        assert!(store.current::<Job>().last_error.is_none());
    }

    #[test]
    fn test_fence_discards_in_flight() {
        let store = store();
        store.fence(EntityKind::Nodes, 3);
        let outcome = store.replace(vec![Node::default()], 3);
        assert!(matches!(outcome, Commit::Discarded { .. }));
        assert_eq!(store.current::<Node>().snapshot.version(), 0);

        // Fences never lower the floor.
        store.fence(EntityKind::Nodes, 1);
        assert!(matches!(
            store.replace(vec![Node::default()], 2),
            Commit::Discarded { .. }
        ));
    }

    #[test]
    fn test_slots_are_independent() {
        let store = store();
        store.replace(vec![job("1", JobState::Running)], 7);
        let outcome = store.replace(
            vec![Partition {
                name: "cpu".to_string(),
                ..Default::default()
            }],
            1,
        );
        assert_eq!(outcome, Commit::Committed { version: 1 });
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let store = store();
        store.replace(vec![job("1", JobState::Running), job("1", JobState::Pending)], 1);
        let view = store.current::<Job>();
        assert_eq!(view.snapshot.len(), 1);
        assert_eq!(view.snapshot.records()[0].state, JobState::Running);
    }

    #[test]
    fn test_age_threshold_marks_stale() {
        let store = SnapshotStore::new(Duration::ZERO);
        store.replace(vec![job("1", JobState::Running)], 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.current::<Job>().is_stale);
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(store());
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for seq in 1..=200u64 {
                    let records: Vec<Job> = (0..10)
                        .map(|i| job(&format!("{seq}-{i}"), JobState::Running))
                        .collect();
                    store.replace(records, seq);
                }
            })
        };
        for _ in 0..200 {
            let view = store.current::<Job>();
            let len = view.snapshot.len();
            assert!(len == 0 || len == 10);
        }
        writer.join().unwrap();
        assert_eq!(store.current::<Job>().snapshot.version(), 200);
    }
}
