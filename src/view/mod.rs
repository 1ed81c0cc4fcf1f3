//! Sort/filter engine over snapshots.
//!
//! A [`ViewQuery`] pairs a comparator with a predicate and produces an
//! ordering of borrowed records; the snapshot itself is never touched.

pub mod filter;
pub mod selection;
pub mod sort;
pub mod watch;

pub use filter::{Filter, Filterable};
pub use selection::Selection;
pub use sort::{JobSortField, NodeSortField, PartitionSortField, SortDirection, SortSpec, Sortable};
pub use watch::WatchSet;

/// Comparator plus predicate for one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery<F> {
    pub sort: SortSpec<F>,
    pub filter: Filter,
    /// Restrict to records owned by this user.
    pub only_user: Option<String>,
}

impl<F: Copy + Eq> ViewQuery<F> {
    pub fn new(sort: SortSpec<F>) -> Self {
        Self {
            sort,
            filter: Filter::default(),
            only_user: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, text: &str) -> Self {
        self.filter = Filter::parse(text);
        self
    }

    #[must_use]
    pub fn with_only_user(mut self, user: Option<String>) -> Self {
        self.only_user = user;
        self
    }

    pub fn accepts<T: Filterable>(&self, record: &T) -> bool {
        let owner_ok = match (&self.only_user, record.owner()) {
            (Some(user), Some(owner)) => owner == user,
            _ => true,
        };
        owner_ok && self.filter.matches(record)
    }

    /// Filtered and sorted view of `records`.
    pub fn apply<'a, T>(&self, records: &'a [T]) -> Vec<&'a T>
    where
        T: Sortable<Field = F> + Filterable,
    {
        let mut rows: Vec<&T> = records.iter().filter(|r| self.accepts(*r)).collect();
        rows.sort_by(|a, b| self.sort.compare(*a, *b));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Job, JobState};

    fn job(id: &str, user: &str, state: JobState, cpus: u32) -> Job {
        Job {
            id: id.to_string(),
            name: format!("job{id}"),
            user: user.to_string(),
            state,
            cpus,
            ..Default::default()
        }
    }

    fn sample() -> Vec<Job> {
        vec![
            job("10", "alice", JobState::Pending, 4),
            job("9", "bob", JobState::Running, 8),
            job("11", "alice", JobState::Running, 4),
            job("100", "carol", JobState::Running, 4),
        ]
    }

    fn ids(rows: &[&Job]) -> Vec<String> {
        rows.iter().map(|j| j.id.clone()).collect()
    }

    #[test]
    fn test_ties_fall_back_to_id() {
        let jobs = sample();
        let query = ViewQuery::new(SortSpec::new(JobSortField::Cpus, SortDirection::Ascending));
        assert_eq!(ids(&query.apply(&jobs)), vec!["10", "11", "100", "9"]);

        let desc = ViewQuery::new(SortSpec::new(JobSortField::Cpus, SortDirection::Descending));
        assert_eq!(ids(&desc.apply(&jobs)), vec!["9", "10", "11", "100"]);
    }

    #[test]
    fn test_apply_is_idempotent_and_leaves_input_alone() {
        let jobs = sample();
        let query = ViewQuery::new(SortSpec::new(JobSortField::State, SortDirection::Ascending));
        let first = ids(&query.apply(&jobs));

        let mut shuffled = jobs.clone();
        shuffled.reverse();
        assert_eq!(ids(&query.apply(&shuffled)), first);
        assert_eq!(jobs, sample());
    }

    #[test]
    fn test_only_user_and_filter_compose() {
        let jobs = sample();
        let query = ViewQuery::new(SortSpec::new(JobSortField::Id, SortDirection::Ascending))
            .with_only_user(Some("alice".to_string()))
            .with_filter("state:running");
        assert_eq!(ids(&query.apply(&jobs)), vec!["11"]);

        let unrestricted = ViewQuery::new(SortSpec::new(JobSortField::Id, SortDirection::Ascending));
        assert_eq!(ids(&unrestricted.apply(&jobs)), vec!["9", "10", "11", "100"]);
    }
}
