//! Watched job identifiers.

use std::collections::BTreeSet;

/// Jobs flagged for highlighting. An entry lives until it is toggled off or
/// the job is gone from the latest snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    ids: BTreeSet<String>,
}

impl WatchSet {
    /// Flip membership of `id`. Returns true if it is now watched.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Drop identifiers not present in `current`. Returns how many were removed.
    pub fn retain_present<'a, I>(&mut self, current: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: BTreeSet<&str> = current.into_iter().collect();
        let before = self.ids.len();
        self.ids.retain(|id| present.contains(id.as_str()));
        before - self.ids.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let mut watch = WatchSet::default();
        assert!(watch.toggle("42"));
        assert!(watch.contains("42"));
        assert!(!watch.toggle("42"));
        assert!(watch.is_empty());
    }

    #[test]
    fn test_retain_present_drops_vanished_jobs() {
        let mut watch = WatchSet::default();
        watch.toggle("1");
        watch.toggle("2");
        watch.toggle("3");

        let removed = watch.retain_present(["2", "3", "4"]);
        assert_eq!(removed, 1);
        assert_eq!(watch.len(), 2);
        assert!(!watch.contains("1"));
        assert!(watch.contains("2") && watch.contains("3"));
    }
}
