//! Selection cursor that follows a record by identifier.

use crate::models::Record;

/// Highlighted row of a sorted view plus its scroll offset.
///
/// The identifier is authoritative; the index is a cache re-resolved after
/// every refresh or re-sort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    key: Option<String>,
    index: usize,
    offset: usize,
}

impl Selection {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Re-resolve against a new ordering.
    ///
    /// If the selected identifier is gone, the cursor stays at the same
    /// index (clamped to the new length) and adopts that row's identifier.
    pub fn resolve<T: Record>(&mut self, rows: &[&T]) {
        if rows.is_empty() {
            self.key = None;
            self.index = 0;
            return;
        }

        if let Some(key) = self.key.as_deref()
            && let Some(pos) = rows.iter().position(|r| r.key() == key)
        {
            self.index = pos;
            return;
        }

        self.index = self.index.min(rows.len() - 1);
        self.key = Some(rows[self.index].key().to_string());
    }

    pub fn select_index<T: Record>(&mut self, rows: &[&T], index: usize) {
        if rows.is_empty() {
            self.key = None;
            self.index = 0;
            return;
        }
        self.index = index.min(rows.len() - 1);
        self.key = Some(rows[self.index].key().to_string());
    }

    /// Move by `delta` rows, clamped to the view.
    pub fn move_by<T: Record>(&mut self, rows: &[&T], delta: isize) {
        let target = self.index.saturating_add_signed(delta);
        self.select_index(rows, target);
    }

    pub fn first<T: Record>(&mut self, rows: &[&T]) {
        self.select_index(rows, 0);
    }

    pub fn last<T: Record>(&mut self, rows: &[&T]) {
        self.select_index(rows, rows.len().saturating_sub(1));
    }

    #[must_use]
    pub fn selected<'a, T: Record>(&self, rows: &[&'a T]) -> Option<&'a T> {
        rows.get(self.index).copied()
    }

    /// Adjust the scroll offset just enough to keep the cursor visible in
    /// `height` rows.
    pub fn scroll_into_view(&mut self, height: usize) -> usize {
        if height == 0 {
            return self.offset;
        }
        if self.index < self.offset {
            self.offset = self.index;
        } else if self.index >= self.offset + height {
            self.offset = self.index + 1 - height;
        }
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Job;

    fn jobs(ids: &[&str]) -> Vec<Job> {
        ids.iter()
            .map(|id| Job {
                id: (*id).to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn refs(jobs: &[Job]) -> Vec<&Job> {
        jobs.iter().collect()
    }

    #[test]
    fn test_selection_survives_reordering() {
        let before = jobs(&["1", "2", "3"]);
        let mut sel = Selection::default();
        sel.select_index(&refs(&before), 1);

        let after = jobs(&["3", "0", "1", "2"]);
        sel.resolve(&refs(&after));
        assert_eq!(sel.index(), 3);
        assert_eq!(sel.selected(&refs(&after)).map(|j| j.id.as_str()), Some("2"));
    }

    #[test]
    fn test_vanished_key_falls_back_to_clamped_index() {
        let before = jobs(&["1", "2", "3"]);
        let mut sel = Selection::default();
        sel.last(&refs(&before));

        let after = jobs(&["1", "2"]);
        sel.resolve(&refs(&after));
        assert_eq!(sel.index(), 1);
        assert_eq!(sel.selected(&refs(&after)).map(|j| j.id.as_str()), Some("2"));

        sel.resolve(&refs(&[]));
        assert_eq!(sel.index(), 0);
        assert_eq!(sel.selected(&refs(&after)).map(|j| j.id.as_str()), Some("1"));
    }

    #[test]
    fn test_move_is_clamped() {
        let rows = jobs(&["a", "b", "c"]);
        let mut sel = Selection::default();
        sel.move_by(&refs(&rows), -5);
        assert_eq!(sel.index(), 0);
        sel.move_by(&refs(&rows), 10);
        assert_eq!(sel.selected(&refs(&rows)).map(|j| j.id.as_str()), Some("c"));
        sel.move_by(&refs(&rows), -1);
        assert_eq!(sel.index(), 1);
    }

    #[test]
    fn test_scroll_offset_kept_while_visible() {
        let rows = jobs(&["1", "2", "3", "4", "5", "6"]);
        let mut sel = Selection::default();
        sel.select_index(&refs(&rows), 5);
        assert_eq!(sel.scroll_into_view(3), 3);
        sel.select_index(&refs(&rows), 4);
        assert_eq!(sel.scroll_into_view(3), 3);
        sel.select_index(&refs(&rows), 1);
        assert_eq!(sel.scroll_into_view(3), 1);
    }
}
