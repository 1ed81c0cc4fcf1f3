//! Wall-clock limits of jobs and partitions.

use std::cmp::Ordering;

use serde::Serialize;

use crate::formatting::format_duration_hms;

/// A time limit as Slurm reports it.
///
/// `Unlimited` is an explicit `UNLIMITED`/`INFINITE`. `Unknown` covers a
/// missing column and anything that does not parse, so garbage never reads
/// as "no limit".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeLimit {
    Limited(u64),
    Unlimited,
    #[default]
    Unknown,
}

impl TimeLimit {
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Limited(secs) => format_duration_hms(*secs),
            Self::Unlimited => "UNLIMITED".to_string(),
            Self::Unknown => "-".to_string(),
        }
    }

    fn rank(&self) -> (u8, u64) {
        match self {
            Self::Limited(secs) => (0, *secs),
            Self::Unlimited => (1, 0),
            Self::Unknown => (2, 0),
        }
    }
}

/// Finite limits ascending, then unlimited, then unknown.
impl Ord for TimeLimit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for TimeLimit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let mut limits = vec![
            TimeLimit::Unknown,
            TimeLimit::Unlimited,
            TimeLimit::Limited(600),
            TimeLimit::Limited(60),
        ];
        limits.sort();
        assert_eq!(
            limits,
            vec![
                TimeLimit::Limited(60),
                TimeLimit::Limited(600),
                TimeLimit::Unlimited,
                TimeLimit::Unknown,
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(TimeLimit::Limited(3600).display(), "01:00:00");
        assert_eq!(TimeLimit::Unlimited.display(), "UNLIMITED");
        assert_eq!(TimeLimit::Unknown.display(), "-");
    }
}
