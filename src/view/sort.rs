//! Sort fields and comparators for each record type.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::models::{Job, Node, Partition, Record};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub fn toggle(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    #[must_use]
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Ascending => "▲",
            Self::Descending => "▼",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// A record type that knows how to compare itself by one of its fields.
pub trait Sortable: Record {
    type Field: Copy + Eq + std::fmt::Debug + Default;

    fn compare_by(&self, other: &Self, field: Self::Field) -> Ordering;
}

/// Comparator: field plus direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSpec<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F: Copy + Eq> SortSpec<F> {
    pub fn new(field: F, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Select `field`; selecting the current field again flips direction.
    pub fn select(&mut self, field: F) {
        if self.field == field {
            self.direction = self.direction.toggle();
        } else {
            self.field = field;
            self.direction = SortDirection::Ascending;
        }
    }

    /// Total order: the field in the requested direction, then the key
    /// ascending so equal rows keep a fixed position.
    pub fn compare<T>(&self, a: &T, b: &T) -> Ordering
    where
        T: Sortable<Field = F>,
    {
        self.direction
            .apply(a.compare_by(b, self.field))
            .then_with(|| natural_cmp(a.key(), b.key()))
    }
}

/// Compare strings treating runs of ASCII digits as numbers, so `c2 < c10`
/// and job `99 < 100`.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x_num = take_digits(&mut a_chars);
                let y_num = take_digits(&mut b_chars);
                let x_trim = x_num.trim_start_matches('0');
                let y_trim = y_num.trim_start_matches('0');
                let ord = x_trim
                    .len()
                    .cmp(&y_trim.len())
                    .then_with(|| x_trim.cmp(y_trim))
                    .then_with(|| x_num.len().cmp(&y_num.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> String {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

fn cmp_ci(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

macro_rules! sort_fields {
    ($name:ident { $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Next field in column order, wrapping.
            #[must_use]
            pub fn next(self) -> Self {
                let pos = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
                Self::ALL[(pos + 1) % Self::ALL.len()]
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($label $(| $alias)* => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown sort field '{}' (expected one of: {})",
                        other,
                        Self::ALL.iter().map(|f| f.as_str()).collect::<Vec<_>>().join(", ")
                    )),
                }
            }
        }
    };
}

sort_fields!(JobSortField {
    Id => "id" | "jobid",
    Name => "name",
    User => "user",
    State => "state",
    Partition => "partition" | "part",
    Nodes => "nodes",
    Cpus => "cpus",
    Elapsed => "elapsed" | "time",
    TimeLimit => "limit" | "timelimit",
});

sort_fields!(NodeSortField {
    Hostname => "hostname" | "name" | "node",
    State => "state",
    CpuUtil => "cpu" | "util",
    Memory => "memory" | "mem",
    Load => "load",
    Gpus => "gpus" | "gpu",
    GpuUtil => "gpuutil" | "gpu%",
});

sort_fields!(PartitionSortField {
    Name => "name",
    Nodes => "nodes",
    State => "state",
    TimeLimit => "limit" | "timelimit",
});

impl Sortable for Job {
    type Field = JobSortField;

    fn compare_by(&self, other: &Self, field: JobSortField) -> Ordering {
        match field {
            JobSortField::Id => natural_cmp(&self.id, &other.id),
            JobSortField::Name => cmp_ci(&self.name, &other.name),
            JobSortField::User => cmp_ci(&self.user, &other.user),
            JobSortField::State => self.state.sort_rank().cmp(&other.state.sort_rank()),
            JobSortField::Partition => cmp_ci(&self.partition, &other.partition),
            JobSortField::Nodes => self.node_count.cmp(&other.node_count),
            JobSortField::Cpus => self.cpus.cmp(&other.cpus),
            JobSortField::Elapsed => self.elapsed_seconds.cmp(&other.elapsed_seconds),
            JobSortField::TimeLimit => self.time_limit.cmp(&other.time_limit),
        }
    }
}

impl Sortable for Node {
    type Field = NodeSortField;

    fn compare_by(&self, other: &Self, field: NodeSortField) -> Ordering {
        match field {
            NodeSortField::Hostname => natural_cmp(&self.hostname, &other.hostname),
            NodeSortField::State => self.state.as_str().cmp(other.state.as_str()),
            NodeSortField::CpuUtil => self.cpu_utilization().total_cmp(&other.cpu_utilization()),
            NodeSortField::Memory => self.memory_free_bytes.cmp(&other.memory_free_bytes),
            NodeSortField::Load => self.cpu_load.total_cmp(&other.cpu_load),
            NodeSortField::Gpus => self.gpus_total.cmp(&other.gpus_total),
            NodeSortField::GpuUtil => gpu_rank(self).total_cmp(&gpu_rank(other)),
        }
    }
}

/// GPU-less nodes rank below an idle GPU node.
fn gpu_rank(node: &Node) -> f64 {
    node.gpu_utilization().unwrap_or(-1.0)
}

impl Sortable for Partition {
    type Field = PartitionSortField;

    fn compare_by(&self, other: &Self, field: PartitionSortField) -> Ordering {
        match field {
            PartitionSortField::Name => natural_cmp(&self.name, &other.name),
            PartitionSortField::Nodes => self.node_count.cmp(&other.node_count),
            PartitionSortField::State => cmp_ci(&self.availability, &other.availability),
            PartitionSortField::TimeLimit => self.max_time.cmp(&other.max_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeLimit;

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("c2", "c10"), Ordering::Less);
        assert_eq!(natural_cmp("99", "100"), Ordering::Less);
        assert_eq!(natural_cmp("123_2", "123_10"), Ordering::Less);
        assert_eq!(natural_cmp("gpu01", "gpu1"), Ordering::Greater);
        assert_eq!(natural_cmp("abc", "abc"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
    }

    #[test]
    fn test_select_toggles_direction() {
        let mut spec = SortSpec::new(JobSortField::Id, SortDirection::Ascending);
        spec.select(JobSortField::Id);
        assert_eq!(spec.direction, SortDirection::Descending);
        spec.select(JobSortField::User);
        assert_eq!(spec, SortSpec::new(JobSortField::User, SortDirection::Ascending));
    }

    #[test]
    fn test_field_parsing_and_cycle() {
        assert_eq!("JobID".parse::<JobSortField>(), Ok(JobSortField::Id));
        assert_eq!("mem".parse::<NodeSortField>(), Ok(NodeSortField::Memory));
        assert!("bogus".parse::<PartitionSortField>().is_err());
        assert_eq!(JobSortField::TimeLimit.next(), JobSortField::Id);
    }

    #[test]
    fn test_unknown_limit_sorts_after_unlimited() {
        let job = |id: &str, limit| Job {
            id: id.to_string(),
            time_limit: limit,
            ..Default::default()
        };
        let garbage = job("1", TimeLimit::Unknown);
        let unlimited = job("2", TimeLimit::Unlimited);
        let short = job("3", TimeLimit::Limited(60));
        let spec = SortSpec::new(JobSortField::TimeLimit, SortDirection::Ascending);
        let mut rows = vec![&garbage, &unlimited, &short];
        rows.sort_by(|a, b| spec.compare(*a, *b));
        let ids: Vec<&str> = rows.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[test]
    fn test_gpu_util_ranks_gpu_less_nodes_first() {
        let node = |name: &str, total, allocated| Node {
            hostname: name.to_string(),
            gpus_total: total,
            gpus_allocated: allocated,
            ..Default::default()
        };
        let busy = node("g1", 4, 4);
        let idle = node("g2", 4, 0);
        let cpu = node("c1", 0, 0);
        let spec = SortSpec::new(NodeSortField::GpuUtil, SortDirection::Ascending);
        let mut rows = vec![&busy, &cpu, &idle];
        rows.sort_by(|a, b| spec.compare(*a, *b));
        let names: Vec<&str> = rows.iter().map(|n| n.hostname.as_str()).collect();
        assert_eq!(names, vec!["c1", "g2", "g1"]);
        assert_eq!("gpu%".parse::<NodeSortField>(), Ok(NodeSortField::GpuUtil));
    }
}
