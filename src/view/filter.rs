//! Filter predicates
//!
//! Filter text supports:
//! - Plain text: matches against the type's searchable fields
//! - Field prefix: `field:value` for a specific field (`user:john`, `state:r`)
//! - Negation with a `!` prefix
//! - Multiple terms separated by spaces, all of which must match

use crate::models::{Job, Node, Partition};
use crate::parser::hostlist;

/// A record type that can be matched against filter terms.
///
/// `value` and `term` arrive lowercased.
pub trait Filterable {
    fn matches_field(&self, field: &str, value: &str) -> bool;

    fn matches_text(&self, term: &str) -> bool;

    /// Owning user, for the "only mine" restriction. Records without an
    /// owner are never excluded by it.
    fn owner(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    negated: bool,
    field: Option<String>,
    value: String,
}

/// Parsed filter text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    raw: String,
    terms: Vec<Term>,
}

impl Filter {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let terms = text
            .split_whitespace()
            .filter_map(|term| {
                let (negated, term) = match term.strip_prefix('!') {
                    Some(stripped) => (true, stripped),
                    None => (false, term),
                };
                let term = term.to_lowercase();
                let (field, value) = match term.split_once(':') {
                    Some((field, value)) => (Some(field.to_string()), value.to_string()),
                    None => (None, term),
                };
                // A bare `!` or `field:` filters nothing.
                if value.is_empty() {
                    return None;
                }
                Some(Term { negated, field, value })
            })
            .collect();

        Self {
            raw: text.to_string(),
            terms,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches<T: Filterable>(&self, record: &T) -> bool {
        self.terms.iter().all(|term| {
            let matched = match &term.field {
                Some(field) => record.matches_field(field, &term.value),
                None => record.matches_text(&term.value),
            };
            matched != term.negated
        })
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Match a hostlist expression either as written or host by host, so
/// `g01` finds `g[01-02]`.
fn hostlist_matches(expr: &str, needle: &str) -> bool {
    contains_ci(expr, needle) || hostlist::expand(expr).iter().any(|host| contains_ci(host, needle))
}

impl Filterable for Job {
    fn matches_field(&self, field: &str, value: &str) -> bool {
        match field {
            "name" | "n" => contains_ci(&self.name, value),
            "user" | "u" => contains_ci(&self.user, value),
            "partition" | "part" | "p" => contains_ci(&self.partition, value),
            "state" | "s" => {
                contains_ci(self.state.as_str(), value) || self.state.short_str().eq_ignore_ascii_case(value)
            }
            "node" | "nodes" => hostlist_matches(&self.node_list, value),
            "id" | "job" | "jobid" => self.id.contains(value),
            "reason" | "r" => contains_ci(&self.reason, value),
            _ => false,
        }
    }

    fn matches_text(&self, term: &str) -> bool {
        contains_ci(&self.name, term)
            || contains_ci(&self.user, term)
            || contains_ci(&self.partition, term)
            || self.id.contains(term)
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.user)
    }
}

impl Filterable for Node {
    fn matches_field(&self, field: &str, value: &str) -> bool {
        match field {
            "name" | "node" | "host" | "n" => contains_ci(&self.hostname, value),
            "state" | "s" => contains_ci(self.state.as_str(), value),
            "partition" | "part" | "p" => self.partitions.iter().any(|p| contains_ci(p, value)),
            "gpu" | "gpus" | "g" => match value {
                "yes" | "true" | "any" => self.gpus_total > 0,
                "no" | "false" | "none" => self.gpus_total == 0,
                "free" | "idle" => self.gpus_allocated < self.gpus_total,
                _ => value.parse::<u32>().is_ok_and(|count| self.gpus_total == count),
            },
            _ => false,
        }
    }

    fn matches_text(&self, term: &str) -> bool {
        contains_ci(&self.hostname, term)
            || contains_ci(self.state.as_str(), term)
            || self.partitions.iter().any(|p| contains_ci(p, term))
    }
}

impl Filterable for Partition {
    fn matches_field(&self, field: &str, value: &str) -> bool {
        match field {
            "name" | "n" => contains_ci(&self.name, value),
            "state" | "s" => contains_ci(&self.availability, value),
            "node" | "nodes" => hostlist_matches(&self.node_list, value),
            _ => false,
        }
    }

    fn matches_text(&self, term: &str) -> bool {
        contains_ci(&self.name, term) || contains_ci(&self.node_list, term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobState, NodeState, TimeLimit};

    fn make_test_job() -> Job {
        Job {
            id: "12345".to_string(),
            name: "train_model".to_string(),
            user: "alice".to_string(),
            state: JobState::Running,
            partition: "gpu".to_string(),
            node_list: "g[01-02]".to_string(),
            node_count: 2,
            cpus: 16,
            elapsed_seconds: 600,
            time_limit: TimeLimit::Limited(3600),
            reason: String::new(),
        }
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let job = make_test_job();
        assert!(Filter::parse("").matches(&job));
        assert!(Filter::parse("   ").is_empty());
    }

    #[test]
    fn test_plain_text_filter() {
        let job = make_test_job();
        assert!(Filter::parse("TRAIN").matches(&job));
        assert!(Filter::parse("123").matches(&job));
        assert!(!Filter::parse("nonexistent").matches(&job));
    }

    #[test]
    fn test_field_filter() {
        let job = make_test_job();
        assert!(Filter::parse("user:alice").matches(&job));
        assert!(Filter::parse("state:r").matches(&job));
        assert!(Filter::parse("node:g01").matches(&job));
        assert!(!Filter::parse("partition:cpu").matches(&job));
        assert!(!Filter::parse("bogus:x").matches(&job));
    }

    #[test]
    fn test_negation_and_combination() {
        let job = make_test_job();
        assert!(!Filter::parse("!partition:gpu").matches(&job));
        assert!(Filter::parse("!partition:cpu user:alice").matches(&job));
        assert!(!Filter::parse("user:alice partition:cpu").matches(&job));
    }

    #[test]
    fn test_node_field_expands_hostlist() {
        let job = make_test_job();
        assert!(Filter::parse("node:g02").matches(&job));
        assert!(!Filter::parse("node:g03").matches(&job));
        assert!(Filter::parse("!node:g03").matches(&job));

        let partition = Partition {
            name: "gpu".to_string(),
            node_list: "g[01-04],h7".to_string(),
            ..Default::default()
        };
        assert!(Filter::parse("node:g03").matches(&partition));
        assert!(Filter::parse("node:h7").matches(&partition));
        assert!(!Filter::parse("node:g05").matches(&partition));
    }

    #[test]
    fn test_node_filter() {
        let node = Node {
            hostname: "g01".to_string(),
            state: NodeState::Mixed,
            partitions: vec!["gpu".to_string(), "debug".to_string()],
            gpus_total: 4,
            ..Default::default()
        };
        assert!(Filter::parse("partition:debug").matches(&node));
        assert!(Filter::parse("gpu:4").matches(&node));
        assert!(Filter::parse("mixed").matches(&node));
        assert!(!Filter::parse("gpu:no").matches(&node));
        assert!(Filter::parse("gpu:free").matches(&node));
        let full = Node {
            gpus_allocated: 4,
            ..node
        };
        assert!(!Filter::parse("gpu:free").matches(&full));
    }
}
