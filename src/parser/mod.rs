//! Record parsers for Slurm query output.
//!
//! Every parser here is a pure function from raw command output to typed
//! records. Per-line defects are collected next to the records instead of
//! aborting the parse, so one bad row never hides the rest of the cluster.

pub mod hostlist;
mod jobs;
pub mod layout;
mod nodes;
mod partitions;
pub mod units;

use thiserror::Error;

pub use jobs::parse_jobs;
pub use layout::ColumnLayout;
pub use nodes::{apply_gpu_allocation, parse_gpu_allocation, parse_nodes};
pub use partitions::parse_partitions;

/// Errors produced while turning text into records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A data line without its key field. The line is dropped.
    #[error("malformed record on line {line}: {raw:?}")]
    MalformedRecord { line: usize, raw: String },

    /// A format string that cannot drive a parser.
    #[error("invalid column layout {format:?}: {reason}")]
    InvalidLayout { format: String, reason: String },
}

/// Result of parsing one command output.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub malformed: Vec<ParseError>,
}

impl<T> Parsed<T> {
    /// True when there was data but every line of it was rejected.
    #[must_use]
    pub fn all_malformed(&self) -> bool {
        self.records.is_empty() && !self.malformed.is_empty()
    }
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            malformed: Vec::new(),
        }
    }
}

/// Ordered `Key=Value` pairs from `scontrol show ...` output.
pub type DetailFields = Vec<(String, String)>;

/// Parse whitespace-separated `Key=Value` tokens, preserving order.
///
/// Tokens without `=` are continuation words of the previous value, which
/// happens for fields like `Reason=Not responding [slurm@...]`.
#[must_use]
pub fn parse_key_values(text: &str) -> DetailFields {
    let mut fields: DetailFields = Vec::new();
    for token in text.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                fields.push((key.to_string(), value.to_string()));
            }
            _ => {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(token);
                }
            }
        }
    }
    fields
}

/// Look up a key in parsed detail fields.
#[must_use]
pub fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Iterate over data lines with 1-based line numbers, skipping blank lines.
pub(crate) fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_values_preserves_order() {
        let fields = parse_key_values("JobId=42 JobName=train\n   UserId=alice(1000) GroupId=lab");
        let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["JobId", "JobName", "UserId", "GroupId"]);
        assert_eq!(field(&fields, "UserId"), Some("alice(1000)"));
    }

    #[test]
    fn test_parse_key_values_continuation_words() {
        let fields = parse_key_values("NodeName=c1 Reason=Not responding [root@2024] State=DOWN");
        assert_eq!(field(&fields, "Reason"), Some("Not responding [root@2024]"));
        assert_eq!(field(&fields, "State"), Some("DOWN"));
    }

    #[test]
    fn test_parse_key_values_keeps_equals_in_value() {
        let fields = parse_key_values("AllocTRES=cpu=64,mem=256G");
        assert_eq!(field(&fields, "AllocTRES"), Some("cpu=64,mem=256G"));
    }

    #[test]
    fn test_data_lines_skip_blank() {
        let lines: Vec<(usize, &str)> = data_lines("a\n\n  \nb\n").collect();
        assert_eq!(lines, vec![(1, "a"), (4, "b")]);
    }
}
