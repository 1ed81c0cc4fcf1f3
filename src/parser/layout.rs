//! Column layouts derived from Slurm `-o` format strings.
//!
//! The same format string is handed to the query command and used to build
//! the layout, so the parser always knows which column holds which field.

use super::ParseError;
use crate::models::EntityKind;

/// Default job query format.
pub const DEFAULT_JOBS_FORMAT: &str = "%i|%j|%u|%T|%P|%D|%C|%M|%l|%R|%N";

/// Default node query format (used with `sinfo -N`).
pub const DEFAULT_NODES_FORMAT: &str = "%n|%T|%P|%c|%C|%m|%e|%O|%G";

const DELIMITER: char = '|';

/// A typed column in query output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    // squeue
    JobId,
    JobName,
    User,
    JobState,
    Partition,
    NodeCount,
    Cpus,
    Elapsed,
    TimeLimit,
    /// `%R`: nodelist for running jobs, `(Reason)` for pending ones.
    ReasonOrNodes,
    NodeList,

    // sinfo -N
    Hostname,
    NodeState,
    NodePartition,
    CpusTotal,
    /// `%C`: allocated/idle/other/total.
    CpuCounts,
    MemoryTotal,
    MemoryFree,
    CpuLoad,
    Gres,

    /// Any specifier the parser does not consume.
    Ignored,
}

impl Column {
    fn for_job_specifier(spec: char) -> Self {
        match spec {
            'i' | 'A' => Self::JobId,
            'j' => Self::JobName,
            'u' => Self::User,
            'T' | 't' => Self::JobState,
            'P' => Self::Partition,
            'D' => Self::NodeCount,
            'C' => Self::Cpus,
            'M' => Self::Elapsed,
            'l' => Self::TimeLimit,
            'R' => Self::ReasonOrNodes,
            'N' => Self::NodeList,
            _ => Self::Ignored,
        }
    }

    fn for_node_specifier(spec: char) -> Self {
        match spec {
            'n' | 'N' => Self::Hostname,
            'T' | 't' => Self::NodeState,
            'P' | 'R' => Self::NodePartition,
            'c' => Self::CpusTotal,
            'C' => Self::CpuCounts,
            'm' => Self::MemoryTotal,
            'e' => Self::MemoryFree,
            'O' => Self::CpuLoad,
            'G' => Self::Gres,
            _ => Self::Ignored,
        }
    }
}

/// Delimiter plus ordered typed columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub delimiter: char,
    pub columns: Vec<Column>,
    format: String,
}

impl ColumnLayout {
    /// Build a layout from a `|`-delimited Slurm format string.
    ///
    /// Width and justification modifiers (`%.18i`, `%-20j`) are accepted and
    /// ignored. The layout must contain the entity's key column.
    pub fn from_format(kind: EntityKind, format: &str) -> Result<Self, ParseError> {
        let invalid = |reason: &str| ParseError::InvalidLayout {
            format: format.to_string(),
            reason: reason.to_string(),
        };

        let key = match kind {
            EntityKind::Jobs => Column::JobId,
            EntityKind::Nodes => Column::Hostname,
            EntityKind::Partitions => {
                return Err(invalid("partitions are parsed from key=value output"));
            }
        };

        let mut columns = Vec::new();
        for token in format.split(DELIMITER) {
            let spec = token
                .trim()
                .strip_prefix('%')
                .and_then(|rest| rest.trim_start_matches(['.', '-']).chars().find(|c| !c.is_ascii_digit()))
                .ok_or_else(|| invalid(&format!("field {token:?} is not a % specifier")))?;
            columns.push(match kind {
                EntityKind::Jobs => Column::for_job_specifier(spec),
                _ => Column::for_node_specifier(spec),
            });
        }

        if !columns.contains(&key) {
            return Err(invalid("missing the identifier column"));
        }

        Ok(Self {
            delimiter: DELIMITER,
            columns,
            format: format.to_string(),
        })
    }

    /// Layout for the built-in job query.
    #[must_use]
    pub fn default_jobs() -> Self {
        Self::builtin(
            DEFAULT_JOBS_FORMAT,
            vec![
                Column::JobId,
                Column::JobName,
                Column::User,
                Column::JobState,
                Column::Partition,
                Column::NodeCount,
                Column::Cpus,
                Column::Elapsed,
                Column::TimeLimit,
                Column::ReasonOrNodes,
                Column::NodeList,
            ],
        )
    }

    /// Layout for the built-in node query.
    #[must_use]
    pub fn default_nodes() -> Self {
        Self::builtin(
            DEFAULT_NODES_FORMAT,
            vec![
                Column::Hostname,
                Column::NodeState,
                Column::NodePartition,
                Column::CpusTotal,
                Column::CpuCounts,
                Column::MemoryTotal,
                Column::MemoryFree,
                Column::CpuLoad,
                Column::Gres,
            ],
        )
    }

    fn builtin(format: &str, columns: Vec<Column>) -> Self {
        Self {
            delimiter: DELIMITER,
            columns,
            format: format.to_string(),
        }
    }

    /// The format string to pass to `-o`.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    #[must_use]
    pub fn position(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Split a data line into a column accessor.
    pub(crate) fn split<'a>(&'a self, line: &'a str) -> Row<'a> {
        Row {
            layout: self,
            fields: line.split(self.delimiter).map(str::trim).collect(),
        }
    }
}

/// One split data line.
pub(crate) struct Row<'a> {
    layout: &'a ColumnLayout,
    fields: Vec<&'a str>,
}

impl<'a> Row<'a> {
    /// Field for a column, empty when the column is absent or the line short.
    pub(crate) fn get(&self, column: Column) -> &'a str {
        self.layout
            .position(column)
            .and_then(|idx| self.fields.get(idx).copied())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layouts_match_format_strings() {
        assert_eq!(
            ColumnLayout::from_format(EntityKind::Jobs, DEFAULT_JOBS_FORMAT).unwrap(),
            ColumnLayout::default_jobs()
        );
        assert_eq!(
            ColumnLayout::from_format(EntityKind::Nodes, DEFAULT_NODES_FORMAT).unwrap(),
            ColumnLayout::default_nodes()
        );
    }

    #[test]
    fn test_width_modifiers_and_unknown_specifiers() {
        let layout = ColumnLayout::from_format(EntityKind::Jobs, "%.18i|%-20j|%V").unwrap();
        assert_eq!(
            layout.columns,
            vec![Column::JobId, Column::JobName, Column::Ignored]
        );
    }

    #[test]
    fn test_layout_requires_key_column() {
        let err = ColumnLayout::from_format(EntityKind::Nodes, "%T|%P").unwrap_err();
        assert!(matches!(err, ParseError::InvalidLayout { .. }));
    }

    #[test]
    fn test_layout_rejects_literal_fields() {
        assert!(ColumnLayout::from_format(EntityKind::Jobs, "%i|name").is_err());
    }

    #[test]
    fn test_row_short_line_defaults_empty() {
        let layout = ColumnLayout::default_jobs();
        let row = layout.split("42|train");
        assert_eq!(row.get(Column::JobId), "42");
        assert_eq!(row.get(Column::NodeList), "");
    }
}
