//! `scontrol show partition --oneliner` output to [`Partition`] records.

use tracing::debug;

use super::units::{parse_count, parse_time_limit};
use super::{ParseError, Parsed, data_lines, field, parse_key_values};
use crate::models::{Partition, TimeLimit};

/// Parse one partition per line of `Key=Value` tokens.
///
/// A line without `PartitionName=` is malformed.
#[must_use]
pub fn parse_partitions(text: &str) -> Parsed<Partition> {
    let mut parsed = Parsed::default();

    for (line_no, line) in data_lines(text) {
        let fields = parse_key_values(line);
        let Some(name) = field(&fields, "PartitionName").filter(|n| !n.is_empty()) else {
            debug!(line = line_no, "dropping partition line without name");
            parsed.malformed.push(ParseError::MalformedRecord {
                line: line_no,
                raw: line.to_string(),
            });
            continue;
        };

        let node_list = field(&fields, "Nodes")
            .filter(|n| *n != "(null)")
            .unwrap_or_default();

        parsed.records.push(Partition {
            name: name.to_string(),
            node_count: parse_count(field(&fields, "TotalNodes").unwrap_or_default()),
            node_list: node_list.to_string(),
            is_default: field(&fields, "Default").is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            availability: field(&fields, "State").unwrap_or_default().to_string(),
            max_time: field(&fields, "MaxTime").map_or(TimeLimit::Unknown, parse_time_limit),
        });
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
PartitionName=cpu AllowGroups=ALL Default=YES MaxTime=2-00:00:00 Nodes=c[01-10] State=UP TotalCPUs=80 TotalNodes=10
PartitionName=gpu AllowGroups=ALL Default=NO MaxTime=UNLIMITED Nodes=g[01-02] State=DOWN TotalNodes=2

PartitionName=empty Default=NO Nodes=(null) State=INACTIVE TotalNodes=0
";

    #[test]
    fn test_parse_partitions() {
        let parsed = parse_partitions(SAMPLE);
        assert_eq!(parsed.records.len(), 3);

        let cpu = &parsed.records[0];
        assert_eq!(cpu.name, "cpu");
        assert!(cpu.is_default);
        assert!(cpu.is_up());
        assert_eq!(cpu.node_count, 10);
        assert_eq!(cpu.node_list, "c[01-10]");
        assert_eq!(cpu.max_time, TimeLimit::Limited(2 * 86_400));

        let gpu = &parsed.records[1];
        assert!(!gpu.is_default);
        assert_eq!(gpu.availability, "DOWN");
        assert_eq!(gpu.max_time, TimeLimit::Unlimited);

        assert_eq!(parsed.records[2].node_list, "");
        assert_eq!(parsed.records[2].max_time, TimeLimit::Unknown);
    }

    #[test]
    fn test_partition_line_without_name() {
        let parsed = parse_partitions("Default=NO State=UP\n");
        assert!(parsed.records.is_empty());
        assert!(parsed.all_malformed());
    }
}
