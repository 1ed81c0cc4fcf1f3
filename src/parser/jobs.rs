//! squeue output to [`Job`] records.

use tracing::debug;

use super::layout::{Column, ColumnLayout, Row};
use super::units::{parse_count, parse_duration_secs, parse_time_limit};
use super::{ParseError, Parsed, data_lines};
use crate::models::{Job, JobState, TimeLimit};

/// Header labels squeue prints for the id column when `--noheader` is absent.
const HEADER_LABELS: &[&str] = &["JOBID", "JOB_ID", "JOBID_RAW"];

/// Parse squeue output produced with `layout`'s format string.
///
/// Lines without a job id are reported as malformed and skipped.
#[must_use]
pub fn parse_jobs(text: &str, layout: &ColumnLayout) -> Parsed<Job> {
    let mut parsed = Parsed::default();

    for (line_no, line) in data_lines(text) {
        let row = layout.split(line);
        let id = row.get(Column::JobId);

        if HEADER_LABELS.contains(&id) {
            continue;
        }
        if id.is_empty() {
            debug!(line = line_no, "dropping job line without id");
            parsed.malformed.push(ParseError::MalformedRecord {
                line: line_no,
                raw: line.to_string(),
            });
            continue;
        }

        parsed.records.push(job_from_row(id, &row));
    }

    parsed
}

fn job_from_row(id: &str, row: &Row<'_>) -> Job {
    let reason_or_nodes = row.get(Column::ReasonOrNodes);
    let reason = reason_or_nodes
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .filter(|r| !r.eq_ignore_ascii_case("None") && !r.eq_ignore_ascii_case("null"))
        .unwrap_or_default();

    let mut node_list = row.get(Column::NodeList).to_string();
    if node_list.is_empty() && !reason_or_nodes.starts_with('(') {
        node_list = reason_or_nodes.to_string();
    }

    Job {
        id: id.to_string(),
        name: row.get(Column::JobName).to_string(),
        user: row.get(Column::User).to_string(),
        state: JobState::from_token(row.get(Column::JobState)),
        partition: row.get(Column::Partition).to_string(),
        node_list,
        node_count: parse_count(row.get(Column::NodeCount)),
        cpus: parse_count(row.get(Column::Cpus)),
        elapsed_seconds: parse_duration_secs(row.get(Column::Elapsed)).unwrap_or(0),
        time_limit: parse_time_limit(row.get(Column::TimeLimit)),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    const SAMPLE: &str = "\
101|train|alice|RUNNING|gpu|2|16|1-02:03:04|2-00:00:00|c[01-02]|c[01-02]
102|prep|bob|PENDING|cpu|1|4|0:00|UNLIMITED|(Resources)|
103|odd|carol|BOOT_FAIL2|debug|1|1|0:05|30:00|(None)|c07
";

    #[test]
    fn test_mixed_states_end_to_end() {
        let parsed = parse_jobs(SAMPLE, &ColumnLayout::default_jobs());
        assert_eq!(parsed.records.len(), 3);
        assert!(parsed.malformed.is_empty());

        let running = &parsed.records[0];
        assert_eq!(running.state, JobState::Running);
        assert_eq!(running.elapsed_seconds, 93_784);
        assert_eq!(running.time_limit, TimeLimit::Limited(2 * 86_400));
        assert_eq!(running.node_list, "c[01-02]");
        assert_eq!(running.reason, "");

        let pending = &parsed.records[1];
        assert_eq!(pending.state, JobState::Pending);
        assert_eq!(pending.reason, "Resources");
        assert_eq!(pending.node_list, "");
        assert_eq!(pending.time_limit, TimeLimit::Unlimited);

        let odd = &parsed.records[2];
        assert_eq!(odd.state, JobState::Unknown);
        assert_eq!(odd.id, "103");
        assert_eq!(odd.name, "odd");
        assert_eq!(odd.user, "carol");
        assert_eq!(odd.partition, "debug");
        assert_eq!(odd.node_count, 1);
        assert_eq!(odd.cpus, 1);
        assert_eq!(odd.elapsed_seconds, 5);
        assert_eq!(odd.time_limit, TimeLimit::Limited(1800));
        assert_eq!(odd.node_list, "c07");
        assert_eq!(odd.reason, "");
    }

    #[test]
    fn test_one_malformed_line_is_dropped() {
        let text = format!("{SAMPLE}|nameless|dave|RUNNING|cpu|1|1|0:01|1:00|c1|c1\n");
        let parsed = parse_jobs(&text, &ColumnLayout::default_jobs());
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.malformed.len(), 1);
        assert!(matches!(
            parsed.malformed[0],
            ParseError::MalformedRecord { line: 4, .. }
        ));
        assert!(!parsed.all_malformed());
    }

    #[test]
    fn test_header_and_blank_lines_skipped() {
        let text = "JOBID|NAME|USER|STATE|PARTITION|NODES|CPUS|TIME|TIME_LIMIT|NODELIST(REASON)|NODELIST\n\n42|x|u|R|p|1|1|0:01|1:00|n1|n1\n\n";
        let parsed = parse_jobs(text, &ColumnLayout::default_jobs());
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.malformed.is_empty());
    }

    #[test]
    fn test_missing_optional_columns_default() {
        let parsed = parse_jobs("77|short\n", &ColumnLayout::default_jobs());
        let job = &parsed.records[0];
        assert_eq!(job.name, "short");
        assert_eq!(job.state, JobState::Unknown);
        assert_eq!(job.cpus, 0);
        assert_eq!(job.time_limit, TimeLimit::Unknown);
    }

    #[test]
    fn test_unparsable_numerics_degrade() {
        let parsed = parse_jobs(
            "5|n|u|RUNNING|p|two|many|soon|later|n1|n1\n",
            &ColumnLayout::default_jobs(),
        );
        let job = &parsed.records[0];
        assert_eq!(job.node_count, 0);
        assert_eq!(job.cpus, 0);
        assert_eq!(job.elapsed_seconds, 0);
        assert_eq!(job.time_limit, TimeLimit::Unknown);
    }

    #[test]
    fn test_custom_layout_order() {
        let layout = ColumnLayout::from_format(EntityKind::Jobs, "%u|%i|%T").unwrap();
        let parsed = parse_jobs("alice|9|PD\n", &layout);
        assert_eq!(parsed.records[0].id, "9");
        assert_eq!(parsed.records[0].user, "alice");
        assert_eq!(parsed.records[0].state, JobState::Pending);
    }
}
