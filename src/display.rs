//! One-shot output for the `jobs`, `nodes` and `partitions` subcommands
//!
//! Tables are rendered with `tabled` and colored with `owo-colors`; `--json`
//! bypasses both and serializes the records directly.

use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, Width, object::Rows},
};

use crate::config::ColumnCaps;
use crate::formatting::{format_bytes, thresholds, truncate_string};
use crate::models::{Job, JobState, Node, NodeState, Partition};

const TABLE_WIDTH: usize = 200;

fn finish(table: &mut Table) -> String {
    table
        .with(Style::rounded())
        .with(Width::wrap(TABLE_WIDTH).keep_words(true))
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

/// Serialize records as pretty JSON
pub fn format_json<T: Serialize>(records: &[&T]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

fn color_job_state(state: JobState) -> String {
    let s = state.as_str();
    match state {
        JobState::Running => s.green().to_string(),
        JobState::Pending => s.yellow().to_string(),
        JobState::Completed => s.bright_black().to_string(),
        JobState::Suspended => s.cyan().to_string(),
        JobState::Failed => s.bright_red().to_string(),
        JobState::Timeout => s.magenta().to_string(),
        JobState::Cancelled => s.red().to_string(),
        JobState::Unknown => s.white().to_string(),
    }
}

fn color_node_state(state: NodeState) -> String {
    let s = state.as_str();
    if state.is_unavailable() {
        return s.bright_red().to_string();
    }
    match state {
        NodeState::Idle => s.green().to_string(),
        NodeState::Mixed => s.yellow().to_string(),
        NodeState::Allocated => s.bright_yellow().to_string(),
        _ => s.white().to_string(),
    }
}

fn color_usage(used: u32, total: u32) -> String {
    let text = format!("{}/{}", used, total);
    let pct = if total == 0 {
        0.0
    } else {
        f64::from(used) / f64::from(total) * 100.0
    };
    if pct >= thresholds::UTILIZATION_HIGH {
        text.red().to_string()
    } else if pct >= thresholds::UTILIZATION_LOW {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

/// Table row for job display
#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "JobID")]
    job_id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Partition")]
    partition: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Nodes")]
    nodes: u32,
    #[tabled(rename = "CPUs")]
    cpus: u32,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Limit")]
    limit: String,
    #[tabled(rename = "NodeList(Reason)")]
    nodelist: String,
}

pub fn format_jobs(jobs: &[&Job], caps: &ColumnCaps) -> String {
    if jobs.is_empty() {
        return "No jobs found".yellow().to_string();
    }

    let rows = jobs.iter().map(|job| JobRow {
        job_id: job.id.clone(),
        name: truncate_string(&job.name, caps.name),
        user: truncate_string(&job.user, caps.user),
        partition: truncate_string(&job.partition, caps.partition),
        state: color_job_state(job.state),
        nodes: job.node_count,
        cpus: job.cpus,
        time: job.elapsed_display(),
        limit: job.time_limit.display(),
        nodelist: truncate_string(&job.nodelist_or_reason(), caps.nodelist_reason),
    });

    let running = jobs.iter().filter(|j| j.is_running()).count();
    let pending = jobs.iter().filter(|j| j.state == JobState::Pending).count();
    format!(
        "{}\n{} jobs: {} running, {} pending",
        finish(&mut Table::new(rows)),
        jobs.len(),
        running.to_string().green(),
        pending.to_string().yellow()
    )
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory (free/total)")]
    memory: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "GPU (alloc/total)")]
    gpu: String,
    #[tabled(rename = "Partitions")]
    partitions: String,
}

pub fn format_nodes(nodes: &[&Node], caps: &ColumnCaps) -> String {
    if nodes.is_empty() {
        return "No nodes found".yellow().to_string();
    }

    let rows = nodes.iter().map(|node| NodeRow {
        node: node.hostname.clone(),
        state: color_node_state(node.state),
        cpu: color_usage(node.cpus_allocated, node.cpus_total),
        memory: format!(
            "{}/{}",
            format_bytes(node.memory_free_bytes),
            format_bytes(node.memory_total_bytes)
        ),
        load: format!("{:.2}", node.cpu_load),
        gpu: if node.gpus_total > 0 {
            color_usage(node.gpus_allocated, node.gpus_total)
        } else {
            "-".to_string()
        },
        partitions: truncate_string(&node.partitions.join(","), caps.partition),
    });

    finish(&mut Table::new(rows))
}

#[derive(Tabled)]
struct PartitionRow {
    #[tabled(rename = "Partition")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Nodes")]
    nodes: u32,
    #[tabled(rename = "TimeLimit")]
    limit: String,
    #[tabled(rename = "NodeList")]
    nodelist: String,
}

pub fn format_partitions(partitions: &[&Partition], caps: &ColumnCaps) -> String {
    if partitions.is_empty() {
        return "No partitions found".yellow().to_string();
    }

    let rows = partitions.iter().map(|p| PartitionRow {
        name: if p.is_default {
            format!("{}*", p.name)
        } else {
            p.name.clone()
        },
        state: if p.is_up() {
            p.availability.green().to_string()
        } else {
            p.availability.red().to_string()
        },
        nodes: p.node_count,
        limit: p.max_time.display(),
        nodelist: truncate_string(&p.node_list, caps.nodelist_reason),
    });

    finish(&mut Table::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeLimit;

    fn job(id: &str, state: JobState) -> Job {
        Job {
            id: id.to_string(),
            name: "a-very-long-job-name-that-needs-truncation".to_string(),
            user: "alice".to_string(),
            state,
            partition: "cpu".to_string(),
            node_list: "c[01-02]".to_string(),
            node_count: 2,
            cpus: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_format_jobs_includes_rows_and_summary() {
        let running = job("101", JobState::Running);
        let pending = job("102", JobState::Pending);
        let caps = ColumnCaps {
            name: 10,
            ..ColumnCaps::default()
        };
        let out = format_jobs(&[&running, &pending], &caps);
        assert!(out.contains("101"));
        assert!(out.contains("102"));
        assert!(out.contains("a-very-..."));
        assert!(!out.contains("needs-truncation"));
        assert!(out.contains("2 jobs"));
    }

    #[test]
    fn test_empty_tables() {
        let caps = ColumnCaps::default();
        assert!(format_jobs(&[], &caps).contains("No jobs found"));
        assert!(format_nodes(&[], &caps).contains("No nodes found"));
        assert!(format_partitions(&[], &caps).contains("No partitions found"));
    }

    #[test]
    fn test_format_nodes_shows_gpu_allocation() {
        let gpu = Node {
            hostname: "g01".to_string(),
            gpus_total: 4,
            gpus_allocated: 1,
            ..Default::default()
        };
        let cpu = Node {
            hostname: "c01".to_string(),
            ..Default::default()
        };
        let out = format_nodes(&[&gpu, &cpu], &ColumnCaps::default());
        assert!(out.contains("GPU (alloc/total)"));
        assert!(out.contains("1/4"));
    }

    #[test]
    fn test_format_partitions_marks_default() {
        let p = Partition {
            name: "cpu".to_string(),
            is_default: true,
            availability: "UP".to_string(),
            node_count: 4,
            max_time: TimeLimit::Unlimited,
            ..Default::default()
        };
        let out = format_partitions(&[&p], &ColumnCaps::default());
        assert!(out.contains("cpu*"));
        assert!(out.contains("UNLIMITED"));
    }

    #[test]
    fn test_json_output_is_an_array_of_records() {
        let j = job("7", JobState::Running);
        let out = format_json(&[&j]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["id"], "7");
        assert_eq!(value[0]["node_count"], 2);
    }
}
