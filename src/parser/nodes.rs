//! `sinfo -N` output to [`Node`] records, plus GPU allocation from
//! `scontrol show nodes`.

use std::collections::HashMap;

use tracing::debug;

use super::layout::{Column, ColumnLayout, Row};
use super::units::{parse_count, parse_cpu_counts, parse_gpu_count, parse_load, parse_memory_bytes};
use super::{ParseError, Parsed, data_lines};
use crate::models::{Node, NodeState};

const HEADER_LABELS: &[&str] = &["HOSTNAMES", "NODELIST", "NODE_NAME", "HOSTNAME"];

/// Parse node-oriented sinfo output.
///
/// sinfo prints one row per (node, partition) pair. Rows for the same
/// hostname are merged into one record that keeps the first row's fields and
/// accumulates the partitions, in first-seen order.
#[must_use]
pub fn parse_nodes(text: &str, layout: &ColumnLayout) -> Parsed<Node> {
    let mut parsed: Parsed<Node> = Parsed::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (line_no, line) in data_lines(text) {
        let row = layout.split(line);
        let hostname = row.get(Column::Hostname);

        if HEADER_LABELS.contains(&hostname) {
            continue;
        }
        if hostname.is_empty() {
            debug!(line = line_no, "dropping node line without hostname");
            parsed.malformed.push(ParseError::MalformedRecord {
                line: line_no,
                raw: line.to_string(),
            });
            continue;
        }

        let partition = row.get(Column::NodePartition).trim_end_matches('*');

        match index.get(hostname) {
            Some(&idx) => {
                let node = &mut parsed.records[idx];
                if !partition.is_empty() && !node.partitions.iter().any(|p| p == partition) {
                    node.partitions.push(partition.to_string());
                }
            }
            None => {
                index.insert(hostname.to_string(), parsed.records.len());
                parsed.records.push(node_from_row(hostname, partition, &row));
            }
        }
    }

    parsed
}

fn node_from_row(hostname: &str, partition: &str, row: &Row<'_>) -> Node {
    let (cpus_allocated, counted_total) = parse_cpu_counts(row.get(Column::CpuCounts))
        .map_or((0, None), |(alloc, total)| (alloc, Some(total)));
    let cpus_total = counted_total.unwrap_or_else(|| parse_count(row.get(Column::CpusTotal)));

    Node {
        hostname: hostname.to_string(),
        state: NodeState::from_token(row.get(Column::NodeState)),
        partitions: if partition.is_empty() {
            Vec::new()
        } else {
            vec![partition.to_string()]
        },
        cpus_total,
        cpus_allocated,
        memory_total_bytes: parse_memory_bytes(row.get(Column::MemoryTotal)).unwrap_or(0),
        memory_free_bytes: parse_memory_bytes(row.get(Column::MemoryFree)).unwrap_or(0),
        cpu_load: parse_load(row.get(Column::CpuLoad)),
        gpus_total: parse_gpu_count(row.get(Column::Gres)),
        gpus_allocated: 0,
    }
}

/// Allocated GPUs per node from `scontrol show nodes` output.
///
/// `AllocTRES=...,gres/gpu=N` is authoritative. `GresUsed=gpu:...:N(...)`
/// only counts for a node whose `AllocTRES` carried no GPU entry.
#[must_use]
pub fn parse_gpu_allocation(text: &str) -> HashMap<String, u32> {
    let mut from_tres: HashMap<String, u32> = HashMap::new();
    let mut from_gres: HashMap<String, u32> = HashMap::new();
    let mut node: Option<&str> = None;

    for token in text.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match (key, node) {
            ("NodeName", _) => node = Some(value).filter(|v| !v.is_empty()),
            ("AllocTRES", Some(name)) => {
                if let Some(count) = tres_gpu_count(value) {
                    from_tres.insert(name.to_string(), count);
                }
            }
            ("GresUsed", Some(name)) => {
                from_gres.insert(name.to_string(), parse_gpu_count(value));
            }
            _ => {}
        }
    }

    for (name, count) in from_gres {
        from_tres.entry(name).or_insert(count);
    }
    from_tres
}

/// The aggregate `gres/gpu=N` entry; typed entries like `gres/gpu:a100=N`
/// are breakdowns of it.
fn tres_gpu_count(tres: &str) -> Option<u32> {
    tres.split(',')
        .filter_map(|item| item.split_once('='))
        .find(|(key, _)| *key == "gres/gpu")
        .and_then(|(_, count)| count.parse().ok())
}

/// Copy allocation counts onto GPU nodes. Nodes without GPUs stay at zero.
pub fn apply_gpu_allocation(nodes: &mut [Node], allocated: &HashMap<String, u32>) {
    for node in nodes.iter_mut().filter(|n| n.gpus_total > 0) {
        node.gpus_allocated = allocated.get(&node.hostname).copied().unwrap_or(0);
    }
}
