//! Partitions view rendering
//!
//! One row per partition; CPU usage is summed over the member nodes of the
//! latest node snapshot.

use ratatui::prelude::*;
use ratatui::widgets::{Cell, Row, Table};

use crate::formatting::truncate_string;
use crate::models::{Node, Partition};
use crate::tui::app::App;
use crate::tui::theme::Theme;

use super::widgets::{create_progress_bar, create_table_header, render_empty, row_style, table_block};

pub fn render_partitions_view(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let list = &app.partitions;
    let rows = list.rows();

    let block = table_block("Partitions", rows.len(), list.view.snapshot.len(), theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if rows.is_empty() {
        render_empty(&list.view, "partitions", !list.view.snapshot.is_empty(), frame, inner, theme);
        return;
    }

    let header = create_table_header(&["PARTITION", "STATE", "NODES", "TIMELIMIT", "CPU USAGE", "NODELIST"], theme);

    let available_height = inner.height.saturating_sub(1) as usize;
    let selected = list.selection.index();
    let nodes = app.nodes.view.snapshot.records();
    let cap = app.config.columns.nodelist_reason;

    let table_rows: Vec<Row> = rows
        .iter()
        .enumerate()
        .skip(list.selection.offset())
        .take(available_height)
        .map(|(i, partition)| {
            partition_to_row(partition, nodes, cap, theme).style(row_style(i == selected, false, theme))
        })
        .collect();

    let widths = [
        Constraint::Length(16),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(26),
        Constraint::Min(12),
    ];

    let table = Table::new(table_rows, widths).header(header);
    frame.render_widget(table, inner);
}

fn partition_to_row<'a>(partition: &Partition, nodes: &[Node], cap: usize, theme: &Theme) -> Row<'a> {
    let name = if partition.is_default {
        format!("{}*", partition.name)
    } else {
        partition.name.clone()
    };
    let state_color = if partition.is_up() { theme.running } else { theme.failed };
    let limit = partition.max_time.display();

    let (allocated, total) = cpu_usage(&partition.name, nodes);
    let usage = if total == 0 {
        Line::from(Span::styled("-", Style::default().fg(theme.border)))
    } else {
        let pct = f64::from(allocated) / f64::from(total) * 100.0;
        Line::from(vec![
            create_progress_bar(pct, 10, theme),
            Span::raw(format!(" {}/{}", allocated, total)),
        ])
    };

    Row::new(vec![
        Cell::from(name),
        Cell::from(partition.availability.clone()).style(Style::default().fg(state_color)),
        Cell::from(partition.node_count.to_string()),
        Cell::from(limit),
        Cell::from(usage),
        Cell::from(truncate_string(&partition.node_list, cap)),
    ])
}

/// Allocated and total CPUs over the nodes that belong to `partition`
fn cpu_usage(partition: &str, nodes: &[Node]) -> (u32, u32) {
    nodes
        .iter()
        .filter(|n| n.in_partition(partition))
        .fold((0, 0), |(alloc, total), n| (alloc + n.cpus_allocated, total + n.cpus_total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_usage_sums_member_nodes() {
        let nodes = vec![
            Node {
                hostname: "c1".to_string(),
                partitions: vec!["cpu".to_string()],
                cpus_allocated: 4,
                cpus_total: 8,
                ..Default::default()
            },
            Node {
                hostname: "g1".to_string(),
                partitions: vec!["gpu".to_string(), "cpu".to_string()],
                cpus_allocated: 2,
                cpus_total: 16,
                ..Default::default()
            },
        ];
        assert_eq!(cpu_usage("cpu", &nodes), (6, 24));
        assert_eq!(cpu_usage("gpu", &nodes), (2, 16));
        assert_eq!(cpu_usage("debug", &nodes), (0, 0));
    }
}
