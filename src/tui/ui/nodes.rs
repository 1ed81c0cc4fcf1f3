//! Nodes view rendering
//!
//! A sortable node table with a footer describing the selected node.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::formatting::{format_bytes, truncate_string};
use crate::models::Node;
use crate::tui::app::App;
use crate::tui::theme::Theme;

use super::widgets::{create_progress_bar, create_table_header, render_empty, row_style, table_block};

const BAR_WIDTH: usize = 10;
const GPU_BAR_WIDTH: usize = 6;

pub fn render_nodes_view(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let list = &app.nodes;
    let rows = list.rows();

    let block = table_block("Nodes", rows.len(), list.view.snapshot.len(), theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if rows.is_empty() {
        render_empty(&list.view, "nodes", !list.view.snapshot.is_empty(), frame, inner, theme);
        return;
    }

    let chunks = Layout::vertical([
        Constraint::Min(3),    // Node table
        Constraint::Length(3), // Selected node footer
    ])
    .split(inner);

    let header = create_table_header(
        &["HOSTNAME", "STATE", "CPU (alloc/total)", "MEMORY (free/total)", "LOAD", "GPU (alloc/total)", "PARTITIONS"],
        theme,
    );

    let available_height = chunks[0].height.saturating_sub(1) as usize;
    let selected = list.selection.index();
    let partition_cap = app.config.columns.partition;

    let table_rows: Vec<Row> = rows
        .iter()
        .enumerate()
        .skip(list.selection.offset())
        .take(available_height)
        .map(|(i, node)| node_to_row(node, partition_cap, theme).style(row_style(i == selected, false, theme)))
        .collect();

    let widths = [
        Constraint::Length(16),
        Constraint::Length(10),
        Constraint::Length(24),
        Constraint::Length(20),
        Constraint::Length(7),
        Constraint::Length(18),
        Constraint::Min(10),
    ];

    let table = Table::new(table_rows, widths).header(header);
    frame.render_widget(table, chunks[0]);

    render_node_footer(list.selected(), frame, chunks[1], theme);
}

fn node_to_row<'a>(node: &Node, partition_cap: usize, theme: &Theme) -> Row<'a> {
    let util = node.cpu_utilization();
    let cpu_cell = Line::from(vec![
        create_progress_bar(util, BAR_WIDTH, theme),
        Span::raw(format!(" {}/{}", node.cpus_allocated, node.cpus_total)),
    ]);

    let memory = format!(
        "{}/{}",
        format_bytes(node.memory_free_bytes),
        format_bytes(node.memory_total_bytes)
    );

    Row::new(vec![
        Cell::from(node.hostname.clone()),
        Cell::from(node.state.as_str()).style(Style::default().fg(theme.node_state_color(node.state))),
        Cell::from(cpu_cell),
        Cell::from(memory),
        Cell::from(format!("{:.2}", node.cpu_load)),
        Cell::from(gpu_cell(node, theme)),
        Cell::from(truncate_string(&node.partitions.join(","), partition_cap)),
    ])
}

fn gpu_cell<'a>(node: &Node, theme: &Theme) -> Line<'a> {
    match node.gpu_utilization() {
        Some(util) => Line::from(vec![
            create_progress_bar(util, GPU_BAR_WIDTH, theme),
            Span::raw(format!(" {}/{}", node.gpus_allocated, node.gpus_total)),
        ]),
        None => Line::from("-"),
    }
}

fn render_node_footer(node: Option<&Node>, frame: &mut Frame, area: Rect, theme: &Theme) {
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(theme.border));

    let line = match node {
        Some(node) => {
            let mem_used = node.memory_total_bytes.saturating_sub(node.memory_free_bytes);
            let mem_pct = if node.memory_total_bytes == 0 {
                0.0
            } else {
                mem_used as f64 / node.memory_total_bytes as f64 * 100.0
            };
            Line::from(vec![
                Span::styled(format!(" {} ", node.hostname), Style::default().fg(theme.accent).bold()),
                Span::styled(node.state.as_str(), Style::default().fg(theme.node_state_color(node.state))),
                Span::raw(format!("  CPU {:.0}% ", node.cpu_utilization())),
                Span::raw(format!(" MEM {:.0}% ", mem_pct)),
                create_progress_bar(mem_pct, BAR_WIDTH, theme),
                Span::raw(
                    node.gpu_utilization()
                        .map(|gpu| format!("  GPU {:.0}% ({}/{})", gpu, node.gpus_allocated, node.gpus_total))
                        .unwrap_or_default(),
                ),
                Span::styled(
                    format!("  partitions: {}", node.partitions.join(", ")),
                    Style::default().fg(theme.border),
                ),
            ])
        }
        None => Line::from(Span::styled(" No node selected", Style::default().fg(theme.border))),
    };

    frame.render_widget(Paragraph::new(line).block(block), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_gpu_cell_shows_allocation() {
        let theme = Theme::dark();
        let node = Node {
            gpus_total: 8,
            gpus_allocated: 6,
            ..Default::default()
        };
        assert!(text(&gpu_cell(&node, &theme)).ends_with(" 6/8"));
        assert_eq!(text(&gpu_cell(&Node::default(), &theme)), "-");
    }
}
