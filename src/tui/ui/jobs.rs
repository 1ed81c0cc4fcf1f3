//! Jobs view rendering

use ratatui::prelude::*;
use ratatui::widgets::{Cell, Row, Table};

use crate::config::ColumnCaps;
use crate::formatting::truncate_string;
use crate::models::Job;
use crate::tui::app::App;
use crate::tui::theme::Theme;

use super::widgets::{create_table_header, render_empty, row_style, table_block};

pub fn render_jobs_view(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let list = &app.jobs;
    let rows = list.rows();
    let total = list.view.snapshot.len();

    let block = table_block("Jobs", rows.len(), total, theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if rows.is_empty() {
        render_empty(&list.view, "jobs", total > 0, frame, inner, theme);
        return;
    }

    let header = create_table_header(
        &[
            "JOBID", "NAME", "USER", "PARTITION", "ST", "NODES", "CPUS", "TIME", "LIMIT", "NODELIST(REASON)",
        ],
        theme,
    );

    let available_height = inner.height.saturating_sub(1) as usize;
    let selected = list.selection.index();
    let offset = list.selection.offset();
    let caps = &app.config.columns;

    let table_rows: Vec<Row> = rows
        .iter()
        .enumerate()
        .skip(offset)
        .take(available_height)
        .map(|(idx, job)| {
            let style = row_style(idx == selected, app.watch.contains(&job.id), theme);
            job_to_row(job, app.watch.contains(&job.id), list.is_fresh(&job.id), caps, theme).style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Min(12),
        Constraint::Length(clamp_width(caps.user, 10)),
        Constraint::Length(clamp_width(caps.partition, 10)),
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(11),
        Constraint::Length(11),
        Constraint::Min(16),
    ];

    let table = Table::new(table_rows, widths).header(header);
    frame.render_widget(table, inner);
}

fn clamp_width(cap: usize, fallback: u16) -> u16 {
    if cap == 0 {
        fallback
    } else {
        u16::try_from(cap).unwrap_or(u16::MAX)
    }
}

fn job_to_row<'a>(job: &Job, watched: bool, fresh: bool, caps: &ColumnCaps, theme: &Theme) -> Row<'a> {
    let marker = if watched {
        "*"
    } else if fresh {
        "+"
    } else {
        " "
    };

    Row::new(vec![
        Cell::from(format!("{}{}", marker, job.id)),
        Cell::from(truncate_string(&job.name, caps.name)),
        Cell::from(truncate_string(&job.user, caps.user)),
        Cell::from(truncate_string(&job.partition, caps.partition)),
        Cell::from(job.state.short_str()).style(Style::default().fg(theme.job_state_color(job.state))),
        Cell::from(job.node_count.to_string()),
        Cell::from(job.cpus.to_string()),
        Cell::from(job.elapsed_display()),
        Cell::from(job.time_limit.display()),
        Cell::from(truncate_string(&job.nodelist_or_reason(), caps.nodelist_reason)),
    ])
}
