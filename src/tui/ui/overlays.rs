//! Overlay and popup rendering
//!
//! Help, command health, filter input, attach-node prompt, the drill-down
//! detail popup and the job log viewer.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};

use crate::formatting::truncate_string;
use crate::tui::app::{App, DetailContent, LogContent, ModalState};
use crate::tui::theme::Theme;

use super::widgets::{centered_rect, create_table_header};

/// Commands listed in the health overlay
const HEALTH_ROWS: usize = 15;

fn section(title: &str, theme: &Theme) -> Line<'static> {
    Line::from(Span::styled(title.to_string(), Style::default().fg(theme.accent).bold()))
}

fn overlay_block<'a>(title: &'a str, theme: &Theme) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_focused))
        .title(title)
}

pub fn render_help_overlay(frame: &mut Frame, area: Rect, theme: &Theme) {
    let popup_area = centered_rect(65, 85, area);
    frame.render_widget(Clear, popup_area);

    let help_text = vec![
        Line::from(Span::styled("sqtop - Keyboard Shortcuts", Style::default().bold())),
        Line::from(""),
        section("Navigation", theme),
        Line::from("  j / Down       Move selection down"),
        Line::from("  k / Up         Move selection up"),
        Line::from("  g / Home       Jump to top"),
        Line::from("  G / End        Jump to bottom"),
        Line::from("  Ctrl+d / PgDn  Page down"),
        Line::from("  Ctrl+u / PgUp  Page up"),
        Line::from("  Mouse          Click to select, wheel to scroll"),
        Line::from(""),
        section("Views", theme),
        Line::from("  1 / 2 / 3      Jobs / Nodes / Partitions"),
        Line::from("  Tab            Cycle to next view"),
        Line::from("  Enter          Show scontrol details"),
        Line::from(""),
        section("Sort and filter", theme),
        Line::from("  s / S          Next sort column / reverse order"),
        Line::from("  / or f         Filter (text, field:value, !negate)"),
        Line::from("  m              Toggle only my jobs"),
        Line::from(""),
        section("Jobs", theme),
        Line::from("  a              Attach a shell to the job's first node"),
        Line::from("  A              Attach to a chosen node"),
        Line::from("  w              Watch / unwatch the job"),
        Line::from("  l / L          Tail stdout / stderr (f toggles follow)"),
        Line::from(""),
        section("General", theme),
        Line::from("  r              Refresh now"),
        Line::from("  p              Pause / resume refreshing"),
        Line::from("  h              Command health"),
        Line::from("  ? / F1         Show this help"),
        Line::from("  Esc            Close overlay"),
        Line::from("  q              Quit"),
    ];

    let help_para = Paragraph::new(help_text)
        .block(overlay_block(" Help ", theme))
        .style(Style::default().fg(theme.fg));

    frame.render_widget(help_para, popup_area);
}

/// Recent Slurm invocations with latency and failure details.
pub fn render_health_overlay(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let popup_area = centered_rect(80, 70, area);
    frame.render_widget(Clear, popup_area);

    let block = overlay_block(" Command Health ", theme);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let chunks = Layout::vertical([Constraint::Length(2), Constraint::Min(1)]).split(inner);

    let summary = app.history.summary();
    let failure_color = if summary.failures > 0 { theme.failed } else { theme.running };
    let summary_line = Line::from(vec![
        Span::raw(format!(" {} commands, ", summary.total)),
        Span::styled(format!("{} failed", summary.failures), Style::default().fg(failure_color)),
        Span::raw(format!(", mean latency {:.0} ms", summary.mean_latency_ms)),
    ]);
    frame.render_widget(Paragraph::new(summary_line), chunks[0]);

    let recent = app.history.recent(HEALTH_ROWS);
    let rows: Vec<Row> = recent
        .iter()
        .map(|stat| {
            let (status, color) = if stat.ok {
                ("ok", theme.running)
            } else {
                ("FAIL", theme.failed)
            };
            Row::new(vec![
                Cell::from(stat.finished_at.format("%H:%M:%S").to_string()),
                Cell::from(status).style(Style::default().fg(color)),
                Cell::from(format!("{} ms", stat.latency_ms)),
                Cell::from(truncate_string(&stat.command, 40)),
                Cell::from(truncate_string(stat.stderr.lines().next().unwrap_or_default(), 60))
                    .style(Style::default().fg(theme.border)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(9),
        Constraint::Length(5),
        Constraint::Length(9),
        Constraint::Length(40),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths).header(create_table_header(
        &["TIME", "OK", "LATENCY", "COMMAND", "STDERR"],
        theme,
    ));
    frame.render_widget(table, chunks[1]);
}

/// Single-line text prompt anchored under the tab bar.
#[allow(clippy::too_many_arguments)]
fn render_prompt(
    title: &str,
    prefix: &str,
    input: &str,
    cursor: usize,
    hint: Line<'_>,
    frame: &mut Frame,
    area: Rect,
    theme: &Theme,
) {
    let popup_area = Rect {
        x: area.x + 2,
        y: area.y + 1,
        width: area.width.saturating_sub(4).min(70),
        height: 4.min(area.height),
    };
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.accent))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let lines = vec![Line::from(format!("{}{}", prefix, input)), hint];
    frame.render_widget(Paragraph::new(lines).style(Style::default().fg(theme.fg)), inner);

    let column = u16::try_from(prefix.chars().count() + cursor).unwrap_or(u16::MAX);
    frame.set_cursor_position((inner.x.saturating_add(column), inner.y));
}

pub fn render_filter_overlay(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let ModalState::Filter { edit_buffer, cursor } = &app.modal else {
        return;
    };

    let hint = Line::from(vec![
        Span::styled("e.g. ", Style::default().fg(theme.border)),
        Span::raw("user:alice state:r !part:debug"),
    ]);
    let title = format!(" Filter {} ", app.current_view.label());
    render_prompt(&title, "/", edit_buffer, *cursor, hint, frame, area, theme);
}

pub fn render_attach_node_overlay(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let ModalState::AttachNode { job_id, edit_buffer } = &app.modal else {
        return;
    };

    let hint = Line::from(Span::styled(
        "Enter to attach, Esc to cancel",
        Style::default().fg(theme.border),
    ));
    let title = format!(" Attach to job {} ", job_id);
    render_prompt(
        &title,
        "node: ",
        edit_buffer,
        edit_buffer.chars().count(),
        hint,
        frame,
        area,
        theme,
    );
}

/// Key/value popup filled from `scontrol show`.
pub fn render_detail_popup(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let ModalState::Detail { title, content } = &app.modal else {
        return;
    };

    let popup_area = centered_rect(75, 80, area);
    frame.render_widget(Clear, popup_area);

    let block_title = format!(" {} ", title);
    let block = overlay_block(&block_title, theme);

    let lines: Vec<Line> = match content {
        DetailContent::Loading => vec![Line::from(Span::styled("Loading...", Style::default().fg(theme.pending)))],
        DetailContent::Failed(err) => vec![Line::from(Span::styled(err.clone(), Style::default().fg(theme.failed)))],
        DetailContent::Loaded(fields) => {
            let key_width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            fields
                .iter()
                .map(|(key, value)| {
                    Line::from(vec![
                        Span::styled(format!("{:>width$}: ", key, width = key_width), Style::default().fg(theme.border)),
                        Span::raw(value.clone()),
                    ])
                })
                .collect()
        }
    };

    let para = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(theme.fg));
    frame.render_widget(para, popup_area);
}

/// First line to show so the window ends `scroll_back` lines above the end.
fn log_window_start(total: usize, height: usize, scroll_back: usize) -> usize {
    total.saturating_sub(height).saturating_sub(scroll_back)
}

/// Tail of a job output file, re-read every couple of seconds while following.
pub fn render_log_overlay(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let ModalState::Log(viewer) = &app.modal else {
        return;
    };

    let popup_area = centered_rect(90, 85, area);
    frame.render_widget(Clear, popup_area);

    let block_title = format!(" Job {} {} ", viewer.job_id, viewer.stream);
    let block = overlay_block(&block_title, theme);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let chunks = Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).split(inner);

    let path = match &viewer.content {
        LogContent::Loaded { path, .. } => path.as_str(),
        _ => "",
    };
    let (follow_label, follow_color) = if viewer.follow {
        ("following", theme.running)
    } else {
        ("paused", theme.pending)
    };
    let header = Line::from(vec![
        Span::raw(format!(" {} ", truncate_string(path, usize::from(inner.width) / 2))),
        Span::styled(follow_label, Style::default().fg(follow_color)),
        Span::styled("  Esc close  f follow  l/L stdout/stderr", Style::default().fg(theme.border)),
    ]);
    frame.render_widget(Paragraph::new(header), chunks[0]);

    let body = match &viewer.content {
        LogContent::Loading => Paragraph::new(Span::styled("Loading...", Style::default().fg(theme.pending))),
        LogContent::Failed(err) => Paragraph::new(Span::styled(err.clone(), Style::default().fg(theme.failed))),
        LogContent::Loaded { text, .. } if text.is_empty() => {
            Paragraph::new(Span::styled("(empty log)", Style::default().fg(theme.border)))
        }
        LogContent::Loaded { text, .. } => {
            let lines: Vec<Line> = text.lines().map(|l| Line::from(l.to_string())).collect();
            let start = log_window_start(lines.len(), usize::from(chunks[1].height), viewer.scroll_back);
            Paragraph::new(lines).scroll((u16::try_from(start).unwrap_or(u16::MAX), 0))
        }
    };
    frame.render_widget(body.style(Style::default().fg(theme.fg)), chunks[1]);
}
