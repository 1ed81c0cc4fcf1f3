//! UI rendering for the TUI
//!
//! Rendering is event-driven: a frame is drawn only after an event changed
//! state, never at a fixed rate. Everything here reads from [`App`]; nothing
//! mutates it.

mod jobs;
mod nodes;
mod overlays;
mod partitions;
mod widgets;

use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Tabs};

use crate::attach::AttachState;
use crate::refresh::SchedulerState;
use crate::tui::app::{App, ModalState, View};
use crate::tui::theme::Theme;

use jobs::render_jobs_view;
use nodes::render_nodes_view;
use overlays::{
    render_attach_node_overlay, render_detail_popup, render_filter_overlay, render_health_overlay,
    render_help_overlay, render_log_overlay,
};
use partitions::render_partitions_view;
use widgets::freshness_span;

/// Render the entire TUI
pub fn render(app: &App, frame: &mut Frame) {
    let theme = Theme::from_name(&app.config.display.theme);
    let area = frame.area();

    let layout = Layout::vertical([
        Constraint::Length(1), // Tab bar
        Constraint::Length(1), // Info bar
        Constraint::Min(0),    // Main content
        Constraint::Length(2), // Status bar
    ])
    .split(area);

    render_tab_bar(app, frame, layout[0], &theme);
    render_info_bar(app, frame, layout[1], &theme);
    render_content(app, frame, layout[2], &theme);
    render_status_bar(app, frame, layout[3], &theme);

    match &app.modal {
        ModalState::Help => render_help_overlay(frame, area, &theme),
        ModalState::Health => render_health_overlay(app, frame, area, &theme),
        ModalState::Filter { .. } => render_filter_overlay(app, frame, area, &theme),
        ModalState::AttachNode { .. } => render_attach_node_overlay(app, frame, area, &theme),
        ModalState::Detail { .. } => render_detail_popup(app, frame, area, &theme),
        ModalState::Log(_) => render_log_overlay(app, frame, area, &theme),
        ModalState::None => {}
    }
}

fn render_tab_bar(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let titles: Vec<Line> = View::ALL
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let num = format!("[{}]", i + 1);
            if *view == app.current_view {
                Line::from(vec![
                    Span::styled(num, Style::default().fg(theme.accent)),
                    Span::styled(view.label(), Style::default().fg(theme.selected_fg).bold()),
                ])
            } else {
                Line::from(vec![
                    Span::styled(num, Style::default().fg(theme.border)),
                    Span::raw(view.label()),
                ])
            }
        })
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.current_view as usize)
        .divider(" | ")
        .style(Style::default().fg(theme.fg))
        .highlight_style(Style::default().fg(theme.selected_fg).bold());

    frame.render_widget(tabs, area);
}

fn render_info_bar(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let mut parts = Vec::new();

    if app.current_view == View::Jobs {
        let scope = if app.only_mine {
            format!(" My jobs ({})", app.username)
        } else {
            " All jobs".to_string()
        };
        parts.push(Span::styled(scope, Style::default().fg(theme.fg)));
        if !app.watch.is_empty() {
            parts.push(Span::styled(
                format!(" | watching {}", app.watch.len()),
                Style::default().fg(theme.watched),
            ));
        }
        parts.push(Span::raw(" | "));
    } else {
        parts.push(Span::raw(" "));
    }

    parts.push(Span::styled(
        format!("Sort: {}", app.sort_label()),
        Style::default().fg(theme.accent),
    ));

    let filter = app.current_filter();
    if !filter.is_empty() {
        parts.push(Span::styled(format!(" | Filter: {}", filter), Style::default().fg(theme.accent)));
    }

    parts.push(Span::raw(" | "));
    parts.push(match app.current_view {
        View::Jobs => freshness_span(&app.jobs.view, theme),
        View::Nodes => freshness_span(&app.nodes.view, theme),
        View::Partitions => freshness_span(&app.partitions.view, theme),
    });

    frame.render_widget(Paragraph::new(Line::from(parts)), area);
}

fn render_content(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    match app.current_view {
        View::Jobs => render_jobs_view(app, frame, area, theme),
        View::Nodes => render_nodes_view(app, frame, area, theme),
        View::Partitions => render_partitions_view(app, frame, area, theme),
    }
}

fn render_status_bar(app: &App, frame: &mut Frame, area: Rect, theme: &Theme) {
    let layout = Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).split(area);

    let keybinds = match app.current_view {
        View::Jobs => " j/k:move  Enter:detail  a/A:attach  l/L:log  w:watch  m:mine  s/S:sort  /:filter  p:pause  ?:help  q:quit ",
        View::Nodes | View::Partitions => " j/k:move  Enter:detail  s/S:sort  /:filter  r:refresh  p:pause  ?:help  q:quit ",
    };
    frame.render_widget(
        Paragraph::new(keybinds).style(Style::default().fg(theme.border)),
        layout[0],
    );

    let mut status_parts = Vec::new();

    let (sched_label, sched_color) = match app.scheduler_state() {
        SchedulerState::Idle => ("idle", theme.border),
        SchedulerState::Polling => ("polling", theme.accent),
        SchedulerState::Paused => ("PAUSED", theme.progress_warn),
    };
    status_parts.push(Span::styled(format!(" [{}]", sched_label), Style::default().fg(sched_color).bold()));

    match app.attach_state() {
        AttachState::Normal => {}
        AttachState::AttachRequested => status_parts.push(Span::styled(
            " [attaching]",
            Style::default().fg(theme.progress_warn).bold(),
        )),
        AttachState::Suspended => status_parts.push(Span::styled(
            " [attached]",
            Style::default().fg(theme.progress_warn).bold(),
        )),
    }

    status_parts.push(Span::styled(" Jobs: ", Style::default().fg(theme.border)));
    status_parts.push(Span::styled(
        format!("{} running", app.running_job_count()),
        Style::default().fg(theme.running),
    ));
    status_parts.push(Span::raw(", "));
    status_parts.push(Span::styled(
        format!("{} pending", app.pending_job_count()),
        Style::default().fg(theme.pending),
    ));

    let unavailable = app.unavailable_node_count();
    if unavailable > 0 {
        status_parts.push(Span::raw(" | "));
        status_parts.push(Span::styled(
            format!("{} nodes down/drained", unavailable),
            Style::default().fg(theme.failed),
        ));
    }

    let warnings = &app.feedback.config_warnings;
    if let Some(first) = warnings.first() {
        let text = if warnings.len() == 1 {
            format!(" | WARN: {}", first)
        } else {
            format!(" | WARN: {} (+{} more)", first, warnings.len() - 1)
        };
        status_parts.push(Span::styled(text, Style::default().fg(theme.progress_warn)));
    }

    if let Some(message) = app.feedback.current() {
        let (prefix, color) = if message.is_error {
            ("ERROR: ", theme.failed)
        } else {
            ("", theme.fg)
        };
        status_parts.push(Span::styled(
            format!(" | {}{} ", prefix, message.text),
            Style::default().fg(color),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(status_parts)), layout[1]);
}
