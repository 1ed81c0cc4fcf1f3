//! Reusable UI widgets and helper functions
//!
//! Shared rendering utilities used across the table views and overlays.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row};

use crate::formatting::format_age;
use crate::store::SnapshotView;
use crate::tui::theme::Theme;

/// Create a styled table header row from column names
pub fn create_table_header<'a>(columns: &[&'a str], theme: &Theme) -> Row<'a> {
    let header_cells = columns
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(theme.header_fg).bold()));
    Row::new(header_cells)
        .style(Style::default().bg(theme.header_bg))
        .height(1)
}

/// Bordered block for a table view, titled with the row count
pub fn table_block<'a>(title: &str, shown: usize, total: usize, theme: &Theme) -> Block<'a> {
    let title = if shown == total {
        format!(" {} ({}) ", title, total)
    } else {
        format!(" {} ({}/{}) ", title, shown, total)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border_focused))
        .title(title)
}

/// Placeholder when a table has nothing to show.
///
/// Distinguishes "never loaded", "last refresh failed" and "empty result".
/// `filtered` means the snapshot has records but the query hides them all.
pub fn render_empty<T>(
    view: &SnapshotView<T>,
    what: &str,
    filtered: bool,
    frame: &mut Frame,
    area: Rect,
    theme: &Theme,
) {
    let (msg, color) = match (&view.last_error, view.snapshot.version()) {
        (Some(err), 0) => (format!("Could not load {}: {}", what, err), theme.failed),
        (None, 0) => (format!("Loading {}...", what), theme.border),
        _ if filtered => (format!("No {} match the filter", what), theme.border),
        _ => (format!("No {} found", what), theme.border),
    };
    let para = Paragraph::new(msg)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);
    frame.render_widget(para, area);
}

/// "updated 12s ago", flagged once the snapshot is stale
pub fn freshness_span<T>(view: &SnapshotView<T>, theme: &Theme) -> Span<'static> {
    if view.snapshot.version() == 0 {
        return Span::styled("loading...", Style::default().fg(theme.pending));
    }
    let age = format_age(view.age.as_secs());
    if view.is_stale {
        Span::styled(
            format!("updated {} ago (STALE)", age),
            Style::default().fg(theme.stale_indicator).bold(),
        )
    } else {
        Span::styled(format!("updated {} ago", age), Style::default().fg(theme.border))
    }
}

/// Style for a data row: selection wins over watch highlight.
pub fn row_style(is_selected: bool, is_watched: bool, theme: &Theme) -> Style {
    if is_selected {
        Style::default().bg(theme.selected_bg).fg(theme.selected_fg)
    } else if is_watched {
        Style::default().fg(theme.watched)
    } else {
        Style::default()
    }
}

/// Create a centered rectangle
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);

    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

/// Create a progress bar as a Span
pub fn create_progress_bar(percent: f64, width: usize, theme: &Theme) -> Span<'static> {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);

    let bar = format!("[{}{}]", "=".repeat(filled), ".".repeat(empty));

    Span::styled(bar, Style::default().fg(theme.progress_color(percent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Job;
    use crate::store::SnapshotStore;
    use std::time::Duration;

    #[test]
    fn test_progress_bar_width_is_stable() {
        let theme = Theme::dark();
        assert_eq!(create_progress_bar(0.0, 10, &theme).content, "[..........]");
        assert_eq!(create_progress_bar(50.0, 10, &theme).content, "[=====.....]");
        assert_eq!(create_progress_bar(150.0, 10, &theme).content, "[==========]");
    }

    #[test]
    fn test_freshness_before_first_load() {
        let theme = Theme::dark();
        let store = SnapshotStore::new(Duration::from_secs(60));
        let view = store.current::<Job>();
        assert_eq!(freshness_span(&view, &theme).content, "loading...");
    }

    #[test]
    fn test_freshness_flags_stale_snapshot() {
        let theme = Theme::dark();
        let store = SnapshotStore::new(Duration::ZERO);
        store.replace(vec![Job::default()], 1);
        std::thread::sleep(Duration::from_millis(5));
        let view = store.current::<Job>();
        assert!(freshness_span(&view, &theme).content.ends_with("(STALE)"));
    }

    #[test]
    fn test_centered_rect_stays_inside() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(60, 50, area);
        assert_eq!(popup.width, 60);
        assert_eq!(popup.height, 20);
        assert!(popup.x >= area.x && popup.right() <= area.right());
    }
}
