//! Theme definitions for the TUI
//!
//! Colorblind-safe palettes for dark and light terminals. The default is
//! "dark"; "light" can be selected via the config file or `SQTOP_THEME`.

use ratatui::style::Color;

use crate::formatting::thresholds::{UTILIZATION_HIGH, UTILIZATION_LOW};
use crate::models::{JobState, NodeState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeName {
    #[default]
    Dark,
    Light,
}

impl ThemeName {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "light" => ThemeName::Light,
            _ => ThemeName::Dark,
        }
    }
}

/// Color theme for the TUI
#[derive(Debug, Clone)]
pub struct Theme {
    pub fg: Color,
    pub border: Color,
    pub border_focused: Color,

    // Job state colors
    pub running: Color,
    pub pending: Color,
    pub completed: Color,
    pub failed: Color,
    pub cancelled: Color,
    pub timeout: Color,

    // Node state colors
    pub idle: Color,
    pub mixed: Color,
    pub draining: Color,

    pub selected_bg: Color,
    pub selected_fg: Color,
    pub header_bg: Color,
    pub header_fg: Color,
    pub stale_indicator: Color,
    pub watched: Color,
    pub accent: Color,

    pub progress_full: Color,
    pub progress_warn: Color,
    pub progress_crit: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Okabe-Ito based palette for dark backgrounds
    pub fn dark() -> Self {
        Self {
            fg: Color::Gray,
            border: Color::DarkGray,
            border_focused: Color::Rgb(86, 180, 233),

            running: Color::Rgb(0, 158, 115),
            pending: Color::Rgb(230, 159, 0),
            completed: Color::Rgb(86, 180, 233),
            failed: Color::Rgb(213, 94, 0),
            cancelled: Color::Rgb(128, 128, 128),
            timeout: Color::Rgb(204, 121, 167),

            idle: Color::Rgb(0, 158, 115),
            mixed: Color::Rgb(240, 228, 66),
            draining: Color::Rgb(204, 121, 167),

            selected_bg: Color::Rgb(45, 55, 72),
            selected_fg: Color::White,
            header_bg: Color::Rgb(0, 72, 112),
            header_fg: Color::White,
            stale_indicator: Color::Rgb(213, 94, 0),
            watched: Color::Rgb(240, 228, 66),
            accent: Color::Rgb(86, 180, 233),

            progress_full: Color::Rgb(0, 158, 115),
            progress_warn: Color::Rgb(230, 159, 0),
            progress_crit: Color::Rgb(213, 94, 0),
        }
    }

    /// Same hues, darkened for light backgrounds
    pub fn light() -> Self {
        Self {
            fg: Color::Black,
            border: Color::Rgb(110, 110, 110),
            border_focused: Color::Rgb(0, 114, 178),

            running: Color::Rgb(0, 120, 88),
            pending: Color::Rgb(176, 112, 0),
            completed: Color::Rgb(0, 114, 178),
            failed: Color::Rgb(180, 70, 0),
            cancelled: Color::Rgb(96, 96, 96),
            timeout: Color::Rgb(150, 70, 120),

            idle: Color::Rgb(0, 120, 88),
            mixed: Color::Rgb(150, 130, 0),
            draining: Color::Rgb(150, 70, 120),

            selected_bg: Color::Rgb(205, 225, 245),
            selected_fg: Color::Black,
            header_bg: Color::Rgb(170, 205, 230),
            header_fg: Color::Black,
            stale_indicator: Color::Rgb(180, 70, 0),
            watched: Color::Rgb(150, 110, 0),
            accent: Color::Rgb(0, 114, 178),

            progress_full: Color::Rgb(0, 120, 88),
            progress_warn: Color::Rgb(176, 112, 0),
            progress_crit: Color::Rgb(180, 70, 0),
        }
    }

    pub fn from_name(name: &str) -> Self {
        match ThemeName::parse(name) {
            ThemeName::Dark => Self::dark(),
            ThemeName::Light => Self::light(),
        }
    }

    pub fn job_state_color(&self, state: JobState) -> Color {
        match state {
            JobState::Running => self.running,
            JobState::Pending | JobState::Suspended => self.pending,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Cancelled => self.cancelled,
            JobState::Timeout => self.timeout,
            JobState::Unknown => self.fg,
        }
    }

    pub fn node_state_color(&self, state: NodeState) -> Color {
        match state {
            NodeState::Idle => self.idle,
            NodeState::Mixed => self.mixed,
            NodeState::Allocated => self.completed,
            NodeState::Down => self.failed,
            NodeState::Draining => self.draining,
            NodeState::Unknown => self.fg,
        }
    }

    /// Progress bar color for a utilization percentage
    pub fn progress_color(&self, percent: f64) -> Color {
        if percent >= UTILIZATION_HIGH {
            self.progress_crit
        } else if percent >= UTILIZATION_LOW {
            self.progress_warn
        } else {
            self.progress_full
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_from_name() {
        assert_eq!(ThemeName::parse("LIGHT"), ThemeName::Light);
        assert_eq!(ThemeName::parse("unknown"), ThemeName::Dark);
        assert_eq!(Theme::from_name("light").fg, Theme::light().fg);
        assert_eq!(Theme::from_name("unknown").fg, Theme::dark().fg);
    }

    #[test]
    fn test_state_colors() {
        let theme = Theme::dark();
        assert_eq!(theme.job_state_color(JobState::Running), theme.running);
        assert_eq!(theme.job_state_color(JobState::Failed), theme.failed);
        assert_eq!(theme.node_state_color(NodeState::Down), theme.failed);
        assert_eq!(theme.node_state_color(NodeState::Draining), theme.draining);
    }

    #[test]
    fn test_progress_color() {
        let theme = Theme::dark();
        assert_eq!(theme.progress_color(10.0), theme.progress_full);
        assert_eq!(theme.progress_color(99.0), theme.progress_crit);
    }
}
