//! Event types for the TUI
//!
//! Dual-channel event architecture:
//! - InputEvent: priority channel for user input (never dropped)
//! - DataEvent: refresh notifications and background results (may be dropped under load)

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent};

use crate::parser::DetailFields;
use crate::refresh::RefreshEvent;
use crate::slurm::logs::{LogStream, LogTail};

/// Input events from the terminal (priority channel, never dropped)
#[derive(Debug, Clone)]
pub enum InputEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// New terminal height in rows
    Resize(u16),
}

/// Data events (may be dropped under load)
#[derive(Debug)]
pub enum DataEvent {
    /// Once per second so ages and stale markers stay current
    Tick,

    /// A fetch finished
    Refresh(RefreshEvent),

    /// Drill-down detail arrived
    Detail {
        title: String,
        result: Result<DetailFields, String>,
    },

    /// Tail of a job output file arrived
    Log {
        job_id: String,
        stream: LogStream,
        result: Result<LogTail, String>,
    },
}

impl From<RefreshEvent> for DataEvent {
    fn from(event: RefreshEvent) -> Self {
        DataEvent::Refresh(event)
    }
}

/// Result of processing an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    /// Continue running, UI needs redraw
    Continue,
    /// Continue running, no UI change needed
    Unchanged,
    Quit,
}

/// Key action mappings for the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    // Navigation
    MoveUp,
    MoveDown,
    MoveToTop,
    MoveToBottom,
    PageUp,
    PageDown,

    // View switching
    SwitchToJobs,
    SwitchToNodes,
    SwitchToPartitions,
    NextView,

    // Actions
    Select,
    Attach,
    AttachToNode,
    ToggleWatch,
    ToggleMine,
    Refresh,
    TogglePause,
    OpenFilter,
    CycleSort,
    ReverseSort,
    ShowHealth,
    ShowStdout,
    ShowStderr,
    ToggleFollow,

    // UI
    ShowHelp,
    Escape,
    Quit,

    // Text input
    InputClear,
    InputBackspace,
    InputChar(char),

    // Mouse
    MouseClick { row: u16 },
    MouseScrollUp,
    MouseScrollDown,

    Unknown,
}

impl KeyAction {
    pub fn from_mouse_event(event: MouseEvent) -> Self {
        use crossterm::event::{MouseButton, MouseEventKind};

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => KeyAction::MouseClick { row: event.row },
            MouseEventKind::ScrollUp => KeyAction::MouseScrollUp,
            MouseEventKind::ScrollDown => KeyAction::MouseScrollDown,
            _ => KeyAction::Unknown,
        }
    }

    /// Keys inside the log viewer; anything else maps as in normal mode.
    pub fn from_log_key_event(event: KeyEvent) -> Self {
        match event.code {
            KeyCode::Char('f') => KeyAction::ToggleFollow,
            _ => Self::from_key_event(event, false),
        }
    }

    /// Map a key event to an action based on current mode
    pub fn from_key_event(event: KeyEvent, in_text_input: bool) -> Self {
        let KeyEvent { code, modifiers, .. } = event;

        if in_text_input {
            return match code {
                KeyCode::Esc => KeyAction::Escape,
                KeyCode::Enter => KeyAction::Select,
                KeyCode::Backspace => KeyAction::InputBackspace,
                KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => KeyAction::InputClear,
                KeyCode::Char(c) => KeyAction::InputChar(c),
                _ => KeyAction::Unknown,
            };
        }

        match code {
            KeyCode::Char('q') => KeyAction::Quit,

            // Ctrl+ combinations must come before bare character matches
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
            KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => KeyAction::PageDown,
            KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => KeyAction::PageUp,

            KeyCode::Char('j') | KeyCode::Down => KeyAction::MoveDown,
            KeyCode::Char('k') | KeyCode::Up => KeyAction::MoveUp,
            KeyCode::Char('g') | KeyCode::Home => KeyAction::MoveToTop,
            KeyCode::Char('G') | KeyCode::End => KeyAction::MoveToBottom,
            KeyCode::PageDown => KeyAction::PageDown,
            KeyCode::PageUp => KeyAction::PageUp,

            KeyCode::Char('1') => KeyAction::SwitchToJobs,
            KeyCode::Char('2') => KeyAction::SwitchToNodes,
            KeyCode::Char('3') => KeyAction::SwitchToPartitions,
            KeyCode::Tab => KeyAction::NextView,

            KeyCode::Enter => KeyAction::Select,
            KeyCode::Char('a') => KeyAction::Attach,
            KeyCode::Char('A') => KeyAction::AttachToNode,
            KeyCode::Char('w') => KeyAction::ToggleWatch,
            KeyCode::Char('m') => KeyAction::ToggleMine,
            KeyCode::Char('r') => KeyAction::Refresh,
            KeyCode::Char('p') => KeyAction::TogglePause,
            KeyCode::Char('/') | KeyCode::Char('f') => KeyAction::OpenFilter,
            KeyCode::Char('s') => KeyAction::CycleSort,
            KeyCode::Char('S') => KeyAction::ReverseSort,
            KeyCode::Char('h') => KeyAction::ShowHealth,
            KeyCode::Char('l') => KeyAction::ShowStdout,
            KeyCode::Char('L') => KeyAction::ShowStderr,

            KeyCode::Char('?') | KeyCode::F(1) => KeyAction::ShowHelp,
            KeyCode::Esc => KeyAction::Escape,

            _ => KeyAction::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_action_quit() {
        let event = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(KeyAction::from_key_event(event, false), KeyAction::Quit);
    }

    #[test]
    fn test_key_action_attach() {
        let event = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(KeyAction::from_key_event(event, false), KeyAction::Attach);

        let event = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(KeyAction::from_key_event(event, false), KeyAction::AttachToNode);
    }

    #[test]
    fn test_log_viewer_keys() {
        let follow = KeyEvent::new(KeyCode::Char('f'), KeyModifiers::NONE);
        assert_eq!(KeyAction::from_log_key_event(follow), KeyAction::ToggleFollow);
        assert_eq!(KeyAction::from_key_event(follow, false), KeyAction::OpenFilter);

        let stderr = KeyEvent::new(KeyCode::Char('L'), KeyModifiers::SHIFT);
        assert_eq!(KeyAction::from_log_key_event(stderr), KeyAction::ShowStderr);
    }

    #[test]
    fn test_text_input_captures_letters() {
        let event = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(KeyAction::from_key_event(event, true), KeyAction::InputChar('q'));

        let event = KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL);
        assert_eq!(KeyAction::from_key_event(event, true), KeyAction::InputClear);
        assert_eq!(KeyAction::from_key_event(event, false), KeyAction::PageUp);
    }
}
