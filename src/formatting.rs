//! Formatting helpers shared by the TUI and the one-shot CLI tables.

/// Memory size constants (in bytes)
pub mod size {
    pub const KB: u64 = 1024;
    pub const MB: u64 = KB * 1024;
    pub const GB: u64 = MB * 1024;
    pub const TB: u64 = GB * 1024;
}

/// Utilization thresholds for color coding
pub mod thresholds {
    pub const UTILIZATION_LOW: f64 = 50.0;
    pub const UTILIZATION_HIGH: f64 = 80.0;
}

/// Truncate to at most `max_len` characters, ending in "..." when cut.
///
/// Counts characters, not bytes. A cap of 0 means "no cap".
#[must_use]
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if max_len == 0 {
        return s.to_string();
    }
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format seconds as `HH:MM:SS`, or `D-HH:MM:SS` once a day is reached.
///
/// This is the same shape squeue prints for elapsed time and limits.
#[must_use]
pub fn format_duration_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours >= 24 {
        format!("{}-{:02}:{:02}:{:02}", hours / 24, hours % 24, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

/// Compact age display for the status bar: `4s`, `2m 10s`, `3h 5m`.
#[must_use]
pub fn format_age(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    match (hours, minutes) {
        (0, 0) => format!("{}s", secs),
        (0, m) if secs == 0 => format!("{}m", m),
        (0, m) => format!("{}m {}s", m, secs),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Format raw bytes to a short human-readable size (`1.5G`).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    use size::{GB, KB, MB, TB};

    if bytes >= TB {
        format!("{:.1}T", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
