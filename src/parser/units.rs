//! Unit-aware numeric parsing for Slurm fields.
//!
//! Unparsable input degrades to `None`/zero; callers pick the default.

use crate::formatting::size;
use crate::models::TimeLimit;

/// Parse a memory amount to bytes.
///
/// Accepts `4096` (MB, Slurm's default unit), `16G`, `16Gb`, `512M`,
/// `1T`, `800K`, and fractional values such as `1.5G`.
#[must_use]
pub fn parse_memory_bytes(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "-" || s.eq_ignore_ascii_case("N/A") {
        return None;
    }

    let trimmed = s.trim_end_matches(['b', 'B']);
    let (number, multiplier) = match trimmed.chars().last()? {
        'K' | 'k' => (&trimmed[..trimmed.len() - 1], size::KB),
        'M' | 'm' => (&trimmed[..trimmed.len() - 1], size::MB),
        'G' | 'g' => (&trimmed[..trimmed.len() - 1], size::GB),
        'T' | 't' => (&trimmed[..trimmed.len() - 1], size::TB),
        c if c.is_ascii_digit() => (trimmed, size::MB),
        _ => return None,
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }
    let value: f64 = number.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some((value * multiplier as f64) as u64)
    } else {
        None
    }
}

/// Parse a Slurm duration to seconds.
///
/// Supported shapes: `D-HH:MM:SS`, `D-HH:MM`, `D-HH`, `HH:MM:SS`, `MM:SS`
/// and bare minutes. Returns `None` for `UNLIMITED`, `INVALID`, `N/A` and
/// anything unparsable.
#[must_use]
pub fn parse_duration_secs(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty()
        || s == "-"
        || s.eq_ignore_ascii_case("UNLIMITED")
        || s.eq_ignore_ascii_case("INVALID")
        || s.eq_ignore_ascii_case("N/A")
        || s.eq_ignore_ascii_case("NOT_SET")
    {
        return None;
    }

    let (days, clock) = match s.split_once('-') {
        Some((d, rest)) => (Some(d.parse::<u64>().ok()?), rest),
        None => (None, s),
    };

    let parts: Vec<u64> = clock
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let (d, h, m, sec) = match (days, parts.as_slice()) {
        (Some(d), [h]) => (d, *h, 0, 0),
        (Some(d), [h, m]) => (d, *h, *m, 0),
        (Some(d), [h, m, sec]) => (d, *h, *m, *sec),
        (None, [m]) => (0, 0, *m, 0),
        (None, [m, sec]) => (0, 0, *m, *sec),
        (None, [h, m, sec]) => (0, *h, *m, *sec),
        _ => return None,
    };
    d.checked_mul(86_400)?
        .checked_add(h.checked_mul(3600)?)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(sec)
}

/// Parse a time limit column.
///
/// `UNLIMITED` and `INFINITE` are explicit; anything else that is not a
/// duration is [`TimeLimit::Unknown`].
#[must_use]
pub fn parse_time_limit(s: &str) -> TimeLimit {
    let s = s.trim();
    if s.eq_ignore_ascii_case("UNLIMITED") || s.eq_ignore_ascii_case("INFINITE") {
        return TimeLimit::Unlimited;
    }
    parse_duration_secs(s).map_or(TimeLimit::Unknown, TimeLimit::Limited)
}

/// Parse a plain count, degrading to zero.
#[must_use]
pub fn parse_count(s: &str) -> u32 {
    s.trim().parse().unwrap_or(0)
}

/// Parse a floating point load figure, degrading to zero.
#[must_use]
pub fn parse_load(s: &str) -> f64 {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Sum the GPU counts of a GRES string.
///
/// Handles `gpu:4`, `gpu:a100:4`, `gpu:a100:4(S:0-1)` and comma-separated
/// lists mixing GPUs with other resources. `(null)` and empty yield zero.
#[must_use]
pub fn parse_gpu_count(gres: &str) -> u32 {
    split_top_level(gres)
        .filter_map(|entry| {
            let entry = entry.split('(').next().unwrap_or_default();
            let mut parts = entry.split(':');
            if parts.next()? != "gpu" {
                return None;
            }
            let rest: Vec<&str> = parts.collect();
            match rest.as_slice() {
                [] => Some(1),
                [count] | [_, count] => count.parse::<u32>().ok(),
                _ => None,
            }
        })
        .sum()
}

/// Split on commas that are not inside parentheses.
fn split_top_level(s: &str) -> impl Iterator<Item = &str> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut pieces = Vec::new();
    for (idx, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    pieces.push(&s[start..]);
    pieces.into_iter().map(str::trim).filter(|p| !p.is_empty())
}

/// Parse the `%C` allocated/idle/other/total CPU column.
///
/// Returns `(allocated, total)`.
#[must_use]
pub fn parse_cpu_counts(s: &str) -> Option<(u32, u32)> {
    let parts: Vec<&str> = s.trim().split('/').collect();
    match parts.as_slice() {
        [alloc, _idle, _other, total] => Some((alloc.parse().ok()?, total.parse().ok()?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_units() {
        assert_eq!(parse_memory_bytes("16Gb"), Some(16 * size::GB));
        assert_eq!(parse_memory_bytes("16G"), Some(16 * size::GB));
        assert_eq!(parse_memory_bytes("4096"), Some(4096 * size::MB));
        assert_eq!(parse_memory_bytes("800K"), Some(800 * size::KB));
        assert_eq!(parse_memory_bytes("1.5G"), Some(size::GB + size::GB / 2));
    }

    #[test]
    fn test_memory_garbage() {
        assert_eq!(parse_memory_bytes(""), None);
        assert_eq!(parse_memory_bytes("N/A"), None);
        assert_eq!(parse_memory_bytes("lots"), None);
    }

    #[test]
    fn test_duration_shapes() {
        assert_eq!(parse_duration_secs("1-02:03:04"), Some(93_784));
        assert_eq!(parse_duration_secs("02:03:04"), Some(7384));
        assert_eq!(parse_duration_secs("3:04"), Some(184));
        assert_eq!(parse_duration_secs("2-12"), Some(2 * 86_400 + 12 * 3600));
        assert_eq!(parse_duration_secs("30"), Some(1800));
    }

    #[test]
    fn test_duration_no_limit() {
        assert_eq!(parse_duration_secs("UNLIMITED"), None);
        assert_eq!(parse_duration_secs("INVALID"), None);
        assert_eq!(parse_duration_secs("soon"), None);
    }

    #[test]
    fn test_duration_overflow_is_unparsable() {
        assert_eq!(parse_duration_secs("213503982334602-00:00:00"), None);
        assert_eq!(parse_duration_secs("18446744073709551615:00:00"), None);
        assert_eq!(parse_duration_secs("307445734561825861"), None);
    }

    #[test]
    fn test_time_limit_keeps_unknown_apart() {
        assert_eq!(parse_time_limit("1:00:00"), TimeLimit::Limited(3600));
        assert_eq!(parse_time_limit("UNLIMITED"), TimeLimit::Unlimited);
        assert_eq!(parse_time_limit("infinite"), TimeLimit::Unlimited);
        assert_eq!(parse_time_limit("later"), TimeLimit::Unknown);
        assert_eq!(parse_time_limit(""), TimeLimit::Unknown);
    }

    #[test]
    fn test_gpu_count() {
        assert_eq!(parse_gpu_count("gpu:4"), 4);
        assert_eq!(parse_gpu_count("gpu:a100:4(S:0-1)"), 4);
        assert_eq!(parse_gpu_count("gpu:a100:2(S:0),gpu:v100:1"), 3);
        assert_eq!(parse_gpu_count("(null)"), 0);
        assert_eq!(parse_gpu_count("craynetwork:4"), 0);
    }

    #[test]
    fn test_cpu_counts() {
        assert_eq!(parse_cpu_counts("2/6/0/8"), Some((2, 8)));
        assert_eq!(parse_cpu_counts("8"), None);
    }
}
