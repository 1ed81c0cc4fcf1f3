//! Slurm hostlist expressions.
//!
//! `c[01-03,7],gpu1` expands to `c01 c02 c03 c7 gpu1`. Multiple bracket
//! groups in one name (`r[1-2]n[1-2]`) expand to their product.

/// Upper bound on hosts produced by a single expression.
const MAX_HOSTS: usize = 65_536;

/// Expand a hostlist expression into hostnames, in order.
///
/// Malformed bracket groups are passed through verbatim rather than dropped.
#[must_use]
pub fn expand(expr: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for item in split_items(expr) {
        expand_item(item, &mut hosts);
        if hosts.len() >= MAX_HOSTS {
            hosts.truncate(MAX_HOSTS);
            break;
        }
    }
    hosts
}

/// First hostname of an expression, without expanding the rest.
#[must_use]
pub fn first_host(expr: &str) -> Option<String> {
    let item = split_items(expr).next()?;
    let mut hosts = Vec::new();
    expand_item(&first_range_only(item), &mut hosts);
    hosts.into_iter().next()
}

/// Split on commas outside brackets.
fn split_items(expr: &str) -> impl Iterator<Item = &str> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut items = Vec::new();
    for (idx, ch) in expr.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&expr[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(&expr[start..]);
    items.into_iter().map(str::trim).filter(|s| !s.is_empty())
}

/// Reduce every bracket group to its first element so the expansion is a
/// single host.
fn first_range_only(item: &str) -> String {
    let mut out = String::with_capacity(item.len());
    let mut rest = item;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']').map(|c| open + c) else {
            break;
        };
        out.push_str(&rest[..open]);
        let first = rest[open + 1..close].split(',').next().unwrap_or_default();
        let first = first.split('-').next().unwrap_or_default();
        out.push_str(first);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn expand_item(item: &str, hosts: &mut Vec<String>) {
    let Some(open) = item.find('[') else {
        hosts.push(item.to_string());
        return;
    };
    let Some(close) = item[open..].find(']').map(|c| open + c) else {
        hosts.push(item.to_string());
        return;
    };

    let prefix = &item[..open];
    let suffix = &item[close + 1..];
    let Some(values) = expand_ranges(&item[open + 1..close]) else {
        hosts.push(item.to_string());
        return;
    };

    for value in values {
        if hosts.len() >= MAX_HOSTS {
            return;
        }
        let head = format!("{prefix}{value}");
        if suffix.contains('[') {
            let mut tails = Vec::new();
            expand_item(suffix, &mut tails);
            hosts.extend(tails.into_iter().map(|tail| format!("{head}{tail}")));
        } else {
            hosts.push(format!("{head}{suffix}"));
        }
    }
}

/// Expand `1-3,07-09,12` keeping zero padding from the range start.
fn expand_ranges(spec: &str) -> Option<Vec<String>> {
    let mut values = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((lo, hi)) => {
                let width = lo.len();
                let lo_n: u64 = lo.parse().ok()?;
                let hi_n: u64 = hi.parse().ok()?;
                if hi_n < lo_n {
                    return None;
                }
                for n in lo_n..=hi_n {
                    if values.len() >= MAX_HOSTS {
                        break;
                    }
                    values.push(format!("{n:0width$}"));
                }
            }
            None => {
                part.parse::<u64>().ok()?;
                values.push(part.to_string());
            }
        }
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_simple_list() {
        assert_eq!(expand("c1,c2"), vec!["c1", "c2"]);
        assert_eq!(expand(""), Vec::<String>::new());
    }

    #[test]
    fn test_expand_ranges_with_padding() {
        assert_eq!(
            expand("c[01-03,7],gpu1"),
            vec!["c01", "c02", "c03", "c7", "gpu1"]
        );
    }

    #[test]
    fn test_expand_multiple_groups() {
        assert_eq!(
            expand("r[1-2]n[1-2]"),
            vec!["r1n1", "r1n2", "r2n1", "r2n2"]
        );
    }

    #[test]
    fn test_expand_malformed_passthrough() {
        assert_eq!(expand("c[1-"), vec!["c[1-"]);
        assert_eq!(expand("c[x-y]"), vec!["c[x-y]"]);
    }

    #[test]
    fn test_first_host() {
        assert_eq!(first_host("node[005-900]").as_deref(), Some("node005"));
        assert_eq!(first_host("gpu01,gpu02").as_deref(), Some("gpu01"));
        assert_eq!(first_host(""), None);
    }
}
