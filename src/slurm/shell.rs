//! Shell-style word splitting with environment expansion.
//!
//! Used for the configurable parts of the attach command. Quoting follows
//! POSIX sh closely enough for command lines like `--mpi=none` or
//! `"$SHELL" -l`: single quotes are literal, double quotes allow `$VAR`,
//! backslash escapes the next character outside single quotes.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellSplitError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    #[error("unterminated ${{...}} expansion")]
    UnterminatedBrace,
    #[error("trailing backslash")]
    TrailingBackslash,
}

/// Split `input` into words, expanding `$VAR` and `${VAR}` with `lookup`.
///
/// Unset variables expand to nothing. A word that expands to nothing and was
/// not quoted is dropped, as a shell would.
pub fn split_words<F>(input: &str, lookup: F) -> Result<Vec<String>, ShellSplitError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut words = Vec::new();
    let mut current = String::new();
    // Whether the current word has content or quotes that make it a word.
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word && (quoted || !current.is_empty()) {
                    words.push(std::mem::take(&mut current));
                }
                current.clear();
                in_word = false;
                quoted = false;
            }
            '\'' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(ShellSplitError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(ShellSplitError::UnterminatedQuote('"')),
                        },
                        Some('$') => expand_variable(&mut chars, &mut current, &lookup)?,
                        Some(ch) => current.push(ch),
                        None => return Err(ShellSplitError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err(ShellSplitError::TrailingBackslash),
                }
            }
            '$' => {
                in_word = true;
                expand_variable(&mut chars, &mut current, &lookup)?;
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }

    if in_word && (quoted || !current.is_empty()) {
        words.push(current);
    }
    Ok(words)
}

fn expand_variable<I, F>(
    chars: &mut std::iter::Peekable<I>,
    out: &mut String,
    lookup: &F,
) -> Result<(), ShellSplitError>
where
    I: Iterator<Item = char>,
    F: Fn(&str) -> Option<String>,
{
    let mut name = String::new();
    if chars.peek() == Some(&'{') {
        chars.next();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(ch) => name.push(ch),
                None => return Err(ShellSplitError::UnterminatedBrace),
            }
        }
    } else {
        while let Some(&ch) = chars.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                name.push(ch);
                chars.next();
            } else {
                break;
            }
        }
    }

    if name.is_empty() {
        // A lone `$` is literal.
        out.push('$');
    } else if let Some(value) = lookup(&name) {
        out.push_str(&value);
    }
    Ok(())
}

/// Environment lookup used for real attach commands.
#[must_use]
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(name: &str) -> Option<String> {
        match name {
            "SHELL" => Some("/bin/zsh".to_string()),
            "SCRATCH" => Some("/scratch/me".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_split_plain_words() {
        assert_eq!(split_words("bash -l", vars).unwrap(), vec!["bash", "-l"]);
        assert_eq!(split_words("  ", vars).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_expand_variables() {
        assert_eq!(split_words("$SHELL -l", vars).unwrap(), vec!["/bin/zsh", "-l"]);
        assert_eq!(
            split_words("--chdir=${SCRATCH}/run", vars).unwrap(),
            vec!["--chdir=/scratch/me/run"]
        );
    }

    #[test]
    fn test_quotes() {
        assert_eq!(
            split_words(r#"bash -c 'echo $SHELL' "in $SCRATCH""#, vars).unwrap(),
            vec!["bash", "-c", "echo $SHELL", "in /scratch/me"]
        );
        assert_eq!(split_words("''", vars).unwrap(), vec![""]);
    }

    #[test]
    fn test_unset_variable_drops_word() {
        assert_eq!(split_words("$NOPE -l", vars).unwrap(), vec!["-l"]);
        assert_eq!(split_words("\"$NOPE\"", vars).unwrap(), vec![""]);
    }

    #[test]
    fn test_split_errors() {
        assert_eq!(
            split_words("bash 'oops", vars),
            Err(ShellSplitError::UnterminatedQuote('\''))
        );
        assert_eq!(split_words("x\\", vars), Err(ShellSplitError::TrailingBackslash));
        assert_eq!(split_words("${X", vars), Err(ShellSplitError::UnterminatedBrace));
    }

    #[test]
    fn test_lone_dollar_is_literal() {
        assert_eq!(split_words("cost $ 5", vars).unwrap(), vec!["cost", "$", "5"]);
    }
}
