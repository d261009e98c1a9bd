//! Glob patterns for tag filters, artifact keys and output files.
//!
//! Patterns follow the filter syntax CI runners use for tags:
//! `*` matches any run of characters except `/`, `**` matches anything,
//! `?` matches one character except `/`, `[...]` is a character class
//! (`[!...]` negated) and `+` repeats the previous character one or more
//! times. Everything else is literal.

use crate::errors::ConfigError;
use regex::Regex;
use std::fmt;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compiles a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Pattern` if the pattern is empty or does not
    /// compile (for example a leading `+` or an empty class).
    pub fn new(pattern: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = pattern.into();
        if raw.is_empty() {
            return Err(ConfigError::Pattern {
                pattern: raw,
                reason: "pattern is empty".to_string(),
            });
        }
        if raw.starts_with('+') {
            return Err(ConfigError::Pattern {
                pattern: raw,
                reason: "'+' must follow a character".to_string(),
            });
        }

        let regex = Regex::new(&glob_to_regex(&raw)).map_err(|e| ConfigError::Pattern {
            pattern: raw.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self { raw, regex })
    }

    /// Returns a pattern matching every name that starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix itself contains invalid glob syntax.
    pub fn prefix(prefix: &str) -> Result<Self, ConfigError> {
        Self::new(format!("{prefix}*"))
    }

    /// Returns true if `candidate` matches the whole pattern.
    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    out.push_str(".*");
                    i += 1;
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '+' => out.push('+'),
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                Some(offset) => {
                    let class = &chars[i + 1..i + 1 + offset];
                    out.push('[');
                    let mut body = class;
                    if let Some(('!', rest)) = class.split_first() {
                        out.push('^');
                        body = rest;
                    }
                    for c in body {
                        if matches!(c, '\\' | '[' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(*c);
                    }
                    out.push(']');
                    i += offset + 1;
                }
                None => out.push_str(r"\["),
            },
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    out.push('$');
    out
}
