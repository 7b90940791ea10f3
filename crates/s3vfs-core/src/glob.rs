//! Glob matching over `/`-separated object keys.
//!
//! Each pattern segment may use `*`, `?`, `[...]` and `[!...]`; a segment
//! that is exactly `**` matches any number of key segments, including none.

use regex::Regex;

use crate::error::{Result, S3FsError};

/// Characters that make a pattern a glob.
const WILDCARDS: [char; 3] = ['*', '[', '\\'];

/// Whether `pattern` contains glob syntax.
#[must_use]
pub fn has_glob(pattern: &str) -> bool {
    pattern.contains(WILDCARDS) || pattern.contains('?')
}

/// Index of the first glob character in `key`, if any.
///
/// `?` is not treated as a wildcard here: in S3 URLs it starts the option
/// query, which is split off before matching.
#[must_use]
pub fn first_wildcard(key: &str) -> Option<usize> {
    key.find(WILDCARDS)
}

/// One compiled pattern segment.
#[derive(Debug)]
enum Segment {
    /// `**`.
    Any,
    Pattern(Regex),
}

/// A compiled multi-segment glob.
#[derive(Debug)]
pub struct GlobPattern {
    segments: Vec<Segment>,
}

impl GlobPattern {
    /// Compile `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::InvalidOption`] for an unterminated `[`.
    pub fn new(pattern: &str) -> Result<Self> {
        let segments = pattern
            .split('/')
            .map(|segment| {
                if segment == "**" {
                    Ok(Segment::Any)
                } else {
                    segment_regex(segment).map(Segment::Pattern)
                }
            })
            .collect::<Result<_>>()?;
        Ok(Self { segments })
    }

    /// Whether `path` matches the whole pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::Any, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((Segment::Pattern(regex), rest)) => match parts.split_first() {
            Some((part, remaining)) => regex.is_match(part) && match_segments(rest, remaining),
            None => false,
        },
    }
}

fn segment_regex(segment: &str) -> Result<Regex> {
    let mut out = String::from("^");
    let mut chars = segment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '[' => {
                let mut class = String::from("[");
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if matches!(c, '\\' | '[' | '^' | '&' | '~') {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if !closed {
                    return Err(S3FsError::InvalidOption(format!(
                        "Invalid glob pattern '{segment}': unterminated '['"
                    )));
                }
                class.push(']');
                out.push_str(&class);
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).map_err(|e| {
        S3FsError::InvalidOption(format!("Invalid glob pattern '{segment}': {e}"))
    })
}
