//! Message path grammar: `subsystem://segment(/segment)*`.
//!
//! Bit-exact with spec.md §6:
//!
//! ```text
//! path     = subsystem "://" segment ("/" segment)*
//! subsystem= [A-Za-z][A-Za-z0-9_-]*
//! segment  = literal | param
//! param    = "{" identifier "}"
//! literal  = [^/{}]+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PathError;

/// A parsed message path: the subsystem scheme plus its slash-separated
/// segments, in order. Segments are kept as plain strings; whether a
/// segment is a param placeholder (`{name}`) is only meaningful on the
/// *pattern* side of route matching (see [`crate::router::RoutePattern`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessagePath {
    raw: String,
    subsystem_end: usize,
}

impl MessagePath {
    /// Parses and validates a path string per the grammar above.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Malformed`] if the string doesn't contain
    /// `://`, the subsystem segment doesn't match `[A-Za-z][A-Za-z0-9_-]*`,
    /// or any path segment is empty.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PathError> {
        let raw = raw.into();
        let scheme_idx = raw.find("://").ok_or_else(|| PathError::Malformed {
            path: raw.clone(),
            reason: "missing '://' separator".to_string(),
        })?;

        let subsystem = &raw[..scheme_idx];
        validate_subsystem(subsystem, &raw)?;

        let rest = &raw[scheme_idx + 3..];
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(PathError::Malformed {
                    path: raw.clone(),
                    reason: "empty path segment".to_string(),
                });
            }
        }

        Ok(Self {
            subsystem_end: scheme_idx,
            raw,
        })
    }

    /// The subsystem name prefix (before `://`).
    #[must_use]
    pub fn subsystem(&self) -> &str {
        &self.raw[..self.subsystem_end]
    }

    /// The path segments after `://`, in order.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        self.raw[self.subsystem_end + 3..].split('/').collect()
    }

    /// The full path string, as originally constructed.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Auto-detects whether this path is a query path, per spec.md §6:
    /// `^[^:]+://query/`. A bare `subsystem://query` with nothing after it
    /// does not match the grammar's trailing path and so is not a query.
    #[must_use]
    pub fn is_query(&self) -> bool {
        let segments = self.segments();
        segments.len() >= 2 && segments[0] == "query"
    }

    /// Whether this path names a one-shot reply route
    /// (`<subsystem>://reply/<messageId>`, spec.md §4.10 step 3).
    #[must_use]
    pub fn is_reply(&self) -> bool {
        let segments = self.segments();
        segments.len() == 2 && segments[0] == "reply"
    }

    /// Builds the derived event emission path for this path's last segment,
    /// per spec.md §6: `<subsystem>://event/<lastSegment>`.
    #[must_use]
    pub fn derived_event_path(&self) -> Self {
        let last = self.segments().last().copied().unwrap_or("");
        Self::parse(format!("{}://event/{}", self.subsystem(), last))
            .expect("subsystem and a non-empty literal always form a valid path")
    }
}

impl fmt::Display for MessagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn validate_subsystem(subsystem: &str, full_path: &str) -> Result<(), PathError> {
    let mut chars = subsystem.chars();
    let starts_valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic());
    let rest_valid = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if starts_valid && rest_valid {
        Ok(())
    } else {
        Err(PathError::Malformed {
            path: full_path.to_string(),
            reason: "subsystem must match [A-Za-z][A-Za-z0-9_-]*".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path() {
        let p = MessagePath::parse("canvas://layers/42").unwrap();
        assert_eq!(p.subsystem(), "canvas");
        assert_eq!(p.segments(), vec!["layers", "42"]);
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(MessagePath::parse("canvas/layers").is_err());
    }

    #[test]
    fn rejects_subsystem_starting_with_digit() {
        assert!(MessagePath::parse("1canvas://layers").is_err());
    }

    #[test]
    fn rejects_empty_segment() {
        assert!(MessagePath::parse("canvas://layers//42").is_err());
    }

    #[test]
    fn detects_query_paths() {
        assert!(MessagePath::parse("store://query/get").unwrap().is_query());
        assert!(!MessagePath::parse("store://command/set").unwrap().is_query());
    }

    #[test]
    fn bare_query_with_no_trailing_segment_is_not_a_query_path() {
        assert!(!MessagePath::parse("store://query").unwrap().is_query());
    }

    #[test]
    fn detects_reply_paths() {
        assert!(MessagePath::parse("caller://reply/abc").unwrap().is_reply());
        assert!(!MessagePath::parse("caller://reply/abc/extra").unwrap().is_reply());
        assert!(!MessagePath::parse("caller://command/set").unwrap().is_reply());
    }

    #[test]
    fn derives_event_path_from_last_segment() {
        let p = MessagePath::parse("canvas://layers/42").unwrap();
        assert_eq!(p.derived_event_path().as_str(), "canvas://event/42");
    }
}
