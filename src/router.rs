//! Local (in-subsystem) router: an ordered list of path patterns with
//! `{param}` placeholders, matched first-match-wins in registration order
//! (spec.md §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RouteError;
use crate::message::Message;

/// A handler invoked when a route matches. Handlers receive the message
/// and the params extracted from its path, and return a JSON result (used
/// verbatim as `meta.queryResult` for query messages) or an error.
pub type RouteHandler = Arc<
    dyn Fn(
            &Message,
            &HashMap<String, String>,
        ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync,
>;

/// Arbitrary metadata a caller may attach to a route registration (e.g. the
/// required ACL rights consulted by the kernel, or documentation).
pub type RouteMetadata = HashMap<String, Value>;

/// A compiled route pattern: literal segments match exactly, `{name}`
/// segments bind a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    subsystem: String,
    segments: Vec<PatternSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
}

impl RoutePattern {
    /// Parses a pattern string of the same grammar as [`crate::message::MessagePath`],
    /// except segments may additionally be `{identifier}` params.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidPattern`] if the string lacks `://`,
    /// the subsystem doesn't match `[A-Za-z][A-Za-z0-9_-]*`, a segment is
    /// empty, or a `{...}` placeholder is malformed.
    pub fn parse(pattern: impl Into<String>) -> Result<Self, RouteError> {
        let raw = pattern.into();
        let scheme_idx = raw.find("://").ok_or_else(|| RouteError::InvalidPattern {
            pattern: raw.clone(),
            reason: "missing '://' separator".to_string(),
        })?;
        let subsystem = raw[..scheme_idx].to_string();

        let segments = raw[scheme_idx + 3..]
            .split('/')
            .map(|segment| parse_segment(segment, &raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw,
            subsystem,
            segments,
        })
    }

    /// Matches a concrete path's segments against this pattern, returning
    /// the bound parameter map if it matches.
    #[must_use]
    fn matches(&self, subsystem: &str, path_segments: &[&str]) -> Option<HashMap<String, String>> {
        if subsystem != self.subsystem || path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern_seg, actual) in self.segments.iter().zip(path_segments) {
            match pattern_seg {
                PatternSegment::Literal(lit) if lit == actual => {}
                PatternSegment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
                PatternSegment::Literal(_) => return None,
            }
        }
        Some(params)
    }

    /// The pattern's original string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_segment(segment: &str, full_pattern: &str) -> Result<PatternSegment, RouteError> {
    if segment.is_empty() {
        return Err(RouteError::InvalidPattern {
            pattern: full_pattern.to_string(),
            reason: "empty path segment".to_string(),
        });
    }
    if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        if name.is_empty() {
            return Err(RouteError::InvalidPattern {
                pattern: full_pattern.to_string(),
                reason: "empty param name".to_string(),
            });
        }
        Ok(PatternSegment::Param(name.to_string()))
    } else if segment.contains('{') || segment.contains('}') {
        Err(RouteError::InvalidPattern {
            pattern: full_pattern.to_string(),
            reason: "unbalanced '{'/'}' in segment".to_string(),
        })
    } else {
        Ok(PatternSegment::Literal(segment.to_string()))
    }
}

struct RouteEntry {
    pattern: RoutePattern,
    handler: RouteHandler,
    metadata: RouteMetadata,
}

/// The result of a successful [`Router::matches`] lookup: the matched
/// handler, its registration metadata, and the params bound from the path.
pub struct RouteMatch<'a> {
    /// The handler to invoke.
    pub handler: &'a RouteHandler,
    /// Metadata attached at registration time.
    pub metadata: &'a RouteMetadata,
    /// Parameters bound from `{name}` placeholders.
    pub params: HashMap<String, String>,
}

/// An ordered collection of `(pattern, handler, metadata)` triples,
/// matched first-registered-wins (spec.md §4.4).
#[derive(Default)]
pub struct Router {
    routes: Vec<RouteEntry>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Registers a route. Rejects an exact duplicate pattern unless
    /// `overwrite` is set, in which case the prior registration is replaced
    /// in place (keeping its original position, so match order is
    /// unaffected by the overwrite).
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidPattern`] if `path` fails to parse, or
    /// [`RouteError::DuplicatePattern`] if the pattern is already
    /// registered and `overwrite` is `false`.
    pub fn register_route(
        &mut self,
        path: impl Into<String>,
        handler: RouteHandler,
        metadata: RouteMetadata,
        overwrite: bool,
    ) -> Result<(), RouteError> {
        let pattern = RoutePattern::parse(path)?;
        if let Some(existing) = self.routes.iter_mut().find(|e| e.pattern == pattern) {
            if overwrite {
                existing.handler = handler;
                existing.metadata = metadata;
                return Ok(());
            }
            return Err(RouteError::DuplicatePattern {
                pattern: pattern.as_str().to_string(),
            });
        }

        self.routes.push(RouteEntry {
            pattern,
            handler,
            metadata,
        });
        Ok(())
    }

    /// Finds the first registered pattern matching `path`, in registration
    /// order.
    #[must_use]
    pub fn matches(&self, subsystem: &str, path_segments: &[&str]) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|entry| {
            entry
                .pattern
                .matches(subsystem, path_segments)
                .map(|params| RouteMatch {
                    handler: &entry.handler,
                    metadata: &entry.metadata,
                    params,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_handler() -> RouteHandler {
        Arc::new(|_msg, _params| Ok(json!(null)))
    }

    #[test]
    fn matches_literal_route() {
        let mut r = Router::new();
        r.register_route("canvas://layers/list", noop_handler(), HashMap::new(), false)
            .unwrap();
        assert!(r.matches("canvas", &["layers", "list"]).is_some());
        assert!(r.matches("canvas", &["layers", "other"]).is_none());
    }

    #[test]
    fn matches_and_extracts_param() {
        let mut r = Router::new();
        r.register_route("canvas://layers/{id}", noop_handler(), HashMap::new(), false)
            .unwrap();
        let m = r.matches("canvas", &["layers", "42"]).unwrap();
        assert_eq!(m.params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn first_registered_route_wins() {
        let mut r = Router::new();
        r.register_route(
            "a://{x}",
            Arc::new(|_m, _p| Ok(json!("first"))),
            HashMap::new(),
            false,
        )
        .unwrap();
        r.register_route(
            "a://literal",
            Arc::new(|_m, _p| Ok(json!("second"))),
            HashMap::new(),
            false,
        )
        .unwrap();

        let m = r.matches("a", &["literal"]).unwrap();
        let result = (m.handler)(&dummy_message(), &m.params).unwrap();
        assert_eq!(result, json!("first"));
    }

    #[test]
    fn duplicate_pattern_rejected_without_overwrite() {
        let mut r = Router::new();
        r.register_route("a://b", noop_handler(), HashMap::new(), false)
            .unwrap();
        assert!(
            r.register_route("a://b", noop_handler(), HashMap::new(), false)
                .is_err()
        );
        assert!(
            r.register_route("a://b", noop_handler(), HashMap::new(), true)
                .is_ok()
        );
    }

    fn dummy_message() -> Message {
        crate::message::MessageFactory::new()
            .create("a://literal", json!(null))
            .unwrap()
    }
}
