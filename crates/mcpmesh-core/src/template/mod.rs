//! URI template engine.
//!
//! Templates have the shape `scheme://path{?q1,q2}`:
//!
//! - `{name}` captures a non-empty run of characters without `/`.
//! - `{name*}` ends the path and captures one or more remaining segments,
//!   joined with `/`.
//! - `{?a,b}` declares optional query parameters; missing ones fall back to
//!   declared defaults.
//!
//! Path captures are returned verbatim. Query values are form-decoded.
//!
//! ```rust
//! use mcpmesh_core::template::{QueryPolicy, UriTemplate};
//! use serde_json::json;
//!
//! let template = UriTemplate::parse("data://{id}{?format,version}")?
//!     .with_defaults(json!({"format": "json", "version": 1}).as_object().cloned().unwrap_or_default())?;
//!
//! let m = template.matches("data://42", QueryPolicy::Ignore).unwrap();
//! assert_eq!(m.params(), json!({"id": "42", "format": "json", "version": 1}).as_object().unwrap());
//! # Ok::<(), mcpmesh_core::error::McpError>(())
//! ```

mod overlap;
mod parse;

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::McpError;

/// What to do with query keys a template does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPolicy {
    /// Drop undeclared keys and keep matching.
    #[default]
    Ignore,
    /// An undeclared key makes the candidate not match.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Literal(String),
    Param(String),
    Wildcard(String),
}

impl Piece {
    fn name(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Param(name) | Self::Wildcard(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pieces: Vec<Piece>,
}

impl Segment {
    /// The segment text when it contains no expression.
    fn literal(&self) -> Option<&str> {
        match self.pieces.as_slice() {
            [] => Some(""),
            [Piece::Literal(lit)] => Some(lit),
            _ => None,
        }
    }

    fn ends_with_wildcard(&self) -> bool {
        matches!(self.pieces.last(), Some(Piece::Wildcard(_)))
    }
}

/// Ranking of a template among others matching the same identifier.
///
/// Greater is preferred: a longer literal prefix wins, then fewer
/// wildcard and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity {
    literal_prefix: usize,
    dynamic: Reverse<usize>,
}

impl Specificity {
    /// Characters of literal text before the first parameter.
    #[must_use]
    pub fn literal_prefix(&self) -> usize {
        self.literal_prefix
    }

    /// Number of wildcard and query parameters.
    #[must_use]
    pub fn dynamic_params(&self) -> usize {
        self.dynamic.0
    }
}

/// The parameters extracted from a matched identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateMatch {
    params: Map<String, Value>,
}

impl TemplateMatch {
    /// Look up a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Look up a parameter holding a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// All parameters.
    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Take the parameter map.
    #[must_use]
    pub fn into_params(self) -> Map<String, Value> {
        self.params
    }
}

/// A parsed URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    scheme: String,
    segments: Vec<Segment>,
    query: Vec<String>,
    defaults: Map<String, Value>,
}

impl UriTemplate {
    /// Parse a template.
    pub fn parse(template: &str) -> Result<Self, McpError> {
        parse::parse(template)
    }

    /// Attach defaults for query parameters.
    ///
    /// Every key must name a declared query parameter.
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Result<Self, McpError> {
        parse::check_defaults(&self, &defaults)?;
        self.defaults = defaults;
        Ok(self)
    }

    /// Whether a resource identifier contains template expressions.
    #[must_use]
    pub fn is_template(uri: &str) -> bool {
        uri.contains('{')
    }

    /// The template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The literal scheme.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Names of path parameters, in order.
    pub fn path_params(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .flat_map(|s| s.pieces.iter())
            .filter_map(Piece::name)
    }

    /// Names of declared query parameters, in order.
    #[must_use]
    pub fn query_params(&self) -> &[String] {
        &self.query
    }

    /// Declared defaults.
    #[must_use]
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Whether the path ends in a wildcard parameter.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.segments.last().is_some_and(Segment::ends_with_wildcard)
    }

    /// Match a concrete identifier.
    ///
    /// Returns `None` when the identifier is not a member of this template's
    /// family. The scheme is compared literally.
    #[must_use]
    pub fn matches(&self, uri: &str, policy: QueryPolicy) -> Option<TemplateMatch> {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        let rest = path.strip_prefix(self.scheme.as_str())?.strip_prefix("://")?;

        let parts: Vec<&str> = if self.has_wildcard() {
            rest.splitn(self.segments.len(), '/').collect()
        } else {
            rest.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            if !match_pieces(&segment.pieces, part, &mut captures) {
                return None;
            }
        }

        let mut params: Map<String, Value> = captures
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect();

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                if self.query.iter().any(|q| q.as_str() == key) {
                    if !params.contains_key(key.as_ref()) {
                        params.insert(key.into_owned(), Value::String(value.into_owned()));
                    }
                } else if policy == QueryPolicy::Reject {
                    return None;
                }
            }
        }

        for name in &self.query {
            if params.contains_key(name) {
                continue;
            }
            if let Some(default) = self.defaults.get(name) {
                params.insert(name.clone(), default.clone());
            }
        }

        Some(TemplateMatch { params })
    }

    /// This template's precedence rank.
    #[must_use]
    pub fn specificity(&self) -> Specificity {
        let mut literal_prefix = self.scheme.chars().count() + "://".len();
        'segments: for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                literal_prefix += 1;
            }
            for piece in &segment.pieces {
                match piece {
                    Piece::Literal(lit) => literal_prefix += lit.chars().count(),
                    _ => break 'segments,
                }
            }
        }
        let wildcards = usize::from(self.has_wildcard());
        Specificity {
            literal_prefix,
            dynamic: Reverse(wildcards + self.query.len()),
        }
    }

    /// Whether some identifier could match both templates.
    ///
    /// Conservative: literal segments are compared exactly, two
    /// parameterized segments are assumed to overlap unless their literal
    /// edges disagree.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        overlap::overlaps(self, other)
    }
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.defaults == other.defaults
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Greedy matcher with backtracking over the pieces of one segment.
fn match_pieces<'t, 'u>(
    pieces: &'t [Piece],
    input: &'u str,
    out: &mut Vec<(&'t str, &'u str)>,
) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return input.is_empty();
    };
    match first {
        Piece::Literal(lit) => input
            .strip_prefix(lit.as_str())
            .is_some_and(|tail| match_pieces(rest, tail, out)),
        Piece::Wildcard(name) => {
            if input.is_empty() {
                return false;
            }
            out.push((name, input));
            true
        }
        Piece::Param(name) => {
            let limit = input.find('/').unwrap_or(input.len());
            let mark = out.len();
            for end in (1..=limit).rev() {
                if !input.is_char_boundary(end) {
                    continue;
                }
                out.push((name, &input[..end]));
                if match_pieces(rest, &input[end..], out) {
                    return true;
                }
                out.truncate(mark);
            }
            false
        }
    }
}
