//! Template grammar.
//!
//! ```text
//! template  = scheme "://" segment *( "/" segment ) [ "{?" name *( "," name ) "}" ]
//! segment   = *( literal / "{" name "}" ) [ "{" name "*}" ]   ; wildcard only in the final segment
//! ```

use serde_json::{Map, Value};

use crate::error::McpError;

use super::{Piece, Segment, UriTemplate};

pub(super) fn parse(template: &str) -> Result<UriTemplate, McpError> {
    let invalid = |reason: &str| McpError::invalid_template(template, reason);

    let (scheme, rest) = template
        .split_once("://")
        .ok_or_else(|| invalid("missing 'scheme://'"))?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(invalid("scheme must be a non-empty literal"));
    }

    let (path, query) = match rest.find("{?") {
        Some(idx) => {
            let expr = &rest[idx + 2..];
            let names = expr
                .strip_suffix('}')
                .filter(|inner| !inner.contains(is_brace))
                .ok_or_else(|| invalid("query expression must close the template"))?;
            let names = names
                .split(',')
                .map(|name| {
                    let name = name.trim();
                    validate_name(name).map(|()| name.to_string())
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| invalid(&reason))?;
            (&rest[..idx], names)
        }
        None => (rest, Vec::new()),
    };

    if path.contains('?') {
        return Err(invalid("literal query strings are not allowed in templates"));
    }

    let segments = path
        .split('/')
        .map(parse_segment)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| invalid(&reason))?;

    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        let wildcard_at = segment
            .pieces
            .iter()
            .position(|p| matches!(p, Piece::Wildcard(_)));
        if let Some(pos) = wildcard_at {
            if i != last || pos != segment.pieces.len() - 1 {
                return Err(invalid("a wildcard parameter must end the path"));
            }
        }
    }

    let mut seen: Vec<&str> = Vec::new();
    let path_names = segments.iter().flat_map(|s| s.pieces.iter()).filter_map(Piece::name);
    for name in path_names.chain(query.iter().map(String::as_str)) {
        if seen.contains(&name) {
            return Err(invalid(&format!("duplicate parameter '{name}'")));
        }
        seen.push(name);
    }

    Ok(UriTemplate {
        raw: template.to_string(),
        scheme: scheme.to_string(),
        segments,
        query,
        defaults: Map::new(),
    })
}

pub(super) fn check_defaults(
    template: &UriTemplate,
    defaults: &Map<String, Value>,
) -> Result<(), McpError> {
    for key in defaults.keys() {
        if !template.query.iter().any(|q| q == key) {
            return Err(McpError::invalid_template(
                &template.raw,
                format!("default '{key}' does not name a query parameter"),
            ));
        }
    }
    Ok(())
}

fn is_brace(c: char) -> bool {
    c == '{' || c == '}'
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    let mut pieces = Vec::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let Some(open) = rest.find(is_brace) else {
            pieces.push(Piece::Literal(rest.to_string()));
            break;
        };
        if rest[open..].starts_with('}') {
            return Err("unbalanced '}'".to_string());
        }
        if open > 0 {
            pieces.push(Piece::Literal(rest[..open].to_string()));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| "unclosed '{'".to_string())?;
        let expr = &after[..close];
        if expr.contains('{') {
            return Err("nested '{'".to_string());
        }
        if expr.starts_with('?') {
            return Err("query expression must close the template".to_string());
        }
        let piece = match expr.strip_suffix('*') {
            Some(name) => {
                validate_name(name)?;
                Piece::Wildcard(name.to_string())
            }
            None => {
                validate_name(expr)?;
                Piece::Param(expr.to_string())
            }
        };
        if pieces.last().is_some_and(|p| p.name().is_some()) {
            return Err("adjacent parameters need a literal between them".to_string());
        }
        pieces.push(piece);
        rest = &after[close + 1..];
    }
    Ok(Segment { pieces })
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty parameter name".to_string());
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("invalid parameter name '{name}'"));
    }
    Ok(())
}
