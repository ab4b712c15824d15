//! Route path templates.
//!
//! Templates use axum 0.8 syntax: literal segments, `{name}` captures and a
//! trailing `{*name}` catch-all. Matching is a segment-wise scan, the same
//! shape of matcher the gateway has always used for `{param}` templates.

use std::collections::{BTreeMap, HashSet};

use cardinal_kernel::RouterError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    CatchAll(&'a str),
}

fn invalid(path: &str, reason: impl Into<String>) -> RouterError {
    RouterError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_segment<'a>(path: &str, segment: &'a str) -> Result<Segment<'a>, RouterError> {
    if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let (name, catch_all) = match inner.strip_prefix('*') {
            Some(name) => (name, true),
            None => (inner, false),
        };
        if !is_identifier(name) {
            return Err(invalid(path, format!("bad capture name in '{segment}'")));
        }
        return Ok(if catch_all {
            Segment::CatchAll(name)
        } else {
            Segment::Param(name)
        });
    }

    if segment.starts_with(':') {
        return Err(invalid(path, "':param' captures are not supported, use '{param}'"));
    }
    if segment.starts_with('*') {
        return Err(invalid(path, "wildcards must be written '{*name}'"));
    }
    if segment.contains(['{', '}']) {
        return Err(invalid(path, "a capture must span a whole segment"));
    }
    if segment.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
        return Err(invalid(path, "path contains reserved characters"));
    }
    Ok(Segment::Literal(segment))
}

fn parse(path: &str) -> Result<Vec<Segment<'_>>, RouterError> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid(path, "must start with '/'"));
    };
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<&str> = rest.split('/').collect();
    let mut segments = Vec::with_capacity(raw.len());
    let mut names = HashSet::new();
    for (i, part) in raw.iter().enumerate() {
        if part.is_empty() {
            return Err(invalid(path, "empty path segment"));
        }
        let segment = parse_segment(path, part)?;
        match segment {
            Segment::CatchAll(_) if i + 1 != raw.len() => {
                return Err(invalid(path, "catch-all must be the last segment"));
            }
            Segment::Param(name) | Segment::CatchAll(name) if !names.insert(name) => {
                return Err(invalid(path, format!("capture '{name}' used twice")));
            }
            _ => {}
        }
        segments.push(segment);
    }
    Ok(segments)
}

/// Check a full route path.
pub fn validate(path: &str) -> Result<(), RouterError> {
    parse(path).map(|_| ())
}

/// Path under which a template is mounted in the axum router.
///
/// Capture names are replaced by positional ones so that templates differing
/// only in capture names land on the same axum route instead of clashing.
pub fn routing_key(path: &str) -> Result<String, RouterError> {
    let segments = parse(path)?;
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    let mut key = String::new();
    for (i, segment) in segments.iter().enumerate() {
        key.push('/');
        match segment {
            Segment::Literal(s) => key.push_str(s),
            Segment::Param(_) => key.push_str(&format!("{{p{i}}}")),
            Segment::CatchAll(_) => key.push_str(&format!("{{*p{i}}}")),
        }
    }
    Ok(key)
}

/// `(preceding key, is catch-all)` for every capture of a routing key.
fn capture_slots(key: &str) -> Vec<(String, bool)> {
    let mut slots = Vec::new();
    let mut prefix = String::new();
    for segment in key.split('/').skip(1) {
        if segment.starts_with("{*") {
            slots.push((prefix.clone(), true));
        } else if segment.starts_with('{') {
            slots.push((prefix.clone(), false));
        }
        prefix.push('/');
        prefix.push_str(segment);
    }
    slots
}

/// True when two routing keys put a `{param}` and a `{*catch_all}` at the
/// same position after identical leading segments. axum refuses to mount
/// such a pair.
pub fn keys_clash(a: &str, b: &str) -> bool {
    let other = capture_slots(b);
    capture_slots(a)
        .iter()
        .any(|(p, c)| other.iter().any(|(q, d)| p == q && c != d))
}

/// Match a concrete request path against a template such as `/items/{id}`.
///
/// Returns the captured values, or `None` when the path does not fit.
pub fn match_path(template: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let segments = parse(template).ok()?;
    let parts: Vec<&str> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();

    let mut params = BTreeMap::new();
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::CatchAll(name) => {
                params.insert(name.to_string(), parts.get(i..)?.join("/"));
                return Some(params);
            }
            Segment::Param(name) => {
                params.insert(name.to_string(), (*parts.get(i)?).to_string());
            }
            Segment::Literal(lit) => {
                if parts.get(i) != Some(lit) {
                    return None;
                }
            }
        }
    }
    (parts.len() == segments.len()).then_some(params)
}
