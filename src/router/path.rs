//! Route patterns: `/product/:id`, `/user/*`.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Key under which a wildcard capture is stored.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("wildcard must be the last segment of `{0}`")]
    WildcardNotLast(String),
    #[error("parameter `{name}` appears twice in `{pattern}`")]
    DuplicateParam { pattern: String, name: String },
    #[error("empty parameter name in `{0}`")]
    EmptyParam(String),
}

/// A compiled route pattern.
///
/// Empty segments are ignored, so `/a/`, `a` and `/a` compile to the same pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Result<Pattern, PatternError> {
        let parts: Vec<&str> = split(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = if *part == WILDCARD {
                if i + 1 != parts.len() {
                    return Err(PatternError::WildcardNotLast(pattern.to_string()));
                }
                Segment::Wildcard
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(pattern.to_string()));
                }
                let taken = segments
                    .iter()
                    .any(|seg| matches!(seg, Segment::Param(existing) if existing == name));
                if taken {
                    return Err(PatternError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Pattern {
            raw: format!("/{}", parts.join("/")),
            segments,
        })
    }

    /// The canonical form: leading slash, no empty segments.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard))
    }

    /// Prepends `prefix`'s segments to this pattern.
    pub fn prefixed(&self, prefix: &str) -> Result<Pattern, PatternError> {
        Pattern::compile(&join(prefix, &self.raw))
    }

    /// Matches `path` and returns the captured parameters.
    ///
    /// Values are percent-decoded when that yields valid UTF-8 and kept raw otherwise.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = split(path).collect();
        let fixed = if self.has_wildcard() {
            self.segments.len() - 1
        } else {
            self.segments.len()
        };

        if parts.len() < fixed || (!self.has_wildcard() && parts.len() != fixed) {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts.iter()) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), decode(part));
                }
                Segment::Wildcard => {}
            }
        }

        if self.has_wildcard() {
            let rest: Vec<String> = parts[fixed..].iter().map(|part| decode(part)).collect();
            params.insert(WILDCARD.to_string(), rest.join("/"));
        }

        Some(params)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Joins two path fragments with exactly one `/` between them.
pub(crate) fn join(prefix: &str, path: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn decode(part: &str) -> String {
    match urlencoding::decode(part) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => part.to_string(),
    }
}
