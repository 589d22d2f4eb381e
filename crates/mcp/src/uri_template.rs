//! Matching of concrete resource URIs against `{variable}` templates.
//!
//! Templates and candidate URIs are split the same way: a leading
//! `scheme://` prefix is kept verbatim and the remainder is split on `/`.
//! A `{name}` segment binds exactly one non-empty candidate segment; every
//! other segment must match byte-for-byte, and segment counts must agree.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Variables extracted from a matched URI, keyed by placeholder name.
pub type Variables = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unbalanced braces in segment `{segment}`")]
    UnbalancedBraces { segment: String },

    #[error("empty variable name in segment `{segment}`")]
    EmptyVariable { segment: String },

    #[error("variable `{name}` appears more than once")]
    DuplicateVariable { name: String },

    #[error("placeholder must span a whole segment, got `{segment}`")]
    PartialSegment { segment: String },

    #[error("placeholders are not allowed in the scheme prefix `{prefix}`")]
    VariableInPrefix { prefix: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed URI template such as `user:///{userId}/profile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    prefix: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let (prefix, rest) = split_prefix(raw);
        if prefix.contains(['{', '}']) {
            return Err(TemplateError::VariableInPrefix {
                prefix: prefix.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::new();
        for segment in rest.split('/') {
            let parsed = parse_segment(segment)?;
            if let Segment::Variable(name) = &parsed {
                if !seen.insert(name.clone()) {
                    return Err(TemplateError::DuplicateVariable { name: name.clone() });
                }
            }
            segments.push(parsed);
        }

        Ok(Self {
            raw: raw.to_string(),
            prefix: prefix.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn is_literal(&self) -> bool {
        self.variables().next().is_none()
    }

    /// Match a concrete URI, returning the bound variables on success.
    pub fn matches(&self, uri: &str) -> Option<Variables> {
        let (prefix, rest) = split_prefix(uri);
        if prefix != self.prefix {
            return None;
        }

        let candidate: Vec<&str> = rest.split('/').collect();
        if candidate.len() != self.segments.len() {
            return None;
        }

        let mut variables = Variables::new();
        for (segment, value) in self.segments.iter().zip(candidate) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Variable(_) if value.is_empty() => return None,
                Segment::Variable(name) => {
                    variables.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(variables)
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for UriTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UriTemplate::parse(s)
    }
}

/// Find the first entry (in iteration order) whose template matches `uri`.
///
/// Registration order is the tie-break: two templates that both match the
/// same URI resolve to whichever the caller yields first.
pub fn resolve<'a, T>(
    uri: &str,
    entries: impl IntoIterator<Item = (&'a UriTemplate, T)>,
) -> Option<(T, Variables)> {
    entries
        .into_iter()
        .find_map(|(template, entry)| template.matches(uri).map(|variables| (entry, variables)))
}

fn split_prefix(uri: &str) -> (&str, &str) {
    match uri.find("://") {
        Some(index) => uri.split_at(index + "://".len()),
        None => ("", uri),
    }
}

fn parse_segment(segment: &str) -> Result<Segment, TemplateError> {
    let opens = segment.matches('{').count();
    let closes = segment.matches('}').count();
    if opens != closes || opens > 1 {
        return Err(TemplateError::UnbalancedBraces {
            segment: segment.to_string(),
        });
    }
    if opens == 0 {
        return Ok(Segment::Literal(segment.to_string()));
    }

    match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some("") => Err(TemplateError::EmptyVariable {
            segment: segment.to_string(),
        }),
        Some(name) => Ok(Segment::Variable(name.to_string())),
        None => Err(TemplateError::PartialSegment {
            segment: segment.to_string(),
        }),
    }
}
