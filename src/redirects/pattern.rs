// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pattern language for rule sources and targets.
//!
//! | syntax     | matches                                   | binds     |
//! |------------|-------------------------------------------|-----------|
//! | `api`      | exactly the segment `api`                 | –         |
//! | `:id`      | any single non-empty segment              | `id`      |
//! | `*`        | zero or more trailing segments (last only)| `splat`   |
//! | `key=val`  | query key `key` equal to `val`            | –         |
//! | `key=:val` | query key `key` with any value            | `val`     |

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Name bound by a trailing `*`.
pub const SPLAT: &str = "splat";

/// `:name` references inside a target template.
static PLACEHOLDER_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex"));

/// Values captured while matching one rule.
pub type Params = BTreeMap<String, String>;

/// Problems found while compiling a single pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("pattern must start with '/'")]
    NotAbsolute,

    #[error("'*' is only allowed as the last path segment")]
    MisplacedSplat,

    #[error("invalid placeholder ':{0}'")]
    InvalidPlaceholder(String),

    #[error("invalid query condition '{0}'")]
    InvalidQuery(String),

    #[error("target references unbound placeholder ':{0}'")]
    Unresolved(String),
}

/// Split a path into its non-empty segments. Repeated and trailing slashes
/// carry no meaning.
pub fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
    Splat,
}

/// Compiled path half of a rule's `from`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.trim().is_empty() {
            return Err(PatternError::Empty);
        }
        if !pattern.starts_with('/') {
            return Err(PatternError::NotAbsolute);
        }

        let parts = split_segments(pattern);
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = if *part == "*" {
                if i + 1 != parts.len() {
                    return Err(PatternError::MisplacedSplat);
                }
                Segment::Splat
            } else if part.contains('*') {
                return Err(PatternError::MisplacedSplat);
            } else if let Some(name) = part.strip_prefix(':') {
                if !is_identifier(name) {
                    return Err(PatternError::InvalidPlaceholder(name.to_string()));
                }
                Segment::Placeholder(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Names this pattern binds when it matches.
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Splat => Some(SPLAT),
            Segment::Literal(_) => None,
        })
    }

    /// Match a decoded request path, writing captures into `params`.
    pub fn matches(&self, path: &str, params: &mut Params) -> bool {
        let parts = split_segments(path);

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Splat => {
                    params.insert(SPLAT.to_string(), parts[i.min(parts.len())..].join("/"));
                    return true;
                }
                Segment::Literal(literal) => {
                    if parts.get(i) != Some(&literal.as_str()) {
                        return false;
                    }
                }
                Segment::Placeholder(name) => match parts.get(i) {
                    Some(value) => {
                        params.insert(name.clone(), (*value).to_string());
                    }
                    None => return false,
                },
            }
        }

        parts.len() == self.segments.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryValue {
    Literal(String),
    Placeholder(String),
}

/// Query-string conditions of a rule's `from`.
#[derive(Debug, Clone, Default)]
pub struct QueryPattern {
    conditions: Vec<(String, QueryValue)>,
}

impl QueryPattern {
    /// Add a `key` condition; `value` is a literal or `:name`.
    pub fn push(&mut self, key: &str, value: &str) -> Result<(), PatternError> {
        if key.is_empty() {
            return Err(PatternError::InvalidQuery(format!("{key}={value}")));
        }
        let value = match value.strip_prefix(':') {
            Some(name) if is_identifier(name) => QueryValue::Placeholder(name.to_string()),
            Some(name) => return Err(PatternError::InvalidPlaceholder(name.to_string())),
            None => QueryValue::Literal(value.to_string()),
        };
        self.conditions.push((key.to_string(), value));
        Ok(())
    }

    /// Parse a `key=value` token as written after the path in `from`.
    pub fn push_token(&mut self, token: &str) -> Result<(), PatternError> {
        match token.split_once('=') {
            Some((key, value)) => self.push(key, value),
            None => Err(PatternError::InvalidQuery(token.to_string())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().filter_map(|(_, v)| match v {
            QueryValue::Placeholder(name) => Some(name.as_str()),
            QueryValue::Literal(_) => None,
        })
    }

    /// Every declared key must be present; the first occurrence is used.
    pub fn matches(&self, pairs: &[(String, String)], params: &mut Params) -> bool {
        for (key, expected) in &self.conditions {
            let Some((_, actual)) = pairs.iter().find(|(k, _)| k == key) else {
                return false;
            };
            match expected {
                QueryValue::Literal(literal) => {
                    if actual != literal {
                        return false;
                    }
                }
                QueryValue::Placeholder(name) => {
                    params.insert(name.clone(), actual.clone());
                }
            }
        }
        true
    }
}

/// A rule's `to`, split into path and optional query templates.
#[derive(Debug, Clone)]
pub struct TargetTemplate {
    path: String,
    query: Option<String>,
}

impl TargetTemplate {
    /// Parse `to` and check that it only references names in `bound`.
    pub fn parse(target: &str, bound: &BTreeSet<&str>) -> Result<Self, PatternError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(PatternError::Empty);
        }

        for caps in PLACEHOLDER_REF.captures_iter(target) {
            let name = &caps[1];
            if !bound.contains(name) {
                return Err(PatternError::Unresolved(name.to_string()));
            }
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        Ok(Self { path, query })
    }

    /// True when the target points at another origin.
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with("http://") || self.path.starts_with("https://")
    }

    /// Whether `to` declared its own query string.
    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    /// Substitute captures into the path. Values stay decoded.
    pub fn render_path(&self, params: &Params) -> String {
        substitute(&self.path, params, |v| v.to_string())
    }

    /// Substitute captures into an absolute target. Values are
    /// percent-encoded so the result is a valid URL.
    pub fn render_url(&self, params: &Params) -> String {
        substitute(&self.path, params, super::encode_path)
    }

    /// Substitute captures into the query template, percent-encoding values.
    pub fn render_query(&self, params: &Params) -> Option<String> {
        self.query
            .as_ref()
            .map(|q| substitute(q, params, |v| urlencoding::encode(v).into_owned()))
    }
}

fn substitute(template: &str, params: &Params, encode: impl Fn(&str) -> String) -> String {
    PLACEHOLDER_REF
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => encode(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}
