// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Redirect and rewrite rules.
//!
//! Rules are compiled once at startup into a [`RuleSet`] and evaluated in
//! declaration order for every request. The first rule whose path and
//! query conditions match produces a [`RuleMatch`]; later rules are never
//! consulted.
//!
//! ```text
//! /api/*        /.netlify/functions/:splat   200
//! /old/:slug    /new/:slug                   301
//! /test id=:id  /?param=:id
//! ```

mod file;
pub mod pattern;

#[cfg(test)]
mod tests;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

pub use file::parse_redirects;
pub use pattern::{Params, PatternError, SPLAT};
use pattern::{PathPattern, QueryPattern, TargetTemplate};

/// A rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Source path pattern, optionally followed by `key=value` conditions
    pub from: String,
    /// Target path or URL, optionally with its own query string
    pub to: String,
    #[serde(default = "default_status", deserialize_with = "deserialize_status")]
    pub status: u16,
    #[serde(default)]
    pub force: bool,
    /// Query conditions, merged with any written inline in `from`
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

fn default_status() -> u16 {
    200
}

/// Accept `301`, `"301"` and `"301!"`. The `!` form is left to `force`.
fn deserialize_status<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .trim_end_matches('!')
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid status '{s}'"))),
    }
}

impl RuleConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            status: default_status(),
            force: false,
            query: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for RuleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.from)?;
        for (k, v) in &self.query {
            write!(f, " {k}={v}")?;
        }
        write!(f, " {} {}", self.to, self.status)?;
        if self.force {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// Load-time rule validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("redirect rule #{index} has an empty `from`")]
    EmptyFrom { index: usize },

    #[error("redirect rule #{index} has an empty `to`")]
    EmptyTo { index: usize },

    #[error("redirect rule #{index} ('{pattern}'): {source}")]
    Pattern {
        index: usize,
        pattern: String,
        #[source]
        source: PatternError,
    },

    #[error("redirect rule #{index} has unsupported status {status}")]
    InvalidStatus { index: usize, status: u16 },

    #[error("{origin}:{line}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        message: String,
    },
}

/// What a matched rule asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Answer with `Location: location` and the given 3xx status.
    Redirect { status: u16, location: String },
    /// Continue handling `path`/`query` internally. A non-200 status
    /// replaces the status of whatever the target produces.
    Rewrite {
        path: String,
        query: Option<String>,
        status: u16,
    },
    /// Forward the request to another origin.
    Proxy { url: String, status: u16 },
}

/// Outcome of a successful match. Computed per request.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule_index: usize,
    pub params: Params,
    pub target_path: String,
    pub target_query: Option<String>,
    pub status: u16,
    pub force: bool,
    pub action: RuleAction,
}

impl RuleMatch {
    pub fn is_redirect(&self) -> bool {
        matches!(self.action, RuleAction::Redirect { .. })
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    config: RuleConfig,
    path: PathPattern,
    query: QueryPattern,
    target: TargetTemplate,
}

impl Rule {
    pub fn compile(index: usize, config: RuleConfig) -> Result<Self, RuleError> {
        let mut tokens = config.from.split_whitespace();
        let Some(path_source) = tokens.next() else {
            return Err(RuleError::EmptyFrom { index });
        };
        if config.to.trim().is_empty() {
            return Err(RuleError::EmptyTo { index });
        }
        if !(200..=599).contains(&config.status) {
            return Err(RuleError::InvalidStatus {
                index,
                status: config.status,
            });
        }

        let pattern_err = |pattern: &str, source| RuleError::Pattern {
            index,
            pattern: pattern.to_string(),
            source,
        };

        let path = PathPattern::parse(path_source).map_err(|e| pattern_err(&config.from, e))?;

        let mut query = QueryPattern::default();
        for token in tokens {
            query
                .push_token(token)
                .map_err(|e| pattern_err(&config.from, e))?;
        }
        for (key, value) in &config.query {
            query
                .push(key, value)
                .map_err(|e| pattern_err(&config.from, e))?;
        }

        let bound: BTreeSet<&str> = path.bound_names().chain(query.bound_names()).collect();
        let target =
            TargetTemplate::parse(&config.to, &bound).map_err(|e| pattern_err(&config.to, e))?;

        Ok(Self {
            config,
            path,
            query,
            target,
        })
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    fn try_match(&self, path: &str, query_pairs: &[(String, String)]) -> Option<Params> {
        let mut params = Params::new();
        if !self.path.matches(path, &mut params) {
            return None;
        }
        if !self.query.matches(query_pairs, &mut params) {
            return None;
        }
        Some(params)
    }
}

/// Ordered, immutable set of compiled rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile rules in order. The first invalid rule aborts compilation.
    pub fn compile<I>(configs: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = RuleConfig>,
    {
        let rules = configs
            .into_iter()
            .enumerate()
            .map(|(i, c)| Rule::compile(i + 1, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate a decoded path and raw query against the rules.
    ///
    /// `static_exists` reports whether an asset exists at `path`; when it
    /// does only forced rules are considered.
    pub fn evaluate(&self, path: &str, raw_query: Option<&str>, static_exists: bool) -> Option<RuleMatch> {
        let pairs = parse_query(raw_query.unwrap_or_default());

        self.rules.iter().enumerate().find_map(|(index, rule)| {
            if static_exists && !rule.config.force {
                return None;
            }
            let params = rule.try_match(path, &pairs)?;
            log::trace!("Path '{}' matched redirect rule '{}'", path, rule.config);
            Some(build_match(index, rule, params, raw_query))
        })
    }
}

fn build_match(index: usize, rule: &Rule, params: Params, raw_query: Option<&str>) -> RuleMatch {
    let target_path = rule.target.render_path(&params);
    let target_query = if rule.target.has_query() {
        rule.target.render_query(&params).filter(|q| !q.is_empty())
    } else {
        raw_query.filter(|q| !q.is_empty()).map(str::to_string)
    };
    let status = rule.config.status;

    let action = if (300..400).contains(&status) {
        let base = if rule.target.is_absolute() {
            rule.target.render_url(&params)
        } else {
            encode_path(&target_path)
        };
        RuleAction::Redirect {
            status,
            location: with_query(&base, target_query.as_deref()),
        }
    } else if rule.target.is_absolute() {
        RuleAction::Proxy {
            url: with_query(&rule.target.render_url(&params), target_query.as_deref()),
            status,
        }
    } else {
        RuleAction::Rewrite {
            path: target_path.clone(),
            query: target_query.clone(),
            status,
        }
    };

    RuleMatch {
        rule_index: index,
        params,
        target_path,
        target_query,
        status,
        force: rule.config.force,
        action,
    }
}

/// Join a path and an optional raw query.
pub fn with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path.to_string(),
    }
}

/// Split a raw query string into decoded pairs, keeping order and repeats.
pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Characters escaped when a decoded path goes back on the wire. `/` and
/// the sub-delimiters stay readable.
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode a decoded path for use in a header or upstream URL.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPE).to_string()
}
