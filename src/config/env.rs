// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable-based configuration provider implementation.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::env;

use super::ConfigError;
use super::ConfigProvider;

/// Separator between nesting levels inside a variable name.
const LEVEL_SEPARATOR: &str = "__";

/// Configuration provider that retrieves values from environment variables.
///
/// `SITEDEV_SERVER__PORT=9999` becomes the key `server.port`; single
/// underscores are kept, so `SITEDEV_SERVER__BODY_LIMIT` maps to
/// `server.body_limit`.
#[derive(Debug)]
pub struct EnvConfigProvider {
    /// Prefix for environment variables (e.g., "SITEDEV_").
    prefix: String,
    /// Variables that carry the prefix, keyed by their dotted config key.
    cache: BTreeMap<String, String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable configuration provider with the specified prefix.
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: BTreeMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the process environment.
    pub fn refresh_cache(&mut self) {
        self.cache.clear();

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(&self.prefix) {
                if stripped.is_empty() {
                    continue;
                }
                let config_key = stripped.to_lowercase().replace(LEVEL_SEPARATOR, ".");
                self.cache.insert(config_key, value);
            }
        }
    }

    /// Parse a string value into a JSON Value.
    fn parse_value_to_json(value: &str) -> Value {
        if let Ok(json_value) = serde_json::from_str(value) {
            return json_value;
        }

        if value.eq_ignore_ascii_case("true") {
            return json!(true);
        } else if value.eq_ignore_ascii_case("false") {
            return json!(false);
        }

        if let Ok(int_val) = value.parse::<i64>() {
            return json!(int_val);
        }

        if let Ok(float_val) = value.parse::<f64>() {
            return json!(float_val);
        }

        json!(value)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new("SITEDEV_")
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.cache.get(key).map(|v| Self::parse_value_to_json(v)))
    }

    fn nested(&self, prefix: &str) -> Vec<(String, Value)> {
        let scope = format!("{prefix}.");
        self.cache
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&scope)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_string(), Self::parse_value_to_json(value)))
            })
            .collect()
    }
}
