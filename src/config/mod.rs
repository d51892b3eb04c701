// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Site configuration subsystem
//!
//! A running dev server is created from an ordered list of
//! [`ConfigProvider`]s; later providers override earlier ones.  Typical
//! stacking order looks like this:
//!
//! 1. `FileConfigProvider` – `sitedev.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `SITEDEV_FUNCTIONS__TIMEOUT=10`
//! 3. *your* provider implementing [`ConfigProvider`]
//!
//! Object values are merged across providers, so an environment override of
//! `server.port` still shows up when the loader reads the whole `server`
//! table from the file.
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `server.host`          | string  | `127.0.0.1` | Address to bind               |
//! | `server.port`          | u16     | `8888`      | Port to bind                  |
//! | `server.body_limit`    | bytes   | 6 MiB       | Maximum inbound body size     |
//! | `site.publish`         | path    | `.`         | Static file root              |
//! | `functions.directory`  | path    | –           | Where functions are discovered|
//! | `functions.timeout`    | seconds | `30`        | Synchronous function timeout  |
//! | `redirects`            | array   | –           | Ordered redirect/rewrite rules|

mod env;
pub mod error;
mod file;
mod site;


pub use env::EnvConfigProvider;
pub use error::ConfigError;
pub use file::FileConfigProvider;
pub use site::{
    FunctionOverride, FunctionsConfig, GeoConfig, HttpsConfig, ServerConfig, SiteConfig,
};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::Arc;

/// Core configuration provider trait that all configuration sources must implement.
/// This trait is object-safe since it doesn't contain generic methods.
pub trait ConfigProvider: Debug + Send + Sync {
    /// Check if the configuration provider has a value for the given key.
    fn has(&self, key: &str) -> bool;

    /// Get the name of the configuration provider for debugging purposes.
    fn provider_name(&self) -> &str;

    /// Get a raw configuration value by key.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;

    /// Flat values stored *below* `prefix`, as `(relative.path, value)` pairs.
    ///
    /// Providers that keep dotted keys (environment variables) implement this
    /// so their overrides merge into objects read from other providers.
    fn nested(&self, prefix: &str) -> Vec<(String, Value)> {
        let _ = prefix;
        Vec::new()
    }
}

/// Extension trait for ConfigProvider that provides methods for typed access.
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a configuration value by key and deserialize it to the specified type.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

/// Builder for the configuration system.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration provider. Providers added later take precedence.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add a provider that is already shared.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// Holds all providers and resolves values across them.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Resolve a raw value, merging objects from every provider that knows `key`.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let mut merged: Option<Value> = None;

        for provider in &self.providers {
            if provider.has(key) {
                if let Some(value) = provider.get_raw(key)? {
                    merged = Some(match merged.take() {
                        Some(base) => merge_values(base, value),
                        None => value,
                    });
                }
            }

            for (path, value) in provider.nested(key) {
                let base = merged.get_or_insert_with(|| Value::Object(Map::new()));
                insert_path(base, &path, value);
            }
        }

        Ok(merged)
    }

    /// Get a configuration value by key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Get a configuration value by key with a default fallback value.
    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(key)? {
            Some(value) => Ok(value),
            None => Ok(default),
        }
    }

    /// Create a configuration backed by a single file.
    pub fn default_file(file_path: &str) -> Result<Self, ConfigError> {
        let provider = FileConfigProvider::new(file_path)?;
        Ok(Self::builder().with_provider(provider).build())
    }
}

/// Deep-merge `overlay` into `base`; non-object values in `overlay` win.
fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Write `value` at the dotted `path` inside `base`, creating objects on the way.
fn insert_path(base: &mut Value, path: &str, value: Value) {
    let mut current = base;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };

        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
