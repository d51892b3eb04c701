// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed views over the `server`, `site` and `functions` configuration tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Listener configuration (`server.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum buffered request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,

    /// Seconds to wait for open connections after a shutdown signal
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Serve HTTPS with these certificate files instead of plain HTTP
    #[serde(default)]
    pub https: Option<HttpsConfig>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_body_limit() -> usize {
    6 * 1024 * 1024
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit: default_body_limit(),
            shutdown_timeout: default_shutdown_timeout(),
            https: None,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Certificate and key in PEM format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// Static site settings (`site.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory served as the static file root
    #[serde(default = "default_publish")]
    pub publish: PathBuf,

    /// Explicit `_redirects` file; defaults to `<publish>/_redirects`
    #[serde(default)]
    pub redirects_file: Option<PathBuf>,

    /// Injected as `x-nf-account-id` into function events
    #[serde(default)]
    pub account_id: Option<String>,

    /// Framework dev server that receives requests no asset or function handles
    #[serde(default)]
    pub upstream: Option<String>,

    /// Geo-location stub injected as `x-nf-geo`
    #[serde(default)]
    pub geo: GeoConfig,

    /// Extra environment variables for function processes
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_publish() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            publish: default_publish(),
            redirects_file: None,
            account_id: None,
            upstream: None,
            geo: GeoConfig::default(),
            env: BTreeMap::new(),
        }
    }
}

/// A named code/name pair, e.g. a country or subdivision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoArea {
    pub code: String,
    pub name: String,
}

/// Geo-location metadata handed to functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoConfig {
    pub city: String,
    pub country: GeoArea,
    pub subdivision: GeoArea,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            city: "San Francisco".to_string(),
            country: GeoArea {
                code: "US".to_string(),
                name: "United States".to_string(),
            },
            subdivision: GeoArea {
                code: "CA".to_string(),
                name: "California".to_string(),
            },
            timezone: "America/Los_Angeles".to_string(),
            latitude: 37.7749,
            longitude: -122.4194,
        }
    }
}

/// Function settings (`functions.*`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionsConfig {
    /// Directory scanned for function entry points
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Timeout for synchronous functions, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// Timeout for `-background` functions, in seconds
    #[serde(default = "default_background_timeout")]
    pub background_timeout: f64,

    /// Per-function settings keyed by function name
    #[serde(default)]
    pub overrides: BTreeMap<String, FunctionOverride>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_background_timeout() -> f64 {
    900.0
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            timeout: default_timeout(),
            background_timeout: default_background_timeout(),
            overrides: BTreeMap::new(),
        }
    }
}

/// Settings for a single function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionOverride {
    /// Cron expression or macro (`@daily`); marks the function as scheduled
    #[serde(default)]
    pub schedule: Option<String>,
    /// Custom URL path routed to this function
    #[serde(default)]
    pub path: Option<String>,
    /// Timeout in seconds, overriding `functions.timeout`
    #[serde(default)]
    pub timeout: Option<f64>,
}
