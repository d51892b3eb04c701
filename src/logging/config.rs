// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for logging (`logging.*`).

use crate::logging::structured::{LogFormat, LoggerConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Use a `slog` drain instead of `env_logger`
    #[serde(default)]
    pub structured: bool,

    /// Structured output format (`terminal` or `json`)
    #[serde(default = "default_format")]
    pub format: String,

    /// Log level
    #[serde(default = "default_level")]
    pub level: String,

    /// Include the log target (module path)
    #[serde(default = "default_true")]
    pub include_location: bool,

    /// Log one line per request with timings
    #[serde(default = "default_true")]
    pub access_log: bool,

    /// Reuse an incoming trace id header instead of generating one
    #[serde(default = "default_true")]
    pub propagate_trace_id: bool,

    /// Header carrying the trace id
    #[serde(default = "default_trace_header")]
    pub trace_id_header: String,

    /// Static fields added to every structured record
    #[serde(default)]
    pub static_fields: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "terminal".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_trace_header() -> String {
    "x-trace-id".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            structured: false,
            format: default_format(),
            level: default_level(),
            include_location: true,
            access_log: true,
            propagate_trace_id: true,
            trace_id_header: default_trace_header(),
            static_fields: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Convert to the structured logger's configuration.
    pub fn to_logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: match self.format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Terminal,
            },
            level: match self.level.to_lowercase().as_str() {
                "trace" => slog::Level::Trace,
                "debug" => slog::Level::Debug,
                "warn" | "warning" => slog::Level::Warning,
                "error" => slog::Level::Error,
                "critical" => slog::Level::Critical,
                _ => slog::Level::Info,
            },
            static_fields: self.static_fields.clone(),
        }
    }
}
