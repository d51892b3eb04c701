// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-request access logging with trace ids and timings.

use hyper::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::logging::config::LoggingConfig;

/// Generate a new trace ID
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request information kept for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub started: Instant,
}

impl RequestInfo {
    /// Time since the request was received.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Writes one line when a request arrives and one when it completes.
#[derive(Debug, Clone)]
pub struct AccessLog {
    config: Arc<LoggingConfig>,
}

impl AccessLog {
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Record an incoming request and allocate its trace id.
    pub fn begin(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        remote_addr: Option<SocketAddr>,
    ) -> RequestInfo {
        let trace_id = if self.config.propagate_trace_id {
            headers
                .get(self.config.trace_id_header.as_str())
                .and_then(|h| h.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(generate_trace_id)
        } else {
            generate_trace_id()
        };

        let info = RequestInfo {
            trace_id,
            method: method.to_string(),
            path: path.to_string(),
            remote_addr: remote_addr
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: headers
                .get(hyper::header::USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            started: Instant::now(),
        };

        if self.config.access_log {
            if self.config.structured {
                slog::debug!(slog_scope::logger(), "Request received";
                    "trace_id" => &info.trace_id,
                    "method" => &info.method,
                    "path" => &info.path,
                    "remote_addr" => &info.remote_addr,
                    "user_agent" => &info.user_agent
                );
            } else {
                log::debug!(
                    "Request received: {} {} from {} (trace_id: {})",
                    info.method,
                    info.path,
                    info.remote_addr,
                    info.trace_id
                );
            }
        }

        info
    }

    /// Record the completed response. `function_time` is the time spent
    /// inside a function invocation, if one ran.
    pub fn finish(&self, info: &RequestInfo, status: u16, function_time: Option<Duration>) {
        if !self.config.access_log {
            return;
        }

        let elapsed_ms = info.elapsed().as_millis();
        let function_ms = function_time.map(|d| d.as_millis()).unwrap_or(0);

        if self.config.structured {
            slog::info!(slog_scope::logger(), "Response completed";
                "trace_id" => &info.trace_id,
                "method" => &info.method,
                "path" => &info.path,
                "status" => status,
                "elapsed_ms" => elapsed_ms as u64,
                "function_ms" => function_ms as u64
            );
        } else {
            log::info!(
                "{} {} -> {} | total={}ms function={}ms (trace_id: {})",
                info.method,
                info.path,
                status,
                elapsed_ms,
                function_ms,
                info.trace_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn test_trace_id_is_propagated() {
        let log = AccessLog::new(LoggingConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_static("abc-123"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8"));

        let info = log.begin("GET", "/", &headers, None);
        assert_eq!(info.trace_id, "abc-123");
        assert_eq!(info.user_agent, "curl/8");
        assert_eq!(info.remote_addr, "unknown");
    }

    #[test]
    fn test_trace_id_generated_when_propagation_disabled() {
        let log = AccessLog::new(LoggingConfig {
            propagate_trace_id: false,
            ..LoggingConfig::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_static("abc-123"));

        let info = log.begin("POST", "/api", &headers, Some("127.0.0.1:5000".parse().unwrap()));
        assert_ne!(info.trace_id, "abc-123");
        assert_eq!(info.trace_id.len(), 36);
        assert_eq!(info.remote_addr, "127.0.0.1:5000");
    }
}
