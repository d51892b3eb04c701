// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – requests, responses, errors and the decision engine.
//!
//! Everything that physically moves through the dev server pipeline is
//! defined in this module. Socket handling sits in `server` and the
//! per-request decision logic in [`DevCore`].

mod engine;

#[cfg(test)]
mod tests;

use bytes::Bytes;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use engine::{DevCore, MAX_REWRITE_HOPS};

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum DevError {
    /// Upstream HTTP client error
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Timeout error
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Nothing handles the request
    #[error("routing error: {0}")]
    RoutingError(String),

    /// Mutating method on a path that only serves static content, or an
    /// unrecognized method
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// Request body exceeds `server.body_limit`
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Rewrite rules kept re-targeting the request
    #[error("rewrite loop detected for '{path}' after {hops} hops")]
    RewriteLoop { path: String, hops: usize },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<crate::config::ConfigError> for DevError {
    fn from(err: crate::config::ConfigError) -> Self {
        DevError::ConfigError(err.to_string())
    }
}

impl From<crate::redirects::RuleError> for DevError {
    fn from(err: crate::redirects::RuleError) -> Self {
        DevError::ConfigError(err.to_string())
    }
}

impl DevError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            DevError::Timeout(_) => 504,
            DevError::RoutingError(_) => 404,
            DevError::MethodNotAllowed => 405,
            DevError::BodyTooLarge(_) => 413,
            DevError::ClientError(_) => 502,
            _ => 500,
        }
    }

    /// Plain-text response describing this error.
    pub fn to_response(&self) -> DevResponse {
        let body = match self {
            DevError::MethodNotAllowed => "Method Not Allowed".to_string(),
            DevError::RoutingError(_) => "Not Found".to_string(),
            other => other.to_string(),
        };
        DevResponse::text(self.status_code(), body)
    }
}

/// HTTP methods understood by the dev server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
}

impl HttpMethod {
    /// Methods that static serving never accepts.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods outside the list above are answered with 405.
impl TryFrom<&hyper::Method> for HttpMethod {
    type Error = DevError;

    fn try_from(method: &hyper::Method) -> Result<Self, Self::Error> {
        Ok(match *method {
            hyper::Method::GET => HttpMethod::Get,
            hyper::Method::POST => HttpMethod::Post,
            hyper::Method::PUT => HttpMethod::Put,
            hyper::Method::DELETE => HttpMethod::Delete,
            hyper::Method::HEAD => HttpMethod::Head,
            hyper::Method::OPTIONS => HttpMethod::Options,
            hyper::Method::PATCH => HttpMethod::Patch,
            hyper::Method::TRACE => HttpMethod::Trace,
            hyper::Method::CONNECT => HttpMethod::Connect,
            _ => return Err(DevError::MethodNotAllowed),
        })
    }
}

impl From<HttpMethod> for hyper::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => hyper::Method::GET,
            HttpMethod::Post => hyper::Method::POST,
            HttpMethod::Put => hyper::Method::PUT,
            HttpMethod::Delete => hyper::Method::DELETE,
            HttpMethod::Head => hyper::Method::HEAD,
            HttpMethod::Options => hyper::Method::OPTIONS,
            HttpMethod::Patch => hyper::Method::PATCH,
            HttpMethod::Trace => hyper::Method::TRACE,
            HttpMethod::Connect => hyper::Method::CONNECT,
        }
    }
}

/// Percent-decode a request path. Invalid UTF-8 leaves the path as sent.
pub fn decode_path(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// A fully buffered inbound request.
#[derive(Debug, Clone)]
pub struct DevRequest {
    pub method: HttpMethod,
    /// Percent-decoded path used for matching and lookups
    pub path: String,
    /// Path exactly as the client sent it
    pub raw_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
    /// `http` or `https`
    pub scheme: &'static str,
}

impl DevRequest {
    /// Build a request from a method and a `path?query` target.
    pub fn new(method: HttpMethod, target: &str) -> Self {
        let (raw_path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path: decode_path(&raw_path),
            raw_path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            scheme: "http",
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether the `Accept` header mentions `mime`.
    pub fn accepts(&self, mime: &str) -> bool {
        self.header(header::ACCEPT)
            .is_some_and(|accept| accept.contains(mime))
    }

    /// The URL the client asked for.
    pub fn raw_url(&self) -> String {
        let host = self.header(header::HOST).unwrap_or("localhost");
        crate::redirects::with_query(
            &format!("{}://{}{}", self.scheme, host, self.raw_path),
            self.query.as_deref(),
        )
    }
}

/// A fully buffered outbound response.
#[derive(Debug, Clone)]
pub struct DevResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Time spent inside a function, when one produced this response
    pub function_time: Option<Duration>,
}

impl DevResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            function_time: None,
        }
    }

    pub fn with_body(status: u16, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        response.body = body.into();
        response
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::with_body(status, "text/plain; charset=utf-8", body.into())
    }

    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::with_body(status, "text/html; charset=utf-8", body.into())
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::with_body(status, "application/json", value.to_string())
    }

    /// An external redirect with a short human-readable body.
    pub fn redirect(status: u16, location: &str) -> Result<Self, DevError> {
        let value = HeaderValue::from_str(location)
            .map_err(|e| DevError::Other(format!("invalid redirect location '{location}': {e}")))?;
        let mut response = Self::text(status, format!("Redirecting to {location}"));
        response.headers.insert(header::LOCATION, value);
        Ok(response)
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
