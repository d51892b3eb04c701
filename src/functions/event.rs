// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The request descriptor passed to functions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::GeoConfig;
use crate::redirects::parse_query;

const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// A 26-character Crockford base32 id over 128 random bits.
pub fn generate_request_id() -> String {
    let value = uuid::Uuid::new_v4().as_u128();
    (0..26)
        .map(|i| CROCKFORD[((value >> (125 - 5 * i)) & 0x1f) as usize] as char)
        .collect()
}

/// Content types whose bodies travel as plain strings.
pub fn is_text_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence.starts_with("text/")
        || essence.contains("json")
        || essence.contains("xml")
        || essence.contains("javascript")
        || essence.contains("graphql")
        || essence == "application/x-www-form-urlencoded"
}

/// Borrowed view of the inbound request.
#[derive(Debug, Clone, Copy)]
pub struct EventParts<'a> {
    pub method: &'a str,
    /// Decoded path as originally requested
    pub path: &'a str,
    /// Full URL as the client sent it
    pub raw_url: &'a str,
    /// Query of the (possibly rewritten) target
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Metadata injected as `x-nf-*` headers.
#[derive(Debug, Clone)]
pub struct EventMetadata<'a> {
    pub request_id: &'a str,
    pub client_ip: Option<IpAddr>,
    pub geo: &'a GeoConfig,
    pub account_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    pub path: String,
    pub http_method: String,
    pub headers: BTreeMap<String, String>,
    pub multi_value_headers: BTreeMap<String, Vec<String>>,
    pub query_string_parameters: BTreeMap<String, String>,
    pub multi_value_query_string_parameters: BTreeMap<String, Vec<String>>,
    pub body: String,
    pub is_base64_encoded: bool,
    pub raw_url: String,
    pub raw_query: String,
}

impl InvocationEvent {
    pub fn new(parts: EventParts<'_>, meta: &EventMetadata<'_>) -> Self {
        let mut multi_value_headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in parts.headers {
            multi_value_headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        let mut injected = vec![
            ("x-nf-request-id", meta.request_id.to_string()),
            ("x-nf-geo", encode_geo(meta.geo)),
        ];
        if let Some(ip) = meta.client_ip {
            injected.push(("x-nf-client-connection-ip", ip.to_string()));
            injected.push(("x-forwarded-for", ip.to_string()));
        }
        if let Some(account) = meta.account_id {
            injected.push(("x-nf-account-id", account.to_string()));
        }
        for (name, value) in injected {
            multi_value_headers.insert(name.to_string(), vec![value]);
        }

        let headers = multi_value_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.join(", ")))
            .collect();

        let raw_query = parts.query.unwrap_or_default().to_string();
        let mut multi_value_query: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in parse_query(&raw_query) {
            multi_value_query.entry(k).or_default().push(v);
        }
        let query_string_parameters = multi_value_query
            .iter()
            .map(|(k, v)| (k.clone(), v.join(", ")))
            .collect();

        let content_type = parts
            .headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let (body, is_base64_encoded) = encode_body(parts.body, content_type);

        Self {
            path: parts.path.to_string(),
            http_method: parts.method.to_string(),
            headers,
            multi_value_headers,
            query_string_parameters,
            multi_value_query_string_parameters: multi_value_query,
            body,
            is_base64_encoded,
            raw_url: parts.raw_url.to_string(),
            raw_query,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.get("x-nf-request-id").map(String::as_str)
    }
}

fn encode_geo(geo: &GeoConfig) -> String {
    match serde_json::to_vec(geo) {
        Ok(json) => STANDARD.encode(json),
        Err(e) => {
            log::warn!("Failed to serialize geo metadata: {}", e);
            String::new()
        }
    }
}

fn encode_body(body: &[u8], content_type: &str) -> (String, bool) {
    if body.is_empty() {
        return (String::new(), false);
    }
    if is_text_content_type(content_type) {
        if let Ok(text) = std::str::from_utf8(body) {
            return (text.to_string(), false);
        }
    }
    (STANDARD.encode(body), true)
}
