// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forwarding requests to another HTTP origin.

use hyper::header::{self, HeaderName, HeaderValue};
use hyper::HeaderMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::core::{DevError, DevRequest, DevResponse};
use crate::redirects::with_query;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Join a base URL with a path and optional query.
pub fn join_url(base: &str, path: &str, query: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    with_query(&format!("{base}{path}"), query)
}

#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    timeout: Duration,
}

impl Upstream {
    pub fn new(timeout_dur: Duration) -> Result<Self, DevError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(DevError::ClientError)?;
        Ok(Self {
            client,
            timeout: timeout_dur,
        })
    }

    /// Send `request` to `url` and buffer the reply.
    pub async fn forward(&self, url: &str, request: &DevRequest) -> Result<DevResponse, DevError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            if name == header::HOST || is_hop_by_hop(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        if let Some(addr) = request.remote_addr {
            if let Ok(ip) = HeaderValue::from_str(&addr.ip().to_string()) {
                headers.insert(HeaderName::from_static("x-forwarded-for"), ip);
            }
        }

        let started = Instant::now();
        let response = timeout(
            self.timeout,
            self.client
                .request(request.method.into(), url)
                .headers(headers)
                .body(request.body.clone())
                .send(),
        )
        .await
        .map_err(|_| DevError::Timeout(self.timeout))?
        .map_err(DevError::ClientError)?;

        let status = response.status().as_u16();
        let mut out = DevResponse::new(status);
        for (name, value) in response.headers() {
            if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
                continue;
            }
            out.headers.append(name.clone(), value.clone());
        }
        out.body = response.bytes().await.map_err(DevError::ClientError)?;

        log::debug!(
            "[upstream] {} {} -> {} in {:?}",
            request.method,
            url,
            status,
            started.elapsed()
        );
        Ok(out)
    }
}
