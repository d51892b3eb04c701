// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use hyper::header::{self, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{DevError, DevRequest, DevResponse, HttpMethod};
use crate::assets::{Asset, StaticResolver};
use crate::config::SiteConfig;
use crate::functions::schedule::{SCHEDULER_USER_AGENT, schedule_body};
use crate::functions::{
    EventMetadata, EventParts, FunctionEntry, FunctionInvoker, FunctionKind, FunctionRegistry,
    FunctionRoute, InvocationEvent, RouteKind, generate_request_id,
};
use crate::redirects::{RuleAction, RuleSet, encode_path};
use crate::shaper::{self, ShapeContext};
use crate::upstream::{Upstream, join_url};

/// Internal rewrites allowed per request before giving up.
pub const MAX_REWRITE_HOPS: usize = 16;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the rule pass left the request.
struct Target {
    path: String,
    query: Option<String>,
    status: Option<u16>,
    rewritten: bool,
}

/// Per-request decision engine shared by every connection.
#[derive(Debug)]
pub struct DevCore {
    rules: Arc<RuleSet>,
    assets: Arc<dyn StaticResolver>,
    invoker: FunctionInvoker,
    upstream: Upstream,
    site: SiteConfig,
}

impl DevCore {
    pub fn new(
        rules: RuleSet,
        assets: Arc<dyn StaticResolver>,
        invoker: FunctionInvoker,
        site: SiteConfig,
    ) -> Result<Self, DevError> {
        Ok(Self {
            rules: Arc::new(rules),
            assets,
            invoker,
            upstream: Upstream::new(UPSTREAM_TIMEOUT)?,
            site,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn registry(&self) -> &FunctionRegistry {
        self.invoker.registry()
    }

    /// Handle a request, reporting failures as error responses.
    pub async fn respond(&self, request: DevRequest) -> DevResponse {
        let method = request.method;
        let path = request.path.clone();
        match self.handle(request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    DevError::RoutingError(_) | DevError::MethodNotAllowed => {
                        log::debug!("{} {}: {}", method, path, err)
                    }
                    _ => log::error!("{} {}: {}", method, path, err),
                }
                err.to_response()
            }
        }
    }

    /// Decide what answers `request` and produce the response.
    pub async fn handle(&self, request: DevRequest) -> Result<DevResponse, DevError> {
        let target = match self.apply_rules(&request).await? {
            Ok(target) => target,
            Err(response) => return Ok(response),
        };

        if let Some(route) = self.registry().route(&target.path) {
            return self.call_function(&request, route, target.query.as_deref()).await;
        }

        if request.method.is_mutating() {
            if let Some(base) = &self.site.upstream {
                let url = join_url(base, &upstream_path(&request, &target), target.query.as_deref());
                return self.upstream.forward(&url, &request).await;
            }
            return Err(DevError::MethodNotAllowed);
        }

        if let Some(asset) = self.assets.resolve(&target.path).await? {
            return Ok(asset_response(asset, target.status.unwrap_or(200), request.method));
        }

        if let Some(base) = &self.site.upstream {
            let url = join_url(base, &upstream_path(&request, &target), target.query.as_deref());
            return self.upstream.forward(&url, &request).await;
        }

        if let Some(page) = self.assets.not_found_page().await? {
            return Ok(asset_response(page, 404, request.method));
        }
        Err(DevError::RoutingError(format!("no asset or function for '{}'", target.path)))
    }

    /// Run the rule matcher, following rewrites. `Ok(Err(response))` means a
    /// rule answered the request directly.
    async fn apply_rules(&self, request: &DevRequest) -> Result<Result<Target, DevResponse>, DevError> {
        let mut target = Target {
            path: request.path.clone(),
            query: request.query.clone(),
            status: None,
            rewritten: false,
        };
        if self.rules.is_empty() {
            return Ok(Ok(target));
        }

        let mut hops = 0;
        loop {
            // Existing assets and function routes only yield to forced rules.
            let shadowed = self.registry().route(&target.path).is_some()
                || self.assets.exists(&target.path).await;

            let Some(matched) = self
                .rules
                .evaluate(&target.path, target.query.as_deref(), shadowed)
            else {
                return Ok(Ok(target));
            };

            match matched.action {
                RuleAction::Redirect { status, location } => {
                    log::debug!("Redirecting '{}' to '{}' ({})", target.path, location, status);
                    return DevResponse::redirect(status, &location).map(Err);
                }
                RuleAction::Proxy { url, status } => {
                    log::debug!("Proxying '{}' to '{}'", target.path, url);
                    let mut response = self.upstream.forward(&url, request).await?;
                    if status != 200 {
                        response.status = status;
                    }
                    return Ok(Err(response));
                }
                RuleAction::Rewrite { path, query, status } => {
                    if status != 200 {
                        target.status = Some(status);
                    }
                    if path == target.path && query == target.query {
                        return Ok(Ok(target));
                    }
                    hops += 1;
                    if hops > MAX_REWRITE_HOPS {
                        return Err(DevError::RewriteLoop {
                            path: request.path.clone(),
                            hops: MAX_REWRITE_HOPS,
                        });
                    }
                    log::trace!("Rewriting '{}' to '{}'", target.path, path);
                    target.path = path;
                    target.query = query;
                    target.rewritten = true;
                }
            }
        }
    }

    async fn call_function(
        &self,
        request: &DevRequest,
        route: FunctionRoute,
        query: Option<&str>,
    ) -> Result<DevResponse, DevError> {
        let Some(entry) = self.registry().get(&route.name) else {
            return Ok(DevResponse::text(
                404,
                format!("Function not found: no function named '{}' exists", route.name),
            ));
        };

        let request_id = generate_request_id();
        let started = Instant::now();

        let mut response = match entry.kind {
            FunctionKind::Scheduled => {
                let event = self.scheduled_event(request, entry, &request_id);
                let result = self.invoker.invoke_entry(entry, event).await;
                shaper::help_response(request, &result)
            }
            FunctionKind::Background => {
                let event = self.event(request, query, &request.headers, &request.body, &request_id);
                self.invoker.spawn_background(entry, event);
                DevResponse::new(202)
            }
            FunctionKind::Synchronous => {
                let event = self.event(request, query, &request.headers, &request.body, &request_id);
                let result = self.invoker.invoke_entry(entry, event).await;
                let ctx = ShapeContext {
                    request_id: &request_id,
                    accept: request.header(header::ACCEPT),
                    builder: route.kind == RouteKind::Builders,
                    function_name: &entry.name,
                };
                shaper::shape(&result, &ctx)
            }
        };

        response.headers.remove(header::ETAG);
        if let Ok(id) = HeaderValue::from_str(&request_id) {
            response
                .headers
                .insert(HeaderName::from_static("x-nf-request-id"), id);
        }
        response.function_time = Some(started.elapsed());
        Ok(response)
    }

    fn event(
        &self,
        request: &DevRequest,
        query: Option<&str>,
        headers: &hyper::HeaderMap,
        body: &[u8],
        request_id: &str,
    ) -> InvocationEvent {
        self.event_with_method(request.method, request, query, headers, body, request_id)
    }

    fn event_with_method(
        &self,
        method: HttpMethod,
        request: &DevRequest,
        query: Option<&str>,
        headers: &hyper::HeaderMap,
        body: &[u8],
        request_id: &str,
    ) -> InvocationEvent {
        let raw_url = request.raw_url();
        InvocationEvent::new(
            EventParts {
                method: method.as_str(),
                path: &request.path,
                raw_url: &raw_url,
                query,
                headers,
                body,
            },
            &EventMetadata {
                request_id,
                client_ip: request.remote_addr.map(|a| a.ip()),
                geo: &self.site.geo,
                account_id: self.site.account_id.as_deref(),
            },
        )
    }

    /// The event the scheduler would send, rather than the HTTP request.
    fn scheduled_event(&self, request: &DevRequest, entry: &FunctionEntry, request_id: &str) -> InvocationEvent {
        let mut headers = request.headers.clone();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(SCHEDULER_USER_AGENT));
        headers.insert(HeaderName::from_static("x-nf-event"), HeaderValue::from_static("schedule"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = schedule_body(entry.schedule.as_deref(), chrono::Utc::now()).to_string();
        self.event_with_method(HttpMethod::Post, request, None, &headers, body.as_bytes(), request_id)
    }
}

/// Path to send upstream: as the client sent it unless a rule rewrote it.
fn upstream_path(request: &DevRequest, target: &Target) -> String {
    if target.rewritten {
        encode_path(&target.path)
    } else {
        request.raw_path.clone()
    }
}

fn asset_response(asset: Asset, status: u16, method: HttpMethod) -> DevResponse {
    let length = asset.body.len();
    let mut response = DevResponse::new(status);
    if let Ok(value) = HeaderValue::from_str(&asset.content_type) {
        response.headers.insert(header::CONTENT_TYPE, value);
    }
    if method == HttpMethod::Head {
        response.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        response.body = Bytes::new();
    } else {
        response.body = asset.body;
    }
    response
}
