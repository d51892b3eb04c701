// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::assets::DirResolver;
    use crate::config::{FunctionOverride, FunctionsConfig, SiteConfig};
    use crate::core::{DevCore, DevError, DevRequest, HttpMethod, MAX_REWRITE_HOPS};
    use crate::functions::{FunctionInvoker, FunctionRegistry, InProcessFunction, InvocationEvent};
    use crate::redirects::{RuleConfig, RuleSet};
    use hyper::header::{ACCEPT, CONTENT_TYPE, LOCATION};
    use serde_json::{Value, json};
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn echo() -> InProcessFunction {
        InProcessFunction::new(|event: InvocationEvent, _| async move {
            Ok(json!({
                "statusCode": 200,
                "headers": { "content-type": "application/json", "etag": "\"x\"" },
                "body": serde_json::to_string(&event).unwrap(),
            }))
        })
    }

    struct Site {
        dir: TempDir,
        rules: Vec<RuleConfig>,
        functions: Vec<(&'static str, InProcessFunction)>,
        config: FunctionsConfig,
    }

    impl Site {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
            fs::write(dir.path().join("about.html"), "about").unwrap();
            Self {
                dir,
                rules: Vec::new(),
                functions: vec![("echo", echo())],
                config: FunctionsConfig::default(),
            }
        }

        fn rule(mut self, rule: RuleConfig) -> Self {
            self.rules.push(rule);
            self
        }

        fn function(mut self, name: &'static str, f: InProcessFunction) -> Self {
            self.functions.push((name, f));
            self
        }

        fn file(self, name: &str, content: &str) -> Self {
            fs::write(self.dir.path().join(name), content).unwrap();
            self
        }

        fn core(&self) -> DevCore {
            let mut registry = FunctionRegistry::new(self.config.clone());
            for (name, f) in &self.functions {
                registry.register(name, Arc::new(f.clone())).unwrap();
            }
            DevCore::new(
                RuleSet::compile(self.rules.clone()).unwrap(),
                Arc::new(DirResolver::new(self.dir.path())),
                FunctionInvoker::new(Arc::new(registry), Default::default()),
                SiteConfig::default(),
            )
            .unwrap()
        }
    }

    fn event_of(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn test_http_method_try_from() {
        assert_eq!(HttpMethod::try_from(&hyper::Method::GET).unwrap(), HttpMethod::Get);
        assert_eq!(HttpMethod::try_from(&hyper::Method::POST).unwrap(), HttpMethod::Post);
        assert_eq!(HttpMethod::try_from(&hyper::Method::PATCH).unwrap(), HttpMethod::Patch);

        let propfind = hyper::Method::from_bytes(b"PROPFIND").unwrap();
        assert!(matches!(
            HttpMethod::try_from(&propfind),
            Err(DevError::MethodNotAllowed)
        ));
        assert_eq!(hyper::Method::from(HttpMethod::Delete), hyper::Method::DELETE);
        assert_eq!(HttpMethod::Options.to_string(), "OPTIONS");
    }

    #[test]
    fn test_mutating_methods() {
        assert!(HttpMethod::Post.is_mutating());
        assert!(HttpMethod::Put.is_mutating());
        assert!(HttpMethod::Patch.is_mutating());
        assert!(HttpMethod::Delete.is_mutating());
        assert!(!HttpMethod::Get.is_mutating());
        assert!(!HttpMethod::Head.is_mutating());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(DevError::Timeout(Duration::from_secs(1)).status_code(), 504);
        assert_eq!(DevError::RoutingError("x".into()).status_code(), 404);
        assert_eq!(DevError::MethodNotAllowed.status_code(), 405);
        assert_eq!(DevError::BodyTooLarge(10).status_code(), 413);
        assert_eq!(
            DevError::RewriteLoop { path: "/".into(), hops: 16 }.status_code(),
            500
        );

        let response = DevError::MethodNotAllowed.to_response();
        assert_eq!(response.status, 405);
        assert_eq!(response.body_text(), "Method Not Allowed");
    }

    #[test]
    fn test_request_decoding() {
        let request = DevRequest::new(HttpMethod::Get, "/%5Btest%5D/caf%C3%A9?x=1");
        assert_eq!(request.path, "/[test]/café");
        assert_eq!(request.raw_path, "/%5Btest%5D/caf%C3%A9");
        assert_eq!(request.query.as_deref(), Some("x=1"));
        assert_eq!(request.raw_url(), "http://localhost/%5Btest%5D/caf%C3%A9?x=1");
    }

    #[tokio::test]
    async fn test_static_and_not_found() {
        let site = Site::new();
        let core = site.core();

        let response = core.respond(DevRequest::new(HttpMethod::Get, "/")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "<h1>home</h1>");

        let response = core.respond(DevRequest::new(HttpMethod::Get, "/nope")).await;
        assert_eq!(response.status, 404);

        let response = core.respond(DevRequest::new(HttpMethod::Head, "/about")).await;
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
        assert_eq!(response.header("content-length"), Some("5"));
    }

    #[tokio::test]
    async fn test_custom_not_found_page() {
        let site = Site::new().file("404.html", "custom missing");
        let core = site.core();
        let response = core.respond(DevRequest::new(HttpMethod::Get, "/nope")).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body_text(), "custom missing");
    }

    #[tokio::test]
    async fn test_post_without_function_is_405() {
        let core = Site::new().core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Post, "/nothing").with_body("x"))
            .await;
        assert_eq!(response.status, 405);
        assert_eq!(response.body_text(), "Method Not Allowed");

        // Static files do not take POSTs either.
        let response = core.respond(DevRequest::new(HttpMethod::Post, "/about")).await;
        assert_eq!(response.status, 405);
    }

    #[tokio::test]
    async fn test_redirect_response() {
        let core = Site::new()
            .rule(RuleConfig::new("/bar", "/?a=1&a=2").with_status(302))
            .core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/bar?foo=1&foo=2"))
            .await;
        assert_eq!(response.status, 302);
        assert_eq!(response.header(LOCATION), Some("/?a=1&a=2"));
        assert_eq!(response.body_text(), "Redirecting to /?a=1&a=2");
    }

    #[tokio::test]
    async fn test_rewrite_to_function_replaces_query() {
        let core = Site::new()
            .rule(RuleConfig::new("/api/*", "/.netlify/functions/echo?a=1&a=2"))
            .core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/api/test?foo=1&foo=2"))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.header("etag"), None);
        assert_eq!(response.header("x-nf-request-id").map(str::len), Some(26));

        let event = event_of(&response.body);
        assert_eq!(event["multiValueQueryStringParameters"], json!({ "a": ["1", "2"] }));
        assert_eq!(event["path"], "/api/test");
    }

    #[tokio::test]
    async fn test_rewrite_passes_request_query_through() {
        let core = Site::new()
            .rule(RuleConfig::new("/fn", "/.netlify/functions/echo"))
            .core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/fn?foo=1&foo=2"))
            .await;
        let event = event_of(&response.body);
        assert_eq!(event["multiValueQueryStringParameters"], json!({ "foo": ["1", "2"] }));
    }

    #[tokio::test]
    async fn test_forced_rule_shadows_static_file() {
        let site = Site::new()
            .rule(RuleConfig::new("/about", "/.netlify/functions/echo"))
            .rule(RuleConfig::new("/", "/about.html").forced());
        let core = site.core();

        // Non-forced rule loses against the existing about page.
        let response = core.respond(DevRequest::new(HttpMethod::Get, "/about")).await;
        assert_eq!(response.body_text(), "about");

        let response = core.respond(DevRequest::new(HttpMethod::Get, "/")).await;
        assert_eq!(response.body_text(), "about");
    }

    #[tokio::test]
    async fn test_catch_all_does_not_hide_functions() {
        let site = Site::new()
            .rule(RuleConfig::new("/*", "/index.html"));
        let core = site.core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/.netlify/functions/echo"))
            .await;
        assert_eq!(event_of(&response.body)["path"], "/.netlify/functions/echo");

        let response = core.respond(DevRequest::new(HttpMethod::Get, "/some/page")).await;
        assert_eq!(response.body_text(), "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_chained_rewrites_and_loop_guard() {
        let site = Site::new()
            .rule(RuleConfig::new("/a", "/b"))
            .rule(RuleConfig::new("/b", "/about.html"));
        let core = site.core();
        let response = core.respond(DevRequest::new(HttpMethod::Get, "/a")).await;
        assert_eq!(response.body_text(), "about");

        let site = Site::new()
            .rule(RuleConfig::new("/x", "/y"))
            .rule(RuleConfig::new("/y", "/x"));
        let core = site.core();
        let err = core
            .handle(DevRequest::new(HttpMethod::Get, "/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DevError::RewriteLoop { hops, .. } if hops == MAX_REWRITE_HOPS));
        let response = core.respond(DevRequest::new(HttpMethod::Get, "/x")).await;
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_custom_status_rewrite() {
        let site = Site::new()
            .file("missing.html", "not here")
            .rule(RuleConfig::new("/*", "/missing.html").with_status(404));
        let core = site.core();
        let response = core.respond(DevRequest::new(HttpMethod::Get, "/gone")).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body_text(), "not here");
    }

    #[tokio::test]
    async fn test_unknown_function_is_404() {
        let core = Site::new().core();
        let response = core
            .respond(DevRequest::new(HttpMethod::Post, "/.netlify/functions/missing"))
            .await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_function_timeout() {
        let mut site = Site::new().function(
            "sleepy",
            InProcessFunction::new(|_, _| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(json!({ "statusCode": 200 }))
            }),
        );
        site.config.timeout = 1.0;
        let core = site.core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/.netlify/functions/sleepy"))
            .await;
        assert_eq!(response.status, 500);
        assert!(response
            .body_text()
            .contains("TimeoutError: Task timed out after 1.00 seconds"));
    }

    #[tokio::test]
    async fn test_error_json_when_accepted() {
        let core = Site::new()
            .function(
                "broken",
                InProcessFunction::new(|_, _| async {
                    Err(crate::functions::InvocationError::runtime("kaput"))
                }),
            )
            .core();
        let response = core
            .respond(
                DevRequest::new(HttpMethod::Get, "/.netlify/functions/broken")
                    .with_header(ACCEPT, "application/json"),
            )
            .await;
        assert_eq!(response.status, 500);
        assert_eq!(response.header(CONTENT_TYPE), Some("application/json"));
        assert_eq!(event_of(&response.body)["errorMessage"], "kaput");
    }

    #[tokio::test]
    async fn test_background_function_returns_202() {
        let core = Site::new().function("job-background", echo()).core();
        let response = core
            .respond(DevRequest::new(HttpMethod::Post, "/.netlify/functions/job-background"))
            .await;
        assert_eq!(response.status, 202);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_function_help_page() {
        let mut site = Site::new().function("cron", echo());
        site.config.overrides.insert(
            "cron".to_string(),
            FunctionOverride {
                schedule: Some("@daily".to_string()),
                path: None,
                timeout: None,
            },
        );
        let core = site.core();

        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/.netlify/functions/cron"))
            .await;
        assert_eq!(response.status, 200);
        let body = response.body_text();
        assert!(body.contains("which is a scheduled function"));
        assert!(body.contains("Your function returned `headers`, `body`."));
    }

    #[tokio::test]
    async fn test_builder_path() {
        let core = Site::new().core();
        let response = core
            .respond(DevRequest::new(HttpMethod::Get, "/.netlify/builders/echo?x=1"))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(event_of(&response.body)["queryStringParameters"], json!({ "x": "1" }));
    }

    #[tokio::test]
    async fn test_custom_function_path() {
        let mut site = Site::new();
        site.config.overrides.insert(
            "echo".to_string(),
            FunctionOverride {
                schedule: None,
                path: Some("/hello/:name".to_string()),
                timeout: None,
            },
        );
        let core = site.core();
        let response = core
            .respond(
                DevRequest::new(HttpMethod::Post, "/hello/world")
                    .with_header(CONTENT_TYPE, "text/plain")
                    .with_body("hi"),
            )
            .await;
        assert_eq!(response.status, 200);
        let event = event_of(&response.body);
        assert_eq!(event["httpMethod"], "POST");
        assert_eq!(event["body"], "hi");
    }
}
