// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;
use crate::assets::DirResolver;
use crate::config::{FunctionsConfig, SiteConfig};
use crate::functions::{FunctionInvoker, FunctionRegistry};
use crate::logging::config::LoggingConfig;
use crate::redirects::RuleSet;
use tempfile::TempDir;

fn server(root: &std::path::Path, body_limit: usize) -> DevServer {
    let core = DevCore::new(
        RuleSet::default(),
        Arc::new(DirResolver::new(root)),
        FunctionInvoker::new(
            Arc::new(FunctionRegistry::new(FunctionsConfig::default())),
            Default::default(),
        ),
        SiteConfig::default(),
    )
    .unwrap();

    let config = ServerConfig {
        port: 0,
        body_limit,
        shutdown_timeout: 2,
        ..Default::default()
    };
    DevServer::new(config, Arc::new(core), AccessLog::new(LoggingConfig::default())).unwrap()
}

#[test]
fn test_convert_response_keeps_headers() {
    let mut response = DevResponse::text(201, "made");
    response
        .headers
        .append(hyper::header::SET_COOKIE, "a=1".parse().unwrap());
    response
        .headers
        .append(hyper::header::SET_COOKIE, "b=2".parse().unwrap());

    let converted = convert_response(response);
    assert_eq!(converted.status(), StatusCode::CREATED);
    assert_eq!(converted.headers().get_all("set-cookie").iter().count(), 2);
}

#[test]
fn test_convert_response_invalid_status() {
    let converted = convert_response(DevResponse::new(1000));
    assert_eq!(converted.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_serve_and_shutdown() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "hello").unwrap();

    let server = server(dir.path(), 16);
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve_with_shutdown(listener, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let client = reqwest::Client::new();
    let response = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "hello");

    let response = client
        .post(format!("http://{addr}/"))
        .body("this body is longer than sixteen bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap();
    assert!(result.is_ok());
}
