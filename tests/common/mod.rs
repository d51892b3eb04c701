// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common helpers for sitedev integration tests.

use serde_json::json;
use sitedev::{InProcessFunction, InvocationEvent, SiteDev};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A function that answers with its own invocation event as JSON.
#[allow(dead_code)]
pub fn echo_function() -> InProcessFunction {
    InProcessFunction::new(|event: InvocationEvent, _| async move {
        Ok(json!({
            "statusCode": 200,
            "headers": { "content-type": "application/json" },
            "body": serde_json::to_string(&event).unwrap(),
        }))
    })
}

/// A throwaway site directory with a `sitedev.toml`.
pub struct TestSite {
    dir: TempDir,
    site: Vec<String>,
    functions_settings: Vec<String>,
    extra: String,
    functions: Vec<(String, InProcessFunction)>,
}

#[allow(dead_code)]
impl TestSite {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();
        fs::create_dir_all(dir.path().join("functions")).unwrap();
        Self {
            dir,
            site: vec!["publish = \"public\"".to_string()],
            functions_settings: vec!["directory = \"functions\"".to_string()],
            extra: String::new(),
            functions: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the site root.
    pub fn file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
        self
    }

    /// Add a `key = value` line to the `[site]` table.
    pub fn site_setting(mut self, line: &str) -> Self {
        self.site.push(line.to_string());
        self
    }

    /// Add a `key = value` line to the `[functions]` table.
    pub fn functions_setting(mut self, line: &str) -> Self {
        self.functions_settings.push(line.to_string());
        self
    }

    /// Append raw TOML after the fixed tables.
    pub fn config(mut self, toml: &str) -> Self {
        self.extra.push('\n');
        self.extra.push_str(toml);
        self.extra.push('\n');
        self
    }

    fn render_config(&self) -> String {
        format!(
            "[server]\nhost = \"127.0.0.1\"\nport = 0\nshutdown_timeout = 2\n\n[site]\n{}\n\n[functions]\n{}\n{}",
            self.site.join("\n"),
            self.functions_settings.join("\n"),
            self.extra,
        )
    }

    /// Add a `[[redirects]]` entry.
    pub fn redirect(self, from: &str, to: &str, status: u16) -> Self {
        self.config(&format!(
            "[[redirects]]\nfrom = \"{from}\"\nto = \"{to}\"\nstatus = {status}\n"
        ))
    }

    pub fn function(mut self, name: &str, handler: InProcessFunction) -> Self {
        self.functions.push((name.to_string(), handler));
        self
    }

    /// Build through the loader and serve on an ephemeral port.
    pub async fn start(self) -> RunningSite {
        let config_path = self.dir.path().join("sitedev.toml");
        fs::write(&config_path, self.render_config()).unwrap();

        let mut loader = SiteDev::loader().with_config_file(config_path.to_str().unwrap());
        for (name, handler) in self.functions {
            loader = loader.with_function(&name, handler);
        }
        let site = loader.build().await.unwrap();

        let server = site.server().clone();
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(listener, async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        RunningSite {
            addr,
            client,
            stop: Some(stop_tx),
            handle: Some(handle),
            _dir: self.dir,
        }
    }
}

/// A site being served for the duration of a test.
pub struct RunningSite {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    _dir: TempDir,
}

#[allow(dead_code)]
impl RunningSite {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}

impl Drop for RunningSite {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
