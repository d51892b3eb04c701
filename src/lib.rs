// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! sitedev - a local development server for static sites with redirect
//! rules and serverless functions.
//!
//! A request goes through the redirect rules first. Redirects and proxy
//! rules answer directly, rewrites change the path the rest of the pipeline
//! sees. Function paths (`/.netlify/functions/<name>`,
//! `/.netlify/builders/<name>` or a configured custom path) invoke the
//! function with a timeout and shape its result into an HTTP response.
//! Everything else is served from the publish directory, an optional
//! upstream dev server, or the site's `404.html`.
//!
//! # Configuration
//!
//! Configuration is layered from a file (`sitedev.toml`, `.json`, `.yaml`)
//! and `SITEDEV_`-prefixed environment variables, with `__` separating
//! nesting levels (`SITEDEV_SERVER__PORT=9999`).
//!
//! ```toml
//! [server]
//! port = 8888
//!
//! [site]
//! publish = "public"
//!
//! [functions]
//! directory = "functions"
//!
//! [[redirects]]
//! from = "/api/*"
//! to = "/.netlify/functions/:splat"
//! ```
//!
//! # Embedding
//!
//! ```rust,no_run
//! use serde_json::json;
//! use sitedev::{InProcessFunction, SiteDev};
//!
//! # async fn run() -> Result<(), sitedev::LoaderError> {
//! let site = SiteDev::loader()
//!     .with_config_file("sitedev.toml")
//!     .with_env_vars()
//!     .with_function(
//!         "hello",
//!         InProcessFunction::new(|_event, _ctx| async move {
//!             Ok(json!({ "statusCode": 200, "body": "hello" }))
//!         }),
//!     )
//!     .build()
//!     .await?;
//!
//! site.start().await
//! # }
//! ```

pub mod assets;
pub mod config;
pub mod core;
pub mod functions;
pub mod loader;
pub mod logging;
pub mod redirects;
pub mod server;
pub mod shaper;
pub mod upstream;

pub use config::{ConfigError, ConfigProvider, ConfigProviderExt};
pub use core::{DevCore, DevError, DevRequest, DevResponse, HttpMethod};
pub use functions::{
    FunctionContext, FunctionHandler, InProcessFunction, InvocationError, InvocationErrorKind,
    InvocationEvent, InvocationResult,
};
pub use loader::{LoaderError, SiteDev, SiteDevLoader};
pub use redirects::{RuleConfig, RuleError, RuleSet};
pub use server::DevServer;
