// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry-point – "turn the key and go".
//!
//! The [`SiteDevLoader`] consumes configuration, compiles the redirect
//! rules, discovers functions and returns a [`SiteDev`] whose server is ready
//! to be started.


use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::assets::DirResolver;
use crate::config::{
    Config, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider, FunctionsConfig,
    ServerConfig, SiteConfig,
};
use crate::core::{DevCore, DevError};
use crate::functions::{FunctionHandler, FunctionInvoker, FunctionRegistry};
use crate::logging::access::AccessLog;
use crate::logging::config::LoggingConfig;
use crate::logging::{init_with_config, log_error, parse_level};
use crate::redirects::{parse_redirects, RuleConfig, RuleError, RuleSet};
use crate::server::DevServer;
use crate::{info_fmt, warn_fmt};

const REDIRECTS_FILE: &str = "_redirects";

/// Errors that can occur while starting the dev server.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// A redirect rule failed to load
    #[error("redirect rules error: {0}")]
    RuleError(#[from] RuleError),

    /// Server setup or runtime error
    #[error("server error: {0}")]
    DevError(#[from] DevError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Builder for initializing and configuring the dev server.
#[derive(Debug, Default)]
pub struct SiteDevLoader {
    config: Option<Config>,
    config_file_path: Option<String>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    functions: Vec<(String, Arc<dyn FunctionHandler>)>,
}

impl SiteDevLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a ready-made configuration instead of files and env vars.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a configuration file to load. Relative paths inside it resolve
    /// against the file's directory.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Enable environment variable configuration.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Set a custom prefix for environment variables (default is "SITEDEV_").
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a custom configuration provider. It overrides files and env vars.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Register a function handler next to the discovered ones. Replaces a
    /// discovered function of the same name.
    pub fn with_function<H: FunctionHandler + 'static>(mut self, name: &str, handler: H) -> Self {
        self.functions.push((name.to_string(), Arc::new(handler)));
        self
    }

    /// Build and initialize the dev server.
    pub async fn build(self) -> Result<SiteDev, LoaderError> {
        let mut base_dir = None;

        let config = if let Some(config) = self.config {
            config
        } else {
            let mut config_builder = Config::builder();

            if let Some(file_path) = &self.config_file_path {
                let file_provider = FileConfigProvider::new(file_path)?;
                base_dir = Some(file_provider.directory().to_path_buf());
                config_builder = config_builder.with_provider(file_provider);
            }

            if self.use_env_vars {
                let env_provider = match &self.env_prefix {
                    Some(prefix) => EnvConfigProvider::new(prefix),
                    None => EnvConfigProvider::default(),
                };
                config_builder = config_builder.with_provider(env_provider);
            }

            for provider in self.providers {
                config_builder = config_builder.with_shared_provider(provider);
            }

            config_builder.build()
        };

        let config = Arc::new(config);

        let log_level = env::var("RUST_LOG_LEVEL").ok().map(|level| parse_level(&level));
        match config.get::<LoggingConfig>("logging") {
            Ok(logging_config) => init_with_config(log_level, logging_config),
            Err(e) => {
                init_with_config(log_level, None);
                warn_fmt!("Startup", "Failed to read logging configuration: {}", e);
            }
        }

        info_fmt!("Startup", "sitedev starting up");

        let base_dir = match base_dir {
            Some(dir) => dir,
            None => env::current_dir()?,
        };

        let mut server_config: ServerConfig = config.get_or_default("server", ServerConfig::default())?;
        if let Some(https) = server_config.https.as_mut() {
            https.cert_file = resolve(&base_dir, &https.cert_file);
            https.key_file = resolve(&base_dir, &https.key_file);
        }

        let mut site: SiteConfig = config.get_or_default("site", SiteConfig::default())?;
        site.publish = resolve(&base_dir, &site.publish);
        site.redirects_file = site.redirects_file.as_deref().map(|f| resolve(&base_dir, f));

        let mut functions_config: FunctionsConfig =
            config.get_or_default("functions", FunctionsConfig::default())?;
        functions_config.directory = functions_config.directory.as_deref().map(|d| resolve(&base_dir, d));

        let rules = load_rules(&config, &site)
            .await
            .map_err(|e| log_error("Startup", e))?;
        info_fmt!("Startup", "Loaded {} redirect rules", rules.len());

        let mut registry = FunctionRegistry::discover(functions_config)?;
        for (name, handler) in self.functions {
            registry.register(&name, handler)?;
        }
        if registry.is_empty() {
            info_fmt!("Startup", "No functions found");
        } else {
            let names: Vec<&str> = registry.names().collect();
            info_fmt!("Startup", "Serving {} functions: {}", registry.len(), names.join(", "));
        }

        let invoker = FunctionInvoker::new(Arc::new(registry), site.env.clone());
        let assets = Arc::new(DirResolver::new(&site.publish));
        info_fmt!("Startup", "Serving static files from {}", site.publish.display());

        let core = DevCore::new(rules, assets, invoker, site)?;

        let logging_config: LoggingConfig = config.get_or_default("logging", LoggingConfig::default())?;
        let server = DevServer::new(server_config, Arc::new(core), AccessLog::new(logging_config))?;

        Ok(SiteDev { config, server })
    }
}

/// Read the `_redirects` file (when there is one) and the `redirects` config
/// array, file rules first.
async fn load_rules(config: &Config, site: &SiteConfig) -> Result<RuleSet, LoaderError> {
    let mut rules = Vec::new();

    let file = match &site.redirects_file {
        Some(file) => Some(file.clone()),
        None => {
            let default = site.publish.join(REDIRECTS_FILE);
            tokio::fs::try_exists(&default).await?.then_some(default)
        }
    };

    if let Some(file) = file {
        let content = tokio::fs::read_to_string(&file).await?;
        let parsed = parse_redirects(&content, &file.display().to_string())?;
        info_fmt!("Startup", "Read {} rules from {}", parsed.len(), file.display());
        rules.extend(parsed);
    }

    let configured: Vec<RuleConfig> = config.get_or_default("redirects", Vec::new())?;
    rules.extend(configured);

    Ok(RuleSet::compile(rules)?)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// A configured dev server, ready to start.
#[derive(Debug, Clone)]
pub struct SiteDev {
    config: Arc<Config>,
    server: DevServer,
}

impl SiteDev {
    /// Create a new loader.
    pub fn loader() -> SiteDevLoader {
        SiteDevLoader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn server(&self) -> &DevServer {
        &self.server
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::DevError)
    }
}
