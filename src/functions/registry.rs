// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Name and route lookup for functions.
//!
//! Discovery accepts, for a function called `hello`:
//!
//! ```text
//! functions/hello.js
//! functions/hello/hello.js
//! functions/hello/index.js
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::process::{ProcessFunction, interpreter_for};
use super::FunctionHandler;
use crate::config::{ConfigError, FunctionsConfig};
use crate::redirects::pattern::PathPattern;

/// Path prefix for directly addressed functions.
pub const FUNCTIONS_PREFIX: &str = "/.netlify/functions/";
/// Path prefix for on-demand builders.
pub const BUILDERS_PREFIX: &str = "/.netlify/builders/";

const BACKGROUND_SUFFIX: &str = "-background";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Synchronous,
    /// Answers 202 immediately and keeps running detached.
    Background,
    /// Meant to be triggered by the scheduler, not HTTP.
    Scheduled,
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub name: String,
    pub kind: FunctionKind,
    pub handler: Arc<dyn FunctionHandler>,
    pub schedule: Option<String>,
    pub timeout: Duration,
    pub source: Option<PathBuf>,
    custom_path: Option<PathPattern>,
}

/// How a request reached a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Functions,
    Builders,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRoute {
    pub kind: RouteKind,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    config: FunctionsConfig,
    functions: BTreeMap<String, FunctionEntry>,
}

impl FunctionRegistry {
    pub fn new(config: FunctionsConfig) -> Self {
        Self {
            config,
            functions: BTreeMap::new(),
        }
    }

    /// Build a registry from `config.directory`. A missing directory yields
    /// an empty registry.
    pub fn discover(config: FunctionsConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new(config);
        let Some(dir) = registry.config.directory.clone() else {
            return Ok(registry);
        };
        if !dir.is_dir() {
            log::warn!("Functions directory '{}' does not exist", dir.display());
            return Ok(registry);
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for path in entries {
            let Some((name, entry)) = resolve_entry(&path) else {
                continue;
            };
            let entry = entry.canonicalize().unwrap_or(entry);
            log::debug!("Discovered function '{}' at {}", name, entry.display());
            registry.register_source(&name, Arc::new(ProcessFunction::new(&entry)), Some(entry))?;
        }

        for name in registry.config.overrides.keys() {
            if !registry.functions.contains_key(name) {
                log::warn!("Settings given for unknown function '{}'", name);
            }
        }

        Ok(registry)
    }

    /// Register a handler under `name`, applying any configured overrides.
    /// Replaces an existing function of the same name.
    pub fn register(&mut self, name: &str, handler: Arc<dyn FunctionHandler>) -> Result<(), ConfigError> {
        self.register_source(name, handler, None)
    }

    fn register_source(
        &mut self,
        name: &str,
        handler: Arc<dyn FunctionHandler>,
        source: Option<PathBuf>,
    ) -> Result<(), ConfigError> {
        let settings = self.config.overrides.get(name);
        let schedule = settings.and_then(|s| s.schedule.clone());

        let kind = if schedule.is_some() {
            FunctionKind::Scheduled
        } else if name.ends_with(BACKGROUND_SUFFIX) {
            FunctionKind::Background
        } else {
            FunctionKind::Synchronous
        };

        let seconds = settings.and_then(|s| s.timeout).unwrap_or(match kind {
            FunctionKind::Background => self.config.background_timeout,
            _ => self.config.timeout,
        });
        let timeout = Duration::try_from_secs_f64(seconds).map_err(|_| {
            ConfigError::invalid(format!("functions.overrides.{name}.timeout"), seconds)
        })?;

        let custom_path = settings
            .and_then(|s| s.path.as_deref())
            .map(|p| {
                PathPattern::parse(p)
                    .map_err(|e| ConfigError::invalid(format!("functions.overrides.{name}.path"), e))
            })
            .transpose()?;

        log::info!("Registered {:?} function '{}' ({})", kind, name, handler.runtime());

        self.functions.insert(
            name.to_string(),
            FunctionEntry {
                name: name.to_string(),
                kind,
                handler,
                schedule,
                timeout,
                source,
                custom_path,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Resolve a decoded request path to a function route. Paths under the
    /// functions namespace resolve even if the function does not exist.
    pub fn route(&self, path: &str) -> Option<FunctionRoute> {
        for (prefix, kind) in [
            (FUNCTIONS_PREFIX, RouteKind::Functions),
            (BUILDERS_PREFIX, RouteKind::Builders),
        ] {
            if let Some(rest) = path.strip_prefix(prefix) {
                let name = rest.split('/').next().unwrap_or_default();
                if name.is_empty() {
                    return None;
                }
                return Some(FunctionRoute {
                    kind,
                    name: name.to_string(),
                });
            }
        }

        self.functions.values().find_map(|entry| {
            let pattern = entry.custom_path.as_ref()?;
            pattern
                .matches(path, &mut Default::default())
                .then(|| FunctionRoute {
                    kind: RouteKind::Custom,
                    name: entry.name.clone(),
                })
        })
    }
}

/// Work out the function name and entry file for a directory child.
fn resolve_entry(path: &Path) -> Option<(String, PathBuf)> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') || file_name.starts_with('_') {
        return None;
    }

    if path.is_dir() {
        let name = file_name.to_string();
        let mut candidates: Vec<PathBuf> = fs::read_dir(path)
            .ok()?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_runnable(p))
            .collect();
        candidates.sort();
        let pick = |stem: &str| {
            candidates
                .iter()
                .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(stem))
                .cloned()
        };
        let entry = pick(&name).or_else(|| pick("index"))?;
        return Some((name, entry));
    }

    if !is_runnable(path) {
        return None;
    }
    let name = path.file_stem()?.to_str()?.to_string();
    Some((name, path.to_path_buf()))
}

fn is_runnable(path: &Path) -> bool {
    path.is_file() && (interpreter_for(path).is_some() || is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.extension().is_none()
        && fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("exe")
}
