// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static file lookup.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io;
use mime_guess::mime;
use std::path::{Path, PathBuf};

/// A file ready to be served.
#[derive(Debug, Clone)]
pub struct Asset {
    pub path: PathBuf,
    pub content_type: String,
    pub body: Bytes,
}

/// Maps decoded request paths to static content.
#[async_trait]
pub trait StaticResolver: fmt::Debug + Send + Sync {
    /// Whether `path` would resolve to an asset.
    async fn exists(&self, path: &str) -> bool;

    /// Load the asset for `path`, if there is one.
    async fn resolve(&self, path: &str) -> io::Result<Option<Asset>>;

    /// Custom page served with status 404.
    async fn not_found_page(&self) -> io::Result<Option<Asset>> {
        self.resolve("/404.html").await
    }
}

/// Serves files from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirResolver {
    root: PathBuf,
}

impl DirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a path onto the root. `None` for paths that try to escape it.
    fn candidate(&self, path: &str) -> Option<PathBuf> {
        let mut full = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." || segment.contains('\\') || segment.contains('\0') {
                return None;
            }
            full.push(segment);
        }
        Some(full)
    }

    async fn locate(&self, path: &str) -> Option<PathBuf> {
        let full = self.candidate(path)?;

        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => return Some(full),
            Ok(meta) if meta.is_dir() => {
                let index = full.join("index.html");
                if is_file(&index).await {
                    return Some(index);
                }
                return None;
            }
            _ => {}
        }

        if full.extension().is_none() && !path.ends_with('/') {
            let mut html = full.into_os_string();
            html.push(".html");
            let html = PathBuf::from(html);
            if is_file(&html).await {
                return Some(html);
            }
        }
        None
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl StaticResolver for DirResolver {
    async fn exists(&self, path: &str) -> bool {
        self.locate(path).await.is_some()
    }

    async fn resolve(&self, path: &str) -> io::Result<Option<Asset>> {
        let Some(file) = self.locate(path).await else {
            return Ok(None);
        };
        let body = tokio::fs::read(&file).await?;
        log::trace!("Serving {} for '{}'", file.display(), path);
        Ok(Some(Asset {
            content_type: content_type(&file),
            path: file,
            body: Bytes::from(body),
        }))
    }
}

/// MIME type by file extension. Text types are served as UTF-8.
pub fn content_type(path: &Path) -> String {
    let guess = mime_guess::from_path(path).first_or_octet_stream();
    let textual = guess.type_() == mime::TEXT
        || matches!(guess.subtype().as_str(), "javascript" | "ecmascript");
    if textual && guess.get_param(mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", guess.essence_str())
    } else {
        guess.essence_str().to_string()
    }
}
