// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper so the library can run as a stand-alone dev server.
//!
//!  The binary honours SITEDEV_CONFIG_FILE or falls back to ./sitedev.toml,
//!  and runs on defaults when neither exists.

use std::env;
use std::error::Error;
use std::path::Path;
use sitedev::{error_fmt, info_fmt, SiteDev};

const DEFAULT_CONFIG_FILE: &str = "sitedev.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut loader = SiteDev::loader().with_env_vars();

    match env::var("SITEDEV_CONFIG_FILE").ok() {
        Some(path) => {
            println!("Using configuration from {path}");
            loader = loader.with_config_file(&path);
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            println!("Using configuration from {DEFAULT_CONFIG_FILE}");
            loader = loader.with_config_file(DEFAULT_CONFIG_FILE);
        }
        None => {
            println!("No configuration file found, serving the current directory with defaults");
        }
    }

    let site = match loader.build().await {
        Ok(site) => site,
        Err(e) => {
            eprintln!("Failed to start sitedev: {e}");
            return Err(e.into());
        }
    };

    match site.start().await {
        Ok(()) => {
            info_fmt!("sitedev", "Server stopped gracefully");
        }
        Err(e) => {
            error_fmt!("sitedev", "Server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
