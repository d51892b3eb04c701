// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! Everything in the crate logs through the `log` facade.  By default the
//! facade is backed by `env_logger`; with `logging.structured = true` a
//! `slog` drain is installed instead and `log` records are bridged into it.

pub mod access;
pub mod config;
pub mod structured;
mod wrapper;

use log::LevelFilter;
use std::sync::Once;

use config::LoggingConfig;

static INIT: Once = Once::new();

/// Map a config level name onto a `log` level filter.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Initialize plain `env_logger` output at `level` (or `RUST_LOG`).
///
/// Only the first call in a process has an effect.
pub fn init(level: Option<LevelFilter>) {
    init_with_config(level, None);
}

/// Initialize logging from a [`LoggingConfig`].
///
/// Only the first call in a process has an effect.
pub fn init_with_config(level: Option<LevelFilter>, config: Option<LoggingConfig>) {
    INIT.call_once(|| {
        let config = config.unwrap_or_default();
        let level = level.unwrap_or_else(|| parse_level(&config.level));

        if config.structured {
            let logger = structured::create_logger(&config.to_logger_config());
            // The guard would restore the previous logger on drop.
            slog_scope::set_global_logger(logger).cancel_reset();

            let bridge_level = level.to_level().unwrap_or(log::Level::Error);
            if let Err(e) = slog_stdlog::init_with_level(bridge_level) {
                eprintln!("failed to bridge log records into slog: {e}");
            }
        } else {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", level.to_string().to_lowercase());

            // A test harness may have installed a logger already.
            let _ = env_logger::Builder::from_env(env)
                .format_timestamp_millis()
                .format_target(config.include_location)
                .try_init();
        }

        log::info!("Logging initialized at level: {}", log::max_level());
    });
}

/// Log an error with context and return the error.
pub fn log_error<E: std::fmt::Display>(context: &str, err: E) -> E {
    log::error!("[{}] {}", context, err);
    err
}
