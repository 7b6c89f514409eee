// src/logging.rs
//
//! Tracing setup for the binary: a readable console layer plus a JSON-lines
//! file layer.
//!
//! Level precedence: `RUST_LOG` (full filter directive), then `LOG_LEVEL`
//! (`DEBUG|INFO|WARNING|ERROR|CRITICAL`), then the `-v` count.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::constants::LOG_LEVEL_ENV;

/// Parse a `LOG_LEVEL` value. Unknown names yield `None`.
pub fn parse_level_name(name: &str) -> Option<Level> {
    match name.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        // tracing has no level above ERROR
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// Level for a given `-v` count.
pub fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Effective level from `LOG_LEVEL` (if valid) or the verbosity count.
pub fn resolve_level(env_value: Option<&str>, verbose: u8) -> Level {
    env_value
        .and_then(parse_level_name)
        .unwrap_or_else(|| level_for_verbosity(verbose))
}

fn build_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global subscriber. Call once, early in `main`.
pub fn init_logging(cfg: &LoggingConfig, verbose: u8) -> Result<()> {
    let env_level = std::env::var(LOG_LEVEL_ENV).ok();
    let level = resolve_level(env_level.as_deref(), verbose);

    let console = fmt::layer()
        .with_ansi(cfg.console_colors)
        .with_timer(ChronoUtc::new("[%H:%M:%S]".to_string()))
        .with_target(true);

    let file_layer = open_log_file(&cfg.log_file)?.map(|file| {
        fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(console)
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;
    Ok(())
}

fn open_log_file(path: &Path) -> Result<Option<std::fs::File>> {
    if path.as_os_str().is_empty() {
        return Ok(None);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    Ok(Some(file))
}
