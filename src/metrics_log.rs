// src/metrics_log.rs
//
//! Append-only JSONL metrics log, one record per check cycle.
//!
//! The file is reopened in append mode for every record, so a rotated or
//! removed log is recreated at the configured path. Each record is
//! serialized in full, newline included, and handed to a single
//! `write_all` while holding the writer lock, so records never interleave.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug)]
pub struct MetricsLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl MetricsLog {
    /// Create the log (and its parent directories) if missing. Fails early
    /// when the path cannot be opened for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create metrics directory: {}", parent.display())
            })?;
        }
        open_append(&path)?;

        info!("Writing metrics to {}", path.display());
        Ok(Self { path, writer: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("Failed to serialize metrics record")?;
        line.push(b'\n');

        let _guard = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("metrics log writer lock poisoned"))?;
        let mut file = open_append(&self.path)?;
        file.write_all(&line)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to append to metrics file: {}", self.path.display()))
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open metrics file: {}", path.display()))
}
