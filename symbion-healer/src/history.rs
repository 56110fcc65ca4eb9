//! Append-only healing history (CSV)
//!
//! One row per remediation attempt, header written once when the file is
//! absent or empty. Rows are never rewritten, truncated or rotated, and no
//! rows are cached in memory between calls. Appends go through a single
//! writer lock so concurrent callers each land exactly one row.

use crate::error::PersistenceError;
use crate::models::HealingRecord;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// On-disk row; field order is the column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: String,
    pub ip_address: String,
    pub issue: String,
    pub before_cpu: f64,
    pub before_ram: f64,
    pub before_disk: f64,
    pub after_cpu: f64,
    pub after_ram: f64,
    pub after_disk: f64,
    pub status: String,
}

impl From<&HealingRecord> for HistoryRow {
    fn from(record: &HealingRecord) -> Self {
        Self {
            timestamp: record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            ip_address: record.target.clone(),
            issue: record.issue.clone(),
            before_cpu: record.before.cpu,
            before_ram: record.before.ram,
            before_disk: record.before.disk,
            after_cpu: record.after.cpu,
            after_ram: record.after.ram,
            after_disk: record.after.disk,
            status: record.outcome.to_string(),
        }
    }
}

pub struct HistoryRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write exactly one row, preceded by the header on first write
    pub async fn append(&self, record: &HealingRecord) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        let row = HistoryRow::from(record);
        tokio::task::spawn_blocking(move || write_row(&path, &row))
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e)))??;

        debug!("Recorded healing attempt for {} in {}", record.target, self.path.display());
        Ok(())
    }

    /// All rows in append order (empty if the log does not exist yet)
    pub async fn read_all(&self) -> Result<Vec<HistoryRow>, PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_rows(&path))
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e)))?
    }
}

fn write_row(path: &Path, row: &HistoryRow) -> Result<(), PersistenceError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<HistoryRow>, PersistenceError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<HistoryRow>, _>>()?;
    Ok(rows)
}
