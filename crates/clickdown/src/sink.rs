//! Destinations for extracted rows
//!
//! A sink holds one header and any number of rows. The header only grows, so
//! rows written before a column existed are shorter than the final header;
//! readers pad them. Rows are never rewritten.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::persist::{read_json_file, write_json_atomic, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Row {line} of {path} is not a JSON array of strings: {source}")]
    Row {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Row has {width} cells but the header only has {header}")]
    RowTooWide { width: usize, header: usize },
}

/// Written once a run completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStamp {
    pub completed_at: DateTime<Utc>,
    pub rows_written: u64,
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Drop all rows and start over with `header`
    async fn reset(&self, header: &[String]) -> Result<(), SinkError>;

    /// The current header, empty if nothing was ever written
    async fn header(&self) -> Result<Vec<String>, SinkError>;

    /// Append columns to the header. Existing rows are left untouched.
    async fn extend_header(&self, columns: &[String]) -> Result<(), SinkError>;

    /// Append rows. No row may be wider than the header.
    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), SinkError>;

    async fn finish(&self, stamp: &CompletionStamp) -> Result<(), SinkError>;
}

fn check_width(rows: &[Vec<String>], header: usize) -> Result<(), SinkError> {
    match rows.iter().map(Vec::len).max() {
        Some(width) if width > header => Err(SinkError::RowTooWide { width, header }),
        _ => Ok(()),
    }
}

/// Pad `rows` to `width` cells
pub fn pad_rows(rows: &[Vec<String>], width: usize) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            if row.len() < width {
                row.resize(width, String::new());
            }
            row
        })
        .collect()
}

#[derive(Debug, Default)]
struct MemoryTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    stamp: Option<CompletionStamp>,
}

/// In-memory table. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn header_snapshot(&self) -> Vec<String> {
        self.lock().header.clone()
    }

    /// Rows as written, without padding
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.lock().rows.clone()
    }

    /// Rows padded to the current header width
    pub fn table(&self) -> Vec<Vec<String>> {
        let table = self.lock();
        pad_rows(&table.rows, table.header.len())
    }

    pub fn stamp(&self) -> Option<CompletionStamp> {
        self.lock().stamp.clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn reset(&self, header: &[String]) -> Result<(), SinkError> {
        let mut table = self.lock();
        table.header = header.to_vec();
        table.rows.clear();
        table.stamp = None;
        Ok(())
    }

    async fn header(&self) -> Result<Vec<String>, SinkError> {
        Ok(self.header_snapshot())
    }

    async fn extend_header(&self, columns: &[String]) -> Result<(), SinkError> {
        self.lock().header.extend_from_slice(columns);
        Ok(())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), SinkError> {
        let mut table = self.lock();
        check_width(rows, table.header.len())?;
        table.rows.extend_from_slice(rows);
        Ok(())
    }

    async fn finish(&self, stamp: &CompletionStamp) -> Result<(), SinkError> {
        self.lock().stamp = Some(stamp.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    header: Vec<String>,
    #[serde(default)]
    completed: Option<CompletionStamp>,
}

/// Rows as JSON arrays, one per line, plus a `<path>.header.json` manifest
/// holding the header and the completion stamp
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
    manifest_path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut manifest = path.as_os_str().to_owned();
        manifest.push(".header.json");
        Self {
            path,
            manifest_path: PathBuf::from(manifest),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn manifest(&self) -> Result<Manifest, SinkError> {
        Ok(read_json_file(&self.manifest_path).await?.unwrap_or_default())
    }

    pub async fn completion(&self) -> Result<Option<CompletionStamp>, SinkError> {
        Ok(self.manifest().await?.completed)
    }

    /// Every row written so far, unpadded
    pub async fn read_rows(&self) -> Result<Vec<Vec<String>>, SinkError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| SinkError::Row {
                    path: self.path.clone(),
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OutputSink for JsonlSink {
    async fn reset(&self, header: &[String]) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, b"")
            .await
            .map_err(|e| self.io_error(e))?;
        let manifest = Manifest {
            header: header.to_vec(),
            completed: None,
        };
        write_json_atomic(&self.manifest_path, &manifest).await?;
        Ok(())
    }

    async fn header(&self) -> Result<Vec<String>, SinkError> {
        Ok(self.manifest().await?.header)
    }

    async fn extend_header(&self, columns: &[String]) -> Result<(), SinkError> {
        if columns.is_empty() {
            return Ok(());
        }
        let mut manifest = self.manifest().await?;
        manifest.header.extend_from_slice(columns);
        write_json_atomic(&self.manifest_path, &manifest).await?;
        Ok(())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }
        check_width(rows, self.manifest().await?.header.len())?;

        let mut buffer = String::new();
        for row in rows {
            // A Vec<String> always serializes
            let line = serde_json::to_string(row).unwrap_or_default();
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(buffer.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))
    }

    async fn finish(&self, stamp: &CompletionStamp) -> Result<(), SinkError> {
        let mut manifest = self.manifest().await?;
        manifest.completed = Some(stamp.clone());
        write_json_atomic(&self.manifest_path, &manifest).await?;
        Ok(())
    }
}
