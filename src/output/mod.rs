//! Output records and dataset sinks.
//!
//! Records are emitted in scheduling order by a single emitter, so sinks see
//! one `emit` call at a time.

mod record;

pub use record::{
    DatasetItem, ErrorRecord, OutputRecord, StoredMedia, assemble_record, video_id_for,
};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from an [`OutputSink`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the dataset failed.
    #[error("failed to write dataset at {path}: {source}")]
    Io {
        /// Dataset path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An item could not be serialized.
    #[error("failed to serialize dataset item: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only destination for dataset items.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Appends one item.
    async fn emit(&self, item: DatasetItem) -> Result<(), SinkError>;
}

/// Writes one JSON object per line, flushing after every item.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Dataset path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutputSink for JsonLinesSink {
    async fn emit(&self, item: DatasetItem) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        let io_err = |source| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        debug!(bytes = line.len(), "dataset item written");
        Ok(())
    }
}

/// Keeps items in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<DatasetItem>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every item emitted so far.
    #[must_use]
    pub fn items(&self) -> Vec<DatasetItem> {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the successful records only.
    #[must_use]
    pub fn records(&self) -> Vec<OutputRecord> {
        self.items()
            .into_iter()
            .filter_map(|item| match item {
                DatasetItem::Record(record) => Some(*record),
                DatasetItem::Error(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn emit(&self, item: DatasetItem) -> Result<(), SinkError> {
        // A poisoned lock still holds valid items.
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        items.push(item);
        Ok(())
    }
}
