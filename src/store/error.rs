//! Error types for media storage.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from a [`MediaStore`](super::MediaStore). All are permanent for the job.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was configured with unusable settings.
    #[error("invalid store configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// Local file system failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The request to the store failed before a response arrived.
    #[error("request for record '{key}' failed: {source}")]
    Http {
        /// Record key.
        key: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with a non-success status.
    #[error("store rejected record '{key}' with HTTP {status}: {body}")]
    Status {
        /// Record key.
        key: String,
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid-configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
