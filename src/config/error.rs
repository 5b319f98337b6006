//! Run-level errors.

use thiserror::Error;

use crate::auth::CookieError;
use crate::output::SinkError;
use crate::proxy::ProxyError;
use crate::quality::QualityError;

/// Errors that abort a whole run.
///
/// Everything except [`RunError::Sink`] is raised before the first fetch.
#[derive(Debug, Error)]
pub enum RunError {
    /// The cookies matched none of the supported encodings.
    #[error(
        "[COOKIES] {0}\n  Suggestion: pass a cookie header, a JSON cookie export, or a Netscape cookies.txt file"
    )]
    InvalidCredentialFormat(#[from] CookieError),

    /// No usable URL survived normalization.
    #[error("no valid URLs in input ({skipped} unusable tokens)")]
    NoValidUrls {
        /// Tokens rejected during normalization.
        skipped: usize,
    },

    /// The quality label is not supported.
    #[error("{0}")]
    InvalidQuality(#[from] QualityError),

    /// The run input document is malformed.
    #[error("invalid run input: {reason}")]
    InvalidInput {
        /// What is wrong.
        reason: String,
    },

    /// A proxy configuration entry is unusable.
    #[error("[PROXY] {0}")]
    InvalidProxy(#[from] ProxyError),

    /// Concurrency outside the allowed range.
    #[error("invalid concurrency value {value}: must be between {min} and {max}")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
        /// Smallest allowed value.
        min: usize,
        /// Largest allowed value.
        max: usize,
    },

    /// The output sink failed; no further records can be written.
    #[error("output sink failed: {0}")]
    Sink(#[from] SinkError),

    /// The job semaphore was closed while scheduling.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

impl RunError {
    /// Creates an invalid-input error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }
}
