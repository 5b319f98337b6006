//! Per-video job state and per-job errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parser::VideoReference;

/// Lifecycle of a [`DownloadJob`].
///
/// `Stored`, `Failed`, and `Skipped` are terminal. `Skipped` marks a
/// metadata-only success: the media stage was skipped on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    MetadataFetched,
    MediaFetched,
    Stored,
    Failed,
    Skipped,
}

impl JobState {
    /// Whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stored | Self::Failed | Self::Skipped)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(self, next: JobState) -> bool {
        match (self, next) {
            (_, Self::Failed) => !self.is_terminal(),
            (Self::Pending, Self::MetadataFetched)
            | (Self::MetadataFetched, Self::MediaFetched | Self::Skipped)
            | (Self::MediaFetched, Self::Stored) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::MetadataFetched => "metadata_fetched",
            Self::MediaFetched => "media_fetched",
            Self::Stored => "stored",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Category of a per-job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// A collection could not be listed (private, removed, rate limited).
    CollectionUnavailable,
    /// Metadata could not be fetched.
    MetadataFetchFailed,
    /// Media could not be fetched.
    MediaFetchFailed,
    /// The media store rejected the file.
    StorageFailed,
    /// The video cannot be fetched at all (e.g. DRM protected).
    UnsupportedVideo,
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CollectionUnavailable => "collection_unavailable",
            Self::MetadataFetchFailed => "metadata_fetch_failed",
            Self::MediaFetchFailed => "media_fetch_failed",
            Self::StorageFailed => "storage_failed",
            Self::UnsupportedVideo => "unsupported_video",
        };
        f.write_str(s)
    }
}

/// A failure confined to one job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct JobError {
    /// Failure category.
    pub kind: JobErrorKind,
    /// Human-readable cause.
    pub message: String,
}

impl JobError {
    /// Creates a job error.
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Unit of work for one video reference.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    index: usize,
    reference: VideoReference,
    state: JobState,
    error: Option<JobError>,
}

impl DownloadJob {
    /// Creates a pending job at scheduling position `index`.
    #[must_use]
    pub fn new(index: usize, reference: VideoReference) -> Self {
        Self {
            index,
            reference,
            state: JobState::Pending,
            error: None,
        }
    }

    /// Scheduling position.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The video this job processes.
    #[must_use]
    pub fn reference(&self) -> &VideoReference {
        &self.reference
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// The failure, once the job has failed.
    #[must_use]
    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    /// Moves to `next`. Illegal transitions are ignored and return false.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_advance_to(next) {
            tracing::debug!(
                index = self.index,
                from = %self.state,
                to = %next,
                "ignoring illegal job transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Marks the job failed with `error`.
    pub fn fail(&mut self, error: JobError) {
        if self.advance(JobState::Failed) {
            self.error = Some(error);
        }
    }
}

/// Summary entry for a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Scheduling position.
    pub index: usize,
    /// URL of the video or collection.
    pub url: String,
    /// Host-native id when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    /// Failure category.
    pub kind: JobErrorKind,
    /// Human-readable cause.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ReferenceKind;

    fn job() -> DownloadJob {
        DownloadJob::new(
            0,
            VideoReference {
                raw_url: "https://vimeo.com/1".to_string(),
                url: "https://vimeo.com/1".to_string(),
                canonical_id: "vimeo:1".to_string(),
                kind: ReferenceKind::Single,
            },
        )
    }

    #[test]
    fn test_video_mode_lifecycle() {
        let mut job = job();
        assert!(job.advance(JobState::MetadataFetched));
        assert!(job.advance(JobState::MediaFetched));
        assert!(job.advance(JobState::Stored));
        assert!(job.state().is_terminal());
    }

    #[test]
    fn test_metadata_only_lifecycle_ends_skipped() {
        let mut job = job();
        assert!(job.advance(JobState::MetadataFetched));
        assert!(job.advance(JobState::Skipped));
        assert!(!job.advance(JobState::MediaFetched));
        assert_eq!(job.state(), JobState::Skipped);
    }

    #[test]
    fn test_cannot_skip_metadata() {
        let mut job = job();
        assert!(!job.advance(JobState::MediaFetched));
        assert_eq!(job.state(), JobState::Pending);
    }

    #[test]
    fn test_fail_records_error_once() {
        let mut job = job();
        job.fail(JobError::new(JobErrorKind::MetadataFetchFailed, "removed"));
        assert_eq!(job.state(), JobState::Failed);
        job.fail(JobError::new(JobErrorKind::StorageFailed, "later"));
        assert_eq!(
            job.error().map(|e| e.kind),
            Some(JobErrorKind::MetadataFetchFailed)
        );
    }

    #[test]
    fn test_terminal_states_cannot_fail() {
        let mut job = job();
        job.advance(JobState::MetadataFetched);
        job.advance(JobState::Skipped);
        job.fail(JobError::new(JobErrorKind::StorageFailed, "x"));
        assert_eq!(job.state(), JobState::Skipped);
        assert!(job.error().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = JobError::new(JobErrorKind::UnsupportedVideo, "DRM protected");
        assert_eq!(err.to_string(), "unsupported_video: DRM protected");
    }
}
