//! Fetch engine boundary.
//!
//! The engine is the external collaborator that talks to the video host. The
//! core only needs three capabilities from it:
//!
//! - [`FetchEngine::fetch_metadata`] - metadata for one video
//! - [`FetchEngine::fetch_media`] - the media file for one video, for one format selector
//! - [`FetchEngine::list_collection`] - member URLs of an album/channel in host order
//!
//! [`YtDlpEngine`] drives the `yt-dlp` binary; [`Retrying`] wraps any engine
//! with bounded retries for transient failures.

mod error;
pub mod retry;
pub mod ytdlp;

pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, Retrying, classify_error,
};
pub use ytdlp::YtDlpEngine;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::Credential;
use crate::parser::{CollectionReference, VideoReference};
use crate::quality::QualityPolicy;

/// Read-only, run-wide inputs handed to every engine call.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    /// Cookies for authenticated access (may be empty).
    pub credential: &'a Credential,
    /// The run's quality policy.
    pub quality: &'a QualityPolicy,
    /// Proxy leased for the current job, if any.
    pub proxy: Option<&'a str>,
}

/// Metadata reported by the engine for one video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Host-native video id.
    pub video_id: Option<String>,
    /// Video title.
    pub title: Option<String>,
    /// Uploader display name.
    pub author: Option<String>,
    /// Description text.
    pub description: Option<String>,
    /// Publish date (`YYYY-MM-DD` when known).
    pub publish_date: Option<String>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// View count.
    pub view_count: Option<u64>,
    /// Like count.
    pub like_count: Option<u64>,
    /// Thumbnail URL.
    pub thumbnail: Option<String>,
    /// Canonical page URL as reported by the host.
    pub webpage_url: Option<String>,
}

/// A media file produced by the engine in the job's scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Location of the file; valid for the lifetime of the scratch directory.
    pub path: PathBuf,
    /// Size in bytes.
    pub file_size: u64,
    /// Lower-case extension without the dot.
    pub file_extension: String,
    /// Format actually used (the selector, or the engine's own description).
    pub downloaded_format: String,
}

/// The external video fetch collaborator.
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fetches metadata for one video.
    async fn fetch_metadata(
        &self,
        video: &VideoReference,
        ctx: &FetchContext<'_>,
    ) -> Result<VideoMetadata, FetchError>;

    /// Fetches the media for one video into `workdir` using `selector`.
    ///
    /// Returns [`FetchError::FormatUnavailable`] when no stream matches the
    /// selector so the caller can try the next candidate.
    async fn fetch_media(
        &self,
        video: &VideoReference,
        selector: &str,
        ctx: &FetchContext<'_>,
        workdir: &Path,
    ) -> Result<MediaFile, FetchError>;

    /// Lists member video URLs of a collection in host order, at most
    /// `collection.max_items` when that is non-zero.
    async fn list_collection(
        &self,
        collection: &CollectionReference,
        ctx: &FetchContext<'_>,
    ) -> Result<Vec<String>, FetchError>;
}
