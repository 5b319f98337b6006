//! Output record types and the pure record assembler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::JobErrorKind;
use crate::fetch::VideoMetadata;
use crate::parser::VideoReference;
use crate::quality::QualityPolicy;

/// Result of a successful media fetch plus store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    /// Record key inside the store.
    pub key: String,
    /// Public URL of the stored file.
    pub download_url: String,
    /// Size in bytes.
    pub file_size: u64,
    /// Extension without the dot.
    pub file_extension: String,
    /// Format selector that produced the file.
    pub downloaded_format: String,
}

/// One successfully processed video.
///
/// Download fields are omitted from the JSON entirely in metadata-only mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputRecord {
    pub video_id: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub publish_date: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub thumbnail: Option<String>,
    pub quality_requested: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_format: Option<String>,
    /// Collection the video was expanded from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collection: Option<String>,
    pub collected_at: DateTime<Utc>,
}

/// Placeholder emitted for a failed job under the error-record policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub error: String,
    pub error_kind: JobErrorKind,
    pub quality_requested: String,
    pub collected_at: DateTime<Utc>,
}

/// One line of the output dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetItem {
    /// A successful job.
    Record(Box<OutputRecord>),
    /// A failed job.
    Error(ErrorRecord),
}

impl DatasetItem {
    /// The output record, if this is one.
    #[must_use]
    pub fn as_record(&self) -> Option<&OutputRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Error(_) => None,
        }
    }

    /// Emission timestamp.
    #[must_use]
    pub fn collected_at(&self) -> DateTime<Utc> {
        match self {
            Self::Record(record) => record.collected_at,
            Self::Error(error) => error.collected_at,
        }
    }

    /// Sets the emission timestamp.
    pub fn set_collected_at(&mut self, at: DateTime<Utc>) {
        match self {
            Self::Record(record) => record.collected_at = at,
            Self::Error(error) => error.collected_at = at,
        }
    }
}

/// Host-native id for a reference, from metadata or the canonical id.
#[must_use]
pub fn video_id_for(video: &VideoReference, metadata: Option<&VideoMetadata>) -> Option<String> {
    metadata
        .and_then(|m| m.video_id.clone())
        .or_else(|| video.canonical_id.strip_prefix("vimeo:").map(ToString::to_string))
}

/// Builds the record for one job. Pure: no I/O, time is passed in.
#[must_use]
pub fn assemble_record(
    video: &VideoReference,
    metadata: &VideoMetadata,
    stored: Option<&StoredMedia>,
    quality: &QualityPolicy,
    collected_at: DateTime<Utc>,
) -> OutputRecord {
    OutputRecord {
        video_id: video_id_for(video, Some(metadata)),
        url: metadata
            .webpage_url
            .clone()
            .unwrap_or_else(|| video.url.clone()),
        title: metadata.title.clone(),
        author: metadata.author.clone(),
        description: metadata.description.clone(),
        publish_date: metadata.publish_date.clone(),
        duration: metadata.duration,
        view_count: metadata.view_count,
        like_count: metadata.like_count,
        thumbnail: metadata.thumbnail.clone(),
        quality_requested: quality.requested_label().to_string(),
        download_url: stored.map(|s| s.download_url.clone()),
        file_path: stored.map(|s| s.key.clone()),
        file_size: stored.map(|s| s.file_size),
        file_extension: stored.map(|s| s.file_extension.clone()),
        downloaded_format: stored.map(|s| s.downloaded_format.clone()),
        source_collection: video.collection_url().map(ToString::to_string),
        collected_at,
    }
}
