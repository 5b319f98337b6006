//! Media storage collaborators.
//!
//! A [`MediaStore`] persists a downloaded file under a record key and returns
//! a publicly fetchable URL for it. Two implementations ship with the crate:
//!
//! - [`KeyValueStore`] - HTTP key-value record store (`PUT` with bearer token)
//! - [`DirectoryStore`] - copies into a local directory served elsewhere

mod directory;
mod error;
mod kv;

pub use directory::DirectoryStore;
pub use error::StoreError;
pub use kv::KeyValueStore;

use std::path::Path;

use async_trait::async_trait;

/// Maximum record key length.
pub const MAX_KEY_LENGTH: usize = 256;

/// Fallback key stem when the video id sanitizes to nothing.
const FALLBACK_KEY_STEM: &str = "video";

/// A persisted media object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Record key inside the store.
    pub key: String,
    /// Stable, publicly fetchable URL.
    pub download_url: String,
}

/// The durable object store collaborator.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Persists `file` under `key`.
    async fn put(
        &self,
        key: &str,
        file: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StoreError>;
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '!' | '-' | '_' | '.' | '\'' | '(' | ')')
}

/// Builds a store-safe record key `{video_id}.{ext}`.
///
/// Characters outside `[A-Za-z0-9!-_.'()]` become `_`. Keys longer than
/// [`MAX_KEY_LENGTH`] are shortened from the stem so the extension survives.
#[must_use]
pub fn safe_record_key(video_id: &str, extension: &str) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| if is_key_char(c) { c } else { '_' })
            .collect()
    };

    let mut stem = sanitize(video_id.trim());
    if stem.is_empty() {
        stem = FALLBACK_KEY_STEM.to_string();
    }
    let ext = sanitize(extension.trim().trim_start_matches('.'));
    let suffix = if ext.is_empty() {
        String::new()
    } else {
        format!(".{ext}")
    };

    // All key characters are ASCII, so byte and char lengths agree.
    let room = MAX_KEY_LENGTH.saturating_sub(suffix.len()).max(1);
    stem.truncate(room);
    let mut key = format!("{stem}{suffix}");
    key.truncate(MAX_KEY_LENGTH);
    key
}

/// MIME type for a media file extension.
#[must_use]
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_record_key_basic() {
        assert_eq!(safe_record_key("76979871", "mp4"), "76979871.mp4");
    }

    #[test]
    fn test_safe_record_key_replaces_unsafe_chars() {
        assert_eq!(safe_record_key("a/b c:d", ".webm"), "a_b_c_d.webm");
        assert_eq!(safe_record_key("it's(1)!", "mp3"), "it's(1)!.mp3");
    }

    #[test]
    fn test_safe_record_key_empty_id_uses_fallback() {
        assert_eq!(safe_record_key("  ", "mp4"), "video.mp4");
        assert_eq!(safe_record_key("1", ""), "1");
    }

    #[test]
    fn test_safe_record_key_truncates_keeping_extension() {
        let key = safe_record_key(&"x".repeat(400), "mp4");
        assert_eq!(key.len(), MAX_KEY_LENGTH);
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn test_safe_record_key_non_ascii() {
        let key = safe_record_key("vidéo", "mp4");
        assert_eq!(key, "vid_o.mp4");
        assert!(key.chars().all(is_key_char));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("mp4"), "video/mp4");
        assert_eq!(content_type_for(".MP3"), "audio/mpeg");
        assert_eq!(content_type_for("mkv"), "video/x-matroska");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }
}
