//! Quality preference resolution.
//!
//! Maps the run's quality label to a [`QualityPolicy`]: an ordered list of
//! fetch-engine format selectors plus the audio-only flag. Resolution happens
//! once per run, before any network activity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Container forced for audio-only downloads.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Requested stream quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    /// Highest available resolution and bitrate.
    #[default]
    #[serde(rename = "best")]
    Best,
    /// Vertical resolution capped at 1080.
    #[serde(rename = "1080p")]
    P1080,
    /// Vertical resolution capped at 720.
    #[serde(rename = "720p")]
    P720,
    /// Best audio-only stream.
    #[serde(rename = "audio_only")]
    AudioOnly,
}

impl Quality {
    /// Canonical label, as echoed in every output record.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::AudioOnly => "audio_only",
        }
    }

    /// Vertical resolution cap, if any.
    #[must_use]
    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::Best | Self::AudioOnly => None,
        }
    }

    /// Ordered fetch-engine selectors, most preferred first.
    ///
    /// Capped qualities never fall back to an uncapped selector: the last
    /// resort is the best single-file stream at or below the cap.
    #[must_use]
    pub fn selector_candidates(self) -> Vec<String> {
        match self {
            Self::Best => vec![
                "bestvideo*+bestaudio/best".to_string(),
                "bestvideo+bestaudio/best".to_string(),
                "best".to_string(),
            ],
            Self::P1080 | Self::P720 => {
                let h = self.max_height().unwrap_or_default();
                vec![
                    format!("bestvideo*[height<={h}][fps<=60]+bestaudio/best[height<={h}]"),
                    format!("bestvideo*[height<={h}]+bestaudio/best[height<={h}]"),
                    format!("best[height<={h}]"),
                ]
            }
            Self::AudioOnly => vec!["bestaudio/best".to_string()],
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors from quality resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QualityError {
    /// The label is not one of the supported qualities.
    #[error("unrecognized quality '{label}': expected one of best, 1080p, 720p, audio_only")]
    Unrecognized {
        /// The rejected label.
        label: String,
    },
}

impl FromStr for Quality {
    type Err = QualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "1080p" | "1080" => Ok(Self::P1080),
            "720p" | "720" => Ok(Self::P720),
            "audio_only" | "audio" => Ok(Self::AudioOnly),
            _ => Err(QualityError::Unrecognized {
                label: s.to_string(),
            }),
        }
    }
}

/// Resolved, immutable stream selection rule for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityPolicy {
    quality: Quality,
    selectors: Vec<String>,
}

impl QualityPolicy {
    /// Builds the policy for a quality.
    #[must_use]
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            selectors: quality.selector_candidates(),
        }
    }

    /// The resolved quality.
    #[must_use]
    pub fn quality(&self) -> Quality {
        self.quality
    }

    /// Canonical label of the requested quality.
    #[must_use]
    pub fn requested_label(&self) -> &'static str {
        self.quality.label()
    }

    /// Primary fetch-engine selector.
    #[must_use]
    pub fn fetch_engine_selector(&self) -> &str {
        // Every quality has at least one candidate.
        self.selectors.first().map_or("best", String::as_str)
    }

    /// All selectors, in fallback order.
    #[must_use]
    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    /// Whether only an audio stream is wanted.
    #[must_use]
    pub fn audio_only(&self) -> bool {
        self.quality == Quality::AudioOnly
    }

    /// Vertical resolution cap, if any.
    #[must_use]
    pub fn max_height(&self) -> Option<u32> {
        self.quality.max_height()
    }
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::new(Quality::Best)
    }
}

/// Resolves an optional quality label; absent means `best`.
///
/// # Errors
///
/// Returns [`QualityError::Unrecognized`] for any other label.
pub fn resolve_quality(label: Option<&str>) -> Result<QualityPolicy, QualityError> {
    let quality = match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(label) => label.parse()?,
        None => Quality::Best,
    };
    let policy = QualityPolicy::new(quality);
    debug!(
        quality = %policy.quality(),
        selector = policy.fetch_engine_selector(),
        "resolved quality policy"
    );
    Ok(policy)
}
