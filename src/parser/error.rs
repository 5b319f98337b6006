//! Rejection reasons for `urls` input tokens.

use thiserror::Error;

/// Longest token accepted as a URL.
pub const MAX_URL_LENGTH: usize = 2000;

/// Characters of an over-long token kept for reporting.
const PREVIEW_CHARS: usize = 50;

/// Why one input token is not a usable video URL.
///
/// Never fatal on its own: normalization reports the token as skipped and
/// moves on. Only an input where every token is rejected ends the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not http or https.
    #[error("'{token}' uses unsupported scheme '{scheme}'; only http(s) video links are collected")]
    UnsupportedScheme { token: String, scheme: String },

    /// The url crate could not parse the token.
    #[error("'{token}' is not a URL: {reason}")]
    Malformed { token: String, reason: String },

    /// Parsed, but there is no usable host (for example a bare word).
    #[error("'{token}' has no host; expected something like vimeo.com/123")]
    MissingHost { token: String },

    /// Longer than [`MAX_URL_LENGTH`]; usually several lines pasted as one.
    #[error("token of {length} chars exceeds the {MAX_URL_LENGTH} char limit: {preview}...")]
    TooLong { preview: String, length: usize },
}

impl ParseError {
    #[must_use]
    pub fn unsupported_scheme(token: &str, scheme: &str) -> Self {
        Self::UnsupportedScheme {
            token: token.to_string(),
            scheme: scheme.to_string(),
        }
    }

    #[must_use]
    pub fn malformed(token: &str, reason: &str) -> Self {
        Self::Malformed {
            token: token.to_string(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn no_host(token: &str) -> Self {
        Self::MissingHost {
            token: token.to_string(),
        }
    }

    #[must_use]
    pub fn too_long(token: &str) -> Self {
        Self::TooLong {
            preview: token.chars().take(PREVIEW_CHARS).collect(),
            length: token.len(),
        }
    }

    /// The rejected token (a preview for over-long ones).
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::UnsupportedScheme { token, .. }
            | Self::Malformed { token, .. }
            | Self::MissingHost { token } => token,
            Self::TooLong { preview, .. } => preview,
        }
    }
}
