//! Error types for the fetch engine boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by a [`FetchEngine`](super::FetchEngine).
///
/// The variants only carry enough structure for the core to decide between
/// "retry", "give up", "try the next format", and "unsupported video".
#[derive(Debug, Error)]
pub enum FetchError {
    /// Temporary failure (timeouts, connection resets, 5xx).
    #[error("temporary failure fetching {url}: {message}")]
    Transient {
        /// The URL being fetched.
        url: String,
        /// Engine-provided detail.
        message: String,
    },

    /// The host is rate limiting requests.
    #[error("rate limited fetching {url}: {message}")]
    RateLimited {
        /// The URL being fetched.
        url: String,
        /// Engine-provided detail.
        message: String,
    },

    /// The host requires a logged-in session for this resource.
    #[error(
        "[AUTH] authentication required for {url}: {message}\n  Suggestion: supply cookies from a logged-in browser session"
    )]
    AuthRequired {
        /// The URL being fetched.
        url: String,
        /// Engine-provided detail.
        message: String,
    },

    /// The resource is private, removed, or does not exist.
    #[error("{url} is unavailable: {message}")]
    Unavailable {
        /// The URL being fetched.
        url: String,
        /// Engine-provided detail.
        message: String,
    },

    /// The video cannot be fetched by design (e.g. DRM protected).
    #[error("unsupported video {url}: {message}")]
    Unsupported {
        /// The URL being fetched.
        url: String,
        /// Engine-provided detail.
        message: String,
    },

    /// No stream matches the requested format selector.
    #[error("requested format `{selector}` is not available for {url}")]
    FormatUnavailable {
        /// The URL being fetched.
        url: String,
        /// The selector that matched nothing.
        selector: String,
    },

    /// Any other failure that retrying will not fix.
    #[error("failed to fetch {url}: {message}")]
    Permanent {
        /// The URL being fetched.
        url: String,
        /// Engine-provided detail.
        message: String,
    },

    /// The engine answered but its output could not be understood.
    #[error("unexpected fetch engine output for {url}: {message}")]
    InvalidResponse {
        /// The URL being fetched.
        url: String,
        /// What was wrong with the output.
        message: String,
    },

    /// Local file system failure (scratch files, cookie files).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The engine process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A retryable failure persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The final error.
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Creates a transient error.
    pub fn transient(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    pub fn permanent(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an unavailable-resource error.
    pub fn unavailable(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-video error.
    pub fn unsupported(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a format-unavailable error.
    pub fn format_unavailable(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::FormatUnavailable {
            url: url.into(),
            selector: selector.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The innermost error, looking through [`FetchError::Exhausted`].
    #[must_use]
    pub fn root(&self) -> &FetchError {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Whether the video is unsupported rather than merely failing.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), Self::Unsupported { .. })
    }

    /// Whether the failure only concerns the requested format.
    #[must_use]
    pub fn is_format_unavailable(&self) -> bool {
        matches!(self.root(), Self::FormatUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_looks_through_exhausted() {
        let err = FetchError::Exhausted {
            attempts: 3,
            last: Box::new(FetchError::unsupported("https://vimeo.com/1", "DRM")),
        };
        assert!(err.is_unsupported());
        assert!(!err.is_format_unavailable());
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_auth_message_has_suggestion() {
        let err = FetchError::AuthRequired {
            url: "https://vimeo.com/1".to_string(),
            message: "login required".to_string(),
        };
        assert!(err.to_string().starts_with("[AUTH]"));
        assert!(err.to_string().contains("cookies"));
    }
}
