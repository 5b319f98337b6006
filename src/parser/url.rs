//! URL validation, canonicalization, and video/collection classification.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use super::error::{MAX_URL_LENGTH, ParseError};

/// Single-video paths on the main host, capturing the numeric video id.
///
/// Checked before the collection patterns so that a channel or album path
/// followed by a video id is treated as one video.
#[allow(clippy::expect_used)]
static VIDEO_PATH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^/(\d+)(?:/[0-9a-f]+)?$",
        r"^/channels/[^/]+/(\d+)$",
        r"^/groups/[^/]+/videos/(\d+)$",
        r"^/(?:album|showcase)/\d+/video/(\d+)$",
        r"^/ondemand/[^/]+/(\d+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("video path regex is valid")) // Static pattern, safe to panic
    .collect()
});

/// Player embed paths, capturing the numeric video id.
#[allow(clippy::expect_used)]
static PLAYER_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/video/(\d+)$").expect("player path regex is valid") // Static pattern, safe to panic
});

/// Album, showcase, channel, group, and user listing paths.
#[allow(clippy::expect_used)]
static COLLECTION_PATH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^/(?:album|showcase)/\d+(?:/videos)?(?:/page:\d+)?$",
        r"^/channels/[^/]+(?:/videos)?(?:/page:\d+)?$",
        r"^/groups/[^/]+(?:/videos)?(?:/page:\d+)?$",
        r"^/user\d+(?:/videos)?$",
        r"^/[^/]+/videos(?:/page:\d+)?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("collection path regex is valid")) // Static pattern, safe to panic
    .collect()
});

/// Shape of a validated URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlShape {
    /// One video. `video_id` is set when the host's id could be read from the path.
    Video {
        /// Host-native video id, when recognizable.
        video_id: Option<String>,
    },
    /// A listing that expands into videos.
    Collection,
}

/// Validates a URL string, accepting scheme-less `host/path` tokens.
///
/// # Validation rules:
/// - Must not exceed `MAX_URL_LENGTH` (2000 chars)
/// - Must be parseable by the `url` crate (after prefixing `https://` when
///   the token has no scheme)
/// - Must use http or https scheme (no ftp, file, etc.)
/// - Must have a host (domain or IP)
pub fn validate_url(raw: &str) -> Result<Url, ParseError> {
    // Check URL length first (prevents memory issues with very long URLs)
    if raw.len() > MAX_URL_LENGTH {
        return Err(ParseError::too_long(raw));
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| ParseError::malformed(raw, &e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(ParseError::unsupported_scheme(raw, scheme)),
    }

    match parsed.host_str() {
        // A bare word like `foo` parses as host `foo`; require a dot or an IP.
        Some(host) if host.contains('.') || host.contains(':') || host == "localhost" => {}
        _ => return Err(ParseError::no_host(raw)),
    }

    Ok(parsed)
}

/// Canonical form used for de-duplication: lower-cased scheme, host, and
/// path with any trailing slash removed; query and fragment dropped.
#[must_use]
pub fn canonical_form(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/').to_ascii_lowercase();
    format!("{}://{host}{port}{path}", url.scheme())
}

/// Run-wide identity for a video URL.
///
/// Recognized host URLs map to `vimeo:{id}` so different URL spellings of
/// one video collapse; anything else falls back to [`canonical_form`].
#[must_use]
pub fn canonical_video_id(url: &Url) -> String {
    match classify_url(url) {
        UrlShape::Video {
            video_id: Some(id),
        } => format!("vimeo:{id}"),
        _ => canonical_form(url),
    }
}

/// Classifies a validated URL by path shape.
///
/// Only the main host can carry collections; everything not matching a
/// collection pattern is a single video, including unrecognized URLs which
/// are left for the fetch engine to reject.
#[must_use]
pub fn classify_url(url: &Url) -> UrlShape {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = url.path().trim_end_matches('/');

    if host == "player.vimeo.com" {
        let video_id = PLAYER_PATH_PATTERN
            .captures(path)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        return UrlShape::Video { video_id };
    }

    if host != "vimeo.com" && host != "www.vimeo.com" {
        trace!(%host, "unrecognized host, treating as single video");
        return UrlShape::Video { video_id: None };
    }

    for pattern in VIDEO_PATH_PATTERNS.iter() {
        if let Some(id) = pattern.captures(path).and_then(|c| c.get(1)) {
            return UrlShape::Video {
                video_id: Some(id.as_str().to_string()),
            };
        }
    }

    let lowered = path.to_ascii_lowercase();
    if COLLECTION_PATH_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(&lowered))
    {
        return UrlShape::Collection;
    }

    UrlShape::Video { video_id: None }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn shape(s: &str) -> UrlShape {
        classify_url(&validate_url(s).unwrap())
    }

    fn video(id: &str) -> UrlShape {
        UrlShape::Video {
            video_id: Some(id.to_string()),
        }
    }

    #[test]
    fn test_validate_url_accepts_https() {
        let url = validate_url("https://vimeo.com/76979871").unwrap();
        assert_eq!(url.as_str(), "https://vimeo.com/76979871");
    }

    #[test]
    fn test_validate_url_prefixes_missing_scheme() {
        let url = validate_url("vimeo.com/76979871").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_validate_url_rejects_ftp() {
        let err = validate_url("ftp://vimeo.com/1").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedScheme { .. }));
    }

    #[test]
    fn test_validate_url_rejects_bare_word() {
        assert!(validate_url("hello").is_err());
        assert!(validate_url("two words").is_err());
    }

    #[test]
    fn test_validate_url_rejects_too_long() {
        let long = format!("https://vimeo.com/{}", "1".repeat(2100));
        assert!(matches!(
            validate_url(&long).unwrap_err(),
            ParseError::TooLong { .. }
        ));
    }

    #[test]
    fn test_canonical_form_strips_query_case_and_trailing_slash() {
        let a = validate_url("HTTPS://Vimeo.COM/Channels/Staffpicks/?page=2#x").unwrap();
        let b = validate_url("https://vimeo.com/channels/staffpicks").unwrap();
        assert_eq!(canonical_form(&a), canonical_form(&b));
        assert_eq!(canonical_form(&b), "https://vimeo.com/channels/staffpicks");
    }

    #[test]
    fn test_classify_single_videos() {
        assert_eq!(shape("https://vimeo.com/76979871"), video("76979871"));
        assert_eq!(shape("https://vimeo.com/76979871/abc123ef"), video("76979871"));
        assert_eq!(shape("https://vimeo.com/channels/staffpicks/123"), video("123"));
        assert_eq!(shape("https://vimeo.com/groups/shortfilms/videos/55"), video("55"));
        assert_eq!(shape("https://vimeo.com/album/9/video/77"), video("77"));
        assert_eq!(shape("https://player.vimeo.com/video/42?h=abc"), video("42"));
    }

    #[test]
    fn test_classify_collections() {
        for url in [
            "https://vimeo.com/album/3953264",
            "https://vimeo.com/showcase/3953264",
            "https://vimeo.com/channels/staffpicks",
            "https://vimeo.com/channels/staffpicks/videos",
            "https://vimeo.com/groups/shortfilms",
            "https://vimeo.com/user12345",
            "https://vimeo.com/someartist/videos",
            "https://www.vimeo.com/album/1/",
        ] {
            assert_eq!(shape(url), UrlShape::Collection, "{url}");
        }
    }

    #[test]
    fn test_classify_ambiguous_is_single_video() {
        assert_eq!(
            shape("https://vimeo.com/someartist"),
            UrlShape::Video { video_id: None }
        );
        assert_eq!(
            shape("https://example.com/album/1"),
            UrlShape::Video { video_id: None }
        );
    }

    #[test]
    fn test_canonical_video_id_collapses_spellings() {
        let page = validate_url("https://vimeo.com/42").unwrap();
        let player = validate_url("https://player.vimeo.com/video/42").unwrap();
        assert_eq!(canonical_video_id(&page), "vimeo:42");
        assert_eq!(canonical_video_id(&page), canonical_video_id(&player));
    }

    #[test]
    fn test_canonical_video_id_falls_back_to_canonical_form() {
        let url = validate_url("https://example.com/Watch?v=1").unwrap();
        assert_eq!(canonical_video_id(&url), "https://example.com/watch");
    }
}
