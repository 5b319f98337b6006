//! Input normalization for video URLs.
//!
//! Turns the raw `urls` input (a single string, a newline or comma separated
//! list, or a JSON array of strings) into an ordered, de-duplicated list of
//! [`Reference`]s.
//!
//! # Example
//!
//! ```
//! use collector_core::parser::{Reference, normalize_urls};
//!
//! let result = normalize_urls("https://vimeo.com/1, https://vimeo.com/2\nhttps://vimeo.com/1", 10);
//! assert_eq!(result.len(), 2);
//! assert!(matches!(result.references[0], Reference::Video(_)));
//! ```

mod error;
mod reference;
mod url;

pub use error::{MAX_URL_LENGTH, ParseError};
pub use reference::{CollectionReference, Reference, ReferenceKind, VideoReference};
pub use url::{UrlShape, canonical_form, canonical_video_id, classify_url, validate_url};

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info, warn};

/// Normalized references plus the tokens that were rejected.
#[derive(Debug, Default)]
pub struct NormalizeResult {
    /// Distinct references in first-seen order.
    pub references: Vec<Reference>,
    /// Tokens that were not usable URLs.
    pub skipped: Vec<String>,
    /// Number of tokens dropped as duplicates.
    pub duplicates: usize,
}

impl NormalizeResult {
    /// Returns true if no references survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Returns the number of references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Iterates over collection references only.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionReference> {
        self.references.iter().filter_map(|r| match r {
            Reference::Collection(c) => Some(c),
            Reference::Video(_) => None,
        })
    }
}

impl fmt::Display for NormalizeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} references ({} skipped, {} duplicates)",
            self.references.len(),
            self.skipped.len(),
            self.duplicates
        )
    }
}

/// Splits raw `urls` text into trimmed, non-empty tokens.
///
/// A value that parses as a JSON array of strings is used verbatim (each
/// element trimmed); a JSON string is a single token. Anything else is split
/// on newlines and then on commas.
#[must_use]
pub fn split_tokens(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return clean_tokens(list);
        }
    } else if trimmed.starts_with('"')
        && let Ok(single) = serde_json::from_str::<String>(trimmed)
    {
        return clean_tokens([single]);
    }

    raw.lines()
        .flat_map(|line| line.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn clean_tokens(tokens: impl IntoIterator<Item = String>) -> Vec<String> {
    tokens
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalizes raw `urls` text into references.
///
/// See [`normalize_tokens`] for classification and de-duplication rules.
#[tracing::instrument(skip(raw), fields(input_len = raw.len()))]
#[must_use]
pub fn normalize_urls(raw: &str, max_items: usize) -> NormalizeResult {
    normalize_tokens(split_tokens(raw), max_items)
}

/// Classifies and de-duplicates already split tokens.
///
/// - Each token is validated; invalid ones are reported in `skipped`.
/// - Tokens are de-duplicated by [`canonical_form`], first occurrence wins.
/// - Collection-shaped URLs become [`CollectionReference`]s bounded by
///   `max_items` (`0` = unlimited); everything else is a single video.
#[must_use]
pub fn normalize_tokens<I, S>(tokens: I, max_items: usize) -> NormalizeResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = NormalizeResult::default();
    let mut seen: HashSet<String> = HashSet::new();

    for token in tokens {
        let token = token.as_ref().trim();
        if token.is_empty() {
            continue;
        }

        let parsed = match validate_url(token) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(token = %e.token(), error = %e, "skipping unusable input token");
                result.skipped.push(token.to_string());
                continue;
            }
        };

        let canonical = canonical_form(&parsed);
        if !seen.insert(canonical.clone()) {
            debug!(url = %parsed, "dropping duplicate reference");
            result.duplicates += 1;
            continue;
        }

        let reference = match classify_url(&parsed) {
            UrlShape::Collection => Reference::Collection(CollectionReference {
                raw_url: token.to_string(),
                url: parsed.to_string(),
                canonical_url: canonical,
                max_items,
            }),
            UrlShape::Video { .. } => Reference::Video(VideoReference {
                raw_url: token.to_string(),
                canonical_id: canonical_video_id(&parsed),
                url: parsed.to_string(),
                kind: ReferenceKind::Single,
            }),
        };
        result.references.push(reference);
    }

    info!(
        references = result.references.len(),
        collections = result.collections().count(),
        skipped = result.skipped.len(),
        duplicates = result.duplicates,
        "normalized input"
    );

    result
}
