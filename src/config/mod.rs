//! Run input and the validated run plan.
//!
//! [`RunInput`] mirrors the JSON input document. [`RunInput::into_plan`]
//! performs every fatal validation up front and yields an immutable
//! [`RunPlan`] that is shared read-only by all jobs.

mod error;

pub use error::RunError;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::auth::{Credential, parse_cookies};
use crate::parser::{Reference, normalize_tokens, normalize_urls};
use crate::proxy::ProxyPool;
use crate::quality::{QualityPolicy, resolve_quality};

/// Default collection bound.
pub const DEFAULT_MAX_ITEMS: usize = 10;

/// Whether to download media or only collect metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Fetch metadata, media, and store the file.
    #[default]
    Videos,
    /// Fetch metadata only.
    MetadataOnly,
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Videos => "videos",
            Self::MetadataOnly => "metadata_only",
        })
    }
}

impl FromStr for DownloadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "videos" | "video" => Ok(Self::Videos),
            "metadata_only" | "metadata" => Ok(Self::MetadataOnly),
            other => Err(format!(
                "unknown download mode '{other}': expected videos or metadata_only"
            )),
        }
    }
}

/// The `urls` field: one string (possibly multi-line or comma separated) or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlsInput {
    /// Free text.
    Text(String),
    /// Explicit list, used verbatim.
    List(Vec<String>),
}

/// The run input document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    #[serde(default)]
    pub urls: Option<UrlsInput>,
    #[serde(default)]
    pub download_mode: DownloadMode,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default)]
    pub cookies: Option<String>,
    #[serde(default)]
    pub proxy_configuration: Option<Value>,
}

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

impl Default for RunInput {
    fn default() -> Self {
        Self {
            urls: None,
            download_mode: DownloadMode::default(),
            quality: None,
            max_items: DEFAULT_MAX_ITEMS,
            cookies: None,
            proxy_configuration: None,
        }
    }
}

impl RunInput {
    /// Creates an input with defaults for everything but `urls`.
    #[must_use]
    pub fn new(urls: UrlsInput) -> Self {
        Self {
            urls: Some(urls),
            ..Self::default()
        }
    }

    /// Parses the JSON input document.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidInput`] if the JSON is malformed or a field
    /// has the wrong type (including a negative `maxItems`).
    pub fn from_json(raw: &str) -> Result<Self, RunError> {
        serde_json::from_str(raw).map_err(|e| RunError::invalid_input(e.to_string()))
    }

    /// Validates the input and builds the run plan.
    ///
    /// Checks run in a fixed order: quality, cookies, proxies, URLs. No
    /// network activity happens here.
    ///
    /// # Errors
    ///
    /// - [`RunError::InvalidQuality`] for an unknown quality label
    /// - [`RunError::InvalidCredentialFormat`] for unparseable cookies
    /// - [`RunError::InvalidProxy`] for a malformed proxy configuration
    /// - [`RunError::NoValidUrls`] when no URL survives normalization
    #[instrument(skip(self), fields(mode = %self.download_mode, max_items = self.max_items))]
    pub fn into_plan(self) -> Result<RunPlan, RunError> {
        let quality = resolve_quality(self.quality.as_deref())?;
        let credential = parse_cookies(self.cookies.as_deref())?;
        let proxies = ProxyPool::from_configuration(self.proxy_configuration.as_ref())?;

        let normalized = match &self.urls {
            Some(UrlsInput::Text(text)) => normalize_urls(text, self.max_items),
            Some(UrlsInput::List(list)) => normalize_tokens(list, self.max_items),
            None => normalize_tokens(Vec::<String>::new(), self.max_items),
        };
        if normalized.is_empty() {
            return Err(RunError::NoValidUrls {
                skipped: normalized.skipped.len(),
            });
        }

        info!(
            references = normalized.len(),
            quality = %quality.quality(),
            cookies = credential.len(),
            proxies = proxies.len(),
            "run plan ready"
        );

        Ok(RunPlan {
            references: normalized.references,
            mode: self.download_mode,
            quality,
            credential,
            max_items: self.max_items,
            proxies,
        })
    }
}

/// Validated, immutable run-wide configuration.
#[derive(Debug, Clone)]
pub struct RunPlan {
    references: Vec<Reference>,
    mode: DownloadMode,
    quality: QualityPolicy,
    credential: Credential,
    max_items: usize,
    proxies: ProxyPool,
}

impl RunPlan {
    /// Normalized references in input order.
    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Download mode.
    #[must_use]
    pub fn mode(&self) -> DownloadMode {
        self.mode
    }

    /// Quality policy.
    #[must_use]
    pub fn quality(&self) -> &QualityPolicy {
        &self.quality
    }

    /// Canonical cookies (possibly empty).
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Collection bound (`0` = unlimited).
    #[must_use]
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Proxy rotation pool.
    #[must_use]
    pub fn proxies(&self) -> &ProxyPool {
        &self.proxies
    }
}
