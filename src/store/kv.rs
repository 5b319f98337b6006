//! HTTP key-value record store.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use tracing::{info, instrument};
use url::Url;

use super::{MediaStore, StoreError, StoredObject};

/// Connect timeout for store requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in a [`StoreError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Stores records at `{base}/v2/key-value-stores/{store_id}/records/{key}`.
///
/// Uploads are streamed from disk. The public download URL is the record URL
/// with `?raw=1`.
#[derive(Clone)]
pub struct KeyValueStore {
    client: Client,
    base_url: Url,
    store_id: String,
    token: Option<String>,
}

impl fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("base_url", &self.base_url.as_str())
            .field("store_id", &self.store_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl KeyValueStore {
    /// Creates a store client.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] when `base_url` is not an
    /// absolute http(s) URL, `store_id` is empty, or the HTTP client cannot
    /// be built.
    pub fn new(
        base_url: &str,
        store_id: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::invalid_config(format!("store URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(StoreError::invalid_config(format!(
                "store URL must be http(s), got '{}'",
                base_url.scheme()
            )));
        }
        let store_id = store_id.into();
        if store_id.trim().is_empty() {
            return Err(StoreError::invalid_config("store id is empty"));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StoreError::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            store_id,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Record URL for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the base URL cannot carry a path.
    pub fn record_url(&self, key: &str) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::invalid_config("store URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v2", "key-value-stores", &self.store_id, "records", key]);
        Ok(url)
    }

    /// Public download URL for `key`.
    ///
    /// # Errors
    ///
    /// Same as [`KeyValueStore::record_url`].
    pub fn download_url(&self, key: &str) -> Result<String, StoreError> {
        let mut url = self.record_url(key)?;
        url.set_query(Some("raw=1"));
        Ok(url.to_string())
    }
}

#[async_trait]
impl MediaStore for KeyValueStore {
    fn name(&self) -> &str {
        "key-value-store"
    }

    #[instrument(skip(self, file), fields(store_id = %self.store_id))]
    async fn put(
        &self,
        key: &str,
        file: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        let handle = tokio::fs::File::open(file)
            .await
            .map_err(|e| StoreError::io(file, e))?;
        let size = handle
            .metadata()
            .await
            .map_err(|e| StoreError::io(file, e))?
            .len();

        let mut request = self
            .client
            .put(self.record_url(key)?)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(handle)));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| StoreError::Http {
            key: key.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(StoreError::Status {
                key: key.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let download_url = self.download_url(key)?;
        info!(key, size, "stored media record");
        Ok(StoredObject {
            key: key.to_string(),
            download_url,
        })
    }
}
