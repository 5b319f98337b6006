//! Filesystem-backed store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, instrument};

use super::{MediaStore, StoreError, StoredObject};

/// Copies media into a directory and links to it as `{public_base_url}/{key}`.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    public_base_url: String,
}

impl DirectoryStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Directory records are written to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl MediaStore for DirectoryStore {
    fn name(&self) -> &str {
        "directory"
    }

    #[instrument(skip(self, file, _content_type), fields(root = %self.root.display()))]
    async fn put(
        &self,
        key: &str,
        file: &Path,
        _content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;
        let target = self.root.join(key);
        let size = tokio::fs::copy(file, &target)
            .await
            .map_err(|e| StoreError::io(&target, e))?;

        info!(key, size, "stored media file");
        Ok(StoredObject {
            key: key.to_string(),
            download_url: format!("{}/{key}", self.public_base_url),
        })
    }
}
