//! File-based blob storage backend.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::BlobStore;

/// File-based blob store: one file per blob under a base directory.
///
/// Writes are atomic: data is written to a temporary file first, then renamed
/// into place. This prevents a half-written journal blob from surviving a
/// crash.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Resolve a blob path to a file path under the base directory.
    ///
    /// Leading slashes are stripped so absolute-looking blob paths stay
    /// inside the store root; traversal segments are rejected.
    fn blob_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let trimmed = path.trim_start_matches('/');

        if trimmed.is_empty() || trimmed.split('/').any(|seg| seg == "..") {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        Ok(self.base_dir.join(trimmed))
    }
}

#[async_trait::async_trait]
impl BlobStore for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let file = self.blob_path(path)?;

        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        let file = self.blob_path(path)?;

        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: temp file in the same directory, then rename.
        let tmp = file.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &file).await?;

        debug!(path, file = %file.display(), size = data.len(), "stored blob to file");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let file = self.blob_path(path)?;

        match tokio::fs::remove_file(&file).await {
            Ok(()) => {
                debug!(path, "deleted blob file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
