//! Core trait for blob storage.

use bytes::Bytes;

use crate::error::StoreError;

/// Capability interface for storing whole blobs by path.
///
/// This is the only polymorphic seam the journal needs: a journal persists a
/// single signed blob per peer, read back at startup. All implementations
/// must be `Send + Sync` for use across async tasks.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Retrieve a blob. Returns `None` if no blob exists at `path`.
    async fn get(&self, path: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store a blob at `path`, replacing any previous contents.
    async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError>;

    /// Delete the blob at `path`. Deleting a missing blob is not an error.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}
