//! In-memory blob storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::BlobStore;

/// In-memory blob store backed by a `RwLock<HashMap>`.
///
/// Useful for testing and for peers configured to run without persistence.
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let map = self.blobs.read().expect("lock poisoned");
        Ok(map.get(path).cloned())
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        if path.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        debug!(path, size = data.len(), "storing blob in memory");
        let mut map = self.blobs.write().expect("lock poisoned");
        map.insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut map = self.blobs.write().expect("lock poisoned");
        map.remove(path);
        debug!(path, "deleted blob from memory");
        Ok(())
    }
}
