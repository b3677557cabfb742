//! In-memory blob store, used as a test double.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::keys::is_safe_key;
use crate::{BlobStore, StoreError};

/// Blob store holding everything in a map. Not for production use.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        if !is_safe_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.blobs.lock().unwrap().contains_key(key))
    }

    async fn size_of(&self, key: &str) -> Result<i64, StoreError> {
        self.blobs
            .lock()
            .unwrap()
            .get(key)
            .map(|b| b.len() as i64)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.blobs.lock().unwrap().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn behaves_like_a_store() {
        let store = MemoryBlobStore::new();
        store.put("a/b/c.png", b"data").await.unwrap();
        assert!(store.exists("a/b/c.png").await.unwrap());
        assert_eq!(store.get("a/b/c.png").await.unwrap(), b"data");
        assert_eq!(store.list_keys().await.unwrap(), vec!["a/b/c.png"]);
        store.delete("a/b/c.png").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_key_errors_match_local_store() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.get("x/y.png").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            store.delete("x/y.png").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
