//! Key-addressed blob storage.
//!
//! The orchestrator treats storage as an opaque put/get/delete/exists
//! surface behind the [`BlobStore`] trait. The local-filesystem provider
//! is the default; the in-memory provider backs tests.

pub mod keys;
pub mod local;
pub mod memory;

use async_trait::async_trait;

/// Errors from a blob storage provider.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-addressed blob store.
///
/// Keys are relative, slash-separated paths produced by [`keys::storage_key`].
/// Reads may happen concurrently from any number of tasks; deletion is the
/// retention sweeper's privilege.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Size of a stored blob in bytes.
    async fn size_of(&self, key: &str) -> Result<i64, StoreError>;

    /// Every key currently held. Used by the orphan sweep to reconcile
    /// storage against the resource registry.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}
