//! Local-filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::keys::is_safe_key;
use crate::{BlobStore, StoreError};

/// Blob store rooted at a directory; keys map to relative paths.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_key(key) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, bytes = bytes.len(), "Blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn size_of(&self, key: &str) -> Result<i64, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len() as i64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // A missing root just means nothing has been stored yet.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Some(key) = relative_key(&self.root, &path) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel.iter().map(|p| p.to_str()).collect::<Option<_>>()?;
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_dir, store) = store();
        store.put("photos/ab/abc.png", b"bytes").await.unwrap();
        assert_eq!(store.get("photos/ab/abc.png").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("photos/ab/missing.png").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_blob() {
        let (_dir, store) = store();
        store.put("results/aa/aaa.png", b"x").await.unwrap();
        store.delete("results/aa/aaa.png").await.unwrap();
        assert!(!store.exists("results/aa/aaa.png").await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.delete("results/aa/zzz.png").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_keys_walks_nested_directories() {
        let (_dir, store) = store();
        store.put("photos/aa/one.png", b"1").await.unwrap();
        store.put("results/bb/two.png", b"2").await.unwrap();
        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys, vec!["photos/aa/one.png", "results/bb/two.png"]);
    }

    #[tokio::test]
    async fn list_keys_of_empty_root_is_empty() {
        let (_dir, store) = store();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let (_dir, store) = store();
        let err = store.put("../escape.png", b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
