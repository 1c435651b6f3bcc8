//! Filesystem-backed object store. Each bucket is a directory under `root`.

use crate::core::error::{RatesError, Result};
use crate::providers::ObjectStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

/// Rejects keys that would escape the bucket directory.
fn object_path(bucket_dir: &Path, key: &str) -> Result<PathBuf> {
    let key = key.trim_start_matches('/');
    if key.is_empty() || key.split('/').any(|part| part == "..") {
        return Err(RatesError::InvalidLocation(key.to_string()));
    }
    Ok(bucket_dir.join(key))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let bucket_dir = self.bucket_dir(bucket);
        let mut keys = Vec::new();
        let mut pending = vec![bucket_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(RatesError::storage(dir.display().to_string(), e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| RatesError::storage(dir.display().to_string(), e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| RatesError::storage(path.display().to_string(), e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        debug!(%bucket, %prefix, count = keys.len(), "Listed local objects");
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = object_path(&self.bucket_dir(bucket), key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RatesError::storage(path.display().to_string(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_is_recursive_and_prefix_filtered() {
        let dir = tempdir().unwrap();
        let meta = dir.path().join("bucket/silver/tbl/metadata");
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(meta.join("00001-a.metadata.json"), "{}").unwrap();
        std::fs::write(meta.join("00002-b.metadata.json"), "{}").unwrap();
        std::fs::create_dir_all(dir.path().join("bucket/silver/other")).unwrap();
        std::fs::write(dir.path().join("bucket/silver/other/x.json"), "{}").unwrap();

        let store = LocalObjectStore::new(dir.path());
        let keys = store.list("bucket", "silver/tbl/metadata/").await.unwrap();

        assert_eq!(
            keys,
            vec![
                "silver/tbl/metadata/00001-a.metadata.json",
                "silver/tbl/metadata/00002-b.metadata.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_bucket_lists_empty() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());

        assert!(store.list("nope", "silver/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_existing_and_missing() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bucket/a")).unwrap();
        std::fs::write(dir.path().join("bucket/a/b.json"), "hello").unwrap();
        let store = LocalObjectStore::new(dir.path());

        assert_eq!(
            store.get("bucket", "a/b.json").await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(store.get("bucket", "a/c.json").await.unwrap(), None);
        assert!(store.get("bucket", "../secret").await.is_err());
    }
}
