//! In-memory artifact store.

use super::{merge_artifacts, validate_key, ArtifactFile, ArtifactStore, StoredArtifact};
use crate::errors::StoreError;
use crate::utils::GlobPattern;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Artifact store backed by a concurrent map; lives as long as the run.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: DashMap<String, StoredArtifact>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns what was written under `key`.
    #[must_use]
    pub fn stored(&self, key: &str) -> Option<StoredArtifact> {
        self.artifacts.get(key).map(|entry| entry.value().clone())
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, key: &str, files: Vec<ArtifactFile>) -> Result<(), StoreError> {
        validate_key(key)?;
        match self.artifacts.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StoreError::KeyExists(key.to_string())),
            Entry::Vacant(slot) => {
                tracing::debug!(key, files = files.len(), "Stored artifact in memory");
                slot.insert(StoredArtifact::new(key, files));
                Ok(())
            }
        }
    }

    async fn get(&self, pattern: &GlobPattern) -> Result<Vec<ArtifactFile>, StoreError> {
        let groups: Vec<(String, Vec<ArtifactFile>)> = self
            .artifacts
            .iter()
            .filter(|entry| pattern.is_match(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().files.clone()))
            .collect();
        merge_artifacts(groups)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.artifacts.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn purge(&self, pattern: &GlobPattern) -> Result<usize, StoreError> {
        let before = self.artifacts.len();
        self.artifacts.retain(|key, _| !pattern.is_match(key));
        Ok(before - self.artifacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn file(name: &str) -> ArtifactFile {
        ArtifactFile::new(name, vec![1, 2, 3]).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get_by_prefix() {
        let store = InMemoryArtifactStore::new();
        store.put("cibw-wheels-a-0", vec![file("a.whl")]).await.unwrap();
        store.put("cibw-sdist", vec![file("pkg.tar.gz")]).await.unwrap();
        store.put("coverage", vec![file("cov.xml")]).await.unwrap();

        let files = store.get(&GlobPattern::prefix("cibw-").unwrap()).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["pkg.tar.gz", "a.whl"]);
    }

    #[tokio::test]
    async fn test_put_twice_is_rejected() {
        let store = InMemoryArtifactStore::new();
        store.put("k", vec![file("a.whl")]).await.unwrap();
        assert_eq!(store.stored("k").unwrap().file_names(), vec!["a.whl"]);
        let err = store.put("k", vec![file("b.whl")]).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyExists(k) if k == "k"));
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let store = InMemoryArtifactStore::new();
        assert!(matches!(
            store.put("a/b", vec![]).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_puts_with_distinct_keys() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .put(&format!("k-{i}"), vec![file(&format!("{i}.whl"))])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.len(), 16);
        assert_eq!(store.get(&GlobPattern::prefix("k-").unwrap()).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_purge_only_matching_keys() {
        let store = InMemoryArtifactStore::new();
        store.put("cibw-sdist", vec![file("a.tar.gz")]).await.unwrap();
        store.put("cibw-wheels-macos-14-0", vec![file("a.whl")]).await.unwrap();
        store.put("other", vec![file("b.whl")]).await.unwrap();

        let removed = store.purge(&GlobPattern::prefix("cibw-").unwrap()).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.keys().await.unwrap(), vec!["other".to_string()]);
    }
}
