//! Filesystem-backed artifact store: one directory per key.

use super::{merge_artifacts, validate_key, ArtifactFile, ArtifactStore};
use crate::errors::StoreError;
use crate::utils::GlobPattern;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Artifact store that keeps each key as a directory under `root`.
///
/// Creating the key directory is the write lock: a second `put` for the
/// same key fails because the directory already exists.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_key(&self, key: &str) -> Result<Vec<ArtifactFile>, StoreError> {
        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(key)).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(ArtifactFile::from_path(&entry.path()).await?);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, files: Vec<ArtifactFile>) -> Result<(), StoreError> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let key_dir = self.root.join(key);
        match tokio::fs::create_dir(&key_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::KeyExists(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        for file in &files {
            tokio::fs::write(key_dir.join(&file.file_name), &file.contents).await?;
        }
        tracing::debug!(key, files = files.len(), root = %self.root.display(), "Wrote artifact");
        Ok(())
    }

    async fn get(&self, pattern: &GlobPattern) -> Result<Vec<ArtifactFile>, StoreError> {
        let mut groups = Vec::new();
        for key in self.keys().await? {
            if pattern.is_match(&key) {
                let files = self.read_key(&key).await?;
                groups.push((key, files));
            }
        }
        merge_artifacts(groups)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn purge(&self, pattern: &GlobPattern) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in self.keys().await? {
            if !pattern.is_match(&key) {
                continue;
            }
            match tokio::fs::remove_dir_all(self.root.join(&key)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            tracing::debug!(removed, root = %self.root.display(), "Purged artifact keys");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(name: &str, body: &[u8]) -> ArtifactFile {
        ArtifactFile::new(name, body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path().join("artifacts"));

        store
            .put("cibw-wheels-ubuntu-latest-0", vec![file("a-1.0-cp39.whl", b"a")])
            .await
            .unwrap();
        store
            .put("cibw-sdist", vec![file("a-1.0.tar.gz", b"sdist")])
            .await
            .unwrap();

        let files = store.get(&GlobPattern::prefix("cibw-").unwrap()).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["a-1.0.tar.gz", "a-1.0-cp39.whl"]);
        assert_eq!(files[0].contents, b"sdist");
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path());

        store.put("k", vec![file("a.whl", b"1")]).await.unwrap();
        let err = store.put("k", vec![file("b.whl", b"2")]).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyExists(_)));
    }

    #[tokio::test]
    async fn test_keys_of_missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path().join("nope"));
        assert!(store.keys().await.unwrap().is_empty());
        let removed = store.purge(&GlobPattern::prefix("cibw-").unwrap()).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_root_and_unrelated_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path());
        std::fs::write(tmp.path().join("pyproject.toml"), b"[project]").unwrap();
        std::fs::create_dir(tmp.path().join("src")).unwrap();
        store.put("cibw-sdist", vec![file("a-1.0.tar.gz", b"s")]).await.unwrap();

        let removed = store.purge(&GlobPattern::prefix("cibw-").unwrap()).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.root().exists());
        assert!(tmp.path().join("pyproject.toml").exists());
        assert!(tmp.path().join("src").exists());
        assert_eq!(store.keys().await.unwrap(), vec!["src".to_string()]);
    }
}
