//! Keyed artifact storage shared by the jobs of one run.
//!
//! Builders `put` their outputs under a unique key; the publisher `get`s
//! every key matching a pattern and receives one merged, flat list of
//! files. Writes are append-only: a key can be written once.

mod disk;
mod memory;

pub use disk::FsArtifactStore;
pub use memory::InMemoryArtifactStore;

use crate::errors::StoreError;
use crate::utils::{now_utc, sha256_hex, GlobPattern, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

/// A built distribution file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Bare file name (no directory components).
    pub file_name: String,
    /// File contents.
    #[serde(skip)]
    pub contents: Vec<u8>,
    /// Hex SHA-256 of `contents`.
    pub sha256: String,
}

impl ArtifactFile {
    /// Creates an artifact file from a name and contents.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFileName` if the name is empty, `.`/`..`
    /// or contains a path separator.
    pub fn new(file_name: impl Into<String>, contents: Vec<u8>) -> Result<Self, StoreError> {
        let file_name = file_name.into();
        if !is_valid_component(&file_name) {
            return Err(StoreError::InvalidFileName(file_name));
        }
        let sha256 = sha256_hex(&contents);
        Ok(Self {
            file_name,
            contents,
            sha256,
        })
    }

    /// Reads a produced file from disk, keeping only its file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no usable file name or cannot be read.
    pub async fn from_path(path: &Path) -> Result<Self, StoreError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidFileName(path.display().to_string()))?
            .to_string();
        let contents = tokio::fs::read(path).await?;
        Self::new(file_name, contents)
    }

    /// Returns the size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.contents.len()
    }
}

impl Debug for ArtifactFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactFile")
            .field("file_name", &self.file_name)
            .field("size", &self.contents.len())
            .field("sha256", &self.sha256)
            .finish()
    }
}

/// The files written by one `put`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// The store key.
    pub key: String,
    /// Files in name order.
    pub files: Vec<ArtifactFile>,
    /// When the key was written.
    pub created_at: Timestamp,
}

impl StoredArtifact {
    /// Creates a stored artifact stamped with the current time.
    #[must_use]
    pub fn new(key: impl Into<String>, mut files: Vec<ArtifactFile>) -> Self {
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Self {
            key: key.into(),
            files,
            created_at: now_utc(),
        }
    }

    /// Returns the file names in order.
    #[must_use]
    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.file_name.as_str()).collect()
    }
}

/// Transient keyed storage for build outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync + Debug {
    /// Stores `files` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyExists` if the key was already written and
    /// `StoreError::InvalidKey` for an unusable key.
    async fn put(&self, key: &str, files: Vec<ArtifactFile>) -> Result<(), StoreError>;

    /// Returns the files of every key matching `pattern`, merged into one
    /// list ordered by key then file name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Collision` if two keys hold the same file name.
    async fn get(&self, pattern: &GlobPattern) -> Result<Vec<ArtifactFile>, StoreError>;

    /// Returns every stored key, sorted.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Drops every key matching `pattern` and returns how many were
    /// removed. Anything else the store holds is left alone.
    async fn purge(&self, pattern: &GlobPattern) -> Result<usize, StoreError>;
}

/// Validates a store key.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if is_valid_component(key) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn is_valid_component(name: &str) -> bool {
    !(name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']))
}

/// Flattens `(key, files)` groups into one list, refusing duplicate file
/// names across keys.
///
/// # Errors
///
/// Returns `StoreError::Collision` naming both keys on a duplicate.
pub fn merge_artifacts(
    mut groups: Vec<(String, Vec<ArtifactFile>)>,
) -> Result<Vec<ArtifactFile>, StoreError> {
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    let mut owners: HashMap<String, String> = HashMap::new();
    let mut merged = Vec::new();
    for (key, mut files) in groups {
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        for file in files {
            if let Some(first_key) = owners.get(&file.file_name) {
                return Err(StoreError::Collision {
                    file_name: file.file_name,
                    first_key: first_key.clone(),
                    second_key: key,
                });
            }
            owners.insert(file.file_name.clone(), key.clone());
            merged.push(file);
        }
    }
    Ok(merged)
}
