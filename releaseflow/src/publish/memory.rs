//! In-memory package index.

use super::{read_distributions, PackageIndex, PublishCredential, PublishReceipt};
use crate::errors::PublishRejection;
use crate::utils::now_utc;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;

/// Package index kept in memory.
///
/// A publish is all-or-nothing: if any file already exists, nothing from
/// that call is recorded.
#[derive(Debug, Default)]
pub struct InMemoryPackageIndex {
    files: Mutex<BTreeMap<String, String>>,
    required_token: Option<String>,
    calls: Mutex<usize>,
}

impl InMemoryPackageIndex {
    /// Creates an empty index that accepts any token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accepts credentials carrying `token`.
    #[must_use]
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Pre-populates file names as already published.
    #[must_use]
    pub fn with_existing<I, S>(self, file_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut files = self.files.lock();
            for name in file_names {
                files.insert(name.into(), String::new());
            }
        }
        self
    }

    /// Returns every published file name, sorted.
    #[must_use]
    pub fn published_files(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    /// Returns the sha256 recorded for a published file.
    #[must_use]
    pub fn digest_of(&self, file_name: &str) -> Option<String> {
        self.files.lock().get(file_name).cloned()
    }

    /// Returns how many times `publish` was called.
    #[must_use]
    pub fn publish_calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl PackageIndex for InMemoryPackageIndex {
    async fn publish(
        &self,
        dist_dir: &Path,
        credential: &PublishCredential,
    ) -> Result<PublishReceipt, PublishRejection> {
        *self.calls.lock() += 1;

        if let Some(required) = &self.required_token {
            if credential.token() != required {
                return Err(PublishRejection::Forbidden {
                    message: "invalid or non-existent authentication information".to_string(),
                });
            }
        }

        let distributions = read_distributions(dist_dir).await?;

        let mut files = self.files.lock();
        if let Some((dist, _)) = distributions
            .iter()
            .find(|(dist, _)| files.contains_key(&dist.file_name))
        {
            return Err(PublishRejection::AlreadyExists {
                file_name: dist.file_name.clone(),
            });
        }

        let mut published = Vec::with_capacity(distributions.len());
        for (dist, file) in distributions {
            files.insert(dist.file_name.clone(), file.sha256);
            published.push(dist.file_name);
        }

        Ok(PublishReceipt {
            repository: "memory".to_string(),
            files: published,
            published_at: now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::CredentialSource;
    use pretty_assertions::assert_eq;

    fn credential(token: &str) -> PublishCredential {
        PublishCredential::new(token, "pypi", CredentialSource::Static)
    }

    fn dist_dir(names: &[&str]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(tmp.path().join(name), name).unwrap();
        }
        tmp
    }

    #[tokio::test]
    async fn test_publish_records_files() {
        let index = InMemoryPackageIndex::new();
        let dir = dist_dir(&["demo-1.0.tar.gz", "demo-1.0-py3-none-any.whl"]);

        let receipt = index.publish(dir.path(), &credential("t")).await.unwrap();
        assert_eq!(receipt.files.len(), 2);
        assert_eq!(
            index.published_files(),
            vec!["demo-1.0-py3-none-any.whl", "demo-1.0.tar.gz"]
        );
        assert!(index.digest_of("demo-1.0.tar.gz").is_some());
    }

    #[tokio::test]
    async fn test_republish_is_rejected_all_or_nothing() {
        let index = InMemoryPackageIndex::new().with_existing(["demo-1.0.tar.gz"]);
        let dir = dist_dir(&["demo-1.0.tar.gz", "demo-1.0-py3-none-any.whl"]);

        let err = index.publish(dir.path(), &credential("t")).await.unwrap_err();
        assert_eq!(
            err,
            PublishRejection::AlreadyExists {
                file_name: "demo-1.0.tar.gz".to_string()
            }
        );
        assert_eq!(index.published_files(), vec!["demo-1.0.tar.gz"]);
        assert_eq!(index.publish_calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_token_is_forbidden() {
        let index = InMemoryPackageIndex::new().with_required_token("good");
        let dir = dist_dir(&["demo-1.0.tar.gz"]);
        assert!(matches!(
            index.publish(dir.path(), &credential("bad")).await,
            Err(PublishRejection::Forbidden { .. })
        ));
    }
}
