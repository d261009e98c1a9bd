//! Publishing to a package index.
//!
//! This module provides:
//! - The [`PackageIndex`] and [`CredentialProvider`] seams
//! - Distribution file name parsing
//! - An in-memory index for tests and dry runs
//! - With the `http` feature: the legacy upload API client and the
//!   trusted-publishing credential exchange

mod credential;
pub mod distribution;
#[cfg(feature = "http")]
mod http;
mod memory;
#[cfg(feature = "http")]
mod oidc;

#[cfg(test)]
pub use credential::MockCredentialProvider;
pub use credential::{
    CredentialProvider, CredentialSource, PublishCredential, StaticCredentialProvider,
};
pub use distribution::{DistributionFilename, DistributionKind};
#[cfg(feature = "http")]
pub use http::HttpPackageIndex;
pub use memory::InMemoryPackageIndex;
#[cfg(feature = "http")]
pub use oidc::{TrustedPublishingProvider, ID_TOKEN_REQUEST_TOKEN_VAR, ID_TOKEN_REQUEST_URL_VAR};

use crate::errors::{PublishRejection, StoreError};
use crate::store::ArtifactFile;
use crate::utils::Timestamp;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Acknowledgement of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    /// Index the files went to.
    pub repository: String,
    /// Published file names, in upload order.
    pub files: Vec<String>,
    /// When the index accepted the last file.
    pub published_at: Timestamp,
}

/// A package index accepting a directory of distributions in one call.
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Publishes every distribution in `dist_dir`.
    ///
    /// # Errors
    ///
    /// Returns the index's `PublishRejection`; nothing is retried.
    async fn publish(
        &self,
        dist_dir: &Path,
        credential: &PublishCredential,
    ) -> Result<PublishReceipt, PublishRejection>;
}

/// Writes `files` side by side into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns `StoreError::Collision` if a file name is already present in
/// `dir`, or an IO error.
pub async fn flatten_into(dir: &Path, files: &[ArtifactFile]) -> Result<Vec<PathBuf>, StoreError> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = dir.join(&file.file_name);
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Collision {
                file_name: file.file_name.clone(),
                first_key: dir.display().to_string(),
                second_key: "publish".to_string(),
            });
        }
        tokio::fs::write(&path, &file.contents).await?;
        written.push(path);
    }
    Ok(written)
}

/// Reads and classifies every file in a flattened dist directory, in name
/// order.
///
/// # Errors
///
/// Returns `PublishRejection::Empty` if there is nothing to publish and
/// `PublishRejection::InvalidDistribution` for any non-distribution file.
pub async fn read_distributions(
    dist_dir: &Path,
) -> Result<Vec<(DistributionFilename, ArtifactFile)>, PublishRejection> {
    let io = |e: &dyn std::fmt::Display| PublishRejection::Transport {
        message: format!("reading {}: {e}", dist_dir.display()),
    };

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dist_dir).await.map_err(|e| io(&e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| io(&e))? {
        if entry.file_type().await.map_err(|e| io(&e))?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    if paths.is_empty() {
        return Err(PublishRejection::Empty {
            dir: dist_dir.display().to_string(),
        });
    }

    let mut distributions = Vec::with_capacity(paths.len());
    for path in paths {
        let file = ArtifactFile::from_path(&path).await.map_err(|e| io(&e))?;
        let dist = DistributionFilename::parse(&file.file_name)?;
        distributions.push((dist, file));
    }
    Ok(distributions)
}
