//! External build tools.
//!
//! The wheel and source-distribution builders are opaque collaborators:
//! each gets a request naming an output directory and is expected to leave
//! its files there. The jobs then collect whatever matches the configured
//! glob.
//!
//! This module provides:
//! - The [`BuildTool`] and [`SourceArchiveTool`] seams
//! - Process-backed implementations ([`CibuildwheelTool`], [`PypaBuildTool`])
//! - A shared child-process runner

mod cibuildwheel;
pub mod process;
mod sdist;

pub use cibuildwheel::CibuildwheelTool;
pub use process::{run_command, CommandOutput, CommandSpec};
pub use sdist::PypaBuildTool;

use crate::errors::BuildError;
use crate::matrix::{MatrixEntry, Platform};
use crate::store::ArtifactFile;
use crate::utils::GlobPattern;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Everything a wheel build needs for one matrix entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelBuildRequest {
    /// The matrix entry being built.
    pub entry: MatrixEntry,
    /// Rendered build selector (e.g. `cp311-*`).
    pub selector: String,
    /// Minimum supported runtime constraint.
    pub min_runtime: String,
    /// Exact tool version to install.
    pub tool_version: String,
    /// Project checkout.
    pub project_dir: PathBuf,
    /// Isolated directory the tool writes into.
    pub output_dir: PathBuf,
}

/// Everything the source-distribution build needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdistBuildRequest {
    /// Project checkout.
    pub project_dir: PathBuf,
    /// Isolated directory the tool writes into.
    pub output_dir: PathBuf,
}

/// Builds binary wheels for one matrix entry.
#[async_trait]
pub trait BuildTool: Send + Sync + Debug {
    /// Returns true if this tool can build wheels for `platform` from the
    /// current host.
    fn supports(&self, _platform: Platform) -> bool {
        true
    }

    /// Provisions the tool once per run, before any wheel job starts.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` if the pinned version cannot be installed.
    async fn prepare(&self, _tool_version: &str) -> Result<(), BuildError> {
        Ok(())
    }

    /// Builds into `request.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` if the tool fails.
    async fn build_wheels(&self, request: &WheelBuildRequest) -> Result<(), BuildError>;
}

/// Builds the source distribution.
#[async_trait]
pub trait SourceArchiveTool: Send + Sync + Debug {
    /// Builds into `request.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns a `BuildError` if the tool fails.
    async fn build_sdist(&self, request: &SdistBuildRequest) -> Result<(), BuildError>;
}

/// Reads every regular file directly inside `dir` whose name matches
/// `pattern`, in name order.
///
/// # Errors
///
/// Returns `BuildError::Io` if the directory or a file cannot be read.
pub async fn collect_outputs(
    dir: &Path,
    pattern: &GlobPattern,
) -> Result<Vec<ArtifactFile>, BuildError> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| pattern.is_match(n)) {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = ArtifactFile::from_path(&path)
            .await
            .map_err(|e| BuildError::Io(e.to_string()))?;
        files.push(file);
    }
    Ok(files)
}
