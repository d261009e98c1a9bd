//! The release jobs: wheel builds, the sdist build and the publisher.

use super::{Job, JobContext};
use crate::config::ReleaseConfig;
use crate::core::{JobKind, JobOutput};
use crate::errors::{BuildError, ConfigError, CredentialError, ReleaseError};
use crate::events::names;
use crate::matrix::MatrixEntry;
use crate::publish::{flatten_into, CredentialProvider, PackageIndex};
use crate::store::ArtifactFile;
use crate::tools::{collect_outputs, BuildTool, SdistBuildRequest, SourceArchiveTool, WheelBuildRequest};
use crate::utils::{now_utc, GlobPattern};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the source distribution job.
pub const SDIST_JOB_NAME: &str = "build-sdist";
/// Name of the publish job.
pub const PUBLISH_JOB_NAME: &str = "publish";
/// Directory under the work dir the publisher flattens artifacts into.
pub const DIST_DIR_NAME: &str = "dist";
/// Skip reason of a publisher that ran in dry-run mode.
pub const DRY_RUN_REASON: &str = "dry run";

fn failed(err: impl Into<ReleaseError>) -> JobOutput {
    JobOutput::from_error(&err.into())
}

fn file_names(files: &[ArtifactFile]) -> Vec<String> {
    files.iter().map(|f| f.file_name.clone()).collect()
}

/// Recreates `dir` empty so a job never sees stale files.
async fn fresh_dir(dir: &Path) -> Result<(), BuildError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

/// Builds the wheels of one matrix entry and stores them under the entry's
/// artifact key.
pub struct WheelJob {
    name: String,
    entry: MatrixEntry,
    selector: String,
    min_runtime: String,
    tool_version: String,
    project_dir: PathBuf,
    wheel_glob: GlobPattern,
    tool: Arc<dyn BuildTool>,
}

impl WheelJob {
    /// Creates the job for `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured wheel glob does not compile.
    pub fn new(
        entry: MatrixEntry,
        config: &ReleaseConfig,
        tool: Arc<dyn BuildTool>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: entry.job_name(),
            selector: entry.selector(&config.build.selector),
            min_runtime: config.build.min_runtime.clone(),
            tool_version: config.build.tool_version.clone(),
            project_dir: config.build.project_dir.clone(),
            wheel_glob: GlobPattern::new(config.artifacts.wheel_glob.as_str())?,
            entry,
            tool,
        })
    }

    /// Returns the matrix entry.
    #[must_use]
    pub fn entry(&self) -> &MatrixEntry {
        &self.entry
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobOutput, ReleaseError> {
        let output_dir = ctx.work_dir().join(&self.name);
        fresh_dir(&output_dir).await?;

        let request = WheelBuildRequest {
            entry: self.entry.clone(),
            selector: self.selector.clone(),
            min_runtime: self.min_runtime.clone(),
            tool_version: self.tool_version.clone(),
            project_dir: self.project_dir.clone(),
            output_dir: output_dir.clone(),
        };
        tracing::info!(
            job = %self.name,
            platform = %self.entry.platform,
            selector = %self.selector,
            "Building wheels"
        );
        self.tool.build_wheels(&request).await?;

        let files = collect_outputs(&output_dir, &self.wheel_glob).await?;
        if files.is_empty() {
            tracing::warn!(job = %self.name, glob = %self.wheel_glob, "Build produced no wheels");
        }
        let stored = file_names(&files);

        ctx.store().put(&self.entry.artifact_key, files).await?;
        ctx.try_emit_event(
            names::ARTIFACT_STORED,
            Some(serde_json::json!({
                "job": self.name,
                "key": self.entry.artifact_key,
                "files": stored,
            })),
        );

        Ok(JobOutput::stored(self.entry.artifact_key.clone(), stored)
            .with_metadata("os", serde_json::json!(self.entry.os))
            .with_metadata("runtime", serde_json::json!(self.entry.runtime))
            .with_metadata("job_index", serde_json::json!(self.entry.job_index)))
    }
}

impl fmt::Debug for WheelJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WheelJob")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Job for WheelJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> JobKind {
        JobKind::Wheel
    }

    async fn execute(&self, ctx: &JobContext) -> JobOutput {
        self.run(ctx).await.unwrap_or_else(failed)
    }
}

/// Builds the single source distribution.
pub struct SdistJob {
    artifact_key: String,
    project_dir: PathBuf,
    sdist_glob: GlobPattern,
    tool: Arc<dyn SourceArchiveTool>,
}

impl SdistJob {
    /// Creates the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured sdist glob does not compile.
    pub fn new(config: &ReleaseConfig, tool: Arc<dyn SourceArchiveTool>) -> Result<Self, ConfigError> {
        Ok(Self {
            artifact_key: config.sdist_key(),
            project_dir: config.build.project_dir.clone(),
            sdist_glob: GlobPattern::new(config.artifacts.sdist_glob.as_str())?,
            tool,
        })
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobOutput, ReleaseError> {
        let output_dir = ctx.work_dir().join(SDIST_JOB_NAME);
        fresh_dir(&output_dir).await?;

        let request = SdistBuildRequest {
            project_dir: self.project_dir.clone(),
            output_dir: output_dir.clone(),
        };
        tracing::info!(job = SDIST_JOB_NAME, "Building source distribution");
        self.tool.build_sdist(&request).await?;

        let files = collect_outputs(&output_dir, &self.sdist_glob).await?;
        if files.len() != 1 {
            return Err(BuildError::UnexpectedOutput {
                dir: output_dir,
                reason: format!(
                    "expected exactly one file matching '{}', found {} ({})",
                    self.sdist_glob,
                    files.len(),
                    file_names(&files).join(", ")
                ),
            }
            .into());
        }
        let stored = file_names(&files);

        ctx.store().put(&self.artifact_key, files).await?;
        ctx.try_emit_event(
            names::ARTIFACT_STORED,
            Some(serde_json::json!({
                "job": SDIST_JOB_NAME,
                "key": self.artifact_key,
                "files": stored,
            })),
        );

        Ok(JobOutput::stored(self.artifact_key.clone(), stored))
    }
}

impl fmt::Debug for SdistJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdistJob")
            .field("artifact_key", &self.artifact_key)
            .field("sdist_glob", &self.sdist_glob)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Job for SdistJob {
    fn name(&self) -> &str {
        SDIST_JOB_NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::Sdist
    }

    async fn execute(&self, ctx: &JobContext) -> JobOutput {
        self.run(ctx).await.unwrap_or_else(failed)
    }
}

/// Collects every `{prefix}*` artifact, flattens it into one directory and
/// publishes it in a single index call.
pub struct PublishJob {
    pattern: GlobPattern,
    environment: String,
    dry_run: bool,
    index: Arc<dyn PackageIndex>,
    credentials: Arc<dyn CredentialProvider>,
}

impl PublishJob {
    /// Creates the job.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact prefix is not a usable pattern.
    pub fn new(
        config: &ReleaseConfig,
        index: Arc<dyn PackageIndex>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: GlobPattern::prefix(&config.artifacts.prefix)?,
            environment: config.publish.environment.clone(),
            dry_run: config.publish.dry_run,
            index,
            credentials,
        })
    }

    async fn run(&self, ctx: &JobContext) -> Result<JobOutput, ReleaseError> {
        let files = ctx.store().get(&self.pattern).await?;
        let stored = file_names(&files);

        let dist_dir = ctx.work_dir().join(DIST_DIR_NAME);
        fresh_dir(&dist_dir).await?;
        flatten_into(&dist_dir, &files).await?;
        tracing::info!(
            pattern = %self.pattern,
            files = stored.len(),
            dist_dir = %dist_dir.display(),
            "Collected release artifacts"
        );

        if self.dry_run {
            return Ok(JobOutput::skip(DRY_RUN_REASON).with_files(stored));
        }

        let credential = self.credentials.acquire(&self.environment).await?;
        if credential.is_expired(now_utc()) {
            return Err(CredentialError::Expired(self.environment.clone()).into());
        }

        match self.index.publish(&dist_dir, &credential).await {
            Ok(receipt) => {
                ctx.try_emit_event(
                    names::PUBLISH_COMPLETED,
                    Some(serde_json::json!({
                        "repository": receipt.repository,
                        "files": receipt.files,
                    })),
                );
                Ok(JobOutput::ok()
                    .with_files(receipt.files)
                    .with_metadata("repository", serde_json::json!(receipt.repository))
                    .with_metadata("environment", serde_json::json!(self.environment)))
            }
            Err(rejection) => {
                let detail = serde_json::to_value(&rejection).unwrap_or_default();
                ctx.try_emit_event(
                    names::PUBLISH_REJECTED,
                    Some(serde_json::json!({ "rejection": detail })),
                );
                Ok(failed(rejection)
                    .with_files(stored)
                    .with_metadata("rejection", detail))
            }
        }
    }
}

impl fmt::Debug for PublishJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishJob")
            .field("pattern", &self.pattern)
            .field("environment", &self.environment)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Job for PublishJob {
    fn name(&self) -> &str {
        PUBLISH_JOB_NAME
    }

    fn kind(&self) -> JobKind {
        JobKind::Publish
    }

    async fn execute(&self, ctx: &JobContext) -> JobOutput {
        self.run(ctx).await.unwrap_or_else(failed)
    }
}
