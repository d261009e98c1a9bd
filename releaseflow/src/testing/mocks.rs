//! Mock jobs and scripted build tools.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::core::{JobKind, JobOutput};
use crate::errors::{BuildError, FailureKind};
use crate::matrix::{MatrixEntry, Platform};
use crate::pipeline::{Job, JobContext};
use crate::tools::{BuildTool, SdistBuildRequest, SourceArchiveTool, WheelBuildRequest};

/// A job that succeeds without doing anything and counts its calls.
#[derive(Debug)]
pub struct NoOpJob {
    name: String,
    kind: JobKind,
    call_count: Mutex<usize>,
}

impl NoOpJob {
    /// Creates a new no-op job.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: JobKind::Task,
            call_count: Mutex::new(0),
        }
    }

    /// Sets the reported job kind.
    #[must_use]
    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the number of times the job was executed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Job for NoOpJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn execute(&self, _ctx: &JobContext) -> JobOutput {
        *self.call_count.lock() += 1;
        JobOutput::ok()
    }
}

/// A job that always fails.
#[derive(Debug)]
pub struct FailingJob {
    name: String,
    error: String,
    failure: FailureKind,
}

impl FailingJob {
    /// Creates a job failing with a build error.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            failure: FailureKind::Build,
        }
    }

    /// Sets the failure classification.
    #[must_use]
    pub fn with_failure(mut self, failure: FailureKind) -> Self {
        self.failure = failure;
        self
    }
}

#[async_trait]
impl Job for FailingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &JobContext) -> JobOutput {
        JobOutput::fail(self.failure, &self.error)
    }
}

/// A job that takes time to execute.
#[derive(Debug)]
pub struct SlowJob {
    name: String,
    delay: Duration,
}

impl SlowJob {
    /// Creates a new slow job.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Job for SlowJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &JobContext) -> JobOutput {
        tokio::time::sleep(self.delay).await;
        JobOutput::ok()
    }
}

/// Wheel build tool that writes one fake wheel per request.
///
/// Wheels are named `{package}-{version}-{runtime}-{runtime}-{platform}.whl`,
/// so two entries with the same runtime on the same platform produce the
/// same file name.
#[derive(Debug)]
pub struct ScriptedBuildTool {
    package: String,
    version: String,
    failing: HashSet<(String, String)>,
    delay: Option<Duration>,
    platforms: Option<HashSet<Platform>>,
    builds: Mutex<Vec<String>>,
    prepared: Mutex<Vec<String>>,
}

impl ScriptedBuildTool {
    /// Creates a tool building wheels for `package` at `version`.
    #[must_use]
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            failing: HashSet::new(),
            delay: None,
            platforms: None,
            builds: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
        }
    }

    /// Makes the build for `(os, runtime)` exit non-zero.
    #[must_use]
    pub fn failing_on(mut self, os: impl Into<String>, runtime: impl Into<String>) -> Self {
        self.failing.insert((os.into(), runtime.into()));
        self
    }

    /// Sleeps before every build.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Limits the platforms this tool reports as buildable.
    #[must_use]
    pub fn supporting(mut self, platforms: &[Platform]) -> Self {
        self.platforms = Some(platforms.iter().copied().collect());
        self
    }

    /// Returns the tool versions passed to `prepare`, in call order.
    #[must_use]
    pub fn prepared_versions(&self) -> Vec<String> {
        self.prepared.lock().clone()
    }

    /// Returns the job names of every build requested, in call order.
    #[must_use]
    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().clone()
    }

    /// Returns the number of builds requested.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.builds.lock().len()
    }

    /// The wheel file name this tool writes for `entry`.
    #[must_use]
    pub fn wheel_name(&self, entry: &MatrixEntry) -> String {
        let platform_tag = match entry.platform {
            Platform::Linux => "linux_x86_64",
            Platform::Macos => "macosx_11_0_arm64",
            Platform::Windows => "win_amd64",
        };
        format!(
            "{}-{}-{runtime}-{runtime}-{platform_tag}.whl",
            self.package,
            self.version,
            runtime = entry.runtime
        )
    }
}

#[async_trait]
impl BuildTool for ScriptedBuildTool {
    fn supports(&self, platform: Platform) -> bool {
        self.platforms
            .as_ref()
            .map_or(true, |platforms| platforms.contains(&platform))
    }

    async fn prepare(&self, tool_version: &str) -> Result<(), BuildError> {
        self.prepared.lock().push(tool_version.to_string());
        Ok(())
    }

    async fn build_wheels(&self, request: &WheelBuildRequest) -> Result<(), BuildError> {
        self.builds.lock().push(request.entry.job_name());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = (request.entry.os.clone(), request.entry.runtime.clone());
        if self.failing.contains(&key) {
            return Err(BuildError::NonZeroExit {
                program: "cibuildwheel".to_string(),
                code: Some(1),
                stderr_tail: format!("no wheels built for selector {}", request.selector),
            });
        }

        let name = self.wheel_name(&request.entry);
        write_file(&request.output_dir, &name, request.selector.as_bytes()).await
    }
}

/// Source distribution tool that writes a configurable number of archives.
#[derive(Debug)]
pub struct ScriptedSdistTool {
    package: String,
    version: String,
    count: usize,
    fail: bool,
    calls: Mutex<usize>,
}

impl ScriptedSdistTool {
    /// Creates a tool writing `{package}-{version}.tar.gz`.
    #[must_use]
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            count: 1,
            fail: false,
            calls: Mutex::new(0),
        }
    }

    /// Writes `count` archives instead of one.
    #[must_use]
    pub fn producing(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Makes every build exit non-zero.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Returns the number of builds requested.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    /// The archive file name this tool writes first.
    #[must_use]
    pub fn sdist_name(&self) -> String {
        format!("{}-{}.tar.gz", self.package, self.version)
    }
}

#[async_trait]
impl SourceArchiveTool for ScriptedSdistTool {
    async fn build_sdist(&self, request: &SdistBuildRequest) -> Result<(), BuildError> {
        *self.calls.lock() += 1;
        if self.fail {
            return Err(BuildError::NonZeroExit {
                program: "python".to_string(),
                code: Some(1),
                stderr_tail: "ERROR Backend subprocess exited".to_string(),
            });
        }

        for i in 0..self.count {
            let name = if i == 0 {
                self.sdist_name()
            } else {
                format!("{}-{}.post{i}.tar.gz", self.package, self.version)
            };
            write_file(&request.output_dir, &name, b"sdist").await?;
        }
        Ok(())
    }
}

async fn write_file(dir: &Path, name: &str, contents: &[u8]) -> Result<(), BuildError> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(name), contents).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunIdentity;
    use crate::store::InMemoryArtifactStore;
    use crate::core::JobStatus;
    use std::sync::Arc;

    fn ctx() -> JobContext {
        JobContext::new(RunIdentity::new(), Arc::new(InMemoryArtifactStore::new()), "/tmp")
    }

    #[tokio::test]
    async fn test_noop_job_counts_calls() {
        let job = NoOpJob::new("a").with_kind(JobKind::Sdist);
        assert_eq!(job.kind(), JobKind::Sdist);
        job.execute(&ctx()).await;
        job.execute(&ctx()).await;
        assert_eq!(job.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_job() {
        let output = FailingJob::new("a", "boom")
            .with_failure(FailureKind::Internal)
            .execute(&ctx())
            .await;
        assert_eq!(output.status, JobStatus::Fail);
        assert_eq!(output.failure, Some(FailureKind::Internal));
    }

    #[tokio::test]
    async fn test_scripted_sdist_tool_writes_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = ScriptedSdistTool::new("demo", "1.0").producing(2);
        tool.build_sdist(&SdistBuildRequest {
            project_dir: tmp.path().to_path_buf(),
            output_dir: tmp.path().join("out"),
        })
        .await
        .unwrap();

        assert!(tmp.path().join("out/demo-1.0.tar.gz").exists());
        assert!(tmp.path().join("out/demo-1.0.post1.tar.gz").exists());
        assert_eq!(tool.call_count(), 1);
    }
}
