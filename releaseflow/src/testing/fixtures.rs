//! A release pipeline wired entirely to in-memory collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use super::{ScriptedBuildTool, ScriptedSdistTool};
use crate::cancellation::CancellationToken;
use crate::config::ReleaseConfig;
use crate::errors::ReleaseError;
use crate::events::CollectingEventSink;
use crate::pipeline::ReleasePipeline;
use crate::publish::{InMemoryPackageIndex, StaticCredentialProvider};
use crate::store::InMemoryArtifactStore;

/// Package name the fixture's scripted tools build.
pub const FIXTURE_PACKAGE: &str = "demo";
/// Version the fixture's scripted tools build.
pub const FIXTURE_VERSION: &str = "1.0";
/// Token the fixture's credential provider hands out.
pub const FIXTURE_TOKEN: &str = "pypi-test-token";

/// Scripted tools, in-memory store and index, and a collecting event sink.
///
/// The collaborators are kept as `Arc`s so tests can inspect them after a
/// run; the pipeline is built fresh by [`ReleaseFixture::pipeline`].
#[derive(Debug)]
pub struct ReleaseFixture {
    /// Configuration passed to the pipeline.
    pub config: ReleaseConfig,
    /// Wheel build tool.
    pub build_tool: Arc<ScriptedBuildTool>,
    /// Source distribution tool.
    pub sdist_tool: Arc<ScriptedSdistTool>,
    /// Artifact store.
    pub store: Arc<InMemoryArtifactStore>,
    /// Package index.
    pub index: Arc<InMemoryPackageIndex>,
    /// Captured events.
    pub events: Arc<CollectingEventSink>,
    /// External cancellation token.
    pub cancel: Arc<CancellationToken>,
}

impl ReleaseFixture {
    /// Creates a fixture with a two-entry matrix (`ubuntu-latest`,
    /// `windows-latest` x `cp311`) writing into `work_dir`.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let mut config = ReleaseConfig::default();
        config.matrix.os = vec!["ubuntu-latest".to_string(), "windows-latest".to_string()];
        config.matrix.runtime = vec!["cp311".to_string()];
        config.work_dir = work_dir.into();

        Self {
            config,
            build_tool: Arc::new(ScriptedBuildTool::new(FIXTURE_PACKAGE, FIXTURE_VERSION)),
            sdist_tool: Arc::new(ScriptedSdistTool::new(FIXTURE_PACKAGE, FIXTURE_VERSION)),
            store: Arc::new(InMemoryArtifactStore::new()),
            index: Arc::new(InMemoryPackageIndex::new().with_required_token(FIXTURE_TOKEN)),
            events: Arc::new(CollectingEventSink::new()),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Replaces the matrix axes.
    #[must_use]
    pub fn with_matrix(mut self, os: &[&str], runtime: &[&str]) -> Self {
        self.config.matrix.os = os.iter().map(|s| (*s).to_string()).collect();
        self.config.matrix.runtime = runtime.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Sets the matrix fail-fast switch.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.config.matrix.fail_fast = fail_fast;
        self
    }

    /// Publishes in dry-run mode.
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.config.publish.dry_run = true;
        self
    }

    /// Replaces the wheel build tool.
    #[must_use]
    pub fn with_build_tool(mut self, tool: ScriptedBuildTool) -> Self {
        self.build_tool = Arc::new(tool);
        self
    }

    /// Replaces the source distribution tool.
    #[must_use]
    pub fn with_sdist_tool(mut self, tool: ScriptedSdistTool) -> Self {
        self.sdist_tool = Arc::new(tool);
        self
    }

    /// Replaces the package index.
    #[must_use]
    pub fn with_index(mut self, index: InMemoryPackageIndex) -> Self {
        self.index = Arc::new(index);
        self
    }

    /// Builds a pipeline over the fixture's collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture's configuration does not validate.
    pub fn pipeline(&self) -> Result<ReleasePipeline, ReleaseError> {
        ReleasePipeline::builder(self.config.clone())
            .with_build_tool(self.build_tool.clone())
            .with_sdist_tool(self.sdist_tool.clone())
            .with_store(self.store.clone())
            .with_index(self.index.clone())
            .with_credentials(Arc::new(StaticCredentialProvider::new(
                FIXTURE_TOKEN,
                self.config.publish.environment.clone(),
            )))
            .with_event_sink(self.events.clone())
            .with_cancellation(self.cancel.clone())
            .build()
    }
}
