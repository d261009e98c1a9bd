//! The tag-triggered release pipeline.
//!
//! One run is: evaluate the pushed ref against the tag filter, expand the
//! build matrix into one wheel job per entry plus the sdist job, run them
//! all concurrently, and start the publisher only once every one of them
//! finished `Ok`.

use super::jobs::{PublishJob, SdistJob, WheelJob, SDIST_JOB_NAME};
use super::{
    FailurePolicy, Job, JobContext, JobEvent, JobGraph, JobGraphBuilder, JobSpec, PipelineState,
    RunIdentity, RunReport, StateMachine,
};
use crate::cancellation::CancellationToken;
use crate::config::ReleaseConfig;
use crate::core::JobKind;
use crate::errors::{ConfigError, ReleaseError};
use crate::events::{names, EventSink, NoOpEventSink};
use crate::matrix::BuildMatrix;
use crate::publish::{CredentialProvider, PackageIndex};
use crate::store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
use crate::tools::{BuildTool, CibuildwheelTool, PypaBuildTool, SourceArchiveTool};
use crate::trigger::{TagFilter, TriggerDecision, TriggerEvent};
use crate::utils::GlobPattern;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

const GRAPH_NAME: &str = "release";

/// Builder for [`ReleasePipeline`].
///
/// Collaborators that are not set fall back to the process-backed build
/// tools, a store chosen by `artifacts.store_dir` and, with the `http`
/// feature, the upload client and trusted publishing.
pub struct ReleasePipelineBuilder {
    config: ReleaseConfig,
    build_tool: Option<Arc<dyn BuildTool>>,
    sdist_tool: Option<Arc<dyn SourceArchiveTool>>,
    store: Option<Arc<dyn ArtifactStore>>,
    index: Option<Arc<dyn PackageIndex>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    events: Arc<dyn EventSink>,
    cancel: Option<Arc<CancellationToken>>,
}

impl ReleasePipelineBuilder {
    /// Starts a builder for `config`.
    #[must_use]
    pub fn new(config: ReleaseConfig) -> Self {
        Self {
            config,
            build_tool: None,
            sdist_tool: None,
            store: None,
            index: None,
            credentials: None,
            events: Arc::new(NoOpEventSink),
            cancel: None,
        }
    }

    /// Sets the wheel build tool.
    #[must_use]
    pub fn with_build_tool(mut self, tool: Arc<dyn BuildTool>) -> Self {
        self.build_tool = Some(tool);
        self
    }

    /// Sets the source distribution tool.
    #[must_use]
    pub fn with_sdist_tool(mut self, tool: Arc<dyn SourceArchiveTool>) -> Self {
        self.sdist_tool = Some(tool);
        self
    }

    /// Sets the artifact store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the package index.
    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn PackageIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the credential provider.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Uses an external cancellation token; cancelling it aborts the
    /// current run.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Validates the configuration and assembles the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, if the build tool
    /// cannot build a matrix entry's platform on this host, or if no package
    /// index or credential provider is available.
    pub fn build(self) -> Result<ReleasePipeline, ReleaseError> {
        self.config.validate()?;
        let matrix = BuildMatrix::expand(&self.config.matrix, &self.config.artifacts.prefix)?;
        let filter = TagFilter::new(self.config.tag_patterns()?);

        let python = self.config.build.python.clone();
        let build_tool = self
            .build_tool
            .unwrap_or_else(|| Arc::new(CibuildwheelTool::new(python.clone())));
        let sdist_tool = self
            .sdist_tool
            .unwrap_or_else(|| Arc::new(PypaBuildTool::new(python)));
        if let Some(entry) = matrix
            .entries()
            .iter()
            .find(|entry| !build_tool.supports(entry.platform))
        {
            return Err(ConfigError::invalid(
                "matrix.os",
                format!(
                    "'{}' needs a {} host; run that entry on a matching runner or drop it from the matrix",
                    entry.os, entry.platform
                ),
            )
            .into());
        }
        let store = self.store.unwrap_or_else(|| match &self.config.artifacts.store_dir {
            Some(dir) => Arc::new(FsArtifactStore::new(dir.clone())) as Arc<dyn ArtifactStore>,
            None => Arc::new(InMemoryArtifactStore::new()),
        });
        let (index, credentials) = default_publishing(&self.config, self.index, self.credentials)?;

        Ok(ReleasePipeline {
            config: self.config,
            matrix,
            filter,
            build_tool,
            sdist_tool,
            store,
            index,
            credentials,
            events: self.events,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

#[cfg(feature = "http")]
fn default_publishing(
    config: &ReleaseConfig,
    index: Option<Arc<dyn PackageIndex>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
) -> Result<(Arc<dyn PackageIndex>, Arc<dyn CredentialProvider>), ReleaseError> {
    use crate::publish::{HttpPackageIndex, TrustedPublishingProvider};

    let index = index.unwrap_or_else(|| {
        Arc::new(HttpPackageIndex::new(config.publish.repository_url.clone()))
    });
    let credentials = credentials.unwrap_or_else(|| {
        Arc::new(TrustedPublishingProvider::from_env(
            config.publish.audience_url.clone(),
            config.publish.mint_token_url.clone(),
        ))
    });
    Ok((index, credentials))
}

#[cfg(not(feature = "http"))]
fn default_publishing(
    _config: &ReleaseConfig,
    index: Option<Arc<dyn PackageIndex>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
) -> Result<(Arc<dyn PackageIndex>, Arc<dyn CredentialProvider>), ReleaseError> {
    let index = index.ok_or_else(|| {
        ConfigError::invalid(
            "publish.repository_url",
            "no package index configured (enable `http`)",
        )
    })?;
    let credentials = credentials.ok_or_else(|| {
        ConfigError::invalid(
            "publish.environment",
            "no credential provider configured (enable `http`)",
        )
    })?;
    Ok((index, credentials))
}

/// A configured release pipeline, reusable across runs.
pub struct ReleasePipeline {
    config: ReleaseConfig,
    matrix: BuildMatrix,
    filter: TagFilter,
    build_tool: Arc<dyn BuildTool>,
    sdist_tool: Arc<dyn SourceArchiveTool>,
    store: Arc<dyn ArtifactStore>,
    index: Arc<dyn PackageIndex>,
    credentials: Arc<dyn CredentialProvider>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl ReleasePipeline {
    /// Starts a builder.
    #[must_use]
    pub fn builder(config: ReleaseConfig) -> ReleasePipelineBuilder {
        ReleasePipelineBuilder::new(config)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    /// Returns the expanded build matrix.
    #[must_use]
    pub fn matrix(&self) -> &BuildMatrix {
        &self.matrix
    }

    /// Returns the external cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Decides whether `event` starts a run, without running anything.
    #[must_use]
    pub fn check(&self, event: &TriggerEvent) -> TriggerDecision {
        self.filter.evaluate(event)
    }

    /// Builds the job graph for one run.
    ///
    /// # Errors
    ///
    /// Returns an error if a job cannot be constructed or the graph does
    /// not validate.
    pub fn job_graph(&self) -> Result<JobGraph, ReleaseError> {
        let mut builder = JobGraphBuilder::new(GRAPH_NAME)
            .with_failure_policy(FailurePolicy::from_fail_fast(self.config.matrix.fail_fast));

        let mut publish_needs = Vec::with_capacity(self.matrix.len() + 1);
        for entry in self.matrix.entries() {
            let job = WheelJob::new(entry.clone(), &self.config, self.build_tool.clone())?;
            publish_needs.push(job.name().to_string());
            builder = builder.job(JobSpec::new(Arc::new(job)))?;
        }

        let sdist = SdistJob::new(&self.config, self.sdist_tool.clone())?;
        builder = builder.job(JobSpec::new(Arc::new(sdist)))?;
        publish_needs.push(SDIST_JOB_NAME.to_string());

        let publish = PublishJob::new(&self.config, self.index.clone(), self.credentials.clone())?;
        builder = builder.job(JobSpec::new(Arc::new(publish)).with_needs(publish_needs))?;

        Ok(builder.build()?)
    }

    /// Runs the pipeline for one pushed ref.
    ///
    /// Never returns an error: every outcome, including configuration and
    /// job failures, is described by the report.
    pub async fn run(&self, event: &TriggerEvent) -> RunReport {
        let start = Instant::now();
        let identity = RunIdentity::new();
        let decision = self.filter.evaluate(event);
        let mut report = RunReport::new(&identity, &event.git_ref, decision.clone());

        let tag = match decision {
            TriggerDecision::Run { tag } => tag,
            TriggerDecision::Ignore { reason } => {
                tracing::info!(git_ref = %event.git_ref, %reason, "Ref ignored, nothing to do");
                self.events.try_emit(
                    names::PIPELINE_IGNORED,
                    Some(serde_json::json!({
                        "run_id": identity.run_id,
                        "git_ref": event.git_ref,
                        "reason": reason,
                    })),
                );
                report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                return report;
            }
        };

        let span = tracing::info_span!("release", run_id = %identity.run_id, %tag);
        self.run_triggered(identity, event, tag, report)
            .instrument(span)
            .await
    }

    async fn run_triggered(
        &self,
        identity: RunIdentity,
        event: &TriggerEvent,
        tag: String,
        mut report: RunReport,
    ) -> RunReport {
        let start = Instant::now();
        let mut machine = StateMachine::new();
        self.advance(&mut machine, PipelineState::Triggered);
        self.events.try_emit(
            names::PIPELINE_TRIGGERED,
            Some(serde_json::json!({
                "run_id": identity.run_id,
                "git_ref": event.git_ref,
                "tag": tag,
                "matrix_entries": self.matrix.len(),
            })),
        );

        if let Err(err) = self.prepare().await {
            self.abort(&mut machine, &mut report, &err);
            report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            return report;
        }
        let graph = match self.job_graph() {
            Ok(graph) => graph,
            Err(err) => {
                self.abort(&mut machine, &mut report, &err);
                report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
                return report;
            }
        };
        let kinds: BTreeMap<String, JobKind> = graph
            .job_names()
            .iter()
            .filter_map(|name| graph.job(name).map(|spec| (name.clone(), spec.kind)))
            .collect();

        self.advance(&mut machine, PipelineState::Building);

        let run_token = Arc::new(CancellationToken::new());
        let forward = {
            let external = self.cancel.clone();
            let run_token = run_token.clone();
            tokio::spawn(async move {
                external.cancelled().await;
                run_token.cancel(external.reason().unwrap_or_else(|| "cancelled".to_string()));
            })
        };

        let ctx = JobContext::new(identity, self.store.clone(), self.config.work_dir.clone())
            .with_cancellation(run_token)
            .with_event_sink(self.events.clone());

        let result = graph
            .execute_with(&ctx, |event| {
                if let JobEvent::Scheduled {
                    kind: JobKind::Publish,
                    ..
                } = event
                {
                    self.advance(&mut machine, PipelineState::Publishing);
                }
            })
            .await;
        forward.abort();

        if result.success {
            self.advance(&mut machine, PipelineState::Done);
        }
        if machine.state() != PipelineState::Done {
            self.fail(&mut machine);
        }

        report.absorb(result, &kinds);
        report.state = machine.state();
        report.state_history = machine.history().to_vec();
        report.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(
            state = %report.state,
            failure = ?report.failure,
            published = report.published.len(),
            duration_ms = report.duration_ms,
            "Release run finished"
        );
        report
    }

    /// Artifacts belong to one run: keys under the artifact prefix left by
    /// an earlier run sharing the store are dropped, nothing else is. The
    /// build tool is provisioned here, once, before any wheel job starts.
    async fn prepare(&self) -> Result<(), ReleaseError> {
        let stale = GlobPattern::prefix(&self.config.artifacts.prefix)?;
        let removed = self.store.purge(&stale).await?;
        if removed > 0 {
            tracing::info!(removed, prefix = %self.config.artifacts.prefix, "Dropped artifacts of an earlier run");
        }
        self.build_tool.prepare(&self.config.build.tool_version).await?;
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        Ok(())
    }

    fn abort(&self, machine: &mut StateMachine, report: &mut RunReport, err: &ReleaseError) {
        tracing::error!(error = %err, "Release run could not start");
        self.fail(machine);
        report.failure = Some(err.kind());
        report.error = Some(err.to_string());
        report.state = machine.state();
        report.state_history = machine.history().to_vec();
    }

    fn advance(&self, machine: &mut StateMachine, next: PipelineState) {
        let from = machine.state();
        match machine.transition(next) {
            Ok(()) => self.emit_state(from, next),
            Err(e) => tracing::warn!(error = %e, "Ignoring pipeline state change"),
        }
    }

    fn fail(&self, machine: &mut StateMachine) {
        let from = machine.state();
        machine.fail();
        if machine.state() != from {
            self.emit_state(from, PipelineState::Failed);
        }
    }

    fn emit_state(&self, from: PipelineState, to: PipelineState) {
        self.events.try_emit(
            names::PIPELINE_STATE,
            Some(serde_json::json!({ "from": from, "to": to })),
        );
    }
}

impl fmt::Debug for ReleasePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleasePipeline")
            .field("matrix", &self.matrix)
            .field("filter", &self.filter)
            .field("store", &self.store)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
