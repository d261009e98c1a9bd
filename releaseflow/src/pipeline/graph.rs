//! Job graph execution.
//!
//! Every job whose `needs` are satisfied is spawned immediately; nothing
//! orders independent jobs. Completions are awaited in whatever order they
//! arrive, and only an `Ok` completion unlocks dependents.

use super::{JobContext, JobSpec};
use crate::core::{JobKind, JobOutput, JobStatus};
use crate::errors::FailureKind;
use crate::events::names;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tokio::task::JoinError;

/// What the graph does after a job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel the run: abort in-flight jobs and start nothing new.
    #[default]
    FailFast,
    /// Let independent jobs finish; only dependents of the failed job are
    /// skipped.
    ContinueOnError,
}

impl FailurePolicy {
    /// Maps the matrix `fail_fast` switch to a policy.
    #[must_use]
    pub fn from_fail_fast(fail_fast: bool) -> Self {
        if fail_fast {
            Self::FailFast
        } else {
            Self::ContinueOnError
        }
    }
}

/// Progress notifications delivered to an execution observer.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A job was spawned.
    Scheduled {
        /// Job name.
        job: String,
        /// Job kind.
        kind: JobKind,
    },
    /// A job reached a terminal status (including jobs never started).
    Finished {
        /// Job name.
        job: String,
        /// Job kind.
        kind: JobKind,
        /// The recorded output.
        output: JobOutput,
    },
}

/// Result of executing a job graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExecutionResult {
    /// Per-job outputs; every job in the graph has one.
    pub outputs: BTreeMap<String, JobOutput>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// True if no job failed or was cancelled.
    pub success: bool,
    /// Why the run did not succeed.
    pub error: Option<String>,
    /// Cancellation reason, if the run token was cancelled.
    pub cancelled: Option<String>,
}

impl GraphExecutionResult {
    /// Returns the output of one job.
    #[must_use]
    pub fn output(&self, job: &str) -> Option<&JobOutput> {
        self.outputs.get(job)
    }

    /// Returns the names of jobs that finished with `status`.
    #[must_use]
    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|(_, o)| o.status == status)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Returns the first failed job's output, in name order.
    #[must_use]
    pub fn first_failure(&self) -> Option<(&str, &JobOutput)> {
        self.outputs
            .iter()
            .find(|(_, o)| o.status == JobStatus::Fail)
            .map(|(n, o)| (n.as_str(), o))
    }
}

type JobCompletion = (String, Result<JobOutput, JoinError>);

/// A validated directed acyclic graph of jobs.
#[derive(Debug)]
pub struct JobGraph {
    name: String,
    jobs: HashMap<String, JobSpec>,
    order: Vec<String>,
    policy: FailurePolicy,
}

impl JobGraph {
    pub(crate) fn new(
        name: String,
        jobs: HashMap<String, JobSpec>,
        order: Vec<String>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            name,
            jobs,
            order,
            policy,
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Returns the failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Returns job names in insertion order.
    #[must_use]
    pub fn job_names(&self) -> &[String] {
        &self.order
    }

    /// Returns a job specification.
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&JobSpec> {
        self.jobs.get(name)
    }

    /// Executes the graph.
    pub async fn execute(&self, ctx: &JobContext) -> GraphExecutionResult {
        self.execute_with(ctx, |_| {}).await
    }

    /// Executes the graph, reporting progress to `observer`.
    ///
    /// The observer runs on the calling task, so it may hold mutable state.
    pub async fn execute_with<F>(&self, ctx: &JobContext, mut observer: F) -> GraphExecutionResult
    where
        F: FnMut(&JobEvent) + Send,
    {
        let start = Instant::now();
        let mut outputs: BTreeMap<String, JobOutput> = BTreeMap::new();
        let mut pending_needs: HashMap<&str, usize> = self
            .jobs
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.needs.len()))
            .collect();
        let mut active: FuturesUnordered<BoxFuture<'static, JobCompletion>> = FuturesUnordered::new();
        let mut error: Option<String> = None;

        tracing::info!(graph = %self.name, jobs = self.jobs.len(), policy = ?self.policy, "Executing job graph");

        for name in &self.order {
            if pending_needs.get(name.as_str()) == Some(&0) {
                active.push(self.spawn_job(name, ctx, &mut observer));
            }
        }

        while let Some((name, joined)) = active.next().await {
            let output = match joined {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!(job = %name, error = %e, "Job task did not complete");
                    JobOutput::fail(FailureKind::Internal, format!("job task did not complete: {e}"))
                }
            };

            let kind = self.jobs.get(&name).map(|s| s.kind).unwrap_or_default();
            if output.status == JobStatus::Fail && error.is_none() {
                error = Some(format!(
                    "Job '{name}' failed: {}",
                    output.error.as_deref().unwrap_or("no error message")
                ));
                if self.policy == FailurePolicy::FailFast {
                    ctx.cancel_token()
                        .cancel(format!("fail-fast: job '{name}' failed"));
                }
            }

            let satisfied = output.status.satisfies_dependents();
            observer(&JobEvent::Finished {
                job: name.clone(),
                kind,
                output: output.clone(),
            });
            outputs.insert(name.clone(), output);

            if !satisfied || ctx.is_cancelled() {
                continue;
            }
            for child in &self.order {
                let Some(spec) = self.jobs.get(child) else {
                    continue;
                };
                if !spec.needs.contains(&name) {
                    continue;
                }
                if let Some(count) = pending_needs.get_mut(child.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 && !outputs.contains_key(child) {
                        active.push(self.spawn_job(child, ctx, &mut observer));
                    }
                }
            }
        }

        let cancelled = ctx.cancel_token().reason();
        for name in &self.order {
            if outputs.contains_key(name) {
                continue;
            }
            let output = self.never_started(name, &outputs, cancelled.as_deref());
            ctx.try_emit_event(
                names::JOB_SKIPPED,
                Some(serde_json::json!({
                    "job": name,
                    "reason": output.skip_reason,
                })),
            );
            observer(&JobEvent::Finished {
                job: name.clone(),
                kind: self.jobs.get(name).map(|s| s.kind).unwrap_or_default(),
                output: output.clone(),
            });
            outputs.insert(name.clone(), output);
        }

        let success = error.is_none() && cancelled.is_none() && !outputs.values().any(JobOutput::is_failure);
        if error.is_none() {
            error = cancelled.as_ref().map(|r| format!("Run cancelled: {r}"));
        }

        GraphExecutionResult {
            outputs,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            success,
            error,
            cancelled,
        }
    }

    fn never_started(
        &self,
        name: &str,
        outputs: &BTreeMap<String, JobOutput>,
        cancelled: Option<&str>,
    ) -> JobOutput {
        let unmet: Vec<String> = self
            .jobs
            .get(name)
            .map(|spec| {
                spec.needs
                    .iter()
                    .filter(|dep| {
                        !outputs
                            .get(*dep)
                            .is_some_and(|o| o.status.satisfies_dependents())
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if unmet.is_empty() {
            let reason = cancelled.unwrap_or("not started");
            return JobOutput::skip(format!("run cancelled before start: {reason}"));
        }
        let mut output = JobOutput::skip(format!("dependency not satisfied ({})", unmet.join(", ")))
            .with_metadata("unmet_needs", serde_json::json!(unmet));
        output.failure = Some(FailureKind::DependencyUnmet);
        output
    }

    fn spawn_job<F>(
        &self,
        name: &str,
        ctx: &JobContext,
        observer: &mut F,
    ) -> BoxFuture<'static, JobCompletion>
    where
        F: FnMut(&JobEvent) + Send,
    {
        let name = name.to_string();
        let Some(spec) = self.jobs.get(&name) else {
            let output = JobOutput::fail(FailureKind::Internal, format!("unknown job '{name}'"));
            return async move { (name, Ok(output)) }.boxed();
        };

        observer(&JobEvent::Scheduled {
            job: name.clone(),
            kind: spec.kind,
        });

        let runner = spec.runner.clone();
        let ctx = ctx.clone();
        let job_name = name.clone();
        let handle = tokio::spawn(async move {
            ctx.try_emit_event(names::JOB_STARTED, Some(serde_json::json!({ "job": &job_name })));
            tracing::info!(job = %job_name, "Job started");

            let job_start = Instant::now();
            let mut output = tokio::select! {
                output = runner.execute(&ctx) => output,
                () = ctx.cancel_token().cancelled() => JobOutput::cancel(
                    ctx.cancel_token().reason().unwrap_or_else(|| "cancelled".to_string()),
                ),
            };
            output.duration_ms = job_start.elapsed().as_secs_f64() * 1000.0;

            report_finished(&ctx, &job_name, &output);
            output
        });

        async move { (name, handle.await) }.boxed()
    }
}

fn report_finished(ctx: &JobContext, job: &str, output: &JobOutput) {
    match output.status {
        JobStatus::Ok => {
            tracing::info!(job, duration_ms = output.duration_ms, "Job completed");
            ctx.try_emit_event(
                names::JOB_COMPLETED,
                Some(serde_json::json!({
                    "job": job,
                    "duration_ms": output.duration_ms,
                    "files": output.files,
                })),
            );
        }
        JobStatus::Skip => {
            tracing::info!(job, reason = ?output.skip_reason, "Job skipped");
            ctx.try_emit_event(
                names::JOB_SKIPPED,
                Some(serde_json::json!({
                    "job": job,
                    "reason": output.skip_reason,
                })),
            );
        }
        JobStatus::Fail => {
            tracing::warn!(job, error = ?output.error, "Job failed");
            ctx.try_emit_event(
                names::JOB_FAILED,
                Some(serde_json::json!({
                    "job": job,
                    "error": output.error,
                    "failure": output.failure,
                    "duration_ms": output.duration_ms,
                })),
            );
        }
        JobStatus::Cancel => {
            tracing::warn!(job, reason = ?output.cancel_reason, "Job cancelled");
            ctx.try_emit_event(
                names::JOB_CANCELLED,
                Some(serde_json::json!({
                    "job": job,
                    "reason": output.cancel_reason,
                })),
            );
        }
        JobStatus::Pending | JobStatus::Running => {}
    }
}
