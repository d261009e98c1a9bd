//! Summary of one release run.

use super::jobs::{DRY_RUN_REASON, PUBLISH_JOB_NAME};
use super::{GraphExecutionResult, PipelineState, RunIdentity, StateTransition};
use crate::core::{JobKind, JobOutput, JobStatus};
use crate::errors::FailureKind;
use crate::trigger::TriggerDecision;
use crate::utils::Timestamp;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// What happened in a release run, suitable for printing as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique ID of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: Timestamp,
    /// The ref that triggered the run.
    pub git_ref: String,
    /// The matched tag, if the ref triggered a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// The tag filter's decision.
    pub decision: TriggerDecision,
    /// Final lifecycle state.
    pub state: PipelineState,
    /// Every state transition, oldest first.
    pub state_history: Vec<StateTransition>,
    /// Per-job outputs.
    pub jobs: BTreeMap<String, JobOutput>,
    /// Files accepted by the index.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub published: Vec<String>,
    /// Files a dry run would have published.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dry_run_files: Vec<String>,
    /// Failure classification when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Human-readable failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Total duration in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    pub(crate) fn new(identity: &RunIdentity, git_ref: &str, decision: TriggerDecision) -> Self {
        let tag = match &decision {
            TriggerDecision::Run { tag } => Some(tag.clone()),
            TriggerDecision::Ignore { .. } => None,
        };
        Self {
            run_id: identity.run_id,
            started_at: identity.started_at,
            git_ref: git_ref.to_string(),
            tag,
            decision,
            state: PipelineState::Idle,
            state_history: Vec::new(),
            jobs: BTreeMap::new(),
            published: Vec::new(),
            dry_run_files: Vec::new(),
            failure: None,
            error: None,
            duration_ms: 0.0,
        }
    }

    /// Fills the job outputs and derives publish and failure details.
    pub(crate) fn absorb(&mut self, result: GraphExecutionResult, kinds: &BTreeMap<String, JobKind>) {
        if let Some(publish) = result.output(PUBLISH_JOB_NAME) {
            match publish.status {
                JobStatus::Ok => self.published = publish.files.clone(),
                JobStatus::Skip if publish.skip_reason.as_deref() == Some(DRY_RUN_REASON) => {
                    self.dry_run_files = publish.files.clone();
                }
                _ => {}
            }
        }

        if !result.success {
            self.failure = Some(classify_failure(&result, kinds));
            self.error = result.error.clone();
        }
        self.jobs = result.outputs;
    }

    /// Returns true if the run ended in `Done`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Returns true if the ref did not trigger a run.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        !self.decision.should_run()
    }

    /// Returns the names of jobs that finished with `status`.
    #[must_use]
    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|(_, o)| o.status == status)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// The publisher's own failure wins; otherwise the first failed job's kind.
fn classify_failure(result: &GraphExecutionResult, kinds: &BTreeMap<String, JobKind>) -> FailureKind {
    let publish_failure = result
        .outputs
        .iter()
        .filter(|(name, _)| kinds.get(*name) == Some(&JobKind::Publish))
        .find(|(_, o)| o.status == JobStatus::Fail)
        .and_then(|(_, o)| o.failure);
    if let Some(kind) = publish_failure {
        return kind;
    }

    if result.cancelled.is_some() && result.first_failure().is_none() {
        return FailureKind::Cancelled;
    }

    result
        .first_failure()
        .and_then(|(_, o)| o.failure)
        .unwrap_or(FailureKind::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(outputs: Vec<(&str, JobOutput)>, cancelled: Option<&str>) -> GraphExecutionResult {
        let success = outputs.iter().all(|(_, o)| o.is_success()) && cancelled.is_none();
        GraphExecutionResult {
            outputs: outputs
                .into_iter()
                .map(|(n, o)| (n.to_string(), o))
                .collect(),
            duration_ms: 1.0,
            success,
            error: (!success).then(|| "failed".to_string()),
            cancelled: cancelled.map(String::from),
        }
    }

    fn kinds() -> BTreeMap<String, JobKind> {
        BTreeMap::from([
            ("build-wheels-a-cp311".to_string(), JobKind::Wheel),
            ("build-sdist".to_string(), JobKind::Sdist),
            ("publish".to_string(), JobKind::Publish),
        ])
    }

    fn report() -> RunReport {
        RunReport::new(
            &RunIdentity::new(),
            "refs/tags/v1.0",
            TriggerDecision::Run {
                tag: "v1.0".to_string(),
            },
        )
    }

    #[test]
    fn test_publish_files_are_recorded() {
        let mut report = report();
        report.absorb(
            result(
                vec![
                    ("build-sdist", JobOutput::ok()),
                    ("publish", JobOutput::ok().with_files(vec!["demo-1.0.tar.gz".to_string()])),
                ],
                None,
            ),
            &kinds(),
        );
        assert_eq!(report.tag.as_deref(), Some("v1.0"));
        assert_eq!(report.published, vec!["demo-1.0.tar.gz"]);
        assert!(report.failure.is_none());
    }

    #[test]
    fn test_build_failure_is_classified() {
        let mut report = report();
        report.absorb(
            result(
                vec![
                    ("build-wheels-a-cp311", JobOutput::fail(FailureKind::Build, "exit 1")),
                    ("publish", JobOutput::skip("dependency not satisfied (build-wheels-a-cp311)")),
                ],
                Some("fail-fast: job 'build-wheels-a-cp311' failed"),
            ),
            &kinds(),
        );
        assert_eq!(report.failure, Some(FailureKind::Build));
        assert!(report.published.is_empty());
    }

    #[test]
    fn test_publish_rejection_wins() {
        let mut report = report();
        report.absorb(
            result(
                vec![("publish", JobOutput::fail(FailureKind::PublishRejected, "exists"))],
                None,
            ),
            &kinds(),
        );
        assert_eq!(report.failure, Some(FailureKind::PublishRejected));
    }

    #[test]
    fn test_external_cancel_is_classified() {
        let mut report = report();
        report.absorb(
            result(
                vec![("build-sdist", JobOutput::cancel("operator abort"))],
                Some("operator abort"),
            ),
            &kinds(),
        );
        assert_eq!(report.failure, Some(FailureKind::Cancelled));
    }

    #[test]
    fn test_ignored_report_serializes_without_jobs() {
        let report = RunReport::new(
            &RunIdentity::new(),
            "refs/heads/main",
            TriggerDecision::Ignore {
                reason: "'refs/heads/main' is not a tag".to_string(),
            },
        );
        assert!(report.is_ignored());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["decision"]["decision"], "ignore");
        assert!(json.get("tag").is_none());
    }
}
