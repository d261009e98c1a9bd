//! Job output type with factory methods.

use super::JobStatus;
use crate::errors::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of a job execution.
///
/// Created once by the job (or by the graph for jobs it never ran) and
/// not mutated afterwards apart from the duration the graph stamps on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    /// The status of the job execution.
    pub status: JobStatus,

    /// The artifact store key the job wrote, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<String>,

    /// File names produced (or published) by the job.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Additional job-specific details.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failure classification (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Skip reason (for jobs that never ran).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// Cancel reason (for aborted jobs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: f64,
}

impl Default for JobOutput {
    fn default() -> Self {
        Self::with_status(JobStatus::Ok)
    }
}

impl JobOutput {
    fn with_status(status: JobStatus) -> Self {
        Self {
            status,
            artifact_key: None,
            files: Vec::new(),
            metadata: BTreeMap::new(),
            error: None,
            failure: None,
            skip_reason: None,
            cancel_reason: None,
            duration_ms: 0.0,
        }
    }

    /// Creates a successful output with no artifacts.
    #[must_use]
    pub fn ok() -> Self {
        Self::with_status(JobStatus::Ok)
    }

    /// Creates a successful output recording what was stored.
    #[must_use]
    pub fn stored(key: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            artifact_key: Some(key.into()),
            files,
            ..Self::ok()
        }
    }

    /// Creates a skip output with a reason.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::with_status(JobStatus::Skip)
        }
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            failure: Some(FailureKind::Cancelled),
            ..Self::with_status(JobStatus::Cancel)
        }
    }

    /// Creates a failure output.
    #[must_use]
    pub fn fail(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            failure: Some(kind),
            ..Self::with_status(JobStatus::Fail)
        }
    }

    /// Creates a failure output from a crate error.
    #[must_use]
    pub fn from_error(err: &crate::errors::ReleaseError) -> Self {
        Self::fail(err.kind(), err.to_string())
    }

    /// Sets the produced file names.
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the job succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Ok
    }

    /// Returns true if the job failed or was cancelled.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_output() {
        let output = JobOutput::stored("cibw-sdist", vec!["pkg-1.0.tar.gz".to_string()]);
        assert!(output.is_success());
        assert_eq!(output.artifact_key.as_deref(), Some("cibw-sdist"));
        assert_eq!(output.files.len(), 1);
    }

    #[test]
    fn test_fail_output() {
        let output = JobOutput::fail(FailureKind::Build, "tool exited 1");
        assert!(output.is_failure());
        assert_eq!(output.failure, Some(FailureKind::Build));
        assert_eq!(output.error.as_deref(), Some("tool exited 1"));
    }

    #[test]
    fn test_skip_is_neither_success_nor_failure() {
        let output = JobOutput::skip("dependency not satisfied");
        assert!(!output.is_success());
        assert!(!output.is_failure());
    }

    #[test]
    fn test_serialization_omits_empty_fields() {
        let json = serde_json::to_value(JobOutput::ok()).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json.get("error").is_none());
        assert!(json.get("files").is_none());
    }
}
