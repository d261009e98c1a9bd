//! Job specifications.

use super::Job;
use crate::core::JobKind;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Specification for a single job in a graph.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// The unique name of the job.
    pub name: String,
    /// The job implementation.
    pub runner: Arc<dyn Job>,
    /// Names of jobs that must finish `Ok` before this one starts.
    pub needs: BTreeSet<String>,
    /// The phase of the job.
    pub kind: JobKind,
}

impl JobSpec {
    /// Creates a specification named after the runner.
    #[must_use]
    pub fn new(runner: Arc<dyn Job>) -> Self {
        Self {
            name: runner.name().to_string(),
            kind: runner.kind(),
            runner,
            needs: BTreeSet::new(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_needs(mut self, needs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.needs = needs.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn needs(mut self, dep: impl Into<String>) -> Self {
        self.needs.insert(dep.into());
        self
    }

    /// Sets the job kind.
    #[must_use]
    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    /// Validates the specification on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the job needs itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Job name must not be empty")
                .with_error_info(ContractErrorInfo::new("GRAPH-EMPTY-NAME", "Unnamed job")));
        }
        if self.needs.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Job '{}' cannot need itself",
                self.name
            ))
            .with_jobs(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("GRAPH-SELF-DEP", format!("'{}' needs itself", self.name))
                    .with_fix_hint("Remove the job from its own `needs` list."),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoOpJob;

    #[test]
    fn test_spec_takes_name_and_kind_from_runner() {
        let spec = JobSpec::new(Arc::new(NoOpJob::new("build-sdist").with_kind(JobKind::Sdist)));
        assert_eq!(spec.name, "build-sdist");
        assert_eq!(spec.kind, JobKind::Sdist);
    }

    #[test]
    fn test_needs_are_deduplicated() {
        let spec = JobSpec::new(Arc::new(NoOpJob::new("publish")))
            .with_needs(["a", "b"])
            .needs("a");
        assert_eq!(spec.needs.len(), 2);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let spec = JobSpec::new(Arc::new(NoOpJob::new("a"))).needs("a");
        let err = spec.validate().unwrap_err();
        assert_eq!(err.error_info.unwrap().code, "GRAPH-SELF-DEP");
    }
}
