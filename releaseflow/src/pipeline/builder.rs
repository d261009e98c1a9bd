//! Job graph builder with validation.

use super::{FailurePolicy, JobGraph, JobSpec};
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use std::collections::{HashMap, HashSet};

/// Builder for validated job graphs.
///
/// Jobs may be added in any order; `needs` edges are resolved in
/// [`JobGraphBuilder::build`].
#[derive(Debug, Clone)]
pub struct JobGraphBuilder {
    name: String,
    jobs: HashMap<String, JobSpec>,
    order: Vec<String>,
    policy: FailurePolicy,
}

impl JobGraphBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: HashMap::new(),
            order: Vec::new(),
            policy: FailurePolicy::default(),
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds a job.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is invalid or the name is taken.
    pub fn job(mut self, spec: JobSpec) -> Result<Self, PipelineValidationError> {
        self.add_job(spec)?;
        Ok(self)
    }

    /// Adds a job in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is invalid or the name is taken.
    pub fn add_job(&mut self, spec: JobSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.jobs.contains_key(&spec.name) {
            return Err(PipelineValidationError::new(format!(
                "Job '{}' is defined twice",
                spec.name
            ))
            .with_jobs(vec![spec.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("GRAPH-DUPLICATE", format!("Duplicate job '{}'", spec.name))
                    .with_fix_hint("Job names must be unique; matrix entries must not repeat."),
            ));
        }

        self.order.push(spec.name.clone());
        self.jobs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Validates the graph and builds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty, a job needs an unknown job,
    /// or the `needs` edges form a cycle.
    pub fn build(self) -> Result<JobGraph, PipelineValidationError> {
        if self.jobs.is_empty() {
            return Err(PipelineValidationError::new("Job graph has no jobs").with_error_info(
                ContractErrorInfo::new("GRAPH-EMPTY", "Cannot build an empty job graph")
                    .with_fix_hint("Add at least one job before building."),
            ));
        }

        for name in &self.order {
            let spec = &self.jobs[name];
            for dep in &spec.needs {
                if !self.jobs.contains_key(dep) {
                    return Err(PipelineValidationError::new(format!(
                        "Job '{}' needs unknown job '{}'",
                        spec.name, dep
                    ))
                    .with_jobs(vec![spec.name.clone(), dep.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "GRAPH-MISSING-DEP",
                            format!("Dependency '{dep}' not found"),
                        )
                        .with_context_entry("job", spec.name.clone())
                        .with_fix_hint("Add the needed job or remove it from `needs`."),
                    ));
                }
            }
        }

        self.detect_cycles()?;

        Ok(JobGraph::new(self.name, self.jobs, self.order, self.policy))
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

    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(spec) = self.jobs.get(node) {
            for dep in &spec.needs {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}
