//! The unit of work in a job graph.

use super::JobContext;
use crate::core::{JobKind, JobOutput};
use async_trait::async_trait;
use std::fmt::Debug;

/// A job in the release graph.
///
/// Jobs never return errors: every outcome, including failure, is a
/// [`JobOutput`]. A job whose future is dropped (run cancelled) is recorded
/// as `Cancel` by the graph.
#[async_trait]
pub trait Job: Send + Sync + Debug {
    /// Returns the name of the job.
    fn name(&self) -> &str;

    /// Returns the phase this job belongs to.
    fn kind(&self) -> JobKind {
        JobKind::Task
    }

    /// Executes the job.
    async fn execute(&self, ctx: &JobContext) -> JobOutput;
}
