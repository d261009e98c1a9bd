//! Run events for observers.
//!
//! The release pipeline reports its progress through an [`EventSink`]. Event
//! names are the constants in [`names`]; payloads are JSON objects.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names emitted by a run.
pub mod names {
    /// A ref matched the tag filter and a run started.
    pub const PIPELINE_TRIGGERED: &str = "pipeline.triggered";
    /// A ref did not match; nothing runs.
    pub const PIPELINE_IGNORED: &str = "pipeline.ignored";
    /// The pipeline state machine moved.
    pub const PIPELINE_STATE: &str = "pipeline.state";
    /// A job was spawned.
    pub const JOB_STARTED: &str = "job.started";
    /// A job finished `Ok`.
    pub const JOB_COMPLETED: &str = "job.completed";
    /// A job finished `Fail`.
    pub const JOB_FAILED: &str = "job.failed";
    /// A job was never started or chose to skip.
    pub const JOB_SKIPPED: &str = "job.skipped";
    /// A job was aborted.
    pub const JOB_CANCELLED: &str = "job.cancelled";
    /// A builder stored its files.
    pub const ARTIFACT_STORED: &str = "artifact.stored";
    /// The index accepted the release.
    pub const PUBLISH_COMPLETED: &str = "publish.completed";
    /// The index refused the release.
    pub const PUBLISH_REJECTED: &str = "publish.rejected";
}
