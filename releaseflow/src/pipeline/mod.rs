//! Job graphs and the release pipeline.
//!
//! This module provides:
//! - The job trait, job specifications and the graph builder
//! - DAG execution with fail-fast or continue-on-error policies
//! - The release lifecycle state machine
//! - The wheel, sdist and publish jobs and the pipeline that wires them

mod builder;
mod context;
mod graph;
mod job;
mod jobs;
mod release;
mod report;
mod spec;
mod state;


pub use builder::JobGraphBuilder;
pub use context::{JobContext, RunIdentity};
pub use graph::{FailurePolicy, GraphExecutionResult, JobEvent, JobGraph};
pub use job::Job;
pub use jobs::{
    PublishJob, SdistJob, WheelJob, DIST_DIR_NAME, DRY_RUN_REASON, PUBLISH_JOB_NAME, SDIST_JOB_NAME,
};
pub use release::{ReleasePipeline, ReleasePipelineBuilder};
pub use report::RunReport;
pub use spec::JobSpec;
pub use state::{PipelineState, StateMachine, StateTransition};
