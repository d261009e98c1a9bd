//! Testing utilities for release pipelines.
//!
//! This module provides:
//! - Mock jobs for graph tests
//! - Scripted build tools that write fake wheels and archives
//! - Assertions for job outputs and run reports
//! - A fixture wiring a pipeline to in-memory collaborators

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_job_status, assert_output_failed, assert_output_files, assert_output_skipped,
    assert_output_status, assert_output_succeeded, assert_report_failure, assert_report_state,
};
pub use fixtures::{ReleaseFixture, FIXTURE_PACKAGE, FIXTURE_TOKEN, FIXTURE_VERSION};
pub use mocks::{FailingJob, NoOpJob, ScriptedBuildTool, ScriptedSdistTool, SlowJob};
