//! Test assertions for job outputs and run reports.

use crate::core::{JobOutput, JobStatus};
use crate::errors::FailureKind;
use crate::pipeline::{PipelineState, RunReport};

/// Asserts that the output indicates success.
pub fn assert_output_succeeded(output: &JobOutput) {
    assert!(
        output.is_success(),
        "Expected success, got status: {:?} (error: {:?})",
        output.status,
        output.error
    );
}

/// Asserts that the output indicates failure.
pub fn assert_output_failed(output: &JobOutput) {
    assert!(
        output.is_failure(),
        "Expected failure, got status: {:?}",
        output.status
    );
}

/// Asserts that the output has the expected status.
pub fn assert_output_status(output: &JobOutput, expected: JobStatus) {
    assert_eq!(
        output.status, expected,
        "Expected status {:?}, got {:?}",
        expected, output.status
    );
}

/// Asserts that the output was skipped with a reason containing `fragment`.
pub fn assert_output_skipped(output: &JobOutput, fragment: &str) {
    assert_output_status(output, JobStatus::Skip);
    let reason = output.skip_reason.as_deref().unwrap_or_default();
    assert!(
        reason.contains(fragment),
        "Expected skip reason containing '{fragment}', got '{reason}'"
    );
}

/// Asserts that the output lists exactly `expected` files, in order.
pub fn assert_output_files(output: &JobOutput, expected: &[&str]) {
    let actual: Vec<&str> = output.files.iter().map(String::as_str).collect();
    assert_eq!(actual, expected, "Unexpected files in job output");
}

/// Asserts the run finished in `expected`.
pub fn assert_report_state(report: &RunReport, expected: PipelineState) {
    assert_eq!(
        report.state, expected,
        "Expected run to end in {expected}, got {} (error: {:?})",
        report.state, report.error
    );
}

/// Asserts the run failed with `expected`.
pub fn assert_report_failure(report: &RunReport, expected: FailureKind) {
    assert_report_state(report, PipelineState::Failed);
    assert_eq!(
        report.failure,
        Some(expected),
        "Expected failure {expected:?}, got {:?}",
        report.failure
    );
}

/// Asserts a job in the report finished with `expected`.
pub fn assert_job_status(report: &RunReport, job: &str, expected: JobStatus) {
    let Some(output) = report.jobs.get(job) else {
        panic!(
            "Job '{job}' missing from report; jobs: {:?}",
            report.jobs.keys().collect::<Vec<_>>()
        );
    };
    assert_output_status(output, expected);
}
