//! Job status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase of the release a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One wheel build for a single matrix entry.
    Wheel,
    /// The single source distribution build.
    Sdist,
    /// The final upload to the package index.
    Publish,
    /// Anything else (used by ad-hoc graphs and tests).
    Task,
}

impl Default for JobKind {
    fn default() -> Self {
        Self::Task
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wheel => write!(f, "wheel"),
            Self::Sdist => write!(f, "sdist"),
            Self::Publish => write!(f, "publish"),
            Self::Task => write!(f, "task"),
        }
    }
}

/// The execution status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job completed successfully.
    Ok,
    /// Job was not executed (dependency unmet, dry run).
    Skip,
    /// Job was aborted by cancellation or fail-fast.
    Cancel,
    /// Job failed.
    Fail,
    /// Job is waiting for its dependencies.
    Pending,
    /// Job is currently running.
    Running,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Cancel => write!(f, "cancel"),
            Self::Fail => write!(f, "fail"),
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
        }
    }
}

impl JobStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip | Self::Cancel | Self::Fail)
    }

    /// Returns true if dependents of a job in this status may start.
    ///
    /// Only `Ok` satisfies a `needs` edge; a skipped builder must not
    /// unlock the publisher.
    #[must_use]
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail | Self::Cancel)
    }
}
