//! Core domain model types for releaseflow.
//!
//! This module contains the fundamental types shared by every job:
//! - Job status and kind enums
//! - Job output type with factory methods

mod output;
mod status;

pub use output::JobOutput;
pub use status::{JobKind, JobStatus};
