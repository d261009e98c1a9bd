//! # Releaseflow
//!
//! Tag-triggered release orchestration for Python packages with native
//! extensions.
//!
//! A pushed version tag fans out into one wheel build per `(os, runtime)`
//! matrix entry plus a single source distribution build, all running
//! concurrently. A publisher that needs every one of them collects the
//! stored artifacts and uploads them to a package index in one call using
//! a short-lived trust token.
//!
//! - **Matrix expansion**: cartesian product of platforms and runtimes,
//!   minus exclusions, each with a distinct artifact key
//! - **Job graph execution**: dependency-driven scheduling with fail-fast
//!   or continue-on-error policies and run-wide cancellation
//! - **Pluggable collaborators**: build tools, artifact stores, package
//!   indexes and credential providers behind async traits
//! - **Observability**: `tracing` logs plus an event sink for run events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use releaseflow::prelude::*;
//!
//! let config = ReleaseConfig::resolve("release.yaml")?;
//! let pipeline = ReleasePipeline::builder(config).build()?;
//!
//! let report = pipeline.run(&TriggerEvent::new("refs/tags/v1.2.0")).await;
//! assert_eq!(report.state, PipelineState::Done);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod matrix;
pub mod pipeline;
pub mod publish;
pub mod store;
pub mod testing;
pub mod tools;
pub mod trigger;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ReleaseConfig;
    pub use crate::core::{JobKind, JobOutput, JobStatus};
    pub use crate::errors::{
        BuildError, ConfigError, CredentialError, FailureKind, PublishRejection, ReleaseError,
        StoreError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::matrix::{BuildMatrix, MatrixEntry, Platform};
    pub use crate::pipeline::{
        FailurePolicy, Job, JobContext, JobGraph, JobGraphBuilder, JobSpec, PipelineState,
        ReleasePipeline, ReleasePipelineBuilder, RunReport,
    };
    pub use crate::publish::{CredentialProvider, PackageIndex, PublishCredential};
    pub use crate::store::{ArtifactFile, ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
    pub use crate::tools::{BuildTool, SourceArchiveTool};
    pub use crate::trigger::{TagFilter, TriggerDecision, TriggerEvent};
    pub use crate::utils::{iso_timestamp, GlobPattern, Timestamp};
}
