//! Error types for releaseflow.
//!
//! Every failure a release run can hit is represented here: graph
//! validation problems, configuration mistakes, external build tool
//! failures, artifact store conflicts, credential problems and index
//! rejections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineState;

/// The main error type for releaseflow operations.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// A job graph validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the job graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// The release configuration is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An external build tool failed.
    #[error("{0}")]
    Build(#[from] BuildError),

    /// The artifact store refused an operation.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// No publish credential could be obtained.
    #[error("{0}")]
    Credential(#[from] CredentialError),

    /// The package index refused the upload.
    #[error("{0}")]
    Publish(#[from] PublishRejection),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReleaseError {
    /// Classifies the error into the run-level failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Build(_) => FailureKind::Build,
            Self::Publish(_) | Self::Credential(_) => FailureKind::PublishRejected,
            Self::Validation(_)
            | Self::CycleDetected(_)
            | Self::Config(_)
            | Self::Store(StoreError::Collision { .. }) => FailureKind::Config,
            _ => FailureKind::Internal,
        }
    }
}

/// Run-level failure classification reported to the triggering user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An external build tool returned non-zero or produced unusable output.
    Build,
    /// The publisher's precondition was not met and it never started.
    DependencyUnmet,
    /// The package index (or its credential exchange) refused the release.
    PublishRejected,
    /// The run was cancelled from outside.
    Cancelled,
    /// The configuration or job graph was invalid.
    Config,
    /// Anything else.
    Internal,
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when job graph validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The jobs involved in the error.
    pub jobs: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            jobs: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the jobs involved.
    #[must_use]
    pub fn with_jobs(mut self, jobs: Vec<String>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when a cycle is detected in the job graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in job graph: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of jobs forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Job graph contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the `needs` edges in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            jobs: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Errors in the release configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        /// The file that was read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field holds an unusable value.
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A glob pattern could not be compiled.
    #[error("Invalid pattern '{pattern}': {reason}")]
    Pattern {
        /// The pattern as written.
        pattern: String,
        /// The compile error.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of an external build tool invocation.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The tool could not be started at all.
    #[error("Failed to start '{program}': {reason}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The OS error.
        reason: String,
    },

    /// The tool exited unsuccessfully.
    #[error("'{program}' exited with {}: {stderr_tail}", code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    NonZeroExit {
        /// The program that was invoked.
        program: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// The last lines of stderr.
        stderr_tail: String,
    },

    /// The tool succeeded but its output does not satisfy the job contract.
    #[error("Unexpected build output in {}: {reason}", dir.display())]
    UnexpectedOutput {
        /// Output directory that was inspected.
        dir: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// Reading or preparing build directories failed.
    #[error("Build IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised by an artifact store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A key was written twice.
    #[error("Artifact key '{0}' already exists")]
    KeyExists(String),

    /// Two stored artifacts contain a file with the same name.
    #[error("Artifact file '{file_name}' appears under both '{first_key}' and '{second_key}'")]
    Collision {
        /// The colliding file name.
        file_name: String,
        /// The key that contributed it first.
        first_key: String,
        /// The key that contributed it again.
        second_key: String,
    },

    /// A file name is empty or contains a path separator.
    #[error("Invalid artifact file name '{0}'")]
    InvalidFileName(String),

    /// A key is empty or contains a path separator.
    #[error("Invalid artifact key '{0}'")]
    InvalidKey(String),

    /// Underlying storage failed.
    #[error("Artifact store IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised while obtaining a publish credential.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The runner does not offer identity tokens (missing env vars).
    #[error("Identity token unavailable: {0}")]
    Unavailable(String),

    /// The identity token is bound to a different environment.
    #[error("Identity token is scoped to environment '{actual}', expected '{expected}'")]
    EnvironmentMismatch {
        /// The configured environment.
        expected: String,
        /// The environment claim found in the token.
        actual: String,
    },

    /// The index refused to exchange the identity token.
    #[error("Token exchange rejected: {0}")]
    ExchangeRejected(String),

    /// The credential has expired.
    #[error("Publish credential for '{0}' has expired")]
    Expired(String),

    /// Transport-level failure.
    #[error("Credential request failed: {0}")]
    Transport(String),
}

/// A refusal by the package index.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PublishRejection {
    /// The file (and thus the version) was already published.
    #[error("Index rejected '{file_name}': file already exists")]
    AlreadyExists {
        /// The offending distribution file.
        file_name: String,
    },

    /// The credential was not accepted.
    #[error("Index rejected the credential: {message}")]
    Forbidden {
        /// Message returned by the index.
        message: String,
    },

    /// There was nothing to publish.
    #[error("Nothing to publish in {dir}")]
    Empty {
        /// The directory that was submitted.
        dir: String,
    },

    /// A file is not a recognisable distribution.
    #[error("Invalid distribution '{file_name}': {message}")]
    InvalidDistribution {
        /// The offending file.
        file_name: String,
        /// Why it was refused.
        message: String,
    },

    /// Any other non-success response.
    #[error("Index returned HTTP {status} for '{file_name}': {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The file being uploaded.
        file_name: String,
        /// Response body excerpt.
        message: String,
    },

    /// The request never reached the index.
    #[error("Upload transport failure: {message}")]
    Transport {
        /// The transport error.
        message: String,
    },
}

/// Error raised for an illegal pipeline state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Illegal pipeline transition {from} -> {to}")]
pub struct InvalidTransition {
    /// The current state.
    pub from: PipelineState,
    /// The requested state.
    pub to: PipelineState,
}
