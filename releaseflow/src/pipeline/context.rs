//! Run identity and the context handed to every job.

use crate::cancellation::CancellationToken;
use crate::events::{EventSink, NoOpEventSink};
use crate::store::ArtifactStore;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Identifies one release run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// Unique ID of the run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: Timestamp,
}

impl RunIdentity {
    /// Creates an identity with a fresh v4 ID stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self::with_run_id(Uuid::new_v4())
    }

    /// Creates an identity with a specific run ID.
    #[must_use]
    pub fn with_run_id(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: now_utc(),
        }
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state every job of one run sees.
///
/// Cheap to clone; all members are shared.
#[derive(Clone)]
pub struct JobContext {
    identity: RunIdentity,
    store: Arc<dyn ArtifactStore>,
    work_dir: PathBuf,
    cancel: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
}

impl JobContext {
    /// Creates a context with a fresh cancellation token and no event sink.
    #[must_use]
    pub fn new(identity: RunIdentity, store: Arc<dyn ArtifactStore>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            store,
            work_dir: work_dir.into(),
            cancel: Arc::new(CancellationToken::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Uses an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Returns the run's scratch directory.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Returns the run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns true once the run is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emits an event without blocking.
    pub fn try_emit_event(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.try_emit(event_type, data);
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("run_id", &self.identity.run_id)
            .field("work_dir", &self.work_dir)
            .field("store", &self.store)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::store::InMemoryArtifactStore;

    #[test]
    fn test_run_identity_is_unique() {
        assert_ne!(RunIdentity::new().run_id, RunIdentity::new().run_id);
    }

    #[test]
    fn test_context_shares_token_and_sink() {
        let token = Arc::new(CancellationToken::new());
        let sink = Arc::new(CollectingEventSink::new());
        let ctx = JobContext::new(
            RunIdentity::new(),
            Arc::new(InMemoryArtifactStore::new()),
            "/tmp/work",
        )
        .with_cancellation(token.clone())
        .with_event_sink(sink.clone());

        let clone = ctx.clone();
        token.cancel("stop");
        assert!(clone.is_cancelled());

        clone.try_emit_event("job.started", None);
        assert_eq!(sink.len(), 1);
        assert_eq!(ctx.work_dir(), Path::new("/tmp/work"));
    }
}
