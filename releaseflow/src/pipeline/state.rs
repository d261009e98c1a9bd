//! Release lifecycle state machine.

use crate::errors::InvalidTransition;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one release run.
///
/// `Idle -> Triggered -> Building -> Publishing -> Done`, with `Failed`
/// reachable from every non-terminal state after `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Nothing has happened (or the ref did not match).
    #[default]
    Idle,
    /// A matching tag was pushed; the job graph is being prepared.
    Triggered,
    /// Wheel and sdist jobs are running.
    Building,
    /// The publisher is running.
    Publishing,
    /// The release was published (or the dry run completed).
    Done,
    /// Something failed or the run was cancelled.
    Failed,
}

impl PipelineState {
    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if `next` is a legal successor.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Triggered)
                | (Self::Triggered, Self::Building | Self::Failed)
                | (Self::Building, Self::Publishing | Self::Failed)
                | (Self::Publishing, Self::Done | Self::Failed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Triggered => "triggered",
            Self::Building => "building",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: PipelineState,
    /// New state.
    pub to: PipelineState,
    /// When the change happened.
    pub at: Timestamp,
}

/// Tracks the current state and every transition taken.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: PipelineState,
    history: Vec<StateTransition>,
}

impl StateMachine {
    /// Creates a machine in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns every transition taken, oldest first.
    #[must_use]
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the edge is not legal; the state is
    /// left unchanged.
    pub fn transition(&mut self, next: PipelineState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.record(next);
        Ok(())
    }

    /// Moves to `Failed` if that is legal from the current state.
    pub fn fail(&mut self) {
        if self.state.can_transition_to(PipelineState::Failed) {
            self.record(PipelineState::Failed);
        }
    }

    fn record(&mut self, next: PipelineState) {
        tracing::info!(from = %self.state, to = %next, "Pipeline state changed");
        self.history.push(StateTransition {
            from: self.state,
            to: next,
            at: now_utc(),
        });
        self.state = next;
    }
}
