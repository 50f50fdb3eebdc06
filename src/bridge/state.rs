//! Per-call state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one bridge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    #[default]
    Building,
    Spawned,
    Running,
    /// Batch: accumulating output until exit.
    Draining,
    /// Streaming: emitting events while the process runs.
    Streaming,
    Exited,
    Translated,
    Done,
}

impl CallState {
    /// Check if no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }

    /// Check if `next` follows this state on the normal path.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Building, Self::Spawned)
                | (Self::Spawned, Self::Running)
                | (Self::Running, Self::Draining | Self::Streaming)
                | (Self::Draining | Self::Streaming, Self::Exited)
                | (Self::Exited, Self::Translated)
                | (Self::Translated, Self::Done)
        )
    }
}

/// State machine for tracking one call.
#[derive(Debug, Clone)]
pub struct CallStateMachine {
    state: CallState,
    interrupted: bool,
    history: Vec<CallState>,
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CallState::Building,
            interrupted: false,
            history: vec![CallState::Building],
        }
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    /// The call was cut short by a timeout or cancellation.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[CallState] {
        &self.history
    }

    /// Move along the normal path. Illegal moves are logged and ignored.
    ///
    /// Returns true if the transition happened.
    pub fn transition(&mut self, next: CallState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = ?self.state, to = ?next, "Illegal call state transition");
            return false;
        }
        self.enter(next);
        true
    }

    /// Jump to `Exited` after a timeout or cancellation.
    ///
    /// Allowed from any state before `Exited`.
    pub fn interrupt(&mut self) -> bool {
        if matches!(
            self.state,
            CallState::Exited | CallState::Translated | CallState::Done
        ) {
            tracing::warn!(from = ?self.state, "Interrupt after exit ignored");
            return false;
        }
        self.interrupted = true;
        self.enter(CallState::Exited);
        true
    }

    /// End the call early on an error raised before or while the process ran.
    pub fn abandon(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(from = ?self.state, "Call abandoned");
            self.enter(CallState::Done);
        }
    }

    fn enter(&mut self, next: CallState) {
        tracing::debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
        self.history.push(next);
    }
}
