use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle position of a fixture.
///
/// Transitions only move forward, with two exceptions: `Running ->
/// Launching` on an explicit restart and `Stopped -> Pulling` when a
/// stopped fixture is started again. `Failed` is reachable from every
/// non-terminal state. `Destroyed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureState {
    #[default]
    Uninitialized,
    Pulling,
    Launching,
    AwaitingHealthy,
    Running,
    Stopping,
    Stopped,
    Destroyed,
    Failed,
}

impl FixtureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: FixtureState) -> bool {
        use FixtureState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Uninitialized, Pulling)
                | (Stopped, Pulling)
                | (Pulling, Launching)
                | (Running, Launching)
                | (Launching, AwaitingHealthy)
                | (AwaitingHealthy, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Running, Destroyed)
                | (Stopped, Destroyed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Pulling => "pulling",
            Self::Launching => "launching",
            Self::AwaitingHealthy => "awaiting_healthy",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Destroyed => "destroyed",
            Self::Failed => "failed",
        }
    }
}

impl Display for FixtureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
