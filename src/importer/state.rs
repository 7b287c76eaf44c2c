use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Fetching,
    Inspecting,
    Configuring,
    Ready,
    Failed,
}

impl ImportState {
    /// An import is in flight; import and reset requests are refused.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Fetching | Self::Inspecting | Self::Configuring)
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Inspecting => "inspecting",
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0} -> {1}")]
    InvalidTransition(ImportState, ImportState),
}

#[derive(Debug)]
pub struct StateMachine {
    state: ImportState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: ImportState::Idle,
        }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn can_transition(&self, to: ImportState) -> bool {
        use ImportState::*;
        matches!(
            (self.state, to),
            (Idle, Fetching)
                | (Fetching, Inspecting)
                | (Fetching, Failed)
                | (Inspecting, Configuring)
                | (Inspecting, Failed)
                | (Configuring, Ready)
                | (Configuring, Failed)
                | (Ready, Idle)
                | (Failed, Idle)
                | (Idle, Idle)
        )
    }

    pub fn transition(&mut self, to: ImportState) -> Result<(), TransitionError> {
        if self.can_transition(to) {
            tracing::debug!("Import state: {} -> {}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}
