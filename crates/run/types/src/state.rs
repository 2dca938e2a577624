//! Report states and the transitions between them
//!
//! ```text
//! CREATED --start--> RUNNING
//! RUNNING --pause--> PAUSED
//! PAUSED  --resume--> RUNNING
//! RUNNING --cancel--> CANCELLED
//! RUNNING --complete-> COMPLETED
//! RUNNING --fail----> FAILED
//! ```

use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ── State ────────────────────────────────────────────────────────────

/// The lifecycle state of a report node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Tracked but not yet started
    #[default]
    Created,
    /// Work in progress
    Running,
    /// Suspended, may be resumed
    Paused,
    /// Stopped on request
    Cancelled,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl State {
    pub const ALL: [State; 6] = [
        State::Created,
        State::Running,
        State::Paused,
        State::Cancelled,
        State::Completed,
        State::Failed,
    ];

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    /// The literal used in serialized reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Cancelled => "CANCELLED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the state machine has an edge from `self` to `target`.
    ///
    /// Self-loops are not edges.
    pub fn can_transition_to(&self, target: State) -> bool {
        Transition::ALL
            .iter()
            .any(|t| t.target() == target && t.is_permitted_from(*self))
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ModelError::UnknownState(s.to_string()))
    }
}

// ── Transition ───────────────────────────────────────────────────────

/// A named move between states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Cancel,
    Complete,
    Fail,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Start,
        Transition::Pause,
        Transition::Resume,
        Transition::Cancel,
        Transition::Complete,
        Transition::Fail,
    ];

    /// The state a report is in after this transition
    pub fn target(&self) -> State {
        match self {
            Self::Start | Self::Resume => State::Running,
            Self::Pause => State::Paused,
            Self::Cancel => State::Cancelled,
            Self::Complete => State::Completed,
            Self::Fail => State::Failed,
        }
    }

    /// The only state this transition leaves from
    pub fn source(&self) -> State {
        match self {
            Self::Start => State::Created,
            Self::Resume => State::Paused,
            Self::Pause | Self::Cancel | Self::Complete | Self::Fail => State::Running,
        }
    }

    /// Check the transition against the state machine
    pub fn is_permitted_from(&self, from: State) -> bool {
        self.source() == from
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
