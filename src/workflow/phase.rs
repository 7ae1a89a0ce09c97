// Workflow phases and their transition tables

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Phases of the interactive (negotiated) path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractivePhase {
    /// User resolves per-item choices
    Selecting,
    /// User reviews the submission before generating
    Confirming,
    /// apply + finalize + decode in flight
    Generating,
    /// Artifact ready
    Completed,
}

impl InteractivePhase {
    /// Get all phases in order
    pub fn all() -> &'static [InteractivePhase] {
        &[
            InteractivePhase::Selecting,
            InteractivePhase::Confirming,
            InteractivePhase::Generating,
            InteractivePhase::Completed,
        ]
    }

    /// Get the next phase on the happy path, if any
    pub fn next(&self) -> Option<InteractivePhase> {
        match self {
            InteractivePhase::Selecting => Some(InteractivePhase::Confirming),
            InteractivePhase::Confirming => Some(InteractivePhase::Generating),
            InteractivePhase::Generating => Some(InteractivePhase::Completed),
            InteractivePhase::Completed => None,
        }
    }

    /// Get the phase a user-initiated "back" leads to, if any
    pub fn previous(&self) -> Option<InteractivePhase> {
        match self {
            InteractivePhase::Confirming => Some(InteractivePhase::Selecting),
            _ => None,
        }
    }

    /// Stable identifier, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractivePhase::Selecting => "selecting",
            InteractivePhase::Confirming => "confirming",
            InteractivePhase::Generating => "generating",
            InteractivePhase::Completed => "completed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            InteractivePhase::Selecting => "Select vendors",
            InteractivePhase::Confirming => "Confirm",
            InteractivePhase::Generating => "Generating",
            InteractivePhase::Completed => "Completed",
        }
    }

    /// Get the phase index (0-based)
    pub fn index(&self) -> usize {
        match self {
            InteractivePhase::Selecting => 0,
            InteractivePhase::Confirming => 1,
            InteractivePhase::Generating => 2,
            InteractivePhase::Completed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InteractivePhase::Completed)
    }
}

impl Default for InteractivePhase {
    fn default() -> Self {
        InteractivePhase::Selecting
    }
}

impl fmt::Display for InteractivePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Validates if the interactive path can move from one phase to another.
///
/// Reset is not listed here: it is reachable from every phase and bypasses
/// the table.
pub fn can_transition(from: InteractivePhase, to: InteractivePhase) -> bool {
    use InteractivePhase::*;
    match (from, to) {
        (Selecting, Confirming) => true,
        (Confirming, Selecting) => true, // Go back
        (Confirming, Generating) => true,
        (Generating, Completed) => true,
        (Generating, Confirming) => true, // apply/finalize failure
        _ => false,
    }
}

/// Validates and performs an interactive phase transition
pub fn transition_phase(
    current: InteractivePhase,
    target: InteractivePhase,
) -> Result<InteractivePhase, StateTransitionError> {
    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current.to_string(),
            to: target.to_string(),
        });
    }
    Ok(target)
}

/// Get all valid next phases from the current one
pub fn valid_next_phases(current: InteractivePhase) -> Vec<InteractivePhase> {
    InteractivePhase::all()
        .iter()
        .copied()
        .filter(|&phase| can_transition(current, phase))
        .collect()
}

/// Phases of the non-interactive path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoPhase {
    Idle,
    Uploading,
    Completed,
}

impl AutoPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoPhase::Idle => "idle",
            AutoPhase::Uploading => "uploading",
            AutoPhase::Completed => "completed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AutoPhase::Idle => "Idle",
            AutoPhase::Uploading => "Uploading",
            AutoPhase::Completed => "Completed",
        }
    }
}

impl Default for AutoPhase {
    fn default() -> Self {
        AutoPhase::Idle
    }
}

impl fmt::Display for AutoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Validates if the auto path can move from one phase to another
pub fn can_transition_auto(from: AutoPhase, to: AutoPhase) -> bool {
    use AutoPhase::*;
    match (from, to) {
        (Idle, Uploading) => true,
        (Uploading, Completed) => true,
        (Uploading, Idle) => true, // Failure or hand-off
        (Completed, Uploading) => true, // Generate another report
        _ => false,
    }
}

/// Validates and performs an auto phase transition
pub fn transition_auto(current: AutoPhase, target: AutoPhase) -> Result<AutoPhase, StateTransitionError> {
    if !can_transition_auto(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current.to_string(),
            to: target.to_string(),
        });
    }
    Ok(target)
}
