//! Phase state machine

use crate::error::StateMachineError;
use restyle_core::Phase;

/// Validates a phase transition.
///
/// An illegal transition is a logic fault; callers report it and abort the run.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::*;
    match from {
        Idle => vec![Validating],
        Validating => vec![CreatingCheckpoint, Error, Cancelled],
        CreatingCheckpoint => vec![Processing, Error],
        Processing => vec![Complete, Error, Cancelled],
        Complete | Error | Cancelled => vec![Idle],
    }
}

/// Cancellation is guaranteed to prevent all mutation only in these phases
#[must_use]
pub fn cancellation_guaranteed(phase: Phase) -> bool {
    matches!(phase, Phase::Idle | Phase::Validating)
}

fn allowed(from: Phase, to: Phase) -> bool {
    allowed_transitions(from).into_iter().any(|p| p == to)
}
