//! Error types for restyle Engine
//!
//! Top-level run failures are kept distinct so callers can tell apart:
//! - Structural validation failures (nothing touched, nothing captured)
//! - Checkpoint failures (nothing touched)
//! - Aborts after the checkpoint (checkpoint handle attached)
//!
//! Per-item failures never surface here; they are recorded in the result.

use restyle_core::{Checkpoint, ErrorKind, HostError, Phase, ResourceId, ResourceKind};

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    /// Request rejected before any mutation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Snapshot could not be captured; nothing was mutated
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Another run is in flight on this controller
    #[error("a run is already in flight (phase {0})")]
    Busy(Phase),

    /// Illegal phase transition before the checkpoint
    #[error("state machine fault: {0}")]
    StateMachine(#[from] StateMachineError),

    /// Run stopped after the checkpoint was captured
    #[error("run aborted after checkpoint '{}': {reason}", checkpoint.title)]
    Aborted {
        /// Recovery point to revert to
        checkpoint: Box<Checkpoint>,
        /// Why the run stopped
        reason: String,
    },
}

impl ReplaceError {
    /// Failure kind for caller-side reporting
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Busy(_) => ErrorKind::Transient,
            Self::Checkpoint(_) | Self::StateMachine(_) | Self::Aborted { .. } => {
                ErrorKind::Persistent
            }
        }
    }

    /// Checkpoint captured before the failure, if any
    #[must_use]
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            Self::Aborted { checkpoint, .. } => Some(checkpoint),
            _ => None,
        }
    }
}

/// Structural validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Source and target are the same resource
    #[error("same source and target: {0}")]
    SameSourceAndTarget(ResourceId),

    /// No nodes to migrate
    #[error("affected node list is empty")]
    EmptyNodeList,

    /// Source resource does not resolve
    #[error("source resource not found: {0}")]
    SourceNotFound(ResourceId),

    /// Target resource does not resolve
    #[error("target resource not found: {0}")]
    TargetNotFound(ResourceId),

    /// Resource kind does not match the request class
    #[error("resource {id} is a {actual}, expected a {expected}")]
    KindMismatch {
        /// Offending resource
        id: ResourceId,
        /// Kind required by the request class
        expected: ResourceKind,
        /// Kind found
        actual: ResourceKind,
    },

    /// Host failed while resolving a resource
    #[error("lookup of {id} failed: {source}")]
    Lookup {
        /// Resource being resolved
        id: ResourceId,
        /// Host failure
        #[source]
        source: HostError,
    },
}

/// Checkpoint creation errors
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Host snapshot primitive failed
    #[error("snapshot '{title}' failed: {source}")]
    Snapshot {
        /// Title requested
        title: String,
        /// Host failure
        #[source]
        source: HostError,
    },
}

/// Phase state machine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the allowed table
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current phase
        from: Phase,
        /// Requested phase
        to: Phase,
    },
}
