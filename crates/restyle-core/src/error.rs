//! Error types for restyle Core
//!
//! Provides the shared error vocabulary for:
//! - Host API failures (opaque, message-only)
//! - Per-item mutation failures
//! - Configuration loading and validation
//! - The four-way failure taxonomy used by the retry policy

use crate::types::{NodeId, ResourceId};
use serde::{Deserialize, Serialize};

/// Failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, rate limits, connectivity: worth retrying
    Transient,
    /// Permission/authorization, or anything unrecognized
    Persistent,
    /// Malformed input, not-found, same source and target
    Validation,
    /// Item-level: locked, read-only, wrong node type
    Partial,
}

impl ErrorKind {
    /// Only transient failures are retried
    #[inline]
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Persistent => "persistent",
            Self::Validation => "validation",
            Self::Partial => "partial",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by the host document API
///
/// Hosts report failures as free-form messages; only the message is kept so
/// that classification never depends on host-specific types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HostError {
    /// Host-provided message
    pub message: String,
}

impl HostError {
    /// Create host error from message
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure migrating a single node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// Host call failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// Node id did not resolve
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A style referenced by the node did not resolve
    #[error("resource not found: {0}")]
    ResourceNotFound(ResourceId),

    /// Neither the node nor its styles reference the source resource
    #[error("source reference not found on node {node} (expected {resource})")]
    SourceReferenceNotFound {
        /// Node inspected
        node: NodeId,
        /// Resource that was expected
        resource: ResourceId,
    },

    /// Every candidate clone name is taken
    #[error("no free name for clone of '{base}' after {attempts} attempts")]
    CloneNameExhausted {
        /// Base name tried
        base: String,
        /// Candidates tried
        attempts: u32,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are inconsistent
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it is rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create invalid-value error
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::Persistent.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Partial.is_retryable());
    }

    #[test]
    fn host_error_is_transparent() {
        let err = MutationError::from(HostError::new("node is locked"));
        assert_eq!(err.to_string(), "node is locked");
    }

    #[test]
    fn source_reference_message() {
        let err = MutationError::SourceReferenceNotFound {
            node: NodeId::from("1:2"),
            resource: ResourceId::from("V:9"),
        };
        assert!(err.to_string().contains("source reference not found on node 1:2"));
    }
}
