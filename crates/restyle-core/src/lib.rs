//! restyle Core - shared vocabulary of the replacement engine
//!
//! Provides:
//! - Domain types for nodes, shared resources, requests and results
//! - The host document API trait the engine mutates through
//! - The four-way failure taxonomy and its message-pattern classifier
//! - The bounded retry policy with backoff
//! - Engine configuration (TOML-loadable)
//!
//! # Example
//!
//! ```rust,ignore
//! use restyle_core::{ErrorClassifier, RetryPolicy, RetryConfig};
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(RetryConfig::default(), ErrorClassifier::new());
//! let outcome = policy.retry(|| async { host.rebind_node(&node, &slot, &style).await }).await;
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod classifier;
pub mod config;
pub mod error;
pub mod host;
pub mod retry;
pub mod types;

pub use classifier::ErrorClassifier;
pub use config::{BatchConfig, EngineConfig, ProgressConfig, RetryConfig};
pub use error::{ConfigError, ErrorKind, HostError, MutationError};
pub use host::{node_label, DocumentHost, MAX_LABEL_DEPTH};
pub use retry::{RetryFailure, RetryPolicy};
pub use types::{
    BatchOutcome, Checkpoint, ClonedResource, FailureRecord, MutationOptions, MutationRequest,
    Node, NodeId, Phase, ProgressUpdate, PropertyKey, ReplacementResult, ResourceId,
    ResourceKind, ResourceTemplate, RunId, RunStatus, SharedResource, SnapshotHandle,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
