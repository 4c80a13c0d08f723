//! restyle Engine - bulk style and variable replacement
//!
//! A run moves through a fixed phase pipeline:
//! 1. **Validation**: structural checks, no host mutation
//! 2. **Checkpoint**: host snapshot captured before anything changes
//! 3. **Processing**: adaptive batches with per-item retry
//! 4. **Terminal**: `complete` or `cancelled`, result carries the checkpoint
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use restyle_engine::prelude::*;
//!
//! let controller = ReplacementController::new(host, EngineConfig::default());
//! let request = MutationRequest::style("S:old", "S:new", node_ids);
//! let result = controller.run(request).await?;
//! assert!(result.checkpoint.is_some());
//! ```

// Pipeline
pub mod checkpoint;
pub mod controller;
pub mod state_machine;
pub mod validation;

// Processing
pub mod cancel;
pub mod mutation;
pub mod resolver;
pub mod scheduler;

pub mod error;
pub mod progress;

// Re-exports
pub use cancel::CancellationFlag;
pub use checkpoint::CheckpointManager;
pub use controller::ReplacementController;
pub use error::{CheckpointError, ReplaceError, StateMachineError, ValidationError};
pub use mutation::{MigrationLog, Migrator, NodeMigration, StyleSwap};
pub use progress::{ControllerEvent, EventSink, ProgressThrottle};
pub use resolver::{CloneResolver, ResolvedResourceMap};
pub use scheduler::{AdaptiveBatchScheduler, Batch, BatchSizer, ItemResult};
pub use validation::{validate_request, ValidatedRequest};

/// Everything needed to drive a run
pub mod prelude {
    pub use crate::controller::ReplacementController;
    pub use crate::error::ReplaceError;
    pub use crate::progress::ControllerEvent;
    pub use restyle_core::{
        DocumentHost, EngineConfig, MutationRequest, NodeId, Phase, ReplacementResult,
        RunStatus,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
