//! Recovery point capture

use crate::error::CheckpointError;
use crate::validation::ValidatedRequest;
use chrono::Utc;
use restyle_core::{Checkpoint, DocumentHost, MutationOptions};

/// Creates the checkpoint that precedes every mutation of a run
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointManager;

impl CheckpointManager {
    /// Create manager
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Title shown in the host's history
    #[must_use]
    pub fn title_for(&self, validated: &ValidatedRequest) -> String {
        let what = match validated.request.options {
            MutationOptions::Style { .. } => "style",
            MutationOptions::Binding { .. } => "variable",
        };
        let count = validated.node_ids().len();
        format!(
            "restyle: replace {what} '{}' → '{}' on {count} node{}",
            validated.source.name,
            validated.target.name,
            if count == 1 { "" } else { "s" }
        )
    }

    /// Capture a snapshot for `validated`
    ///
    /// # Errors
    /// `CheckpointError::Snapshot` when the host primitive fails.
    pub async fn create<H: DocumentHost + ?Sized>(
        &self,
        host: &H,
        validated: &ValidatedRequest,
    ) -> Result<Checkpoint, CheckpointError> {
        let title = self.title_for(validated);
        match host.create_snapshot(&title).await {
            Ok(handle) => {
                tracing::info!(title = %title, "checkpoint created");
                Ok(Checkpoint {
                    title,
                    created_at: Utc::now(),
                    handle,
                })
            }
            Err(source) => Err(CheckpointError::Snapshot { title, source }),
        }
    }
}
