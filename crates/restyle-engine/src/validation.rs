//! Structural request validation
//!
//! Runs before the checkpoint and never mutates the document.

use crate::error::ValidationError;
use restyle_core::{DocumentHost, MutationRequest, NodeId, ResourceId, SharedResource};
use std::collections::HashSet;

/// A request that passed validation, with both ends resolved
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Request with duplicate node ids collapsed
    pub request: MutationRequest,
    /// Resolved source resource
    pub source: SharedResource,
    /// Resolved target resource
    pub target: SharedResource,
    /// How many duplicate node ids were dropped
    pub duplicates_removed: usize,
}

impl ValidatedRequest {
    /// Node ids to migrate, first occurrence order
    #[inline]
    #[must_use]
    pub fn node_ids(&self) -> &[NodeId] {
        &self.request.affected_node_ids
    }
}

/// Check a request against the document
///
/// Cheap structural checks come first so an obviously bad request costs no
/// host round trip.
///
/// # Errors
/// Returns the first [`ValidationError`] found.
pub async fn validate_request<H: DocumentHost + ?Sized>(
    host: &H,
    mut request: MutationRequest,
) -> Result<ValidatedRequest, ValidationError> {
    if request.source == request.target {
        return Err(ValidationError::SameSourceAndTarget(request.source));
    }
    if request.affected_node_ids.is_empty() {
        return Err(ValidationError::EmptyNodeList);
    }

    let before = request.affected_node_ids.len();
    let mut seen = HashSet::with_capacity(before);
    request.affected_node_ids.retain(|id| seen.insert(id.clone()));
    let duplicates_removed = before - request.affected_node_ids.len();
    if duplicates_removed > 0 {
        tracing::warn!(duplicates_removed, "duplicate node ids collapsed");
    }

    let source = resolve(host, &request.source)
        .await?
        .ok_or_else(|| ValidationError::SourceNotFound(request.source.clone()))?;
    let target = resolve(host, &request.target)
        .await?
        .ok_or_else(|| ValidationError::TargetNotFound(request.target.clone()))?;

    let expected = request.options.resource_kind();
    for resource in [&source, &target] {
        if resource.kind != expected {
            return Err(ValidationError::KindMismatch {
                id: resource.id.clone(),
                expected,
                actual: resource.kind,
            });
        }
    }

    Ok(ValidatedRequest {
        request,
        source,
        target,
        duplicates_removed,
    })
}

async fn resolve<H: DocumentHost + ?Sized>(
    host: &H,
    id: &ResourceId,
) -> Result<Option<SharedResource>, ValidationError> {
    host.get_shared_resource(id)
        .await
        .map_err(|source| ValidationError::Lookup {
            id: id.clone(),
            source,
        })
}
