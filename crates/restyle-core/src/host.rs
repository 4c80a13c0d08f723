//! Host document API boundary
//!
//! The engine talks to the document exclusively through [`DocumentHost`].
//! Implementations convert host objects into the domain types of
//! [`crate::types`] immediately on retrieval.

use crate::error::HostError;
use crate::types::{Node, NodeId, PropertyKey, ResourceId, ResourceTemplate, SharedResource, SnapshotHandle};
use std::collections::HashSet;
use std::sync::Arc;

/// Deepest parent chain walked when building node labels
pub const MAX_LABEL_DEPTH: usize = 32;

/// Asynchronous document mutation API
#[async_trait::async_trait]
pub trait DocumentHost: Send + Sync {
    /// Look up a node by id
    async fn lookup_node(&self, id: &NodeId) -> Result<Option<Node>, HostError>;

    /// Look up a style or variable by id
    async fn get_shared_resource(&self, id: &ResourceId)
        -> Result<Option<SharedResource>, HostError>;

    /// Point a node property (style slot or binding) at a resource
    async fn rebind_node(
        &self,
        node: &NodeId,
        property: &PropertyKey,
        resource: &ResourceId,
    ) -> Result<(), HostError>;

    /// Drop node-local overrides of a style slot
    async fn clear_overrides(&self, node: &NodeId, property: &PropertyKey) -> Result<(), HostError>;

    /// Create a new locally-owned resource
    async fn clone_resource(&self, template: &ResourceTemplate) -> Result<SharedResource, HostError>;

    /// Whether a local resource with this name already exists
    async fn resource_name_exists(&self, name: &str) -> Result<bool, HostError>;

    /// Capture a recovery point in the host's history
    async fn create_snapshot(&self, label: &str) -> Result<SnapshotHandle, HostError>;
}

#[async_trait::async_trait]
impl<H: DocumentHost + ?Sized> DocumentHost for Arc<H> {
    async fn lookup_node(&self, id: &NodeId) -> Result<Option<Node>, HostError> {
        (**self).lookup_node(id).await
    }

    async fn get_shared_resource(
        &self,
        id: &ResourceId,
    ) -> Result<Option<SharedResource>, HostError> {
        (**self).get_shared_resource(id).await
    }

    async fn rebind_node(
        &self,
        node: &NodeId,
        property: &PropertyKey,
        resource: &ResourceId,
    ) -> Result<(), HostError> {
        (**self).rebind_node(node, property, resource).await
    }

    async fn clear_overrides(&self, node: &NodeId, property: &PropertyKey) -> Result<(), HostError> {
        (**self).clear_overrides(node, property).await
    }

    async fn clone_resource(&self, template: &ResourceTemplate) -> Result<SharedResource, HostError> {
        (**self).clone_resource(template).await
    }

    async fn resource_name_exists(&self, name: &str) -> Result<bool, HostError> {
        (**self).resource_name_exists(name).await
    }

    async fn create_snapshot(&self, label: &str) -> Result<SnapshotHandle, HostError> {
        (**self).create_snapshot(label).await
    }
}

/// Build a `Root / Parent / Node` label for failure reports
///
/// Walks the parent chain iteratively; stops at [`MAX_LABEL_DEPTH`], on a
/// cycle, or at the first lookup failure. Falls back to the bare id when the
/// node itself cannot be resolved.
pub async fn node_label<H: DocumentHost + ?Sized>(host: &H, id: &NodeId) -> String {
    let mut names = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = Some(id.clone());

    while let Some(current) = cursor.take() {
        if names.len() >= MAX_LABEL_DEPTH || !visited.insert(current.clone()) {
            break;
        }
        match host.lookup_node(&current).await {
            Ok(Some(node)) => {
                names.push(node.name);
                cursor = node.parent;
            }
            _ => break,
        }
    }

    if names.is_empty() {
        return id.to_string();
    }
    names.reverse();
    names.join(" / ")
}
