//! Per-node mutations
//!
//! Style-class requests swap style slots directly. Binding-class requests go
//! through the [`CloneResolver`]. Either way a node yields one
//! [`NodeMigration`], the single record of whether it was migrated.

use crate::resolver::{CloneResolver, ResolvedResourceMap};
use dashmap::DashMap;
use restyle_core::{
    ClonedResource, DocumentHost, MutationError, MutationOptions, MutationRequest, NodeId,
    PropertyKey, ResourceId,
};

/// What happened to one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMigration {
    /// Node migrated
    pub node: NodeId,
    /// Properties or style slots rebound straight to the target
    pub direct: Vec<PropertyKey>,
    /// Style slots rebound to a replacement of their shared style
    pub via_clone: Vec<(PropertyKey, ClonedResource)>,
}

impl NodeMigration {
    /// Empty record for a node
    #[inline]
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            direct: Vec::new(),
            via_clone: Vec::new(),
        }
    }

    /// Whether anything on the node was rebound
    ///
    /// A node counts once regardless of how many of its properties changed.
    #[inline]
    #[must_use]
    pub fn migrated(&self) -> bool {
        !self.direct.is_empty() || !self.via_clone.is_empty()
    }
}

/// Steps already applied to each node during the current run
///
/// A retried node resumes from here instead of re-reading what it changed
/// itself, so a partial migration followed by a retry still reports every
/// rebound property.
#[derive(Debug, Default)]
pub struct MigrationLog {
    applied: DashMap<NodeId, NodeMigration>,
    uncleared: DashMap<NodeId, Vec<PropertyKey>>,
}

impl MigrationLog {
    /// Create empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a property rebound straight to the target
    pub fn record_direct(&self, node: &NodeId, property: PropertyKey) {
        self.applied
            .entry(node.clone())
            .or_insert_with(|| NodeMigration::new(node.clone()))
            .direct
            .push(property);
    }

    /// Record a style slot rebound to a replacement
    pub fn record_clone(&self, node: &NodeId, slot: PropertyKey, clone: ClonedResource) {
        self.applied
            .entry(node.clone())
            .or_insert_with(|| NodeMigration::new(node.clone()))
            .via_clone
            .push((slot, clone));
    }

    /// Everything applied to `node`, removing it from the log
    #[must_use]
    pub fn finish(&self, node: &NodeId) -> NodeMigration {
        self.uncleared.remove(node);
        self.applied
            .remove(node)
            .map_or_else(|| NodeMigration::new(node.clone()), |(_, migration)| migration)
    }

    fn defer_clear(&self, node: &NodeId, slot: PropertyKey) {
        self.uncleared.entry(node.clone()).or_default().push(slot);
    }

    fn uncleared(&self, node: &NodeId) -> Vec<PropertyKey> {
        self.uncleared
            .get(node)
            .map(|slots| slots.value().clone())
            .unwrap_or_default()
    }

    fn mark_cleared(&self, node: &NodeId, slot: &PropertyKey) {
        if let Some(mut slots) = self.uncleared.get_mut(node) {
            slots.retain(|s| s != slot);
        }
    }
}

/// Style-class direct swap
#[derive(Debug)]
pub struct StyleSwap<'a, H: ?Sized> {
    host: &'a H,
    source: &'a ResourceId,
    target: &'a ResourceId,
    preserve_overrides: bool,
    log: MigrationLog,
}

impl<'a, H: DocumentHost + ?Sized> StyleSwap<'a, H> {
    /// Create swap for one run
    #[must_use]
    pub fn new(
        host: &'a H,
        source: &'a ResourceId,
        target: &'a ResourceId,
        preserve_overrides: bool,
    ) -> Self {
        Self {
            host,
            source,
            target,
            preserve_overrides,
            log: MigrationLog::new(),
        }
    }

    /// Point every slot referencing `source` at `target`
    ///
    /// Overrides are cleared only after the slot was rebound, so a node whose
    /// rebind fails keeps them. Slots rebound by an earlier attempt of this
    /// run count as migrated and still get their overrides cleared.
    ///
    /// # Errors
    /// `NodeNotFound`, `SourceReferenceNotFound` or host failures.
    pub async fn apply(&self, node_id: &NodeId) -> Result<NodeMigration, MutationError> {
        let node = self
            .host
            .lookup_node(node_id)
            .await?
            .ok_or_else(|| MutationError::NodeNotFound(node_id.clone()))?;

        let slots: Vec<&PropertyKey> = node
            .style_refs
            .iter()
            .filter(|(_, style)| *style == self.source)
            .map(|(slot, _)| slot)
            .collect();

        for slot in slots {
            self.host.rebind_node(&node.id, slot, self.target).await?;
            self.log.record_direct(&node.id, slot.clone());
            if !self.preserve_overrides {
                self.log.defer_clear(&node.id, slot.clone());
            }
        }
        for slot in self.log.uncleared(&node.id) {
            self.host.clear_overrides(&node.id, &slot).await?;
            self.log.mark_cleared(&node.id, &slot);
        }

        let migration = self.log.finish(&node.id);
        if !migration.migrated() {
            return Err(MutationError::SourceReferenceNotFound {
                node: node.id,
                resource: self.source.clone(),
            });
        }
        Ok(migration)
    }
}

/// Per-request migration strategy
#[derive(Debug)]
pub enum Migrator<'a, H: ?Sized> {
    /// Style-class request
    Style(StyleSwap<'a, H>),
    /// Binding-class request
    Binding(CloneResolver<'a, H>),
}

impl<'a, H: DocumentHost + ?Sized> Migrator<'a, H> {
    /// Pick the strategy for `request`
    #[must_use]
    pub fn for_request(host: &'a H, request: &'a MutationRequest, map: &'a ResolvedResourceMap) -> Self {
        match &request.options {
            MutationOptions::Style { preserve_overrides } => Self::Style(StyleSwap::new(
                host,
                &request.source,
                &request.target,
                *preserve_overrides,
            )),
            options @ MutationOptions::Binding { .. } => Self::Binding(CloneResolver::new(
                host,
                map,
                &request.source,
                &request.target,
                options,
            )),
        }
    }

    /// Migrate one node
    ///
    /// # Errors
    /// Propagates the strategy's [`MutationError`].
    pub async fn migrate(&self, node_id: &NodeId) -> Result<NodeMigration, MutationError> {
        match self {
            Self::Style(swap) => swap.apply(node_id).await,
            Self::Binding(resolver) => resolver.resolve(node_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restyle_core::Node;
    use restyle_test_utils::{node_id, style_document, Fault, HostOp};

    #[tokio::test]
    async fn swaps_matching_slots_only() {
        let (host, _) = style_document(0);
        host.insert_node(
            Node::new("9:1", "Label", "TEXT")
                .with_style("fill", "S:old")
                .with_style("text", "S:other"),
        );
        let (source, target) = (ResourceId::from("S:old"), ResourceId::from("S:new"));
        let swap = StyleSwap::new(&host, &source, &target, false);

        let migration = swap.apply(&NodeId::from("9:1")).await.unwrap();

        assert_eq!(migration.direct, vec![PropertyKey::from("fill")]);
        let node = host.node("9:1").unwrap();
        assert_eq!(node.style_refs.get(&PropertyKey::from("fill")), Some(&target));
        assert_eq!(node.style_refs.get(&PropertyKey::from("text")), Some(&ResourceId::from("S:other")));
    }

    #[tokio::test]
    async fn clears_overrides_unless_preserved() {
        let (host, _) = style_document(2);
        host.set_override(node_id(1), "fill");
        host.set_override(node_id(2), "fill");
        let (source, target) = (ResourceId::from("S:old"), ResourceId::from("S:new"));

        StyleSwap::new(&host, &source, &target, false).apply(&node_id(1)).await.unwrap();
        StyleSwap::new(&host, &source, &target, true).apply(&node_id(2)).await.unwrap();

        assert!(!host.has_override(node_id(1).as_str(), "fill"));
        assert!(host.has_override(node_id(2).as_str(), "fill"));
    }

    #[tokio::test]
    async fn failed_rebind_keeps_overrides() {
        let (host, _) = style_document(1);
        host.set_override(node_id(1), "fill");
        host.inject(Fault::always(HostOp::Rebind, "node is locked"));
        let (source, target) = (ResourceId::from("S:old"), ResourceId::from("S:new"));

        let err = StyleSwap::new(&host, &source, &target, false)
            .apply(&node_id(1))
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::Host(_)));
        let node = host.node(node_id(1).as_str()).unwrap();
        assert_eq!(node.style_refs.get(&PropertyKey::from("fill")), Some(&source));
        assert!(host.has_override(node_id(1).as_str(), "fill"));
        assert_eq!(host.count(HostOp::ClearOverrides), 0);
    }

    #[tokio::test]
    async fn retry_after_failed_clear_completes_every_slot() {
        let (host, _) = style_document(0);
        host.insert_node(
            Node::new("9:1", "Badge", "FRAME")
                .with_style("fill", "S:old")
                .with_style("stroke", "S:old"),
        );
        host.set_override("9:1", "fill");
        host.set_override("9:1", "stroke");
        host.inject(Fault::always(HostOp::ClearOverrides, "connection reset").times(1));
        let (source, target) = (ResourceId::from("S:old"), ResourceId::from("S:new"));
        let swap = StyleSwap::new(&host, &source, &target, false);
        let id = NodeId::from("9:1");

        assert!(swap.apply(&id).await.is_err());
        let migration = swap.apply(&id).await.unwrap();

        assert_eq!(
            migration.direct,
            vec![PropertyKey::from("fill"), PropertyKey::from("stroke")]
        );
        assert!(!host.has_override("9:1", "fill"));
        assert!(!host.has_override("9:1", "stroke"));
        assert_eq!(host.count(HostOp::Rebind), 2);
    }

    #[tokio::test]
    async fn retry_after_failed_rebind_finds_slot_again() {
        let (host, _) = style_document(1);
        host.inject(Fault::always(HostOp::Rebind, "connection reset").times(1));
        let (source, target) = (ResourceId::from("S:old"), ResourceId::from("S:new"));
        let swap = StyleSwap::new(&host, &source, &target, false);

        assert!(swap.apply(&node_id(1)).await.is_err());
        assert!(swap.apply(&node_id(1)).await.unwrap().migrated());
    }

    #[tokio::test]
    async fn unknown_node_is_reported() {
        let (host, _) = style_document(0);
        let (source, target) = (ResourceId::from("S:old"), ResourceId::from("S:new"));
        let err = StyleSwap::new(&host, &source, &target, false)
            .apply(&NodeId::from("nope"))
            .await
            .unwrap_err();
        assert_eq!(err, MutationError::NodeNotFound(NodeId::from("nope")));
    }
}
