//! Resource Clone-and-Rebind Resolver
//!
//! Shared styles may be referenced by nodes outside the request, so they are
//! never edited in place. The first node reaching a shared style that binds
//! the source variable triggers exactly one clone with the binding rewritten;
//! every later node referencing that style is rebound to the same clone.

use crate::mutation::{MigrationLog, NodeMigration};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use restyle_core::{
    ClonedResource, DocumentHost, MutationError, MutationOptions, NodeId, ResourceId,
    ResourceTemplate, SharedResource,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Name candidates tried before giving up
pub const MAX_NAME_ATTEMPTS: u32 = 100;

/// Original shared resource -> replacement created in this run
///
/// Created empty per run and dropped when the run ends. Each entry is a
/// once-cell, so concurrent items racing on the same style share one clone.
/// Styles found not to bind the source are remembered too, so they are read
/// from the host at most once per run.
#[derive(Debug, Default)]
pub struct ResolvedResourceMap {
    entries: DashMap<ResourceId, Arc<OnceCell<ResourceId>>>,
    replacements: DashSet<ResourceId>,
    unrelated: DashSet<ResourceId>,
    reserved_names: Mutex<HashSet<String>>,
}

impl ResolvedResourceMap {
    /// Create empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replacement for `original`, if one was already created
    #[must_use]
    pub fn get(&self, original: &ResourceId) -> Option<ResourceId> {
        self.entries
            .get(original)
            .and_then(|cell| cell.value().get().cloned())
    }

    /// Number of replacements created
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    /// Whether no replacement was created
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `original -> clone` pairs, sorted by original id
    #[must_use]
    pub fn clones(&self) -> Vec<ClonedResource> {
        let mut clones: Vec<_> = self
            .entries
            .iter()
            .filter_map(|e| {
                e.value().get().map(|clone| ClonedResource {
                    original: e.key().clone(),
                    clone: clone.clone(),
                })
            })
            .collect();
        clones.sort_by(|a, b| a.original.cmp(&b.original));
        clones
    }

    /// Whether `style` is known not to bind the source
    #[must_use]
    pub fn is_unrelated(&self, style: &ResourceId) -> bool {
        self.unrelated.contains(style)
    }

    fn is_replacement(&self, style: &ResourceId) -> bool {
        self.replacements.contains(style)
    }

    fn cell(&self, original: &ResourceId) -> Arc<OnceCell<ResourceId>> {
        Arc::clone(&self.entries.entry(original.clone()).or_default())
    }

    fn reserve_name(&self, name: &str) -> bool {
        self.reserved_names.lock().insert(name.to_string())
    }

    fn release_name(&self, name: &str) {
        self.reserved_names.lock().remove(name);
    }
}

/// Binding-class per-node migration
#[derive(Debug)]
pub struct CloneResolver<'a, H: ?Sized> {
    host: &'a H,
    map: &'a ResolvedResourceMap,
    source: &'a ResourceId,
    target: &'a ResourceId,
    options: &'a MutationOptions,
    log: MigrationLog,
}

/// Replacement a style slot will be rebound to
enum Pending {
    Known(ResourceId),
    Clone(SharedResource),
}

impl<'a, H: DocumentHost + ?Sized> CloneResolver<'a, H> {
    /// Create resolver for one run
    #[must_use]
    pub fn new(
        host: &'a H,
        map: &'a ResolvedResourceMap,
        source: &'a ResourceId,
        target: &'a ResourceId,
        options: &'a MutationOptions,
    ) -> Self {
        Self {
            host,
            map,
            source,
            target,
            options,
            log: MigrationLog::new(),
        }
    }

    /// Migrate one node from `source` to `target`
    ///
    /// Direct bindings are rebound in place. Style slots whose style binds the
    /// source are rebound to that style's replacement, cloning it on first use.
    /// Every style is read before anything on the node changes. When a later
    /// step fails, a retry picks up the properties this run already rebound.
    ///
    /// # Errors
    /// - `MutationError::NodeNotFound` if the node does not resolve
    /// - `MutationError::SourceReferenceNotFound` if nothing on the node
    ///   references the source
    /// - `MutationError::Host` for host failures
    pub async fn resolve(&self, node_id: &NodeId) -> Result<NodeMigration, MutationError> {
        let node = self
            .host
            .lookup_node(node_id)
            .await?
            .ok_or_else(|| MutationError::NodeNotFound(node_id.clone()))?;

        let mut slots = Vec::new();
        for (slot, style_id) in &node.style_refs {
            if self.map.is_replacement(style_id) || self.map.is_unrelated(style_id) {
                continue;
            }
            if let Some(known) = self.map.get(style_id) {
                slots.push((slot, style_id, Pending::Known(known)));
                continue;
            }
            let style = self
                .host
                .get_shared_resource(style_id)
                .await?
                .ok_or_else(|| MutationError::ResourceNotFound(style_id.clone()))?;
            if self.references_source(&style) {
                slots.push((slot, style_id, Pending::Clone(style)));
            } else {
                self.map.unrelated.insert(style_id.clone());
            }
        }

        for (property, variable) in &node.bindings {
            if variable == self.source && self.options.includes_property(property) {
                self.host.rebind_node(&node.id, property, self.target).await?;
                self.log.record_direct(&node.id, property.clone());
            }
        }

        for (slot, style_id, pending) in slots {
            let replacement = match pending {
                Pending::Known(id) => id,
                Pending::Clone(style) => self.replacement_for(&style).await?,
            };
            self.host.rebind_node(&node.id, slot, &replacement).await?;
            self.log.record_clone(
                &node.id,
                slot.clone(),
                ClonedResource {
                    original: style_id.clone(),
                    clone: replacement,
                },
            );
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

    fn references_source(&self, style: &SharedResource) -> bool {
        style
            .bindings
            .iter()
            .any(|(property, variable)| variable == self.source && self.options.includes_property(property))
    }

    async fn replacement_for(&self, style: &SharedResource) -> Result<ResourceId, MutationError> {
        let cell = self.map.cell(&style.id);
        let id = cell.get_or_try_init(|| self.clone_style(style)).await?;
        Ok(id.clone())
    }

    async fn clone_style(&self, style: &SharedResource) -> Result<ResourceId, MutationError> {
        let bindings = style
            .bindings
            .iter()
            .map(|(property, variable)| {
                let rewritten = if variable == self.source && self.options.includes_property(property) {
                    self.target.clone()
                } else {
                    variable.clone()
                };
                (property.clone(), rewritten)
            })
            .collect();

        let name = self.unique_name(&style.name).await?;
        let template = ResourceTemplate {
            name: name.clone(),
            kind: style.kind,
            bindings,
            properties: style.properties.clone(),
        };

        match self.host.clone_resource(&template).await {
            Ok(created) => {
                tracing::info!(
                    original = %style.id,
                    clone = %created.id,
                    name = %created.name,
                    "cloned shared resource"
                );
                self.map.replacements.insert(created.id.clone());
                Ok(created.id)
            }
            Err(e) => {
                self.map.release_name(&name);
                Err(e.into())
            }
        }
    }

    /// `base`, then `base (2)`, `base (3)`, ... until free locally and in this run
    async fn unique_name(&self, base: &str) -> Result<String, MutationError> {
        for n in 1..=MAX_NAME_ATTEMPTS {
            let candidate = if n == 1 {
                base.to_string()
            } else {
                format!("{base} ({n})")
            };
            if !self.host.resource_name_exists(&candidate).await? && self.map.reserve_name(&candidate) {
                return Ok(candidate);
            }
        }
        Err(MutationError::CloneNameExhausted {
            base: base.to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use restyle_core::{Node, PropertyKey, ResourceKind};
    use restyle_test_utils::{node_id, shared_style_document, Fault, HostOp, InMemoryHost};
    use std::time::Duration;

    fn options() -> MutationOptions {
        MutationOptions::Binding {
            property_types: None,
        }
    }

    #[tokio::test]
    async fn clones_shared_style_once_for_many_nodes() {
        let (host, _) = shared_style_document(10);
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        for i in 1..=10 {
            resolver.resolve(&node_id(i)).await.unwrap();
        }

        assert_eq!(host.count(HostOp::Clone), 1);
        let clones = host.local_clones();
        assert_eq!(clones.len(), 1);
        for i in 1..=10 {
            let node = host.node(node_id(i).as_str()).unwrap();
            assert_eq!(node.style_refs.values().next(), Some(&clones[0].id));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_nodes_share_one_clone() {
        let (host, _) = shared_style_document(20);
        let host = host.with_latency(Duration::from_millis(5));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        let ids: Vec<_> = (1..=20).map(node_id).collect();
        let results = join_all(ids.iter().map(|id| resolver.resolve(id))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(host.count(HostOp::Clone), 1);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn clone_rewrites_only_source_binding() {
        let (host, _) = shared_style_document(1);
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        resolver.resolve(&node_id(1)).await.unwrap();

        let clone = &host.local_clones()[0];
        assert_eq!(clone.name, "Brand/Primary");
        assert_eq!(clone.bindings.get(&PropertyKey::from("fills")), Some(&target));
        assert_eq!(clone.bindings.get(&PropertyKey::from("strokes")), Some(&ResourceId::from("V:stroke")));
        let original = host.resource("R:brand").unwrap();
        assert_eq!(clone.properties, original.properties);
        assert_eq!(original.bindings.get(&PropertyKey::from("fills")), Some(&source));
    }

    #[tokio::test]
    async fn clone_name_gets_numeric_suffix_on_conflict() {
        let (host, _) = shared_style_document(1);
        host.insert_resource(SharedResource::new("S:local", "Brand/Primary", ResourceKind::Style));
        host.insert_resource(SharedResource::new("S:local2", "Brand/Primary (2)", ResourceKind::Style));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        resolver.resolve(&node_id(1)).await.unwrap();

        assert_eq!(host.local_clones()[0].name, "Brand/Primary (3)");
    }

    #[tokio::test]
    async fn direct_binding_is_rebound_without_clone() {
        let (host, _) = shared_style_document(0);
        host.insert_node(Node::new("9:1", "Icon", "VECTOR").with_binding("fills", "V:old"));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        let migration = resolver.resolve(&NodeId::from("9:1")).await.unwrap();

        assert_eq!(migration.direct, vec![PropertyKey::from("fills")]);
        assert!(migration.via_clone.is_empty());
        assert_eq!(host.count(HostOp::Clone), 0);
        assert_eq!(host.node("9:1").unwrap().bindings.get(&PropertyKey::from("fills")), Some(&target));
    }

    #[tokio::test]
    async fn node_with_direct_and_inherited_reference_migrates_both() {
        let (host, _) = shared_style_document(0);
        host.insert_node(
            Node::new("9:1", "Chip", "FRAME")
                .with_binding("strokes", "V:old")
                .with_style("fill", "R:brand"),
        );
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        let migration = resolver.resolve(&NodeId::from("9:1")).await.unwrap();

        assert!(migration.migrated());
        assert_eq!(migration.direct.len(), 1);
        assert_eq!(migration.via_clone.len(), 1);
    }

    #[tokio::test]
    async fn missing_reference_is_a_failure() {
        let (host, _) = shared_style_document(0);
        host.insert_node(Node::new("9:1", "Plain", "RECTANGLE"));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        let err = resolver.resolve(&NodeId::from("9:1")).await.unwrap_err();
        assert!(matches!(err, MutationError::SourceReferenceNotFound { .. }));
        assert_eq!(host.mutation_count(), 0);
    }

    #[tokio::test]
    async fn property_filter_excludes_unlisted_bindings() {
        let (host, _) = shared_style_document(1);
        let map = ResolvedResourceMap::new();
        let source = ResourceId::from("V:old");
        let target = ResourceId::from("V:new");
        let opts = MutationOptions::Binding {
            property_types: Some(vec!["strokes".to_string()]),
        };
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        let err = resolver.resolve(&node_id(1)).await.unwrap_err();
        assert!(matches!(err, MutationError::SourceReferenceNotFound { .. }));
        assert_eq!(host.count(HostOp::Clone), 0);
    }

    #[tokio::test]
    async fn failed_clone_is_retried_by_next_node() {
        let (host, _) = shared_style_document(2);
        host.inject(Fault::always(HostOp::Clone, "request timed out").times(1));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        assert!(resolver.resolve(&node_id(1)).await.is_err());
        assert!(map.is_empty());
        resolver.resolve(&node_id(1)).await.unwrap();
        resolver.resolve(&node_id(2)).await.unwrap();

        assert_eq!(host.local_clones().len(), 1);
        assert_eq!(host.local_clones()[0].name, "Brand/Primary");
    }

    fn with_unrelated_style(host: &InMemoryHost, id: &str) {
        host.insert_resource(SharedResource::new("S:text", "Body/Regular", ResourceKind::Style).remote());
        host.insert_node(
            Node::new(id, "Caption", "TEXT")
                .with_binding("fills", "V:old")
                .with_style("text", "S:text"),
        );
    }

    #[tokio::test]
    async fn failed_style_read_leaves_node_untouched() {
        let (host, _) = shared_style_document(0);
        with_unrelated_style(&host, "9:1");
        host.inject(Fault::always(HostOp::GetResource, "request timed out").on("S:text").times(1));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);
        let id = NodeId::from("9:1");

        assert!(matches!(resolver.resolve(&id).await, Err(MutationError::Host(_))));
        assert_eq!(host.mutation_count(), 0);

        let migration = resolver.resolve(&id).await.unwrap();
        assert_eq!(migration.direct, vec![PropertyKey::from("fills")]);
        assert_eq!(host.node("9:1").unwrap().bindings.get(&PropertyKey::from("fills")), Some(&target));
    }

    #[tokio::test]
    async fn retry_after_failed_clone_keeps_earlier_rebind() {
        let (host, _) = shared_style_document(0);
        host.insert_node(
            Node::new("9:1", "Chip", "FRAME")
                .with_binding("strokes", "V:old")
                .with_style("fill", "R:brand"),
        );
        host.inject(Fault::always(HostOp::Clone, "connection reset").times(1));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);
        let id = NodeId::from("9:1");

        assert!(resolver.resolve(&id).await.is_err());
        assert_eq!(host.node("9:1").unwrap().bindings.get(&PropertyKey::from("strokes")), Some(&target));

        let migration = resolver.resolve(&id).await.unwrap();
        assert_eq!(migration.direct, vec![PropertyKey::from("strokes")]);
        assert_eq!(migration.via_clone.len(), 1);
        assert_eq!(host.count(HostOp::Rebind), 2);
    }

    #[tokio::test]
    async fn retry_after_failed_slot_rebind_keeps_clone() {
        let (host, _) = shared_style_document(0);
        host.insert_node(Node::new("9:1", "Chip", "FRAME").with_style("fill", "R:brand"));
        host.inject(Fault::always(HostOp::Rebind, "connection reset").on("9:1").times(1));
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);
        let id = NodeId::from("9:1");

        assert!(resolver.resolve(&id).await.is_err());
        let migration = resolver.resolve(&id).await.unwrap();

        assert_eq!(migration.via_clone.len(), 1);
        assert_eq!(host.count(HostOp::Clone), 1);
        let node = host.node("9:1").unwrap();
        assert_eq!(node.style_refs.values().next(), Some(&migration.via_clone[0].1.clone));
    }

    #[tokio::test]
    async fn unrelated_style_is_read_once_per_run() {
        let (host, _) = shared_style_document(0);
        with_unrelated_style(&host, "9:1");
        with_unrelated_style(&host, "9:2");
        with_unrelated_style(&host, "9:3");
        let map = ResolvedResourceMap::new();
        let (source, target, opts) = (ResourceId::from("V:old"), ResourceId::from("V:new"), options());
        let resolver = CloneResolver::new(&host, &map, &source, &target, &opts);

        for id in ["9:1", "9:2", "9:3"] {
            resolver.resolve(&NodeId::from(id)).await.unwrap();
        }

        let reads = host
            .calls()
            .into_iter()
            .filter(|c| c.op == HostOp::GetResource && c.subject == "S:text")
            .count();
        assert_eq!(reads, 1);
        assert!(map.is_unrelated(&ResourceId::from("S:text")));
    }
}
