//! Testing utilities for restyle workspace
//!
//! An in-memory [`DocumentHost`] with a call log and fault injection, plus
//! document fixtures shared by the engine tests and the simulator.

#![allow(missing_docs)]

use parking_lot::Mutex;
use restyle_core::{
    DocumentHost, HostError, MutationRequest, Node, NodeId, PropertyKey, ResourceId, ResourceKind,
    ResourceTemplate, SharedResource, SnapshotHandle,
};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Host operations, for call logs and fault targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    LookupNode,
    GetResource,
    Rebind,
    ClearOverrides,
    Clone,
    NameExists,
    Snapshot,
}

impl HostOp {
    /// Operations that change the document
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Rebind | Self::ClearOverrides | Self::Clone)
    }
}

/// One recorded host call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCall {
    pub op: HostOp,
    /// Node or resource id, snapshot label or clone name
    pub subject: String,
}

/// Injected failure
#[derive(Debug, Clone)]
pub struct Fault {
    pub op: HostOp,
    /// Only calls on this subject fail (any subject when `None`)
    pub subject: Option<String>,
    pub message: String,
    /// Failures left; `None` fails forever
    pub remaining: Option<u32>,
}

impl Fault {
    /// Fail every matching call
    pub fn always(op: HostOp, message: impl Into<String>) -> Self {
        Self {
            op,
            subject: None,
            message: message.into(),
            remaining: None,
        }
    }

    /// Restrict to one subject
    #[must_use]
    pub fn on(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Fail only the first `n` matching calls
    #[must_use]
    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }
}

#[derive(Debug, Default)]
struct Document {
    nodes: BTreeMap<NodeId, Node>,
    resources: BTreeMap<ResourceId, SharedResource>,
    overrides: HashSet<(NodeId, PropertyKey)>,
    snapshots: Vec<String>,
    next_local_id: u64,
}

/// In-memory document host
#[derive(Debug, Default)]
pub struct InMemoryHost {
    doc: Mutex<Document>,
    calls: Mutex<Vec<HostCall>>,
    faults: Mutex<Vec<Fault>>,
    latency: Duration,
}

impl InMemoryHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every host call, so batch items interleave
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert_node(&self, node: Node) {
        self.doc.lock().nodes.insert(node.id.clone(), node);
    }

    pub fn insert_resource(&self, resource: SharedResource) {
        self.doc.lock().resources.insert(resource.id.clone(), resource);
    }

    /// Mark a style slot as carrying local overrides
    pub fn set_override(&self, node: impl Into<NodeId>, property: impl Into<PropertyKey>) {
        self.doc.lock().overrides.insert((node.into(), property.into()));
    }

    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<Node> {
        self.doc.lock().nodes.get(&NodeId::from(id)).cloned()
    }

    #[must_use]
    pub fn resource(&self, id: &str) -> Option<SharedResource> {
        self.doc.lock().resources.get(&ResourceId::from(id)).cloned()
    }

    /// Resources created through `clone_resource`
    #[must_use]
    pub fn local_clones(&self) -> Vec<SharedResource> {
        self.doc
            .lock()
            .resources
            .values()
            .filter(|r| r.id.as_str().starts_with("L:"))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn has_override(&self, node: &str, property: &str) -> bool {
        self.doc
            .lock()
            .overrides
            .contains(&(NodeId::from(node), PropertyKey::from(property)))
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<String> {
        self.doc.lock().snapshots.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn count(&self, op: HostOp) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.op.is_mutation()).count()
    }

    async fn enter(&self, op: HostOp, subject: &str) -> Result<(), HostError> {
        self.calls.lock().push(HostCall {
            op,
            subject: subject.to_string(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut faults = self.faults.lock();
        let hit = faults.iter_mut().find(|f| {
            f.op == op
                && f.subject.as_deref().map_or(true, |s| s == subject)
                && f.remaining != Some(0)
        });
        match hit {
            Some(fault) => {
                if let Some(n) = fault.remaining.as_mut() {
                    *n -= 1;
                }
                Err(HostError::new(fault.message.clone()))
            }
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl DocumentHost for InMemoryHost {
    async fn lookup_node(&self, id: &NodeId) -> Result<Option<Node>, HostError> {
        self.enter(HostOp::LookupNode, id.as_str()).await?;
        Ok(self.doc.lock().nodes.get(id).cloned())
    }

    async fn get_shared_resource(
        &self,
        id: &ResourceId,
    ) -> Result<Option<SharedResource>, HostError> {
        self.enter(HostOp::GetResource, id.as_str()).await?;
        Ok(self.doc.lock().resources.get(id).cloned())
    }

    async fn rebind_node(
        &self,
        node: &NodeId,
        property: &PropertyKey,
        resource: &ResourceId,
    ) -> Result<(), HostError> {
        self.enter(HostOp::Rebind, node.as_str()).await?;
        let mut doc = self.doc.lock();
        let kind = doc
            .resources
            .get(resource)
            .map(|r| r.kind)
            .ok_or_else(|| HostError::new(format!("resource not found: {resource}")))?;
        let entry = doc
            .nodes
            .get_mut(node)
            .ok_or_else(|| HostError::new(format!("node not found: {node}")))?;
        match kind {
            ResourceKind::Style => entry.style_refs.insert(property.clone(), resource.clone()),
            ResourceKind::Variable => entry.bindings.insert(property.clone(), resource.clone()),
        };
        Ok(())
    }

    async fn clear_overrides(&self, node: &NodeId, property: &PropertyKey) -> Result<(), HostError> {
        self.enter(HostOp::ClearOverrides, node.as_str()).await?;
        self.doc.lock().overrides.remove(&(node.clone(), property.clone()));
        Ok(())
    }

    async fn clone_resource(&self, template: &ResourceTemplate) -> Result<SharedResource, HostError> {
        self.enter(HostOp::Clone, &template.name).await?;
        let mut doc = self.doc.lock();
        doc.next_local_id += 1;
        let created = SharedResource {
            id: ResourceId::new(format!("L:{}", doc.next_local_id)),
            name: template.name.clone(),
            kind: template.kind,
            remote: false,
            bindings: template.bindings.clone(),
            properties: template.properties.clone(),
        };
        doc.resources.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn resource_name_exists(&self, name: &str) -> Result<bool, HostError> {
        self.enter(HostOp::NameExists, name).await?;
        Ok(self
            .doc
            .lock()
            .resources
            .values()
            .any(|r| !r.remote && r.name == name))
    }

    async fn create_snapshot(&self, label: &str) -> Result<SnapshotHandle, HostError> {
        self.enter(HostOp::Snapshot, label).await?;
        let mut doc = self.doc.lock();
        doc.snapshots.push(label.to_string());
        Ok(SnapshotHandle(format!("snapshot-{}", doc.snapshots.len())))
    }
}

/// Page and frame every fixture node lives under
pub const FIXTURE_PAGE: &str = "0:1";
pub const FIXTURE_FRAME: &str = "0:2";

fn insert_frame(host: &InMemoryHost) {
    host.insert_node(Node::new(FIXTURE_PAGE, "Page 1", "PAGE"));
    host.insert_node(Node::new(FIXTURE_FRAME, "Cards", "FRAME").with_parent(FIXTURE_PAGE));
}

/// Fixture node id for index `i`
#[must_use]
pub fn node_id(i: usize) -> NodeId {
    NodeId::new(format!("1:{i}"))
}

/// `n` nodes filled with style `S:old`; `S:new` exists as the target
#[must_use]
pub fn style_document(n: usize) -> (InMemoryHost, MutationRequest) {
    let host = InMemoryHost::new();
    insert_frame(&host);
    host.insert_resource(
        SharedResource::new("S:old", "Brand/Old", ResourceKind::Style)
            .with_property("color", serde_json::json!("#ff0000")),
    );
    host.insert_resource(
        SharedResource::new("S:new", "Brand/New", ResourceKind::Style)
            .with_property("color", serde_json::json!("#0000ff")),
    );
    let ids: Vec<NodeId> = (1..=n).map(node_id).collect();
    for (i, id) in ids.iter().enumerate() {
        host.insert_node(
            Node::new(id.clone(), format!("Card {}", i + 1), "RECTANGLE")
                .with_parent(FIXTURE_FRAME)
                .with_style("fill", "S:old"),
        );
    }
    (host, MutationRequest::style("S:old", "S:new", ids))
}

/// `n` nodes referencing the remote style `R:brand`, whose `fills` binding
/// points at variable `V:old`; `V:new` is the target
#[must_use]
pub fn shared_style_document(n: usize) -> (InMemoryHost, MutationRequest) {
    let host = InMemoryHost::new();
    insert_frame(&host);
    host.insert_resource(SharedResource::new("V:old", "color/old", ResourceKind::Variable));
    host.insert_resource(SharedResource::new("V:new", "color/new", ResourceKind::Variable));
    host.insert_resource(
        SharedResource::new("R:brand", "Brand/Primary", ResourceKind::Style)
            .remote()
            .with_binding("fills", "V:old")
            .with_binding("strokes", "V:stroke")
            .with_property("opacity", serde_json::json!(0.8)),
    );
    let ids: Vec<NodeId> = (1..=n).map(node_id).collect();
    for (i, id) in ids.iter().enumerate() {
        host.insert_node(
            Node::new(id.clone(), format!("Button {}", i + 1), "FRAME")
                .with_parent(FIXTURE_FRAME)
                .with_style("fill", "R:brand"),
        );
    }
    (host, MutationRequest::binding("V:old", "V:new", ids))
}

/// `n` nodes directly bound to `V:old` on `fills`
#[must_use]
pub fn binding_document(n: usize) -> (InMemoryHost, MutationRequest) {
    let host = InMemoryHost::new();
    insert_frame(&host);
    host.insert_resource(SharedResource::new("V:old", "color/old", ResourceKind::Variable));
    host.insert_resource(SharedResource::new("V:new", "color/new", ResourceKind::Variable));
    let ids: Vec<NodeId> = (1..=n).map(node_id).collect();
    for (i, id) in ids.iter().enumerate() {
        host.insert_node(
            Node::new(id.clone(), format!("Icon {}", i + 1), "VECTOR")
                .with_parent(FIXTURE_FRAME)
                .with_binding("fills", "V:old"),
        );
    }
    (host, MutationRequest::binding("V:old", "V:new", ids))
}
