//! Core types for restyle
//!
//! Defines the fundamental types shared by the engine and its host adapters:
//! - Node, resource and run identifiers
//! - Domain views of document nodes and shared resources
//! - Mutation requests and their options
//! - Batch outcomes, failure records and the terminal replacement result

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from anything string-like
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw id
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Host identifier of a content node
    NodeId
);
string_id!(
    /// Host identifier of a shared resource (style or variable)
    ResourceId
);
string_id!(
    /// Name of a node or resource property (`fills`, `strokes`, `text`, ...)
    PropertyKey
);

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of shared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Reusable attribute bundle referenced by nodes
    Style,
    /// Bound value source referenced by nodes or styles
    Variable,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Style => f.write_str("style"),
            Self::Variable => f.write_str("variable"),
        }
    }
}

/// Domain view of a document node
///
/// Produced by the host adapter on retrieval; the engine never sees raw host
/// objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID
    pub id: NodeId,
    /// Display name
    pub name: String,
    /// Host node type (`TEXT`, `FRAME`, ...)
    pub node_type: String,
    /// Parent node, if any
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Style slots: property -> referenced style
    #[serde(default)]
    pub style_refs: BTreeMap<PropertyKey, ResourceId>,
    /// Direct variable bindings: property -> bound variable
    #[serde(default)]
    pub bindings: BTreeMap<PropertyKey, ResourceId>,
}

impl Node {
    /// Create a node with no parent, styles or bindings
    #[must_use]
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type: node_type.into(),
            parent: None,
            style_refs: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// With parent
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<NodeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// With a style reference in the given slot
    #[must_use]
    pub fn with_style(mut self, slot: impl Into<PropertyKey>, style: impl Into<ResourceId>) -> Self {
        self.style_refs.insert(slot.into(), style.into());
        self
    }

    /// With a direct variable binding on the given property
    #[must_use]
    pub fn with_binding(
        mut self,
        property: impl Into<PropertyKey>,
        variable: impl Into<ResourceId>,
    ) -> Self {
        self.bindings.insert(property.into(), variable.into());
        self
    }
}

/// Domain view of a shared resource (style or variable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedResource {
    /// Resource ID
    pub id: ResourceId,
    /// Display name
    pub name: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Whether the resource comes from a library not owned by this document
    #[serde(default)]
    pub remote: bool,
    /// Variable bindings held by the resource itself
    #[serde(default)]
    pub bindings: BTreeMap<PropertyKey, ResourceId>,
    /// Every other property, copied verbatim when cloned
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl SharedResource {
    /// Create an empty local resource
    #[must_use]
    pub fn new(id: impl Into<ResourceId>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            remote: false,
            bindings: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Mark as library (remote) resource
    #[must_use]
    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    /// With a variable binding
    #[must_use]
    pub fn with_binding(
        mut self,
        property: impl Into<PropertyKey>,
        variable: impl Into<ResourceId>,
    ) -> Self {
        self.bindings.insert(property.into(), variable.into());
        self
    }

    /// With an opaque property value
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Everything the host needs to create a new local resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// Name for the new resource
    pub name: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Bindings of the new resource
    pub bindings: BTreeMap<PropertyKey, ResourceId>,
    /// Properties of the new resource
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Opaque handle returned by the host snapshot primitive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotHandle(pub String);

/// Recovery point captured before any mutation
///
/// The engine only relies on its existence; the handle is never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Human-readable title shown in the host's history
    pub title: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Host handle
    pub handle: SnapshotHandle,
}

/// Phase of the mutation state controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No run in flight
    Idle,
    /// Structural validation
    Validating,
    /// Host snapshot being captured
    CreatingCheckpoint,
    /// Batches being processed
    Processing,
    /// Run finished (possibly with item failures)
    Complete,
    /// Run could not finish
    Error,
    /// Run stopped on request
    Cancelled,
}

impl Phase {
    /// All phases, in lifecycle order
    pub const ALL: [Phase; 7] = [
        Phase::Idle,
        Phase::Validating,
        Phase::CreatingCheckpoint,
        Phase::Processing,
        Phase::Complete,
        Phase::Error,
        Phase::Cancelled,
    ];

    /// Terminal phases return to idle before a new run
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::CreatingCheckpoint => "creating_checkpoint",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class-specific request options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum MutationOptions {
    /// Replace one style with another on every affected node
    Style {
        /// Keep node-local overrides on the swapped slot
        #[serde(default)]
        preserve_overrides: bool,
    },
    /// Replace one bound variable with another
    Binding {
        /// Only rewrite these properties (all when `None`)
        #[serde(default)]
        property_types: Option<Vec<String>>,
    },
}

impl MutationOptions {
    /// Resource kind both ends of the request must have
    #[must_use]
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Self::Style { .. } => ResourceKind::Style,
            Self::Binding { .. } => ResourceKind::Variable,
        }
    }

    /// Whether a property passes the `property_types` filter
    #[must_use]
    pub fn includes_property(&self, property: &PropertyKey) -> bool {
        match self {
            Self::Binding {
                property_types: Some(types),
            } => types.iter().any(|t| t == property.as_str()),
            _ => true,
        }
    }
}

/// A bulk replacement request
///
/// Created by the caller and consumed once by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Resource being replaced
    pub source: ResourceId,
    /// Replacement resource
    pub target: ResourceId,
    /// Nodes to migrate
    pub affected_node_ids: Vec<NodeId>,
    /// Class-specific options
    pub options: MutationOptions,
}

impl MutationRequest {
    /// Style-class request
    #[must_use]
    pub fn style(
        source_style_id: impl Into<ResourceId>,
        target_style_id: impl Into<ResourceId>,
        affected_node_ids: Vec<NodeId>,
    ) -> Self {
        Self {
            source: source_style_id.into(),
            target: target_style_id.into(),
            affected_node_ids,
            options: MutationOptions::Style {
                preserve_overrides: false,
            },
        }
    }

    /// Binding-class request
    #[must_use]
    pub fn binding(
        source_binding_id: impl Into<ResourceId>,
        target_binding_id: impl Into<ResourceId>,
        affected_node_ids: Vec<NodeId>,
    ) -> Self {
        Self {
            source: source_binding_id.into(),
            target: target_binding_id.into(),
            affected_node_ids,
            options: MutationOptions::Binding {
                property_types: None,
            },
        }
    }

    /// Keep local overrides (style-class only)
    #[must_use]
    pub fn preserving_overrides(mut self) -> Self {
        if let MutationOptions::Style { preserve_overrides } = &mut self.options {
            *preserve_overrides = true;
        }
        self
    }

    /// Restrict rewritten properties (binding-class only)
    #[must_use]
    pub fn with_property_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let MutationOptions::Binding { property_types } = &mut self.options {
            *property_types = Some(types.into_iter().map(Into::into).collect());
        }
        self
    }
}

/// Why a single node could not be migrated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Node that failed
    pub node_id: NodeId,
    /// Human-readable location (`Page / Frame / Node`)
    pub node_label: String,
    /// Classified failure kind
    pub error_kind: ErrorKind,
    /// Final error message
    pub message: String,
    /// Retries performed before giving up
    pub retry_count: u32,
}

/// Aggregate result of one batch, emitted after every item settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// 1-based batch number
    pub batch_number: usize,
    /// Items in this batch
    pub size: usize,
    /// Items migrated
    pub succeeded: usize,
    /// Items that failed
    pub failed: usize,
    /// Items not started because cancellation was observed
    pub skipped: usize,
    /// Failure details
    pub failures: Vec<FailureRecord>,
    /// Wall time of the batch
    pub duration_ms: u64,
    /// Size the scheduler chose for the following batch
    pub next_batch_size: usize,
    /// Batches done plus batches still needed at `next_batch_size`
    pub estimated_total_batches: usize,
}

impl BatchOutcome {
    /// Items that were started and settled
    #[inline]
    #[must_use]
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// A progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current phase
    pub phase: Phase,
    /// 0 - 100
    pub percentage: u8,
    /// Last settled batch
    pub batch_number: usize,
    /// Estimated batch count
    pub total_batches: usize,
    /// Size of the last settled batch
    pub batch_size: usize,
    /// Items settled so far
    pub items_processed: usize,
    /// Items failed so far
    pub items_failed: usize,
    /// Title of the checkpoint, once created
    pub checkpoint_title: Option<String>,
}

/// How a run terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every batch was processed
    Completed,
    /// The caller cancelled; remaining items were skipped
    Cancelled,
}

/// A shared resource cloned during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonedResource {
    /// Original shared resource
    pub original: ResourceId,
    /// Locally-owned replacement
    pub clone: ResourceId,
}

/// Terminal artifact returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementResult {
    /// Run correlation id
    pub run_id: RunId,
    /// Termination status
    pub status: RunStatus,
    /// Completed with zero item failures
    pub success: bool,
    /// Nodes migrated
    pub items_updated: usize,
    /// Nodes that failed
    pub items_failed: usize,
    /// Nodes never started (cancellation)
    pub items_skipped: usize,
    /// Failure details
    pub failures: Vec<FailureRecord>,
    /// Recovery point; always present once captured
    pub checkpoint: Option<Checkpoint>,
    /// Wall time of the run
    pub duration_ms: u64,
    /// Failures or skipped items occurred
    pub has_warnings: bool,
    /// Size of every processed batch, in order
    pub batch_sizes: Vec<usize>,
    /// Shared resources cloned during the run
    pub clones: Vec<ClonedResource>,
}
