//! Simulated documents and run reports

use restyle_core::{
    MutationRequest, Node, NodeId, ReplacementResult, ResourceKind, RunStatus, SharedResource,
};
use restyle_test_utils::{
    node_id, shared_style_document, style_document, Fault, HostOp, InMemoryHost, FIXTURE_FRAME,
};
use std::fmt::{self, Write as _};

/// Failure injected into every `fail_every`-th node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FaultMode {
    /// Node stays locked; classified partial, never retried
    Locked,
    /// First attempt times out; recovered by retry
    Timeout,
    /// Permission error; classified persistent
    Denied,
}

impl FaultMode {
    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name {
            "locked" => Some(Self::Locked),
            "timeout" => Some(Self::Timeout),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }

    fn fault(self, node: &NodeId) -> Fault {
        match self {
            Self::Locked => Fault::always(HostOp::Rebind, "node is locked").on(node.as_str()),
            Self::Timeout => Fault::always(HostOp::Rebind, "request timed out")
                .on(node.as_str())
                .times(1),
            Self::Denied => Fault::always(HostOp::Rebind, "permission denied").on(node.as_str()),
        }
    }
}

/// Shape of the simulated document
#[derive(Debug, Clone)]
pub(crate) struct Scenario {
    pub(crate) nodes: usize,
    /// Remote styles the nodes reference; zero means a plain style swap
    pub(crate) shared_styles: usize,
    pub(crate) fail_every: Option<usize>,
    pub(crate) fault: FaultMode,
}

impl Scenario {
    pub(crate) fn build(&self) -> (InMemoryHost, MutationRequest) {
        let (host, request) = if self.shared_styles == 0 {
            style_document(self.nodes)
        } else {
            self.shared_document()
        };

        if let Some(every) = self.fail_every.filter(|n| *n > 0) {
            for id in request.affected_node_ids.iter().skip(every - 1).step_by(every) {
                host.inject(self.fault.fault(id));
            }
        }
        (host, request)
    }

    fn shared_document(&self) -> (InMemoryHost, MutationRequest) {
        let (host, _) = shared_style_document(0);
        for k in 0..self.shared_styles {
            host.insert_resource(
                SharedResource::new(
                    format!("R:{k}"),
                    format!("Shared/Style {}", k + 1),
                    ResourceKind::Style,
                )
                .remote()
                .with_binding("fills", "V:old"),
            );
        }

        let ids: Vec<NodeId> = (1..=self.nodes).map(node_id).collect();
        for (i, id) in ids.iter().enumerate() {
            host.insert_node(
                Node::new(id.clone(), format!("Layer {}", i + 1), "FRAME")
                    .with_parent(FIXTURE_FRAME)
                    .with_style("fill", format!("R:{}", i % self.shared_styles)),
            );
        }
        (host, MutationRequest::binding("V:old", "V:new", ids))
    }
}

const MAX_LISTED_FAILURES: usize = 10;

/// Human-readable run summary
pub(crate) fn render_text(result: &ReplacementResult) -> Result<String, fmt::Error> {
    let status = match result.status {
        RunStatus::Completed => "completed",
        RunStatus::Cancelled => "cancelled",
    };

    let mut out = String::new();
    writeln!(out, "Replacement Simulation Report")?;
    writeln!(out, "=============================")?;
    writeln!(out, "Run: {}", result.run_id)?;
    writeln!(out, "Status: {status}")?;
    writeln!(out, "Success: {}", result.success)?;
    writeln!(out, "Updated: {}", result.items_updated)?;
    writeln!(out, "Failed: {}", result.items_failed)?;
    writeln!(out, "Skipped: {}", result.items_skipped)?;
    writeln!(out, "Batches: {:?}", result.batch_sizes)?;
    writeln!(out, "Clones: {}", result.clones.len())?;
    if let Some(checkpoint) = &result.checkpoint {
        writeln!(out, "Checkpoint: {}", checkpoint.title)?;
    }
    writeln!(out, "Duration: {} ms", result.duration_ms)?;

    if !result.failures.is_empty() {
        writeln!(out)?;
        writeln!(out, "Failures:")?;
        for failure in result.failures.iter().take(MAX_LISTED_FAILURES) {
            writeln!(
                out,
                "  - {} [{}] {} (retries: {})",
                failure.node_label, failure.error_kind, failure.message, failure.retry_count
            )?;
        }
        if result.failures.len() > MAX_LISTED_FAILURES {
            writeln!(
                out,
                "  ... and {} more",
                result.failures.len() - MAX_LISTED_FAILURES
            )?;
        }
    }
    Ok(out)
}
