//! A single cache entry: a Kubernetes `Node` paired with its `NodeClaim` by
//! `providerID`, plus the bookkeeping the disruption engine and candidate
//! builder read.

use k8s_openapi::api::core::v1::Node;
use karpenter_api::{LABEL_NODEPOOL, NodeClaim};

/// One tracked machine. Either side of the pairing may be briefly absent
/// (a `Node` registers before its `NodeClaim` status catches up, and vice
/// versa during deletion), so both are `Option`.
#[derive(Clone, Debug, Default)]
pub struct StateNode {
    pub provider_id: String,
    pub node: Option<Node>,
    pub node_claim: Option<NodeClaim>,
    /// Set by `NominateNodeForPod`; cleared on the next full resync or explicitly.
    pub nominated: bool,
    /// Set by `MarkForDeletion`; prevents new candidates/nominations.
    pub marked_for_deletion: bool,
    /// Cleared by `MarkUnconsolidated`, forcing the consolidation methods to
    /// re-derive `Consolidatable` before considering this node again.
    pub unconsolidated: bool,
}

impl StateNode {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }

    /// The pool name from the node's `karpenter.sh/nodepool` label, if managed.
    pub fn nodepool_name(&self) -> Option<&str> {
        self.node
            .as_ref()
            .and_then(|n| n.metadata.labels.as_ref())
            .and_then(|l| l.get(LABEL_NODEPOOL))
            .map(|s| s.as_str())
            .or_else(|| self.node_claim.as_ref().and_then(|c| c.nodepool_name()))
    }

    /// A node is managed when it carries the `nodepool` label and resolves to
    /// a tracked NodeClaim.
    pub fn is_managed(&self) -> bool {
        self.nodepool_name().is_some() && self.node_claim.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.node_claim
            .as_ref()
            .map(|c| c.is_initialized())
            .unwrap_or(false)
    }

    pub fn is_deleting(&self) -> bool {
        self.marked_for_deletion
            || self
                .node
                .as_ref()
                .is_some_and(|n| n.metadata.deletion_timestamp.is_some())
            || self
                .node_claim
                .as_ref()
                .is_some_and(|c| c.metadata.deletion_timestamp.is_some())
    }
}
