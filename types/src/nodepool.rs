use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::requirements::{NodeSelectorRequirement, Taint};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default, JsonSchema)]
pub struct NodeClassReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

fn default_expire_after() -> String {
    "720h".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodePoolTemplateSpec {
    #[serde(default)]
    pub requirements: Vec<NodeSelectorRequirement>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(rename = "startupTaints", default)]
    pub startup_taints: Vec<Taint>,
    #[serde(rename = "nodeClassRef")]
    pub node_class_ref: NodeClassReference,
    #[serde(rename = "expireAfter", default = "default_expire_after")]
    pub expire_after: String,
    #[serde(rename = "terminationGracePeriod", skip_serializing_if = "Option::is_none")]
    pub termination_grace_period: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ConsolidationPolicy {
    WhenEmpty,
    WhenEmptyOrUnderutilized,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        ConsolidationPolicy::WhenEmptyOrUnderutilized
    }
}

/// A disruption reason a budget can be scoped to. An empty `reasons` list on a
/// [`Budget`] means "all reasons", which is represented by an empty `Vec` here
/// rather than a separate sentinel.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum DisruptionReason {
    Drifted,
    Underutilized,
    Empty,
}

impl std::fmt::Display for DisruptionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisruptionReason::Drifted => "Drifted",
            DisruptionReason::Underutilized => "Underutilized",
            DisruptionReason::Empty => "Empty",
        };
        write!(f, "{s}")
    }
}

/// A time-windowed cap on concurrent disruptions. `nodes` is kept as a string
/// so it can hold either a bare integer or a `NN%` percentage, exactly as the
/// CRD field does on the wire.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct Budget {
    pub nodes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<DisruptionReason>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct Disruption {
    #[serde(rename = "consolidationPolicy", default)]
    pub consolidation_policy: ConsolidationPolicy,
    #[serde(rename = "consolidateAfter", default = "default_consolidate_after")]
    pub consolidate_after: String,
    #[serde(default)]
    pub budgets: Vec<Budget>,
}

fn default_consolidate_after() -> String {
    "Never".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodePoolTemplate {
    #[serde(default)]
    pub spec: NodePoolTemplateSpec,
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "karpenter.sh",
    version = "v1",
    kind = "NodePool",
    plural = "nodepools",
    derive = "PartialEq",
    status = "NodePoolStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".spec.replicas\", \"name\": \"REPLICAS\", \"type\": \"integer\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.resources.nodes\", \"name\": \"NODES\", \"type\": \"string\" }"
)]
pub struct NodePoolSpec {
    /// Presence makes the pool static; absence makes it dynamic. Immutable mode
    /// switch: a validating reconcile rejects flipping `Some`/`None` post-creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i64>,
    #[serde(default)]
    pub template: NodePoolTemplate,
    #[serde(default)]
    pub disruption: Disruption,
    /// Resource limits; the reserved `"nodes"` key caps NodeClaim count.
    #[serde(default)]
    pub limits: std::collections::BTreeMap<String, String>,
    /// Dynamic pools only; validation rejects setting this on a static pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodePoolResourceCounts {
    #[serde(default)]
    pub nodes: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodePoolStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub resources: NodePoolResourceCounts,
}

impl NodePool {
    pub fn is_static(&self) -> bool {
        self.spec.replicas.is_some()
    }

    pub fn nodes_limit(&self) -> Option<u64> {
        self.spec
            .limits
            .get(crate::labels::LIMIT_NODES_KEY)
            .and_then(|v| v.parse().ok())
    }
}
