use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::nodepool::NodePoolTemplateSpec;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct ResourceRequests {
    #[serde(default)]
    pub requests: std::collections::BTreeMap<String, String>,
}

/// Well-known condition types tracked on a `NodeClaim`'s status.
pub mod condition_type {
    pub const LAUNCHED: &str = "Launched";
    pub const REGISTERED: &str = "Registered";
    pub const INITIALIZED: &str = "Initialized";
    pub const DRIFTED: &str = "Drifted";
    pub const EMPTY: &str = "Empty";
    pub const CONSOLIDATABLE: &str = "Consolidatable";
    pub const DISRUPTION_REASON: &str = "DisruptionReason";
    pub const INSTANCE_TERMINATING: &str = "InstanceTerminating";
}

#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "karpenter.sh",
    version = "v1",
    kind = "NodeClaim",
    plural = "nodeclaims",
    derive = "PartialEq",
    status = "NodeClaimStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.nodeName\", \"name\": \"NODE\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".metadata.labels.karpenter\\\\.sh/nodepool\", \"name\": \"NODEPOOL\", \"type\": \"string\" }"
)]
pub struct NodeClaimSpec {
    /// Copy of the owning pool's template fields at creation time; immutable thereafter.
    #[serde(flatten)]
    pub template: NodePoolTemplateSpec,
    #[serde(default)]
    pub resources: ResourceRequests,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodeClaimStatus {
    #[serde(rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub allocatable: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub capacity: std::collections::BTreeMap<String, String>,
    #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl NodeClaim {
    pub fn has_condition_true(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.type_ == condition_type && c.status == "True")
            })
            .unwrap_or(false)
    }

    pub fn is_initialized(&self) -> bool {
        self.has_condition_true(condition_type::INITIALIZED)
    }

    pub fn is_drifted(&self) -> bool {
        self.has_condition_true(condition_type::DRIFTED)
    }

    pub fn is_empty(&self) -> bool {
        self.has_condition_true(condition_type::EMPTY)
    }

    pub fn is_consolidatable(&self) -> bool {
        self.has_condition_true(condition_type::CONSOLIDATABLE)
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.provider_id.as_deref())
    }

    pub fn nodepool_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(crate::labels::LABEL_NODEPOOL))
            .map(|s| s.as_str())
    }
}
