use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Operators a scheduling requirement can use, mirroring Kubernetes node-selector
/// semantics plus the two numeric-comparison extensions Karpenter adds.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
        };
        write!(f, "{s}")
    }
}

/// Wire-format requirement, lossless round-trip of the `NodeSelectorRequirement`
/// shape Kubernetes CRDs expose plus the `minValues` extension.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: Option<Operator>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(rename = "minValues", skip_serializing_if = "Option::is_none")]
    pub min_values: Option<i32>,
}

/// A Kubernetes-style taint, well-formed meaning `effect` is one of the three
/// valid taint effects and `key` is non-empty.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Default, JsonSchema)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
}
