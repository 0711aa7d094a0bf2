//! Wire-format CRD types for the Karpenter control-plane core: `NodePool` and
//! `NodeClaim`, their shared template fields, and the well-known label/
//! annotation/taint keys every other component reads.

pub mod labels;
pub mod nodeclaim;
pub mod nodepool;
pub mod requirements;

pub use labels::*;
pub use nodeclaim::{NodeClaim, NodeClaimSpec, NodeClaimStatus, ResourceRequests, condition_type};
pub use nodepool::{
    Budget, ConsolidationPolicy, Disruption, DisruptionReason, NodeClassReference, NodePool,
    NodePoolResourceCounts, NodePoolSpec, NodePoolStatus, NodePoolTemplate, NodePoolTemplateSpec,
};
pub use requirements::{NodeSelectorRequirement, Operator, Taint};
