//! Well-known label, annotation, and taint keys used by the control plane.
//!
//! Mirrors the `karpenter.sh` API group conventions: a handful of labels the
//! scheduler and disruption engine read on every Node/NodeClaim, plus the
//! "beta" aliases Kubernetes still ships on older clusters.

/// API group for all resources and well-known keys defined by this crate.
pub const GROUP: &str = "karpenter.sh";

/// Label carrying the owning [`crate::NodePool`] name, set on every Node and NodeClaim.
pub const LABEL_NODEPOOL: &str = "karpenter.sh/nodepool";

/// Label describing whether an instance is spot, on-demand, or a capacity reservation.
pub const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";

pub const CAPACITY_TYPE_SPOT: &str = "spot";
pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";
pub const CAPACITY_TYPE_RESERVED: &str = "reserved";

/// Stable instance-type label (node.kubernetes.io).
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";

/// Stable zone label (topology.kubernetes.io) and its deprecated beta alias.
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_ZONE_BETA: &str = "failure-domain.beta.kubernetes.io/zone";

/// Stable region label and its deprecated beta alias.
pub const LABEL_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_REGION_BETA: &str = "failure-domain.beta.kubernetes.io/region";

/// Stable architecture label and its deprecated beta alias.
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_ARCH_BETA: &str = "beta.kubernetes.io/arch";

/// Stable OS label and its deprecated beta alias.
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_OS_BETA: &str = "beta.kubernetes.io/os";

/// Hostname label, used as a uniqueness anchor by some scheduling constraints.
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

/// Aliased label pairs: (deprecated beta key, canonical stable key).
///
/// Requirement construction normalises the beta key to its stable form so
/// the rest of the system only ever has to reason about one spelling.
pub const LABEL_ALIASES: &[(&str, &str)] = &[
    (LABEL_ZONE_BETA, LABEL_ZONE),
    (LABEL_REGION_BETA, LABEL_REGION),
    (LABEL_ARCH_BETA, LABEL_ARCH),
    (LABEL_OS_BETA, LABEL_OS),
];

/// All labels Karpenter itself understands well enough to require callers to
/// bound them explicitly in [`crate::requirements::Requirements::compatible`]'s
/// strict mode, and to suggest as typo corrections in allow-undefined mode.
pub const WELL_KNOWN_LABELS: &[&str] = &[
    LABEL_NODEPOOL,
    LABEL_CAPACITY_TYPE,
    LABEL_INSTANCE_TYPE,
    LABEL_ZONE,
    LABEL_REGION,
    LABEL_ARCH,
    LABEL_OS,
    LABEL_HOSTNAME,
];

/// Annotation that blocks graceful disruption of the pod or node it is set on.
pub const ANNOTATION_DO_NOT_DISRUPT: &str = "karpenter.sh/do-not-disrupt";

/// Annotation recording the hash of the `NodePool`/`NodeClaim` template used for drift detection.
pub const ANNOTATION_NODEPOOL_HASH: &str = "karpenter.sh/nodepool-hash";

/// Annotation recording which version of the hashing algorithm produced [`ANNOTATION_NODEPOOL_HASH`].
pub const ANNOTATION_NODEPOOL_HASH_VERSION: &str = "karpenter.sh/nodepool-hash-version";

/// Current hash algorithm version. Bump when the hashing scheme changes so
/// existing claims update in place instead of mass-drifting.
pub const NODEPOOL_HASH_VERSION: &str = "v1";

/// Taint applied to a candidate while a disruption `Command` is executing.
pub const TAINT_DISRUPTED_KEY: &str = "karpenter.sh/disrupted";
pub const TAINT_DISRUPTED_VALUE: &str = "disrupting";
pub const TAINT_DISRUPTED_EFFECT: &str = "NoSchedule";

/// Taint applied to a node before it completes registration.
pub const TAINT_UNREGISTERED_KEY: &str = "karpenter.sh/unregistered";
pub const TAINT_UNREGISTERED_VALUE: &str = "true";
pub const TAINT_UNREGISTERED_EFFECT: &str = "NoExecute";

/// Reserved resource-limit key that caps the number of `NodeClaim`s a pool may own.
pub const LIMIT_NODES_KEY: &str = "nodes";
