use std::time::Duration;

pub mod metrics;
pub mod patch;

pub(crate) mod colors;

mod error;

pub use error::*;

/// The default interval for requeuing a managed resource.
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Interval the static provisioning controller requeues on after a denied reservation.
pub(crate) const DENIED_RESERVATION_REQUEUE: Duration = Duration::from_secs(30);

/// Name of the Kubernetes resource manager used in field-manager apply patches.
pub(crate) const MANAGER_NAME: &str = "karpenter-controller";

/// Stable hash of a NodePool/NodeClaim template, used for drift detection.
pub fn hash_spec<T: serde::Serialize>(spec: &T) -> String {
    use sha2::{Digest, Sha256};
    let spec_bytes = serde_json::to_vec(spec).unwrap();
    let mut hasher = Sha256::new();
    hasher.update(&spec_bytes);
    let result = hasher.finalize();
    hex::encode(result)
}
