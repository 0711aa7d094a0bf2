//! Cluster State Cache (§4.2): an in-memory mirror of Nodes, NodeClaims and
//! DaemonSets keyed by `providerID`, with per-NodePool counters and the
//! atomic reservation protocol the static controller and provisioner
//! collaborator rely on.

mod node;

pub use node::StateNode;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Node;
use karpenter_api::NodeClaim;
use std::collections::HashMap;
use std::sync::RwLock;

/// Running/reserved/pending-disruption counters for one NodePool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeCount {
    pub running: i32,
    pub reserved: i32,
    pub pending_disruption: i32,
}

impl NodeCount {
    pub fn total(&self) -> i32 {
        self.running + self.reserved
    }
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, StateNode>,
    daemon_sets: HashMap<String, DaemonSet>,
    pool_counts: HashMap<String, NodeCount>,
    synced: bool,
}

/// Shared, lock-protected cluster state. Cheap to clone (wraps an `Arc`
/// internally via the caller holding it in one); reads take the read lock,
/// every mutator takes the write lock.
pub struct Cache {
    inner: RwLock<Inner>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn key_for_node(node: &Node) -> Option<String> {
        node.spec.as_ref()?.provider_id.clone()
    }

    fn key_for_claim(claim: &NodeClaim) -> Option<String> {
        claim.provider_id().map(|s| s.to_string())
    }

    pub fn update_node(&self, node: Node) {
        let Some(key) = Self::key_for_node(&node) else {
            return;
        };
        let mut inner = self.inner.write().unwrap();
        inner
            .nodes
            .entry(key.clone())
            .or_insert_with(|| StateNode::new(key))
            .node = Some(node);
    }

    pub fn delete_node(&self, provider_id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.nodes.get_mut(provider_id) {
            entry.node = None;
            if entry.node_claim.is_none() {
                inner.nodes.remove(provider_id);
            }
        }
    }

    /// Populates the node/claim pairing and, the first time a given
    /// `providerID`'s claim is observed, converts the owning pool's
    /// reservation into a running node (§4.2: "successful reservations
    /// convert to running automatically when the new NodeClaim appears").
    /// Repeat `Apply` events for an already-tracked claim (status updates,
    /// resyncs) are a no-op against `pool_counts`.
    pub fn update_node_claim(&self, claim: NodeClaim) {
        let Some(key) = Self::key_for_claim(&claim) else {
            return;
        };
        let mut inner = self.inner.write().unwrap();
        let first_observed = inner
            .nodes
            .get(&key)
            .map(|entry| entry.node_claim.is_none())
            .unwrap_or(true);
        let pool_name = claim.nodepool_name().map(|s| s.to_string());
        inner
            .nodes
            .entry(key.clone())
            .or_insert_with(|| StateNode::new(key))
            .node_claim = Some(claim);
        if first_observed && let Some(pool) = pool_name {
            Self::register_running_locked(&mut inner, &pool, 1);
        }
    }

    /// Removes the claim side of the pairing and, if it resolved to a pool,
    /// decrements that pool's running count — the inverse of the transition
    /// `update_node_claim` performs.
    pub fn delete_node_claim(&self, provider_id: &str) {
        let mut inner = self.inner.write().unwrap();
        let pool_name = inner
            .nodes
            .get(provider_id)
            .and_then(|entry| entry.node_claim.as_ref())
            .and_then(|c| c.nodepool_name())
            .map(|s| s.to_string());

        if let Some(entry) = inner.nodes.get_mut(provider_id) {
            entry.node_claim = None;
            if entry.node.is_none() {
                inner.nodes.remove(provider_id);
            }
        }

        if let Some(pool) = pool_name {
            Self::decrement_running_locked(&mut inner, &pool);
        }
    }

    pub fn update_daemon_set(&self, ds: DaemonSet) {
        let Some(key) = ds
            .metadata
            .namespace
            .clone()
            .zip(ds.metadata.name.clone())
            .map(|(ns, name)| format!("{ns}/{name}"))
        else {
            return;
        };
        self.inner.write().unwrap().daemon_sets.insert(key, ds);
    }

    pub fn delete_daemon_set(&self, namespace: &str, name: &str) {
        self.inner
            .write()
            .unwrap()
            .daemon_sets
            .remove(&format!("{namespace}/{name}"));
    }

    pub fn daemon_sets(&self) -> Vec<DaemonSet> {
        self.inner.read().unwrap().daemon_sets.values().cloned().collect()
    }

    pub fn nominate_node_for_pod(&self, provider_id: &str) {
        if let Some(entry) = self.inner.write().unwrap().nodes.get_mut(provider_id) {
            entry.nominated = true;
        }
    }

    pub fn mark_for_deletion(&self, provider_id: &str) {
        if let Some(entry) = self.inner.write().unwrap().nodes.get_mut(provider_id) {
            entry.marked_for_deletion = true;
        }
    }

    pub fn unmark_for_deletion(&self, provider_id: &str) {
        if let Some(entry) = self.inner.write().unwrap().nodes.get_mut(provider_id) {
            entry.marked_for_deletion = false;
        }
    }

    /// Clears the `Consolidatable` cache-side hint on every tracked node,
    /// forcing the consolidation methods to re-derive it.
    pub fn mark_unconsolidated(&self) {
        let mut inner = self.inner.write().unwrap();
        for entry in inner.nodes.values_mut() {
            entry.unconsolidated = true;
        }
    }

    /// Owned snapshots of every tracked node, safe for long-running readers
    /// (the disruption loop, the scheduler simulator) to hold without
    /// blocking writers.
    pub fn deep_copy_nodes(&self) -> Vec<StateNode> {
        self.inner.read().unwrap().nodes.values().cloned().collect()
    }

    pub fn nodes(&self) -> Vec<StateNode> {
        self.deep_copy_nodes()
    }

    /// `(running, reserved, pending_disruption)` for `pool`.
    pub fn get_node_count(&self, pool: &str) -> (i32, i32, i32) {
        let count = self
            .inner
            .read()
            .unwrap()
            .pool_counts
            .get(pool)
            .copied()
            .unwrap_or_default();
        (count.running, count.reserved, count.pending_disruption)
    }

    pub fn register_running(&self, pool: &str, delta: i32) {
        let mut inner = self.inner.write().unwrap();
        Self::register_running_locked(&mut inner, pool, delta);
    }

    /// Moves `delta` nodes of `pool` from `reserved` into `running`, under a
    /// lock the caller already holds.
    fn register_running_locked(inner: &mut Inner, pool: &str, delta: i32) {
        let count = inner.pool_counts.entry(pool.to_string()).or_default();
        count.running = (count.running + delta).max(0);
        count.reserved = (count.reserved - delta).max(0);
    }

    /// Drops one running node from `pool`, under a lock the caller already
    /// holds. Unlike [`Self::register_running_locked`], this does not restore
    /// a reservation slot: a node leaving service is not a cancelled
    /// reservation.
    fn decrement_running_locked(inner: &mut Inner, pool: &str) {
        if let Some(count) = inner.pool_counts.get_mut(pool) {
            count.running = (count.running - 1).max(0);
        }
    }

    pub fn set_pending_disruption(&self, pool: &str, n: i32) {
        let mut inner = self.inner.write().unwrap();
        inner.pool_counts.entry(pool.to_string()).or_default().pending_disruption = n;
    }

    /// Atomically caps `running + reserved` at `limit` and grants as much of
    /// `want` as remains. Single guarded region: read-then-add happens under
    /// one write-lock acquisition, so concurrent callers never jointly
    /// overshoot `limit`.
    pub fn reserve_node_count(&self, pool: &str, limit: i32, want: i32) -> i32 {
        let mut inner = self.inner.write().unwrap();
        let count = inner.pool_counts.entry(pool.to_string()).or_default();
        let available = (limit - count.total()).max(0);
        let granted = want.min(available).max(0);
        count.reserved += granted;
        granted
    }

    /// Idempotent: releasing more than is reserved simply floors at zero.
    pub fn release_node_count(&self, pool: &str, n: i32) {
        let mut inner = self.inner.write().unwrap();
        if let Some(count) = inner.pool_counts.get_mut(pool) {
            count.reserved = (count.reserved - n).max(0);
        }
    }

    pub fn has_synced(&self) -> bool {
        self.inner.read().unwrap().synced
    }

    /// Marks the bootstrap sweep of Nodes+NodeClaims complete, unblocking
    /// count-based decisions (disruption, static provisioning).
    pub fn mark_synced(&self) {
        self.inner.write().unwrap().synced = true;
    }
}
