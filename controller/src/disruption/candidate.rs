//! Candidate Builder (§4.4): filters cluster nodes into valid disruption
//! candidates for a given [`Class`], attaching a structured rejection reason
//! (surfaced verbatim via the [`EventRecorder`] collaborator) for each
//! excluded node.

use crate::disruption::command::CommandQueue;
use crate::provisioning::EventRecorder;
use crate::state::{Cache, StateNode};
use karpenter_api::{ANNOTATION_DO_NOT_DISRUPT, NodePool};
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashMap;

/// The disruption class a candidate is being built for. Determines whether
/// `do-not-disrupt` pods and blocking PDBs exclude the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    /// No `do-not-disrupt` pod and no fully-blocking PDB may be present.
    Graceful,
    /// The pool sets `terminationGracePeriod`: such blockers are tolerated
    /// because they will eventually be force-deleted.
    Eventual,
}

/// A live (Node, NodeClaim, NodePool) tuple eligible for disruption.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub provider_id: String,
    pub node: StateNode,
    pub pool_name: String,
    pub class: Class,
}

/// Builds the ordered candidate set for `class`, consulting `pools` to
/// resolve each node's owning pool and `pdbs` (namespace/name keyed) to
/// detect blocking PodDisruptionBudgets. Every rejected node is reported
/// through `recorder` with the exact §4.4 reason string and omitted from the
/// result; rejection is never fatal to the overall build.
pub fn build_candidates(
    cache: &Cache,
    queue: &CommandQueue,
    pools: &HashMap<String, NodePool>,
    pods_by_node: &HashMap<String, Vec<Pod>>,
    blocking_pdb_namespaces: &[String],
    class: Class,
    recorder: &dyn EventRecorder,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for node in cache.deep_copy_nodes() {
        match evaluate(&node, pools, pods_by_node, blocking_pdb_namespaces, class, queue) {
            Ok(()) => candidates.push(Candidate {
                provider_id: node.provider_id.clone(),
                pool_name: node.nodepool_name().unwrap_or_default().to_string(),
                class,
                node,
            }),
            Err(reason) => recorder.record_rejection(&node.provider_id, &reason),
        }
    }
    candidates
}

/// Builds the unconditional candidate set Repair uses: managed, initialized,
/// not already queued, but skipping every graceful/eventual class filter.
pub fn build_unconditional_candidates(cache: &Cache, queue: &CommandQueue) -> Vec<Candidate> {
    cache
        .deep_copy_nodes()
        .into_iter()
        .filter(|n| n.is_managed() && n.is_initialized() && !n.is_deleting())
        .filter(|n| !queue.is_queued(&n.provider_id))
        .map(|node| Candidate {
            provider_id: node.provider_id.clone(),
            pool_name: node.nodepool_name().unwrap_or_default().to_string(),
            class: Class::Eventual,
            node,
        })
        .collect()
}

fn evaluate(
    node: &StateNode,
    pools: &HashMap<String, NodePool>,
    pods_by_node: &HashMap<String, Vec<Pod>>,
    blocking_pdb_namespaces: &[String],
    class: Class,
    queue: &CommandQueue,
) -> Result<(), String> {
    if node.nominated {
        return Err("node is nominated for a pending pod".to_string());
    }
    if node.is_deleting() {
        return Err("node is deleting or marked for deletion".to_string());
    }
    if queue.is_queued(&node.provider_id) {
        return Err("candidate is already being disrupted".to_string());
    }
    let Some(pool_name) = node.nodepool_name() else {
        return Err("node doesn't have required label (label=karpenter.sh/nodepool)".to_string());
    };
    if node.node_claim.is_none() {
        return Err("nodeclaim does not have an associated node".to_string());
    }
    if !node.is_managed() {
        return Err("node isn't managed by karpenter".to_string());
    }
    let Some(pool) = pools.get(pool_name) else {
        return Err("nodepool not found".to_string());
    };
    if !node.is_initialized() {
        return Err("node isn't initialized".to_string());
    }
    let node_has_do_not_disrupt = node
        .node
        .as_ref()
        .and_then(|n| n.metadata.annotations.as_ref())
        .is_some_and(|a| a.contains_key(ANNOTATION_DO_NOT_DISRUPT));
    if node_has_do_not_disrupt {
        return Err("disruption is blocked through the \"do-not-disrupt\" annotation".to_string());
    }

    let is_eventual = class == Class::Eventual && pool.spec.template.spec.termination_grace_period.is_some();
    let pods = pods_by_node.get(&node.provider_id).cloned().unwrap_or_default();
    for pod in &pods {
        if is_mirror_or_terminal(pod) {
            continue;
        }
        let do_not_disrupt = pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(ANNOTATION_DO_NOT_DISRUPT));
        if do_not_disrupt && !is_eventual {
            return Err(format!(
                "pod has \"do-not-disrupt\" annotation (Pod={}/{})",
                pod.metadata.namespace.as_deref().unwrap_or(""),
                pod.metadata.name.as_deref().unwrap_or("")
            ));
        }
    }

    if !is_eventual {
        let blocking: Vec<&String> = blocking_pdb_namespaces
            .iter()
            .filter(|ns| pods.iter().any(|p| p.metadata.namespace.as_deref() == Some(ns.as_str())))
            .collect();
        if blocking.len() > 1 {
            return Err("eviction does not support multiple PDBs".to_string());
        }
        if !blocking.is_empty() {
            return Err(format!(
                "pdb prevents pod evictions (PodDisruptionBudget=[{}])",
                blocking.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(",")
            ));
        }
    }

    Ok(())
}

fn is_mirror_or_terminal(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return true;
    }
    if pod
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key("kubernetes.io/config.mirror"))
    {
        return true;
    }
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}
