//! Consolidation methods (§4.5): single-node (one candidate removed and
//! simulated in isolation) and multi-node (binary search over an ordered
//! batch, time-boxed). Both defer the "strictly cheaper" cost comparison to
//! the [`Provisioner`] collaborator: `simulate_removal` is trusted to report
//! `feasible = true` only for a batch whose removal does not increase fleet
//! cost, since pricing is a cloud-provider concern this core never computes
//! directly (§1 Non-goals).

use super::{Proposal, select_within_budget};
use crate::clock::SharedClock;
use crate::disruption::Class;
use crate::disruption::candidate::Candidate;
use crate::disruption::command::Command;
use crate::disruption::DisruptionMethod;
use crate::disruption::eviction::pod_disruption_cost;
use crate::provisioning::{Provisioner, SimulationResult};
use k8s_openapi::api::core::v1::Pod;
use karpenter_api::{ConsolidationPolicy, DisruptionReason, NodePool};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

/// Default time budget for the multi-node binary search, per §4.6/§5,
/// overridable via `ControllerArgs::multi_node_consolidation_timeout`.
pub const MULTI_NODE_CONSOLIDATION_TIMEOUT: Duration = Duration::from_secs(60);

fn consolidatable_long_enough(candidate: &Candidate, pool: &NodePool, clock: &SharedClock) -> bool {
    if pool.spec.disruption.consolidation_policy != ConsolidationPolicy::WhenEmptyOrUnderutilized {
        return false;
    }
    let after = &pool.spec.disruption.consolidate_after;
    if after == "Never" {
        return false;
    }
    let Ok(duration) = parse_duration::parse(after) else {
        return false;
    };
    let Ok(duration) = chrono::Duration::from_std(duration) else {
        return false;
    };
    let Some(nc) = &candidate.node.node_claim else {
        return false;
    };
    let Some(status) = &nc.status else {
        return false;
    };
    let Some(condition) = status
        .conditions
        .iter()
        .find(|c| c.type_ == karpenter_api::condition_type::CONSOLIDATABLE && c.status == "True")
    else {
        return false;
    };
    clock.now() - condition.last_transition_time.0 >= duration
}

/// Total disruption cost of every pod on `candidate`'s node, the tie-break
/// for ordering candidates within a price bracket.
fn candidate_disruption_cost(candidate: &Candidate, pods_by_node: &HashMap<String, Vec<Pod>>) -> f64 {
    pods_by_node
        .get(&candidate.provider_id)
        .map(|pods| pods.iter().map(pod_disruption_cost).sum())
        .unwrap_or(0.0)
}

/// Orders by price descending (most expensive first), then by pod
/// disruption cost ascending (cheapest-to-evict first) as the tie-break.
fn order_by_price_desc_then_cost_asc(
    candidates: &mut [Candidate],
    prices: &HashMap<String, f64>,
    pods_by_node: &HashMap<String, Vec<Pod>>,
) {
    candidates.sort_by(|a, b| {
        let pa = prices.get(&a.provider_id).copied().unwrap_or(0.0);
        let pb = prices.get(&b.provider_id).copied().unwrap_or(0.0);
        pb.partial_cmp(&pa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let ca = candidate_disruption_cost(a, pods_by_node);
                let cb = candidate_disruption_cost(b, pods_by_node);
                ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
            })
    });
}

pub struct ConsolidationSingle;

impl DisruptionMethod for ConsolidationSingle {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        candidate
            .node
            .node_claim
            .as_ref()
            .is_some_and(|nc| nc.is_consolidatable())
    }

    fn reason(&self) -> DisruptionReason {
        DisruptionReason::Underutilized
    }

    fn class(&self) -> Class {
        Class::Graceful
    }

    fn consolidation_type(&self) -> &'static str {
        "single"
    }
}

pub struct ConsolidationMulti;

impl DisruptionMethod for ConsolidationMulti {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        candidate
            .node
            .node_claim
            .as_ref()
            .is_some_and(|nc| nc.is_consolidatable())
    }

    fn reason(&self) -> DisruptionReason {
        DisruptionReason::Underutilized
    }

    fn class(&self) -> Class {
        Class::Graceful
    }

    fn consolidation_type(&self) -> &'static str {
        "multi"
    }
}

fn eligible_candidates(
    candidates: &[Candidate],
    pools: &HashMap<String, NodePool>,
    clock: &SharedClock,
) -> Vec<Candidate> {
    candidates
        .iter()
        .filter(|c| {
            pools
                .get(&c.pool_name)
                .is_some_and(|pool| consolidatable_long_enough(c, pool, clock))
        })
        .cloned()
        .collect()
}

/// Tries each budget-eligible candidate in isolation (most expensive first)
/// and returns the first whose removal the simulator reports feasible.
pub async fn compute_command_single(
    candidates: &[Candidate],
    pools: &HashMap<String, NodePool>,
    pool_node_counts: &HashMap<String, i32>,
    disrupting_counts: &HashMap<String, i32>,
    prices: &HashMap<String, f64>,
    pods_by_node: &HashMap<String, Vec<Pod>>,
    clock: &SharedClock,
    provisioner: &dyn Provisioner,
) -> Option<Proposal> {
    let mut eligible = eligible_candidates(candidates, pools, clock);
    if eligible.is_empty() {
        return None;
    }
    order_by_price_desc_then_cost_asc(&mut eligible, prices, pods_by_node);

    let selected = select_within_budget(
        eligible,
        pools,
        pool_node_counts,
        disrupting_counts,
        clock,
        DisruptionReason::Underutilized,
    );

    for candidate in selected {
        if let Ok(sim) = provisioner.simulate_removal(std::slice::from_ref(&candidate)).await
            && sim.feasible
        {
            let decision = if sim.replacement.is_some() { "replace" } else { "delete" };
            let command = Command::new("consolidation", "Underutilized", vec![candidate], clock)
                .with_replacement(sim.replacement.is_some());
            return Some(Proposal { command, decision });
        }
    }
    None
}

/// Binary search over the budget-eligible batch (most expensive first),
/// time-boxed by `timeout` (defaults to [`MULTI_NODE_CONSOLIDATION_TIMEOUT`]).
/// A timeout or exhausted search yields no command, leaving the decision to
/// the next reconcile.
#[allow(clippy::too_many_arguments)]
pub async fn compute_command_multi(
    candidates: &[Candidate],
    pools: &HashMap<String, NodePool>,
    pool_node_counts: &HashMap<String, i32>,
    disrupting_counts: &HashMap<String, i32>,
    prices: &HashMap<String, f64>,
    pods_by_node: &HashMap<String, Vec<Pod>>,
    clock: &SharedClock,
    provisioner: &dyn Provisioner,
    timeout: Duration,
) -> Option<Proposal> {
    let mut eligible = eligible_candidates(candidates, pools, clock);
    if eligible.len() < 2 {
        return None;
    }
    order_by_price_desc_then_cost_asc(&mut eligible, prices, pods_by_node);

    let selected = select_within_budget(
        eligible,
        pools,
        pool_node_counts,
        disrupting_counts,
        clock,
        DisruptionReason::Underutilized,
    );
    if selected.len() < 2 {
        return None;
    }

    let search = binary_search_batch(&selected, provisioner);
    let found = tokio::time::timeout(timeout, search).await.ok().flatten();
    let (batch, sim) = found?;
    let decision = if sim.replacement.is_some() { "replace" } else { "delete" };
    let command = Command::new("consolidation", "Underutilized", batch, clock)
        .with_replacement(sim.replacement.is_some());
    Some(Proposal { command, decision })
}

fn binary_search_batch<'a>(
    candidates: &'a [Candidate],
    provisioner: &'a dyn Provisioner,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<(Vec<Candidate>, SimulationResult)>> + 'a>> {
    Box::pin(async move {
        if candidates.is_empty() {
            return None;
        }
        if let Ok(sim) = provisioner.simulate_removal(candidates).await
            && sim.feasible
        {
            return Some((candidates.to_vec(), sim));
        }
        if candidates.len() == 1 {
            return None;
        }
        let mid = candidates.len() / 2;
        let (left, right) = candidates.split_at(mid);
        if let Some(found) = binary_search_batch(left, provisioner).await {
            return Some(found);
        }
        binary_search_batch(right, provisioner).await
    })
}
