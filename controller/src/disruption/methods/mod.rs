//! Pluggable disruption strategies (§4.5), registered by [`super::orchestrator`]
//! in a fixed priority order: Empty, multi-node consolidation, single-node
//! consolidation, Drift, Expiration, Repair.

pub mod consolidation;
pub mod drift;
pub mod empty;
pub mod expiration;
pub mod repair;

use crate::budgets;
use crate::clock::SharedClock;
use crate::disruption::Candidate;
use crate::disruption::command::Command;
use crate::provisioning::{Provisioner, SimulationResult};
use karpenter_api::{DisruptionReason, NodePool};
use std::collections::HashMap;

/// Orders candidates by age descending (oldest first), the tie-break drift
/// and expiration share.
pub fn order_by_age_descending(candidates: &mut [Candidate], clock: &SharedClock) {
    let now = clock.now();
    candidates.sort_by_key(|c| {
        let created = c
            .node
            .node_claim
            .as_ref()
            .and_then(|nc| nc.metadata.creation_timestamp.clone())
            .map(|t| t.0)
            .unwrap_or(now);
        std::cmp::Reverse(now - created)
    });
}

/// A method's proposed action for a non-empty set of candidates.
pub struct Proposal {
    pub command: Command,
    pub decision: &'static str,
}

/// Selects as many of `eligible` (assumed already ordered by priority) as the
/// per-pool budget for `reason` still allows, after subtracting
/// `disrupting_counts` (nodes of that pool already tainted by a live
/// Command). A pool with no allowance or no known `NodePool` contributes
/// nothing; a malformed budget is treated per §7 as "disallow everything".
pub fn select_within_budget(
    eligible: Vec<Candidate>,
    pools: &HashMap<String, NodePool>,
    pool_node_counts: &HashMap<String, i32>,
    disrupting_counts: &HashMap<String, i32>,
    clock: &SharedClock,
    reason: DisruptionReason,
) -> Vec<Candidate> {
    let mut by_pool: HashMap<String, Vec<Candidate>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for c in eligible {
        if !by_pool.contains_key(&c.pool_name) {
            order.push(c.pool_name.clone());
        }
        by_pool.entry(c.pool_name.clone()).or_default().push(c);
    }

    let mut selected = Vec::new();
    for pool_name in order {
        let Some(pool) = pools.get(&pool_name) else {
            continue;
        };
        let mut group = by_pool.remove(&pool_name).unwrap_or_default();
        let total = pool_node_counts
            .get(&pool_name)
            .copied()
            .unwrap_or(group.len() as i32);
        let allowed = budgets::get_allowed_disruptions(pool, clock, total, reason).unwrap_or(0);
        let already_disrupting = disrupting_counts.get(&pool_name).copied().unwrap_or(0);
        let remaining = allowed.saturating_sub(already_disrupting).max(0);
        if remaining <= 0 {
            continue;
        }
        let take = (remaining as usize).min(group.len());
        selected.extend(group.drain(..take));
    }
    selected
}

/// Shrinks `candidates` from the back (least-priority end) until
/// `provisioner.simulate_removal` reports the remaining batch feasible,
/// returning the feasible batch and its simulation outcome. Used by Drift
/// and Expiration, which (unlike multi-node consolidation's binary search)
/// only need a simple linear backoff since they aren't hunting for the
/// largest cost-reducing batch, just any schedulable one.
pub async fn shrink_until_feasible(
    mut candidates: Vec<Candidate>,
    provisioner: &dyn Provisioner,
) -> Option<(Vec<Candidate>, SimulationResult)> {
    while !candidates.is_empty() {
        match provisioner.simulate_removal(&candidates).await {
            Ok(sim) if sim.feasible => return Some((candidates, sim)),
            Ok(_) => {
                candidates.pop();
            }
            Err(_) => return None,
        }
    }
    None
}
