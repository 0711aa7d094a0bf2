//! Empty method (§4.5): candidates carrying zero non-daemonset pods, deleted
//! outright — no scheduling simulation needed since nothing has to move.

use super::{Proposal, order_by_age_descending, select_within_budget};
use crate::clock::SharedClock;
use crate::disruption::Class;
use crate::disruption::candidate::Candidate;
use crate::disruption::DisruptionMethod;
use crate::disruption::command::Command;
use karpenter_api::{DisruptionReason, NodePool};
use std::collections::HashMap;

pub struct Empty;

impl DisruptionMethod for Empty {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        candidate
            .node
            .node_claim
            .as_ref()
            .is_some_and(|nc| nc.is_empty())
    }

    fn reason(&self) -> DisruptionReason {
        DisruptionReason::Empty
    }

    fn class(&self) -> Class {
        Class::Graceful
    }

    fn consolidation_type(&self) -> &'static str {
        "empty"
    }
}

/// Builds a delete-only command out of up to the budget's worth of empty
/// candidates. No replacement is ever requested: an empty node has nothing
/// left to reschedule.
pub fn compute_command(
    candidates: &[Candidate],
    pools: &HashMap<String, NodePool>,
    pool_node_counts: &HashMap<String, i32>,
    disrupting_counts: &HashMap<String, i32>,
    clock: &SharedClock,
) -> Option<Proposal> {
    let method = Empty;
    let mut eligible: Vec<Candidate> = candidates
        .iter()
        .filter(|c| method.should_disrupt(c))
        .cloned()
        .collect();
    if eligible.is_empty() {
        return None;
    }
    order_by_age_descending(&mut eligible, clock);

    let selected = select_within_budget(
        eligible,
        pools,
        pool_node_counts,
        disrupting_counts,
        clock,
        DisruptionReason::Empty,
    );
    if selected.is_empty() {
        return None;
    }

    let command = Command::new("empty", "Empty", selected, clock).with_replacement(false);
    Some(Proposal {
        command,
        decision: "delete",
    })
}
