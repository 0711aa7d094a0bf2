//! Repair method (§4.5, §9 Open Question resolution): candidates whose node
//! reports a terminal unhealthy condition beyond a toleration window.
//! Bypasses the graceful/eventual class gate entirely (consumes the
//! candidate builder's unconditional set), and ignores budgets, PDBs,
//! `do-not-disrupt`, and `terminationGracePeriod` — an unhealthy node is
//! replaced regardless of what is running on it.

use super::order_by_age_descending;
use crate::clock::SharedClock;
use crate::disruption::candidate::Candidate;
use crate::disruption::command::Command;
use chrono::Duration as ChronoDuration;
use k8s_openapi::api::core::v1::Node;

/// How long a `Ready=False`/`Unknown` condition must persist before the node
/// is considered unrecoverable and subject to repair.
pub const UNHEALTHY_TOLERATION: ChronoDuration = ChronoDuration::minutes(30);

fn is_unhealthy(node: &Node, clock: &SharedClock) -> bool {
    let Some(status) = node.status.as_ref() else {
        return false;
    };
    let Some(conditions) = status.conditions.as_ref() else {
        return false;
    };
    let Some(ready) = conditions.iter().find(|c| c.type_ == "Ready") else {
        return false;
    };
    if ready.status != "False" && ready.status != "Unknown" {
        return false;
    }
    let Some(transitioned) = ready.last_transition_time.as_ref() else {
        return false;
    };
    clock.now() - transitioned.0 >= UNHEALTHY_TOLERATION
}

/// `candidates` must already come from
/// [`crate::disruption::candidate::build_unconditional_candidates`]; this
/// function only adds the unhealthy-condition filter and picks the
/// longest-unhealthy candidate, ignoring every budget.
pub fn compute_command(
    candidates: &[Candidate],
    clock: &SharedClock,
) -> Option<(Command, &'static str)> {
    let mut eligible: Vec<Candidate> = candidates
        .iter()
        .filter(|c| c.node.node.as_ref().is_some_and(|n| is_unhealthy(n, clock)))
        .cloned()
        .collect();
    if eligible.is_empty() {
        return None;
    }
    order_by_age_descending(&mut eligible, clock);
    let chosen = vec![eligible.into_iter().next()?];
    let command = Command::new("repair", "Unhealthy", chosen, clock).with_replacement(true);
    Some((command, "replace"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::disruption::Class;
    use crate::state::StateNode;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};
    use std::sync::Arc;

    fn unhealthy_candidate(id: &str, last_transition: chrono::DateTime<Utc>) -> Candidate {
        let mut node = Node::default();
        node.status = Some(NodeStatus {
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: "False".to_string(),
                last_transition_time: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                    last_transition,
                )),
                ..Default::default()
            }]),
            ..Default::default()
        });
        let mut state_node = StateNode::new(id);
        state_node.node = Some(node);
        Candidate {
            provider_id: id.to_string(),
            node: state_node,
            pool_name: "pool-a".to_string(),
            class: Class::Eventual,
        }
    }

    #[test]
    fn replaces_node_unhealthy_beyond_toleration() {
        let now = Utc.timestamp_opt(100_000, 0).unwrap();
        let candidate = unhealthy_candidate("a", now - ChronoDuration::minutes(31));
        let clock: SharedClock = Arc::new(FakeClock::new(now));
        let (command, decision) = compute_command(&[candidate], &clock).unwrap();
        assert_eq!(decision, "replace");
        assert!(command.needs_replacement);
    }

    #[test]
    fn tolerates_brief_unhealthiness() {
        let now = Utc.timestamp_opt(100_000, 0).unwrap();
        let candidate = unhealthy_candidate("a", now - ChronoDuration::minutes(5));
        let clock: SharedClock = Arc::new(FakeClock::new(now));
        assert!(compute_command(&[candidate], &clock).is_none());
    }
}
