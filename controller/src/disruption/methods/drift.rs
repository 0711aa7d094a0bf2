//! Drift method (§4.5): candidates whose `Drifted` condition is true,
//! replaced if the simulator can place their pods elsewhere, deleted if
//! their pods fit on existing capacity without any replacement.

use super::{Proposal, order_by_age_descending, select_within_budget, shrink_until_feasible};
use crate::clock::SharedClock;
use crate::disruption::Class;
use crate::disruption::candidate::Candidate;
use crate::disruption::command::Command;
use crate::disruption::DisruptionMethod;
use crate::provisioning::Provisioner;
use karpenter_api::{DisruptionReason, NodePool};
use std::collections::HashMap;

pub struct Drift;

impl DisruptionMethod for Drift {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        candidate
            .node
            .node_claim
            .as_ref()
            .is_some_and(|nc| nc.is_drifted())
    }

    fn reason(&self) -> DisruptionReason {
        DisruptionReason::Drifted
    }

    fn class(&self) -> Class {
        Class::Graceful
    }

    fn consolidation_type(&self) -> &'static str {
        "drift"
    }
}

/// Selects drifted candidates within budget (oldest first), then asks the
/// provisioner whether the batch can be removed; shrinks the batch from the
/// newest end until a feasible (or empty) batch is found.
pub async fn compute_command(
    candidates: &[Candidate],
    pools: &HashMap<String, NodePool>,
    pool_node_counts: &HashMap<String, i32>,
    disrupting_counts: &HashMap<String, i32>,
    clock: &SharedClock,
    provisioner: &dyn Provisioner,
) -> Option<Proposal> {
    let method = Drift;
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
        DisruptionReason::Drifted,
    );
    if selected.is_empty() {
        return None;
    }

    let (feasible, sim) = shrink_until_feasible(selected, provisioner).await?;
    let decision = if sim.replacement.is_some() { "replace" } else { "delete" };
    let command = Command::new("drift", "Drifted", feasible, clock)
        .with_replacement(sim.replacement.is_some());
    Some(Proposal { command, decision })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::disruption::command::Command as Cmd;
    use crate::provisioning::SimulationResult;
    use crate::state::StateNode;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
    use karpenter_api::{NodeClaim, NodeClaimStatus, NodePoolSpec, condition_type};
    use std::sync::Arc;
    use std::time::Duration;

    struct FakeProvisioner {
        feasible_at_or_below: usize,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn create_node_claims(
            &self,
            _pool: &NodePool,
            _count: i32,
        ) -> Result<Vec<String>, crate::util::Error> {
            Ok(vec![])
        }
        async fn simulate_removal(
            &self,
            candidates: &[Candidate],
        ) -> Result<SimulationResult, crate::util::Error> {
            Ok(SimulationResult {
                feasible: candidates.len() <= self.feasible_at_or_below,
                replacement: None,
                resulting_price: 0.0,
            })
        }
        async fn taint_disrupted(&self, _provider_id: &str) -> Result<(), crate::util::Error> {
            Ok(())
        }
        async fn untaint_disrupted(&self, _provider_id: &str) -> Result<(), crate::util::Error> {
            Ok(())
        }
        fn wants_replacement(&self, _command: &Cmd) -> bool {
            false
        }
        async fn create_replacements(&self, _command: &Cmd) -> Result<Vec<String>, crate::util::Error> {
            Ok(vec![])
        }
        async fn wait_for_ready(
            &self,
            _names: &[String],
            _timeout: Duration,
        ) -> Result<(), crate::util::Error> {
            Ok(())
        }
        async fn delete_candidate(&self, _provider_id: &str) -> Result<(), crate::util::Error> {
            Ok(())
        }
    }

    fn drifted_candidate(id: &str, pool: &str) -> Candidate {
        let mut claim = NodeClaim::new(id, Default::default());
        claim.status = Some(NodeClaimStatus {
            conditions: vec![Condition {
                type_: condition_type::DRIFTED.to_string(),
                status: "True".to_string(),
                reason: "Drifted".to_string(),
                message: String::new(),
                last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                    Utc::now(),
                ),
                observed_generation: None,
            }],
            ..Default::default()
        });
        let mut node = StateNode::new(id);
        node.node_claim = Some(claim);
        Candidate {
            provider_id: id.to_string(),
            node,
            pool_name: pool.to_string(),
            class: Class::Graceful,
        }
    }

    #[tokio::test]
    async fn shrinks_batch_until_feasible() {
        let candidates = vec![
            drifted_candidate("a", "pool-a"),
            drifted_candidate("b", "pool-a"),
        ];
        let mut pools = HashMap::new();
        pools.insert("pool-a".to_string(), NodePool::new("pool-a", NodePoolSpec::default()));
        let pool_node_counts = HashMap::from([("pool-a".to_string(), 2)]);
        let clock: SharedClock = Arc::new(FakeClock::new(Utc.timestamp_opt(0, 0).unwrap()));
        let provisioner = FakeProvisioner {
            feasible_at_or_below: 1,
        };

        let proposal = compute_command(
            &candidates,
            &pools,
            &pool_node_counts,
            &HashMap::new(),
            &clock,
            &provisioner,
        )
        .await
        .unwrap();
        assert_eq!(proposal.command.candidates.len(), 1);
    }

    #[tokio::test]
    async fn no_drifted_candidates_means_no_command() {
        let candidates = vec![];
        let pools = HashMap::new();
        let clock: SharedClock = Arc::new(FakeClock::new(Utc.timestamp_opt(0, 0).unwrap()));
        let provisioner = FakeProvisioner {
            feasible_at_or_below: 10,
        };
        assert!(
            compute_command(
                &candidates,
                &pools,
                &HashMap::new(),
                &HashMap::new(),
                &clock,
                &provisioner
            )
            .await
            .is_none()
        );
    }
}
