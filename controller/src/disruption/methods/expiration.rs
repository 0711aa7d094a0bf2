//! Expiration method (§4.5): candidates whose age has reached the pool's
//! `expireAfter`, replaced or deleted by the same feasibility logic as Drift.

use super::{Proposal, order_by_age_descending, select_within_budget, shrink_until_feasible};
use crate::clock::SharedClock;
use crate::disruption::Class;
use crate::disruption::candidate::Candidate;
use crate::disruption::command::Command;
use crate::disruption::DisruptionMethod;
use crate::provisioning::Provisioner;
use karpenter_api::{DisruptionReason, NodePool};
use std::collections::HashMap;

pub struct Expiration;

impl DisruptionMethod for Expiration {
    fn should_disrupt(&self, _candidate: &Candidate) -> bool {
        // Age is relative to a NodePool's `expireAfter`, so eligibility is
        // computed per-candidate in `is_expired` instead, which needs the
        // owning pool and the clock `should_disrupt` doesn't have access to.
        false
    }

    fn reason(&self) -> DisruptionReason {
        DisruptionReason::Drifted // expiration has no dedicated Budget reason in §3; closest kin is age-based drift
    }

    fn class(&self) -> Class {
        Class::Graceful
    }

    fn consolidation_type(&self) -> &'static str {
        "expiration"
    }
}

/// A candidate is expired once its NodeClaim's age reaches the owning pool's
/// `expireAfter`. The sentinel `"Never"` means the pool never expires nodes.
fn is_expired(candidate: &Candidate, pool: &NodePool, clock: &SharedClock) -> bool {
    let expire_after = &pool.spec.template.spec.expire_after;
    if expire_after == "Never" {
        return false;
    }
    let Ok(threshold) = parse_duration::parse(expire_after) else {
        return false;
    };
    let Some(created) = candidate
        .node
        .node_claim
        .as_ref()
        .and_then(|nc| nc.metadata.creation_timestamp.clone())
    else {
        return false;
    };
    let age = clock.now() - created.0;
    let Ok(threshold) = chrono::Duration::from_std(threshold) else {
        return false;
    };
    age >= threshold
}

pub async fn compute_command(
    candidates: &[Candidate],
    pools: &HashMap<String, NodePool>,
    pool_node_counts: &HashMap<String, i32>,
    disrupting_counts: &HashMap<String, i32>,
    clock: &SharedClock,
    provisioner: &dyn Provisioner,
) -> Option<Proposal> {
    let mut eligible: Vec<Candidate> = candidates
        .iter()
        .filter(|c| pools.get(&c.pool_name).is_some_and(|p| is_expired(c, p, clock)))
        .cloned()
        .collect();
    if eligible.is_empty() {
        return None;
    }
    order_by_age_descending(&mut eligible, clock);

    // Expiration has no dedicated budget reason in §3's enum; it is gated
    // through the same `Drifted` reason-agnostic budgets a pool declares,
    // matching the teacher's convention of reusing the nearest existing
    // reason rather than inventing a parallel one that nothing else reads.
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
    let command = Command::new("expiration", "Expired", feasible, clock)
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
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use karpenter_api::{NodeClaim, NodePoolSpec};
    use std::sync::Arc;
    use std::time::Duration;

    struct AlwaysFeasible;

    #[async_trait]
    impl Provisioner for AlwaysFeasible {
        async fn create_node_claims(
            &self,
            _pool: &NodePool,
            _count: i32,
        ) -> Result<Vec<String>, crate::util::Error> {
            Ok(vec![])
        }
        async fn simulate_removal(
            &self,
            _candidates: &[Candidate],
        ) -> Result<SimulationResult, crate::util::Error> {
            Ok(SimulationResult {
                feasible: true,
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

    fn aged_candidate(id: &str, pool: &str, created: chrono::DateTime<Utc>) -> Candidate {
        let mut claim = NodeClaim::new(id, Default::default());
        claim.metadata.creation_timestamp = Some(Time(created));
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
    async fn expires_nodes_older_than_expire_after() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        let old = aged_candidate("old", "pool-a", now - chrono::Duration::hours(800));
        let young = aged_candidate("young", "pool-a", now - chrono::Duration::hours(1));
        let mut pool_spec = NodePoolSpec::default();
        pool_spec.template.spec.expire_after = "720h".to_string();
        let mut pools = HashMap::new();
        pools.insert("pool-a".to_string(), NodePool::new("pool-a", pool_spec));
        let pool_node_counts = HashMap::from([("pool-a".to_string(), 2)]);
        let clock: SharedClock = Arc::new(FakeClock::new(now));
        let provisioner = AlwaysFeasible;

        let proposal = compute_command(
            &[old, young],
            &pools,
            &pool_node_counts,
            &HashMap::new(),
            &clock,
            &provisioner,
        )
        .await
        .unwrap();
        assert_eq!(proposal.command.candidates.len(), 1);
        assert_eq!(proposal.command.candidates[0].provider_id, "old");
    }

    #[tokio::test]
    async fn never_expire_after_disables_expiration() {
        let now = Utc.timestamp_opt(10_000, 0).unwrap();
        let old = aged_candidate("old", "pool-a", now - chrono::Duration::hours(10_000));
        let mut pool_spec = NodePoolSpec::default();
        pool_spec.template.spec.expire_after = "Never".to_string();
        let mut pools = HashMap::new();
        pools.insert("pool-a".to_string(), NodePool::new("pool-a", pool_spec));
        let clock: SharedClock = Arc::new(FakeClock::new(now));
        let provisioner = AlwaysFeasible;

        assert!(
            compute_command(
                &[old],
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
