//! Disruption orchestrator (§4.6): one reconcile tick. Builds the candidate
//! sets, tries each registered method in fixed priority order, and hands the
//! first non-empty proposal to the [`CommandQueue`] — methods after the first
//! hit are skipped for this tick, matching the teacher's single-decision
//! reconcile loops rather than batching unrelated decisions together.

use crate::clock::SharedClock;
use crate::disruption::candidate::{Class, build_candidates, build_unconditional_candidates};
use crate::disruption::command::CommandQueue;
use crate::disruption::methods::{consolidation, drift, empty, expiration, repair};
use crate::provisioning::{EventRecorder, Provisioner};
use crate::state::Cache;
use crate::util::Error;
use k8s_openapi::api::core::v1::Pod;
use karpenter_api::NodePool;
use std::collections::HashMap;

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

fn pool_node_counts(cache: &Cache, pools: &HashMap<String, NodePool>) -> HashMap<String, i32> {
    pools
        .keys()
        .map(|name| {
            let (running, reserved, _) = cache.get_node_count(name);
            (name.clone(), running + reserved)
        })
        .collect()
}

fn disrupting_counts(queue: &CommandQueue) -> HashMap<String, i32> {
    let mut counts: HashMap<String, i32> = HashMap::new();
    for command in queue.get_commands() {
        for candidate in &command.candidates {
            *counts.entry(candidate.pool_name.clone()).or_default() += 1;
        }
    }
    counts
}

/// One full reconcile tick of the disruption engine. Returns once a command
/// has been queued, or once every method has declined, never blocking on
/// command execution itself (that's [`CommandQueue::execute`]'s job, run by
/// the caller against its own worker).
#[allow(clippy::too_many_arguments)]
pub async fn run_once(
    cache: &Cache,
    queue: &CommandQueue,
    pools: &HashMap<String, NodePool>,
    pods_by_node: &HashMap<String, Vec<Pod>>,
    blocking_pdb_namespaces: &[String],
    prices: &HashMap<String, f64>,
    clock: &SharedClock,
    provisioner: &dyn Provisioner,
    recorder: &dyn EventRecorder,
    multi_node_consolidation_timeout: std::time::Duration,
    #[cfg(feature = "metrics")] metrics: &ControllerMetrics,
) -> Result<(), Error> {
    if !cache.has_synced() {
        return Err(Error::NotSynced);
    }

    let node_counts = pool_node_counts(cache, pools);
    let disrupting = disrupting_counts(queue);

    // Drift, Expiration and the consolidation methods are all voluntary
    // disruptions that must respect `do-not-disrupt` and PDBs, so they share
    // the graceful candidate set; only Repair (below) reaches for the
    // unconditional one.
    let graceful = build_candidates(
        cache,
        queue,
        pools,
        pods_by_node,
        blocking_pdb_namespaces,
        Class::Graceful,
        recorder,
    );

    let proposal = if let Some(p) = empty::compute_command(&graceful, pools, &node_counts, &disrupting, clock) {
        Some((p, "empty"))
    } else if let Some(p) = consolidation::compute_command_multi(
        &graceful,
        pools,
        &node_counts,
        &disrupting,
        prices,
        pods_by_node,
        clock,
        provisioner,
        multi_node_consolidation_timeout,
    )
    .await
    {
        Some((p, "multi"))
    } else if let Some(p) = consolidation::compute_command_single(
        &graceful,
        pools,
        &node_counts,
        &disrupting,
        prices,
        pods_by_node,
        clock,
        provisioner,
    )
    .await
    {
        Some((p, "single"))
    } else if let Some(p) =
        drift::compute_command(&graceful, pools, &node_counts, &disrupting, clock, provisioner).await
    {
        Some((p, "drift"))
    } else if let Some(p) =
        expiration::compute_command(&graceful, pools, &node_counts, &disrupting, clock, provisioner).await
    {
        Some((p, "expiration"))
    } else {
        let unconditional = build_unconditional_candidates(cache, queue);
        repair::compute_command(&unconditional, clock).map(|(command, decision)| {
            (
                super::methods::Proposal {
                    command,
                    decision,
                },
                "repair",
            )
        })
    };

    let Some((proposal, consolidation_type)) = proposal else {
        sync_pending_disruption(cache, pools, queue);
        return Ok(());
    };

    let reason = proposal.command.reason.clone();
    let decision = proposal.decision;
    queue.start_command(proposal.command)?;
    sync_pending_disruption(cache, pools, queue);

    #[cfg(feature = "metrics")]
    metrics
        .decisions_total
        .with_label_values(&[decision, &reason, consolidation_type])
        .inc();

    Ok(())
}

/// Keeps the cache's `pendingDisruption` counter (read by the static
/// controller, §4.8 step 3) in lockstep with the queue's own ground truth:
/// recomputed from every still-active command, so it self-heals once a
/// command finishes without needing an explicit start/clear callback.
fn sync_pending_disruption(cache: &Cache, pools: &HashMap<String, NodePool>, queue: &CommandQueue) {
    let disrupting = disrupting_counts(queue);
    for pool in pools.keys() {
        cache.set_pending_disruption(pool, disrupting.get(pool).copied().unwrap_or(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::disruption::command::Command as Cmd;
    use crate::disruption::candidate::Candidate;
    use crate::provisioning::{NoopEventRecorder, SimulationResult};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
    use karpenter_api::{NodeClaim, NodeClaimStatus, NodePoolSpec, condition_type};
    use std::sync::Arc;
    use std::time::Duration;

    struct AlwaysFeasible;

    #[async_trait]
    impl Provisioner for AlwaysFeasible {
        async fn create_node_claims(&self, _pool: &NodePool, _count: i32) -> Result<Vec<String>, Error> {
            Ok(vec![])
        }
        async fn simulate_removal(&self, _candidates: &[Candidate]) -> Result<SimulationResult, Error> {
            Ok(SimulationResult {
                feasible: true,
                replacement: None,
                resulting_price: 0.0,
            })
        }
        async fn taint_disrupted(&self, _provider_id: &str) -> Result<(), Error> {
            Ok(())
        }
        async fn untaint_disrupted(&self, _provider_id: &str) -> Result<(), Error> {
            Ok(())
        }
        fn wants_replacement(&self, _command: &Cmd) -> bool {
            false
        }
        async fn create_replacements(&self, _command: &Cmd) -> Result<Vec<String>, Error> {
            Ok(vec![])
        }
        async fn wait_for_ready(&self, _names: &[String], _timeout: Duration) -> Result<(), Error> {
            Ok(())
        }
        async fn delete_candidate(&self, _provider_id: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn not_synced_yields_error() {
        let cache = Cache::new();
        let queue = CommandQueue::new();
        let clock: SharedClock = Arc::new(FakeClock::new(Utc.timestamp_opt(0, 0).unwrap()));
        let provisioner = AlwaysFeasible;
        let recorder = NoopEventRecorder;

        let result = run_once(
            &cache,
            &queue,
            &HashMap::new(),
            &HashMap::new(),
            &[],
            &HashMap::new(),
            &clock,
            &provisioner,
            &recorder,
            std::time::Duration::from_secs(60),
            #[cfg(feature = "metrics")]
            &ControllerMetrics::new("karpenter_test_orchestrator"),
        )
        .await;
        assert!(matches!(result, Err(Error::NotSynced)));
    }

    #[tokio::test]
    async fn empty_candidate_is_queued_first() {
        let cache = Cache::new();
        let mut claim = NodeClaim::new("a", Default::default());
        claim.metadata.labels = Some(std::collections::BTreeMap::from([(
            karpenter_api::LABEL_NODEPOOL.to_string(),
            "pool-a".to_string(),
        )]));
        claim.status = Some(NodeClaimStatus {
            provider_id: Some("a".to_string()),
            conditions: vec![
                Condition {
                    type_: condition_type::INITIALIZED.to_string(),
                    status: "True".to_string(),
                    reason: "Ready".to_string(),
                    message: String::new(),
                    last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()),
                    observed_generation: None,
                },
                Condition {
                    type_: condition_type::EMPTY.to_string(),
                    status: "True".to_string(),
                    reason: "NoPods".to_string(),
                    message: String::new(),
                    last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()),
                    observed_generation: None,
                },
            ],
            ..Default::default()
        });
        cache.update_node_claim(claim);
        let mut node = k8s_openapi::api::core::v1::Node::default();
        node.metadata.labels = Some(std::collections::BTreeMap::from([(
            karpenter_api::LABEL_NODEPOOL.to_string(),
            "pool-a".to_string(),
        )]));
        node.spec = Some(k8s_openapi::api::core::v1::NodeSpec {
            provider_id: Some("a".to_string()),
            ..Default::default()
        });
        cache.update_node(node);
        cache.mark_synced();

        let queue = CommandQueue::new();
        let mut pools = HashMap::new();
        pools.insert("pool-a".to_string(), NodePool::new("pool-a", NodePoolSpec::default()));
        let clock: SharedClock = Arc::new(FakeClock::new(Utc.timestamp_opt(0, 0).unwrap()));
        let provisioner = AlwaysFeasible;
        let recorder = NoopEventRecorder;

        run_once(
            &cache,
            &queue,
            &pools,
            &HashMap::new(),
            &[],
            &HashMap::new(),
            &clock,
            &provisioner,
            &recorder,
            std::time::Duration::from_secs(60),
            #[cfg(feature = "metrics")]
            &ControllerMetrics::new("karpenter_test_orchestrator2"),
        )
        .await
        .unwrap();

        assert!(queue.is_queued("a"));
        let (_, _, pending_disruption) = cache.get_node_count("pool-a");
        assert_eq!(pending_disruption, 1);
    }
}
