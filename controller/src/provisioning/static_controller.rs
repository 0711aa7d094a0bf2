//! Static Provisioning Controller (§4.8): maintains `spec.replicas` for
//! static NodePools, reserving node-count against per-pool limits before
//! creating NodeClaims. Scale-down is left entirely to the disruption
//! engine's emptiness/consolidation methods.

use super::Provisioner;
use crate::state::Cache;
use crate::util::{DENIED_RESERVATION_REQUEUE, Error, PROBE_INTERVAL};
use karpenter_api::NodePool;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use owo_colors::OwoColorize;
use std::time::Duration;

/// Reconciles one static `pool` against `cache`, asking `provisioner` to
/// create NodeClaims for any shortfall. Returns the requeue action; never
/// panics on a malformed limit, it simply treats it as unbounded.
pub async fn run(
    cache: &Cache,
    provisioner: &dyn Provisioner,
    pool: &NodePool,
) -> Result<Action, Error> {
    let Some(replicas) = pool.spec.replicas else {
        return Ok(Action::await_change());
    };
    let root_condition_true = pool
        .status
        .as_ref()
        .map(|s| {
            s.conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    if !root_condition_true {
        return Ok(Action::await_change());
    }
    if !cache.has_synced() {
        return Err(Error::NotSynced);
    }

    let pool_name = pool.name_any();
    let (running, _reserved, pending_disruption) = cache.get_node_count(&pool_name);
    if i64::from(running + pending_disruption) >= replicas {
        return Ok(Action::requeue(Duration::from_secs(60)));
    }

    let limit = pool.nodes_limit().map(|l| l as i32).unwrap_or(i32::MAX);
    let want = (replicas - i64::from(running)).max(0) as i32;
    let granted = cache.reserve_node_count(&pool_name, limit, want);
    if granted == 0 {
        println!(
            "{}",
            format!("⏸ static pool {pool_name} denied reservation (limit={limit}); requeuing").yellow()
        );
        return Ok(Action::requeue(DENIED_RESERVATION_REQUEUE));
    }

    match provisioner.create_node_claims(pool, granted).await {
        Ok(_names) => Ok(Action::requeue(PROBE_INTERVAL.max(Duration::from_secs(60)))),
        Err(e) => {
            cache.release_node_count(&pool_name, granted);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruption::command::Command;
    use async_trait::async_trait;
    use karpenter_api::{NodePoolSpec, NodePoolStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvisioner {
        created: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn create_node_claims(&self, _pool: &NodePool, count: i32) -> Result<Vec<String>, Error> {
            if self.fail {
                return Err(Error::CommandFailed("boom".into()));
            }
            self.created.fetch_add(count as usize, Ordering::SeqCst);
            Ok((0..count).map(|i| format!("claim-{i}")).collect())
        }
        async fn simulate_removal(
            &self,
            _candidates: &[crate::disruption::candidate::Candidate],
        ) -> Result<super::SimulationResult, Error> {
            Ok(super::SimulationResult {
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
        fn wants_replacement(&self, _command: &Command) -> bool {
            true
        }
        async fn create_replacements(&self, _command: &Command) -> Result<Vec<String>, Error> {
            Ok(vec![])
        }
        async fn wait_for_ready(&self, _names: &[String], _timeout: Duration) -> Result<(), Error> {
            Ok(())
        }
        async fn delete_candidate(&self, _provider_id: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    fn ready_pool(name: &str, replicas: i64, limit: Option<&str>) -> NodePool {
        let mut pool = NodePool::new(
            name,
            NodePoolSpec {
                replicas: Some(replicas),
                limits: limit
                    .map(|l| [("nodes".to_string(), l.to_string())].into_iter().collect())
                    .unwrap_or_default(),
                ..Default::default()
            },
        );
        pool.status = Some(NodePoolStatus {
            conditions: vec![Condition {
                type_: "Ready".to_string(),
                status: "True".to_string(),
                reason: "Ready".to_string(),
                message: String::new(),
                last_transition_time: k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                    chrono::Utc::now(),
                ),
                observed_generation: None,
            }],
            ..Default::default()
        });
        pool
    }

    #[tokio::test]
    async fn caps_node_claim_count_at_limit() {
        let cache = Cache::new();
        cache.mark_synced();
        let pool = ready_pool("pool-a", 5, Some("1"));
        let provisioner = FakeProvisioner {
            created: AtomicUsize::new(0),
            fail: false,
        };
        run(&cache, &provisioner, &pool).await.unwrap();
        assert_eq!(provisioner.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn releases_reservation_on_provisioner_error() {
        let cache = Cache::new();
        cache.mark_synced();
        let pool = ready_pool("pool-a", 5, None);
        let provisioner = FakeProvisioner {
            created: AtomicUsize::new(0),
            fail: true,
        };
        assert!(run(&cache, &provisioner, &pool).await.is_err());
        let (_, reserved, _) = cache.get_node_count("pool-a");
        assert_eq!(reserved, 0);
    }

    #[tokio::test]
    async fn settles_at_replicas_once_created_claims_register_as_running() {
        // §8 scenario #4: {replicas:5, limits.nodes:10}. Without the
        // reservation-to-running conversion this would reserve another 5 on
        // every tick and settle at the limit (10) instead of `replicas` (5).
        let cache = Cache::new();
        cache.mark_synced();
        let pool = ready_pool("pool-a", 5, Some("10"));
        let provisioner = FakeProvisioner {
            created: AtomicUsize::new(0),
            fail: false,
        };

        run(&cache, &provisioner, &pool).await.unwrap();
        assert_eq!(provisioner.created.load(Ordering::SeqCst), 5);
        // Simulate the NodeClaim watcher observing the 5 newly created claims.
        for i in 0..5 {
            let mut claim = karpenter_api::NodeClaim::new(&format!("claim-{i}"), Default::default());
            claim.metadata.labels = Some(
                [(karpenter_api::LABEL_NODEPOOL.to_string(), "pool-a".to_string())]
                    .into_iter()
                    .collect(),
            );
            claim.status = Some(karpenter_api::NodeClaimStatus {
                provider_id: Some(format!("prov-{i}")),
                ..Default::default()
            });
            cache.update_node_claim(claim);
        }
        let (running, reserved, _) = cache.get_node_count("pool-a");
        assert_eq!(running, 5);
        assert_eq!(reserved, 0);

        run(&cache, &provisioner, &pool).await.unwrap();
        assert_eq!(
            provisioner.created.load(Ordering::SeqCst),
            5,
            "a second tick must not create more claims once running already satisfies replicas"
        );
    }

    #[tokio::test]
    async fn skips_when_root_condition_not_true() {
        let cache = Cache::new();
        cache.mark_synced();
        let pool = NodePool::new(
            "pool-a",
            NodePoolSpec {
                replicas: Some(3),
                ..Default::default()
            },
        );
        let provisioner = FakeProvisioner {
            created: AtomicUsize::new(0),
            fail: false,
        };
        run(&cache, &provisioner, &pool).await.unwrap();
        assert_eq!(provisioner.created.load(Ordering::SeqCst), 0);
    }
}
