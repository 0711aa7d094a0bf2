//! Control-plane binary entrypoint (§10.3). Wires the `kube` client, a
//! `kube-leader-election` lease gating all mutating work, the bare
//! metrics/health server, the watchers that keep the cluster state cache
//! warm, and the periodic disruption/static-provisioning ticks — the same
//! acquire-or-standby shape as `storage-operator`'s `clusters::reconcile::run`,
//! generalised from one `kube::runtime::Controller` to this core's
//! single-threaded, whole-cluster reconcile tick.

mod args;
mod budgets;
mod clock;
mod disruption;
mod provisioning;
mod requirements;
mod server;
mod state;
mod util;
mod validation;

use args::ControllerArgs;
use clap::Parser;
use clock::{SharedClock, SystemClock};
use disruption::command::CommandQueue;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use karpenter_api::{NodeClaim, NodePool};
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use provisioning::{NoopEventRecorder, NoopProvisioner};
use state::Cache;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use util::Error;
use util::patch::{patch_status, set_condition};

#[cfg(feature = "metrics")]
use util::metrics::ControllerMetrics;

type SharedPools = Arc<RwLock<HashMap<String, NodePool>>>;
type SharedPods = Arc<RwLock<HashMap<String, Pod>>>;
type SharedPdbs = Arc<RwLock<HashMap<String, PodDisruptionBudget>>>;

/// Counts down the watchers that still owe us their initial list; the cache
/// is only marked synced once every one of them has reported `InitDone`.
struct SyncBarrier {
    remaining: AtomicUsize,
    cache: Arc<Cache>,
}

impl SyncBarrier {
    fn new(cache: Arc<Cache>, watcher_count: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(watcher_count),
            cache,
        })
    }

    fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.cache.mark_synced();
        }
    }
}

fn pod_key(pod: &Pod) -> Option<String> {
    Some(format!("{}/{}", pod.metadata.namespace.as_deref()?, pod.metadata.name.as_deref()?))
}

fn pods_by_node(pods: &SharedPods) -> HashMap<String, Vec<Pod>> {
    let mut grouped: HashMap<String, Vec<Pod>> = HashMap::new();
    for pod in pods.read().unwrap().values() {
        if let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) {
            grouped.entry(node_name).or_default().push(pod.clone());
        }
    }
    grouped
}

fn pdb_key(pdb: &PodDisruptionBudget) -> Option<String> {
    Some(format!("{}/{}", pdb.metadata.namespace.as_deref()?, pdb.metadata.name.as_deref()?))
}

/// Namespaces carrying at least one `PodDisruptionBudget` with
/// `status.disruptionsAllowed == 0` — the candidate builder's "fully-blocking
/// PDB" input (§4.4). A PDB still converging (`observedGeneration` behind the
/// object's own `generation`) is treated as blocking too, matching eviction's
/// own conservative fail-closed behaviour against a stale PDB status.
fn blocking_pdb_namespaces(pdbs: &SharedPdbs) -> Vec<String> {
    pdbs.read()
        .unwrap()
        .values()
        .filter(|pdb| {
            pdb.status
                .as_ref()
                .map(|s| s.disruptions_allowed <= 0 || s.observed_generation.unwrap_or(0) < pdb.metadata.generation.unwrap_or(0))
                .unwrap_or(true)
        })
        .filter_map(|pdb| pdb.metadata.namespace.clone())
        .collect()
}

/// Mirrors the `Node` watch into the cache's node-keyed entries.
async fn watch_nodes(client: Client, cache: Arc<Cache>, barrier: Arc<SyncBarrier>, shutdown: CancellationToken) {
    use futures::StreamExt;
    let api: Api<Node> = Api::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(watcher::Event::Apply(node))) => cache.update_node(node),
                Some(Ok(watcher::Event::Delete(node))) => {
                    if let Some(id) = node.spec.as_ref().and_then(|s| s.provider_id.clone()) {
                        cache.delete_node(&id);
                    }
                }
                Some(Ok(watcher::Event::InitApply(node))) => cache.update_node(node),
                Some(Ok(watcher::Event::Init)) => {}
                Some(Ok(watcher::Event::InitDone)) => barrier.arrive(),
                Some(Err(e)) => eprintln!("{}", format!("node watch error: {e}").red()),
                None => return,
            },
        }
    }
}

/// Mirrors the `NodeClaim` watch into the cache's node-keyed entries.
async fn watch_node_claims(client: Client, cache: Arc<Cache>, barrier: Arc<SyncBarrier>, shutdown: CancellationToken) {
    use futures::StreamExt;
    let api: Api<NodeClaim> = Api::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(watcher::Event::Apply(claim))) => cache.update_node_claim(claim),
                Some(Ok(watcher::Event::Delete(claim))) => {
                    if let Some(id) = claim.provider_id() {
                        cache.delete_node_claim(id);
                    }
                }
                Some(Ok(watcher::Event::InitApply(claim))) => cache.update_node_claim(claim),
                Some(Ok(watcher::Event::Init)) => {}
                Some(Ok(watcher::Event::InitDone)) => barrier.arrive(),
                Some(Err(e)) => eprintln!("{}", format!("nodeclaim watch error: {e}").red()),
                None => return,
            },
        }
    }
}

/// Mirrors the `DaemonSet` watch, consumed by eviction drain ordering.
async fn watch_daemon_sets(client: Client, cache: Arc<Cache>, barrier: Arc<SyncBarrier>, shutdown: CancellationToken) {
    use futures::StreamExt;
    let api: Api<DaemonSet> = Api::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(watcher::Event::Apply(ds))) | Some(Ok(watcher::Event::InitApply(ds))) => cache.update_daemon_set(ds),
                Some(Ok(watcher::Event::Delete(ds))) => {
                    if let (Some(ns), Some(name)) = (ds.metadata.namespace.as_deref(), ds.metadata.name.as_deref()) {
                        cache.delete_daemon_set(ns, name);
                    }
                }
                Some(Ok(watcher::Event::Init)) => {}
                Some(Ok(watcher::Event::InitDone)) => barrier.arrive(),
                Some(Err(e)) => eprintln!("{}", format!("daemonset watch error: {e}").red()),
                None => return,
            },
        }
    }
}

/// Mirrors every `PodDisruptionBudget` into a namespace/name-keyed index;
/// `blocking_pdb_namespaces` derives the fully-blocking set the candidate
/// builder consults from this on demand.
async fn watch_pdbs(client: Client, pdbs: SharedPdbs, barrier: Arc<SyncBarrier>, shutdown: CancellationToken) {
    use futures::StreamExt;
    let api: Api<PodDisruptionBudget> = Api::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(watcher::Event::Apply(pdb))) | Some(Ok(watcher::Event::InitApply(pdb))) => {
                    if let Some(key) = pdb_key(&pdb) {
                        pdbs.write().unwrap().insert(key, pdb);
                    }
                }
                Some(Ok(watcher::Event::Delete(pdb))) => {
                    if let Some(key) = pdb_key(&pdb) {
                        pdbs.write().unwrap().remove(&key);
                    }
                }
                Some(Ok(watcher::Event::Init)) => {}
                Some(Ok(watcher::Event::InitDone)) => barrier.arrive(),
                Some(Err(e)) => eprintln!("{}", format!("pdb watch error: {e}").red()),
                None => return,
            },
        }
    }
}

/// Runs the §6/§7 runtime validation a CEL admission webhook would otherwise
/// enforce, surfacing the result as `ValidationSucceeded` on the pool's
/// status and short-circuiting it out of the in-memory index on failure so
/// neither the disruption engine nor the static controller ever act on a
/// malformed spec.
///
/// With no concrete `CloudProvider` to resolve `nodeClassRef` against (§2
/// Non-goals), validation is also the only signal this core has for the
/// pool's root `Ready` condition the static controller gates on (§4.8) — a
/// real deployment's NodeClass reconciler would additionally flip `Ready`
/// false on an unresolved class reference.
async fn reconcile_pool(client: &Client, pools: &SharedPools, pool: NodePool) {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
    use kube::ResourceExt;

    let validation = validation::validate_nodepool_spec(&pool.spec);
    let (status, reason, message) = match &validation {
        Ok(()) => ("True", "ValidationSucceeded".to_string(), String::new()),
        Err(e) => ("False", "ValidationFailed".to_string(), e.to_string()),
    };
    let patched = patch_status::<karpenter_api::NodePoolStatus, _>(client.clone(), &pool, |s| {
        let now = Time(chrono::Utc::now());
        set_condition(
            &mut s.conditions,
            Condition {
                type_: "ValidationSucceeded".to_string(),
                status: status.to_string(),
                reason: reason.clone(),
                message: message.clone(),
                last_transition_time: now.clone(),
                observed_generation: pool.metadata.generation,
            },
        );
        set_condition(
            &mut s.conditions,
            Condition {
                type_: "Ready".to_string(),
                status: status.to_string(),
                reason,
                message,
                last_transition_time: now,
                observed_generation: pool.metadata.generation,
            },
        );
    })
    .await;

    if let Err(e) = patched {
        eprintln!("{}", format!("failed to patch nodepool {} validation status: {e}", pool.name_any()).red());
    }

    let mut guard = pools.write().unwrap();
    if validation.is_ok() {
        guard.insert(pool.name_any(), pool);
    } else {
        guard.remove(&pool.name_any());
    }
}

/// Mirrors every `NodePool` into an in-memory name-keyed index the
/// orchestrator and static controller read from each tick, after running it
/// through [`reconcile_pool`]'s validation gate.
async fn watch_node_pools(client: Client, pools: SharedPools, barrier: Arc<SyncBarrier>, shutdown: CancellationToken) {
    use futures::StreamExt;
    use kube::ResourceExt;
    let api: Api<NodePool> = Api::all(client.clone());
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(watcher::Event::Apply(pool))) | Some(Ok(watcher::Event::InitApply(pool))) => {
                    reconcile_pool(&client, &pools, pool).await;
                }
                Some(Ok(watcher::Event::Delete(pool))) => {
                    pools.write().unwrap().remove(&pool.name_any());
                }
                Some(Ok(watcher::Event::Init)) => {}
                Some(Ok(watcher::Event::InitDone)) => barrier.arrive(),
                Some(Err(e)) => eprintln!("{}", format!("nodepool watch error: {e}").red()),
                None => return,
            },
        }
    }
}

/// Mirrors every `Pod` into a flat key-value index; `pods_by_node` derives
/// the per-node grouping `run_once` wants from this on demand.
async fn watch_pods(client: Client, pods: SharedPods, barrier: Arc<SyncBarrier>, shutdown: CancellationToken) {
    use futures::StreamExt;
    let api: Api<Pod> = Api::all(client);
    let mut stream = std::pin::pin!(watcher(api, watcher::Config::default()).default_backoff());
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            next = stream.next() => match next {
                Some(Ok(watcher::Event::Apply(pod))) | Some(Ok(watcher::Event::InitApply(pod))) => {
                    if let Some(key) = pod_key(&pod) {
                        pods.write().unwrap().insert(key, pod);
                    }
                }
                Some(Ok(watcher::Event::Delete(pod))) => {
                    if let Some(key) = pod_key(&pod) {
                        pods.write().unwrap().remove(&key);
                    }
                }
                Some(Ok(watcher::Event::Init)) => {}
                Some(Ok(watcher::Event::InitDone)) => barrier.arrive(),
                Some(Err(e)) => eprintln!("{}", format!("pod watch error: {e}").red()),
                None => return,
            },
        }
    }
}

/// One full tick of leader-only work: a disruption decision, static
/// provisioning for every static pool, and draining whatever commands the
/// queue is still carrying from an earlier tick.
#[allow(clippy::too_many_arguments)]
async fn run_tick(
    cache: &Cache,
    queue: &CommandQueue,
    pools: &SharedPools,
    pods: &SharedPods,
    pdbs: &SharedPdbs,
    clock: &SharedClock,
    args: &ControllerArgs,
    #[cfg(feature = "metrics")] metrics: &ControllerMetrics,
) {
    let pools_snapshot = pools.read().unwrap().clone();
    let pods_by_node_snapshot = pods_by_node(pods);
    let blocking_pdbs = blocking_pdb_namespaces(pdbs);
    let provisioner = NoopProvisioner;
    let recorder = NoopEventRecorder;

    if let Err(e) = disruption::run_once(
        cache,
        queue,
        &pools_snapshot,
        &pods_by_node_snapshot,
        &blocking_pdbs,
        &HashMap::new(),
        clock,
        &provisioner,
        &recorder,
        Duration::from_secs(args.multi_node_consolidation_timeout),
        #[cfg(feature = "metrics")]
        metrics,
    )
    .await
    {
        eprintln!("{}", format!("disruption tick failed: {e}").red());
    }

    for pool in pools_snapshot.values().filter(|p| p.spec.replicas.is_some()) {
        if let Err(e) = provisioning::run_static_provisioning(cache, &provisioner, pool).await {
            eprintln!("{}", format!("static provisioning failed for {}: {e}", pool.metadata.name.as_deref().unwrap_or("?")).red());
        }
    }

    for command in queue.get_commands() {
        if command.state == disruption::CommandState::Pending {
            if let Err(e) = queue.execute(command, &provisioner).await {
                eprintln!("{}", format!("command execution failed: {e}").red());
                #[cfg(feature = "metrics")]
                metrics.command_failures_total.with_label_values(&["execute"]).inc();
            }
        }
    }
}

/// Runs the controller against an already-acquired lease until aborted by
/// the caller on leadership loss or shutdown, mirroring `storage-operator`'s
/// pattern of aborting the inner task rather than tearing down the process.
async fn run_leader(cache: Arc<Cache>, pools: SharedPools, pods: SharedPods, pdbs: SharedPdbs, args: Arc<ControllerArgs>, #[cfg(feature = "metrics")] metrics: Arc<ControllerMetrics>) {
    println!("{}", "👑 acquired leadership; starting reconcile loop".green());
    let queue = CommandQueue::new().with_replacement_ready_timeout(Duration::from_secs(args.replacement_ready_timeout));
    let clock: SharedClock = Arc::new(SystemClock);

    let mut tick = tokio::time::interval(Duration::from_secs(args.probe_interval));
    loop {
        tick.tick().await;
        run_tick(
            &cache,
            &queue,
            &pools,
            &pods,
            &pdbs,
            &clock,
            &args,
            #[cfg(feature = "metrics")]
            &metrics,
        )
        .await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    karpenter_common::init();
    let args = Arc::new(ControllerArgs::parse());

    let client = Client::try_default().await?;

    #[cfg(feature = "metrics")]
    let metrics = Arc::new(ControllerMetrics::new("karpenter"));
    let cache = Arc::new(Cache::new());
    let pools: SharedPools = Arc::new(RwLock::new(HashMap::new()));
    let pods: SharedPods = Arc::new(RwLock::new(HashMap::new()));
    let pdbs: SharedPdbs = Arc::new(RwLock::new(HashMap::new()));

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        karpenter_common::shutdown::shutdown_signal().await;
        shutdown_for_signal.cancel();
    });

    let barrier = SyncBarrier::new(cache.clone(), 6);
    let watcher_tasks = vec![
        tokio::spawn(watch_nodes(client.clone(), cache.clone(), barrier.clone(), shutdown.clone())),
        tokio::spawn(watch_node_claims(client.clone(), cache.clone(), barrier.clone(), shutdown.clone())),
        tokio::spawn(watch_daemon_sets(client.clone(), cache.clone(), barrier.clone(), shutdown.clone())),
        tokio::spawn(watch_node_pools(client.clone(), pools.clone(), barrier.clone(), shutdown.clone())),
        tokio::spawn(watch_pods(client.clone(), pods.clone(), barrier.clone(), shutdown.clone())),
        tokio::spawn(watch_pdbs(client.clone(), pdbs.clone(), barrier.clone(), shutdown.clone())),
    ];

    #[cfg(feature = "metrics")]
    let server_task = tokio::spawn(server::run(args.metrics_port, metrics.clone(), cache.clone(), shutdown.clone()));

    karpenter_common::signal_ready();
    println!("{}", "🌱 starting karpenter-controller".green());

    let lease_namespace = args.namespace.clone();
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("karpenter-controller-{}", uuid::Uuid::new_v4()));
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: "karpenter-controller-lock".to_string(),
            lease_ttl: Duration::from_secs(15),
        },
    );
    let renew_every = Duration::from_secs(5);

    let mut leader_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut renew_tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = leader_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break;
            }
            _ = renew_tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(e) => {
                eprintln!("{}", format!("leader election renew/acquire failed: {e}").red());
                if let Some(task) = leader_task.take() {
                    task.abort();
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if leader_task.is_none() {
                leader_task = Some(tokio::spawn(run_leader(
                    cache.clone(),
                    pools.clone(),
                    pods.clone(),
                    pdbs.clone(),
                    args.clone(),
                    #[cfg(feature = "metrics")]
                    metrics.clone(),
                )));
            }
        } else if let Some(task) = leader_task.take() {
            println!("{}", "lost leadership; stopping reconcile loop".yellow());
            task.abort();
        }
    }

    for task in watcher_tasks {
        task.abort();
    }
    #[cfg(feature = "metrics")]
    server_task.abort();
    Ok(())
}
