//! Collaborator interfaces consumed, not defined, by the control-plane core
//! (§6): the cloud provider, the scheduling provisioner, and the event
//! recorder the candidate builder reports rejections through. Expressed as
//! Rust traits so the core can be exercised against hand-written fakes in
//! tests, the way the teacher's storage layer is exercised against its own
//! collaborator traits.

mod static_controller;

pub use static_controller::run as run_static_provisioning;

use crate::disruption::command::Command;
use crate::util::Error;
use async_trait::async_trait;
use karpenter_api::NodePool;
use std::time::Duration;

/// A single instance-type offering's requirements, price, and availability.
#[derive(Clone, Debug)]
pub struct InstanceTypeOffering {
    pub name: String,
    pub requirements: crate::requirements::Requirements,
    pub price: f64,
    pub available: bool,
}

/// Creates, deletes, lists, and gets NodeClaims against the underlying cloud,
/// and exposes the instance-type catalog a pool can launch.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn create(&self, node_claim_name: &str) -> Result<String, Error>;
    /// `NotFound` on delete is treated as success by callers (§7).
    async fn delete(&self, provider_id: &str) -> Result<(), Error>;
    async fn get(&self, provider_id: &str) -> Result<Option<String>, Error>;
    async fn list(&self) -> Result<Vec<String>, Error>;
    async fn get_instance_types(&self, pool: &NodePool) -> Result<Vec<InstanceTypeOffering>, Error>;
}

/// Outcome of simulating the removal of a candidate set: whether every
/// displaced pod reschedules, and onto what (existing capacity, or a single
/// strictly-cheaper new NodeClaim).
#[derive(Clone, Debug)]
pub struct SimulationResult {
    pub feasible: bool,
    /// Empty when every pod reschedules onto existing capacity (a pure
    /// delete). One entry when replacement onto a single new, cheaper
    /// NodeClaim is required.
    pub replacement: Option<InstanceTypeOffering>,
    /// Total fleet price after the simulated change; used to compare
    /// candidate batches during multi-node consolidation.
    pub resulting_price: f64,
}

/// Schedules pending pods and materialises NodeClaims on their behalf;
/// honours the state cache's reservation protocol.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_node_claims(&self, pool: &NodePool, count: i32) -> Result<Vec<String>, Error>;

    /// Simulates removing `candidates` from the fleet: would their pods
    /// reschedule, and at what cost. Scheduling itself is this collaborator's
    /// concern, not the disruption engine's.
    async fn simulate_removal(
        &self,
        candidates: &[crate::disruption::candidate::Candidate],
    ) -> Result<SimulationResult, Error>;

    async fn taint_disrupted(&self, provider_id: &str) -> Result<(), Error>;
    async fn untaint_disrupted(&self, provider_id: &str) -> Result<(), Error>;
    /// Whether this command's method actually needs replacement NodeClaims
    /// (an `Empty` command never does).
    fn wants_replacement(&self, command: &Command) -> bool;
    async fn create_replacements(&self, command: &Command) -> Result<Vec<String>, Error>;
    async fn wait_for_ready(&self, replacement_names: &[String], timeout: Duration) -> Result<(), Error>;
    async fn delete_candidate(&self, provider_id: &str) -> Result<(), Error>;
}

/// Emits the structured rejection events §4.4 requires, verbatim.
pub trait EventRecorder: Send + Sync {
    fn record_rejection(&self, provider_id: &str, reason: &str);
}

/// An [`EventRecorder`] that discards events, for tests that don't assert on them.
pub struct NoopEventRecorder;

impl EventRecorder for NoopEventRecorder {
    fn record_rejection(&self, _provider_id: &str, _reason: &str) {}
}

/// A [`Provisioner`] that never schedules anything and never finds removal
/// feasible. `main.rs` wires this in by default, the same way it has no
/// concrete [`CloudProvider`] to link against (§2 Non-goals): a deployment
/// that brings its own cloud integration provides its own `Provisioner` and
/// drives the core's `run` functions directly instead of going through the
/// default binary wiring.
pub struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn create_node_claims(&self, _pool: &NodePool, _count: i32) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn simulate_removal(
        &self,
        _candidates: &[crate::disruption::candidate::Candidate],
    ) -> Result<SimulationResult, Error> {
        Ok(SimulationResult {
            feasible: false,
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
        false
    }

    async fn create_replacements(&self, _command: &Command) -> Result<Vec<String>, Error> {
        Ok(Vec::new())
    }

    async fn wait_for_ready(&self, _replacement_names: &[String], _timeout: Duration) -> Result<(), Error> {
        Ok(())
    }

    async fn delete_candidate(&self, _provider_id: &str) -> Result<(), Error> {
        Ok(())
    }
}
