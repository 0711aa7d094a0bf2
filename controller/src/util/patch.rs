use super::MANAGER_NAME;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use karpenter_api::{NodeClaim, NodeClaimStatus, NodePool, NodePoolStatus};
use kube::{
    Api, Client, Error,
    api::{Patch, PatchParams, Resource},
    core::ClusterResourceScope,
};
use serde::{Serialize, de::DeserializeOwned};
use std::{clone::Clone, fmt::Debug};

pub trait Object<S> {
    /// Returns a mutable reference to the status object, initializing
    /// it with the default value if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

impl Object<NodePoolStatus> for NodePool {
    fn mut_status(&mut self) -> &mut NodePoolStatus {
        if self.status.is_none() {
            self.status = Some(Default::default());
        }
        self.status.as_mut().unwrap()
    }
}

impl Object<NodeClaimStatus> for NodeClaim {
    fn mut_status(&mut self) -> &mut NodeClaimStatus {
        if self.status.is_none() {
            self.status = Some(Default::default());
        }
        self.status.as_mut().unwrap()
    }
}

/// Sets `condition` on `conditions`, replacing any existing entry of the same
/// `type_` only if the status actually changed, so `lastTransitionTime` is
/// preserved across no-op reconciles.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time.clone();
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

/// Patch the resource's status object with the provided function.
/// The function is passed a mutable reference to the status object,
/// which is to be mutated in-place. Move closures are supported.
pub async fn patch_status<S, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = ClusterResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        let status = modified.mut_status();
        f(status);
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let api: Api<T> = Api::all(client);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}
