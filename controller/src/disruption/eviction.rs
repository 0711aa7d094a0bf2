//! Drain ordering and pod disruption cost (§4.5 tie-breaks, §4.7 step 4).

use k8s_openapi::api::core::v1::Pod;

const POD_DELETION_COST_ANNOTATION: &str = "controller.kubernetes.io/pod-deletion-cost";
/// Priority class value at or above which a pod is considered critical, matching
/// `system-cluster-critical`'s well-known value.
const CRITICAL_PRIORITY_THRESHOLD: i32 = 2_000_000_000;

fn is_daemonset_pod(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.kind == "DaemonSet"))
}

fn is_critical(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.priority)
        .is_some_and(|p| p >= CRITICAL_PRIORITY_THRESHOLD)
}

/// Drain group ordering: each group fully drains before the next begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DrainGroup {
    NonCriticalNonDaemonSet,
    NonCriticalDaemonSet,
    CriticalNonDaemonSet,
    CriticalDaemonSet,
}

pub fn drain_group(pod: &Pod) -> DrainGroup {
    match (is_critical(pod), is_daemonset_pod(pod)) {
        (false, false) => DrainGroup::NonCriticalNonDaemonSet,
        (false, true) => DrainGroup::NonCriticalDaemonSet,
        (true, false) => DrainGroup::CriticalNonDaemonSet,
        (true, true) => DrainGroup::CriticalDaemonSet,
    }
}

/// Partitions `pods` into ordered drain groups, each to be fully evicted
/// before the next group is attempted.
pub fn drain_order(pods: &[Pod]) -> Vec<Vec<Pod>> {
    let mut groups: [Vec<Pod>; 4] = Default::default();
    for pod in pods {
        let idx = match drain_group(pod) {
            DrainGroup::NonCriticalNonDaemonSet => 0,
            DrainGroup::NonCriticalDaemonSet => 1,
            DrainGroup::CriticalNonDaemonSet => 2,
            DrainGroup::CriticalDaemonSet => 3,
        };
        groups[idx].push(pod.clone());
    }
    groups.into_iter().filter(|g| !g.is_empty()).collect()
}

/// Base cost 1.0, scaled by priority sign and the `pod-deletion-cost`
/// annotation; higher cost means less preferred to evict.
pub fn pod_disruption_cost(pod: &Pod) -> f64 {
    let mut cost = 1.0;
    if let Some(priority) = pod.spec.as_ref().and_then(|s| s.priority)
        && priority < 0
    {
        cost *= 0.1;
    }
    if let Some(annotated) = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(POD_DELETION_COST_ANNOTATION))
        .and_then(|v| v.parse::<f64>().ok())
    {
        cost += annotated / 1000.0;
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn pod_with(priority: Option<i32>, daemonset: bool) -> Pod {
        let mut pod = Pod {
            spec: Some(PodSpec {
                priority,
                ..Default::default()
            }),
            ..Default::default()
        };
        if daemonset {
            pod.metadata.owner_references = Some(vec![OwnerReference {
                kind: "DaemonSet".to_string(),
                name: "ds".to_string(),
                api_version: "apps/v1".to_string(),
                uid: String::new(),
                ..Default::default()
            }]);
        }
        pod
    }

    #[test]
    fn drain_order_respects_critical_and_daemonset_precedence() {
        let pods = vec![
            pod_with(Some(CRITICAL_PRIORITY_THRESHOLD), true),
            pod_with(None, false),
            pod_with(Some(CRITICAL_PRIORITY_THRESHOLD), false),
            pod_with(None, true),
        ];
        let groups = drain_order(&pods);
        assert_eq!(groups.len(), 4);
        assert_eq!(drain_group(&groups[0][0]), DrainGroup::NonCriticalNonDaemonSet);
        assert_eq!(drain_group(&groups[1][0]), DrainGroup::NonCriticalDaemonSet);
        assert_eq!(drain_group(&groups[2][0]), DrainGroup::CriticalNonDaemonSet);
        assert_eq!(drain_group(&groups[3][0]), DrainGroup::CriticalDaemonSet);
    }

    #[test]
    fn negative_priority_pods_are_cheaper_to_evict() {
        let low = pod_with(Some(-1), false);
        let normal = pod_with(Some(0), false);
        assert!(pod_disruption_cost(&low) < pod_disruption_cost(&normal));
    }
}
