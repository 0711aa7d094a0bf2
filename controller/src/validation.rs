//! Runtime validation (§6/§7): reproduces, as ordinary Rust checks, the
//! rules a CEL admission webhook would otherwise enforce on `NodePool`
//! and `NodeClaim` specs. CRD/webhook wiring itself is out of scope; the
//! core still runs these checks before acting on a spec and surfaces a
//! failure as `ValidationSucceeded=False` on the resource's status.

use crate::util::Error;
use karpenter_api::{NodePoolSpec, NodePoolTemplateSpec, Taint};

const MAX_REQUIREMENTS: usize = 100;
const VALID_TAINT_EFFECTS: &[&str] = &["NoSchedule", "PreferNoSchedule", "NoExecute"];

fn validate_duration_or_never(field: &str, value: &str) -> Result<(), Error> {
    if value == "Never" {
        return Ok(());
    }
    parse_duration::parse(value)
        .map(|_| ())
        .map_err(|_| Error::Validation(format!("{field} must be a duration like \"30m\" or \"Never\", got {value:?}")))
}

fn validate_duration(field: &str, value: &str) -> Result<(), Error> {
    parse_duration::parse(value)
        .map(|_| ())
        .map_err(|_| Error::Validation(format!("{field} must be a duration like \"30m\", got {value:?}")))
}

fn validate_taint(taint: &Taint) -> Result<(), Error> {
    if taint.key.is_empty() {
        return Err(Error::Validation("taint key must not be empty".into()));
    }
    if !VALID_TAINT_EFFECTS.contains(&taint.effect.as_str()) {
        return Err(Error::Validation(format!(
            "taint effect {:?} must be one of {VALID_TAINT_EFFECTS:?}",
            taint.effect
        )));
    }
    Ok(())
}

fn validate_template_spec(spec: &NodePoolTemplateSpec) -> Result<(), Error> {
    if spec.requirements.len() > MAX_REQUIREMENTS {
        return Err(Error::Validation(format!(
            "at most {MAX_REQUIREMENTS} requirements are allowed, got {}",
            spec.requirements.len()
        )));
    }
    // Exercised for its validation side effects: a malformed operator/value
    // combination surfaces the same error a CEL rule would at admission.
    crate::requirements::Requirements::from_node_selector_requirements(&spec.requirements)?;

    for taint in spec.taints.iter().chain(spec.startup_taints.iter()) {
        validate_taint(taint)?;
    }

    if spec.node_class_ref.group.is_empty()
        || spec.node_class_ref.kind.is_empty()
        || spec.node_class_ref.name.is_empty()
    {
        return Err(Error::Validation(
            "nodeClassRef.group, .kind and .name must all be non-empty".into(),
        ));
    }

    validate_duration_or_never("template.spec.expireAfter", &spec.expire_after)?;
    if let Some(tgp) = &spec.termination_grace_period {
        validate_duration("template.spec.terminationGracePeriod", tgp)?;
    }
    Ok(())
}

fn validate_budget_nodes(nodes: &str) -> Result<(), Error> {
    if let Some(pct) = nodes.strip_suffix('%') {
        let pct: f64 = pct
            .parse()
            .map_err(|_| Error::Validation(format!("budget nodes percentage {nodes:?} is not a number")))?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(Error::Validation(format!(
                "budget nodes percentage {nodes:?} must be between 0% and 100%"
            )));
        }
        return Ok(());
    }
    let n: i64 = nodes
        .parse()
        .map_err(|_| Error::Validation(format!("budget nodes {nodes:?} must be an integer or a percentage")))?;
    if n < 0 {
        return Err(Error::Validation(format!("budget nodes {nodes:?} must be non-negative")));
    }
    Ok(())
}

/// Validates a `NodePool` spec in isolation: requirements/taints/nodeClassRef
/// shape, budget forms (§3), and the static-pool resource-limit restriction.
/// Does not check cross-version immutability; see [`validate_immutable_transition`].
pub fn validate_nodepool_spec(spec: &NodePoolSpec) -> Result<(), Error> {
    validate_template_spec(&spec.template.spec)?;

    for budget in &spec.disruption.budgets {
        validate_budget_nodes(&budget.nodes)?;
        match (&budget.schedule, &budget.duration) {
            (Some(schedule), Some(duration)) => {
                use std::str::FromStr;
                cron::Schedule::from_str(schedule)
                    .map_err(|e| Error::Validation(format!("invalid budget schedule {schedule:?}: {e}")))?;
                let parsed = parse_duration::parse(duration)?;
                if parsed < std::time::Duration::from_secs(60) {
                    return Err(Error::Validation(format!(
                        "budget duration {duration:?} must be at least 1m with no sub-minute precision"
                    )));
                }
                if parsed.as_secs() % 60 != 0 {
                    return Err(Error::Validation(format!(
                        "budget duration {duration:?} may not use sub-minute precision"
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(Error::Validation(
                    "budget schedule and duration must be set together".into(),
                ));
            }
        }
    }

    validate_duration_or_never("disruption.consolidateAfter", &spec.disruption.consolidate_after)?;

    if spec.replicas.is_some() {
        // Static pool.
        if spec.weight.is_some() {
            return Err(Error::Validation(
                "a static NodePool (replicas set) may not also set weight".into(),
            ));
        }
        for key in spec.limits.keys() {
            if key != karpenter_api::LIMIT_NODES_KEY {
                return Err(Error::Validation(format!(
                    "a static NodePool may only set the \"{}\" resource limit, found {key:?}",
                    karpenter_api::LIMIT_NODES_KEY
                )));
            }
        }
    }
    if let Some(replicas) = spec.replicas
        && replicas < 0
    {
        return Err(Error::Validation("replicas must be non-negative".into()));
    }

    Ok(())
}

/// Rejects mutations across the static/dynamic mode boundary and changes to
/// `nodeClassRef.group`/`.kind`, the two immutable-after-creation fields §3
/// and §6 call out.
pub fn validate_immutable_transition(old: &NodePoolSpec, new: &NodePoolSpec) -> Result<(), Error> {
    if old.replicas.is_some() != new.replicas.is_some() {
        return Err(Error::Validation(
            "a NodePool cannot switch between static (replicas set) and dynamic (replicas absent) after creation".into(),
        ));
    }
    if old.template.spec.node_class_ref.group != new.template.spec.node_class_ref.group
        || old.template.spec.node_class_ref.kind != new.template.spec.node_class_ref.kind
    {
        return Err(Error::Validation(
            "nodeClassRef.group and nodeClassRef.kind are immutable after creation".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use karpenter_api::{Budget, NodeClassReference, NodePool};

    fn valid_spec() -> NodePoolSpec {
        let mut spec = NodePoolSpec::default();
        spec.template.spec.node_class_ref = NodeClassReference {
            group: "karpenter.k8s.aws".to_string(),
            kind: "EC2NodeClass".to_string(),
            name: "default".to_string(),
        };
        spec
    }

    #[test]
    fn accepts_a_minimal_valid_spec() {
        assert!(validate_nodepool_spec(&valid_spec()).is_ok());
    }

    #[test]
    fn rejects_empty_node_class_ref_field() {
        let mut spec = valid_spec();
        spec.template.spec.node_class_ref.kind = String::new();
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn rejects_too_many_requirements() {
        let mut spec = valid_spec();
        for i in 0..101 {
            spec.template.spec.requirements.push(karpenter_api::NodeSelectorRequirement {
                key: format!("k{i}"),
                operator: Some(karpenter_api::Operator::Exists),
                values: vec![],
                min_values: None,
            });
        }
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn rejects_malformed_expire_after() {
        let mut spec = valid_spec();
        spec.template.spec.expire_after = "not-a-duration".to_string();
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn accepts_never_sentinel_for_expire_after() {
        let mut spec = valid_spec();
        spec.template.spec.expire_after = "Never".to_string();
        assert!(validate_nodepool_spec(&spec).is_ok());
    }

    #[test]
    fn rejects_schedule_without_duration() {
        let mut spec = valid_spec();
        spec.disruption.budgets.push(Budget {
            nodes: "1".to_string(),
            schedule: Some("@daily".to_string()),
            duration: None,
            reasons: vec![],
        });
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn rejects_sub_minute_budget_duration() {
        let mut spec = valid_spec();
        spec.disruption.budgets.push(Budget {
            nodes: "1".to_string(),
            schedule: Some("@daily".to_string()),
            duration: Some("30s".to_string()),
            reasons: vec![],
        });
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn rejects_percentage_budget_out_of_range() {
        let mut spec = valid_spec();
        spec.disruption.budgets.push(Budget {
            nodes: "150%".to_string(),
            schedule: None,
            duration: None,
            reasons: vec![],
        });
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn static_pool_rejects_weight() {
        let mut spec = valid_spec();
        spec.replicas = Some(3);
        spec.weight = Some(10);
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn static_pool_rejects_non_nodes_limit() {
        let mut spec = valid_spec();
        spec.replicas = Some(3);
        spec.limits.insert("cpu".to_string(), "100".to_string());
        assert!(validate_nodepool_spec(&spec).is_err());
    }

    #[test]
    fn static_pool_allows_nodes_limit() {
        let mut spec = valid_spec();
        spec.replicas = Some(3);
        spec.limits.insert("nodes".to_string(), "10".to_string());
        assert!(validate_nodepool_spec(&spec).is_ok());
    }

    #[test]
    fn rejects_mode_switch_from_dynamic_to_static() {
        let old = valid_spec();
        let mut new = valid_spec();
        new.replicas = Some(1);
        assert!(validate_immutable_transition(&old, &new).is_err());
    }

    #[test]
    fn rejects_node_class_ref_kind_change() {
        let old = valid_spec();
        let mut new = valid_spec();
        new.template.spec.node_class_ref.kind = "OtherNodeClass".to_string();
        assert!(validate_immutable_transition(&old, &new).is_err());
    }

    #[test]
    fn allows_unrelated_field_changes() {
        let old = valid_spec();
        let mut new = valid_spec();
        new.template.spec.expire_after = "1h".to_string();
        assert!(validate_immutable_transition(&old, &new).is_ok());
    }

    #[test]
    fn sanity_nodepool_constructor_carries_spec() {
        let pool = NodePool::new("p", valid_spec());
        assert!(validate_nodepool_spec(&pool.spec).is_ok());
    }
}
