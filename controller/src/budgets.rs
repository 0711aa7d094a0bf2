//! NodePool budget evaluator (§4.3): a pure function of a pool's declared
//! budgets, the clock, the pool's total node count, and a disruption reason,
//! returning how many nodes are currently allowed to be disrupted for that
//! reason.

use crate::clock::SharedClock;
use crate::util::Error;
use karpenter_api::{Budget, DisruptionReason, NodePool};
use std::str::FromStr;

/// Sentinel returned when no budget constrains the reason: effectively unbounded.
pub const UNBOUNDED: i32 = i32::MAX;

/// Computes the number of nodes of `pool` currently allowed to be disrupted
/// for `reason`, given `total_nodes` currently in the pool.
///
/// Errors only on a malformed `nodes` string or cron schedule; per §7 the
/// caller should treat a parse error as "disallow everything" rather than
/// fail the whole reconcile.
pub fn get_allowed_disruptions(
    pool: &NodePool,
    clock: &SharedClock,
    total_nodes: i32,
    reason: DisruptionReason,
) -> Result<i32, Error> {
    let now = clock.now();
    let mut reason_agnostic: Option<i32> = None;
    let mut reason_specific: Option<i32> = None;

    for budget in &pool.spec.disruption.budgets {
        if !is_active(budget, now)? {
            continue;
        }
        let applies_to_reason = budget.reasons.is_empty() || budget.reasons.contains(&reason);
        if !applies_to_reason {
            continue;
        }
        let allowance = allowance_for(&budget.nodes, total_nodes)?;
        if budget.reasons.is_empty() {
            reason_agnostic = Some(reason_agnostic.map_or(allowance, |a| a.min(allowance)));
        } else {
            reason_specific = Some(reason_specific.map_or(allowance, |a| a.min(allowance)));
        }
    }

    // A reason-agnostic active budget takes precedence over reason-specific ones.
    Ok(reason_agnostic.or(reason_specific).unwrap_or(UNBOUNDED))
}

/// Parses the `nodes` field (an integer count or a `NN%` percentage) against
/// `total_nodes`, rounding percentages up.
fn allowance_for(nodes: &str, total_nodes: i32) -> Result<i32, Error> {
    if let Some(pct) = nodes.strip_suffix('%') {
        let pct: f64 = pct
            .parse()
            .map_err(|_| Error::Schedule(format!("invalid budget percentage {nodes:?}")))?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(Error::Schedule(format!(
                "budget percentage {nodes:?} out of range 0-100"
            )));
        }
        let allowed = ((pct / 100.0) * f64::from(total_nodes)).ceil();
        return Ok(allowed as i32);
    }
    nodes
        .parse::<i32>()
        .map_err(|_| Error::Schedule(format!("invalid budget node count {nodes:?}")))
}

/// A budget with no `schedule`/`duration` is always active. Otherwise it is
/// active when `now` (in UTC) falls within `[schedule fire time, fire time +
/// duration)` for the most recent past fire of the cron schedule.
fn is_active(budget: &Budget, now: chrono::DateTime<chrono::Utc>) -> Result<bool, Error> {
    let (Some(schedule), Some(duration)) = (&budget.schedule, &budget.duration) else {
        return Ok(budget.schedule.is_none() && budget.duration.is_none());
    };
    let schedule = cron::Schedule::from_str(schedule)
        .map_err(|e| Error::Schedule(format!("invalid cron schedule {schedule:?}: {e}")))?;
    let duration = parse_duration::parse(duration)?;
    let duration =
        chrono::Duration::from_std(duration).map_err(|e| Error::Schedule(e.to_string()))?;

    // Find the most recent scheduled fire at or before `now` by walking
    // backward from a lookback window; a 5-field cron schedule with no fire
    // in the last year is treated as never active.
    let lookback_start = now - chrono::Duration::days(366);
    let mut last_fire = None;
    for fire in schedule.after(&lookback_start) {
        if fire > now {
            break;
        }
        last_fire = Some(fire);
    }
    let Some(last_fire) = last_fire else {
        return Ok(false);
    };
    Ok(now < last_fire + duration)
}

/// Sanity check that a parsed schedule round-trips through UTC regardless of
/// the input clock's offset; used by tests that construct non-UTC instants.
pub fn to_utc(dt: chrono::DateTime<chrono::FixedOffset>) -> chrono::DateTime<chrono::Utc> {
    dt.with_timezone(&chrono::Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn pool_with_budgets(budgets: Vec<Budget>) -> NodePool {
        let mut pool = NodePool::new("test-pool", Default::default());
        pool.spec.disruption.budgets = budgets;
        pool
    }

    fn budget(nodes: &str, reasons: Vec<DisruptionReason>) -> Budget {
        Budget {
            nodes: nodes.to_string(),
            schedule: None,
            duration: None,
            reasons,
        }
    }

    #[test]
    fn always_active_budget_applies_to_every_reason() {
        let pool = pool_with_budgets(vec![budget("0", vec![])]);
        let clock: SharedClock = Arc::new(FakeClock::new(chrono::Utc.timestamp_opt(0, 0).unwrap()));
        let allowed =
            get_allowed_disruptions(&pool, &clock, 10, DisruptionReason::Drifted).unwrap();
        assert_eq!(allowed, 0);
    }

    #[test]
    fn no_budgets_means_unbounded() {
        let pool = pool_with_budgets(vec![]);
        let clock: SharedClock = Arc::new(FakeClock::new(chrono::Utc.timestamp_opt(0, 0).unwrap()));
        let allowed =
            get_allowed_disruptions(&pool, &clock, 10, DisruptionReason::Empty).unwrap();
        assert_eq!(allowed, UNBOUNDED);
    }

    #[test]
    fn percentage_budget_rounds_up() {
        let pool = pool_with_budgets(vec![budget("50%", vec![])]);
        let clock: SharedClock = Arc::new(FakeClock::new(chrono::Utc.timestamp_opt(0, 0).unwrap()));
        let allowed =
            get_allowed_disruptions(&pool, &clock, 5, DisruptionReason::Underutilized).unwrap();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn reason_agnostic_budget_takes_precedence_over_reason_specific() {
        let pool = pool_with_budgets(vec![
            budget("10", vec![DisruptionReason::Drifted]),
            budget("2", vec![]),
        ]);
        let clock: SharedClock = Arc::new(FakeClock::new(chrono::Utc.timestamp_opt(0, 0).unwrap()));
        let allowed =
            get_allowed_disruptions(&pool, &clock, 10, DisruptionReason::Drifted).unwrap();
        assert_eq!(allowed, 2);
    }

    #[test]
    fn reason_specific_budget_does_not_apply_to_other_reasons() {
        let pool = pool_with_budgets(vec![budget("0", vec![DisruptionReason::Drifted])]);
        let clock: SharedClock = Arc::new(FakeClock::new(chrono::Utc.timestamp_opt(0, 0).unwrap()));
        let allowed =
            get_allowed_disruptions(&pool, &clock, 10, DisruptionReason::Empty).unwrap();
        assert_eq!(allowed, UNBOUNDED);
    }

    #[test]
    fn invalid_nodes_string_is_an_error() {
        let pool = pool_with_budgets(vec![budget("not-a-number", vec![])]);
        let clock: SharedClock = Arc::new(FakeClock::new(chrono::Utc.timestamp_opt(0, 0).unwrap()));
        assert!(get_allowed_disruptions(&pool, &clock, 10, DisruptionReason::Empty).is_err());
    }

    #[test]
    fn scheduled_budget_is_inactive_outside_its_window() {
        let pool = pool_with_budgets(vec![Budget {
            nodes: "0".to_string(),
            schedule: Some("0 0 1 1 *".to_string()),
            duration: Some("1h".to_string()),
            reasons: vec![],
        }]);
        let clock: SharedClock = Arc::new(FakeClock::new(
            chrono::Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap(),
        ));
        let allowed =
            get_allowed_disruptions(&pool, &clock, 10, DisruptionReason::Empty).unwrap();
        assert_eq!(allowed, UNBOUNDED);
    }
}
