//! Scheduling requirements algebra (§4.1). A [`Requirement`] is a single
//! key's accumulated constraints; a [`Requirements`] set composes one
//! `Requirement` per key and exposes `Intersects`/`Compatible` across sets,
//! consumed by candidate building, simulated scheduling, and the static
//! provisioning controller alike.

mod typo;

pub use typo::{levenshtein, nearest_well_known_label};

use karpenter_api::{LABEL_ALIASES, NodeSelectorRequirement, Operator};
use std::collections::{BTreeMap, BTreeSet};

use crate::util::Error;

/// A single operator/values/minValues entry as it was added, kept verbatim so
/// [`Requirement::node_selector_requirements`] is a lossless round-trip.
#[derive(Clone, Debug, PartialEq)]
struct Entry {
    operator: Operator,
    values: Vec<String>,
    min_values: Option<i32>,
}

/// The accumulated constraint for one label key: every [`Entry`] added under
/// that key ANDed together.
#[derive(Clone, Debug, Default, PartialEq)]
struct Constraint {
    requires_presence: bool,
    excludes_presence: bool,
    /// `None` = unconstrained; `Some(set)` = intersection of every `In` value set seen.
    allowed: Option<BTreeSet<String>>,
    /// Union of every `NotIn` value set seen.
    excluded: BTreeSet<String>,
    /// Tightest (largest) lower bound from any `Gt` entry.
    gt: Option<i64>,
    /// Tightest (smallest) upper bound from any `Lt` entry.
    lt: Option<i64>,
}

impl Constraint {
    fn fold(&mut self, entry: &Entry) {
        match entry.operator {
            Operator::Exists => self.requires_presence = true,
            Operator::DoesNotExist => self.excludes_presence = true,
            Operator::In => {
                self.requires_presence = true;
                let set: BTreeSet<String> = entry.values.iter().cloned().collect();
                self.allowed = Some(match self.allowed.take() {
                    Some(existing) => existing.intersection(&set).cloned().collect(),
                    None => set,
                });
            }
            Operator::NotIn => {
                self.excluded.extend(entry.values.iter().cloned());
            }
            Operator::Gt => {
                self.requires_presence = true;
                if let Some(v) = entry.values.first().and_then(|v| v.parse::<i64>().ok()) {
                    self.gt = Some(self.gt.map_or(v, |existing| existing.max(v)));
                }
            }
            Operator::Lt => {
                self.requires_presence = true;
                if let Some(v) = entry.values.first().and_then(|v| v.parse::<i64>().ok()) {
                    self.lt = Some(self.lt.map_or(v, |existing| existing.min(v)));
                }
            }
        }
    }

    /// True when no value could ever satisfy this constraint.
    fn is_empty(&self) -> bool {
        if self.requires_presence && self.excludes_presence {
            return true;
        }
        if let (Some(gt), Some(lt)) = (self.gt, self.lt)
            && gt + 2 > lt
        {
            return true;
        }
        if let Some(allowed) = &self.allowed {
            if allowed.is_empty() {
                return true;
            }
            let remaining: Vec<&String> = allowed.difference(&self.excluded).collect();
            if remaining.is_empty() {
                return true;
            }
            if self.gt.is_some() || self.lt.is_some() {
                let any_in_range = remaining.iter().any(|v| match v.parse::<i64>() {
                    Ok(n) => self.gt.is_none_or(|g| n > g) && self.lt.is_none_or(|l| n < l),
                    Err(_) => false,
                });
                if !any_in_range {
                    return true;
                }
            }
        }
        false
    }

    /// Intersection of two independently-accumulated constraints for the same key.
    fn intersects(&self, other: &Constraint) -> bool {
        let mut merged = self.clone();
        merged.requires_presence |= other.requires_presence;
        merged.excludes_presence |= other.excludes_presence;
        merged.excluded.extend(other.excluded.iter().cloned());
        merged.allowed = match (&merged.allowed, &other.allowed) {
            (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        merged.gt = match (merged.gt, other.gt) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
        merged.lt = match (merged.lt, other.lt) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        };
        !merged.is_empty()
    }
}

/// A single key's accumulated requirement.
#[derive(Clone, Debug, PartialEq)]
pub struct Requirement {
    key: String,
    entries: Vec<Entry>,
    min_values: Option<i32>,
}

impl Requirement {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: Vec<String>,
        min_values: Option<i32>,
    ) -> Result<Self, Error> {
        let key = normalize_key(key.into());
        validate_entry(&key, operator, &values, min_values)?;
        Ok(Self {
            key,
            entries: vec![Entry {
                operator,
                values,
                min_values,
            }],
            min_values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn min_values(&self) -> Option<i32> {
        self.min_values
    }

    fn constraint(&self) -> Constraint {
        let mut c = Constraint::default();
        for e in &self.entries {
            c.fold(e);
        }
        c
    }

    /// Intersection of the value sets `In` requirements contributed, sorted.
    pub fn values(&self) -> Vec<String> {
        self.constraint()
            .allowed
            .map(|s| s.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn intersects(&self, other: &Requirement) -> bool {
        self.constraint().intersects(&other.constraint())
    }

    /// Merge `other`'s entries into this requirement (same key assumed).
    fn merge(&mut self, other: &Requirement) {
        self.entries.extend(other.entries.iter().cloned());
        self.min_values = match (self.min_values, other.min_values) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, None) => a,
            (None, b) => b,
        };
    }

    /// Lossless round-trip back to the wire `NodeSelectorRequirement` entries.
    pub fn node_selector_requirements(&self) -> Vec<NodeSelectorRequirement> {
        self.entries
            .iter()
            .map(|e| NodeSelectorRequirement {
                key: self.key.clone(),
                operator: Some(e.operator),
                values: e.values.clone(),
                min_values: e.min_values,
            })
            .collect()
    }
}

fn normalize_key(key: String) -> String {
    for (beta, stable) in LABEL_ALIASES {
        if key == *beta {
            return (*stable).to_string();
        }
    }
    key
}

fn validate_entry(
    key: &str,
    operator: Operator,
    values: &[String],
    min_values: Option<i32>,
) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::Validation("requirement key must not be empty".into()));
    }
    match operator {
        Operator::In if values.is_empty() => {
            // Spec: empty value sets on In/NotIn are permitted but yield the empty set.
        }
        Operator::Gt | Operator::Lt => {
            if values.len() != 1 {
                return Err(Error::Validation(format!(
                    "{operator} on {key} requires exactly one value"
                )));
            }
            let v: i64 = values[0].parse().map_err(|_| {
                Error::Validation(format!("{operator} on {key} requires an integer value"))
            })?;
            if v < 0 {
                return Err(Error::Validation(format!(
                    "{operator} on {key} requires a non-negative integer value"
                )));
            }
        }
        _ => {}
    }
    if let Some(mv) = min_values {
        if !(1..=50).contains(&mv) {
            return Err(Error::Validation(format!(
                "minValues on {key} must be between 1 and 50"
            )));
        }
        if (mv as usize) > values.len() {
            return Err(Error::Validation(format!(
                "minValues on {key} must not exceed the number of listed values"
            )));
        }
    }
    Ok(())
}

/// Compatibility checking mode for [`Requirements::compatible`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompatibilityMode {
    /// Every well-known label the caller expects must be explicitly bounded
    /// on the receiver.
    Strict,
    /// Unbounded well-known labels are tolerated; unknown labels without
    /// values produce an error suggesting the nearest well-known label.
    AllowUndefined,
}

/// A set of [`Requirement`]s, at most one per key, composed via `And`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Requirements {
    by_key: BTreeMap<String, Requirement>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_node_selector_requirements(
        reqs: &[NodeSelectorRequirement],
    ) -> Result<Self, Error> {
        let mut set = Self::new();
        for r in reqs {
            let requirement = Requirement::new(
                r.key.clone(),
                r.operator.ok_or_else(|| {
                    Error::Validation(format!("requirement {} is missing an operator", r.key))
                })?,
                r.values.clone(),
                r.min_values,
            )?;
            set.add(requirement);
        }
        Ok(set)
    }

    /// Adds `requirement`, intersecting with any existing requirement for the same key.
    pub fn add(&mut self, requirement: Requirement) {
        match self.by_key.get_mut(&requirement.key) {
            Some(existing) => existing.merge(&requirement),
            None => {
                self.by_key.insert(requirement.key.clone(), requirement);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.by_key.get(key)
    }

    /// Deterministic alphabetical key list.
    pub fn keys(&self) -> Vec<&str> {
        self.by_key.keys().map(|k| k.as_str()).collect()
    }

    pub fn values(&self, key: &str) -> Vec<String> {
        self.by_key.get(key).map(|r| r.values()).unwrap_or_default()
    }

    /// `A.Intersects(B) == B.Intersects(A)`: true if both sets can be
    /// simultaneously satisfied. Keys present on only one side are
    /// unconstrained from the other's perspective.
    pub fn intersects(&self, other: &Requirements) -> bool {
        for (key, req) in &self.by_key {
            if let Some(other_req) = other.by_key.get(key)
                && !req.intersects(other_req)
            {
                return false;
            }
        }
        true
    }

    /// Checks that `self` (e.g. a candidate's offered capabilities) satisfies
    /// `wanted` (e.g. a pod's required scheduling constraints).
    ///
    /// In [`CompatibilityMode::Strict`], every well-known label in `wanted`
    /// must also be explicitly bounded in `self`. In
    /// [`CompatibilityMode::AllowUndefined`], an unbounded well-known label in
    /// `self` is tolerated, and an unknown label key with no values produces
    /// an error suggesting the nearest well-known label.
    pub fn compatible(&self, wanted: &Requirements, mode: CompatibilityMode) -> Result<(), Error> {
        for (key, wanted_req) in &wanted.by_key {
            let Some(self_req) = self.by_key.get(key) else {
                let is_well_known = karpenter_api::WELL_KNOWN_LABELS.contains(&key.as_str());
                if is_well_known {
                    if mode == CompatibilityMode::Strict {
                        return Err(Error::Validation(format!(
                            "incompatible requirements, label {key} does not have known values"
                        )));
                    }
                    continue;
                }
                if wanted_req.values().is_empty() {
                    let suggestion = nearest_well_known_label(key)
                        .map(|s| format!(", did you mean \"{s}\"?"))
                        .unwrap_or_default();
                    return Err(Error::Validation(format!(
                        "unknown label {key}{suggestion}"
                    )));
                }
                continue;
            };
            if !self_req.intersects(wanted_req) {
                return Err(Error::Validation(format!(
                    "incompatible requirements, key {key} does not intersect"
                )));
            }
        }
        Ok(())
    }

    /// Deterministic alphabetical-by-key string form.
    pub fn to_string_canonical(&self) -> String {
        self.by_key
            .iter()
            .map(|(k, r)| {
                let vals = r.values();
                if vals.is_empty() {
                    k.clone()
                } else {
                    format!("{k} In [{}]", vals.join(","))
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn node_selector_requirements(&self) -> Vec<NodeSelectorRequirement> {
        self.by_key
            .values()
            .flat_map(|r| r.node_selector_requirements())
            .collect()
    }
}
