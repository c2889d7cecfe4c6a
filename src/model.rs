//! Domain types for the persisted quality model.
//!
//! The model is a forest of [`Characteristic`] nodes connected by ordered
//! [`Edge`]s, with [`Requirement`] leaves tying characteristics to external
//! rules. Every record carries an `enabled` flag: records are soft-deleted,
//! never physically removed, so a later run can resurrect them with their
//! identity and history intact.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TdmError};

/// A named node in the quality-model tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    /// Stable, case-sensitive key, assigned by the default model.
    pub key: String,
    /// Human-readable label. Owned by the default model; contributions
    /// can never change it.
    pub name: String,
    /// Absent for root characteristics.
    pub parent_key: Option<String>,
    /// Soft-delete flag.
    pub enabled: bool,
}

/// A parent→child relation with an explicit position among siblings.
///
/// Kept separate from the characteristic records so membership and ordering
/// survive independently of the nodes they connect. Edges have no `enabled`
/// flag of their own; they are live exactly when both endpoints are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent_key: String,
    pub child_key: String,
    /// Contiguous from 0 among a parent's children, document order.
    pub ordinal: u32,
}

/// Reference to an external rule, as written in a contribution document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleRef {
    pub repository: String,
    pub key: String,
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[repository={}, key={}]", self.repository, self.key)
    }
}

/// A rule reference resolved to a concrete identity by a
/// [`crate::rules::RuleResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleIdentity {
    pub id: i64,
    pub repository: String,
    pub key: String,
}

impl RuleIdentity {
    #[must_use]
    pub fn rule_ref(&self) -> RuleRef {
        RuleRef {
            repository: self.repository.clone(),
            key: self.key.clone(),
        }
    }
}

/// One remediation-cost parameter value.
///
/// Opaque to the merge algorithm beyond wholesale replacement; either a bare
/// text value (e.g. a remediation function kind) or a scalar with an
/// optional unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Measure { value: f64, unit: Option<String> },
}

/// Requirement parameter set, keyed by parameter name.
///
/// A `BTreeMap` keeps the persisted JSON byte-stable across runs.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Identity of a requirement: the characteristic it hangs off plus the rule
/// reference it was declared with. Stable across rule-id changes, so a
/// requirement disabled when its rule vanished is found again when the rule
/// comes back.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequirementKey {
    pub characteristic_key: String,
    pub rule: RuleRef,
}

/// A leaf tying a characteristic to an external rule, carrying
/// remediation-cost parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub characteristic_key: String,
    /// Identity resolved at the time of the last accepting run.
    pub rule: RuleIdentity,
    pub properties: Properties,
    /// Soft-delete flag, independent of the owning characteristic's.
    pub enabled: bool,
}

impl Requirement {
    #[must_use]
    pub fn key(&self) -> RequirementKey {
        RequirementKey {
            characteristic_key: self.characteristic_key.clone(),
            rule: self.rule.rule_ref(),
        }
    }
}

/// In-memory snapshot of the persisted model, as loaded at the start of a
/// merge run and written back at its end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelState {
    pub characteristics: BTreeMap<String, Characteristic>,
    /// Keyed by (parent, child); at most one edge per pair.
    pub edges: BTreeMap<(String, String), Edge>,
    pub requirements: BTreeMap<RequirementKey, Requirement>,
}

impl ModelState {
    /// True when no characteristics exist yet, i.e. the default model has
    /// never been imported.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        !self.characteristics.is_empty()
    }

    /// Look up a characteristic regardless of its `enabled` flag.
    #[must_use]
    pub fn characteristic(&self, key: &str) -> Option<&Characteristic> {
        self.characteristics.get(key)
    }

    /// Look up a characteristic only if it is currently enabled.
    #[must_use]
    pub fn enabled_characteristic(&self, key: &str) -> Option<&Characteristic> {
        self.characteristics.get(key).filter(|c| c.enabled)
    }

    /// Materialize the default model: all characteristics and edges enabled,
    /// no requirements. Only valid on an empty state.
    pub fn bootstrap(
        &mut self,
        characteristics: Vec<Characteristic>,
        edges: Vec<Edge>,
    ) -> Result<()> {
        debug_assert!(!self.is_bootstrapped());
        for c in characteristics {
            self.characteristics.insert(c.key.clone(), c);
        }
        for e in edges {
            self.edges
                .insert((e.parent_key.clone(), e.child_key.clone()), e);
        }
        self.validate_tree()
    }

    /// Re-enable a characteristic and every ancestor up to its root.
    ///
    /// A requirement accepted against a soft-deleted characteristic revives
    /// the whole path, otherwise the leaf would be live under a dead subtree.
    pub fn enable_characteristic_path(&mut self, key: &str) {
        let mut current = Some(key.to_string());
        while let Some(k) = current {
            match self.characteristics.get_mut(&k) {
                Some(c) => {
                    c.enabled = true;
                    current = c.parent_key.clone();
                }
                None => break,
            }
        }
    }

    /// Child keys of a parent, live edges only, ordered by ordinal.
    #[must_use]
    pub fn children_of(&self, parent_key: &str) -> Vec<&Characteristic> {
        let mut edges: Vec<&Edge> = self
            .edges
            .values()
            .filter(|e| e.parent_key == parent_key)
            .collect();
        edges.sort_by_key(|e| e.ordinal);
        edges
            .iter()
            .filter_map(|e| self.enabled_characteristic(&e.child_key))
            .collect()
    }

    /// Enabled root characteristics in key order.
    #[must_use]
    pub fn roots(&self) -> Vec<&Characteristic> {
        self.characteristics
            .values()
            .filter(|c| c.enabled && c.parent_key.is_none())
            .collect()
    }

    /// Enabled requirements attached to a characteristic.
    #[must_use]
    pub fn requirements_of(&self, characteristic_key: &str) -> Vec<&Requirement> {
        self.requirements
            .values()
            .filter(|r| r.enabled && r.characteristic_key == characteristic_key)
            .collect()
    }

    /// Check the structural invariants: every `parent_key` references an
    /// existing characteristic, the parent relation is acyclic, and edge
    /// ordinals are unique per parent.
    pub fn validate_tree(&self) -> Result<()> {
        for c in self.characteristics.values() {
            if let Some(parent) = &c.parent_key {
                if !self.characteristics.contains_key(parent) {
                    return Err(TdmError::ValidationFailed(format!(
                        "characteristic '{}' references missing parent '{parent}'",
                        c.key
                    )));
                }
            }
        }
        for c in self.characteristics.values() {
            let mut seen = vec![c.key.as_str()];
            let mut current = c.parent_key.as_deref();
            while let Some(k) = current {
                if seen.contains(&k) {
                    return Err(TdmError::ValidationFailed(format!(
                        "characteristic parent chain contains a cycle through '{k}'"
                    )));
                }
                seen.push(k);
                current = self
                    .characteristics
                    .get(k)
                    .and_then(|p| p.parent_key.as_deref());
            }
        }
        let mut ordinals: BTreeMap<(&str, u32), &str> = BTreeMap::new();
        for e in self.edges.values() {
            if let Some(other) =
                ordinals.insert((e.parent_key.as_str(), e.ordinal), e.child_key.as_str())
            {
                return Err(TdmError::ValidationFailed(format!(
                    "edge ordinal {} under '{}' assigned to both '{}' and '{}'",
                    e.ordinal, e.parent_key, other, e.child_key
                )));
            }
        }
        Ok(())
    }
}
