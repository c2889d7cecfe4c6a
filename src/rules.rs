//! External rule resolution.
//!
//! The merge engine never knows where rules live; it only asks a
//! [`RuleResolver`] to turn a (repository, key) pair into a concrete
//! identity. Production wires in whatever backs the rule registry,
//! tests use [`StaticRuleResolver`] fixtures.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TdmError};
use crate::model::RuleIdentity;

/// Capability to resolve an external rule reference.
///
/// Lookups are expected to be synchronous and side-effect-free; the engine
/// may call `resolve` once per candidate requirement.
pub trait RuleResolver {
    /// Returns the resolved identity, or `None` when the rule does not
    /// exist (removed, or never installed).
    fn resolve(&self, repository: &str, key: &str) -> Option<RuleIdentity>;
}

/// In-memory resolver over a fixed rule table.
#[derive(Debug, Default, Clone)]
pub struct StaticRuleResolver {
    rules: BTreeMap<(String, String), RuleIdentity>,
}

impl StaticRuleResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: i64, repository: &str, key: &str) {
        self.rules.insert(
            (repository.to_string(), key.to_string()),
            RuleIdentity {
                id,
                repository: repository.to_string(),
                key: key.to_string(),
            },
        );
    }

    #[must_use]
    pub fn with(mut self, id: i64, repository: &str, key: &str) -> Self {
        self.add(id, repository, key);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Load a rule table from a TOML file of `[[rules]]` entries with
    /// `id`, `repository` and `key` fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            TdmError::Config(format!("read rules file {}: {err}", path.display()))
        })?;
        let table: RulesFile = toml::from_str(&raw).map_err(|err| {
            TdmError::Config(format!("parse rules file {}: {err}", path.display()))
        })?;

        let mut resolver = Self::new();
        for rule in table.rules {
            resolver.add(rule.id, &rule.repository, &rule.key);
        }
        Ok(resolver)
    }
}

impl RuleResolver for StaticRuleResolver {
    fn resolve(&self, repository: &str, key: &str) -> Option<RuleIdentity> {
        self.rules
            .get(&(repository.to_string(), key.to_string()))
            .cloned()
    }
}

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    id: i64,
    repository: String,
    key: String,
}
