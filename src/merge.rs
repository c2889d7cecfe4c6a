//! The model merge engine.
//!
//! Reconciles the persisted model with the default structural model and
//! every plugin contribution, in five phases:
//!
//! 1. bootstrap the default model, first run only;
//! 2. validate every contribution against the full (enabled and disabled)
//!    characteristic set, collecting all fatal errors before deciding;
//! 3. resolve candidate rules, downgrading unresolvable ones to warnings;
//! 4. apply the accepted candidates: create, resurrect, or re-declare
//!    requirements, then soft-delete enabled requirements nobody declared;
//! 5. commit the whole new state in one transaction.
//!
//! Any fatal error anywhere rejects the entire run and persists nothing, so
//! one plugin's mistake can never partially apply another plugin's valid
//! contribution. Contributions are processed in lexicographic plugin-key
//! order, which makes re-runs over unchanged input idempotent and makes the
//! winner of duplicate declarations reproducible (last accepted wins).

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::{Result, TdmError};
use crate::import::{self, CandidateRequirement};
use crate::model::{ModelState, Requirement, RequirementKey, RuleIdentity};
use crate::provider::{DEFAULT_MODEL_KEY, ModelProvider};
use crate::rules::RuleResolver;
use crate::store::ModelStore;
use crate::validation::ValidationMessages;

/// One-shot merge of the default model plus all contributions into the
/// persisted model.
pub struct MergeEngine<'a, P: ModelProvider + ?Sized, R: RuleResolver + ?Sized> {
    provider: &'a P,
    resolver: &'a R,
}

impl<'a, P: ModelProvider + ?Sized, R: RuleResolver + ?Sized> MergeEngine<'a, P, R> {
    pub fn new(provider: &'a P, resolver: &'a R) -> Self {
        Self { provider, resolver }
    }

    /// Run the full merge and commit the result.
    ///
    /// On success returns the newly persisted state; warnings accumulate in
    /// `messages`. On a rejected run (any fatal error) nothing is persisted,
    /// `messages.errors()` holds every problem found, and the returned error
    /// summarizes the rejection.
    pub fn run(
        &self,
        store: &mut ModelStore,
        messages: &mut ValidationMessages,
    ) -> Result<ModelState> {
        let state = self.prepare(store.load()?, messages)?;
        store.save(&state)?;
        info!(
            characteristics = state.characteristics.len(),
            requirements = state.requirements.len(),
            warnings = messages.warnings().len(),
            "model merge committed"
        );
        Ok(state)
    }

    /// Dry run: all validation and resolution phases, nothing persisted.
    pub fn check(&self, store: &ModelStore, messages: &mut ValidationMessages) -> Result<()> {
        self.prepare(store.load()?, messages).map(|_| ())
    }

    fn prepare(
        &self,
        mut state: ModelState,
        messages: &mut ValidationMessages,
    ) -> Result<ModelState> {
        // Phase 1: bootstrap. Once characteristics exist, the persisted tree
        // is authoritative and the default model is never consulted again.
        if !state.is_bootstrapped() {
            let raw = self.provider.read_document(DEFAULT_MODEL_KEY)?;
            let default = import::parse_default_model(DEFAULT_MODEL_KEY, &raw)?;
            state.bootstrap(default.characteristics, default.edges)?;
            info!(
                characteristics = state.characteristics.len(),
                "imported default model"
            );
        }

        // Phase 2: import and validate every contribution, collecting all
        // fatal errors rather than failing on the first.
        let mut plugins = self.provider.contributing_plugins()?;
        plugins.sort();
        plugins.dedup();

        let mut candidates: Vec<CandidateRequirement> = Vec::new();
        for plugin in &plugins {
            let raw = match self.provider.read_document(plugin) {
                Ok(raw) => raw,
                Err(err) => {
                    messages.add_error(err.to_string());
                    continue;
                }
            };
            let contribution = match import::parse_contribution(plugin, &raw) {
                Ok(contribution) => contribution,
                Err(err) => {
                    messages.add_error(err.to_string());
                    continue;
                }
            };

            for key in &contribution.restated_characteristics {
                if state.characteristic(key).is_none() {
                    messages.add_error(
                        TdmError::UnknownCharacteristic {
                            contribution: plugin.clone(),
                            key: key.clone(),
                        }
                        .to_string(),
                    );
                }
            }
            for candidate in contribution.requirements {
                if state.characteristic(&candidate.characteristic_key).is_none() {
                    messages.add_error(
                        TdmError::UnknownCharacteristic {
                            contribution: plugin.clone(),
                            key: candidate.characteristic_key.clone(),
                        }
                        .to_string(),
                    );
                } else {
                    candidates.push(candidate);
                }
            }
        }

        if messages.has_errors() {
            return Err(TdmError::ValidationFailed(format!(
                "{} error(s) across {} contribution(s); nothing was persisted",
                messages.errors().len(),
                plugins.len()
            )));
        }

        // Phase 3: rule resolution. Unresolvable rules are warnings; the
        // candidate is dropped and neither creates nor revives anything.
        let mut accepted: Vec<(CandidateRequirement, RuleIdentity)> = Vec::new();
        for candidate in candidates {
            match self
                .resolver
                .resolve(&candidate.rule.repository, &candidate.rule.key)
            {
                Some(identity) => accepted.push((candidate, identity)),
                None => messages.add_warning(format!("Rule not found: {}", candidate.rule)),
            }
        }

        // Phase 4: apply the accepted set.
        let mut declared: BTreeSet<RequirementKey> = BTreeSet::new();
        for (candidate, identity) in accepted {
            let key = RequirementKey {
                characteristic_key: candidate.characteristic_key.clone(),
                rule: candidate.rule.clone(),
            };
            // A requirement accepted against a soft-deleted characteristic
            // revives the characteristic and its ancestors.
            if state
                .enabled_characteristic(&candidate.characteristic_key)
                .is_none()
            {
                debug!(
                    key = %candidate.characteristic_key,
                    "resurrecting soft-deleted characteristic"
                );
                state.enable_characteristic_path(&candidate.characteristic_key);
            }

            match state.requirements.get_mut(&key) {
                Some(existing) => {
                    // Re-declaration: properties replaced wholesale, the
                    // record itself (and its identity) survives.
                    existing.enabled = true;
                    existing.rule = identity;
                    existing.properties = candidate.properties;
                }
                None => {
                    state.requirements.insert(
                        key.clone(),
                        Requirement {
                            characteristic_key: candidate.characteristic_key,
                            rule: identity,
                            properties: candidate.properties,
                            enabled: true,
                        },
                    );
                }
            }
            declared.insert(key);
        }

        // Soft-delete every enabled requirement no contribution re-declared
        // this run: covers removed rules and dropped declarations alike.
        // Characteristics and edges are never disabled here.
        for (key, requirement) in &mut state.requirements {
            if requirement.enabled && !declared.contains(key) {
                debug!(
                    characteristic = %key.characteristic_key,
                    rule = %key.rule,
                    "disabling requirement no longer declared"
                );
                requirement.enabled = false;
            }
        }

        Ok(state)
    }
}
