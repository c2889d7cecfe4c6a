//! Model document parsing.
//!
//! Two document shapes share one TOML surface: the default model declares
//! the characteristic tree, a plugin contribution declares requirements
//! against that tree. Parsing never touches persisted state; it produces
//! candidate entities for the merge engine to reconcile.
//!
//! Default model:
//!
//! ```toml
//! [[characteristics]]
//! key = "MAINTAINABILITY"
//! name = "Maintainability"
//!
//! [[characteristics]]
//! key = "READABILITY"
//! name = "Readability"
//! parent = "MAINTAINABILITY"
//! ```
//!
//! Contribution:
//!
//! ```toml
//! [[requirements]]
//! characteristic = "READABILITY"
//! repository = "checkstyle"
//! rule = "import"
//!
//! [requirements.properties]
//! remediation_function = "linear"
//! remediation_factor = { value = 0.5, unit = "h" }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TdmError};
use crate::model::{Characteristic, Edge, ModelState, Properties, RuleRef};

/// A candidate requirement parsed from a contribution, before rule
/// resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRequirement {
    pub characteristic_key: String,
    pub rule: RuleRef,
    pub properties: Properties,
}

/// Parsed contribution: the plugin key it came from plus its declarations.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub plugin: String,
    pub requirements: Vec<CandidateRequirement>,
    /// Keys of characteristics the document re-states. Names carried on
    /// re-statements are ignored (the default model owns them), but the
    /// keys still have to exist in the structural model.
    pub restated_characteristics: Vec<String>,
}

/// Parsed default model: the structural skeleton, nothing else.
#[derive(Debug, Clone)]
pub struct DefaultModel {
    pub characteristics: Vec<Characteristic>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelDoc {
    #[serde(default)]
    characteristics: Vec<CharacteristicDecl>,
    #[serde(default)]
    requirements: Vec<RequirementDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CharacteristicDecl {
    key: String,
    name: Option<String>,
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequirementDecl {
    characteristic: String,
    repository: String,
    rule: String,
    #[serde(default)]
    properties: Properties,
}

fn malformed(contribution: &str, reason: impl Into<String>) -> TdmError {
    TdmError::MalformedModel {
        contribution: contribution.to_string(),
        reason: reason.into(),
    }
}

fn parse_doc(contribution: &str, source: &str) -> Result<ModelDoc> {
    toml::from_str(source).map_err(|err| malformed(contribution, err.to_string()))
}

/// Parse the default structural model.
///
/// Edge ordinals follow sibling order in the document, contiguous from 0
/// per parent. The default model may not declare requirements, duplicate
/// keys, or nameless characteristics.
pub fn parse_default_model(contribution: &str, source: &str) -> Result<DefaultModel> {
    let doc = parse_doc(contribution, source)?;

    if !doc.requirements.is_empty() {
        return Err(malformed(
            contribution,
            "the default model is structural and may not declare requirements",
        ));
    }
    if doc.characteristics.is_empty() {
        return Err(malformed(
            contribution,
            "the default model declares no characteristics",
        ));
    }

    let mut characteristics = Vec::with_capacity(doc.characteristics.len());
    let mut edges = Vec::new();
    let mut next_ordinal: BTreeMap<String, u32> = BTreeMap::new();
    let mut seen: Vec<&str> = Vec::new();

    for decl in &doc.characteristics {
        if seen.contains(&decl.key.as_str()) {
            return Err(malformed(
                contribution,
                format!("characteristic '{}' is declared twice", decl.key),
            ));
        }
        seen.push(&decl.key);

        let Some(name) = &decl.name else {
            return Err(malformed(
                contribution,
                format!("characteristic '{}' is missing a name", decl.key),
            ));
        };

        characteristics.push(Characteristic {
            key: decl.key.clone(),
            name: name.clone(),
            parent_key: decl.parent.clone(),
            enabled: true,
        });

        if let Some(parent) = &decl.parent {
            let ordinal = next_ordinal.entry(parent.clone()).or_insert(0);
            edges.push(Edge {
                parent_key: parent.clone(),
                child_key: decl.key.clone(),
                ordinal: *ordinal,
            });
            *ordinal += 1;
        }
    }

    // Parent existence and acyclicity are checked against the assembled set.
    let mut probe = ModelState::default();
    probe
        .bootstrap(characteristics.clone(), edges.clone())
        .map_err(|err| malformed(contribution, err.to_string()))?;

    debug!(
        characteristics = characteristics.len(),
        edges = edges.len(),
        "parsed default model"
    );
    Ok(DefaultModel {
        characteristics,
        edges,
    })
}

/// Parse a plugin contribution.
///
/// Contributions declare requirements only. Re-stating an existing
/// characteristic key is tolerated (its name is ignored), but declaring an
/// edge is a structural change and therefore malformed.
pub fn parse_contribution(plugin: &str, source: &str) -> Result<Contribution> {
    let doc = parse_doc(plugin, source)?;

    let mut restated = Vec::with_capacity(doc.characteristics.len());
    for decl in &doc.characteristics {
        if decl.parent.is_some() {
            return Err(malformed(
                plugin,
                format!(
                    "characteristic '{}' declares a parent; contributions may not define edges",
                    decl.key
                ),
            ));
        }
        if decl.name.is_some() {
            debug!(
                plugin,
                key = %decl.key,
                "ignoring characteristic name from contribution"
            );
        }
        restated.push(decl.key.clone());
    }

    let mut requirements = Vec::with_capacity(doc.requirements.len());
    for decl in doc.requirements {
        if decl.characteristic.is_empty() {
            return Err(malformed(plugin, "requirement with empty characteristic key"));
        }
        if decl.repository.is_empty() || decl.rule.is_empty() {
            return Err(malformed(
                plugin,
                format!(
                    "requirement on '{}' has an incomplete rule reference",
                    decl.characteristic
                ),
            ));
        }
        requirements.push(CandidateRequirement {
            characteristic_key: decl.characteristic,
            rule: RuleRef {
                repository: decl.repository,
                key: decl.rule,
            },
            properties: decl.properties,
        });
    }

    Ok(Contribution {
        plugin: plugin.to_string(),
        requirements,
        restated_characteristics: restated,
    })
}
