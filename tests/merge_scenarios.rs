//! End-to-end merge behavior over an in-memory store: bootstrap, plugin
//! contributions, soft-delete and resurrection lifecycles, and the
//! all-or-nothing rejection of invalid runs.

use tdm::TdmError;
use tdm::merge::MergeEngine;
use tdm::model::{ModelState, PropertyValue};
use tdm::provider::{DEFAULT_MODEL_KEY, MapModelProvider};
use tdm::rules::StaticRuleResolver;
use tdm::store::ModelStore;
use tdm::validation::ValidationMessages;

const DEFAULT_MODEL: &str = r#"
[[characteristics]]
key = "PORTABILITY"
name = "Portability"

[[characteristics]]
key = "MAINTAINABILITY"
name = "Maintainability"

[[characteristics]]
key = "READABILITY"
name = "Readability"
parent = "MAINTAINABILITY"
"#;

const JAVA_IMPORT: &str = r#"
[[requirements]]
characteristic = "READABILITY"
repository = "checkstyle"
rule = "import"

[requirements.properties]
remediation_function = "linear"
remediation_factor = { value = 0.5, unit = "h" }
"#;

fn provider_with(contributions: &[(&str, &str)]) -> MapModelProvider {
    let mut provider = MapModelProvider::new().with(DEFAULT_MODEL_KEY, DEFAULT_MODEL);
    for (plugin, doc) in contributions {
        provider.insert(plugin, doc);
    }
    provider
}

fn checkstyle_resolver() -> StaticRuleResolver {
    StaticRuleResolver::new()
        .with(1, "checkstyle", "import")
        .with(2, "checkstyle", "export")
}

fn merge(
    store: &mut ModelStore,
    provider: &MapModelProvider,
    resolver: &StaticRuleResolver,
) -> (tdm::Result<ModelState>, ValidationMessages) {
    let mut messages = ValidationMessages::new();
    let result = MergeEngine::new(provider, resolver).run(store, &mut messages);
    (result, messages)
}

#[test]
fn first_run_without_contributions_creates_only_the_default_model() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[]);
    let (result, messages) = merge(&mut store, &provider, &checkstyle_resolver());

    let state = result.unwrap();
    assert_eq!(state.characteristics.len(), 3);
    assert!(state.characteristics.values().all(|c| c.enabled));
    assert!(state.requirements.is_empty());
    assert!(messages.errors().is_empty());
    assert!(messages.warnings().is_empty());

    assert_eq!(
        state.characteristics["READABILITY"].parent_key.as_deref(),
        Some("MAINTAINABILITY")
    );
    assert!(
        state
            .edges
            .contains_key(&("MAINTAINABILITY".to_string(), "READABILITY".to_string()))
    );
}

#[test]
fn plugin_requirement_with_resolvable_rule_is_created_enabled() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[("java", JAVA_IMPORT)]);
    let (result, messages) = merge(&mut store, &provider, &checkstyle_resolver());

    let state = result.unwrap();
    assert_eq!(state.requirements.len(), 1);
    let requirement = state.requirements.values().next().unwrap();
    assert!(requirement.enabled);
    assert_eq!(requirement.characteristic_key, "READABILITY");
    assert_eq!(requirement.rule.id, 1);
    assert_eq!(
        requirement.properties.get("remediation_factor"),
        Some(&PropertyValue::Measure {
            value: 0.5,
            unit: Some("h".into())
        })
    );
    assert!(messages.warnings().is_empty());
}

#[test]
fn unresolvable_rule_is_skipped_with_warning_but_run_commits() {
    let doc = r#"
[[requirements]]
characteristic = "READABILITY"
repository = "checkstyle"
rule = "import"

[[requirements]]
characteristic = "READABILITY"
repository = "checkstyle"
rule = "ConstantNameCheck"
"#;
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[("java", doc)]);
    let (result, messages) = merge(&mut store, &provider, &checkstyle_resolver());

    let state = result.unwrap();
    assert_eq!(state.requirements.len(), 1);
    assert_eq!(messages.warnings().len(), 1);
    assert_eq!(
        messages.warnings()[0],
        "Rule not found: [repository=checkstyle, key=ConstantNameCheck]"
    );
    // The commit still happened.
    assert!(store.load().unwrap().is_bootstrapped());
}

#[test]
fn unknown_characteristic_aborts_the_whole_run() {
    let mut store = ModelStore::open_in_memory().unwrap();

    // Establish a valid persisted state first.
    let provider = provider_with(&[("java", JAVA_IMPORT)]);
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());
    let before = result.unwrap();

    // One bad declaration poisons the run, valid ones included.
    let bad = r#"
[[requirements]]
characteristic = "UNKNOWN_KEY"
repository = "checkstyle"
rule = "export"

[[requirements]]
characteristic = "PORTABILITY"
repository = "checkstyle"
rule = "export"
"#;
    let provider = provider_with(&[("java", bad)]);
    let (result, messages) = merge(&mut store, &provider, &checkstyle_resolver());

    assert!(matches!(result, Err(TdmError::ValidationFailed(_))));
    assert!(messages.has_errors());
    assert!(messages.errors()[0].contains("java"));
    assert!(messages.errors()[0].contains("UNKNOWN_KEY"));

    // Persisted state is exactly what it was before the rejected run: the
    // valid PORTABILITY requirement was not committed either.
    assert_eq!(store.load().unwrap(), before);
}

#[test]
fn dropped_declaration_is_disabled_then_resurrected_with_new_properties() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let resolver = checkstyle_resolver();

    // Run 1: requirement created.
    let provider = provider_with(&[("java", JAVA_IMPORT)]);
    let (result, _) = merge(&mut store, &provider, &resolver);
    let key = result
        .unwrap()
        .requirements
        .keys()
        .next()
        .cloned()
        .unwrap();

    // Run 2: java no longer declares it.
    let provider = provider_with(&[("java", "")]);
    let (result, _) = merge(&mut store, &provider, &resolver);
    let state = result.unwrap();
    assert_eq!(state.requirements.len(), 1);
    assert!(!state.requirements[&key].enabled);

    // Run 3: re-declared with different properties; same record revives.
    let redeclared = r#"
[[requirements]]
characteristic = "READABILITY"
repository = "checkstyle"
rule = "import"
properties = { remediation_function = "constant" }
"#;
    let provider = provider_with(&[("java", redeclared)]);
    let (result, messages) = merge(&mut store, &provider, &resolver);
    let state = result.unwrap();

    assert_eq!(state.requirements.len(), 1, "no duplicate record");
    let requirement = &state.requirements[&key];
    assert!(requirement.enabled);
    assert_eq!(
        requirement.properties.get("remediation_function"),
        Some(&PropertyValue::Text("constant".into()))
    );
    assert!(!requirement.properties.contains_key("remediation_factor"));
    assert!(messages.warnings().is_empty());
}

#[test]
fn requirement_on_removed_rule_is_disabled_and_revives_when_rule_returns() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[("java", JAVA_IMPORT)]);

    // Run 1: rule resolves.
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());
    let key = result
        .unwrap()
        .requirements
        .keys()
        .next()
        .cloned()
        .unwrap();

    // Run 2: rule removed from the registry.
    let (result, messages) = merge(&mut store, &provider, &StaticRuleResolver::new());
    let state = result.unwrap();
    assert!(!state.requirements[&key].enabled);
    assert_eq!(
        messages.warnings(),
        ["Rule not found: [repository=checkstyle, key=import]"]
    );

    // Run 3: rule is back (under a new id); the same record revives.
    let resolver = StaticRuleResolver::new().with(42, "checkstyle", "import");
    let (result, messages) = merge(&mut store, &provider, &resolver);
    let state = result.unwrap();
    assert_eq!(state.requirements.len(), 1);
    assert!(state.requirements[&key].enabled);
    assert_eq!(state.requirements[&key].rule.id, 42);
    assert!(messages.warnings().is_empty());
}

#[test]
fn contribution_cannot_rename_default_characteristics() {
    let doc = r#"
[[characteristics]]
key = "READABILITY"
name = "Plugin renamed this"

[[requirements]]
characteristic = "READABILITY"
repository = "checkstyle"
rule = "import"
"#;
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[("java", doc)]);
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());

    let state = result.unwrap();
    assert_eq!(state.characteristics["READABILITY"].name, "Readability");
    assert_eq!(state.requirements.len(), 1);
}

#[test]
fn requirement_on_disabled_characteristic_resurrects_it() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[]);
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());
    let mut state = result.unwrap();

    // Administratively soft-delete the READABILITY subtree.
    state.characteristics.get_mut("READABILITY").unwrap().enabled = false;
    state
        .characteristics
        .get_mut("MAINTAINABILITY")
        .unwrap()
        .enabled = false;
    store.save(&state).unwrap();

    let provider = provider_with(&[("java", JAVA_IMPORT)]);
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());
    let state = result.unwrap();

    assert!(state.characteristics["READABILITY"].enabled);
    assert!(state.characteristics["MAINTAINABILITY"].enabled);
    assert_eq!(state.requirements.len(), 1);
}

#[test]
fn rerun_over_unchanged_input_is_a_no_op() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[("java", JAVA_IMPORT)]);
    let resolver = checkstyle_resolver();

    let (first, first_messages) = merge(&mut store, &provider, &resolver);
    let first = first.unwrap();

    let (second, second_messages) = merge(&mut store, &provider, &resolver);
    let second = second.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.load().unwrap(), first);
    // Warnings are run-scoped diagnostics, re-emitted identically per run.
    assert_eq!(first_messages.warnings(), second_messages.warnings());
}

#[test]
fn default_model_is_not_reimported_once_bootstrapped() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = provider_with(&[]);
    merge(&mut store, &provider, &checkstyle_resolver())
        .0
        .unwrap();

    // A changed default model has no effect on an existing store.
    let changed = r#"
[[characteristics]]
key = "PORTABILITY"
name = "Renamed Portability"

[[characteristics]]
key = "BRAND_NEW"
name = "Brand new"
"#;
    let provider = MapModelProvider::new().with(DEFAULT_MODEL_KEY, changed);
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());
    let state = result.unwrap();

    assert_eq!(state.characteristics["PORTABILITY"].name, "Portability");
    assert!(!state.characteristics.contains_key("BRAND_NEW"));
    assert_eq!(state.characteristics.len(), 3);
}

#[test]
fn malformed_default_model_fails_bootstrap_and_persists_nothing() {
    let mut store = ModelStore::open_in_memory().unwrap();
    let provider = MapModelProvider::new().with(DEFAULT_MODEL_KEY, "[[characteristics");
    let (result, _) = merge(&mut store, &provider, &checkstyle_resolver());

    assert!(matches!(result, Err(TdmError::MalformedModel { .. })));
    assert!(!store.load().unwrap().is_bootstrapped());
}
