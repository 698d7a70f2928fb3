//! Integration tests for Settings config loading with layered merge semantics.
//!
//! Merge Semantics:
//! - Defaults → Global: REPLACE (global defines the real baseline)
//! - Global → Local: UNION with negation support (local adds workspace-specific actions)
//! - Any → Env vars: REPLACE (explicit user override)
//!
//! These tests pass explicit file locations to `Settings::load_from`, so the
//! user's real global config never leaks in.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use orgtree::application::ApplicationError;
use orgtree::config::{PolicyConfig, Settings};
use orgtree::domain::ActionKind;

struct Files {
    dir: TempDir,
}

impl Files {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

// ============================================================
// local union merge
// ============================================================

#[test]
fn given_local_config_with_actions_when_load_then_unions_with_defaults() {
    // Arrange: defaults are ["view"]
    let files = Files::new();
    let local = files.write(
        ".orgtree.toml",
        r#"
[policy]
default_module_actions = ["export", "create"]
"#,
    );

    // Act
    let settings = Settings::load_from(None, Some(&local)).expect("load settings");

    // Assert
    assert_eq!(
        settings.policy.default_module_actions,
        vec!["create".to_string(), "export".to_string(), "view".to_string()]
    );
}

#[test]
fn given_local_config_with_negation_when_load_then_removes_inherited_action() {
    let files = Files::new();
    let global = files.write(
        "global.toml",
        r#"
[policy]
default_module_actions = ["view", "edit"]
"#,
    );
    let local = files.write(
        ".orgtree.toml",
        r#"
[policy]
default_module_actions = ["!edit", "approve"]
"#,
    );

    let settings = Settings::load_from(Some(&global), Some(&local)).expect("load settings");

    assert_eq!(
        settings.policy.actions().unwrap(),
        BTreeSet::from([ActionKind::View, ActionKind::Approve])
    );
}

// ============================================================
// global replace
// ============================================================

#[test]
fn given_global_config_with_actions_when_load_then_replaces_defaults() {
    let files = Files::new();
    let global = files.write(
        "global.toml",
        r#"
[policy]
default_module_actions = ["edit"]
org_unit_locked_levels = 1
"#,
    );

    let settings = Settings::load_from(Some(&global), None).expect("load settings");

    assert_eq!(settings.policy.default_module_actions, vec!["edit".to_string()]);
    assert_eq!(settings.policy.org_unit_locked_levels, 1);
    assert_eq!(settings.policy.module_locked_levels, 0);
}

#[test]
fn given_global_and_local_scalars_when_load_then_local_wins() {
    let files = Files::new();
    let global = files.write(
        "global.toml",
        r#"
data_file = "/srv/global/tree.json"

[layout]
node_width = 120.0
rank_separation = 50.0
"#,
    );
    let local = files.write(
        ".orgtree.toml",
        r#"
data_file = "/srv/local/tree.json"

[layout]
node_width = 90.0
"#,
    );

    let settings = Settings::load_from(Some(&global), Some(&local)).expect("load settings");

    assert_eq!(settings.data_file, PathBuf::from("/srv/local/tree.json"));
    assert_eq!(settings.layout.node_width, 90.0);
    assert_eq!(settings.layout.rank_separation, 50.0);
    assert_eq!(settings.layout.node_height, 60.0);
}

// ============================================================
// missing files and validation
// ============================================================

#[test]
fn given_no_config_files_when_load_then_defaults() {
    let files = Files::new();
    let missing = files.dir.path().join("absent.toml");

    let settings = Settings::load_from(Some(&missing), Some(&missing)).expect("load settings");

    assert_eq!(settings.policy, PolicyConfig::default());
    assert_eq!(settings.layout.node_width, 160.0);
}

#[test]
fn given_explicit_missing_local_file_when_load_then_config_error() {
    let files = Files::new();
    let missing = files.dir.path().join("absent.toml");

    let err = Settings::load(Some(&missing)).unwrap_err();

    assert!(matches!(err, ApplicationError::Config { .. }));
}

#[test]
fn given_negative_layout_value_when_load_then_config_error() {
    let files = Files::new();
    let local = files.write(
        ".orgtree.toml",
        r#"
[layout]
sibling_separation = -5.0
"#,
    );

    let err = Settings::load_from(None, Some(&local)).unwrap_err();

    assert!(
        matches!(&err, ApplicationError::Config { message } if message.contains("sibling_separation")),
        "unexpected error: {}",
        err
    );
}

#[test]
fn given_unknown_action_when_load_then_config_error() {
    let files = Files::new();
    let local = files.write(
        ".orgtree.toml",
        r#"
[policy]
default_module_actions = ["launch"]
"#,
    );

    let err = Settings::load_from(None, Some(&local)).unwrap_err();

    assert!(matches!(err, ApplicationError::Config { .. }));
}

#[test]
fn given_all_actions_negated_when_load_then_config_error() {
    let files = Files::new();
    let local = files.write(
        ".orgtree.toml",
        r#"
[policy]
default_module_actions = ["!view"]
"#,
    );

    let err = Settings::load_from(None, Some(&local)).unwrap_err();

    assert!(matches!(err, ApplicationError::Config { .. }));
}

#[test]
fn given_malformed_toml_when_load_then_config_error() {
    let files = Files::new();
    let local = files.write(".orgtree.toml", "[policy\norg_unit_locked_levels = ");

    let err = Settings::load_from(None, Some(&local)).unwrap_err();

    assert!(matches!(err, ApplicationError::Config { .. }));
}

// ============================================================
// derived engine config and template
// ============================================================

#[test]
fn given_settings_when_engine_config_derived_then_policy_carried_over() {
    let files = Files::new();
    let local = files.write(
        ".orgtree.toml",
        r#"
[policy]
org_unit_locked_levels = 3
module_locked_levels = 1
default_module_actions = ["create"]
"#,
    );
    let settings = Settings::load_from(None, Some(&local)).unwrap();

    let config = settings.engine_config().unwrap();

    assert_eq!(config.move_policy.org_unit_locked_levels, 3);
    assert_eq!(config.move_policy.module_locked_levels, 1);
    assert_eq!(
        config.default_module_actions,
        BTreeSet::from([ActionKind::View, ActionKind::Create])
    );
}

#[test]
fn given_template_when_parsed_then_loads_as_defaults() {
    let files = Files::new();
    let local = files.write(".orgtree.toml", &Settings::template());

    let settings = Settings::load_from(None, Some(&local)).expect("template is valid toml");

    assert_eq!(settings.policy, PolicyConfig::default());
}

#[test]
fn given_effective_settings_when_shown_as_toml_then_reparses() {
    let settings = Settings::default();

    let text = settings.to_toml().unwrap();
    let parsed: Settings = toml::from_str(&text).unwrap();

    assert_eq!(parsed, settings);
}
