//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/orgtree/orgtree.toml`
//! 3. Local config: `./.orgtree.toml` (or an explicitly given file)
//! 4. Environment variables: `ORGTREE_*` prefix, `__` between sections

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{ActionKind, EngineConfig, LayoutConfig, MovePolicy};

/// Drag-and-drop and module defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Top org-unit levels that cannot be moved (company + division)
    pub org_unit_locked_levels: u32,
    pub module_locked_levels: u32,
    /// Actions granted when a disabled module is switched on
    pub default_module_actions: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            org_unit_locked_levels: 2,
            module_locked_levels: 0,
            default_module_actions: vec!["view".into()],
        }
    }
}

/// Raw policy config for intermediate parsing (`None` = not specified).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawPolicyConfig {
    pub org_unit_locked_levels: Option<u32>,
    pub module_locked_levels: Option<u32>,
    pub default_module_actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawLayoutConfig {
    pub node_width: Option<f64>,
    pub node_height: Option<f64>,
    pub sibling_separation: Option<f64>,
    pub rank_separation: Option<f64>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub data_file: Option<PathBuf>,
    pub layout: RawLayoutConfig,
    pub policy: RawPolicyConfig,
}

impl PolicyConfig {
    /// Merge action lists with union semantics; `!action` removes an inherited entry.
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["view"], &["export"])          // → ["export", "view"]
    /// merge_array(&["view", "edit"], &["!edit"])   // → ["view"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let mut result: HashSet<String> = base.iter().cloned().collect();

        for pattern in overlay {
            if let Some(negated) = pattern.strip_prefix('!') {
                result.remove(negated);
            } else {
                result.insert(pattern.clone());
            }
        }

        let mut vec: Vec<String> = result.into_iter().collect();
        vec.sort();
        vec
    }

    /// Overlay a local config: scalars win if set, actions merge.
    pub fn merge(&self, overlay: &RawPolicyConfig) -> Self {
        Self {
            org_unit_locked_levels: overlay
                .org_unit_locked_levels
                .unwrap_or(self.org_unit_locked_levels),
            module_locked_levels: overlay
                .module_locked_levels
                .unwrap_or(self.module_locked_levels),
            default_module_actions: overlay
                .default_module_actions
                .as_ref()
                .map(|o| Self::merge_array(&self.default_module_actions, o))
                .unwrap_or_else(|| self.default_module_actions.clone()),
        }
    }

    /// Apply global config onto defaults; a given action list replaces the default.
    pub fn apply_global(&self, global: &RawPolicyConfig) -> Self {
        Self {
            org_unit_locked_levels: global
                .org_unit_locked_levels
                .unwrap_or(self.org_unit_locked_levels),
            module_locked_levels: global
                .module_locked_levels
                .unwrap_or(self.module_locked_levels),
            default_module_actions: global
                .default_module_actions
                .clone()
                .unwrap_or_else(|| self.default_module_actions.clone()),
        }
    }

    /// Parsed, de-duplicated default actions.
    pub fn actions(&self) -> Result<BTreeSet<ActionKind>, ApplicationError> {
        let actions = self
            .default_module_actions
            .iter()
            .map(|a| a.parse::<ActionKind>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|message| ApplicationError::Config {
                message: format!("policy.default_module_actions: {message}"),
            })?;
        if actions.is_empty() {
            return Err(ApplicationError::Config {
                message: "policy.default_module_actions must not be empty".into(),
            });
        }
        Ok(actions)
    }
}

fn merge_layout(base: &LayoutConfig, overlay: &RawLayoutConfig) -> LayoutConfig {
    LayoutConfig {
        node_width: overlay.node_width.unwrap_or(base.node_width),
        node_height: overlay.node_height.unwrap_or(base.node_height),
        sibling_separation: overlay.sibling_separation.unwrap_or(base.sibling_separation),
        rank_separation: overlay.rank_separation.unwrap_or(base.rank_separation),
    }
}

/// Unified configuration for orgtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Snapshot file operated on by the CLI (default: ~/.orgtree/tree.json)
    pub data_file: PathBuf,
    pub layout: LayoutConfig,
    pub policy: PolicyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            layout: LayoutConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

fn default_data_file() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".orgtree").join("tree.json"))
        .unwrap_or_else(|| PathBuf::from("~/.orgtree/tree.json"))
}

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables leave the input unchanged.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Get the XDG config directory for orgtree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "orgtree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("orgtree.toml"))
}

/// Local config file in the working directory.
pub fn local_config_path() -> PathBuf {
    PathBuf::from(".orgtree.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.data_file.to_string_lossy().as_ref());
        self.data_file = PathBuf::from(expanded);
    }

    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            data_file: overlay
                .data_file
                .clone()
                .unwrap_or_else(|| self.data_file.clone()),
            layout: merge_layout(&self.layout, &overlay.layout),
            policy: self.policy.merge(&overlay.policy),
        }
    }

    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            data_file: global
                .data_file
                .clone()
                .unwrap_or_else(|| self.data_file.clone()),
            layout: merge_layout(&self.layout, &global.layout),
            policy: self.policy.apply_global(&global.policy),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// `local` overrides the default `./.orgtree.toml` location. An explicitly
    /// given local file must exist.
    pub fn load(local: Option<&Path>) -> Result<Self, ApplicationError> {
        if let Some(path) = local {
            if !path.exists() {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
        }
        let local = local.map(Path::to_path_buf).unwrap_or_else(local_config_path);
        Self::load_from(global_config_path().as_deref(), Some(&local))
    }

    /// Load with explicit file locations; missing files are skipped.
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → Local: UNION with `!action` negation
    /// - Any → Env vars: REPLACE
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                let raw = load_raw_settings(global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(local_path) = local {
            if local_path.exists() {
                let raw = load_raw_settings(local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        current.validate()?;

        Ok(current)
    }

    /// Apply ORGTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("ORGTREE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("policy.default_module_actions")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("data_file") {
            settings.data_file = PathBuf::from(val);
        }
        if let Ok(val) = config.get_float("layout.node_width") {
            settings.layout.node_width = val;
        }
        if let Ok(val) = config.get_float("layout.node_height") {
            settings.layout.node_height = val;
        }
        if let Ok(val) = config.get_float("layout.sibling_separation") {
            settings.layout.sibling_separation = val;
        }
        if let Ok(val) = config.get_float("layout.rank_separation") {
            settings.layout.rank_separation = val;
        }
        if let Ok(val) = config.get::<u32>("policy.org_unit_locked_levels") {
            settings.policy.org_unit_locked_levels = val;
        }
        if let Ok(val) = config.get::<u32>("policy.module_locked_levels") {
            settings.policy.module_locked_levels = val;
        }
        if let Ok(val) = config.get::<Vec<String>>("policy.default_module_actions") {
            settings.policy.default_module_actions = val;
        }

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ApplicationError> {
        self.layout
            .validate()
            .map_err(|message| ApplicationError::Config { message })?;
        self.policy.actions()?;
        Ok(())
    }

    /// Engine parameters derived from these settings.
    pub fn engine_config(&self) -> Result<EngineConfig, ApplicationError> {
        self.validate()?;
        Ok(EngineConfig {
            move_policy: MovePolicy {
                org_unit_locked_levels: self.policy.org_unit_locked_levels,
                module_locked_levels: self.policy.module_locked_levels,
            },
            default_module_actions: self.policy.actions()?,
            layout: self.layout.clone(),
        })
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# orgtree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/orgtree/orgtree.toml
#   Local:  ./.orgtree.toml
#   Env:    ORGTREE_* environment variables, e.g. ORGTREE_LAYOUT__NODE_WIDTH=200
#
# A local default_module_actions list is merged into the global one;
# prefix an action with "!" to remove it.

# Snapshot file used by the CLI
# data_file = "~/.orgtree/tree.json"

[layout]
# node_width = 160.0
# node_height = 60.0
# sibling_separation = 40.0
# rank_separation = 80.0

[policy]
# Levels 0..n of the org chart cannot be dragged (2 = company + division)
# org_unit_locked_levels = 2
# module_locked_levels = 0
# default_module_actions = ["view"]
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
