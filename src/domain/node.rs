//! Domain entities: nodes, kinds and kind-specific attributes

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{DomainError, DomainResult};

/// Opaque unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| format!("invalid node id '{}': {}", s, e))
    }
}

/// Reference to an employee record owned by the surrounding HR system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeRef(String);

impl EmployeeRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmployeeRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Discriminator selecting attribute set, cascade policy and move policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    OrgUnit,
    Module,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::OrgUnit => f.write_str("org-unit"),
            NodeKind::Module => f.write_str("module"),
        }
    }
}

/// Structural type of an org unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Company,
    Division,
    Department,
    Team,
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitType::Company => "company",
            UnitType::Division => "division",
            UnitType::Department => "department",
            UnitType::Team => "team",
        };
        f.write_str(s)
    }
}

impl FromStr for UnitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(UnitType::Company),
            "division" => Ok(UnitType::Division),
            "department" => Ok(UnitType::Department),
            "team" => Ok(UnitType::Team),
            other => Err(format!("unknown unit type: {}", other)),
        }
    }
}

/// Permission action that can be granted on a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    View,
    Create,
    Edit,
    Delete,
    Approve,
    Export,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::View,
        ActionKind::Create,
        ActionKind::Edit,
        ActionKind::Delete,
        ActionKind::Approve,
        ActionKind::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::View => "view",
            ActionKind::Create => "create",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
            ActionKind::Approve => "approve",
            ActionKind::Export => "export",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ActionKind::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| format!("unknown action: {}", s))
    }
}

/// Attributes of an organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnitAttrs {
    pub name: String,
    pub code: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    /// Employees attached directly to this unit
    #[serde(default)]
    pub employee_ids: BTreeSet<EmployeeRef>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl OrgUnitAttrs {
    pub fn new(name: impl Into<String>, code: impl Into<String>, unit_type: UnitType) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            unit_type,
            employee_ids: BTreeSet::new(),
            active: true,
        }
    }

    pub fn with_employees<I, E>(mut self, employees: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EmployeeRef>,
    {
        self.employee_ids.extend(employees.into_iter().map(Into::into));
        self
    }
}

/// Attributes of a permission module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAttrs {
    pub name: String,
    /// Granted actions; empty means the module is disabled
    #[serde(default)]
    pub enabled_actions: BTreeSet<ActionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ModuleAttrs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled_actions: BTreeSet::new(),
            href: None,
            is_active: true,
        }
    }

    pub fn with_actions<I: IntoIterator<Item = ActionKind>>(mut self, actions: I) -> Self {
        self.enabled_actions.extend(actions);
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.enabled_actions.is_empty()
    }
}

fn default_true() -> bool {
    true
}

/// Kind-specific attributes, tagged by `kind` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeAttrs {
    OrgUnit(OrgUnitAttrs),
    Module(ModuleAttrs),
}

impl NodeAttrs {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeAttrs::OrgUnit(_) => NodeKind::OrgUnit,
            NodeAttrs::Module(_) => NodeKind::Module,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeAttrs::OrgUnit(unit) => &unit.name,
            NodeAttrs::Module(module) => &module.name,
        }
    }

    pub fn direct_employee_count(&self) -> usize {
        match self {
            NodeAttrs::OrgUnit(unit) => unit.employee_ids.len(),
            NodeAttrs::Module(_) => 0,
        }
    }

    pub fn as_org_unit(&self) -> Option<&OrgUnitAttrs> {
        match self {
            NodeAttrs::OrgUnit(unit) => Some(unit),
            NodeAttrs::Module(_) => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleAttrs> {
        match self {
            NodeAttrs::Module(module) => Some(module),
            NodeAttrs::OrgUnit(_) => None,
        }
    }

    /// Apply a partial update. Fails with `KindMismatch` when the patch targets the other kind.
    pub fn apply(&mut self, id: NodeId, patch: AttrsPatch) -> DomainResult<()> {
        match (self, patch) {
            (NodeAttrs::OrgUnit(unit), AttrsPatch::OrgUnit(p)) => {
                if let Some(name) = p.name {
                    unit.name = name;
                }
                if let Some(code) = p.code {
                    unit.code = code;
                }
                if let Some(unit_type) = p.unit_type {
                    unit.unit_type = unit_type;
                }
                Ok(())
            }
            (NodeAttrs::Module(module), AttrsPatch::Module(p)) => {
                if let Some(name) = p.name {
                    module.name = name;
                }
                if let Some(href) = p.href {
                    module.href = href;
                }
                if let Some(is_active) = p.is_active {
                    module.is_active = is_active;
                }
                Ok(())
            }
            (attrs, patch) => Err(DomainError::KindMismatch {
                id,
                expected: attrs.kind(),
                actual: patch.kind(),
            }),
        }
    }
}

/// Partial update for an org unit.
///
/// Employees and activation are changed through their dedicated operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrgUnitPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub unit_type: Option<UnitType>,
}

/// Partial update for a module.
///
/// Enabled actions are changed through toggles so the permission cascade runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModulePatch {
    pub name: Option<String>,
    /// `Some(None)` clears the link
    pub href: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AttrsPatch {
    OrgUnit(OrgUnitPatch),
    Module(ModulePatch),
}

impl AttrsPatch {
    pub fn kind(&self) -> NodeKind {
        match self {
            AttrsPatch::OrgUnit(_) => NodeKind::OrgUnit,
            AttrsPatch::Module(_) => NodeKind::Module,
        }
    }
}

/// A single entry in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub level: u32,
    pub order: i64,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
    /// Child ids sorted by `order`
    pub children: Vec<NodeId>,
    /// Employees attached anywhere in this subtree (org units only)
    pub employee_count: usize,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.attrs.kind()
    }

    pub fn name(&self) -> &str {
        self.attrs.name()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Module with at least one granted action. Org units always count as enabled.
    pub fn is_enabled(&self) -> bool {
        match &self.attrs {
            NodeAttrs::Module(module) => module.is_enabled(),
            NodeAttrs::OrgUnit(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_parse_is_case_insensitive() {
        assert_eq!("VIEW".parse::<ActionKind>().unwrap(), ActionKind::View);
        assert_eq!(" export ".parse::<ActionKind>().unwrap(), ActionKind::Export);
        assert!("fly".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_apply_patch_of_other_kind_is_kind_mismatch() {
        let id = NodeId::new();
        let mut attrs = NodeAttrs::Module(ModuleAttrs::new("Reports"));
        let err = attrs
            .apply(id, AttrsPatch::OrgUnit(OrgUnitPatch::default()))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::KindMismatch {
                id,
                expected: NodeKind::Module,
                actual: NodeKind::OrgUnit
            }
        );
    }

    #[test]
    fn test_apply_module_patch_clears_href() {
        let mut attrs = NodeAttrs::Module(ModuleAttrs::new("Reports").with_href("/reports"));
        attrs
            .apply(
                NodeId::new(),
                AttrsPatch::Module(ModulePatch {
                    href: Some(None),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(attrs.as_module().unwrap().href, None);
    }

    #[test]
    fn test_attrs_serialize_with_kind_tag() {
        let attrs = NodeAttrs::OrgUnit(OrgUnitAttrs::new("Sales", "SAL", UnitType::Department));
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["kind"], "org-unit");
        assert_eq!(json["type"], "department");
        assert_eq!(json["active"], true);
    }
}
