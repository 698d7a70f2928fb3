//! Tree builder: reconstructs a store from flat persisted records.
//!
//! The wire format omits `children` and the derived employee aggregate; both
//! are rebuilt here from `parentId` + `order`.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::arena::TreeStore;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{EmployeeRef, Node, NodeAttrs, NodeId};

/// Flat, JSON-serializable node record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub level: u32,
    pub order: i64,
    #[serde(flatten)]
    pub attrs: NodeAttrs,
}

impl From<&Node> for NodeRecord {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            level: node.level,
            order: node.order,
            attrs: node.attrs.clone(),
        }
    }
}

/// Persisted form of a whole forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSnapshot {
    /// Optimistic concurrency version
    pub version: u64,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub unassigned_employees: Vec<EmployeeRef>,
}

impl TreeSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            nodes: Vec::new(),
            unassigned_employees: Vec::new(),
        }
    }

    /// Capture `store` in pre-order.
    pub fn from_store(store: &TreeStore, version: u64) -> Self {
        Self {
            version,
            nodes: store.iter().map(|(_, node)| NodeRecord::from(node)).collect(),
            unassigned_employees: store.unassigned_employees().into_iter().cloned().collect(),
        }
    }

    pub fn into_store(self) -> DomainResult<TreeStore> {
        TreeBuilder::new().build(self.nodes, self.unassigned_employees)
    }
}

/// Constructs a validated store from flat records.
pub struct TreeBuilder {
    relationship_cache: BTreeMap<Option<NodeId>, Vec<NodeRecord>>,
    visited: HashSet<NodeId>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            relationship_cache: BTreeMap::new(),
            visited: HashSet::new(),
        }
    }

    /// Build a store from records in any order.
    ///
    /// Rejects duplicate ids, dangling parents, duplicate sibling orders,
    /// inconsistent levels, cycles and any other invariant violation with
    /// `InvalidSnapshot`.
    pub fn build(
        &mut self,
        records: Vec<NodeRecord>,
        unassigned: Vec<EmployeeRef>,
    ) -> DomainResult<TreeStore> {
        self.relationship_cache.clear();
        self.visited.clear();
        let total = records.len();

        let ids: HashSet<NodeId> = records.iter().map(|r| r.id).collect();
        if ids.len() != total {
            return Err(DomainError::InvalidSnapshot("duplicate node ids".into()));
        }
        for record in records {
            if let Some(pid) = record.parent_id {
                if !ids.contains(&pid) {
                    return Err(DomainError::InvalidSnapshot(format!(
                        "{} references missing parent {}",
                        record.id, pid
                    )));
                }
            }
            self.relationship_cache
                .entry(record.parent_id)
                .or_default()
                .push(record);
        }
        for (parent, siblings) in self.relationship_cache.iter_mut() {
            siblings.sort_by_key(|r| (r.order, r.id));
            if let Some(pair) = siblings.windows(2).find(|w| w[0].order == w[1].order) {
                return Err(DomainError::InvalidSnapshot(format!(
                    "siblings {} and {} under {:?} share order {}",
                    pair[0].id, pair[1].id, parent, pair[0].order
                )));
            }
        }

        // Cycle detection: records exist but none of them is a root
        if total > 0 && !self.relationship_cache.contains_key(&None) {
            return Err(DomainError::InvalidSnapshot("no root node: parent links form a cycle".into()));
        }

        let mut store = TreeStore::new();
        let mut stack: Vec<(NodeRecord, u32)> = self
            .relationship_cache
            .remove(&None)
            .unwrap_or_default()
            .into_iter()
            .rev()
            .map(|r| (r, 0))
            .collect();

        while let Some((record, level)) = stack.pop() {
            if !self.visited.insert(record.id) {
                return Err(DomainError::InvalidSnapshot(format!("cycle through {}", record.id)));
            }
            if record.level != level {
                return Err(DomainError::InvalidSnapshot(format!(
                    "{} declares level {} but sits on level {}",
                    record.id, record.level, level
                )));
            }
            if let Some(children) = self.relationship_cache.remove(&Some(record.id)) {
                for child in children.into_iter().rev() {
                    stack.push((child, level + 1));
                }
            }
            if let NodeAttrs::OrgUnit(unit) = &record.attrs {
                if let Some(employee) = unit
                    .employee_ids
                    .iter()
                    .find(|e| store.employee_assignment(e).is_some())
                {
                    return Err(DomainError::InvalidSnapshot(format!(
                        "employee {} is attached to more than one unit",
                        employee
                    )));
                }
            }
            store
                .attach_node(Node {
                    id: record.id,
                    parent_id: record.parent_id,
                    level,
                    order: record.order,
                    employee_count: record.attrs.direct_employee_count(),
                    attrs: record.attrs,
                    children: Vec::new(),
                })
                .map_err(|e| DomainError::InvalidSnapshot(e.to_string()))?;
        }

        if self.visited.len() != total {
            return Err(DomainError::InvalidSnapshot(format!(
                "{} nodes are not reachable from a root: parent links form a cycle",
                total - self.visited.len()
            )));
        }

        for employee in unassigned {
            if !store.register_employee(employee.clone()) {
                return Err(DomainError::InvalidSnapshot(format!(
                    "employee {} is listed as unassigned but attached to a unit",
                    employee
                )));
            }
        }

        store.check_invariants().map_err(|e| match e {
            DomainError::InvariantViolation(msg) => DomainError::InvalidSnapshot(msg),
            other => other,
        })?;
        debug!(nodes = store.len(), roots = store.root_ids().len(), "tree built from records");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{ActionKind, ModuleAttrs, OrgUnitAttrs, UnitType};

    fn record(id: NodeId, parent: Option<NodeId>, level: u32, order: i64) -> NodeRecord {
        NodeRecord {
            id,
            parent_id: parent,
            level,
            order,
            attrs: NodeAttrs::OrgUnit(OrgUnitAttrs::new("u", "U", UnitType::Team)),
        }
    }

    #[test]
    fn test_children_are_rebuilt_in_order() {
        let (root, a, b) = (NodeId::new(), NodeId::new(), NodeId::new());
        let records = vec![record(b, Some(root), 1, 7), record(a, Some(root), 1, 3), record(root, None, 0, 0)];

        let store = TreeBuilder::new().build(records, vec![]).unwrap();

        assert_eq!(store.get(root).unwrap().children, vec![a, b]);
    }

    #[test]
    fn test_cycle_without_root_is_rejected() {
        let (a, b) = (NodeId::new(), NodeId::new());
        let err = TreeBuilder::new()
            .build(vec![record(a, Some(b), 1, 0), record(b, Some(a), 1, 0)], vec![])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_cycle_beside_valid_root_is_rejected() {
        let (root, a, b) = (NodeId::new(), NodeId::new(), NodeId::new());
        let err = TreeBuilder::new()
            .build(
                vec![record(root, None, 0, 0), record(a, Some(b), 1, 0), record(b, Some(a), 1, 0)],
                vec![],
            )
            .unwrap_err();
        assert!(err.to_string().contains("not reachable"));
    }

    #[test]
    fn test_wrong_level_is_rejected() {
        let (root, a) = (NodeId::new(), NodeId::new());
        let err = TreeBuilder::new()
            .build(vec![record(root, None, 0, 0), record(a, Some(root), 3, 0)], vec![])
            .unwrap_err();
        assert!(err.to_string().contains("level"));
    }

    #[test]
    fn test_enabled_module_under_disabled_parent_is_rejected() {
        let (root, child) = (NodeId::new(), NodeId::new());
        let records = vec![
            NodeRecord {
                id: root,
                parent_id: None,
                level: 0,
                order: 0,
                attrs: NodeAttrs::Module(ModuleAttrs::new("Dashboard")),
            },
            NodeRecord {
                id: child,
                parent_id: Some(root),
                level: 1,
                order: 0,
                attrs: NodeAttrs::Module(ModuleAttrs::new("Reports").with_actions([ActionKind::View])),
            },
        ];
        let err = TreeBuilder::new().build(records, vec![]).unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_snapshot_json_omits_children() {
        let mut store = TreeStore::new();
        let root = store
            .insert(
                None,
                None,
                NodeAttrs::OrgUnit(OrgUnitAttrs::new("Acme", "AC", UnitType::Company).with_employees(["e1"])),
            )
            .unwrap();
        store.insert(Some(root), None, NodeAttrs::OrgUnit(OrgUnitAttrs::new("Ops", "OP", UnitType::Division))).unwrap();

        let json = serde_json::to_value(TreeSnapshot::from_store(&store, 4)).unwrap();

        assert_eq!(json["version"], 4);
        assert_eq!(json["nodes"][0]["kind"], "org-unit");
        assert_eq!(json["nodes"][1]["parentId"], root.to_string());
        assert!(json["nodes"][0].get("children").is_none());
        assert!(json["nodes"][0].get("employeeCount").is_none());
    }
}
