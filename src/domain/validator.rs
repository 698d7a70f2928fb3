//! Move validation for reparent and reorder requests

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::arena::TreeStore;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{Node, NodeId, NodeKind};

/// How many top levels of each tree kind are locked against drag and drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovePolicy {
    /// Company and division levels of the org chart
    pub org_unit_locked_levels: u32,
    pub module_locked_levels: u32,
}

impl Default for MovePolicy {
    fn default() -> Self {
        Self {
            org_unit_locked_levels: 2,
            module_locked_levels: 0,
        }
    }
}

impl MovePolicy {
    pub fn locked_levels(&self, kind: NodeKind) -> u32 {
        match kind {
            NodeKind::OrgUnit => self.org_unit_locked_levels,
            NodeKind::Module => self.module_locked_levels,
        }
    }
}

/// Outcome of a successful reparent validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReparentPlan {
    pub node: NodeId,
    pub from: NodeId,
    pub to: NodeId,
}

impl ReparentPlan {
    /// Dropping a node onto its current parent changes nothing.
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Gatekeeper for drag-and-drop requests.
#[derive(Debug, Clone, Default)]
pub struct MoveValidator {
    policy: MovePolicy,
}

impl MoveValidator {
    pub fn new(policy: MovePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MovePolicy {
        &self.policy
    }

    pub fn is_draggable(&self, node: &Node) -> bool {
        node.level >= self.policy.locked_levels(node.kind())
    }

    fn ensure_draggable(&self, node: &Node) -> DomainResult<()> {
        if self.is_draggable(node) {
            Ok(())
        } else {
            Err(DomainError::ImmovableNode {
                id: node.id,
                level: node.level,
            })
        }
    }

    /// Check that `id` may be dropped onto `target`.
    ///
    /// Checks run in this order: existence, cycle, draggability, kind, level.
    /// The target must sit on the same level as the node's current parent, so
    /// a move never changes the node's own level. Roots have no parent level
    /// to match and are rejected as immovable.
    pub fn validate_reparent(
        &self,
        store: &TreeStore,
        id: NodeId,
        target: NodeId,
    ) -> DomainResult<ReparentPlan> {
        let node = store.get(id)?;
        let target_node = store.get(target).map_err(|_| DomainError::InvalidParent(target))?;

        if target == id || store.ancestors(target)?.contains(&id) {
            return Err(DomainError::CyclicMove { node: id, target });
        }
        self.ensure_draggable(node)?;
        if target_node.kind() != node.kind() {
            return Err(DomainError::KindMismatch {
                id: target,
                expected: node.kind(),
                actual: target_node.kind(),
            });
        }
        let Some(current_parent) = node.parent_id else {
            return Err(DomainError::ImmovableNode {
                id,
                level: node.level,
            });
        };
        let expected_level = store.get(current_parent)?.level;
        if target_node.level != expected_level {
            return Err(DomainError::LevelMismatch {
                node: id,
                target,
                target_level: target_node.level,
                expected_level,
            });
        }
        debug!(%id, from = %current_parent, to = %target, "reparent validated");
        Ok(ReparentPlan {
            node: id,
            from: current_parent,
            to: target,
        })
    }

    /// Check that `a` and `b` may swap positions.
    pub fn validate_reorder(&self, store: &TreeStore, a: NodeId, b: NodeId) -> DomainResult<()> {
        let node_a = store.get(a)?;
        let node_b = store.get(b)?;
        if node_a.parent_id != node_b.parent_id {
            return Err(DomainError::SiblingMismatch { a, b });
        }
        self.ensure_draggable(node_a)?;
        self.ensure_draggable(node_b)?;
        Ok(())
    }
}
