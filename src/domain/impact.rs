//! Delete impact analysis and confirmed subtree deletion

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::arena::TreeStore;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{Node, NodeId};

/// Scope of a destructive delete, shown to the user before confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteImpact {
    /// The node itself plus all descendants
    pub unit_count: usize,
    /// Employees attached anywhere in the subtree
    pub affected_employee_count: usize,
}

pub struct ImpactAnalyzer;

impl ImpactAnalyzer {
    pub fn compute_delete_impact(store: &TreeStore, id: NodeId) -> DomainResult<DeleteImpact> {
        let node = store.get(id)?;
        let unit_count = store.subtree(id)?.count();
        let impact = DeleteImpact {
            unit_count,
            affected_employee_count: node.employee_count,
        };
        debug!(%id, ?impact, "delete impact");
        Ok(impact)
    }

    /// The confirmation must repeat the node's name exactly.
    pub fn verify_confirmation(node: &Node, confirmation: &str) -> DomainResult<()> {
        if confirmation.is_empty() || confirmation != node.name() {
            return Err(DomainError::ConfirmationMismatch { id: node.id });
        }
        Ok(())
    }

    /// Remove the subtree rooted at `id` after checking `confirmation`.
    ///
    /// Employees of removed units are detached into the unassigned pool.
    /// Returns the impact computed before removal.
    pub fn delete(store: &mut TreeStore, id: NodeId, confirmation: &str) -> DomainResult<DeleteImpact> {
        Self::verify_confirmation(store.get(id)?, confirmation)?;
        let impact = Self::compute_delete_impact(store, id)?;
        store.transact("delete", |tx| {
            let removed = tx.remove_subtree(id)?;
            if removed.len() != impact.unit_count {
                return Err(DomainError::InvariantViolation(format!(
                    "removed {} nodes, impact promised {}",
                    removed.len(),
                    impact.unit_count
                )));
            }
            Ok(())
        })?;
        info!(%id, units = impact.unit_count, employees = impact.affected_employee_count, "subtree deleted");
        Ok(impact)
    }
}
