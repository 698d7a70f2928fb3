//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::node::{EmployeeRef, NodeId, NodeKind};

/// Domain errors represent tree constraint violations.
/// Every variant except `InvariantViolation` is a user-facing validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("node not found: {0}")]
    NotFound(NodeId),

    #[error("invalid parent: {0} does not exist")]
    InvalidParent(NodeId),

    #[error("kind mismatch on {id}: expected {expected}, got {actual}")]
    KindMismatch {
        id: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("cannot move {node} below {target}: target is inside its own subtree")]
    CyclicMove { node: NodeId, target: NodeId },

    #[error("cannot move {node} below {target}: target is on level {target_level}, expected level {expected_level}")]
    LevelMismatch {
        node: NodeId,
        target: NodeId,
        target_level: u32,
        expected_level: u32,
    },

    #[error("{a} and {b} do not share a parent")]
    SiblingMismatch { a: NodeId, b: NodeId },

    #[error("node {id} on level {level} cannot be moved")]
    ImmovableNode { id: NodeId, level: u32 },

    #[error("confirmation does not match the name of {id}")]
    ConfirmationMismatch { id: NodeId },

    #[error("version conflict: expected {expected}, current is {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("cannot enable {id}: ancestor {ancestor} is disabled")]
    ParentDisabled { id: NodeId, ancestor: NodeId },

    #[error("employee {employee} is already assigned to {unit}")]
    EmployeeAlreadyAssigned { employee: EmployeeRef, unit: NodeId },

    #[error("unknown employee: {0}")]
    UnknownEmployee(EmployeeRef),

    #[error("no order value left after {after} below {}", parent_label(.parent))]
    OrderOverflow { parent: Option<NodeId>, after: i64 },

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    /// False for programming errors that should never reach an end user.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, DomainError::InvariantViolation(_))
    }
}

fn parent_label(parent: &Option<NodeId>) -> String {
    parent.map(|p| p.to_string()).unwrap_or_else(|| "the root level".into())
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
