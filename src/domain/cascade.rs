//! State cascades for the two tree kinds
//!
//! Modules: disabling cascades to every descendant, enabling never does.
//! Org units: activation changes only the addressed unit unless the caller
//! explicitly asks for the whole subtree.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::arena::TreeStore;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{ActionKind, ModuleAttrs, Node, NodeAttrs, NodeId, NodeKind, OrgUnitAttrs};

/// New state of a single node produced by a cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeState {
    EnabledActions(BTreeSet<ActionKind>),
    Active(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub id: NodeId,
    pub state: NodeState,
}

/// A module toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleToggle {
    /// Flip the module as a whole: enabled → disabled, disabled → default actions
    Module,
    /// Flip a single action on the module
    Action(ActionKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadePolicy {
    /// Clear the actions of the node and of every descendant
    DisableModule,
    /// Grant the given actions to the node only
    EnableModule(BTreeSet<ActionKind>),
    /// Flip one action; losing the last action disables the subtree
    ToggleAction(ActionKind),
    /// Flag a single org unit
    SetActive(bool),
    /// Flag an org unit and all of its descendants
    SetSubtreeActive(bool),
}

/// Computes dependent state changes without touching the store.
#[derive(Debug, Clone)]
pub struct CascadeEngine {
    default_actions: BTreeSet<ActionKind>,
}

impl Default for CascadeEngine {
    fn default() -> Self {
        Self::new(BTreeSet::from([ActionKind::View]))
    }
}

impl CascadeEngine {
    pub fn new(default_actions: BTreeSet<ActionKind>) -> Self {
        Self { default_actions }
    }

    pub fn default_actions(&self) -> &BTreeSet<ActionKind> {
        &self.default_actions
    }

    /// Resolve a toggle request against the node's current state.
    pub fn policy_for_toggle(&self, node: &Node, toggle: ModuleToggle) -> DomainResult<CascadePolicy> {
        let module = node.attrs.as_module().ok_or(DomainError::KindMismatch {
            id: node.id,
            expected: NodeKind::Module,
            actual: node.kind(),
        })?;
        Ok(match toggle {
            ModuleToggle::Module if module.is_enabled() => CascadePolicy::DisableModule,
            ModuleToggle::Module => CascadePolicy::EnableModule(self.default_actions.clone()),
            ModuleToggle::Action(action) => CascadePolicy::ToggleAction(action),
        })
    }

    /// Every node whose state changes when `policy` is applied at `root`.
    ///
    /// Pure: the store is only read. Nodes already in the target state are
    /// not reported.
    pub fn apply_cascade(
        &self,
        store: &TreeStore,
        root: NodeId,
        policy: &CascadePolicy,
    ) -> DomainResult<Vec<StateChange>> {
        let node = store.get(root)?;
        debug!(%root, ?policy, "computing cascade");
        match policy {
            CascadePolicy::DisableModule => {
                expect_kind(node, NodeKind::Module)?;
                Self::disable_subtree(store, root)
            }
            CascadePolicy::EnableModule(actions) => {
                let module = expect_module(node)?;
                Self::ensure_parent_enabled(store, node)?;
                if actions.is_empty() {
                    return Self::disable_subtree(store, root);
                }
                if &module.enabled_actions == actions {
                    return Ok(Vec::new());
                }
                Ok(vec![StateChange {
                    id: root,
                    state: NodeState::EnabledActions(actions.clone()),
                }])
            }
            CascadePolicy::ToggleAction(action) => {
                let module = expect_module(node)?;
                let mut actions = module.enabled_actions.clone();
                if actions.remove(action) {
                    if actions.is_empty() {
                        return Self::disable_subtree(store, root);
                    }
                } else {
                    Self::ensure_parent_enabled(store, node)?;
                    actions.insert(*action);
                }
                Ok(vec![StateChange {
                    id: root,
                    state: NodeState::EnabledActions(actions),
                }])
            }
            CascadePolicy::SetActive(active) => {
                let unit = expect_org_unit(node)?;
                if unit.active == *active {
                    return Ok(Vec::new());
                }
                Ok(vec![StateChange {
                    id: root,
                    state: NodeState::Active(*active),
                }])
            }
            CascadePolicy::SetSubtreeActive(active) => {
                expect_kind(node, NodeKind::OrgUnit)?;
                let changes = store
                    .subtree(root)?
                    .filter(|(_, n)| n.attrs.as_org_unit().is_some_and(|u| u.active != *active))
                    .map(|(id, _)| StateChange {
                        id,
                        state: NodeState::Active(*active),
                    })
                    .collect();
                Ok(changes)
            }
        }
    }

    /// Write computed changes into the store. Call inside a transaction.
    pub fn commit(store: &mut TreeStore, changes: &[StateChange]) -> DomainResult<()> {
        for change in changes {
            let node = store.get_mut(change.id)?;
            let kind = node.kind();
            match (&mut node.attrs, &change.state) {
                (NodeAttrs::Module(module), NodeState::EnabledActions(actions)) => {
                    module.enabled_actions = actions.clone();
                }
                (NodeAttrs::OrgUnit(unit), NodeState::Active(active)) => {
                    unit.active = *active;
                }
                (_, NodeState::EnabledActions(_)) => {
                    return Err(DomainError::KindMismatch {
                        id: change.id,
                        expected: NodeKind::Module,
                        actual: kind,
                    })
                }
                (_, NodeState::Active(_)) => {
                    return Err(DomainError::KindMismatch {
                        id: change.id,
                        expected: NodeKind::OrgUnit,
                        actual: kind,
                    })
                }
            }
        }
        Ok(())
    }

    fn disable_subtree(store: &TreeStore, root: NodeId) -> DomainResult<Vec<StateChange>> {
        Ok(store
            .subtree(root)?
            .filter(|(_, n)| n.is_enabled())
            .map(|(id, _)| StateChange {
                id,
                state: NodeState::EnabledActions(BTreeSet::new()),
            })
            .collect())
    }

    fn ensure_parent_enabled(store: &TreeStore, node: &Node) -> DomainResult<()> {
        if let Some(pid) = node.parent_id {
            if let Some(ancestor) = store.first_disabled_in_chain(pid)? {
                return Err(DomainError::ParentDisabled {
                    id: node.id,
                    ancestor,
                });
            }
        }
        Ok(())
    }
}

fn expect_kind(node: &Node, expected: NodeKind) -> DomainResult<()> {
    if node.kind() == expected {
        Ok(())
    } else {
        Err(DomainError::KindMismatch {
            id: node.id,
            expected,
            actual: node.kind(),
        })
    }
}

fn expect_module(node: &Node) -> DomainResult<&ModuleAttrs> {
    expect_kind(node, NodeKind::Module)?;
    node.attrs.as_module().ok_or(DomainError::NotFound(node.id))
}

fn expect_org_unit(node: &Node) -> DomainResult<&OrgUnitAttrs> {
    expect_kind(node, NodeKind::OrgUnit)?;
    node.attrs.as_org_unit().ok_or(DomainError::NotFound(node.id))
}
