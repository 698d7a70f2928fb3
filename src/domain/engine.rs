//! Tree engine: the kind-agnostic operation set
//!
//! Each mutating operation runs validate → cascade → commit inside a single
//! store transaction and reports the nodes it changed.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::domain::arena::TreeStore;
use crate::domain::cascade::{CascadeEngine, CascadePolicy, ModuleToggle};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::impact::{DeleteImpact, ImpactAnalyzer};
use crate::domain::layout::{Layout, LayoutConfig, LayoutEngine};
use crate::domain::node::{ActionKind, AttrsPatch, EmployeeRef, Node, NodeAttrs, NodeId, NodeKind};
use crate::domain::validator::{MovePolicy, MoveValidator};

/// Policy knobs for the engine components.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub move_policy: MovePolicy,
    pub default_module_actions: BTreeSet<ActionKind>,
    pub layout: LayoutConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            move_policy: MovePolicy::default(),
            default_module_actions: BTreeSet::from([ActionKind::View]),
            layout: LayoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeEngine {
    store: TreeStore,
    validator: MoveValidator,
    cascade: CascadeEngine,
    layout: LayoutEngine,
}

impl Default for TreeEngine {
    fn default() -> Self {
        Self::new(TreeStore::new(), EngineConfig::default())
    }
}

impl TreeEngine {
    pub fn new(store: TreeStore, config: EngineConfig) -> Self {
        Self {
            store,
            validator: MoveValidator::new(config.move_policy),
            cascade: CascadeEngine::new(config.default_module_actions),
            layout: LayoutEngine::new(config.layout),
        }
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn validator(&self) -> &MoveValidator {
        &self.validator
    }

    pub fn get(&self, id: NodeId) -> DomainResult<&Node> {
        self.store.get(id)
    }

    pub fn children_of(&self, id: NodeId) -> DomainResult<Vec<&Node>> {
        self.store.children_of(id)
    }

    /// Create a node of `kind`; `attrs` must carry the same kind.
    #[instrument(level = "debug", skip(self, attrs))]
    pub fn create_node(
        &mut self,
        parent_id: Option<NodeId>,
        kind: NodeKind,
        after_order: Option<i64>,
        attrs: NodeAttrs,
    ) -> DomainResult<Node> {
        let id = NodeId::new();
        if attrs.kind() != kind {
            return Err(DomainError::KindMismatch {
                id,
                expected: kind,
                actual: attrs.kind(),
            });
        }
        self.store.insert_with_id(id, parent_id, after_order, attrs)?;
        Ok(self.store.get(id)?.clone())
    }

    #[instrument(level = "debug", skip(self, patch))]
    pub fn update_node(&mut self, id: NodeId, patch: AttrsPatch) -> DomainResult<Node> {
        Ok(self.store.update(id, patch)?.clone())
    }

    /// Reparent `id` as the last child of `new_parent`.
    ///
    /// A module landing under a disabled parent is disabled together with its subtree.
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> DomainResult<Vec<Node>> {
        let plan = self.validator.validate_reparent(&self.store, id, new_parent)?;
        if plan.is_noop() {
            debug!(%id, "dropped onto current parent, nothing to do");
            return Ok(Vec::new());
        }
        let cascade = &self.cascade;
        Self::mutate(&mut self.store, "move", |tx| {
            tx.reparent(plan.node, plan.to)?;
            if tx.get(plan.node)?.kind() == NodeKind::Module
                && tx.first_disabled_in_chain(plan.to)?.is_some()
            {
                let changes = cascade.apply_cascade(tx, plan.node, &CascadePolicy::DisableModule)?;
                CascadeEngine::commit(tx, &changes)?;
            }
            Ok(())
        })
    }

    /// Swap the order values of two siblings.
    #[instrument(level = "debug", skip(self))]
    pub fn reorder_siblings(&mut self, a: NodeId, b: NodeId) -> DomainResult<Vec<Node>> {
        self.validator.validate_reorder(&self.store, a, b)?;
        if a == b {
            return Ok(Vec::new());
        }
        Self::mutate(&mut self.store, "reorder", |tx| tx.swap_order(a, b))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn toggle_module(&mut self, id: NodeId, toggle: ModuleToggle) -> DomainResult<Vec<Node>> {
        let policy = self.cascade.policy_for_toggle(self.store.get(id)?, toggle)?;
        self.apply_policy("toggle", id, &policy)
    }

    /// Flag a single org unit; descendants keep their own flag.
    #[instrument(level = "debug", skip(self))]
    pub fn set_active(&mut self, id: NodeId, active: bool) -> DomainResult<Node> {
        self.apply_policy("set-active", id, &CascadePolicy::SetActive(active))?;
        Ok(self.store.get(id)?.clone())
    }

    /// Flag an org unit and every descendant.
    #[instrument(level = "debug", skip(self))]
    pub fn set_subtree_active(&mut self, id: NodeId, active: bool) -> DomainResult<Vec<Node>> {
        self.apply_policy("set-subtree-active", id, &CascadePolicy::SetSubtreeActive(active))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn assign_employee(&mut self, unit: NodeId, employee: EmployeeRef) -> DomainResult<Vec<Node>> {
        Self::mutate(&mut self.store, "assign", |tx| tx.assign_employee(unit, employee))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn unassign_employee(&mut self, employee: &EmployeeRef) -> DomainResult<Vec<Node>> {
        Self::mutate(&mut self.store, "unassign", |tx| tx.unassign_employee(employee).map(|_| ()))
    }

    pub fn get_delete_impact(&self, id: NodeId) -> DomainResult<DeleteImpact> {
        ImpactAnalyzer::compute_delete_impact(&self.store, id)
    }

    #[instrument(level = "debug", skip(self, confirmation))]
    pub fn delete_node(&mut self, id: NodeId, confirmation: &str) -> DomainResult<DeleteImpact> {
        ImpactAnalyzer::delete(&mut self.store, id, confirmation)
    }

    pub fn compute_layout(&self, root: NodeId, expanded: &BTreeSet<NodeId>) -> DomainResult<Layout> {
        self.layout.compute(&self.store, root, expanded)
    }

    fn apply_policy(&mut self, operation: &str, id: NodeId, policy: &CascadePolicy) -> DomainResult<Vec<Node>> {
        let changes = self.cascade.apply_cascade(&self.store, id, policy)?;
        if changes.is_empty() {
            return Ok(Vec::new());
        }
        Self::mutate(&mut self.store, operation, |tx| CascadeEngine::commit(tx, &changes))
    }

    /// Run `op` transactionally and report the nodes it changed.
    ///
    /// Takes the store alone so `op` may borrow the other engine fields.
    fn mutate<F>(store: &mut TreeStore, operation: &str, op: F) -> DomainResult<Vec<Node>>
    where
        F: FnOnce(&mut TreeStore) -> DomainResult<()>,
    {
        let ((), changed) = store.transact_tracked(operation, op)?;
        debug!(operation, changed = changed.len(), "committed");
        Ok(changed)
    }
}
