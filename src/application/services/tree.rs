//! Versioned tree service
//!
//! Wraps a [`TreeEngine`] behind a lock and a monotonically increasing
//! version. Writers may pass the version they last observed; a stale version
//! is rejected with `Conflict` before anything is touched.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use termtree::Tree;
use tracing::{debug, error, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::render::{render_subtree, TreeRender};
use crate::domain::{
    AttrsPatch, DeleteImpact, DomainError, DomainResult, EmployeeRef, EngineConfig, Layout,
    ModuleToggle, Node, NodeAttrs, NodeId, NodeKind, TreeEngine, TreeSnapshot, TreeStore,
};

/// Result of a successful mutation together with the version it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub version: u64,
    pub value: T,
}

#[derive(Debug)]
struct State {
    version: u64,
    engine: TreeEngine,
}

/// Service owning the tree state.
#[derive(Debug)]
pub struct TreeService {
    state: RwLock<State>,
}

impl Default for TreeService {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl TreeService {
    /// Create a service over an empty forest at version 0.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_store(TreeStore::new(), 0, config)
    }

    pub fn with_store(store: TreeStore, version: u64, config: EngineConfig) -> Self {
        Self {
            state: RwLock::new(State {
                version,
                engine: TreeEngine::new(store, config),
            }),
        }
    }

    /// Rebuild the service from a persisted snapshot.
    pub fn from_snapshot(snapshot: TreeSnapshot, config: EngineConfig) -> ApplicationResult<Self> {
        let version = snapshot.version;
        let store = snapshot.into_store()?;
        info!(version, nodes = store.len(), "tree loaded");
        Ok(Self::with_store(store, version, config))
    }

    pub fn snapshot(&self) -> ApplicationResult<TreeSnapshot> {
        let state = self.read_state()?;
        Ok(TreeSnapshot::from_store(state.engine.store(), state.version))
    }

    pub fn version(&self) -> ApplicationResult<u64> {
        Ok(self.read_state()?.version)
    }

    /// Run a read-only query against the engine.
    pub fn query<T, F>(&self, f: F) -> ApplicationResult<T>
    where
        F: FnOnce(&TreeEngine) -> DomainResult<T>,
    {
        let state = self.read_state()?;
        Ok(f(&state.engine)?)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, id: NodeId) -> ApplicationResult<Node> {
        self.query(|engine| engine.get(id).cloned())
    }

    pub fn children_of(&self, id: NodeId) -> ApplicationResult<Vec<Node>> {
        self.query(|engine| Ok(engine.children_of(id)?.into_iter().cloned().collect()))
    }

    pub fn roots(&self) -> ApplicationResult<Vec<Node>> {
        self.query(|engine| Ok(engine.store().roots().into_iter().cloned().collect()))
    }

    pub fn unassigned_employees(&self) -> ApplicationResult<Vec<EmployeeRef>> {
        self.query(|engine| Ok(engine.store().unassigned_employees().into_iter().cloned().collect()))
    }

    pub fn get_delete_impact(&self, id: NodeId) -> ApplicationResult<DeleteImpact> {
        self.query(|engine| engine.get_delete_impact(id))
    }

    pub fn compute_layout(&self, root: NodeId, expanded: &BTreeSet<NodeId>) -> ApplicationResult<Layout> {
        self.query(|engine| engine.compute_layout(root, expanded))
    }

    /// Render the whole forest, or only the subtree under `root`.
    pub fn render(&self, root: Option<NodeId>) -> ApplicationResult<Tree<String>> {
        self.query(|engine| match root {
            Some(id) => render_subtree(engine.store(), id),
            None => Ok(engine.store().to_tree_string()),
        })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn create_node(
        &self,
        expected_version: Option<u64>,
        parent_id: Option<NodeId>,
        kind: NodeKind,
        after_order: Option<i64>,
        attrs: NodeAttrs,
    ) -> ApplicationResult<Committed<Node>> {
        self.mutate("create", expected_version, |engine| {
            engine.create_node(parent_id, kind, after_order, attrs)
        })
    }

    pub fn update_node(
        &self,
        expected_version: Option<u64>,
        id: NodeId,
        patch: AttrsPatch,
    ) -> ApplicationResult<Committed<Node>> {
        self.mutate("update", expected_version, |engine| engine.update_node(id, patch))
    }

    pub fn move_node(
        &self,
        expected_version: Option<u64>,
        id: NodeId,
        new_parent: NodeId,
    ) -> ApplicationResult<Committed<Vec<Node>>> {
        self.mutate("move", expected_version, |engine| engine.move_node(id, new_parent))
    }

    pub fn reorder_siblings(
        &self,
        expected_version: Option<u64>,
        a: NodeId,
        b: NodeId,
    ) -> ApplicationResult<Committed<Vec<Node>>> {
        self.mutate("reorder", expected_version, |engine| engine.reorder_siblings(a, b))
    }

    pub fn toggle_module(
        &self,
        expected_version: Option<u64>,
        id: NodeId,
        toggle: ModuleToggle,
    ) -> ApplicationResult<Committed<Vec<Node>>> {
        self.mutate("toggle", expected_version, |engine| engine.toggle_module(id, toggle))
    }

    pub fn set_active(
        &self,
        expected_version: Option<u64>,
        id: NodeId,
        active: bool,
    ) -> ApplicationResult<Committed<Node>> {
        self.mutate("set-active", expected_version, |engine| engine.set_active(id, active))
    }

    pub fn set_subtree_active(
        &self,
        expected_version: Option<u64>,
        id: NodeId,
        active: bool,
    ) -> ApplicationResult<Committed<Vec<Node>>> {
        self.mutate("set-subtree-active", expected_version, |engine| {
            engine.set_subtree_active(id, active)
        })
    }

    pub fn assign_employee(
        &self,
        expected_version: Option<u64>,
        unit: NodeId,
        employee: EmployeeRef,
    ) -> ApplicationResult<Committed<Vec<Node>>> {
        self.mutate("assign", expected_version, |engine| engine.assign_employee(unit, employee))
    }

    pub fn unassign_employee(
        &self,
        expected_version: Option<u64>,
        employee: &EmployeeRef,
    ) -> ApplicationResult<Committed<Vec<Node>>> {
        self.mutate("unassign", expected_version, |engine| engine.unassign_employee(employee))
    }

    pub fn delete_node(
        &self,
        expected_version: Option<u64>,
        id: NodeId,
        confirmation: &str,
    ) -> ApplicationResult<Committed<DeleteImpact>> {
        self.mutate("delete", expected_version, |engine| engine.delete_node(id, confirmation))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Check the version, run `f` and bump the version if it changed the tree.
    #[instrument(level = "debug", skip(self, f))]
    fn mutate<T, F>(
        &self,
        operation: &str,
        expected_version: Option<u64>,
        f: F,
    ) -> ApplicationResult<Committed<T>>
    where
        F: FnOnce(&mut TreeEngine) -> DomainResult<T>,
    {
        let mut state = self.write_state()?;
        if let Some(expected) = expected_version {
            if expected != state.version {
                let err = DomainError::Conflict {
                    expected,
                    actual: state.version,
                };
                warn!(operation, error = %err, "rejected stale write");
                return Err(err.into());
            }
        }
        let revision = state.engine.store().revision();
        match f(&mut state.engine) {
            Ok(value) if state.engine.store().revision() == revision => {
                debug!(operation, version = state.version, "nothing changed");
                Ok(Committed {
                    version: state.version,
                    value,
                })
            }
            Ok(value) => {
                state.version += 1;
                info!(operation, version = state.version, "committed");
                Ok(Committed {
                    version: state.version,
                    value,
                })
            }
            Err(e) if e.is_user_facing() => {
                warn!(operation, error = %e, "rejected");
                Err(e.into())
            }
            Err(e) => {
                error!(operation, error = %e, "internal error, state rolled back");
                Err(e.into())
            }
        }
    }

    fn read_state(&self) -> ApplicationResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| ApplicationError::LockPoisoned)
    }

    fn write_state(&self) -> ApplicationResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| ApplicationError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrgUnitAttrs, OrgUnitPatch, UnitType};

    fn company() -> NodeAttrs {
        NodeAttrs::OrgUnit(OrgUnitAttrs::new("Acme", "AC", UnitType::Company))
    }

    #[test]
    fn test_successful_mutation_bumps_version() {
        let service = TreeService::default();
        let committed = service
            .create_node(Some(0), None, NodeKind::OrgUnit, None, company())
            .unwrap();
        assert_eq!(committed.version, 1);
        assert_eq!(service.version().unwrap(), 1);
    }

    #[test]
    fn test_stale_version_is_conflict_and_changes_nothing() {
        let service = TreeService::default();
        service.create_node(None, None, NodeKind::OrgUnit, None, company()).unwrap();

        let err = service
            .create_node(Some(0), None, NodeKind::OrgUnit, None, company())
            .unwrap_err();

        assert!(matches!(
            err.as_domain(),
            Some(DomainError::Conflict { expected: 0, actual: 1 })
        ));
        assert_eq!(service.roots().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_mutation_keeps_version() {
        let service = TreeService::default();
        let err = service.move_node(None, NodeId::new(), NodeId::new()).unwrap_err();
        assert!(err.as_domain().is_some());
        assert_eq!(service.version().unwrap(), 0);
    }

    #[test]
    fn test_noop_mutations_keep_version() {
        let service = TreeService::default();
        let acme = service
            .create_node(None, None, NodeKind::OrgUnit, None, company())
            .unwrap()
            .value
            .id;

        let patch = AttrsPatch::OrgUnit(OrgUnitPatch {
            name: Some("Acme".into()),
            ..OrgUnitPatch::default()
        });
        let updated = service.update_node(Some(1), acme, patch).unwrap();
        let activated = service.set_active(Some(1), acme, true).unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(activated.version, 1);
        assert_eq!(service.version().unwrap(), 1);
    }
}
