//! Arena-backed tree store
//!
//! Nodes live in a generational arena and are addressed externally by
//! [`NodeId`]. Parent links and ordered child lists are kept redundantly so
//! traversal is cheap in both directions. Every public mutation runs inside
//! [`TreeStore::transact`]: it is applied to a staged copy, the invariants are
//! re-checked and only then is the copy committed.

use std::collections::{BTreeMap, HashSet};

use generational_arena::{Arena, Index};
use tracing::{debug, error, instrument};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{AttrsPatch, EmployeeRef, Node, NodeAttrs, NodeId, NodeKind};

/// In-memory forest of typed nodes plus the employee registry.
#[derive(Debug, Clone)]
pub struct TreeStore {
    /// Arena storage for all tree nodes
    arena: Arena<Node>,
    /// External id to arena slot
    index: BTreeMap<NodeId, Index>,
    /// Root ids sorted by `order`
    roots: Vec<NodeId>,
    /// Every known employee and the unit it is attached to
    employees: BTreeMap<EmployeeRef, Option<NodeId>>,
    /// Bumped by every committed transaction that changed something
    revision: u64,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            index: BTreeMap::new(),
            roots: Vec::new(),
            employees: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Number of committed transactions that changed the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).and_then(|&idx| self.arena.get(idx))
    }

    #[instrument(level = "trace", skip(self))]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let idx = *self.index.get(&id)?;
        self.arena.get_mut(idx)
    }

    pub fn get(&self, id: NodeId) -> DomainResult<&Node> {
        self.node(id).ok_or(DomainError::NotFound(id))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> DomainResult<&mut Node> {
        self.node_mut(id).ok_or(DomainError::NotFound(id))
    }

    /// Root nodes in `order`.
    pub fn roots(&self) -> Vec<&Node> {
        self.roots.iter().filter_map(|&id| self.node(id)).collect()
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    /// Children of `id` sorted by `order`; empty for leaves.
    pub fn children_of(&self, id: NodeId) -> DomainResult<Vec<&Node>> {
        let node = self.get(id)?;
        Ok(node
            .children
            .iter()
            .filter_map(|&child| self.node(child))
            .collect())
    }

    /// Ids sharing `parent` (the root list when `parent` is `None`).
    pub(crate) fn sibling_ids(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(pid) => self.node(pid).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => &self.roots,
        }
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> DomainResult<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut current = self.get(id)?.parent_id;
        while let Some(pid) = current {
            // a chain longer than the store means a corrupted parent link
            if result.len() > self.len() {
                return Err(DomainError::InvariantViolation(format!(
                    "parent chain of {} does not terminate",
                    id
                )));
            }
            result.push(pid);
            current = self.get(pid)?.parent_id;
        }
        Ok(result)
    }

    /// All descendants of `id` in pre-order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> DomainResult<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self.subtree(id)?.map(|(sid, _)| sid).collect();
        ids.remove(0);
        Ok(ids)
    }

    /// Pre-order iterator over the subtree rooted at `id`, including `id`.
    pub fn subtree(&self, id: NodeId) -> DomainResult<TreeIterator<'_>> {
        self.get(id)?;
        Ok(TreeIterator::new(self, vec![id]))
    }

    /// Pre-order iterator over the whole forest.
    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self, self.roots.clone())
    }

    /// Post-order iterator over the whole forest (children before parents).
    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self, self.roots.clone())
    }

    /// Number of levels in the deepest tree, 0 for an empty store.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.iter()
            .map(|(_, node)| node.level as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Ids of nodes without children.
    pub fn leaf_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.is_leaf())
            .map(|(id, _)| id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `op` against a staged copy and commit only if it succeeds and all
    /// invariants still hold. The store is unchanged on any error.
    pub fn transact<T, F>(&mut self, operation: &str, op: F) -> DomainResult<T>
    where
        F: FnOnce(&mut TreeStore) -> DomainResult<T>,
    {
        self.transact_tracked(operation, op).map(|(value, _)| value)
    }

    /// Like [`transact`](Self::transact), also returning the nodes that were
    /// added or modified, in pre-order.
    pub fn transact_tracked<T, F>(&mut self, operation: &str, op: F) -> DomainResult<(T, Vec<Node>)>
    where
        F: FnOnce(&mut TreeStore) -> DomainResult<T>,
    {
        let mut staged = self.clone();
        let value = op(&mut staged)?;
        if let Err(e) = staged.check_invariants() {
            error!(operation, error = %e, "rolling back: invariant check failed");
            return Err(e);
        }
        let changed = staged.changed_since(self);
        if !changed.is_empty() || !staged.same_shape(self) {
            staged.revision = self.revision + 1;
        }
        *self = staged;
        Ok((value, changed))
    }

    /// Same node set, root order and employee registry. Node contents are
    /// compared by [`changed_since`](Self::changed_since).
    fn same_shape(&self, other: &TreeStore) -> bool {
        self.index.len() == other.index.len()
            && self.index.keys().eq(other.index.keys())
            && self.roots == other.roots
            && self.employees == other.employees
    }

    /// Nodes present in `self` that differ from `before`, in pre-order.
    pub fn changed_since(&self, before: &TreeStore) -> Vec<Node> {
        self.iter()
            .filter(|(id, node)| before.node(*id) != Some(*node))
            .map(|(_, node)| node.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Insert / update
    // ------------------------------------------------------------------

    /// Insert a new node below `parent_id`, immediately after the sibling
    /// with `after_order` (append when `None`).
    pub fn insert(
        &mut self,
        parent_id: Option<NodeId>,
        after_order: Option<i64>,
        attrs: NodeAttrs,
    ) -> DomainResult<NodeId> {
        let id = NodeId::new();
        self.insert_with_id(id, parent_id, after_order, attrs)?;
        Ok(id)
    }

    pub fn insert_with_id(
        &mut self,
        id: NodeId,
        parent_id: Option<NodeId>,
        after_order: Option<i64>,
        attrs: NodeAttrs,
    ) -> DomainResult<()> {
        debug!(%id, ?parent_id, ?after_order, kind = %attrs.kind(), "insert");
        self.transact("insert", |tx| {
            let level = tx.validate_placement(id, parent_id, &attrs)?;
            let order = tx.make_room(parent_id, after_order)?;
            tx.attach_node(Node {
                id,
                parent_id,
                level,
                order,
                employee_count: attrs.direct_employee_count(),
                attrs,
                children: Vec::new(),
            })
        })
    }

    /// Level the new node will get; checks parent existence, kind and employee ownership.
    fn validate_placement(
        &self,
        id: NodeId,
        parent_id: Option<NodeId>,
        attrs: &NodeAttrs,
    ) -> DomainResult<u32> {
        if self.contains(id) {
            return Err(DomainError::InvalidSnapshot(format!("duplicate node id {}", id)));
        }
        let level = match parent_id {
            Some(pid) => {
                let parent = self.node(pid).ok_or(DomainError::InvalidParent(pid))?;
                if parent.kind() != attrs.kind() {
                    return Err(DomainError::KindMismatch {
                        id: pid,
                        expected: parent.kind(),
                        actual: attrs.kind(),
                    });
                }
                if let NodeAttrs::Module(module) = attrs {
                    if module.is_enabled() {
                        if let Some(ancestor) = self.first_disabled_in_chain(pid)? {
                            return Err(DomainError::ParentDisabled { id, ancestor });
                        }
                    }
                }
                parent.level + 1
            }
            None => 0,
        };
        if let NodeAttrs::OrgUnit(unit) = attrs {
            for employee in &unit.employee_ids {
                if let Some(Some(owner)) = self.employees.get(employee) {
                    return Err(DomainError::EmployeeAlreadyAssigned {
                        employee: employee.clone(),
                        unit: *owner,
                    });
                }
            }
        }
        Ok(level)
    }

    /// Pick an order value after `after_order`, shifting later siblings up to keep orders unique.
    fn make_room(&mut self, parent: Option<NodeId>, after_order: Option<i64>) -> DomainResult<i64> {
        let after = match after_order {
            None => return self.next_order(parent),
            Some(after) => after,
        };
        let overflow = DomainError::OrderOverflow { parent, after };
        let order = after.checked_add(1).ok_or_else(|| overflow.clone())?;
        let siblings = self.sibling_ids(parent).to_vec();
        // sorted by order, so only the last one can run out of room
        if let Some(last) = siblings.last().and_then(|&sid| self.node(sid)) {
            if last.order == i64::MAX {
                return Err(overflow);
            }
        }
        for sid in siblings {
            if let Some(sibling) = self.node_mut(sid) {
                if sibling.order >= order {
                    sibling.order += 1;
                }
            }
        }
        Ok(order)
    }

    /// Order value that appends after the last sibling.
    pub(crate) fn next_order(&self, parent: Option<NodeId>) -> DomainResult<i64> {
        match self.sibling_ids(parent).last().and_then(|&sid| self.node(sid)) {
            None => Ok(0),
            Some(last) => last
                .order
                .checked_add(1)
                .ok_or(DomainError::OrderOverflow { parent, after: last.order }),
        }
    }

    /// Store a fully formed node: register its employees, link it under its
    /// parent and add its direct employees to the ancestor aggregates.
    pub(crate) fn attach_node(&mut self, node: Node) -> DomainResult<()> {
        let id = node.id;
        let parent_id = node.parent_id;
        let direct = node.attrs.direct_employee_count();
        if let NodeAttrs::OrgUnit(unit) = &node.attrs {
            for employee in &unit.employee_ids {
                self.employees.insert(employee.clone(), Some(id));
            }
        }
        let idx = self.arena.insert(node);
        self.index.insert(id, idx);
        self.link_child(parent_id, id)?;
        if let Some(pid) = parent_id {
            self.adjust_employee_count(pid, direct as i64)?;
        }
        Ok(())
    }

    /// Apply a partial update of the node's attributes.
    pub fn update(&mut self, id: NodeId, patch: AttrsPatch) -> DomainResult<&Node> {
        debug!(%id, kind = %patch.kind(), "update");
        self.transact("update", |tx| tx.get_mut(id)?.attrs.apply(id, patch))?;
        self.get(id)
    }

    // ------------------------------------------------------------------
    // Structural primitives used by the engine inside transactions
    // ------------------------------------------------------------------

    /// Insert `id` into its sibling list at the position given by its order.
    fn link_child(&mut self, parent: Option<NodeId>, id: NodeId) -> DomainResult<()> {
        let order = self.get(id)?.order;
        let siblings = self.sibling_ids(parent);
        let pos = siblings
            .iter()
            .position(|&sid| self.node(sid).is_some_and(|n| n.order > order))
            .unwrap_or(siblings.len());
        match parent {
            Some(pid) => self.get_mut(pid)?.children.insert(pos, id),
            None => self.roots.insert(pos, id),
        }
        Ok(())
    }

    fn unlink_child(&mut self, parent: Option<NodeId>, id: NodeId) -> DomainResult<()> {
        match parent {
            Some(pid) => self.get_mut(pid)?.children.retain(|&c| c != id),
            None => self.roots.retain(|&c| c != id),
        }
        Ok(())
    }

    /// Add `delta` to the employee aggregate of `start` and all of its ancestors.
    fn adjust_employee_count(&mut self, start: NodeId, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Ok(());
        }
        let mut current = Some(start);
        while let Some(id) = current {
            let node = self.get_mut(id)?;
            let updated = node.employee_count as i64 + delta;
            if updated < 0 {
                return Err(DomainError::InvariantViolation(format!(
                    "employee count of {} would become negative",
                    id
                )));
            }
            node.employee_count = updated as usize;
            current = node.parent_id;
        }
        Ok(())
    }

    /// Detach `id` from its parent and append it as the last child of `new_parent`.
    pub(crate) fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> DomainResult<()> {
        let (old_parent, count) = {
            let node = self.get(id)?;
            (node.parent_id, node.employee_count)
        };
        let new_level = self.node(new_parent).ok_or(DomainError::InvalidParent(new_parent))?.level + 1;

        if let Some(op) = old_parent {
            self.adjust_employee_count(op, -(count as i64))?;
        }
        self.unlink_child(old_parent, id)?;

        let order = self.next_order(Some(new_parent))?;
        {
            let node = self.get_mut(id)?;
            node.parent_id = Some(new_parent);
            node.order = order;
        }
        self.link_child(Some(new_parent), id)?;
        self.relevel(id, new_level)?;
        self.adjust_employee_count(new_parent, count as i64)
    }

    /// Reassign levels in the subtree of `id`, with `id` landing on `level`.
    fn relevel(&mut self, id: NodeId, level: u32) -> DomainResult<()> {
        let base = self.get(id)?.level;
        if base == level {
            return Ok(());
        }
        let ids: Vec<NodeId> = self.subtree(id)?.map(|(sid, _)| sid).collect();
        for sid in ids {
            let node = self.get_mut(sid)?;
            node.level = node.level - base + level;
        }
        Ok(())
    }

    /// Exchange the order values (and list positions) of two siblings.
    pub(crate) fn swap_order(&mut self, a: NodeId, b: NodeId) -> DomainResult<()> {
        let (parent, order_a) = {
            let node = self.get(a)?;
            (node.parent_id, node.order)
        };
        let order_b = self.get(b)?.order;
        self.get_mut(a)?.order = order_b;
        self.get_mut(b)?.order = order_a;

        let siblings = match parent {
            Some(pid) => &mut self.get_mut(pid)?.children,
            None => &mut self.roots,
        };
        let pos_a = siblings.iter().position(|&s| s == a);
        let pos_b = siblings.iter().position(|&s| s == b);
        match (pos_a, pos_b) {
            (Some(pa), Some(pb)) => {
                siblings.swap(pa, pb);
                Ok(())
            }
            _ => Err(DomainError::InvariantViolation(format!(
                "{} and {} missing from their sibling list",
                a, b
            ))),
        }
    }

    /// Remove the subtree rooted at `id`; employees of removed units become unassigned.
    ///
    /// Returns the removed nodes in pre-order.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> DomainResult<Vec<Node>> {
        let (parent, count) = {
            let node = self.get(id)?;
            (node.parent_id, node.employee_count)
        };
        let ids: Vec<NodeId> = self.subtree(id)?.map(|(sid, _)| sid).collect();

        if let Some(pid) = parent {
            self.adjust_employee_count(pid, -(count as i64))?;
        }
        self.unlink_child(parent, id)?;

        let mut removed = Vec::with_capacity(ids.len());
        for sid in ids {
            let idx = self
                .index
                .remove(&sid)
                .ok_or(DomainError::NotFound(sid))?;
            let node = self.arena.remove(idx).ok_or(DomainError::NotFound(sid))?;
            if let NodeAttrs::OrgUnit(unit) = &node.attrs {
                for employee in &unit.employee_ids {
                    self.employees.insert(employee.clone(), None);
                }
            }
            removed.push(node);
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Employees
    // ------------------------------------------------------------------

    /// Make an employee known without attaching it. Returns false if already known.
    pub fn register_employee(&mut self, employee: EmployeeRef) -> bool {
        if self.employees.contains_key(&employee) {
            return false;
        }
        self.employees.insert(employee, None);
        true
    }

    /// `None` for unknown employees, `Some(None)` for unassigned ones.
    pub fn employee_assignment(&self, employee: &EmployeeRef) -> Option<Option<NodeId>> {
        self.employees.get(employee).copied()
    }

    pub fn employees(&self) -> impl Iterator<Item = (&EmployeeRef, Option<NodeId>)> {
        self.employees.iter().map(|(e, unit)| (e, *unit))
    }

    pub fn unassigned_employees(&self) -> Vec<&EmployeeRef> {
        self.employees
            .iter()
            .filter(|(_, unit)| unit.is_none())
            .map(|(e, _)| e)
            .collect()
    }

    /// Attach `employee` to `unit`, detaching it from any previous unit.
    pub(crate) fn assign_employee(&mut self, unit: NodeId, employee: EmployeeRef) -> DomainResult<()> {
        let kind = self.get(unit)?.kind();
        if kind != NodeKind::OrgUnit {
            return Err(DomainError::KindMismatch {
                id: unit,
                expected: NodeKind::OrgUnit,
                actual: kind,
            });
        }
        match self.employees.get(&employee).copied() {
            Some(Some(previous)) if previous == unit => return Ok(()),
            Some(Some(previous)) => self.detach_employee(previous, &employee)?,
            _ => {}
        }
        if let NodeAttrs::OrgUnit(attrs) = &mut self.get_mut(unit)?.attrs {
            attrs.employee_ids.insert(employee.clone());
        }
        self.employees.insert(employee, Some(unit));
        self.adjust_employee_count(unit, 1)
    }

    /// Detach `employee` from its unit. Returns the unit it was attached to.
    pub(crate) fn unassign_employee(&mut self, employee: &EmployeeRef) -> DomainResult<Option<NodeId>> {
        match self.employees.get(employee).copied() {
            None => Err(DomainError::UnknownEmployee(employee.clone())),
            Some(None) => Ok(None),
            Some(Some(unit)) => {
                self.detach_employee(unit, employee)?;
                Ok(Some(unit))
            }
        }
    }

    fn detach_employee(&mut self, unit: NodeId, employee: &EmployeeRef) -> DomainResult<()> {
        if let NodeAttrs::OrgUnit(attrs) = &mut self.get_mut(unit)?.attrs {
            attrs.employee_ids.remove(employee);
        }
        self.employees.insert(employee.clone(), None);
        self.adjust_employee_count(unit, -1)
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// First disabled module on the chain from `id` (inclusive) up to the root.
    pub fn first_disabled_in_chain(&self, id: NodeId) -> DomainResult<Option<NodeId>> {
        let node = self.get(id)?;
        if !node.is_enabled() {
            return Ok(Some(id));
        }
        for ancestor in self.ancestors(id)? {
            if !self.get(ancestor)?.is_enabled() {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Verify forest shape, levels, sibling orders, employee aggregates,
    /// the module enablement chain and the employee registry.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let violation = |msg: String| Err(DomainError::InvariantViolation(msg));

        if self.index.len() != self.arena.len() {
            return violation(format!(
                "index has {} entries but arena holds {} nodes",
                self.index.len(),
                self.arena.len()
            ));
        }
        for (&id, &idx) in &self.index {
            match self.arena.get(idx) {
                Some(node) if node.id == id => {}
                _ => return violation(format!("index entry {} points at a foreign slot", id)),
            }
        }

        self.check_sibling_list(None, &self.roots)?;

        // reachability from the roots rules out cycles and orphans
        let mut seen = HashSet::with_capacity(self.len());
        let mut stack: Vec<NodeId> = self.roots.clone();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return violation(format!("node {} reachable twice", id));
            }
            let node = self.get(id)?;
            match node.parent_id {
                None if node.level != 0 => {
                    return violation(format!("root {} has level {}", id, node.level));
                }
                None => {}
                Some(pid) => {
                    let parent = self.get(pid)?;
                    if node.level != parent.level + 1 {
                        return violation(format!(
                            "{} has level {} under parent on level {}",
                            id, node.level, parent.level
                        ));
                    }
                    if node.kind() != parent.kind() {
                        return violation(format!("{} differs in kind from its parent", id));
                    }
                    if node.is_enabled() && !parent.is_enabled() {
                        return violation(format!("module {} is enabled below disabled {}", id, pid));
                    }
                }
            }
            self.check_sibling_list(Some(id), &node.children)?;
            stack.extend(node.children.iter().copied());
        }
        if seen.len() != self.len() {
            return violation(format!(
                "{} of {} nodes are unreachable from the roots",
                self.len() - seen.len(),
                self.len()
            ));
        }

        for (id, node) in self.iter() {
            let expected = node.attrs.direct_employee_count()
                + node
                    .children
                    .iter()
                    .filter_map(|&c| self.node(c))
                    .map(|c| c.employee_count)
                    .sum::<usize>();
            if node.employee_count != expected {
                return violation(format!(
                    "{} reports {} employees, subtree holds {}",
                    id, node.employee_count, expected
                ));
            }
            if let NodeAttrs::OrgUnit(unit) = &node.attrs {
                for employee in &unit.employee_ids {
                    if self.employees.get(employee) != Some(&Some(id)) {
                        return violation(format!("employee {} of {} is not registered to it", employee, id));
                    }
                }
            }
        }
        for (employee, unit) in &self.employees {
            if let Some(uid) = unit {
                let holds = self
                    .node(*uid)
                    .and_then(|n| n.attrs.as_org_unit())
                    .is_some_and(|u| u.employee_ids.contains(employee));
                if !holds {
                    return violation(format!("employee {} registered to {} which does not hold it", employee, uid));
                }
            }
        }
        Ok(())
    }

    fn check_sibling_list(&self, parent: Option<NodeId>, siblings: &[NodeId]) -> DomainResult<()> {
        let mut previous: Option<i64> = None;
        for &sid in siblings {
            let sibling = self.node(sid).ok_or_else(|| {
                DomainError::InvariantViolation(format!("dangling child reference {}", sid))
            })?;
            if sibling.parent_id != parent {
                return Err(DomainError::InvariantViolation(format!(
                    "{} listed under {:?} but points at {:?}",
                    sid, parent, sibling.parent_id
                )));
            }
            if previous.is_some_and(|p| p >= sibling.order) {
                return Err(DomainError::InvariantViolation(format!(
                    "sibling orders under {:?} are not strictly increasing at {}",
                    parent, sid
                )));
            }
            previous = Some(sibling.order);
        }
        Ok(())
    }
}

/// Pre-order traversal, left to right.
pub struct TreeIterator<'a> {
    store: &'a TreeStore,
    stack: Vec<NodeId>,
}

impl<'a> TreeIterator<'a> {
    fn new(store: &'a TreeStore, mut starts: Vec<NodeId>) -> Self {
        starts.reverse();
        Self {
            store,
            stack: starts,
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.store.node(current) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current, node));
            }
        }
        None
    }
}

/// Post-order traversal: every node is yielded after all of its children.
pub struct PostOrderIterator<'a> {
    store: &'a TreeStore,
    stack: Vec<(NodeId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(store: &'a TreeStore, starts: Vec<NodeId>) -> Self {
        let stack = starts.into_iter().rev().map(|id| (id, false)).collect();
        Self { store, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.store.node(current) {
                if !visited {
                    self.stack.push((current, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current, node));
                }
            }
        }
        None
    }
}
