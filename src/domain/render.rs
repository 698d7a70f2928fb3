//! Text rendering of trees via `termtree`

use itertools::Itertools;
use termtree::Tree;

use crate::domain::arena::TreeStore;
use crate::domain::error::DomainResult;
use crate::domain::node::{Node, NodeAttrs, NodeId};

pub trait TreeRender {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeRender for TreeStore {
    fn to_tree_string(&self) -> Tree<String> {
        let roots = self.root_ids();
        if roots.is_empty() {
            return Tree::new("Empty tree".to_string());
        }
        let leaves: Vec<Tree<String>> = roots
            .iter()
            .filter_map(|&root| render_subtree(self, root).ok())
            .collect();
        Tree::new(format!("{} nodes", self.len())).with_leaves(leaves)
    }
}

/// Render the subtree rooted at `id`.
pub fn render_subtree(store: &TreeStore, id: NodeId) -> DomainResult<Tree<String>> {
    fn build_tree(store: &TreeStore, node: &Node, parent_tree: &mut Tree<String>) {
        for &child_id in &node.children {
            if let Some(child) = store.node(child_id) {
                let mut child_tree = Tree::new(label(child));
                build_tree(store, child, &mut child_tree);
                parent_tree.push(child_tree);
            }
        }
    }

    let node = store.get(id)?;
    let mut tree = Tree::new(label(node));
    build_tree(store, node, &mut tree);
    Ok(tree)
}

/// One-line description of a node.
pub fn label(node: &Node) -> String {
    match &node.attrs {
        NodeAttrs::OrgUnit(unit) => {
            let mut s = format!(
                "{} [{}] {} ({} employees)",
                unit.name, unit.code, unit.unit_type, node.employee_count
            );
            if !unit.active {
                s.push_str(" inactive");
            }
            s
        }
        NodeAttrs::Module(module) => {
            let actions = if module.is_enabled() {
                module.enabled_actions.iter().join(",")
            } else {
                "disabled".to_string()
            };
            format!("{} <{}>", module.name, actions)
        }
    }
}
