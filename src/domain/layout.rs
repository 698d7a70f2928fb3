//! Layered tree layout for visualization export
//!
//! Ranks follow tree levels relative to the layout root. Nodes hidden behind
//! a collapsed parent are skipped entirely; a collapsed node is laid out as
//! a leaf.
//!
//! Algorithm steps:
//! 1. Pre-order walk of the expanded subtree, children ordered by `(order, id)`
//! 2. Leaves take evenly spaced slots left to right
//! 3. Internal nodes are centred on the mean x of their children (bottom-up)
//! 4. `y = rank * (node_height + rank_separation)`
//!
//! Same-rank nodes never overlap: leaf slots increase monotonically in
//! pre-order and every internal x lies within the span of its subtree's
//! leaves, so disjoint subtrees keep at least one slot width between them.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::arena::TreeStore;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::NodeId;

/// Layout dimensions in abstract canvas units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Minimum horizontal gap between neighbouring nodes of a rank
    pub sibling_separation: f64,
    /// Vertical gap between ranks
    pub rank_separation: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 160.0,
            node_height: 60.0,
            sibling_separation: 40.0,
            rank_separation: 80.0,
        }
    }
}

impl LayoutConfig {
    /// Distance between the centres of two adjacent leaf slots.
    pub fn slot_width(&self) -> f64 {
        self.node_width + self.sibling_separation
    }

    pub fn rank_height(&self) -> f64 {
        self.node_height + self.rank_separation
    }

    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("node_width", self.node_width),
            ("node_height", self.node_height),
            ("sibling_separation", self.sibling_separation),
            ("rank_separation", self.rank_separation),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("layout.{} must be a non-negative number, got {}", name, value));
            }
        }
        if self.slot_width() <= 0.0 {
            return Err("layout.node_width + layout.sibling_separation must be positive".into());
        }
        Ok(())
    }
}

/// Centre of a node on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
}

/// Renderable snapshot of an expanded subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub positions: BTreeMap<NodeId, Point>,
    /// Parent/child pairs of the visible subset, in pre-order
    pub edges: Vec<Edge>,
    /// Visible node ids per rank, left to right
    pub ranks: Vec<Vec<NodeId>>,
    pub width: f64,
    pub height: f64,
}

impl Layout {
    pub fn get(&self, id: NodeId) -> Option<&Point> {
        self.positions.get(&id)
    }

    pub fn rank_count(&self) -> usize {
        self.ranks.len()
    }
}

struct Slot {
    id: NodeId,
    rank: usize,
    children: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Lay out the subtree under `root`, descending only into `expanded` nodes.
    pub fn compute(
        &self,
        store: &TreeStore,
        root: NodeId,
        expanded: &BTreeSet<NodeId>,
    ) -> DomainResult<Layout> {
        store.get(root)?;
        let slots = Self::visible_preorder(store, root, expanded)?;

        // leaves in pre-order take consecutive slots
        let slot_width = self.config.slot_width();
        let mut xs = vec![0.0_f64; slots.len()];
        let mut next_leaf = 0_usize;
        for (i, slot) in slots.iter().enumerate() {
            if slot.children.is_empty() {
                xs[i] = next_leaf as f64 * slot_width;
                next_leaf += 1;
            }
        }
        // children follow their parent in pre-order, so reverse order is bottom-up
        for i in (0..slots.len()).rev() {
            let children = &slots[i].children;
            if !children.is_empty() {
                let sum: f64 = children.iter().map(|&c| xs[c]).sum();
                xs[i] = sum / children.len() as f64;
            }
        }

        let rank_height = self.config.rank_height();
        let mut positions = BTreeMap::new();
        let mut edges = Vec::new();
        let mut ranks: Vec<Vec<NodeId>> = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            positions.insert(
                slot.id,
                Point {
                    x: xs[i],
                    y: slot.rank as f64 * rank_height,
                },
            );
            if ranks.len() <= slot.rank {
                ranks.resize_with(slot.rank + 1, Vec::new);
            }
            ranks[slot.rank].push(slot.id);
            edges.extend(slot.children.iter().map(|&c| Edge {
                parent: slot.id,
                child: slots[c].id,
            }));
        }

        let width = next_leaf.saturating_sub(1) as f64 * slot_width + self.config.node_width;
        let height = ranks.len().saturating_sub(1) as f64 * rank_height + self.config.node_height;
        debug!(%root, nodes = slots.len(), ranks = ranks.len(), "layout computed");
        Ok(Layout {
            positions,
            edges,
            ranks,
            width,
            height,
        })
    }

    /// Pre-order slots of the visible tree with child links by slot index.
    fn visible_preorder(
        store: &TreeStore,
        root: NodeId,
        expanded: &BTreeSet<NodeId>,
    ) -> DomainResult<Vec<Slot>> {
        let mut slots: Vec<Slot> = Vec::new();
        // (node, rank, parent slot)
        let mut stack: Vec<(NodeId, usize, Option<usize>)> = vec![(root, 0, None)];
        while let Some((id, rank, parent)) = stack.pop() {
            let node = store.get(id)?;
            let index = slots.len();
            slots.push(Slot {
                id,
                rank,
                children: Vec::new(),
            });
            if let Some(p) = parent {
                slots[p].children.push(index);
            }
            if !expanded.contains(&id) {
                continue;
            }
            let children: Vec<NodeId> = node
                .children
                .iter()
                .map(|&c| store.get(c).map(|n| (n.order, c)))
                .collect::<DomainResult<Vec<_>>>()?
                .into_iter()
                .sorted()
                .map(|(_, c)| c)
                .collect();
            for child in children.into_iter().rev() {
                stack.push((child, rank + 1, Some(index)));
            }
        }
        if slots.len() > store.len() {
            return Err(DomainError::InvariantViolation(format!(
                "layout visited {} slots in a store of {} nodes",
                slots.len(),
                store.len()
            )));
        }
        Ok(slots)
    }
}
