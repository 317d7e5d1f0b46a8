//! Weighted call tree.
//!
//! Nodes are call-path labels; a parent holds at most one child per label, so
//! inserting the same path twice merges into one chain. Each node carries a
//! self weight (samples that ended exactly at this path) and a derived total
//! weight that is only valid after [`CallTree::compute_total_weights`] — any
//! path insertion invalidates it again.
//!
//! Nodes live in an arena indexed by [`NodeId`]; child maps are
//! insertion-ordered so traversal order is deterministic.

use std::collections::VecDeque;

use indexmap::IndexMap;

/// Index of a node within its [`CallTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

/// A single call-path node.
#[derive(Debug, Clone)]
pub struct CallTreeNode {
    label: String,
    self_weight: u64,
    total_weight: u64,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
}

impl CallTreeNode {
    fn new(label: &str, parent: Option<NodeId>) -> Self {
        Self {
            label: label.to_string(),
            self_weight: 0,
            total_weight: 0,
            parent,
            children: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Samples where this exact path was the deepest resolved frame.
    #[must_use]
    pub fn self_weight(&self) -> u64 {
        self.self_weight
    }

    /// Self weight plus all descendants' total weight. Valid only after
    /// [`CallTree::compute_total_weights`].
    #[must_use]
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Parent back-reference for upward-only walks; `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// A call tree rooted at a sentinel node with an empty label.
#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
    root: NodeId,
    dirty: bool,
}

/// Depth-first visitor with explicit enter/exit callbacks.
pub trait DepthVisitor {
    fn on_enter(&mut self, node: &CallTreeNode);
    fn on_exit(&mut self, node: &CallTreeNode);
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    /// Label of the sentinel root node.
    pub const ROOT_LABEL: &'static str = "";

    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![CallTreeNode::new(Self::ROOT_LABEL, None)],
            root: NodeId(0),
            dirty: true,
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &CallTreeNode {
        &self.nodes[id.0]
    }

    /// Child of `parent` with the given label, if present.
    #[must_use]
    pub fn find_child(&self, parent: NodeId, label: &str) -> Option<NodeId> {
        self.nodes[parent.0].children.get(label).copied()
    }

    /// Child node ids of `parent` in insertion order.
    pub fn children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[parent.0].children.values().copied()
    }

    /// Find or create the child of `parent` carrying `label`.
    pub fn find_or_add_child(&mut self, parent: NodeId, label: &str) -> NodeId {
        if let Some(&existing) = self.nodes[parent.0].children.get(label) {
            return existing;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(CallTreeNode::new(label, Some(parent)));
        self.nodes[parent.0]
            .children
            .insert(label.to_string(), id);
        id
    }

    /// Insert a call path, merging by label at each level and incrementing
    /// the terminal node's self weight. Invalidates total weights.
    pub fn add_path<S: AsRef<str>>(&mut self, path: &[S]) {
        let mut current = self.root;
        for label in path {
            current = self.find_or_add_child(current, label.as_ref());
        }
        self.nodes[current.0].self_weight += 1;
        self.dirty = true;
    }

    /// Recompute every node's total weight. No-op when already valid.
    pub fn compute_total_weights(&mut self) {
        if !self.dirty {
            return;
        }
        self.compute_total(self.root);
        self.dirty = false;
    }

    fn compute_total(&mut self, id: NodeId) -> u64 {
        let children: Vec<NodeId> = self.nodes[id.0].children.values().copied().collect();
        let mut total = self.nodes[id.0].self_weight;
        for child in children {
            total += self.compute_total(child);
        }
        self.nodes[id.0].total_weight = total;
        total
    }

    /// Build a new tree aggregating every node matching `label`, wherever it
    /// occurs, with self weights merged and their subtrees re-parented under
    /// the match. Used to zoom into a function regardless of where it recurs.
    #[must_use]
    pub fn clone_subtree(&self, label: &str) -> CallTree {
        let mut sub = CallTree::new();
        self.traverse(|node, parent: Option<NodeId>| {
            if parent.is_none() && node.label() != label {
                // Keep descending; a match deeper down still contributes.
                return None;
            }
            let attach_to = parent.unwrap_or(sub.root);
            let child = sub.find_or_add_child(attach_to, node.label());
            sub.nodes[child.0].self_weight += node.self_weight;
            Some(child)
        });
        sub.dirty = true;
        sub
    }

    /// Breadth-first traversal. The visitor receives each node together with
    /// the accumulator value its parent's visit returned, which is enough to
    /// build a parallel derived tree in one pass.
    pub fn traverse<T, F>(&self, mut visit: F)
    where
        T: Copy,
        F: FnMut(&CallTreeNode, Option<T>) -> Option<T>,
    {
        let mut queue: VecDeque<(NodeId, Option<T>)> = VecDeque::new();
        queue.push_back((self.root, None));
        while let Some((id, param)) = queue.pop_front() {
            let node = &self.nodes[id.0];
            let next = visit(node, param);
            for &child in node.children.values() {
                queue.push_back((child, next));
            }
        }
    }

    /// Depth-first traversal with enter/exit callbacks.
    pub fn traverse_in_depth<V: DepthVisitor>(&self, visitor: &mut V) {
        self.depth_walk(self.root, visitor);
    }

    fn depth_walk<V: DepthVisitor>(&self, id: NodeId, visitor: &mut V) {
        visitor.on_enter(&self.nodes[id.0]);
        for child in self.children(id).collect::<Vec<_>>() {
            self.depth_walk(child, visitor);
        }
        visitor.on_exit(&self.nodes[id.0]);
    }

    /// Labels from `id` up to (excluding) the root, innermost first.
    #[must_use]
    pub fn path_to_root(&self, id: NodeId) -> Vec<&str> {
        let mut labels = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            if node.parent.is_some() {
                labels.push(node.label());
            }
            current = node.parent;
        }
        labels
    }

    pub(crate) fn add_weights(&mut self, id: NodeId, self_delta: u64, total_delta: u64) {
        let node = &mut self.nodes[id.0];
        node.self_weight += self_delta;
        node.total_weight += total_delta;
    }

    pub(crate) fn copy_weights(&mut self, from: NodeId, to: NodeId) {
        let (self_weight, total_weight) = {
            let node = &self.nodes[from.0];
            (node.self_weight, node.total_weight)
        };
        let node = &mut self.nodes[to.0];
        node.self_weight = self_weight;
        node.total_weight = total_weight;
    }

    /// Declare the currently stored total weights valid. Used by projections
    /// that accumulate totals directly instead of tree-summing them.
    pub(crate) fn mark_totals_valid(&mut self) {
        self.dirty = false;
    }

    /// Re-root the tree at `id`, detaching it from its parent. Used by the
    /// whole-program flat profile to drop one synthetic nesting level.
    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.nodes[id.0].parent = None;
        self.root = id;
    }
}
