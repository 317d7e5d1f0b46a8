//! Flat profile projection.
//!
//! Derives a one-level view from a call tree: a synthetic root carrying the
//! weight directly and indirectly caused by a target label, with one row per
//! label reached underneath it. Recursion is collapsed to a single
//! activation — a label's total weight is folded in only the first time it is
//! seen inside the current activation, so recursive and repeated sibling
//! occurrences cannot double-count.

use std::collections::HashMap;

use super::call_tree::{CallTree, CallTreeNode, DepthVisitor, NodeId};

/// Project `tree` into a flat profile.
///
/// With a target label, the result is a tree whose root holds the target's
/// aggregate weight and whose children are the per-label rows. Without one,
/// the whole program is projected and the aggregate node itself becomes the
/// root, dropping the extra nesting level.
///
/// Total weights must be valid, so the source tree is recomputed on demand.
pub fn flat_profile(tree: &mut CallTree, label: Option<&str>) -> CallTree {
    tree.compute_total_weights();

    let target = label.unwrap_or(CallTree::ROOT_LABEL);
    let mut out = CallTree::new();
    let out_root = out.find_or_add_child(out.root(), target);
    let mut projector = FlatProjector {
        out,
        out_root,
        target: target.to_string(),
        activations: HashMap::from([(target.to_string(), 0)]),
    };
    tree.traverse_in_depth(&mut projector);

    let FlatProjector { mut out, out_root, .. } = projector;
    if label.is_none() {
        out.set_root(out_root);
    } else {
        // Mirror the aggregate onto the sentinel root so percentages have a
        // base at every level.
        let sentinel = out.root();
        out.copy_weights(out_root, sentinel);
    }
    // Weights were accumulated directly; a tree-sum recompute would clobber
    // the collapsed totals.
    out.mark_totals_valid();
    out
}

/// Depth-first visitor accumulating the flat rows.
struct FlatProjector {
    out: CallTree,
    out_root: NodeId,
    target: String,
    /// Per-label activation depth within the current walk.
    activations: HashMap<String, u64>,
}

impl DepthVisitor for FlatProjector {
    fn on_enter(&mut self, node: &CallTreeNode) {
        self.activations
            .entry(node.label().to_string())
            .or_insert(0);
        let is_target = node.label() == self.target;
        let target_active = self.activations[&self.target] > 0;
        if !(is_target || target_active) {
            return;
        }

        if !target_active {
            // This node is the first activation of the target: its weight
            // belongs to the aggregate root itself.
            self.out
                .add_weights(self.out_root, node.self_weight(), node.total_weight());
        } else {
            let row = self.out.find_or_add_child(self.out_root, node.label());
            // Self weight always accumulates; total weight only on the first
            // sighting of this label within the activation.
            let first_sighting = is_target || self.activations[node.label()] == 0;
            let total = if first_sighting { node.total_weight() } else { 0 };
            self.out.add_weights(row, node.self_weight(), total);
        }
        if let Some(depth) = self.activations.get_mut(node.label()) {
            *depth += 1;
        }
    }

    fn on_exit(&mut self, node: &CallTreeNode) {
        if node.label() == self.target || self.activations[&self.target] > 0 {
            if let Some(depth) = self.activations.get_mut(node.label()) {
                *depth -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_recursion_counts_total_once() {
        let mut tree = CallTree::new();
        tree.add_path(&["A", "A", "A"]);

        let flat = flat_profile(&mut tree, None);
        let a = flat.find_child(flat.root(), "A").unwrap();

        // Three activations of A, but its total weight is attributed once.
        assert_eq!(flat.node(a).self_weight(), 1);
        assert_eq!(flat.node(a).total_weight(), 1);
        assert_eq!(flat.node(flat.root()).total_weight(), 1);
    }

    #[test]
    fn test_whole_program_flat_reuses_aggregate_as_root() {
        let mut tree = CallTree::new();
        tree.add_path(&["A", "B"]);
        tree.add_path(&["A"]);
        tree.add_path(&["C"]);

        let flat = flat_profile(&mut tree, None);

        assert_eq!(flat.node(flat.root()).label(), CallTree::ROOT_LABEL);
        assert_eq!(flat.node(flat.root()).total_weight(), 3);
        assert_eq!(flat.node(flat.root()).child_count(), 3);

        let a = flat.find_child(flat.root(), "A").unwrap();
        assert_eq!(flat.node(a).self_weight(), 1);
        assert_eq!(flat.node(a).total_weight(), 2);
        let b = flat.find_child(flat.root(), "B").unwrap();
        assert_eq!(flat.node(b).self_weight(), 1);
        assert_eq!(flat.node(b).total_weight(), 1);
    }

    #[test]
    fn test_labeled_flat_profile_scopes_to_target() {
        let mut tree = CallTree::new();
        tree.add_path(&["A", "B", "C"]);
        tree.add_path(&["D"]);
        tree.add_path(&["A", "B"]);

        let flat = flat_profile(&mut tree, Some("B"));

        // The sentinel root mirrors the aggregate "B" node.
        let root = flat.root();
        assert_eq!(flat.node(root).total_weight(), 2);
        let b = flat.find_child(root, "B").unwrap();
        assert_eq!(flat.node(b).self_weight(), 1);
        assert_eq!(flat.node(b).total_weight(), 2);
        let c = flat.find_child(b, "C").unwrap();
        assert_eq!(flat.node(c).total_weight(), 1);
        // "D" is outside the target's activation and contributes nothing.
        assert!(flat.find_child(b, "D").is_none());
        assert!(flat.find_child(b, "A").is_none());
    }

    #[test]
    fn test_sibling_repeats_merge_rows() {
        let mut tree = CallTree::new();
        tree.add_path(&["A", "B"]);
        tree.add_path(&["C", "B"]);

        let flat = flat_profile(&mut tree, None);
        let b = flat.find_child(flat.root(), "B").unwrap();

        // Two sibling occurrences of B merge into one row; each is a first
        // sighting within the activation, so both totals accumulate.
        assert_eq!(flat.node(b).self_weight(), 2);
        assert_eq!(flat.node(b).total_weight(), 2);
    }
}
