//! Aggregation of symbolic call paths into queryable views.
//!
//! - `call_tree`: the weighted tree every sample lands in, with merge-by-label
//!   path insertion and on-demand total-weight propagation
//! - `flat_profile`: one-level projection of a call tree with recursion
//!   collapsed to a single activation
//! - `entry_ranking`: native-entry tick counts ranked for display

pub mod call_tree;
pub mod entry_ranking;
pub mod flat_profile;

pub use call_tree::{CallTree, CallTreeNode, DepthVisitor, NodeId};
pub use entry_ranking::{rank_native_entries, EntryRank};
pub use flat_profile::flat_profile;
