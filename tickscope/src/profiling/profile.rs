//! Profiling session: event ingestion and the query API.
//!
//! A [`Profile`] is one explicit session over a finite, already-captured
//! event log. Events must be applied in the exact order recorded — registry
//! mutations (replace vs update, move, delete) are history-dependent, and
//! reordering silently corrupts results. The session is single-writer and
//! not designed for concurrent mutation.
//!
//! The failure model is best-effort throughout: an event referencing unknown
//! code is reported to the session's [`ProfileDelegate`] and dropped, never
//! aborting ingestion. A tolerant profile over a partial or lossy log beats
//! no profile.

use std::collections::HashMap;

use log::debug;

use crate::analysis::{flat_profile, rank_native_entries, CallTree, CallTreeNode, EntryRank};
use crate::domain::{Address, ScriptId, TimestampNs, VmState};
use crate::scripts::{Script, ScriptTable};
use crate::symbolization::{CodeEntity, CodeRegistry, CodeState};

/// Placeholder label substituted for an unresolved program counter. Keeps
/// the sample counted even when its innermost frame is unknown.
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// The event that referenced an address the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOperation {
    Move,
    Delete,
    Tick,
}

/// Session hooks for non-fatal conditions and name filtering.
///
/// Every method has a tolerant default, so a delegate only overrides what it
/// cares about. Hooks are invoked synchronously at the failure site and
/// control always returns to the caller unchanged.
pub trait ProfileDelegate {
    /// An event referenced an address with no live code entry. For tick
    /// events, `stack_position` is the frame's index within the sample.
    fn handle_unknown_code(
        &mut self,
        operation: CodeOperation,
        address: Address,
        stack_position: Option<usize>,
    ) {
        debug!("unknown code for {operation:?} at {address} (frame {stack_position:?})");
    }

    /// Exclude a resolved name from tick paths. Runs after native-entry
    /// accounting, so filtering never skews the native table.
    fn skip_name(&mut self, _name: &str) -> bool {
        false
    }
}

/// Default delegate: log unknown code at debug level, keep every name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl ProfileDelegate for NoopDelegate {}

/// One in-memory profiling session.
pub struct Profile {
    registry: CodeRegistry,
    top_down: CallTree,
    bottom_up: CallTree,
    native_entries: HashMap<String, u64>,
    scripts: ScriptTable,
    delegate: Box<dyn ProfileDelegate>,
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}

impl Profile {
    #[must_use]
    pub fn new() -> Self {
        Self::with_delegate(Box::new(NoopDelegate))
    }

    #[must_use]
    pub fn with_delegate(delegate: Box<dyn ProfileDelegate>) -> Self {
        Self {
            registry: CodeRegistry::new(),
            top_down: CallTree::new(),
            bottom_up: CallTree::new(),
            native_entries: HashMap::new(),
            scripts: ScriptTable::new(),
            delegate,
        }
    }

    // === Code lifecycle events ===

    pub fn add_library(&mut self, name: &str, start: Address, end: Address) {
        self.registry.add_library(name, start, end);
    }

    pub fn add_static_code(&mut self, name: &str, start: Address, end: Address) {
        self.registry.add_static_code(name, start, end);
    }

    pub fn add_code(
        &mut self,
        kind: &str,
        name: &str,
        _timestamp: TimestampNs,
        start: Address,
        size: u64,
    ) {
        self.registry.add_code(kind, name, start, size);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_func_code(
        &mut self,
        kind: &str,
        name: &str,
        _timestamp: TimestampNs,
        start: Address,
        size: u64,
        func_addr: Address,
        state: CodeState,
    ) {
        self.registry
            .add_func_code(kind, name, start, size, func_addr, state);
    }

    /// Apply a code move. An unknown source address is reported to the
    /// delegate and otherwise ignored.
    pub fn move_code(&mut self, from: Address, to: Address) {
        if self.registry.move_code(from, to).is_err() {
            self.delegate
                .handle_unknown_code(CodeOperation::Move, from, None);
        }
    }

    /// Apply a code deletion. An unknown address is reported to the delegate
    /// and otherwise ignored.
    pub fn delete_code(&mut self, start: Address) {
        if self.registry.delete_code(start).is_err() {
            self.delegate
                .handle_unknown_code(CodeOperation::Delete, start, None);
        }
    }

    /// Drop function records no compiled body references anymore. Explicit
    /// compaction only; ingestion never triggers it.
    pub fn sweep_function_records(&mut self) {
        self.registry.sweep_function_records();
    }

    // === Sample events ===

    /// Record one stack sample. The raw addresses are resolved to a symbolic
    /// path which lands once in the bottom-up tree (sample order) and once,
    /// reversed, in the top-down tree (caller-to-callee order).
    pub fn record_tick(&mut self, _timestamp: TimestampNs, _vm_state: VmState, stack: &[Address]) {
        let path = self.resolve_and_filter(stack);
        self.bottom_up.add_path(&path);
        let reversed: Vec<&String> = path.iter().rev().collect();
        self.top_down.add_path(&reversed);
    }

    /// Symbolication pipeline for one sample.
    ///
    /// Unresolved addresses are reported to the delegate tagged with their
    /// stack position; only an unresolved program counter (position 0) is
    /// replaced by [`UNKNOWN_LABEL`] so the sample still counts — unresolved
    /// outer frames are dropped.
    ///
    /// Native-entry accounting: a sample whose innermost frame is native or
    /// library code starts a native run; the last static name seen while the
    /// run lasts gets exactly one tick when the run ends.
    fn resolve_and_filter(&mut self, stack: &[Address]) -> Vec<String> {
        let mut path = Vec::with_capacity(stack.len());
        let mut in_native_run = false;
        let mut last_native: Option<String> = None;

        for (position, &address) in stack.iter().enumerate() {
            let entity = self.registry.find_entry(address);
            match entity {
                Some(entity) => {
                    if position == 0 && (entity.is_static() || entity.is_library()) {
                        in_native_run = true;
                    }
                    if in_native_run {
                        if let Some(bare) = entity.static_name() {
                            last_native = Some(bare.to_string());
                        }
                    }
                    let name = self.registry.entity_name(entity);
                    if !self.delegate.skip_name(&name) {
                        path.push(name);
                    }
                }
                None => {
                    self.delegate
                        .handle_unknown_code(CodeOperation::Tick, address, Some(position));
                    if position == 0 {
                        path.push(UNKNOWN_LABEL.to_string());
                    }
                }
            }

            // Crossing out of the native run: credit its outermost static
            // name once and stop looking.
            if in_native_run && position > 0 && !matches!(entity, Some(e) if e.is_static()) {
                if let Some(name) = last_native.take() {
                    *self.native_entries.entry(name).or_insert(0) += 1;
                    in_native_run = false;
                }
            }
        }
        // A run that lasts to the end of the sample still leaves it here.
        if in_native_run {
            if let Some(name) = last_native.take() {
                *self.native_entries.entry(name).or_insert(0) += 1;
            }
        }
        path
    }

    // === Query API ===

    /// Top-down profile, optionally zoomed into every occurrence of `label`.
    pub fn top_down_profile(&mut self, label: Option<&str>) -> CallTree {
        Self::tree_profile(&mut self.top_down, label)
    }

    /// Bottom-up profile, optionally zoomed into every occurrence of `label`.
    pub fn bottom_up_profile(&mut self, label: Option<&str>) -> CallTree {
        Self::tree_profile(&mut self.bottom_up, label)
    }

    fn tree_profile(tree: &mut CallTree, label: Option<&str>) -> CallTree {
        match label {
            None => {
                tree.compute_total_weights();
                tree.clone()
            }
            Some(label) => {
                let mut sub = tree.clone_subtree(label);
                sub.compute_total_weights();
                sub
            }
        }
    }

    /// Flat profile over the top-down tree; see
    /// [`flat_profile`](crate::analysis::flat_profile).
    pub fn flat_profile(&mut self, label: Option<&str>) -> CallTree {
        flat_profile(&mut self.top_down, label)
    }

    /// Native entries ranked by attributed tick count.
    #[must_use]
    pub fn c_entry_profile(&self) -> Vec<EntryRank> {
        rank_native_entries(&self.native_entries)
    }

    /// Raw native-entry table: bare static name to tick count.
    #[must_use]
    pub fn native_entries(&self) -> &HashMap<String, u64> {
        &self.native_entries
    }

    /// Breadth-first traversal of the top-down tree; the visitor threads an
    /// accumulator from parent to children.
    pub fn traverse_top_down<T, F>(&self, visit: F)
    where
        T: Copy,
        F: FnMut(&CallTreeNode, Option<T>) -> Option<T>,
    {
        self.top_down.traverse(visit);
    }

    /// Breadth-first traversal of the bottom-up tree.
    pub fn traverse_bottom_up<T, F>(&self, visit: F)
    where
        T: Copy,
        F: FnMut(&CallTreeNode, Option<T>) -> Option<T>,
    {
        self.bottom_up.traverse(visit);
    }

    #[must_use]
    pub fn find_entry(&self, address: Address) -> Option<&CodeEntity> {
        self.registry.find_entry(address)
    }

    #[must_use]
    pub fn registry(&self) -> &CodeRegistry {
        &self.registry
    }

    // === Scripts ===

    pub fn add_script_source(&mut self, id: ScriptId, url: &str, source: &str) {
        self.scripts.add_source(id, url, source);
    }

    #[must_use]
    pub fn get_script(&self, url: &str) -> Option<&Script> {
        self.scripts.by_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Delegate recording every unknown-code report, shared with the test.
    #[derive(Default)]
    struct Recording {
        unknown: Rc<RefCell<Vec<(CodeOperation, Address, Option<usize>)>>>,
    }

    impl ProfileDelegate for Recording {
        fn handle_unknown_code(
            &mut self,
            operation: CodeOperation,
            address: Address,
            stack_position: Option<usize>,
        ) {
            self.unknown
                .borrow_mut()
                .push((operation, address, stack_position));
        }
    }

    fn recording_profile() -> (Profile, Rc<RefCell<Vec<(CodeOperation, Address, Option<usize>)>>>) {
        let recording = Recording::default();
        let log = Rc::clone(&recording.unknown);
        (Profile::with_delegate(Box::new(recording)), log)
    }

    #[test]
    fn test_static_tick_resolves_and_credits_native_entry() {
        let mut profile = Profile::new();
        profile.add_static_code("Native", Address(0x100), Address(0x110));
        profile.record_tick(1, 0, &[Address(0x105)]);

        let bottom_up = profile.bottom_up_profile(None);
        let node = bottom_up
            .find_child(bottom_up.root(), "CPP: Native")
            .unwrap();
        assert_eq!(bottom_up.node(node).self_weight(), 1);
        assert_eq!(profile.native_entries()["Native"], 1);
    }

    #[test]
    fn test_native_run_credits_outermost_static_name_once() {
        let mut profile = Profile::new();
        profile.add_static_code("inner", Address(0x100), Address(0x110));
        profile.add_static_code("outer", Address(0x110), Address(0x120));
        profile.add_code("JS", "managed", 0, Address(0x200), 0x10);
        // Innermost two frames are native, the third leaves the run.
        profile.record_tick(1, 0, &[Address(0x105), Address(0x115), Address(0x205)]);

        assert_eq!(profile.native_entries()["outer"], 1);
        assert!(!profile.native_entries().contains_key("inner"));
    }

    #[test]
    fn test_native_run_not_started_mid_stack() {
        let mut profile = Profile::new();
        profile.add_static_code("Native", Address(0x100), Address(0x110));
        profile.add_code("JS", "managed", 0, Address(0x200), 0x10);
        // Program counter is managed code; the native frame above it does
        // not open a run.
        profile.record_tick(1, 0, &[Address(0x205), Address(0x105)]);

        assert!(profile.native_entries().is_empty());
    }

    #[test]
    fn test_unknown_pc_becomes_placeholder_and_outer_frames_drop() {
        let (mut profile, log) = recording_profile();
        profile.add_code("JS", "known", 0, Address(0x200), 0x10);
        profile.record_tick(1, 0, &[Address(0x900), Address(0x205), Address(0x910)]);

        let bottom_up = profile.bottom_up_profile(None);
        let unknown = bottom_up.find_child(bottom_up.root(), UNKNOWN_LABEL).unwrap();
        let known = bottom_up.find_child(unknown, "JS: known").unwrap();
        // Frame 2 was unresolved and simply dropped.
        assert_eq!(bottom_up.node(known).self_weight(), 1);
        assert_eq!(bottom_up.node(known).child_count(), 0);

        let reports = log.borrow();
        assert_eq!(
            *reports,
            vec![
                (CodeOperation::Tick, Address(0x900), Some(0)),
                (CodeOperation::Tick, Address(0x910), Some(2)),
            ]
        );
    }

    #[test]
    fn test_unknown_move_reported_once_and_nonfatal() {
        let (mut profile, log) = recording_profile();
        profile.move_code(Address(0x500), Address(0x600));

        let reports = log.borrow();
        assert_eq!(*reports, vec![(CodeOperation::Move, Address(0x500), None)]);
    }

    #[test]
    fn test_unknown_delete_reported() {
        let (mut profile, log) = recording_profile();
        profile.delete_code(Address(0x500));

        assert_eq!(
            *log.borrow(),
            vec![(CodeOperation::Delete, Address(0x500), None)]
        );
    }

    #[test]
    fn test_tick_populates_both_trees_in_opposite_orders() {
        let mut profile = Profile::new();
        profile.add_code("JS", "inner", 0, Address(0x200), 0x10);
        profile.add_code("JS", "outer", 0, Address(0x300), 0x10);
        profile.record_tick(1, 0, &[Address(0x205), Address(0x305)]);

        let bottom_up = profile.bottom_up_profile(None);
        let inner = bottom_up.find_child(bottom_up.root(), "JS: inner").unwrap();
        assert!(bottom_up.find_child(inner, "JS: outer").is_some());

        let top_down = profile.top_down_profile(None);
        let outer = top_down.find_child(top_down.root(), "JS: outer").unwrap();
        assert!(top_down.find_child(outer, "JS: inner").is_some());
    }

    #[test]
    fn test_name_filter_runs_after_native_accounting() {
        struct SkipNative;
        impl ProfileDelegate for SkipNative {
            fn skip_name(&mut self, name: &str) -> bool {
                name.starts_with("CPP:")
            }
        }

        let mut profile = Profile::with_delegate(Box::new(SkipNative));
        profile.add_static_code("Native", Address(0x100), Address(0x110));
        profile.record_tick(1, 0, &[Address(0x105)]);

        // The name is filtered out of the path but the native table still
        // got its tick.
        let bottom_up = profile.bottom_up_profile(None);
        assert_eq!(bottom_up.node(bottom_up.root()).child_count(), 0);
        assert_eq!(bottom_up.node(bottom_up.root()).self_weight(), 1);
        assert_eq!(profile.native_entries()["Native"], 1);
    }

    #[test]
    fn test_moved_code_resolves_at_new_address() {
        let mut profile = Profile::new();
        profile.add_code("JS", "mover", 0, Address(0x200), 0x10);
        profile.move_code(Address(0x200), Address(0x400));
        profile.record_tick(1, 0, &[Address(0x405)]);

        let bottom_up = profile.bottom_up_profile(None);
        assert!(bottom_up.find_child(bottom_up.root(), "JS: mover").is_some());
    }

    #[test]
    fn test_scripts_round_trip() {
        let mut profile = Profile::new();
        profile.add_script_source(ScriptId(7), "app.js", "let x = 1;\n");

        let script = profile.get_script("app.js").unwrap();
        assert_eq!(script.id, ScriptId(7));
        assert!(profile.get_script("missing.js").is_none());
    }
}
