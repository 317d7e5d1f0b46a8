//! # Tickscope - VM Tick Profile Aggregation
//!
//! Tickscope turns a stream of low-level virtual-machine profiling events
//! (code creation, code movement, function renames, stack-sampled ticks) into
//! queryable call-tree profiles and a machine-readable JSON export. It is the
//! aggregation half of a sampling profiler: something else produces the event
//! log; this crate symbolicates, aggregates, and reports.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       VM Event Stream                           │
//! │   (code creation / move / delete, function renames, ticks)      │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!            ┌────────────┴────────────┐
//!            ▼                         ▼
//! ┌─────────────────────┐   ┌─────────────────────┐
//! │       Profile       │   │   ProfileExporter   │
//! │   (live queries)    │   │   (JSON snapshot)   │
//! └──────────┬──────────┘   └──────────┬──────────┘
//!            │                         │
//!            ▼                         ▼
//! ┌─────────────────────┐   ┌─────────────────────┐
//! │  Symbolization      │   │  Incremental JSON   │
//! │  (CodeMap/Registry) │   │  (code/funcs/ticks) │
//! └──────────┬──────────┘   └─────────────────────┘
//!            ▼
//! ┌─────────────────────┐
//! │  Analysis           │
//! │  (call trees, flat  │
//! │   profiles, ranking)│
//! └─────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`symbolization`]: Convert raw code addresses to named entries
//!   - `code_map`: Banked interval map over non-overlapping address ranges
//!   - `registry`: Dynamic/static/library code entries and shared function
//!     records with rename and garbage-collection support
//!
//! - [`analysis`]: Aggregation structures built from symbolicated ticks
//!   - `call_tree`: Weighted call trees with label-keyed children
//!   - `flat_profile`: Per-function projection with recursion accounting
//!   - `entry_ranking`: Native-entry tick ranking with a TOTAL row
//!
//! - [`profiling`]: The live [`profiling::Profile`] session object that ties
//!   ingestion, symbolication, and aggregation together
//!
//! - [`export`]: The [`export::ProfileExporter`] accumulator that records
//!   every event as it happens and serializes a complete JSON document
//!
//! - [`scripts`]: Script sources and lazy line/column resolution
//!
//! - [`domain`]: Core domain types (Address, FuncId, ScriptId) and errors
//!
//! ## Key Concepts
//!
//! - **Code entry**: A named, sized machine-code range produced by the VM
//! - **Function record**: The stable identity behind one or more code entries
//!   (a function may be compiled and re-optimized many times)
//! - **Tick**: One stack sample, a timestamp, a VM state, and a list of
//!   raw frame addresses from innermost to outermost
//! - **Bottom-up tree**: Paths inserted innermost-first (callee at the top)
//! - **Top-down tree**: The same paths reversed (caller at the top)

pub mod analysis;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod scripts;
pub mod symbolization;
