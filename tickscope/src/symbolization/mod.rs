//! # Address Resolution
//!
//! This module turns the raw addresses carried by runtime events into code
//! entities with human-readable names.
//!
//! The address space is mutable and event-ordered: generated code can be
//! moved, replaced in place, or deleted mid-stream, and a function's logical
//! identity outlives any single compiled body for it. Resolution therefore
//! goes through two layers:
//!
//! - **`code_map`**: a generic interval map from start address to code span.
//!   It knows nothing about profiling; it only answers "which span contains
//!   this address" and applies move/replace/delete mechanics.
//!
//! - **`registry`**: the domain rules layered on top. It decides when a new
//!   function body replaces an old one versus updating its optimization
//!   state, keeps the arena of logical function records, composes display
//!   names, and offers the explicit mark-and-sweep that drops function
//!   records no compiled body references anymore.

pub mod code_map;
pub mod registry;

pub use code_map::{CodeMap, CodeSpan};
pub use registry::{CodeEntity, CodeRegistry, CodeState, FunctionRecord};
