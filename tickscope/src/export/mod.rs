//! Profile export for offline tooling.
//!
//! This module provides the alternate, export-oriented session: instead of
//! accumulating query trees it records flat, stably-identified code, function
//! and tick records and serializes them as a single JSON artifact.

pub mod json_profile;

pub use json_profile::{CodeRecord, DeoptInfo, FunctionRow, ProfileExporter, SourceInfo, TickRow};
