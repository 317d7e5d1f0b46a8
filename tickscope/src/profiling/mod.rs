//! Profiling session orchestration.
//!
//! `profile` owns the per-session state (registry, call trees, native-entry
//! table, scripts) and applies each event from the captured log in order.

pub mod profile;

pub use profile::{CodeOperation, NoopDelegate, Profile, ProfileDelegate, UNKNOWN_LABEL};
