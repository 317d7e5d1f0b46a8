//! Structured error types for tickscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//!
//! Nothing in this crate treats a malformed event as fatal: code-map failures
//! are caught at the registry layer and routed to the session's unknown-code
//! hook, so only the export writer surfaces errors to the caller.

use super::types::Address;
use thiserror::Error;

/// Failures from the address-interval code map.
///
/// Always recoverable: a failed move or delete leaves prior state unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeMapError {
    #[error("no dynamic code entry starts at {0}")]
    UnknownAddress(Address),
}

/// Failures while writing the profile JSON artifact.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
