//! Newtype wrappers for the identifiers flowing through the event stream.
//!
//! The instrumented runtime reports raw machine addresses; everything else
//! (function ids, script ids) is assigned by this crate. Wrapping them keeps
//! the ingestion API self-documenting and prevents mixing an address up with
//! an offset or an id.

use std::fmt;

/// A raw code address reported by the instrumented runtime.
///
/// Addresses are opaque keys into the code map; no pointer arithmetic is
/// performed on them beyond range containment and offset calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

impl Address {
    /// Byte offset of `self` from `base`. Callers must ensure `base <= self`.
    #[must_use]
    pub fn offset_from(self, base: Address) -> u64 {
        self.0 - base.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Address(raw)
    }
}

/// Index of a [`FunctionRecord`](crate::symbolization::FunctionRecord) in the
/// registry's function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

/// Identity of a script as assigned by the instrumented runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ScriptId(pub u32);

/// Event timestamp in nanoseconds, passed through unchanged.
pub type TimestampNs = u64;

/// Opaque VM state tag recorded with each sample, passed through unchanged.
pub type VmState = u8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_is_hex() {
        assert_eq!(Address(0x1a2b).to_string(), "0x1a2b");
    }

    #[test]
    fn test_offset_from() {
        assert_eq!(Address(0x150).offset_from(Address(0x100)), 0x50);
    }
}
