//! Generic address-interval map.
//!
//! Entries live in three banks: libraries and static code are registered once
//! and never move, while dynamic code is churned constantly by the runtime
//! (inserted, moved, replaced, deleted). Keeping the banks separate lets
//! containment lookups give static code priority over the dynamic entries
//! that may later be laid down at the same addresses.
//!
//! The map is generic over the entry type so that both the live registry and
//! the export accumulator can reuse the same interval mechanics with their
//! own payloads.

use std::collections::BTreeMap;

use crate::domain::{Address, CodeMapError};

/// Anything storable in a [`CodeMap`]. The size drives containment checks;
/// zero-sized entries are only reachable by exact start-address lookup.
pub trait CodeSpan {
    fn size(&self) -> u64;
}

/// Interval map from start address to code entry.
#[derive(Debug, Clone)]
pub struct CodeMap<E> {
    dynamics: BTreeMap<u64, E>,
    statics: BTreeMap<u64, E>,
    libraries: BTreeMap<u64, E>,
}

impl<E> Default for CodeMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> CodeMap<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dynamics: BTreeMap::new(),
            statics: BTreeMap::new(),
            libraries: BTreeMap::new(),
        }
    }

    /// Number of live dynamic entries.
    #[must_use]
    pub fn dynamic_count(&self) -> usize {
        self.dynamics.len()
    }

    /// Exact start-address lookup among dynamic entries. This is the only way
    /// to reach zero-sized entries.
    #[must_use]
    pub fn find_dynamic_by_start(&self, addr: Address) -> Option<&E> {
        self.dynamics.get(&addr.0)
    }

    pub fn find_dynamic_by_start_mut(&mut self, addr: Address) -> Option<&mut E> {
        self.dynamics.get_mut(&addr.0)
    }

    /// All dynamic (start address, entry) pairs in address order.
    pub fn dynamic_entries(&self) -> impl Iterator<Item = (Address, &E)> {
        self.dynamics.iter().map(|(&addr, entry)| (Address(addr), entry))
    }
}

impl<E: CodeSpan> CodeMap<E> {
    /// Register a library mapping. Libraries never move or get deleted.
    pub fn add_library(&mut self, start: Address, entry: E) {
        self.libraries.insert(start.0, entry);
    }

    /// Register a static code range. Statics never move or get deleted.
    pub fn add_static_code(&mut self, start: Address, entry: E) {
        self.statics.insert(start.0, entry);
    }

    /// Insert a dynamic code entry, evicting any dynamic entries whose start
    /// falls inside the new entry's range. The runtime reuses freed address
    /// space without always reporting the intervening deletes.
    pub fn add_code(&mut self, start: Address, entry: E) {
        self.evict_covered(start.0, start.0.saturating_add(entry.size()));
        self.dynamics.insert(start.0, entry);
    }

    /// Relocate the dynamic entry at `from` to `to`, evicting entries the
    /// relocated range now covers.
    ///
    /// # Errors
    /// Returns [`CodeMapError::UnknownAddress`] if nothing starts at `from`;
    /// the map is left unchanged.
    pub fn move_code(&mut self, from: Address, to: Address) -> Result<(), CodeMapError> {
        let entry = self
            .dynamics
            .remove(&from.0)
            .ok_or(CodeMapError::UnknownAddress(from))?;
        self.evict_covered(to.0, to.0.saturating_add(entry.size()));
        self.dynamics.insert(to.0, entry);
        Ok(())
    }

    /// Remove and return the dynamic entry starting at `start`.
    ///
    /// # Errors
    /// Returns [`CodeMapError::UnknownAddress`] if nothing starts there.
    pub fn delete_code(&mut self, start: Address) -> Result<E, CodeMapError> {
        self.dynamics
            .remove(&start.0)
            .ok_or(CodeMapError::UnknownAddress(start))
    }

    /// Containment lookup across all banks, returning the entry together with
    /// the offset of `addr` within it. Static code shadows libraries, which
    /// shadow dynamic code.
    #[must_use]
    pub fn find_address(&self, addr: Address) -> Option<(&E, u64)> {
        for bank in [&self.statics, &self.libraries, &self.dynamics] {
            if let Some((start, entry)) = Self::find_in_bank(bank, addr.0) {
                return Some((entry, addr.0 - start));
            }
        }
        None
    }

    /// Containment lookup returning just the entry.
    #[must_use]
    pub fn find_entry(&self, addr: Address) -> Option<&E> {
        self.find_address(addr).map(|(entry, _)| entry)
    }

    fn find_in_bank(bank: &BTreeMap<u64, E>, addr: u64) -> Option<(u64, &E)> {
        let (&start, entry) = bank.range(..=addr).next_back()?;
        (addr - start < entry.size()).then_some((start, entry))
    }

    fn evict_covered(&mut self, start: u64, end: u64) {
        let covered: Vec<u64> = self.dynamics.range(start..end).map(|(&a, _)| a).collect();
        for addr in covered {
            self.dynamics.remove(&addr);
        }
    }
}
