//! Code registry: domain rules for the mutable code address space.
//!
//! The registry owns every live [`CodeEntity`] through its interval map, plus
//! an arena of [`FunctionRecord`]s — the logical function identities that
//! outlive individual compiled bodies. A function address holds a zero-sized
//! `Function` placeholder entity in the map; the record itself lives in the
//! arena so several compiled bodies can share it by id.
//!
//! Rules applied on top of the raw map:
//! - libraries and static code are always inserted fresh;
//! - a function-code event whose start, size, and owning function all match
//!   an existing entry is an optimization-state change, updated in place;
//! - anything else at that start address is stale and replaced;
//! - a repeated function definition under a new name renames the record in
//!   place (the export accumulator deliberately diverges here, see
//!   `export::json_profile`).

use crate::domain::{Address, CodeMapError, FuncId};

use super::code_map::{CodeMap, CodeSpan};

/// Optimization state of a compiled function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeState {
    Compiled,
    Optimizable,
    Optimized,
}

impl CodeState {
    /// Display prefix composed into function-code names.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            CodeState::Compiled => "",
            CodeState::Optimizable => "~",
            CodeState::Optimized => "*",
        }
    }
}

/// A logical function identity, independent of its compiled bodies.
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    name: String,
    /// Set only by [`CodeRegistry::sweep_function_records`], never implicitly.
    used: bool,
}

impl FunctionRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            used: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One addressable unit of code tracked by the registry.
#[derive(Debug, Clone)]
pub enum CodeEntity {
    /// A shared library mapping.
    Library { name: String, size: u64 },
    /// Statically compiled (native) code.
    StaticCode { name: String, size: u64 },
    /// Runtime-generated code with no function identity (stubs, regexp code).
    DynamicCode { kind: String, name: String, size: u64 },
    /// A compiled body of a logical function.
    DynamicFuncCode {
        kind: String,
        size: u64,
        func: FuncId,
        state: CodeState,
    },
    /// Zero-sized placeholder occupying a function's address; the record
    /// lives in the registry's arena.
    Function(FuncId),
}

impl CodeSpan for CodeEntity {
    fn size(&self) -> u64 {
        match self {
            CodeEntity::Library { size, .. }
            | CodeEntity::StaticCode { size, .. }
            | CodeEntity::DynamicCode { size, .. }
            | CodeEntity::DynamicFuncCode { size, .. } => *size,
            CodeEntity::Function(_) => 0,
        }
    }
}

impl CodeEntity {
    /// True for statically compiled (native) code.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, CodeEntity::StaticCode { .. })
    }

    /// True for library mappings.
    #[must_use]
    pub fn is_library(&self) -> bool {
        matches!(self, CodeEntity::Library { .. })
    }

    /// Bare name of a static entry, without the display composition. Native
    /// entry accounting is keyed by this.
    #[must_use]
    pub fn static_name(&self) -> Option<&str> {
        match self {
            CodeEntity::StaticCode { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Registry of all live code entities and function records for one session.
#[derive(Debug, Default)]
pub struct CodeRegistry {
    map: CodeMap<CodeEntity>,
    functions: Vec<FunctionRecord>,
}

impl CodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared library mapping covering `[start, end)`.
    pub fn add_library(&mut self, name: &str, start: Address, end: Address) {
        let entity = CodeEntity::Library {
            name: name.to_string(),
            size: end.offset_from(start),
        };
        self.map.add_library(start, entity);
    }

    /// Register a static (native) code range covering `[start, end)`.
    pub fn add_static_code(&mut self, name: &str, start: Address, end: Address) {
        let entity = CodeEntity::StaticCode {
            name: name.to_string(),
            size: end.offset_from(start),
        };
        self.map.add_static_code(start, entity);
    }

    /// Register runtime-generated code with no function identity. Always a
    /// fresh entry; covered stale entries are evicted by the map.
    pub fn add_code(&mut self, kind: &str, name: &str, start: Address, size: u64) {
        let entity = CodeEntity::DynamicCode {
            kind: kind.to_string(),
            name: name.to_string(),
            size,
        };
        self.map.add_code(start, entity);
    }

    /// Register a compiled body of a logical function.
    ///
    /// The function record at `func_addr` is looked up or created, renaming
    /// in place when the reported name changed. If the body at `start` has
    /// identical size and owning function, only its optimization state is
    /// updated; otherwise any stale entry there is dropped and a fresh body
    /// inserted.
    pub fn add_func_code(
        &mut self,
        kind: &str,
        name: &str,
        start: Address,
        size: u64,
        func_addr: Address,
        state: CodeState,
    ) {
        let func_id = self.ensure_function(name, func_addr);

        let matches_existing = matches!(
            self.map.find_dynamic_by_start(start),
            Some(CodeEntity::DynamicFuncCode {
                size: existing_size,
                func,
                ..
            }) if *existing_size == size && *func == func_id
        );

        if matches_existing {
            if let Some(CodeEntity::DynamicFuncCode {
                state: existing_state,
                ..
            }) = self.map.find_dynamic_by_start_mut(start)
            {
                *existing_state = state;
            }
        } else {
            if self.map.find_dynamic_by_start(start).is_some() {
                // Stale body from an earlier compilation; never an error.
                let _ = self.map.delete_code(start);
            }
            self.map.add_code(
                start,
                CodeEntity::DynamicFuncCode {
                    kind: kind.to_string(),
                    size,
                    func: func_id,
                    state,
                },
            );
        }
    }

    fn ensure_function(&mut self, name: &str, func_addr: Address) -> FuncId {
        if let Some(CodeEntity::Function(id)) = self.map.find_dynamic_by_start(func_addr) {
            let id = *id;
            if self.functions[id.0].name != name {
                // The function object was overwritten with a new one; keep
                // the record but take over its name.
                self.functions[id.0].name = name.to_string();
            }
            return id;
        }
        let id = FuncId(self.functions.len());
        self.functions.push(FunctionRecord::new(name));
        self.map.add_code(func_addr, CodeEntity::Function(id));
        id
    }

    /// Relocate dynamic code.
    ///
    /// # Errors
    /// Fails with [`CodeMapError::UnknownAddress`] when nothing starts at
    /// `from`; the registry is left unchanged.
    pub fn move_code(&mut self, from: Address, to: Address) -> Result<(), CodeMapError> {
        self.map.move_code(from, to)
    }

    /// Remove dynamic code.
    ///
    /// # Errors
    /// Fails with [`CodeMapError::UnknownAddress`] when nothing starts at
    /// `start`.
    pub fn delete_code(&mut self, start: Address) -> Result<(), CodeMapError> {
        self.map.delete_code(start).map(|_| ())
    }

    /// Containment lookup; see [`CodeMap::find_entry`].
    #[must_use]
    pub fn find_entry(&self, addr: Address) -> Option<&CodeEntity> {
        self.map.find_entry(addr)
    }

    /// Containment lookup returning the offset within the entity as well.
    #[must_use]
    pub fn find_address(&self, addr: Address) -> Option<(&CodeEntity, u64)> {
        self.map.find_address(addr)
    }

    /// Exact start-address lookup among dynamic entries.
    #[must_use]
    pub fn find_dynamic_by_start(&self, addr: Address) -> Option<&CodeEntity> {
        self.map.find_dynamic_by_start(addr)
    }

    /// Number of live dynamic entries, function placeholders included.
    #[must_use]
    pub fn dynamic_count(&self) -> usize {
        self.map.dynamic_count()
    }

    #[must_use]
    pub fn function(&self, id: FuncId) -> &FunctionRecord {
        &self.functions[id.0]
    }

    /// Display name of an entity, with type and state composition applied.
    #[must_use]
    pub fn entity_name(&self, entity: &CodeEntity) -> String {
        match entity {
            CodeEntity::Library { name, .. } => name.clone(),
            CodeEntity::StaticCode { name, .. } => format!("CPP: {name}"),
            CodeEntity::DynamicCode { kind, name, .. } => format!("{kind}: {name}"),
            CodeEntity::DynamicFuncCode {
                kind, func, state, ..
            } => {
                format!("{kind}: {}{}", state.prefix(), self.functions[func.0].name)
            }
            CodeEntity::Function(id) => self.functions[id.0].name.clone(),
        }
    }

    /// Drop function placeholders no compiled body references anymore.
    ///
    /// Explicit two-pass mark-and-sweep: clear all marks, mark every record
    /// referenced by a live `DynamicFuncCode` body, then delete unmarked
    /// `Function` placeholders from the map. Only ever runs when the caller
    /// asks for compaction.
    pub fn sweep_function_records(&mut self) {
        for record in &mut self.functions {
            record.used = false;
        }

        let live: Vec<FuncId> = self
            .map
            .dynamic_entries()
            .filter_map(|(_, entity)| match entity {
                CodeEntity::DynamicFuncCode { func, .. } => Some(*func),
                _ => None,
            })
            .collect();
        for id in live {
            self.functions[id.0].used = true;
        }

        let orphans: Vec<Address> = self
            .map
            .dynamic_entries()
            .filter_map(|(addr, entity)| match entity {
                CodeEntity::Function(id) if !self.functions[id.0].used => Some(addr),
                _ => None,
            })
            .collect();
        for addr in orphans {
            let _ = self.map.delete_code(addr);
        }
    }
}
