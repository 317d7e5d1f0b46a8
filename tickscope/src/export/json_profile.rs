//! Export-oriented profile accumulator and its JSON writer.
//!
//! [`ProfileExporter`] mirrors the live session's ingestion contract but
//! skips tree construction entirely: every code entity is assigned a
//! monotonically increasing integer id at first sight, ticks are stored as
//! interleaved (code id, offset) pairs — or (-1, raw address) for frames the
//! map cannot resolve — and the whole session serializes to one JSON object
//! with `code`, `functions`, `ticks` and `scripts` keys, in that order.
//!
//! Two deliberate divergences from the live session:
//! - a static code entry later replaced by dynamic code keeps its id, so the
//!   artifact never lists the same address range twice;
//! - a function rename creates a *new* function record and leaves the old
//!   one's code-list history intact, where the live registry renames the
//!   record in place.
//!
//! Ticks are written one JSON value per line so the artifact can grow to
//! millions of samples without ever materializing the array as one string.

use std::io::Write;

use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{Address, ExportError, ScriptId, TimestampNs, VmState};
use crate::scripts::{Script, ScriptTable};
use crate::symbolization::{CodeMap, CodeSpan, CodeState};

/// One exported code entity.
#[derive(Debug, Clone, Serialize)]
pub struct CodeRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub code_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tm: Option<TimestampNs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deopt: Option<DeoptInfo>,
}

impl CodeRecord {
    fn new(name: &str, code_type: &str) -> Self {
        Self {
            name: name.to_string(),
            code_type: code_type.to_string(),
            kind: None,
            tm: None,
            func: None,
            source: None,
            deopt: None,
        }
    }
}

/// Source attachment for a code record.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub script: ScriptId,
    pub start: u32,
    pub end: u32,
    /// Encoded source-position table, passed through unchanged.
    pub positions: String,
    /// Encoded inlining-position table, passed through unchanged.
    pub inlined: String,
    /// Function ids of inlined functions; a slot is null when the reported
    /// address had no known function record.
    pub fns: Vec<Option<usize>>,
}

/// Deoptimization attachment for a code record.
#[derive(Debug, Clone, Serialize)]
pub struct DeoptInfo {
    pub tm: TimestampNs,
    #[serde(rename = "inliningId")]
    pub inlining_id: i32,
    #[serde(rename = "scriptOffset")]
    pub script_offset: u32,
    #[serde(rename = "posText")]
    pub pos_text: String,
    pub reason: String,
    #[serde(rename = "bailoutType")]
    pub bailout_type: String,
}

/// One exported function record: a name and the ids of its compiled bodies
/// in the order they appeared.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionRow {
    pub name: String,
    pub codes: Vec<usize>,
}

/// One exported stack sample. `s` interleaves (code id, offset) pairs, with
/// (-1, raw address) standing in for unresolved frames.
#[derive(Debug, Clone, Serialize)]
pub struct TickRow {
    pub tm: TimestampNs,
    pub vm: VmState,
    pub s: Vec<Value>,
}

/// Map payload for the exporter: size plus the ids the entry carries.
#[derive(Debug, Clone)]
struct ExportEntry {
    size: u64,
    role: ExportRole,
}

#[derive(Debug, Clone)]
enum ExportRole {
    Library { code_id: usize },
    Static { code_id: usize },
    Code { code_id: usize },
    FuncCode { code_id: usize, func: usize },
    /// Zero-sized placeholder at a function's address.
    Function { func: usize },
}

impl ExportRole {
    fn code_id(&self) -> Option<usize> {
        match self {
            ExportRole::Library { code_id }
            | ExportRole::Static { code_id }
            | ExportRole::Code { code_id }
            | ExportRole::FuncCode { code_id, .. } => Some(*code_id),
            ExportRole::Function { .. } => None,
        }
    }
}

impl CodeSpan for ExportEntry {
    fn size(&self) -> u64 {
        self.size
    }
}

/// Export-oriented profiling session.
#[derive(Debug, Default)]
pub struct ProfileExporter {
    map: CodeMap<ExportEntry>,
    code: Vec<CodeRecord>,
    functions: Vec<FunctionRow>,
    ticks: Vec<TickRow>,
    scripts: ScriptTable,
}

impl ProfileExporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Code lifecycle events ===

    pub fn add_library(&mut self, name: &str, start: Address, end: Address) {
        let code_id = self.code.len();
        self.code.push(CodeRecord::new(name, "SHARED_LIB"));
        self.map.add_library(
            start,
            ExportEntry {
                size: end.offset_from(start),
                role: ExportRole::Library { code_id },
            },
        );
    }

    pub fn add_static_code(&mut self, name: &str, start: Address, end: Address) {
        let code_id = self.code.len();
        self.code.push(CodeRecord::new(name, "CPP"));
        self.map.add_static_code(
            start,
            ExportEntry {
                size: end.offset_from(start),
                role: ExportRole::Static { code_id },
            },
        );
    }

    /// Register runtime-generated code. When a static entry already occupies
    /// the address its id is reused, so the artifact lists that range once.
    pub fn add_code(
        &mut self,
        kind: &str,
        name: &str,
        timestamp: TimestampNs,
        start: Address,
        size: u64,
    ) {
        let mut code_id = self.code.len();
        if let Some((entry, _)) = self.map.find_address(start) {
            if let ExportRole::Static { code_id: existing } = entry.role {
                code_id = existing;
            }
        }

        let mut record = CodeRecord::new(name, "CODE");
        record.kind = Some(kind.to_string());
        record.tm = Some(timestamp);
        if code_id == self.code.len() {
            self.code.push(record);
        } else {
            self.code[code_id] = record;
        }

        self.map.add_code(
            start,
            ExportEntry {
                size,
                role: ExportRole::Code { code_id },
            },
        );
    }

    /// Register a compiled function body. A rename creates a new function
    /// record, preserving the previous record's code-list history.
    #[allow(clippy::too_many_arguments)]
    pub fn add_func_code(
        &mut self,
        kind: &str,
        name: &str,
        timestamp: TimestampNs,
        start: Address,
        size: u64,
        func_addr: Address,
        _state: CodeState,
    ) {
        let func_id = self.ensure_function(name, func_addr);

        let up_to_date = matches!(
            self.map.find_dynamic_by_start(start),
            Some(ExportEntry {
                size: existing_size,
                role: ExportRole::FuncCode { func, .. },
            }) if *existing_size == size && *func == func_id
        );
        if up_to_date {
            // Only the optimization state changed; the record already
            // describes this body.
            return;
        }

        if self.map.find_dynamic_by_start(start).is_some() {
            let _ = self.map.delete_code(start);
        }

        let code_id = self.code.len();
        let mut record = CodeRecord::new(name, "JS");
        record.kind = Some(kind.to_string());
        record.tm = Some(timestamp);
        record.func = Some(func_id);
        self.code.push(record);
        self.functions[func_id].codes.push(code_id);

        self.map.add_code(
            start,
            ExportEntry {
                size,
                role: ExportRole::FuncCode { code_id, func: func_id },
            },
        );
    }

    fn ensure_function(&mut self, name: &str, func_addr: Address) -> usize {
        if let Some(ExportEntry {
            role: ExportRole::Function { func },
            ..
        }) = self.map.find_dynamic_by_start(func_addr)
        {
            let func = *func;
            if self.functions[func].name == name {
                return func;
            }
            // The function object was overwritten with a new one: start a
            // fresh record and keep the old one's history.
            let renamed = self.functions.len();
            self.functions.push(FunctionRow {
                name: name.to_string(),
                codes: Vec::new(),
            });
            if let Some(ExportEntry {
                role: ExportRole::Function { func },
                ..
            }) = self.map.find_dynamic_by_start_mut(func_addr)
            {
                *func = renamed;
            }
            return renamed;
        }

        let func = self.functions.len();
        self.functions.push(FunctionRow {
            name: name.to_string(),
            codes: Vec::new(),
        });
        self.map.add_code(
            func_addr,
            ExportEntry {
                size: 0,
                role: ExportRole::Function { func },
            },
        );
        func
    }

    /// Apply a code move; an unknown source is logged and ignored.
    pub fn move_code(&mut self, from: Address, to: Address) {
        if self.map.move_code(from, to).is_err() {
            warn!("move of unknown code at {from}");
        }
    }

    /// Apply a code deletion; an unknown address is logged and ignored.
    pub fn delete_code(&mut self, start: Address) {
        if self.map.delete_code(start).is_err() {
            warn!("delete of unknown code at {start}");
        }
    }

    /// Attach source positions to the code entry at `start`. Inlined
    /// function addresses are resolved to function ids; an address with no
    /// known function record nulls its slot and processing continues.
    #[allow(clippy::too_many_arguments)]
    pub fn add_source_positions(
        &mut self,
        start: Address,
        script: ScriptId,
        start_pos: u32,
        end_pos: u32,
        positions: &str,
        inlined_positions: &str,
        inlined_functions: &[Address],
    ) {
        let Some(code_id) = self
            .map
            .find_dynamic_by_start(start)
            .and_then(|entry| entry.role.code_id())
        else {
            return;
        };

        let fns = inlined_functions
            .iter()
            .map(|&func_addr| match self.map.find_dynamic_by_start(func_addr) {
                Some(ExportEntry {
                    role: ExportRole::Function { func },
                    ..
                }) => Some(*func),
                _ => {
                    warn!("inlined function reference to {func_addr} has no function record");
                    None
                }
            })
            .collect();

        self.code[code_id].source = Some(SourceInfo {
            script,
            start: start_pos,
            end: end_pos,
            positions: positions.to_string(),
            inlined: inlined_positions.to_string(),
            fns,
        });
    }

    /// Attach deoptimization info to the code entry at `code_addr`. Only the
    /// first deopt is kept; subsequent ones are lazy deopts of other
    /// on-stack activations.
    #[allow(clippy::too_many_arguments)]
    pub fn deopt_code(
        &mut self,
        timestamp: TimestampNs,
        code_addr: Address,
        inlining_id: i32,
        script_offset: u32,
        bailout_type: &str,
        pos_text: &str,
        reason: &str,
    ) {
        let Some(code_id) = self
            .map
            .find_dynamic_by_start(code_addr)
            .and_then(|entry| entry.role.code_id())
        else {
            return;
        };
        if self.code[code_id].deopt.is_none() {
            self.code[code_id].deopt = Some(DeoptInfo {
                tm: timestamp,
                inlining_id,
                script_offset,
                pos_text: pos_text.to_string(),
                reason: reason.to_string(),
                bailout_type: bailout_type.to_string(),
            });
        }
    }

    // === Sample events ===

    /// Record one stack sample as interleaved (code id, offset) pairs, with
    /// (-1, raw address) for unresolved frames. No filtering, no trees.
    pub fn record_tick(&mut self, timestamp: TimestampNs, vm_state: VmState, stack: &[Address]) {
        let mut s = Vec::with_capacity(stack.len() * 2);
        for &address in stack {
            match self
                .map
                .find_address(address)
                .and_then(|(entry, offset)| entry.role.code_id().map(|id| (id, offset)))
            {
                Some((code_id, offset)) => {
                    s.push(Value::from(i64::try_from(code_id).unwrap_or(-1)));
                    s.push(Value::from(offset));
                }
                None => {
                    s.push(Value::from(-1));
                    s.push(Value::from(address.0));
                }
            }
        }
        self.ticks.push(TickRow {
            tm: timestamp,
            vm: vm_state,
            s,
        });
    }

    // === Scripts ===

    pub fn add_script_source(&mut self, id: ScriptId, url: &str, source: &str) {
        self.scripts.add_source(id, url, source);
    }

    #[must_use]
    pub fn get_script(&self, url: &str) -> Option<&Script> {
        self.scripts.by_url(url)
    }

    // === Accessors for in-process consumers ===

    #[must_use]
    pub fn code_records(&self) -> &[CodeRecord] {
        &self.code
    }

    #[must_use]
    pub fn function_rows(&self) -> &[FunctionRow] {
        &self.functions
    }

    #[must_use]
    pub fn tick_rows(&self) -> &[TickRow] {
        &self.ticks
    }

    // === Serialization ===

    /// Write the profile artifact.
    ///
    /// The object's keys appear in the fixed order `code`, `functions`,
    /// `ticks`, `scripts`; ticks are emitted one JSON value per line to
    /// bound peak memory for very large sample counts.
    ///
    /// # Errors
    /// Fails on I/O or serialization errors from the underlying writer.
    pub fn write_json<W: Write>(&self, writer: &mut W) -> Result<(), ExportError> {
        writeln!(writer, "{{")?;
        writeln!(writer, "  \"code\": {},", serde_json::to_string(&self.code)?)?;
        writeln!(
            writer,
            "  \"functions\": {},",
            serde_json::to_string(&self.functions)?
        )?;
        writeln!(writer, "  \"ticks\": [")?;
        for (index, tick) in self.ticks.iter().enumerate() {
            let separator = if index + 1 < self.ticks.len() { "," } else { "" };
            writeln!(writer, "    {}{separator}", serde_json::to_string(tick)?)?;
        }
        writeln!(writer, "  ],")?;
        writeln!(
            writer,
            "  \"scripts\": {}",
            serde_json::to_string(&self.scripts)?
        )?;
        writeln!(writer, "}}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_ids_are_assigned_in_order() {
        let mut exporter = ProfileExporter::new();
        exporter.add_library("libfoo.so", Address(0x7000), Address(0x8000));
        exporter.add_static_code("Native", Address(0x100), Address(0x110));
        exporter.add_code("Stub", "stub1", 10, Address(0x200), 0x10);

        let records = exporter.code_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].code_type, "SHARED_LIB");
        assert_eq!(records[1].code_type, "CPP");
        assert_eq!(records[2].code_type, "CODE");
        assert_eq!(records[2].kind.as_deref(), Some("Stub"));
        assert_eq!(records[2].tm, Some(10));
    }

    #[test]
    fn test_static_entry_id_reused_by_dynamic_overwrite() {
        let mut exporter = ProfileExporter::new();
        exporter.add_static_code("Native", Address(0x100), Address(0x110));
        exporter.add_code("Stub", "replacement", 5, Address(0x100), 0x10);

        // The static record slot was taken over rather than appended to.
        let records = exporter.code_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "replacement");
        assert_eq!(records[0].code_type, "CODE");

        // Ticks into the range resolve to the reused id.
        exporter.record_tick(7, 0, &[Address(0x105)]);
        let tick = &exporter.tick_rows()[0];
        assert_eq!(tick.s[0], Value::from(0));
    }

    #[test]
    fn test_rename_creates_new_function_record() {
        let mut exporter = ProfileExporter::new();
        exporter.add_func_code(
            "LazyCompile",
            "old",
            1,
            Address(0x200),
            0x10,
            Address(0x300),
            CodeState::Compiled,
        );
        exporter.add_func_code(
            "LazyCompile",
            "new",
            2,
            Address(0x400),
            0x10,
            Address(0x300),
            CodeState::Compiled,
        );

        let functions = exporter.function_rows();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].name, "old");
        assert_eq!(functions[0].codes, vec![0]);
        assert_eq!(functions[1].name, "new");
        assert_eq!(functions[1].codes, vec![1]);

        let records = exporter.code_records();
        assert_eq!(records[0].func, Some(0));
        assert_eq!(records[1].func, Some(1));
    }

    #[test]
    fn test_state_only_update_adds_no_record() {
        let mut exporter = ProfileExporter::new();
        exporter.add_func_code(
            "Builtin",
            "f",
            1,
            Address(0x200),
            0x10,
            Address(0x300),
            CodeState::Compiled,
        );
        exporter.add_func_code(
            "Builtin",
            "f",
            2,
            Address(0x200),
            0x10,
            Address(0x300),
            CodeState::Optimized,
        );

        assert_eq!(exporter.code_records().len(), 1);
        assert_eq!(exporter.function_rows()[0].codes, vec![0]);
    }

    #[test]
    fn test_tick_records_unresolved_frames_raw() {
        let mut exporter = ProfileExporter::new();
        exporter.add_code("Stub", "stub1", 1, Address(0x200), 0x10);
        exporter.record_tick(9, 3, &[Address(0x205), Address(0x999)]);

        let tick = &exporter.tick_rows()[0];
        assert_eq!(tick.tm, 9);
        assert_eq!(tick.vm, 3);
        assert_eq!(
            tick.s,
            vec![
                Value::from(0),
                Value::from(5),
                Value::from(-1),
                Value::from(0x999u64),
            ]
        );
    }

    #[test]
    fn test_deopt_kept_first_only() {
        let mut exporter = ProfileExporter::new();
        exporter.add_func_code(
            "LazyCompile",
            "f",
            1,
            Address(0x200),
            0x10,
            Address(0x300),
            CodeState::Optimized,
        );
        exporter.deopt_code(5, Address(0x200), 0, 12, "eager", "f.js:3", "not a smi");
        exporter.deopt_code(6, Address(0x200), 0, 30, "lazy", "f.js:9", "other");

        let deopt = exporter.code_records()[0].deopt.as_ref().unwrap();
        assert_eq!(deopt.tm, 5);
        assert_eq!(deopt.reason, "not a smi");
    }

    #[test]
    fn test_malformed_inline_reference_nulls_slot() {
        let mut exporter = ProfileExporter::new();
        exporter.add_func_code(
            "LazyCompile",
            "caller",
            1,
            Address(0x200),
            0x10,
            Address(0x300),
            CodeState::Compiled,
        );
        exporter.add_func_code(
            "LazyCompile",
            "inlined",
            2,
            Address(0x400),
            0x10,
            Address(0x500),
            CodeState::Compiled,
        );
        exporter.add_script_source(ScriptId(1), "app.js", "fn");
        exporter.add_source_positions(
            Address(0x200),
            ScriptId(1),
            0,
            40,
            "C0O0",
            "",
            // Second reference points at an address with no function record.
            &[Address(0x500), Address(0x9999)],
        );

        let source = exporter.code_records()[0].source.as_ref().unwrap();
        assert_eq!(source.fns, vec![Some(1), None]);
    }

    #[test]
    fn test_write_json_shape() {
        let mut exporter = ProfileExporter::new();
        exporter.add_static_code("Native", Address(0x100), Address(0x110));
        exporter.record_tick(1, 0, &[Address(0x105)]);
        exporter.record_tick(2, 0, &[Address(0x105)]);
        exporter.add_script_source(ScriptId(0), "app.js", "x");

        let mut buffer = Vec::new();
        exporter.write_json(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["code"][0]["name"], "Native");
        assert_eq!(parsed["code"][0]["type"], "CPP");
        assert_eq!(parsed["ticks"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["ticks"][0]["s"], serde_json::json!([0, 5]));
        assert_eq!(parsed["scripts"][0]["url"], "app.js");

        // One tick per line, comma separated.
        assert_eq!(text.lines().filter(|l| l.contains("\"vm\"")).count(), 2);
        assert!(text.contains("{\"tm\":1,\"vm\":0,\"s\":[0,5]},"));
    }
}
