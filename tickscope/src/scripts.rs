//! Script identities and lazy source-position lookup.
//!
//! Scripts arrive as (id, url, source) triples from the event stream and are
//! carried through to the export artifact unchanged. The (line, column)
//! index over the source text is built lazily on the first position query
//! and individual lookups are cached, since only a handful of positions are
//! ever resolved per script.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::ScriptId;

/// A resolved position within a script's source text. Lines and columns are
/// 1-based; `offset` is the byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

/// One script known to the session.
#[derive(Debug, Clone, Serialize)]
pub struct Script {
    pub id: ScriptId,
    pub url: String,
    pub source: String,
    #[serde(skip)]
    line_starts: Option<Vec<usize>>,
    #[serde(skip)]
    positions: HashMap<(u32, u32), SourcePosition>,
}

impl Script {
    #[must_use]
    pub fn new(id: ScriptId, url: &str, source: &str) -> Self {
        Self {
            id,
            url: url.to_string(),
            source: source.to_string(),
            line_starts: None,
            positions: HashMap::new(),
        }
    }

    /// Resolve a 1-based (line, column) pair to a source position, or `None`
    /// when it falls outside the source text.
    pub fn source_position(&mut self, line: u32, column: u32) -> Option<SourcePosition> {
        if let Some(&cached) = self.positions.get(&(line, column)) {
            return Some(cached);
        }

        if line == 0 || column == 0 {
            return None;
        }
        let source = &self.source;
        let starts = self.line_starts.get_or_insert_with(|| {
            let mut starts = vec![0];
            starts.extend(
                source
                    .bytes()
                    .enumerate()
                    .filter_map(|(i, b)| (b == b'\n').then_some(i + 1)),
            );
            starts
        });
        let line_start = *starts.get(line as usize - 1)?;
        let line_end = starts
            .get(line as usize)
            .map_or(self.source.len(), |&next| next);
        let offset = line_start + column as usize - 1;
        if offset >= line_end && offset != line_start {
            return None;
        }

        let position = SourcePosition { line, column, offset };
        self.positions.insert((line, column), position);
        Some(position)
    }
}

/// Scripts keyed by runtime-assigned id. Ids can be sparse; the table keeps
/// the holes so export serialization preserves them as nulls.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ScriptTable {
    scripts: Vec<Option<Script>>,
}

impl ScriptTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script's source, replacing any earlier entry for the id.
    pub fn add_source(&mut self, id: ScriptId, url: &str, source: &str) {
        let index = id.0 as usize;
        if index >= self.scripts.len() {
            self.scripts.resize(index + 1, None);
        }
        self.scripts[index] = Some(Script::new(id, url, source));
    }

    #[must_use]
    pub fn get(&self, id: ScriptId) -> Option<&Script> {
        self.scripts.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: ScriptId) -> Option<&mut Script> {
        self.scripts.get_mut(id.0 as usize)?.as_mut()
    }

    /// Look a script up by url.
    #[must_use]
    pub fn by_url(&self, url: &str) -> Option<&Script> {
        self.scripts
            .iter()
            .flatten()
            .find(|script| script.url == url)
    }
}
