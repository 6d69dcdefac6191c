//! Source mapping: routine listing line → template source range.
//!
//! Each entry maps one emitted listing line to the statement it came from,
//! so a failure reported against the routine can be traced back to the
//! template.

use folio_types::Range;
use serde::{Deserialize, Serialize};

/// A complete source map for one emitted routine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    pub entries: Vec<SourceMapEntry>,
}

/// A single source map entry: one listing line → one template region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// 1-based line in the routine listing.
    pub line: u32,
    /// Name of the enclosing function (`init`, `postinit`, `repeat`, or the
    /// block name).
    pub func_name: String,
    pub kind: FuncKind,
    /// Template range of the statement.
    pub range: Range,
}

/// Classification of the function a line belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FuncKind {
    Init,
    Postinit,
    Repeat,
    Block,
}

impl SourceMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, line: u32, func_name: impl Into<String>, kind: FuncKind, range: Range) {
        self.entries.push(SourceMapEntry {
            line,
            func_name: func_name.into(),
            kind,
            range,
        });
    }

    /// Look up the entry for a listing line.
    pub fn find_by_line(&self, line: u32) -> Option<&SourceMapEntry> {
        self.entries.iter().find(|e| e.line == line)
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::Position;

    fn range(line: u32) -> Range {
        Range::new(Position::new(line, 1, 0), Position::new(line, 5, 4))
    }

    #[test]
    fn round_trip_json() {
        let mut sm = SourceMap::new();
        sm.push(2, "init", FuncKind::Init, range(1));
        sm.push(9, "title", FuncKind::Block, range(4));

        let sm2 = SourceMap::from_json(&sm.to_json()).expect("parse failed");
        assert_eq!(sm2.entries.len(), 2);
        assert_eq!(sm2.entries[1].func_name, "title");
        assert_eq!(sm2.entries[1].kind, FuncKind::Block);
    }

    #[test]
    fn find_by_line() {
        let mut sm = SourceMap::new();
        sm.push(2, "init", FuncKind::Init, range(1));
        sm.push(3, "init", FuncKind::Init, range(2));

        assert_eq!(sm.find_by_line(3).map(|e| e.range.start.line), Some(2));
        assert!(sm.find_by_line(99).is_none());
    }
}
