//! The checked AST artifact consumed by the runtime.

use serde::{Deserialize, Serialize};

use crate::expr::{Expr, ExprId};

/// Line/column position in the original source text, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// Map from expression id to source position.
///
/// Stored as a sorted vector; lookups binary-search. Positions are optional
/// throughout: an artifact without them still evaluates, it just surfaces
/// errors without locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    positions: Vec<(ExprId, SourceLocation)>,
}

impl SourceInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: ExprId, line: u32, column: u32) {
        let location = SourceLocation { line, column };
        match self.positions.binary_search_by_key(&id, |(i, _)| *i) {
            Ok(idx) => self.positions[idx].1 = location,
            Err(idx) => self.positions.insert(idx, (id, location)),
        }
    }

    pub fn location(&self, id: ExprId) -> Option<SourceLocation> {
        self.positions
            .binary_search_by_key(&id, |(i, _)| *i)
            .ok()
            .map(|idx| self.positions[idx].1)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A type-checked expression tree plus its source map.
///
/// Immutable once produced by the external checker; shareable across
/// concurrent evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckedAst {
    pub expr: Expr,
    pub source_info: SourceInfo,
}

impl CheckedAst {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            source_info: SourceInfo::new(),
        }
    }

    pub fn with_source_info(mut self, source_info: SourceInfo) -> Self {
        self.source_info = source_info;
        self
    }
}

impl From<Expr> for CheckedAst {
    fn from(expr: Expr) -> Self {
        Self::new(expr)
    }
}
