//! Byte offset to line/column conversion for tree nodes.
//!
//! rustpython-parser 0.3 reports byte ranges through the `Ranged` trait; the
//! line index turns them into 1-based lines and 0-based columns, the same
//! convention Python's own `ast` module uses.

use crate::ast::node::AstNode;
use crate::errors::SourceLocation;

/// Line index for fast byte offset to line/column conversion
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|(_, ch)| *ch == '\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Convert byte offset to (line, column)
    pub fn offset_to_position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let column = offset.saturating_sub(self.line_starts[line]);
        (line + 1, column)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

pub trait SourceLocationExt {
    fn source_location(&self, index: &LineIndex) -> SourceLocation;
}

impl SourceLocationExt for AstNode<'_> {
    fn source_location(&self, index: &LineIndex) -> SourceLocation {
        let (start, end) = self.byte_range();
        SourceLocation::from_range(
            index.offset_to_position(start),
            index.offset_to_position(end),
        )
    }
}
