use crate::ast::location::{LineIndex, SourceLocationExt};
use crate::ast::node::AstNode;
use crate::errors::{AnalyzerError, Result, SourceLocation};
use crate::frontend::parser::parse_module;
use crate::performance::fingerprint::normalize_path;
use rustpython_parser::ast::Mod;
use std::fs;
use std::path::Path;

/// A parsed module together with the text it came from.
///
/// The source is kept so the tree can be persisted as text and rebuilt on
/// load, and so node locations can be resolved without touching the disk.
#[derive(Debug)]
pub struct ParsedTree {
    path: String,
    source: String,
    module: Mod,
    line_index: LineIndex,
}

impl ParsedTree {
    pub fn parse(source: impl Into<String>, path: &str) -> Result<Self> {
        let source = source.into();
        let module = parse_module(&source, path)?;
        let line_index = LineIndex::new(&source);
        Ok(Self {
            path: path.to_string(),
            source,
            module,
            line_index,
        })
    }

    /// Read and parse `path`. The tree records the normalized absolute path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source =
            fs::read_to_string(path).map_err(|e| AnalyzerError::from_io(path, e))?;
        Self::parse(source, &normalize_path(path).to_string_lossy())
    }

    pub fn root(&self) -> AstNode<'_> {
        AstNode::Module(&self.module)
    }

    pub fn module(&self) -> &Mod {
        &self.module
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    pub fn location(&self, node: &AstNode<'_>) -> SourceLocation {
        node.source_location(&self.line_index)
    }
}
