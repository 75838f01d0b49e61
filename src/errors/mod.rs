use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceLocation {
    pub fn new(line: usize, col: usize, end_line: usize, end_col: usize) -> Self {
        Self { line, col, end_line, end_col }
    }

    pub fn from_range(start: (usize, usize), end: (usize, usize)) -> Self {
        Self::new(start.0, start.1, end.0, end.1)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Every failure the analyzer can report.
///
/// Only `Parse` (and `NotFound` when the caller asks for a file that does not
/// exist at all) is meant to reach the caller of a compute-and-cache
/// operation. The cache recovers from the remaining kinds on its own.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("persistence error for {key}: {message}")]
    Persistence { key: String, message: String },

    #[error("pattern '{pattern}' failed on {node_kind} node: {message}")]
    PatternEvaluation {
        pattern: String,
        node_kind: String,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyzerError {
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn parse(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn persistence(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Map an io error on `path` to `NotFound` when that is what it is.
    pub fn from_io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(path)
        } else {
            Self::Io(error)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}
