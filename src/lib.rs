//! Cached connascence and complexity analysis for Python sources.
//!
//! Parsed trees and per-file results are cached against file fingerprints,
//! kept within entry and byte budgets by LRU eviction, and optionally
//! persisted across runs.

pub mod analysis;
pub mod ast;
pub mod errors;
pub mod frontend;
pub mod infrastructure;
pub mod performance;

// Re-export commonly used items
pub use analysis::{
    AnalysisResult, ConnascenceAnalyzer, ConnascenceDetector, Pattern, PatternMatcher, Severity,
    Thresholds, Violation, ViolationType,
};
pub use ast::{AstNode, NodeKind, ParsedTree, TraversalConfig, TraversalVisitor};
pub use errors::{AnalyzerError, Result, SourceLocation};
pub use frontend::{cli_main, parse_module, Config};
pub use infrastructure::{init_logging, LogConfig, PerformanceMetrics};
pub use performance::{
    AstCache, CacheConfig, CacheEntry, CacheStats, CacheStore, CancellationToken, FileFingerprint,
    PerformanceProfiler,
};
