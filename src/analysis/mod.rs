//! Connascence analysis
//!
//! Pattern predicates over the traversal, the detector that grades matches
//! into violations, and the cached per-file analyzer.

pub mod analyzer;
pub mod detector;
pub mod patterns;
pub mod violations;

pub use analyzer::{ConnascenceAnalyzer, FileOutcome, ANALYSIS_KIND};
pub use detector::ConnascenceDetector;
pub use patterns::{find_patterns_fast, infer_targets, Pattern, PatternMatcher, PredicateFn, Thresholds};
pub use violations::{AnalysisResult, Severity, Violation, ViolationType};
