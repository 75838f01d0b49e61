//! Turns pattern matches into located, graded violations.

use crate::analysis::patterns::{
    count_statements, function_parts, method_count, nesting_depth, parameter_count,
    positional_arg_count, find_patterns_fast, Pattern, PatternMatcher, Thresholds,
};
use crate::analysis::violations::{AnalysisResult, Severity, Violation, ViolationType};
use crate::ast::{AstNode, NodeKind, ParsedTree, TraversalConfig, TraversalStats, TraversalVisitor};
use rustpython_parser::ast::{Constant, Expr, Stmt};
use tracing::{debug, instrument};

pub struct ConnascenceDetector {
    thresholds: Thresholds,
    traversal: TraversalConfig,
    patterns: Vec<Pattern>,
}

impl ConnascenceDetector {
    pub fn new(thresholds: Thresholds, traversal: TraversalConfig) -> Self {
        let patterns = PatternMatcher::new(thresholds.clone()).builtin_patterns();
        Self {
            thresholds,
            traversal,
            patterns,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn detect(&self, tree: &ParsedTree) -> AnalysisResult {
        self.detect_with_stats(tree).0
    }

    #[instrument(skip_all, fields(path = tree.path()))]
    pub fn detect_with_stats(&self, tree: &ParsedTree) -> (AnalysisResult, TraversalStats) {
        let mut visitor = TraversalVisitor::new(self.traversal.clone());
        let found = find_patterns_fast(&mut visitor, tree.root(), &self.patterns);

        let mut violations = Vec::new();
        for (name, nodes) in &found {
            let Some(violation_type) = ViolationType::from_name(name) else {
                continue;
            };
            for node in nodes {
                violations.push(self.violation(tree, violation_type, node));
            }
        }

        let stats = visitor.stats();
        debug!(
            violations = violations.len(),
            visited = stats.visited,
            pruned = stats.pruned,
            memo_hits = stats.memo_hits,
            "detection complete"
        );
        (AnalysisResult::from_violations(tree.path(), violations), stats)
    }

    fn violation(&self, tree: &ParsedTree, violation_type: ViolationType, node: &AstNode<'_>) -> Violation {
        let location = tree.location(node);
        let (severity, description) = self.grade(violation_type, node);
        Violation {
            violation_type,
            line: location.line,
            column: location.col,
            severity,
            description,
            node_kind: node.kind().to_string(),
        }
    }

    /// Severity and description for a matched node. Both depend only on the
    /// node and the thresholds.
    fn grade(&self, violation_type: ViolationType, node: &AstNode<'_>) -> (Severity, String) {
        let t = &self.thresholds;
        let base = violation_type.base_severity();

        match violation_type {
            ViolationType::MagicLiteral => (base, format!("Magic literal {}", literal_text(node))),
            ViolationType::NameCoupling => (
                base,
                format!(
                    "Generic placeholder name '{}'",
                    node.identity().unwrap_or_default()
                ),
            ),
            ViolationType::PositionCoupling => {
                let count = match node.as_expr() {
                    Some(Expr::Call(call)) => positional_arg_count(&call.args),
                    _ => 0,
                };
                (
                    base,
                    format!(
                        "Call passes {} positional arguments (limit {})",
                        count, t.max_positional_args
                    ),
                )
            }
            ViolationType::AlgorithmCoupling => {
                let (name, count) = function_parts(node)
                    .map(|p| (p.name, count_statements(p.body)))
                    .unwrap_or_default();
                (
                    base,
                    format!(
                        "Function '{}' has {} statements (limit {})",
                        name, count, t.max_function_statements
                    ),
                )
            }
            ViolationType::GodObject => {
                let (name, count) = match node.as_stmt() {
                    Some(Stmt::ClassDef(class)) => (class.name.as_str(), method_count(&class.body)),
                    _ => ("", 0),
                };
                let severity = if count > t.god_object_critical {
                    base.escalate()
                } else {
                    base
                };
                (
                    severity,
                    format!(
                        "Class '{}' has {} methods (threshold {})",
                        name, count, t.god_object_methods
                    ),
                )
            }
            ViolationType::ParameterCoupling => {
                let (name, count) = function_parts(node)
                    .map(|p| (p.name, parameter_count(p.args)))
                    .unwrap_or_default();
                let severity = if count >= t.parameter_hard_limit {
                    base.escalate()
                } else {
                    base
                };
                (
                    severity,
                    format!(
                        "Function '{}' takes {} parameters (threshold {})",
                        name, count, t.max_parameters
                    ),
                )
            }
            ViolationType::DeepNesting => {
                let (name, depth) = function_parts(node)
                    .map(|p| (p.name, nesting_depth(p.body)))
                    .unwrap_or_default();
                (
                    base,
                    format!(
                        "Function '{}' nests control flow {} levels deep (limit {})",
                        name, depth, t.max_nesting_depth
                    ),
                )
            }
        }
    }
}

impl Default for ConnascenceDetector {
    fn default() -> Self {
        Self::new(Thresholds::default(), TraversalConfig::default())
    }
}

fn literal_text(node: &AstNode<'_>) -> String {
    match node.as_expr() {
        Some(Expr::Constant(c)) => match &c.value {
            Constant::Int(n) => n.to_string(),
            Constant::Float(f) => f.to_string(),
            Constant::Str(s) => format!("{:?}", s),
            _ => NodeKind::Constant.to_string(),
        },
        _ => NodeKind::Constant.to_string(),
    }
}
