//! Named node predicates and the grouped pattern search.
//!
//! A [`Pattern`] declares the node kinds it targets when it is built.
//! [`find_patterns_fast`] groups patterns sharing a target set and walks the
//! tree once per group, so each node is only offered to the predicates that
//! asked for its kind.

use crate::ast::{AstNode, NodeContext, NodeKind, NodeKindSet, TraversalVisitor};
use crate::errors::AnalyzerError;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use rustpython_parser::ast::{Arguments, Constant, Expr, ExprContext, Stmt};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

pub type PredicateFn = dyn Fn(&AstNode<'_>, &NodeContext) -> Result<bool, String> + Send + Sync;

/// A named predicate over nodes of the kinds it targets.
#[derive(Clone)]
pub struct Pattern {
    name: String,
    targets: NodeKindSet,
    predicate: Arc<PredicateFn>,
}

impl Pattern {
    pub fn new<F>(name: impl Into<String>, targets: &[NodeKind], predicate: F) -> Self
    where
        F: Fn(&AstNode<'_>, &NodeContext) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            targets: NodeKindSet::of(targets),
            predicate: Arc::new(predicate),
        }
    }

    /// Build a pattern whose targets are guessed from its name.
    ///
    /// Compatibility path for callers that only have a name and a predicate.
    /// Prefer [`Pattern::new`].
    pub fn inferred<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&AstNode<'_>, &NodeContext) -> Result<bool, String> + Send + Sync + 'static,
    {
        let name = name.into();
        let targets = infer_targets(&name);
        debug!(pattern = %name, targets = %targets, "inferred pattern targets");
        Self {
            name,
            targets,
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn targets(&self) -> NodeKindSet {
        self.targets
    }

    /// Run the predicate, turning both errors and panics into
    /// `PatternEvaluation`.
    pub fn evaluate(&self, node: &AstNode<'_>, context: &NodeContext) -> Result<bool, AnalyzerError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(node, context)));
        let message = match outcome {
            Ok(Ok(matched)) => return Ok(matched),
            Ok(Err(message)) => message,
            Err(payload) => panic_message(payload.as_ref()),
        };
        Err(AnalyzerError::PatternEvaluation {
            pattern: self.name.clone(),
            node_kind: node.kind().to_string(),
            message,
        })
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "predicate panicked".to_string()
    }
}

/// Guess target kinds from a pattern name. Unknown names target everything.
pub fn infer_targets(name: &str) -> NodeKindSet {
    let name = name.to_ascii_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| name.contains(w));

    if has(&["function", "method", "parameter", "algorithm", "nesting"]) {
        NodeKindSet::of(&[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef])
    } else if has(&["class", "god"]) {
        NodeKindSet::of(&[NodeKind::ClassDef])
    } else if has(&["call", "position", "argument"]) {
        NodeKindSet::of(&[NodeKind::Call])
    } else if has(&["literal", "magic", "constant"]) {
        NodeKindSet::of(&[NodeKind::Constant])
    } else if has(&["name", "identifier"]) {
        NodeKindSet::of(&[NodeKind::Name])
    } else {
        NodeKindSet::all()
    }
}

/// Find every node matched by each pattern.
///
/// The result has one entry per pattern name, in name order, each holding
/// matches in traversal order. A predicate failure on a node is logged and
/// counted in the visitor's `pattern_errors`; that node is treated as not
/// matching and the walk goes on.
pub fn find_patterns_fast<'a>(
    visitor: &mut TraversalVisitor,
    root: AstNode<'a>,
    patterns: &[Pattern],
) -> BTreeMap<String, Vec<AstNode<'a>>> {
    let mut found: BTreeMap<String, Vec<AstNode<'a>>> = patterns
        .iter()
        .map(|p| (p.name.clone(), Vec::new()))
        .collect();

    let mut groups: BTreeMap<NodeKindSet, Vec<usize>> = BTreeMap::new();
    for (index, pattern) in patterns.iter().enumerate() {
        if pattern.targets.is_empty() {
            warn!(pattern = %pattern.name, "pattern targets no node kinds, skipping");
            continue;
        }
        groups.entry(pattern.targets).or_default().push(index);
    }

    for (targets, members) in groups {
        let mut errors = 0usize;
        let matches = visitor.traverse(root, targets, |node, context| {
            let kind = node.kind();
            let mut matched: SmallVec<[usize; 4]> = SmallVec::new();
            for &index in &members {
                let pattern = &patterns[index];
                if !pattern.targets.contains(kind) {
                    continue;
                }
                match pattern.evaluate(node, context) {
                    Ok(true) => matched.push(index),
                    Ok(false) => {}
                    Err(e) => {
                        errors += 1;
                        warn!(error = %e, "pattern evaluation failed");
                    }
                }
            }
            matched
        });
        visitor.record_pattern_errors(errors);

        for (node, matched) in matches {
            for index in matched {
                if let Some(nodes) = found.get_mut(&patterns[index].name) {
                    nodes.push(node);
                }
            }
        }
    }

    found
}

/// Limits the built-in patterns compare against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub god_object_methods: usize,
    pub god_object_critical: usize,
    pub max_parameters: usize,
    pub parameter_hard_limit: usize,
    pub max_positional_args: usize,
    pub max_function_statements: usize,
    pub max_nesting_depth: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            god_object_methods: 20,
            god_object_critical: 30,
            max_parameters: 5,
            parameter_hard_limit: 10,
            max_positional_args: 4,
            max_function_statements: 50,
            max_nesting_depth: 4,
        }
    }
}

/// Factory for the built-in connascence patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    thresholds: Thresholds,
}

impl PatternMatcher {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn builtin_patterns(&self) -> Vec<Pattern> {
        let t = &self.thresholds;
        vec![
            magic_literal(),
            name_coupling(),
            position_coupling(t.max_positional_args),
            algorithm_coupling(t.max_function_statements),
            god_object(t.god_object_methods),
            parameter_coupling(t.max_parameters),
            deep_nesting(t.max_nesting_depth),
        ]
    }
}

pub fn magic_literal() -> Pattern {
    Pattern::new("magic_literal", &[NodeKind::Constant], |node, context| {
        match node.as_expr() {
            Some(Expr::Constant(c)) => Ok(is_magic_constant(&c.value, context.parent)),
            _ => Err(unexpected(node)),
        }
    })
}

pub fn name_coupling() -> Pattern {
    Pattern::new("name_coupling", &[NodeKind::Name], |node, _| match node.as_expr() {
        Some(Expr::Name(n)) => Ok(n.ctx == ExprContext::Store && is_placeholder_name(n.id.as_str())),
        _ => Err(unexpected(node)),
    })
}

pub fn position_coupling(max_positional_args: usize) -> Pattern {
    Pattern::new("position_coupling", &[NodeKind::Call], move |node, _| {
        match node.as_expr() {
            Some(Expr::Call(call)) => Ok(positional_arg_count(&call.args) >= max_positional_args),
            _ => Err(unexpected(node)),
        }
    })
}

pub fn algorithm_coupling(max_statements: usize) -> Pattern {
    Pattern::new("algorithm_coupling", FUNCTION_KINDS, move |node, _| {
        let parts = function_parts(node).ok_or_else(|| unexpected(node))?;
        Ok(count_statements(parts.body) > max_statements)
    })
}

pub fn god_object(min_methods: usize) -> Pattern {
    Pattern::new("god_object", &[NodeKind::ClassDef], move |node, _| match node.as_stmt() {
        Some(Stmt::ClassDef(class)) => Ok(method_count(&class.body) >= min_methods),
        _ => Err(unexpected(node)),
    })
}

pub fn parameter_coupling(max_parameters: usize) -> Pattern {
    Pattern::new("parameter_coupling", FUNCTION_KINDS, move |node, _| {
        let parts = function_parts(node).ok_or_else(|| unexpected(node))?;
        Ok(parameter_count(parts.args) >= max_parameters)
    })
}

pub fn deep_nesting(max_depth: usize) -> Pattern {
    Pattern::new("deep_nesting", FUNCTION_KINDS, move |node, _| {
        let parts = function_parts(node).ok_or_else(|| unexpected(node))?;
        Ok(nesting_depth(parts.body) > max_depth)
    })
}

const FUNCTION_KINDS: &[NodeKind] = &[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef];

fn unexpected(node: &AstNode<'_>) -> String {
    format!("unexpected {} node", node.kind())
}

static SAFE_INTEGERS: Lazy<HashSet<i64>> = Lazy::new(|| {
    let mut safe: HashSet<i64> = [0, 1, 2].into_iter().collect();
    safe.extend((2..=16).map(|exp| 1i64 << exp));
    safe.extend([
        200, 201, 202, 204, 301, 302, 304, 400, 401, 403, 404, 405, 409, 422, 429, 500, 502,
        503, 504,
    ]);
    safe
});

const SAFE_FRACTIONS: &[f64] = &[0.5, 0.25, 0.1, 0.01, 0.001];

fn is_safe_integer(value: i64) -> bool {
    let magnitude = value.unsigned_abs();
    if magnitude <= i64::MAX as u64 && SAFE_INTEGERS.contains(&(magnitude as i64)) {
        return true;
    }
    // round: tens up to a thousand, then powers of ten
    (magnitude <= 1000 && magnitude % 10 == 0)
        || (magnitude >= 1000
            && magnitude
                .to_string()
                .strip_prefix('1')
                .is_some_and(|rest| rest.bytes().all(|b| b == b'0')))
}

/// Whether a literal in this position carries unexplained meaning.
///
/// Bare expression statements (docstrings) and f-string fragments never do.
/// Strings only count inside comparisons and when longer than two
/// characters.
pub(crate) fn is_magic_constant(value: &Constant, parent: Option<NodeKind>) -> bool {
    if matches!(parent, Some(NodeKind::ExprStmt) | Some(NodeKind::JoinedStr)) {
        return false;
    }
    match value {
        Constant::Int(n) => n.to_i64().map_or(true, |v| !is_safe_integer(v)),
        Constant::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                !is_safe_integer(*f as i64)
            } else {
                !SAFE_FRACTIONS.iter().any(|safe| (f.abs() - safe).abs() < f64::EPSILON)
            }
        }
        Constant::Str(s) => parent == Some(NodeKind::Compare) && s.chars().count() > 2,
        _ => false,
    }
}

pub(crate) fn is_placeholder_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("temp") || lower.contains("tmp") || lower.starts_with("var")
}

pub(crate) fn positional_arg_count(args: &[Expr]) -> usize {
    args.iter().filter(|a| !matches!(a, Expr::Starred(_))).count()
}

pub(crate) struct FunctionParts<'a> {
    pub name: &'a str,
    pub args: &'a Arguments,
    pub body: &'a [Stmt],
}

pub(crate) fn function_parts<'a>(node: &AstNode<'a>) -> Option<FunctionParts<'a>> {
    match node.as_stmt()? {
        Stmt::FunctionDef(f) => Some(FunctionParts {
            name: f.name.as_str(),
            args: &f.args,
            body: &f.body,
        }),
        Stmt::AsyncFunctionDef(f) => Some(FunctionParts {
            name: f.name.as_str(),
            args: &f.args,
            body: &f.body,
        }),
        _ => None,
    }
}

/// Declared parameters, variadics included. A leading `self` or `cls`
/// receiver is not counted.
pub(crate) fn parameter_count(args: &Arguments) -> usize {
    let count = args.posonlyargs.len()
        + args.args.len()
        + args.kwonlyargs.len()
        + usize::from(args.vararg.is_some())
        + usize::from(args.kwarg.is_some());
    count - usize::from(has_receiver(args))
}

pub(crate) fn has_receiver(args: &Arguments) -> bool {
    args.posonlyargs
        .iter()
        .chain(args.args.iter())
        .next()
        .is_some_and(|a| matches!(a.def.arg.as_str(), "self" | "cls"))
}

pub(crate) fn method_count(body: &[Stmt]) -> usize {
    body.iter()
        .filter(|s| matches!(s, Stmt::FunctionDef(_) | Stmt::AsyncFunctionDef(_)))
        .count()
}

/// Statement blocks nested directly under a compound statement.
fn nested_blocks(stmt: &Stmt) -> SmallVec<[&[Stmt]; 4]> {
    let mut blocks: SmallVec<[&[Stmt]; 4]> = SmallVec::new();
    match stmt {
        Stmt::For(s) => blocks.extend([s.body.as_slice(), s.orelse.as_slice()]),
        Stmt::AsyncFor(s) => blocks.extend([s.body.as_slice(), s.orelse.as_slice()]),
        Stmt::While(s) => blocks.extend([s.body.as_slice(), s.orelse.as_slice()]),
        Stmt::If(s) => blocks.extend([s.body.as_slice(), s.orelse.as_slice()]),
        Stmt::With(s) => blocks.push(s.body.as_slice()),
        Stmt::AsyncWith(s) => blocks.push(s.body.as_slice()),
        Stmt::Match(s) => blocks.extend(s.cases.iter().map(|c| c.body.as_slice())),
        Stmt::Try(s) => {
            blocks.push(s.body.as_slice());
            blocks.extend(s.handlers.iter().map(|h| {
                let rustpython_parser::ast::ExceptHandler::ExceptHandler(h) = h;
                h.body.as_slice()
            }));
            blocks.extend([s.orelse.as_slice(), s.finalbody.as_slice()]);
        }
        Stmt::TryStar(s) => {
            blocks.push(s.body.as_slice());
            blocks.extend(s.handlers.iter().map(|h| {
                let rustpython_parser::ast::ExceptHandler::ExceptHandler(h) = h;
                h.body.as_slice()
            }));
            blocks.extend([s.orelse.as_slice(), s.finalbody.as_slice()]);
        }
        _ => {}
    }
    blocks.retain(|b| !b.is_empty());
    blocks
}

fn is_definition(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::FunctionDef(_) | Stmt::AsyncFunctionDef(_) | Stmt::ClassDef(_)
    )
}

/// Statements in a body, nested blocks included. Nested definitions count as
/// one statement each; their bodies belong to them.
pub(crate) fn count_statements(body: &[Stmt]) -> usize {
    body.iter()
        .map(|stmt| {
            if is_definition(stmt) {
                1
            } else {
                1 + nested_blocks(stmt)
                    .iter()
                    .map(|block| count_statements(block))
                    .sum::<usize>()
            }
        })
        .sum()
}

/// Deepest control-flow nesting in a body. An `elif` chain stays at the
/// level of its `if`.
pub(crate) fn nesting_depth(body: &[Stmt]) -> usize {
    body.iter().map(stmt_nesting).max().unwrap_or(0)
}

fn stmt_nesting(stmt: &Stmt) -> usize {
    if is_definition(stmt) {
        return 0;
    }
    if let Stmt::If(s) = stmt {
        let body = 1 + nesting_depth(&s.body);
        let orelse = match s.orelse.as_slice() {
            [] => 0,
            [Stmt::If(_)] => nesting_depth(&s.orelse),
            other => 1 + nesting_depth(other),
        };
        return body.max(orelse);
    }
    let blocks = nested_blocks(stmt);
    if blocks.is_empty() {
        return 0;
    }
    1 + blocks.iter().map(|b| nesting_depth(b)).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ParsedTree;

    fn names(found: &BTreeMap<String, Vec<AstNode<'_>>>, pattern: &str) -> Vec<String> {
        found[pattern]
            .iter()
            .map(|n| n.identity().unwrap_or("?").to_string())
            .collect()
    }

    #[test]
    fn test_builtin_patterns() {
        let source = r#"
def wide(a, b, c, d, e):
    """Docstring 12345."""
    temp_value = compute(1, 2, 3, 4)
    if a == "active":
        return 42
    return 0

class Holder:
    def narrow(self, a, b, c, d):
        return a
"#;
        let tree = ParsedTree::parse(source, "<test>").unwrap();
        let patterns = PatternMatcher::default().builtin_patterns();
        let mut visitor = TraversalVisitor::default();

        let found = find_patterns_fast(&mut visitor, tree.root(), &patterns);

        assert_eq!(names(&found, "parameter_coupling"), vec!["wide"]);
        assert_eq!(names(&found, "name_coupling"), vec!["temp_value"]);
        assert_eq!(found["position_coupling"].len(), 1);
        // 3, "active", 42
        assert_eq!(found["magic_literal"].len(), 3);
        assert!(found["god_object"].is_empty());
        assert_eq!(visitor.stats().pattern_errors, 0);
    }

    #[test]
    fn test_failing_predicate_is_skipped() {
        let tree = ParsedTree::parse("f(1)\ng(2)\nh(3)\n", "<test>").unwrap();
        let patterns = vec![
            Pattern::new("boom", &[NodeKind::Call], |node, _| {
                if node.children()[0].identity() == Some("g") {
                    Err("cannot evaluate".to_string())
                } else {
                    Ok(true)
                }
            }),
            Pattern::new("panics", &[NodeKind::Call], |node, _| {
                if node.children()[0].identity() == Some("h") {
                    panic!("predicate bug");
                }
                Ok(false)
            }),
        ];
        let mut visitor = TraversalVisitor::default();

        let found = find_patterns_fast(&mut visitor, tree.root(), &patterns);

        assert_eq!(found["boom"].len(), 2);
        assert!(found["panics"].is_empty());
        assert_eq!(visitor.stats().pattern_errors, 2);
    }

    #[test]
    fn test_patterns_sharing_targets_walk_once() {
        let tree = ParsedTree::parse("def f(a):\n    pass\n", "<test>").unwrap();
        let patterns = vec![
            algorithm_coupling(0),
            parameter_coupling(1),
            god_object(0),
        ];
        let mut visitor = TraversalVisitor::default();

        let found = find_patterns_fast(&mut visitor, tree.root(), &patterns);

        assert_eq!(visitor.stats().traversals, 2);
        assert_eq!(found["algorithm_coupling"].len(), 1);
        assert_eq!(found["parameter_coupling"].len(), 1);
    }

    #[test]
    fn test_inferred_targets() {
        assert_eq!(
            infer_targets("function_length"),
            NodeKindSet::of(&[NodeKind::FunctionDef, NodeKind::AsyncFunctionDef])
        );
        assert_eq!(infer_targets("god_class"), NodeKindSet::of(&[NodeKind::ClassDef]));
        assert_eq!(infer_targets("call_arguments"), NodeKindSet::of(&[NodeKind::Call]));
        assert_eq!(infer_targets("anything"), NodeKindSet::all());

        let pattern = Pattern::inferred("magic_numbers", |_, _| Ok(true));
        assert_eq!(pattern.targets(), NodeKindSet::of(&[NodeKind::Constant]));
    }

    #[test]
    fn test_safe_literals() {
        for safe in [0, 1, 2, 8, 1024, 200, 404, 10, 100, 1000, 1_000_000] {
            assert!(!is_magic_constant(&Constant::Int(safe.into()), None), "{safe}");
        }
        for magic in [7, 42, 86400, 1234, 11000] {
            assert!(is_magic_constant(&Constant::Int(magic.into()), None), "{magic}");
        }
        assert!(!is_magic_constant(&Constant::Float(0.5), None));
        assert!(is_magic_constant(&Constant::Float(2.75), None));
        assert!(!is_magic_constant(&Constant::Int(42.into()), Some(NodeKind::ExprStmt)));
    }

    #[test]
    fn test_method_parameters_exclude_receiver() {
        let tree = ParsedTree::parse(
            "class A:\n    def m(self, a, b, c, d):\n        pass\n    @classmethod\n    def c(cls, a, b, c, d):\n        pass\ndef f(a, b, c, d, e):\n    pass\n",
            "<test>",
        )
        .unwrap();
        let mut visitor = TraversalVisitor::default();

        let found = find_patterns_fast(&mut visitor, tree.root(), &[parameter_coupling(5)]);
        assert_eq!(names(&found, "parameter_coupling"), vec!["f"]);
    }

    #[test]
    fn test_nesting_depth_treats_elif_as_flat() {
        let source = r#"
def flat(x):
    if x == 1:
        pass
    elif x == 2:
        pass
    elif x == 3:
        pass
    else:
        pass

def deep(x):
    for a in x:
        while a:
            with a:
                if a:
                    try:
                        pass
                    except Exception:
                        pass
"#;
        let tree = ParsedTree::parse(source, "<test>").unwrap();
        let mut visitor = TraversalVisitor::default();

        let found = find_patterns_fast(&mut visitor, tree.root(), &[deep_nesting(4)]);
        assert_eq!(names(&found, "deep_nesting"), vec!["deep"]);
    }

    #[test]
    fn test_statement_count_includes_nested_blocks() {
        let tree = ParsedTree::parse(
            "def f(x):\n    y = 1\n    if x:\n        y = 2\n        y = 3\n    return y\n",
            "<test>",
        )
        .unwrap();
        let func = tree.root().children()[0];
        let parts = function_parts(&func).unwrap();
        assert_eq!(parts.name, "f");
        assert_eq!(count_statements(parts.body), 5);
    }
}
