//! Uniform node view over the rustpython tree.
//!
//! `AstNode` borrows a module, statement or expression and knows its kind,
//! byte range, identifying name and direct children. Child order follows
//! source order so every walk over it is deterministic.

use rustpython_parser::ast::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    Module,
    // Statements
    FunctionDef,
    AsyncFunctionDef,
    ClassDef,
    Return,
    Delete,
    Assign,
    AugAssign,
    AnnAssign,
    For,
    AsyncFor,
    While,
    If,
    With,
    AsyncWith,
    Match,
    Raise,
    Try,
    TryStar,
    Assert,
    Import,
    ImportFrom,
    Global,
    Nonlocal,
    ExprStmt,
    Pass,
    Break,
    Continue,
    TypeAlias,
    // Expressions
    BoolOp,
    NamedExpr,
    BinOp,
    UnaryOp,
    Lambda,
    IfExp,
    Dict,
    Set,
    ListComp,
    SetComp,
    DictComp,
    GeneratorExp,
    Await,
    Yield,
    YieldFrom,
    Compare,
    Call,
    FormattedValue,
    JoinedStr,
    Constant,
    Attribute,
    Subscript,
    Starred,
    Name,
    List,
    Tuple,
    Slice,
}

impl NodeKind {
    pub const ALL: [NodeKind; 56] = [
        NodeKind::Module,
        NodeKind::FunctionDef,
        NodeKind::AsyncFunctionDef,
        NodeKind::ClassDef,
        NodeKind::Return,
        NodeKind::Delete,
        NodeKind::Assign,
        NodeKind::AugAssign,
        NodeKind::AnnAssign,
        NodeKind::For,
        NodeKind::AsyncFor,
        NodeKind::While,
        NodeKind::If,
        NodeKind::With,
        NodeKind::AsyncWith,
        NodeKind::Match,
        NodeKind::Raise,
        NodeKind::Try,
        NodeKind::TryStar,
        NodeKind::Assert,
        NodeKind::Import,
        NodeKind::ImportFrom,
        NodeKind::Global,
        NodeKind::Nonlocal,
        NodeKind::ExprStmt,
        NodeKind::Pass,
        NodeKind::Break,
        NodeKind::Continue,
        NodeKind::TypeAlias,
        NodeKind::BoolOp,
        NodeKind::NamedExpr,
        NodeKind::BinOp,
        NodeKind::UnaryOp,
        NodeKind::Lambda,
        NodeKind::IfExp,
        NodeKind::Dict,
        NodeKind::Set,
        NodeKind::ListComp,
        NodeKind::SetComp,
        NodeKind::DictComp,
        NodeKind::GeneratorExp,
        NodeKind::Await,
        NodeKind::Yield,
        NodeKind::YieldFrom,
        NodeKind::Compare,
        NodeKind::Call,
        NodeKind::FormattedValue,
        NodeKind::JoinedStr,
        NodeKind::Constant,
        NodeKind::Attribute,
        NodeKind::Subscript,
        NodeKind::Starred,
        NodeKind::Name,
        NodeKind::List,
        NodeKind::Tuple,
        NodeKind::Slice,
    ];

    /// Name of the node class in Python's `ast` module.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "Module",
            NodeKind::FunctionDef => "FunctionDef",
            NodeKind::AsyncFunctionDef => "AsyncFunctionDef",
            NodeKind::ClassDef => "ClassDef",
            NodeKind::Return => "Return",
            NodeKind::Delete => "Delete",
            NodeKind::Assign => "Assign",
            NodeKind::AugAssign => "AugAssign",
            NodeKind::AnnAssign => "AnnAssign",
            NodeKind::For => "For",
            NodeKind::AsyncFor => "AsyncFor",
            NodeKind::While => "While",
            NodeKind::If => "If",
            NodeKind::With => "With",
            NodeKind::AsyncWith => "AsyncWith",
            NodeKind::Match => "Match",
            NodeKind::Raise => "Raise",
            NodeKind::Try => "Try",
            NodeKind::TryStar => "TryStar",
            NodeKind::Assert => "Assert",
            NodeKind::Import => "Import",
            NodeKind::ImportFrom => "ImportFrom",
            NodeKind::Global => "Global",
            NodeKind::Nonlocal => "Nonlocal",
            NodeKind::ExprStmt => "Expr",
            NodeKind::Pass => "Pass",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::TypeAlias => "TypeAlias",
            NodeKind::BoolOp => "BoolOp",
            NodeKind::NamedExpr => "NamedExpr",
            NodeKind::BinOp => "BinOp",
            NodeKind::UnaryOp => "UnaryOp",
            NodeKind::Lambda => "Lambda",
            NodeKind::IfExp => "IfExp",
            NodeKind::Dict => "Dict",
            NodeKind::Set => "Set",
            NodeKind::ListComp => "ListComp",
            NodeKind::SetComp => "SetComp",
            NodeKind::DictComp => "DictComp",
            NodeKind::GeneratorExp => "GeneratorExp",
            NodeKind::Await => "Await",
            NodeKind::Yield => "Yield",
            NodeKind::YieldFrom => "YieldFrom",
            NodeKind::Compare => "Compare",
            NodeKind::Call => "Call",
            NodeKind::FormattedValue => "FormattedValue",
            NodeKind::JoinedStr => "JoinedStr",
            NodeKind::Constant => "Constant",
            NodeKind::Attribute => "Attribute",
            NodeKind::Subscript => "Subscript",
            NodeKind::Starred => "Starred",
            NodeKind::Name => "Name",
            NodeKind::List => "List",
            NodeKind::Tuple => "Tuple",
            NodeKind::Slice => "Slice",
        }
    }

    pub fn is_statement(self) -> bool {
        (NodeKind::FunctionDef..=NodeKind::TypeAlias).contains(&self)
    }

    pub fn is_expression(self) -> bool {
        self >= NodeKind::BoolOp
    }

    pub fn is_function(self) -> bool {
        matches!(self, NodeKind::FunctionDef | NodeKind::AsyncFunctionDef)
    }

    /// Nodes whose bodies hold statements. These may contain any kind.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            NodeKind::Module
                | NodeKind::FunctionDef
                | NodeKind::AsyncFunctionDef
                | NodeKind::ClassDef
                | NodeKind::If
                | NodeKind::For
                | NodeKind::AsyncFor
                | NodeKind::While
                | NodeKind::With
                | NodeKind::AsyncWith
                | NodeKind::Try
                | NodeKind::TryStar
                | NodeKind::Match
        )
    }

    /// Control-flow statements that open a nesting level.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            NodeKind::If
                | NodeKind::For
                | NodeKind::AsyncFor
                | NodeKind::While
                | NodeKind::With
                | NodeKind::AsyncWith
                | NodeKind::Try
                | NodeKind::TryStar
                | NodeKind::Match
        )
    }

    /// Kinds that can appear anywhere below a node of this kind.
    pub fn reachable(self) -> NodeKindSet {
        if self.is_structural() {
            NodeKindSet::all()
        } else if matches!(self, NodeKind::Name | NodeKind::Constant) {
            NodeKindSet::empty()
        } else {
            // Simple statements and non-leaf expressions only hold expressions.
            NodeKindSet::expressions()
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .or_else(|| s.eq_ignore_ascii_case("ExprStmt").then_some(NodeKind::ExprStmt))
            .ok_or_else(|| format!("unknown node kind '{}'", s))
    }
}

/// Set of node kinds packed into one word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKindSet(u64);

impl NodeKindSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        NodeKind::ALL.iter().copied().collect()
    }

    pub fn expressions() -> Self {
        NodeKind::ALL
            .iter()
            .copied()
            .filter(|kind| kind.is_expression())
            .collect()
    }

    pub fn of(kinds: &[NodeKind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn insert(&mut self, kind: NodeKind) {
        self.0 |= 1u64 << kind as u8;
    }

    pub fn contains(&self, kind: NodeKind) -> bool {
        self.0 & (1u64 << kind as u8) != 0
    }

    pub fn intersects(&self, other: &NodeKindSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(&self, other: &NodeKindSet) -> NodeKindSet {
        NodeKindSet(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeKind> + '_ {
        NodeKind::ALL.iter().copied().filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<NodeKind> for NodeKindSet {
    fn from_iter<I: IntoIterator<Item = NodeKind>>(iter: I) -> Self {
        let mut set = NodeKindSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl fmt::Display for NodeKindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(NodeKind::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

pub type Children<'a> = SmallVec<[AstNode<'a>; 4]>;

/// Borrowed view of one node in a parsed tree.
#[derive(Debug, Clone, Copy)]
pub enum AstNode<'a> {
    Module(&'a Mod),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

impl<'a> AstNode<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            AstNode::Module(_) => NodeKind::Module,
            AstNode::Stmt(stmt) => stmt_kind(stmt),
            AstNode::Expr(expr) => expr_kind(expr),
        }
    }

    pub fn byte_range(&self) -> (usize, usize) {
        match self {
            AstNode::Module(_) => (0, 0),
            AstNode::Stmt(stmt) => {
                let range = stmt.range();
                (range.start().to_usize(), range.end().to_usize())
            }
            AstNode::Expr(expr) => {
                let range = expr.range();
                (range.start().to_usize(), range.end().to_usize())
            }
        }
    }

    /// Name that distinguishes otherwise similar nodes: the defined name of a
    /// function or class, a referenced identifier, or an accessed attribute.
    pub fn identity(&self) -> Option<&'a str> {
        match self {
            AstNode::Stmt(Stmt::FunctionDef(f)) => Some(f.name.as_str()),
            AstNode::Stmt(Stmt::AsyncFunctionDef(f)) => Some(f.name.as_str()),
            AstNode::Stmt(Stmt::ClassDef(c)) => Some(c.name.as_str()),
            AstNode::Expr(Expr::Name(n)) => Some(n.id.as_str()),
            AstNode::Expr(Expr::Attribute(a)) => Some(a.attr.as_str()),
            _ => None,
        }
    }

    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            AstNode::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }

    pub fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            AstNode::Expr(expr) => Some(expr),
            _ => None,
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Children<'a> {
        let mut out = Children::new();
        match self {
            AstNode::Module(module) => module_children(module, &mut out),
            AstNode::Stmt(stmt) => stmt_children(stmt, &mut out),
            AstNode::Expr(expr) => expr_children(expr, &mut out),
        }
        out
    }
}

fn stmt_kind(stmt: &Stmt) -> NodeKind {
    match stmt {
        Stmt::FunctionDef(_) => NodeKind::FunctionDef,
        Stmt::AsyncFunctionDef(_) => NodeKind::AsyncFunctionDef,
        Stmt::ClassDef(_) => NodeKind::ClassDef,
        Stmt::Return(_) => NodeKind::Return,
        Stmt::Delete(_) => NodeKind::Delete,
        Stmt::Assign(_) => NodeKind::Assign,
        Stmt::AugAssign(_) => NodeKind::AugAssign,
        Stmt::AnnAssign(_) => NodeKind::AnnAssign,
        Stmt::For(_) => NodeKind::For,
        Stmt::AsyncFor(_) => NodeKind::AsyncFor,
        Stmt::While(_) => NodeKind::While,
        Stmt::If(_) => NodeKind::If,
        Stmt::With(_) => NodeKind::With,
        Stmt::AsyncWith(_) => NodeKind::AsyncWith,
        Stmt::Match(_) => NodeKind::Match,
        Stmt::Raise(_) => NodeKind::Raise,
        Stmt::Try(_) => NodeKind::Try,
        Stmt::TryStar(_) => NodeKind::TryStar,
        Stmt::Assert(_) => NodeKind::Assert,
        Stmt::Import(_) => NodeKind::Import,
        Stmt::ImportFrom(_) => NodeKind::ImportFrom,
        Stmt::Global(_) => NodeKind::Global,
        Stmt::Nonlocal(_) => NodeKind::Nonlocal,
        Stmt::Expr(_) => NodeKind::ExprStmt,
        Stmt::Pass(_) => NodeKind::Pass,
        Stmt::Break(_) => NodeKind::Break,
        Stmt::Continue(_) => NodeKind::Continue,
        Stmt::TypeAlias(_) => NodeKind::TypeAlias,
    }
}

fn expr_kind(expr: &Expr) -> NodeKind {
    match expr {
        Expr::BoolOp(_) => NodeKind::BoolOp,
        Expr::NamedExpr(_) => NodeKind::NamedExpr,
        Expr::BinOp(_) => NodeKind::BinOp,
        Expr::UnaryOp(_) => NodeKind::UnaryOp,
        Expr::Lambda(_) => NodeKind::Lambda,
        Expr::IfExp(_) => NodeKind::IfExp,
        Expr::Dict(_) => NodeKind::Dict,
        Expr::Set(_) => NodeKind::Set,
        Expr::ListComp(_) => NodeKind::ListComp,
        Expr::SetComp(_) => NodeKind::SetComp,
        Expr::DictComp(_) => NodeKind::DictComp,
        Expr::GeneratorExp(_) => NodeKind::GeneratorExp,
        Expr::Await(_) => NodeKind::Await,
        Expr::Yield(_) => NodeKind::Yield,
        Expr::YieldFrom(_) => NodeKind::YieldFrom,
        Expr::Compare(_) => NodeKind::Compare,
        Expr::Call(_) => NodeKind::Call,
        Expr::FormattedValue(_) => NodeKind::FormattedValue,
        Expr::JoinedStr(_) => NodeKind::JoinedStr,
        Expr::Constant(_) => NodeKind::Constant,
        Expr::Attribute(_) => NodeKind::Attribute,
        Expr::Subscript(_) => NodeKind::Subscript,
        Expr::Starred(_) => NodeKind::Starred,
        Expr::Name(_) => NodeKind::Name,
        Expr::List(_) => NodeKind::List,
        Expr::Tuple(_) => NodeKind::Tuple,
        Expr::Slice(_) => NodeKind::Slice,
    }
}

fn module_children<'a>(module: &'a Mod, out: &mut Children<'a>) {
    match module {
        Mod::Module(ModModule { body, .. }) | Mod::Interactive(ModInteractive { body, .. }) => {
            out.extend(body.iter().map(AstNode::Stmt));
        }
        Mod::Expression(ModExpression { body, .. }) => out.push(AstNode::Expr(&**body)),
        Mod::FunctionType(ModFunctionType { argtypes, returns, .. }) => {
            out.extend(argtypes.iter().map(AstNode::Expr));
            out.push(AstNode::Expr(&**returns));
        }
    }
}

fn push_expr<'a>(out: &mut Children<'a>, expr: &'a Option<Box<Expr>>) {
    if let Some(expr) = expr {
        out.push(AstNode::Expr(&**expr));
    }
}

fn push_body<'a>(out: &mut Children<'a>, body: &'a [Stmt]) {
    out.extend(body.iter().map(AstNode::Stmt));
}

fn push_arguments<'a>(out: &mut Children<'a>, args: &'a Arguments) {
    for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
        push_expr(out, &arg.def.annotation);
        push_expr(out, &arg.default);
    }
    for arg in args.vararg.iter().chain(args.kwarg.iter()) {
        push_expr(out, &arg.annotation);
    }
}

fn push_comprehensions<'a>(out: &mut Children<'a>, generators: &'a [Comprehension]) {
    for gen in generators {
        out.push(AstNode::Expr(&gen.target));
        out.push(AstNode::Expr(&gen.iter));
        out.extend(gen.ifs.iter().map(AstNode::Expr));
    }
}

fn push_type_params<'a>(out: &mut Children<'a>, params: &'a [TypeParam]) {
    for param in params {
        if let TypeParam::TypeVar(var) = param {
            push_expr(out, &var.bound);
        }
    }
}

/// Expressions embedded in a case pattern: values, mapping keys and class
/// references. Singletons and captures carry no expression.
fn push_pattern<'a>(out: &mut Children<'a>, pattern: &'a Pattern) {
    match pattern {
        Pattern::MatchValue(p) => out.push(AstNode::Expr(&p.value)),
        Pattern::MatchSequence(p) => {
            for inner in &p.patterns {
                push_pattern(out, inner);
            }
        }
        Pattern::MatchMapping(p) => {
            for (key, inner) in p.keys.iter().zip(&p.patterns) {
                out.push(AstNode::Expr(key));
                push_pattern(out, inner);
            }
        }
        Pattern::MatchClass(p) => {
            out.push(AstNode::Expr(&p.cls));
            for inner in p.patterns.iter().chain(&p.kwd_patterns) {
                push_pattern(out, inner);
            }
        }
        Pattern::MatchAs(p) => {
            if let Some(inner) = &p.pattern {
                push_pattern(out, inner);
            }
        }
        Pattern::MatchOr(p) => {
            for inner in &p.patterns {
                push_pattern(out, inner);
            }
        }
        Pattern::MatchSingleton(_) | Pattern::MatchStar(_) => {}
    }
}

fn push_handlers<'a>(out: &mut Children<'a>, handlers: &'a [ExceptHandler]) {
    for handler in handlers {
        let ExceptHandler::ExceptHandler(h) = handler;
        push_expr(out, &h.type_);
        push_body(out, &h.body);
    }
}

fn stmt_children<'a>(stmt: &'a Stmt, out: &mut Children<'a>) {
    match stmt {
        Stmt::FunctionDef(f) => {
            out.extend(f.decorator_list.iter().map(AstNode::Expr));
            push_type_params(out, &f.type_params);
            push_arguments(out, &f.args);
            push_expr(out, &f.returns);
            push_body(out, &f.body);
        }
        Stmt::AsyncFunctionDef(f) => {
            out.extend(f.decorator_list.iter().map(AstNode::Expr));
            push_type_params(out, &f.type_params);
            push_arguments(out, &f.args);
            push_expr(out, &f.returns);
            push_body(out, &f.body);
        }
        Stmt::ClassDef(c) => {
            out.extend(c.decorator_list.iter().map(AstNode::Expr));
            push_type_params(out, &c.type_params);
            out.extend(c.bases.iter().map(AstNode::Expr));
            out.extend(c.keywords.iter().map(|k| AstNode::Expr(&k.value)));
            push_body(out, &c.body);
        }
        Stmt::Return(r) => push_expr(out, &r.value),
        Stmt::Delete(d) => out.extend(d.targets.iter().map(AstNode::Expr)),
        Stmt::Assign(a) => {
            out.extend(a.targets.iter().map(AstNode::Expr));
            out.push(AstNode::Expr(&a.value));
        }
        Stmt::AugAssign(a) => {
            out.push(AstNode::Expr(&a.target));
            out.push(AstNode::Expr(&a.value));
        }
        Stmt::AnnAssign(a) => {
            out.push(AstNode::Expr(&a.target));
            out.push(AstNode::Expr(&a.annotation));
            push_expr(out, &a.value);
        }
        Stmt::For(f) => {
            out.push(AstNode::Expr(&f.target));
            out.push(AstNode::Expr(&f.iter));
            push_body(out, &f.body);
            push_body(out, &f.orelse);
        }
        Stmt::AsyncFor(f) => {
            out.push(AstNode::Expr(&f.target));
            out.push(AstNode::Expr(&f.iter));
            push_body(out, &f.body);
            push_body(out, &f.orelse);
        }
        Stmt::While(w) => {
            out.push(AstNode::Expr(&w.test));
            push_body(out, &w.body);
            push_body(out, &w.orelse);
        }
        Stmt::If(i) => {
            out.push(AstNode::Expr(&i.test));
            push_body(out, &i.body);
            push_body(out, &i.orelse);
        }
        Stmt::With(w) => {
            for item in &w.items {
                out.push(AstNode::Expr(&item.context_expr));
                push_expr(out, &item.optional_vars);
            }
            push_body(out, &w.body);
        }
        Stmt::AsyncWith(w) => {
            for item in &w.items {
                out.push(AstNode::Expr(&item.context_expr));
                push_expr(out, &item.optional_vars);
            }
            push_body(out, &w.body);
        }
        Stmt::Match(m) => {
            out.push(AstNode::Expr(&m.subject));
            for case in &m.cases {
                push_pattern(out, &case.pattern);
                push_expr(out, &case.guard);
                push_body(out, &case.body);
            }
        }
        Stmt::Raise(r) => {
            push_expr(out, &r.exc);
            push_expr(out, &r.cause);
        }
        Stmt::Try(t) => {
            push_body(out, &t.body);
            push_handlers(out, &t.handlers);
            push_body(out, &t.orelse);
            push_body(out, &t.finalbody);
        }
        Stmt::TryStar(t) => {
            push_body(out, &t.body);
            push_handlers(out, &t.handlers);
            push_body(out, &t.orelse);
            push_body(out, &t.finalbody);
        }
        Stmt::Assert(a) => {
            out.push(AstNode::Expr(&a.test));
            push_expr(out, &a.msg);
        }
        Stmt::Expr(e) => out.push(AstNode::Expr(&e.value)),
        Stmt::TypeAlias(t) => {
            out.push(AstNode::Expr(&t.name));
            push_type_params(out, &t.type_params);
            out.push(AstNode::Expr(&t.value));
        }
        Stmt::Import(_)
        | Stmt::ImportFrom(_)
        | Stmt::Global(_)
        | Stmt::Nonlocal(_)
        | Stmt::Pass(_)
        | Stmt::Break(_)
        | Stmt::Continue(_) => {}
    }
}

fn expr_children<'a>(expr: &'a Expr, out: &mut Children<'a>) {
    match expr {
        Expr::BoolOp(b) => out.extend(b.values.iter().map(AstNode::Expr)),
        Expr::NamedExpr(n) => {
            out.push(AstNode::Expr(&n.target));
            out.push(AstNode::Expr(&n.value));
        }
        Expr::BinOp(b) => {
            out.push(AstNode::Expr(&b.left));
            out.push(AstNode::Expr(&b.right));
        }
        Expr::UnaryOp(u) => out.push(AstNode::Expr(&u.operand)),
        Expr::Lambda(l) => {
            push_arguments(out, &l.args);
            out.push(AstNode::Expr(&l.body));
        }
        Expr::IfExp(i) => {
            out.push(AstNode::Expr(&i.test));
            out.push(AstNode::Expr(&i.body));
            out.push(AstNode::Expr(&i.orelse));
        }
        Expr::Dict(d) => {
            for (key, value) in d.keys.iter().zip(&d.values) {
                if let Some(key) = key {
                    out.push(AstNode::Expr(key));
                }
                out.push(AstNode::Expr(value));
            }
        }
        Expr::Set(s) => out.extend(s.elts.iter().map(AstNode::Expr)),
        Expr::ListComp(c) => {
            out.push(AstNode::Expr(&c.elt));
            push_comprehensions(out, &c.generators);
        }
        Expr::SetComp(c) => {
            out.push(AstNode::Expr(&c.elt));
            push_comprehensions(out, &c.generators);
        }
        Expr::DictComp(c) => {
            out.push(AstNode::Expr(&c.key));
            out.push(AstNode::Expr(&c.value));
            push_comprehensions(out, &c.generators);
        }
        Expr::GeneratorExp(g) => {
            out.push(AstNode::Expr(&g.elt));
            push_comprehensions(out, &g.generators);
        }
        Expr::Await(a) => out.push(AstNode::Expr(&a.value)),
        Expr::Yield(y) => push_expr(out, &y.value),
        Expr::YieldFrom(y) => out.push(AstNode::Expr(&y.value)),
        Expr::Compare(c) => {
            out.push(AstNode::Expr(&c.left));
            out.extend(c.comparators.iter().map(AstNode::Expr));
        }
        Expr::Call(c) => {
            out.push(AstNode::Expr(&c.func));
            out.extend(c.args.iter().map(AstNode::Expr));
            out.extend(c.keywords.iter().map(|k| AstNode::Expr(&k.value)));
        }
        Expr::FormattedValue(f) => {
            out.push(AstNode::Expr(&f.value));
            push_expr(out, &f.format_spec);
        }
        Expr::JoinedStr(j) => out.extend(j.values.iter().map(AstNode::Expr)),
        Expr::Attribute(a) => out.push(AstNode::Expr(&a.value)),
        Expr::Subscript(s) => {
            out.push(AstNode::Expr(&s.value));
            out.push(AstNode::Expr(&s.slice));
        }
        Expr::Starred(s) => out.push(AstNode::Expr(&s.value)),
        Expr::List(l) => out.extend(l.elts.iter().map(AstNode::Expr)),
        Expr::Tuple(t) => out.extend(t.elts.iter().map(AstNode::Expr)),
        Expr::Slice(s) => {
            push_expr(out, &s.lower);
            push_expr(out, &s.upper);
            push_expr(out, &s.step);
        }
        Expr::Constant(_) | Expr::Name(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ParsedTree;

    #[test]
    fn test_kind_categories() {
        assert!(NodeKind::Module.is_structural());
        assert!(NodeKind::FunctionDef.is_statement());
        assert!(NodeKind::TypeAlias.is_statement());
        assert!(!NodeKind::Call.is_statement());
        assert!(NodeKind::Call.is_expression());
        assert!(NodeKind::Slice.is_expression());
        assert!(!NodeKind::Module.is_expression());
        assert_eq!(NodeKind::ALL.len(), 56);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("functiondef".parse::<NodeKind>().unwrap(), NodeKind::FunctionDef);
        assert_eq!("Expr".parse::<NodeKind>().unwrap(), NodeKind::ExprStmt);
        assert!("Nope".parse::<NodeKind>().is_err());
    }

    #[test]
    fn test_kind_set() {
        let set = NodeKindSet::of(&[NodeKind::Call, NodeKind::Name]);
        assert!(set.contains(NodeKind::Call));
        assert!(!set.contains(NodeKind::ClassDef));
        assert_eq!(set.len(), 2);
        assert!(set.intersects(&NodeKindSet::expressions()));
        assert_eq!(NodeKindSet::all().len(), 56);
        assert_eq!(set.to_string(), "{Call, Name}");
    }

    #[test]
    fn test_children_in_source_order() {
        let tree = ParsedTree::parse("def f(a, b=1):\n    return a + b\n", "<test>").unwrap();
        let module_children = tree.root().children();
        assert_eq!(module_children.len(), 1);

        let func = module_children[0];
        assert_eq!(func.kind(), NodeKind::FunctionDef);
        assert_eq!(func.identity(), Some("f"));

        let kinds: Vec<NodeKind> = func.children().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Constant, NodeKind::Return]);
    }

    #[test]
    fn test_call_children_include_keywords() {
        let tree = ParsedTree::parse("run(a, b, key=c)\n", "<test>").unwrap();
        let stmt = tree.root().children()[0];
        let call = stmt.children()[0];
        assert_eq!(call.kind(), NodeKind::Call);
        assert_eq!(call.children().len(), 4);
    }

    #[test]
    fn test_match_children_include_case_patterns() {
        let source = "match status:\n    case 404 | 410:\n        gone()\n    case {\"code\": 86400}:\n        pass\n    case Point(x=0) if x:\n        pass\n    case None:\n        pass\n";
        let tree = ParsedTree::parse(source, "<test>").unwrap();
        let stmt = tree.root().children()[0];
        assert_eq!(stmt.kind(), NodeKind::Match);

        let kinds: Vec<NodeKind> = stmt.children().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Name,
                NodeKind::Constant,
                NodeKind::Constant,
                NodeKind::ExprStmt,
                NodeKind::Constant,
                NodeKind::Constant,
                NodeKind::Pass,
                NodeKind::Name,
                NodeKind::Constant,
                NodeKind::Name,
                NodeKind::Pass,
                NodeKind::Pass,
            ]
        );
    }
}
