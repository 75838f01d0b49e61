//! Gated depth-first traversal
//!
//! Every popped node passes three gates, in order:
//!
//! 1. depth: nodes deeper than `max_depth` are skipped with their subtree;
//! 2. pruning: excluded kinds are skipped, and a node that is not a target
//!    is pruned when no target kind can occur anywhere below it;
//! 3. memoization: a node already visited in this traversal (same kind,
//!    byte range and identifying name) is not walked again and keeps the
//!    result recorded the first time.
//!
//! Pruning relies on [`NodeKind::reachable`], which is conservative: it may
//! walk more than needed but never prunes a subtree holding a target.

use crate::ast::node::{AstNode, NodeKind, NodeKindSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::AddAssign;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_true")]
    pub memoize: bool,

    /// Node kinds skipped together with their subtrees.
    #[serde(default)]
    pub exclude: Vec<NodeKind>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            memoize: true,
            exclude: Vec::new(),
        }
    }
}

fn default_max_depth() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Outcome of the per-node gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Visit,
    SkipDepth,
    Exclude,
    Prune,
}

/// Where a node sits in the walk. Handed to every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeContext {
    pub depth: usize,
    pub parent: Option<NodeKind>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalStats {
    pub traversals: usize,
    pub visited: usize,
    pub evaluated: usize,
    pub skipped_depth: usize,
    pub excluded: usize,
    pub pruned: usize,
    pub memo_hits: usize,
    pub pattern_errors: usize,
}

impl AddAssign for TraversalStats {
    fn add_assign(&mut self, other: Self) {
        self.traversals += other.traversals;
        self.visited += other.visited;
        self.evaluated += other.evaluated;
        self.skipped_depth += other.skipped_depth;
        self.excluded += other.excluded;
        self.pruned += other.pruned;
        self.memo_hits += other.memo_hits;
        self.pattern_errors += other.pattern_errors;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeKey<'a> {
    kind: NodeKind,
    start: usize,
    end: usize,
    identity: Option<&'a str>,
}

impl<'a> NodeKey<'a> {
    fn of(node: &AstNode<'a>) -> Self {
        let (start, end) = node.byte_range();
        Self {
            kind: node.kind(),
            start,
            end,
            identity: node.identity(),
        }
    }
}

struct Frame<'a> {
    node: AstNode<'a>,
    depth: usize,
    parent: Option<NodeKind>,
}

pub struct TraversalVisitor {
    config: TraversalConfig,
    excluded: NodeKindSet,
    stats: TraversalStats,
}

impl TraversalVisitor {
    pub fn new(config: TraversalConfig) -> Self {
        let excluded = config.exclude.iter().copied().collect();
        Self {
            config,
            excluded,
            stats: TraversalStats::default(),
        }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    pub fn stats(&self) -> TraversalStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = TraversalStats::default();
    }

    pub(crate) fn record_pattern_errors(&mut self, count: usize) {
        self.stats.pattern_errors += count;
    }

    pub fn gate(&self, kind: NodeKind, depth: usize, targets: &NodeKindSet) -> Gate {
        if depth > self.config.max_depth {
            return Gate::SkipDepth;
        }
        if self.excluded.contains(kind) {
            return Gate::Exclude;
        }
        if !targets.contains(kind) && !kind.reachable().intersects(targets) {
            return Gate::Prune;
        }
        Gate::Visit
    }

    /// Walk `root` and evaluate every node whose kind is in `targets`.
    pub fn traverse<'a, R, F>(
        &mut self,
        root: AstNode<'a>,
        targets: NodeKindSet,
        evaluate: F,
    ) -> Vec<(AstNode<'a>, R)>
    where
        F: FnMut(&AstNode<'a>, &NodeContext) -> R,
    {
        self.traverse_roots(&[root], targets, evaluate)
    }

    /// Walk several roots as one traversal. Roots may overlap; nodes reached
    /// twice are memoized rather than evaluated again.
    pub fn traverse_roots<'a, R, F>(
        &mut self,
        roots: &[AstNode<'a>],
        targets: NodeKindSet,
        mut evaluate: F,
    ) -> Vec<(AstNode<'a>, R)>
    where
        F: FnMut(&AstNode<'a>, &NodeContext) -> R,
    {
        self.stats.traversals += 1;

        let mut results = Vec::new();
        let mut seen: HashSet<NodeKey<'a>> = HashSet::new();
        let mut stack: Vec<Frame<'a>> = roots
            .iter()
            .rev()
            .map(|root| Frame {
                node: *root,
                depth: 0,
                parent: None,
            })
            .collect();

        while let Some(frame) = stack.pop() {
            let kind = frame.node.kind();
            match self.gate(kind, frame.depth, &targets) {
                Gate::Visit => {}
                Gate::SkipDepth => {
                    self.stats.skipped_depth += 1;
                    continue;
                }
                Gate::Exclude => {
                    self.stats.excluded += 1;
                    continue;
                }
                Gate::Prune => {
                    self.stats.pruned += 1;
                    continue;
                }
            }

            if self.config.memoize {
                let key = NodeKey::of(&frame.node);
                if !seen.insert(key) {
                    self.stats.memo_hits += 1;
                    trace!(kind = %kind, "memoized node reused");
                    continue;
                }
            }

            self.stats.visited += 1;

            if targets.contains(kind) {
                let context = NodeContext {
                    depth: frame.depth,
                    parent: frame.parent,
                };
                let result = evaluate(&frame.node, &context);
                self.stats.evaluated += 1;
                results.push((frame.node, result));
            }

            let children = frame.node.children();
            stack.extend(children.into_iter().rev().map(|child| Frame {
                node: child,
                depth: frame.depth + 1,
                parent: Some(kind),
            }));
        }

        results
    }

    /// Collect every node of the target kinds.
    pub fn collect<'a>(&mut self, root: AstNode<'a>, targets: NodeKindSet) -> Vec<AstNode<'a>> {
        self.traverse(root, targets, |_, _| ())
            .into_iter()
            .map(|(node, _)| node)
            .collect()
    }
}

impl Default for TraversalVisitor {
    fn default() -> Self {
        Self::new(TraversalConfig::default())
    }
}
