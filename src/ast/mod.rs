//! Tree model and traversal
//!
//! Parsed modules, a uniform borrowed node view, location mapping, and the
//! gated depth-first walker used by pattern matching.

pub mod location;
pub mod node;
pub mod traversal;
pub mod tree;

pub use location::{LineIndex, SourceLocationExt};
pub use node::{AstNode, NodeKind, NodeKindSet};
pub use traversal::{Gate, NodeContext, TraversalConfig, TraversalStats, TraversalVisitor};
pub use tree::ParsedTree;
