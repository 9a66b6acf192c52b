#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Checked AST artifact for the CEL evaluation engine.
//!
//! This crate contains:
//! - Expression tree definitions (`expr`): nodes, payloads, the id factory
//! - Artifact wrapper (`ast`): the checked tree plus its source map
//! - Navigable layer (`navigable`): parent-linked, height/max-id annotated
//!   traversal for analyzers and optimizers
//!
//! Lexing, parsing, macro expansion, and type checking happen upstream; this
//! crate only models their output.

pub mod ast;
pub mod expr;
pub mod navigable;


// Re-export commonly used items at crate root
pub use ast::{CheckedAst, SourceInfo, SourceLocation};
pub use expr::{
    AstBuilder, CallExpr, ComprehensionExpr, Constant, Expr, ExprId, ExprKind, ListExpr, MapEntry,
    MapExpr, SelectExpr, StructExpr, StructField,
};
pub use navigable::{
    DEFAULT_DEPTH_LIMIT, NavigableAst, NavigableError, NavigableNode, Nodes, TraversalOrder,
    collect,
};
