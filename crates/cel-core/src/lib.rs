#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core data model for the CEL evaluation engine.
//!
//! Four layers:
//! - **Values** (`value`): the tagged runtime value variant and its containers
//! - **Comparison** (`cmp`): runtime equality, ordering, and equality-consistent hashing
//! - **Attributes** (`attr`): qualified input paths, wildcard patterns, unknown-sets
//! - **Provider boundary** (`provider`): structured-type declarations and construction
//!
//! Everything here is shared by the AST and runtime crates and carries no
//! evaluation logic of its own.

pub mod attr;
pub mod cmp;
pub mod error;
pub mod provider;
pub mod types;
pub mod value;

#[cfg(test)]
mod attr_tests;
#[cfg(test)]
mod provider_tests;

// Re-export commonly used items at crate root
pub use attr::{Attribute, AttributePattern, PatternMatch, PatternQualifier, Qualifier, UnknownSet};
pub use cmp::{StructEquality, runtime_compare, runtime_contains, runtime_equals,
    runtime_equals_with, value_hash};
pub use error::{ErrorKind, EvalError};
pub use provider::{DynProvider, FieldDecl, FieldKind, MessageDecl, TypeProvider};
pub use types::CelType;
pub use value::{MapKey, MapValue, OptionalValue, StructValue, Value};
