//! Variable bindings and attribute resolution.
//!
//! An activation maps (possibly dotted) variable names to values and chains
//! to a parent; a child shadows its parent. An optional attribute resolver
//! intercepts identifier and select evaluation for partial-input scenarios.
//!
//! Comprehension variables never live in activations: the interpreter owns a
//! private scope stack whose depth is restored on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cel_core::{Attribute, AttributePattern, PatternMatch, UnknownSet, Value};

/// Outcome of asking a resolver about one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The attribute resolved to a concrete value.
    Value(Value),
    /// The attribute is (partially) unknown.
    Unknown(UnknownSet),
    /// The resolver has no opinion; fall through to the activation.
    Unresolved,
}

/// Resolves concrete attributes ahead of ordinary variable lookup.
pub trait AttributeResolver: Send + Sync {
    fn resolve(&self, attribute: &Attribute) -> Resolution;
}

/// Resolver that marks every attribute covered by one of its patterns as
/// unknown. A full or partial pattern match both count: a partially matched
/// attribute may still select into unknown territory.
#[derive(Debug, Clone, Default)]
pub struct UnknownPatterns {
    patterns: Vec<AttributePattern>,
}

impl UnknownPatterns {
    pub fn new(patterns: Vec<AttributePattern>) -> Self {
        Self { patterns }
    }
}

impl AttributeResolver for UnknownPatterns {
    fn resolve(&self, attribute: &Attribute) -> Resolution {
        for pattern in &self.patterns {
            if pattern.match_against(attribute) != PatternMatch::Miss {
                tracing::trace!(attribute = %attribute, pattern = %pattern, "attribute unknown");
                return Resolution::Unknown(UnknownSet::singleton(attribute.clone()));
            }
        }
        Resolution::Unresolved
    }
}

/// A scoped, chainable set of variable bindings.
#[derive(Clone, Default)]
pub struct Activation {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Activation>>,
    resolver: Option<Arc<dyn AttributeResolver>>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable; dotted names are permitted and matched whole.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn AttributeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Convenience for the common partial-input setup.
    pub fn with_unknown_patterns(self, patterns: Vec<AttributePattern>) -> Self {
        self.with_resolver(Arc::new(UnknownPatterns::new(patterns)))
    }

    /// Create a child activation that shadows `parent`.
    pub fn extend(parent: Arc<Activation>) -> Self {
        Self {
            bindings: HashMap::new(),
            parent: Some(parent),
            resolver: None,
        }
    }

    /// Look up a variable through the activation chain.
    pub fn resolve_variable(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.bindings.get(name) {
            return Some(value);
        }
        self.parent.as_ref()?.resolve_variable(name)
    }

    /// The nearest resolver in the chain.
    pub fn resolver(&self) -> Option<&dyn AttributeResolver> {
        if let Some(resolver) = &self.resolver {
            return Some(resolver.as_ref());
        }
        self.parent.as_ref()?.resolver()
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Activation")
            .field("bindings", &names)
            .field("has_parent", &self.parent.is_some())
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Interpreter-owned stack of comprehension variable frames.
///
/// Push/pop are O(1); lookup scans top-down so inner frames shadow outer
/// ones. The interpreter records the depth on scope entry and truncates back
/// to it on every exit path, so frames cannot leak past an error.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    frames: Vec<(String, Value)>,
}

impl ScopeStack {
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: Value) {
        self.frames.push((name.into(), value));
    }

    pub(crate) fn pop_to(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|(frame_name, _)| frame_name == name)
            .map(|(_, value)| value)
    }

    /// Replace the topmost binding with the given name.
    pub(crate) fn rebind(&mut self, name: &str, value: Value) -> bool {
        for (frame_name, frame_value) in self.frames.iter_mut().rev() {
            if frame_name == name {
                *frame_value = value;
                return true;
            }
        }
        false
    }
}
