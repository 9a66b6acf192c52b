//! Overload records, function registry, and table-driven dispatch.
//!
//! Every built-in and custom function is a set of [`Overload`] data records:
//! a stable id, expected argument kinds, a strictness flag, and the
//! implementation. Dispatch selects the unique overload whose expected kinds
//! admit the runtime arguments, or fails with no-such-overload /
//! ambiguous-overload.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use cel_core::{EvalError, UnknownSet, Value};

/// Expected kind of one overload argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    List,
    Map,
    Struct,
    Type,
    Optional,
    Null,
    /// Accepts any value, including error and unknown-set for non-strict
    /// overloads.
    Any,
}

impl ArgKind {
    /// Whether a runtime value is assignable to this expectation.
    ///
    /// Null is assignable to structured-type expectations but not to
    /// primitive ones. Errors and unknown-sets are only admitted by `Any`;
    /// strict overloads never see them because the dispatcher substitutes
    /// them first.
    pub fn admits(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Null, Value::Null) => true,
            (Self::Struct, Value::Struct(_) | Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Uint, Value::Uint(_)) => true,
            (Self::Double, Value::Double(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Bytes, Value::Bytes(_)) => true,
            (Self::Duration, Value::Duration(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::List, Value::List(_)) => true,
            (Self::Map, Value::Map(_)) => true,
            (Self::Type, Value::Type(_)) => true,
            (Self::Optional, Value::Optional(_)) => true,
            _ => false,
        }
    }
}

pub type OverloadImpl = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// One concrete implementation of a function symbol.
#[derive(Clone)]
pub struct Overload {
    id: String,
    operand_kinds: Vec<ArgKind>,
    strict: bool,
    f: OverloadImpl,
}

impl Overload {
    /// A strict overload: never invoked with error or unknown arguments.
    pub fn new(
        id: impl Into<String>,
        operand_kinds: impl Into<Vec<ArgKind>>,
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            operand_kinds: operand_kinds.into(),
            strict: true,
            f: Arc::new(f),
        }
    }

    /// A non-strict overload: sees error and unknown arguments as-is.
    pub fn non_strict(
        id: impl Into<String>,
        operand_kinds: impl Into<Vec<ArgKind>>,
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            strict: false,
            ..Self::new(id, operand_kinds, f)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Whether the runtime arguments are assignable to this overload.
    pub fn matches(&self, args: &[Value]) -> bool {
        self.operand_kinds.len() == args.len()
            && self
                .operand_kinds
                .iter()
                .zip(args.iter())
                .all(|(kind, arg)| kind.admits(arg))
    }

    pub fn invoke(&self, args: &[Value]) -> Value {
        (self.f)(args)
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overload")
            .field("id", &self.id)
            .field("operand_kinds", &self.operand_kinds)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

/// Failure while assembling a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    #[error("duplicate overload id {0:?}")]
    DuplicateOverload(String),
}

/// Immutable-once-built table of overloads, keyed by overload id, plus the
/// candidate-id list per function symbol in registration order.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    overloads: IndexMap<String, Overload>,
    functions: IndexMap<String, Vec<String>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one overload under a function symbol.
    pub fn add(&mut self, function: &str, overload: Overload) -> Result<(), BindingError> {
        if self.overloads.contains_key(overload.id()) {
            return Err(BindingError::DuplicateOverload(overload.id().to_string()));
        }
        self.functions
            .entry(function.to_string())
            .or_default()
            .push(overload.id().to_string());
        self.overloads.insert(overload.id().to_string(), overload);
        Ok(())
    }

    pub fn overload(&self, id: &str) -> Option<&Overload> {
        self.overloads.get(id)
    }

    /// Ordered candidate overload ids for a function symbol.
    pub fn candidates(&self, function: &str) -> &[String] {
        self.functions
            .get(function)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_function(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    pub fn function_symbols(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.overloads.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

/// Resolves and invokes calls against an engine registry with an optional
/// late-bound layer.
///
/// Overload ids resolve engine-first: a late binding can add overloads but
/// never replace a built-in one.
pub struct Dispatcher<'a> {
    registry: &'a FunctionRegistry,
    late: Option<&'a FunctionRegistry>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a FunctionRegistry, late: Option<&'a FunctionRegistry>) -> Self {
        Self { registry, late }
    }

    fn find_overload(&self, id: &str) -> Option<&Overload> {
        self.registry
            .overload(id)
            .or_else(|| self.late.and_then(|late| late.overload(id)))
    }

    /// Candidate ids for a call: the checker-attached list when present,
    /// otherwise every overload registered for the function symbol.
    fn candidate_ids<'c>(&'c self, function: &str, attached: &'c [String]) -> Vec<&'c str> {
        if !attached.is_empty() {
            return attached.iter().map(String::as_str).collect();
        }
        let mut ids: Vec<&str> = self
            .registry
            .candidates(function)
            .iter()
            .map(String::as_str)
            .collect();
        if let Some(late) = self.late {
            ids.extend(late.candidates(function).iter().map(String::as_str));
        }
        ids
    }

    /// Resolve and invoke, applying strict-argument short-circuiting.
    pub fn dispatch(&self, function: &str, attached: &[String], args: &[Value]) -> Value {
        let candidates = self.candidate_ids(function, attached);
        let overloads: Vec<&Overload> = candidates
            .iter()
            .filter_map(|id| self.find_overload(id))
            .collect();

        let has_absorbing = args.iter().any(Value::is_absorbing);
        if has_absorbing {
            // Only non-strict overloads may observe error/unknown arguments.
            let matched: Vec<&&Overload> = overloads
                .iter()
                .filter(|ov| !ov.is_strict() && ov.matches(args))
                .collect();
            match matched.as_slice() {
                [overload] => {
                    tracing::trace!(function, overload = overload.id(), "dispatch non-strict");
                    return overload.invoke(args);
                }
                [] => return absorb_arguments(args),
                _ => {
                    return EvalError::ambiguous_overload(signature(function, args)).into();
                }
            }
        }

        let matched: Vec<&&Overload> = overloads.iter().filter(|ov| ov.matches(args)).collect();
        match matched.as_slice() {
            [overload] => {
                tracing::trace!(function, overload = overload.id(), "dispatch");
                overload.invoke(args)
            }
            [] => EvalError::no_such_overload(signature(function, args)).into(),
            _ => EvalError::ambiguous_overload(signature(function, args)).into(),
        }
    }
}

/// Strict-argument substitution: the union of unknown-set arguments when any
/// exist, otherwise the first error argument.
fn absorb_arguments(args: &[Value]) -> Value {
    let mut unknowns: Option<UnknownSet> = None;
    for arg in args {
        if let Value::Unknown(set) = arg {
            unknowns = Some(match unknowns {
                Some(merged) => merged.union(set),
                None => set.clone(),
            });
        }
    }
    if let Some(set) = unknowns {
        return Value::Unknown(set);
    }
    args.iter()
        .find(|arg| arg.is_error())
        .cloned()
        .unwrap_or_else(|| EvalError::internal("absorb called without absorbing argument").into())
}

/// Human-readable call signature for overload errors.
pub(crate) fn signature(function: &str, args: &[Value]) -> String {
    let kinds: Vec<&str> = args.iter().map(Value::kind_name).collect();
    format!("{function}({})", kinds.join(", "))
}
