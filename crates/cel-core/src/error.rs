//! Evaluation errors.
//!
//! Errors are first-class runtime values: any sub-evaluation may produce one
//! and it propagates outward until absorbed by a short-circuit rule or
//! surfaced at the program root.

use serde::{Deserialize, Serialize};

/// Classification of evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Ill-formed input to a built-in (e.g. a malformed duration string).
    BadFormat,
    /// No function overload accepts the given argument types.
    NoSuchOverload,
    /// More than one overload accepts the given arguments.
    AmbiguousOverload,
    /// Identifier or attribute not present.
    AttributeNotFound,
    /// Map lookup missed.
    NoSuchKey,
    /// Structured-type field not present.
    NoSuchField,
    /// Checked arithmetic or conversion out of range.
    NumericOverflow,
    DivisionByZero,
    /// Argument outside its domain (e.g. a negative list index).
    InvalidArgument,
    RecursionDepthExceeded,
    IterationBudgetExceeded,
    Cancelled,
    /// Engine invariant broken.
    Internal,
}

impl ErrorKind {
    /// Stable lowercase name, used in messages and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::BadFormat => "bad format",
            Self::NoSuchOverload => "no such overload",
            Self::AmbiguousOverload => "ambiguous overload",
            Self::AttributeNotFound => "attribute not found",
            Self::NoSuchKey => "no such key",
            Self::NoSuchField => "no such field",
            Self::NumericOverflow => "numeric overflow",
            Self::DivisionByZero => "division by zero",
            Self::InvalidArgument => "invalid argument",
            Self::RecursionDepthExceeded => "recursion depth exceeded",
            Self::IterationBudgetExceeded => "iteration budget exceeded",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal error",
        }
    }
}

/// A single deferred evaluation error.
///
/// Carries the failure class, a human-readable message, and (once known) the
/// id of the expression node that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    pub expr_id: Option<u64>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expr_id: None,
        }
    }

    /// Attach the producing expression id, keeping an already-set id.
    pub fn with_expr_id(mut self, id: u64) -> Self {
        self.expr_id.get_or_insert(id);
        self
    }

    pub fn bad_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadFormat, message)
    }

    pub fn no_such_overload(signature: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::NoSuchOverload,
            format!("no such overload: {signature}"),
        )
    }

    pub fn ambiguous_overload(signature: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::AmbiguousOverload,
            format!("ambiguous overloads: {signature}"),
        )
    }

    pub fn attribute_not_found(name: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::AttributeNotFound,
            format!("no such attribute: {name}"),
        )
    }

    pub fn no_such_key(key: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NoSuchKey, format!("no such key: {key}"))
    }

    pub fn no_such_field(field: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NoSuchField, format!("no such field: {field}"))
    }

    pub fn numeric_overflow(op: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::NumericOverflow,
            format!("numeric overflow: {op}"),
        )
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn recursion_depth_exceeded(limit: usize) -> Self {
        Self::new(
            ErrorKind::RecursionDepthExceeded,
            format!("recursion depth exceeded limit of {limit}"),
        )
    }

    pub fn iteration_budget_exceeded(limit: u64) -> Self {
        Self::new(
            ErrorKind::IterationBudgetExceeded,
            format!("iteration budget exceeded limit of {limit}"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "evaluation cancelled")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
