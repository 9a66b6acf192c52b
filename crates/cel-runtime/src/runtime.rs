//! Runtime builder and program surface.
//!
//! A [`RuntimeBuilder`] assembles the provider, the (filtered) standard
//! library, custom bindings, feature flags, and limits into an immutable
//! [`Runtime`]. The runtime turns checked ASTs into [`Program`]s, which
//! evaluate against activations, optionally with late-bound functions, a
//! listener, or a cancellation token.

use std::collections::HashSet;
use std::sync::Arc;

use cel_ast::{CheckedAst, ExprId, SourceLocation};
use cel_core::{DynProvider, ErrorKind, EvalError, TypeProvider, Value};

use crate::activation::Activation;
use crate::config::{CancellationToken, EvalLimits, Features};
use crate::dispatcher::{BindingError, Dispatcher, FunctionRegistry, Overload};
use crate::interpreter::Interpreter;
use crate::listener::{EvalListener, NoopListener};
use crate::stdlib::{StdFilter, install_standard};

/// Error surfaced to the caller when a program's root value is an error.
///
/// Carries the failure kind, a message (with source position folded in when
/// the artifact has one), and the structured location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProgramError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl ProgramError {
    fn from_eval(err: EvalError, ast: &CheckedAst) -> Self {
        let location = err
            .expr_id
            .and_then(|id| ast.source_info.location(ExprId(id)));
        let message = match location {
            Some(loc) => format!("{} (at line {}, column {})", err.message, loc.line, loc.column),
            None => err.message,
        };
        Self {
            kind: err.kind,
            message,
            location,
        }
    }
}

/// Staged configuration for a [`Runtime`].
pub struct RuntimeBuilder {
    provider: Arc<dyn TypeProvider>,
    features: Features,
    limits: EvalLimits,
    use_standard: bool,
    std_include: Option<HashSet<String>>,
    std_exclude: HashSet<String>,
    std_predicate: Option<Box<dyn Fn(&str) -> bool + Send + Sync>>,
    custom: Vec<(String, Overload)>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            provider: Arc::new(DynProvider::new()),
            features: Features::default(),
            limits: EvalLimits::default(),
            use_standard: true,
            std_include: None,
            std_exclude: HashSet::new(),
            std_predicate: None,
            custom: Vec::new(),
        }
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_provider(mut self, provider: Arc<dyn TypeProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Skip the standard library entirely.
    pub fn without_standard_functions(mut self) -> Self {
        self.use_standard = false;
        self
    }

    /// Restrict the standard library to the named function symbols.
    pub fn include_standard_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.std_include = Some(functions.into_iter().map(Into::into).collect());
        self
    }

    /// Drop one function symbol from the standard library.
    pub fn exclude_standard_function(mut self, function: impl Into<String>) -> Self {
        self.std_exclude.insert(function.into());
        self
    }

    /// Keep only standard functions accepted by the predicate.
    pub fn filter_standard_functions(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.std_predicate = Some(Box::new(predicate));
        self
    }

    /// Register a custom overload under a function symbol.
    pub fn with_function(mut self, function: impl Into<String>, overload: Overload) -> Self {
        self.custom.push((function.into(), overload));
        self
    }

    pub fn build(self) -> Result<Runtime, BindingError> {
        let mut registry = FunctionRegistry::new();
        if self.use_standard {
            let filter = StdFilter {
                include: self.std_include.as_ref(),
                exclude: &self.std_exclude,
                predicate: self.std_predicate.as_deref(),
            };
            install_standard(&mut registry, self.features, self.limits, &filter)?;
        }
        for (function, overload) in self.custom {
            registry.add(&function, overload)?;
        }
        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                provider: self.provider,
                registry,
                features: self.features,
                limits: self.limits,
            }),
        })
    }
}

struct RuntimeInner {
    provider: Arc<dyn TypeProvider>,
    registry: FunctionRegistry,
    features: Features,
    limits: EvalLimits,
}

/// Immutable evaluation engine; cloning shares the underlying state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Bind a checked AST to this runtime.
    pub fn program(&self, ast: CheckedAst) -> Program {
        Program {
            runtime: self.clone(),
            ast: Arc::new(ast),
        }
    }

    pub fn features(&self) -> Features {
        self.inner.features
    }

    pub fn limits(&self) -> EvalLimits {
        self.inner.limits
    }
}

/// A checked AST bound to a runtime, ready for repeated evaluation.
///
/// Programs are immutable and cheap to clone; one program may evaluate
/// concurrently on many threads, each call with its own activation.
#[derive(Clone)]
pub struct Program {
    runtime: Runtime,
    ast: Arc<CheckedAst>,
}

impl Program {
    pub fn ast(&self) -> &CheckedAst {
        &self.ast
    }

    /// Evaluate against an activation.
    pub fn eval(&self, activation: &Activation) -> Result<Value, ProgramError> {
        self.eval_inner(activation, None, &mut NoopListener, None)
    }

    /// Evaluate with an additional per-call function binding layer.
    pub fn eval_with(
        &self,
        activation: &Activation,
        late_bindings: &FunctionRegistry,
    ) -> Result<Value, ProgramError> {
        self.eval_inner(activation, Some(late_bindings), &mut NoopListener, None)
    }

    /// Evaluate while reporting every sub-expression result to `listener`.
    pub fn trace(
        &self,
        activation: &Activation,
        listener: &mut dyn EvalListener,
    ) -> Result<Value, ProgramError> {
        self.eval_inner(activation, None, listener, None)
    }

    /// Evaluate under a cancellation token.
    pub fn eval_cancellable(
        &self,
        activation: &Activation,
        token: &CancellationToken,
    ) -> Result<Value, ProgramError> {
        self.eval_inner(activation, None, &mut NoopListener, Some(token))
    }

    fn eval_inner(
        &self,
        activation: &Activation,
        late_bindings: Option<&FunctionRegistry>,
        listener: &mut dyn EvalListener,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value, ProgramError> {
        let _span = tracing::debug_span!("eval", root = self.ast.expr.id.0).entered();
        let inner = &self.runtime.inner;
        let dispatcher = Dispatcher::new(&inner.registry, late_bindings);
        let mut interpreter = Interpreter::new(
            inner.provider.as_ref(),
            dispatcher,
            inner.features,
            inner.limits,
            activation,
            listener,
            cancel,
        );
        match interpreter.eval(&self.ast.expr) {
            Value::Error(err) => Err(ProgramError::from_eval(*err, &self.ast)),
            value => Ok(value),
        }
    }
}
