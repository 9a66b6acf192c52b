//! The tree-walking evaluator.
//!
//! Evaluation is a pure function of (AST, activation): errors and unknowns
//! are ordinary values flowing upward, never unwinding, so scope frames are
//! restored on every exit path. The interpreter owns its comprehension scope
//! stack and consults the dispatcher for calls, the provider for field access
//! and construction, and the attribute resolver for unknown tracking.

use indexmap::IndexMap;
use std::sync::Arc;

use cel_ast::{ComprehensionExpr, Constant, Expr, ExprKind, SelectExpr};
use cel_core::{
    Attribute, EvalError, MapKey, MapValue, Qualifier, TypeProvider, UnknownSet, Value,
};

use crate::activation::{Activation, Resolution, ScopeStack};
use crate::config::{CancellationToken, EvalLimits, Features};
use crate::dispatcher::Dispatcher;
use crate::listener::EvalListener;

pub(crate) struct Interpreter<'a> {
    provider: &'a dyn TypeProvider,
    dispatcher: Dispatcher<'a>,
    features: Features,
    limits: EvalLimits,
    activation: &'a Activation,
    listener: &'a mut dyn EvalListener,
    cancel: Option<&'a CancellationToken>,
    scopes: ScopeStack,
    depth: usize,
    /// Non-zero while evaluating the operand chain of a select that already
    /// consulted the resolver with the maximal attribute. Prefixes of a
    /// missed attribute must not re-consult the resolver, or a pattern like
    /// `a.b` would swallow `a.c` through the shared root.
    resolver_suppressed: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        provider: &'a dyn TypeProvider,
        dispatcher: Dispatcher<'a>,
        features: Features,
        limits: EvalLimits,
        activation: &'a Activation,
        listener: &'a mut dyn EvalListener,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            features,
            limits,
            activation,
            listener,
            cancel,
            scopes: ScopeStack::default(),
            depth: 0,
            resolver_suppressed: 0,
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expr) -> Value {
        self.eval_expr(expr)
    }

    /// Current comprehension scope depth; equal before and after any eval.
    #[cfg(test)]
    pub(crate) fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    fn eval_expr(&mut self, expr: &Expr) -> Value {
        if self.depth >= self.limits.max_recursion_depth {
            tracing::debug!(
                id = expr.id.0,
                limit = self.limits.max_recursion_depth,
                "recursion depth exceeded"
            );
            let value = Value::error(
                EvalError::recursion_depth_exceeded(self.limits.max_recursion_depth)
                    .with_expr_id(expr.id.0),
            );
            self.listener.on_value(expr.id, &value);
            return value;
        }
        self.depth += 1;

        let mut value = match &expr.kind {
            ExprKind::Const(constant) => self.eval_const(constant),
            ExprKind::Ident(name) => self.eval_ident(name),
            ExprKind::Select(select) => self.eval_select(select),
            ExprKind::Call(call) => self.eval_call(call),
            ExprKind::List(list) => self.eval_list(list),
            ExprKind::Map(map) => self.eval_map(map),
            ExprKind::Struct(st) => self.eval_struct(st),
            ExprKind::Comprehension(comp) => self.eval_comprehension(comp),
        };

        self.depth -= 1;
        if let Value::Error(err) = &mut value {
            err.expr_id.get_or_insert(expr.id.0);
        }
        self.listener.on_value(expr.id, &value);
        value
    }

    fn eval_const(&self, constant: &Constant) -> Value {
        match constant {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Uint(u) => {
                if self.features.unsigned_longs {
                    Value::Uint(*u)
                } else if *u <= i64::MAX as u64 {
                    // Narrowed representation for hosts without unsigned longs.
                    Value::Int(*u as i64)
                } else {
                    EvalError::numeric_overflow("uint constant out of int range").into()
                }
            }
            Constant::Double(d) => Value::Double(*d),
            Constant::String(s) => Value::string(s.as_str()),
            Constant::Bytes(b) => Value::bytes(b.clone()),
        }
    }

    fn eval_ident(&mut self, name: &str) -> Value {
        if let Some(value) = self.scopes.lookup(name) {
            return value.clone();
        }
        if self.resolver_suppressed == 0 {
            if let Some(resolver) = self.activation.resolver() {
                match resolver.resolve(&attribute_for_name(name)) {
                    Resolution::Value(value) => return value,
                    Resolution::Unknown(set) => return Value::Unknown(set),
                    Resolution::Unresolved => {}
                }
            }
        }
        if let Some(value) = self.activation.resolve_variable(name) {
            return value.clone();
        }
        EvalError::attribute_not_found(name).into()
    }

    fn eval_select(&mut self, select: &SelectExpr) -> Value {
        let mut in_chain = false;
        if !select.test_only {
            // A pure identifier/select chain names an attribute; the resolver
            // and flat dotted bindings (package qualifiers) see the whole
            // chain before any field access happens.
            if let Some(attr) = select_chain_attribute(select) {
                if self.scopes.lookup(attr.root()).is_none() {
                    if self.resolver_suppressed == 0 {
                        if let Some(resolver) = self.activation.resolver() {
                            match resolver.resolve(&attr) {
                                Resolution::Value(value) => return value,
                                Resolution::Unknown(set) => return Value::Unknown(set),
                                Resolution::Unresolved => {}
                            }
                        }
                        in_chain = true;
                    }
                    if let Some(dotted) = dotted_name(&attr) {
                        if let Some(value) = self.activation.resolve_variable(&dotted) {
                            return value.clone();
                        }
                    }
                }
            }
        }

        // The maximal attribute missed; its prefixes must fall through to
        // ordinary variable resolution.
        if in_chain {
            self.resolver_suppressed += 1;
        }
        let operand = self.eval_expr(&select.operand);
        if in_chain {
            self.resolver_suppressed -= 1;
        }

        if operand.is_absorbing() {
            return operand;
        }
        if select.test_only {
            self.provider.has_field(&operand, &select.field)
        } else {
            self.provider.select_field(&operand, &select.field)
        }
    }

    fn eval_call(&mut self, call: &cel_ast::CallExpr) -> Value {
        // Short-circuit forms are interpreter-owned, not dispatched.
        if call.target.is_none() {
            match (call.function.as_str(), call.args.as_slice()) {
                ("_&&_", [lhs, rhs]) => return self.eval_and(lhs, rhs),
                ("_||_", [lhs, rhs]) => return self.eval_or(lhs, rhs),
                ("_?_:_", [cond, then, els]) => return self.eval_ternary(cond, then, els),
                ("@not_strictly_false", [arg]) => {
                    let value = self.eval_expr(arg);
                    return Value::Bool(!matches!(value, Value::Bool(false)));
                }
                _ => {}
            }
        }

        let mut args = Vec::with_capacity(call.args.len() + 1);
        if let Some(target) = &call.target {
            args.push(self.eval_expr(target));
        }
        for arg in &call.args {
            args.push(self.eval_expr(arg));
        }

        if self.is_cancelled() {
            tracing::debug!(function = call.function.as_str(), "evaluation cancelled");
            return EvalError::cancelled().into();
        }
        tracing::trace!(function = call.function.as_str(), argc = args.len(), "call");
        self.dispatcher.dispatch(&call.function, &call.overload_ids, &args)
    }

    fn eval_and(&mut self, lhs: &Expr, rhs: &Expr) -> Value {
        let left = self.eval_expr(lhs);
        if self.features.short_circuit && matches!(left, Value::Bool(false)) {
            return Value::Bool(false);
        }
        let right = self.eval_expr(rhs);
        combine_logical(left, right, true)
    }

    fn eval_or(&mut self, lhs: &Expr, rhs: &Expr) -> Value {
        let left = self.eval_expr(lhs);
        if self.features.short_circuit && matches!(left, Value::Bool(true)) {
            return Value::Bool(true);
        }
        let right = self.eval_expr(rhs);
        combine_logical(left, right, false)
    }

    fn eval_ternary(&mut self, cond: &Expr, then: &Expr, els: &Expr) -> Value {
        let cond = self.eval_expr(cond);
        if self.features.short_circuit {
            match cond {
                Value::Bool(true) => self.eval_expr(then),
                Value::Bool(false) => self.eval_expr(els),
                value if value.is_absorbing() => value,
                other => ternary_overload_error(&other),
            }
        } else {
            // Both branches evaluate for observability; the result does not
            // change.
            let then_value = self.eval_expr(then);
            let else_value = self.eval_expr(els);
            match cond {
                Value::Bool(true) => then_value,
                Value::Bool(false) => else_value,
                value if value.is_absorbing() => value,
                other => ternary_overload_error(&other),
            }
        }
    }

    fn eval_list(&mut self, list: &cel_ast::ListExpr) -> Value {
        let mut out = Vec::with_capacity(list.elements.len());
        let mut absorb = Absorb::default();

        for (index, element) in list.elements.iter().enumerate() {
            let value = self.eval_expr(element);
            if absorb.observe(&value) {
                continue;
            }
            if list.optional_indices.contains(&(index as u32)) {
                match value {
                    Value::Optional(optional) => {
                        if let Some(inner) = optional.into_value() {
                            out.push(inner);
                        }
                    }
                    other => absorb.observe_error(EvalError::invalid_argument(format!(
                        "expected optional value at index {index}, found {}",
                        other.kind_name()
                    ))),
                }
            } else {
                out.push(value);
            }
        }

        absorb.finish().unwrap_or_else(|| Value::list(out))
    }

    fn eval_map(&mut self, map: &cel_ast::MapExpr) -> Value {
        let mut evaluated = Vec::with_capacity(map.entries.len());
        let mut absorb = Absorb::default();

        for entry in &map.entries {
            let key = self.eval_expr(&entry.key);
            let value = self.eval_expr(&entry.value);
            let key_absorbed = absorb.observe(&key);
            if absorb.observe(&value) || key_absorbed {
                continue;
            }
            evaluated.push((key, value, entry.optional));
        }
        if let Some(absorbed) = absorb.finish() {
            return absorbed;
        }

        let mut entries: IndexMap<MapKey, Value> = IndexMap::with_capacity(evaluated.len());
        for (key, value, optional) in evaluated {
            let value = if optional {
                match value {
                    Value::Optional(optional) => match optional.into_value() {
                        Some(inner) => inner,
                        None => continue,
                    },
                    other => {
                        return EvalError::invalid_argument(format!(
                            "expected optional value for key {key}, found {}",
                            other.kind_name()
                        ))
                        .into();
                    }
                }
            } else {
                value
            };
            let key = match MapKey::from_value(&key) {
                Ok(key) => key,
                Err(err) => return err.into(),
            };
            if entries.contains_key(&key) {
                return EvalError::invalid_argument(format!("repeated key: {key}")).into();
            }
            entries.insert(key, value);
        }
        Value::Map(MapValue::from_entries(entries))
    }

    fn eval_struct(&mut self, st: &cel_ast::StructExpr) -> Value {
        let mut fields: Vec<(Arc<str>, Value)> = Vec::with_capacity(st.fields.len());
        let mut absorb = Absorb::default();

        for field in &st.fields {
            let value = self.eval_expr(&field.value);
            if absorb.observe(&value) {
                continue;
            }
            if field.optional {
                match value {
                    Value::Optional(optional) => {
                        if let Some(inner) = optional.into_value() {
                            fields.push((field.name.as_str().into(), inner));
                        }
                    }
                    other => absorb.observe_error(EvalError::invalid_argument(format!(
                        "expected optional value for field {:?}, found {}",
                        field.name,
                        other.kind_name()
                    ))),
                }
            } else {
                fields.push((field.name.as_str().into(), value));
            }
        }

        absorb
            .finish()
            .unwrap_or_else(|| self.provider.new_value(&st.type_name, fields))
    }

    fn eval_comprehension(&mut self, comp: &ComprehensionExpr) -> Value {
        let range = self.eval_expr(&comp.iter_range);
        if range.is_absorbing() {
            return range;
        }
        let items: Vec<Value> = match &range {
            Value::List(items) => items.iter().cloned().collect(),
            // Maps iterate their keys in construction order.
            Value::Map(map) => map.keys().map(|key| key.clone().into_value()).collect(),
            other => {
                return EvalError::no_such_overload(format!(
                    "{} is not iterable",
                    other.kind_name()
                ))
                .into();
            }
        };
        // The budget is checked against the range length up front, not
        // against how far the loop actually runs.
        if items.len() as u64 > self.limits.comprehension_max_iterations {
            tracing::debug!(
                iter_var = comp.iter_var.as_str(),
                range_len = items.len(),
                limit = self.limits.comprehension_max_iterations,
                "iteration budget exceeded"
            );
            return EvalError::iteration_budget_exceeded(
                self.limits.comprehension_max_iterations,
            )
            .into();
        }
        tracing::trace!(
            iter_var = comp.iter_var.as_str(),
            accu_var = comp.accu_var.as_str(),
            iterations = items.len(),
            "comprehension"
        );

        let base = self.scopes.depth();
        let accu = self.eval_expr(&comp.accu_init);
        self.scopes.push(comp.accu_var.clone(), accu);

        let mut early = None;
        for item in items {
            if self.is_cancelled() {
                early = Some(Value::error(EvalError::cancelled()));
                break;
            }
            self.scopes.push(comp.iter_var.clone(), item);
            let cond = self.eval_expr(&comp.loop_condition);
            if matches!(cond, Value::Bool(false)) {
                self.scopes.pop_to(base + 1);
                break;
            }
            let step = self.eval_expr(&comp.loop_step);
            self.scopes.rebind(&comp.accu_var, step);
            self.scopes.pop_to(base + 1);
        }

        let result = match early {
            Some(value) => value,
            None => self.eval_expr(&comp.result),
        };
        self.scopes.pop_to(base);
        result
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }
}

/// Error/unknown accumulation for literal construction: every element is
/// evaluated, then unknown union beats the first error beats the literal.
#[derive(Default)]
struct Absorb {
    unknowns: Option<UnknownSet>,
    first_error: Option<Value>,
}

impl Absorb {
    /// Record an absorbing value; returns whether it was absorbed.
    fn observe(&mut self, value: &Value) -> bool {
        match value {
            Value::Unknown(set) => {
                self.unknowns = Some(match self.unknowns.take() {
                    Some(merged) => merged.union(set),
                    None => set.clone(),
                });
                true
            }
            Value::Error(_) => {
                if self.first_error.is_none() {
                    self.first_error = Some(value.clone());
                }
                true
            }
            _ => false,
        }
    }

    fn observe_error(&mut self, err: EvalError) {
        if self.first_error.is_none() {
            self.first_error = Some(err.into());
        }
    }

    fn finish(self) -> Option<Value> {
        if let Some(set) = self.unknowns {
            return Some(Value::Unknown(set));
        }
        self.first_error
    }
}

/// Combine `&&`/`||` operands that did not short-circuit.
///
/// `identity` is the operator's neutral element (true for `&&`, false for
/// `||`); its dual forces the result regardless of the other operand.
fn combine_logical(left: Value, right: Value, identity: bool) -> Value {
    let forced = !identity;
    let is_bool = |v: &Value, b: bool| matches!(v, Value::Bool(x) if *x == b);

    if is_bool(&left, forced) || is_bool(&right, forced) {
        return Value::Bool(forced);
    }
    if is_bool(&left, identity) && is_bool(&right, identity) {
        return Value::Bool(identity);
    }

    // Unknown union beats error beats type mismatch.
    let mut unknowns: Option<UnknownSet> = None;
    for value in [&left, &right] {
        if let Value::Unknown(set) = value {
            unknowns = Some(match unknowns {
                Some(merged) => merged.union(set),
                None => set.clone(),
            });
        }
    }
    if let Some(set) = unknowns {
        return Value::Unknown(set);
    }
    let op = if identity { "&&" } else { "||" };
    let mismatch = format!("{} {op} {}", left.kind_name(), right.kind_name());
    for value in [left, right] {
        if value.is_error() {
            return value;
        }
    }
    EvalError::no_such_overload(mismatch).into()
}

fn ternary_overload_error(cond: &Value) -> Value {
    EvalError::no_such_overload(format!("{} ? _ : _", cond.kind_name())).into()
}

/// Attribute for a (possibly dotted) identifier: the first segment roots the
/// path, the rest become string qualifiers.
fn attribute_for_name(name: &str) -> Attribute {
    let mut segments = name.split('.');
    let mut attr = Attribute::new(segments.next().unwrap_or(name));
    for segment in segments {
        attr = attr.select(segment);
    }
    attr
}

/// The attribute named by a pure identifier/select chain, if this select
/// heads one.
fn select_chain_attribute(select: &SelectExpr) -> Option<Attribute> {
    fn operand_attribute(expr: &Expr) -> Option<Attribute> {
        match &expr.kind {
            ExprKind::Ident(name) => Some(attribute_for_name(name)),
            ExprKind::Select(inner) if !inner.test_only => {
                operand_attribute(&inner.operand).map(|attr| attr.select(inner.field.clone()))
            }
            _ => None,
        }
    }
    operand_attribute(&select.operand).map(|attr| attr.select(select.field.clone()))
}

/// Flat dotted spelling of an attribute whose qualifiers are all plain
/// names, e.g. `pkg.sub.var`.
fn dotted_name(attr: &Attribute) -> Option<String> {
    let mut name = attr.root().to_string();
    for qualifier in attr.qualifiers() {
        match qualifier {
            Qualifier::String(segment) => {
                name.push('.');
                name.push_str(segment);
            }
            _ => return None,
        }
    }
    Some(name)
}
