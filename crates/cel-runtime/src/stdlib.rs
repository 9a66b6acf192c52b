//! Standard function library.
//!
//! Every built-in is an [`Overload`] data record keyed by a stable overload
//! id, registered table-style under its function symbol. Logical `&&`/`||`
//! and the ternary are interpreter short-circuit forms and do not appear
//! here; `@not_strictly_false` does, as the one non-strict built-in.
//!
//! Receiver-style calls dispatch with the receiver prepended to the argument
//! list, so `s.matches(re)` and `matches(s, re)` share one overload.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};

use cel_core::{
    EvalError, MapKey, OptionalValue, StructEquality, Value, runtime_compare, runtime_contains,
    runtime_equals_with,
};

use crate::config::{EvalLimits, Features};
use crate::dispatcher::{ArgKind, BindingError, FunctionRegistry, Overload};

/// Standard-subset selection applied per function symbol.
pub(crate) struct StdFilter<'a> {
    pub include: Option<&'a HashSet<String>>,
    pub exclude: &'a HashSet<String>,
    pub predicate: Option<&'a (dyn Fn(&str) -> bool + Send + Sync)>,
}

impl StdFilter<'_> {
    fn allows(&self, function: &str) -> bool {
        if let Some(include) = self.include {
            if !include.contains(function) {
                return false;
            }
        }
        if self.exclude.contains(function) {
            return false;
        }
        if let Some(predicate) = self.predicate {
            if !predicate(function) {
                return false;
            }
        }
        true
    }
}

/// Placeholder result when dispatch hands an overload arguments it did not
/// declare; unreachable through the dispatcher.
fn mismatch() -> Value {
    EvalError::internal("overload invoked with mismatched argument kinds").into()
}

/// Overflow error value for a checked arithmetic or conversion step.
fn overflow(op: &'static str) -> Value {
    tracing::debug!(op, "numeric overflow");
    EvalError::numeric_overflow(op).into()
}

/// Bad-format error value for a failed literal conversion.
fn bad_literal(kind: &'static str, text: &str) -> Value {
    tracing::debug!(kind, text, "invalid literal");
    EvalError::bad_format(format!("invalid {kind} literal {text:?}")).into()
}

/// Install the (filtered) standard library into a registry.
pub(crate) fn install_standard(
    reg: &mut FunctionRegistry,
    features: Features,
    limits: EvalLimits,
    filter: &StdFilter<'_>,
) -> Result<(), BindingError> {
    install_arithmetic(reg, limits, filter)?;
    install_comparisons(reg, features, filter)?;
    install_logic(reg, filter)?;
    install_containers(reg, filter)?;
    install_conversions(reg, features, filter)?;
    install_strings(reg, filter)?;
    install_time(reg, filter)?;
    install_optionals(reg, filter)?;
    Ok(())
}

fn add(
    reg: &mut FunctionRegistry,
    filter: &StdFilter<'_>,
    function: &str,
    overload: Overload,
) -> Result<(), BindingError> {
    if !filter.allows(function) {
        return Ok(());
    }
    reg.add(function, overload)
}

// ============================================================================
// Arithmetic
// ============================================================================

fn install_arithmetic(
    reg: &mut FunctionRegistry,
    limits: EvalLimits,
    filter: &StdFilter<'_>,
) -> Result<(), BindingError> {
    use ArgKind::*;

    add(reg, filter, "_+_", Overload::new("add_int64", [Int, Int], |args| match args {
        [Value::Int(a), Value::Int(b)] => a
            .checked_add(*b)
            .map(Value::Int)
            .unwrap_or_else(|| overflow("int addition")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_+_", Overload::new("add_uint64", [Uint, Uint], |args| match args {
        [Value::Uint(a), Value::Uint(b)] => a
            .checked_add(*b)
            .map(Value::Uint)
            .unwrap_or_else(|| overflow("uint addition")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_+_", Overload::new("add_double", [Double, Double], |args| match args {
        [Value::Double(a), Value::Double(b)] => Value::Double(a + b),
        _ => mismatch(),
    }))?;
    let max_concat = limits.max_concat_len;
    add(reg, filter, "_+_", Overload::new("add_string", [String, String], move |args| {
        match args {
            [Value::String(a), Value::String(b)] => {
                if a.len() + b.len() > max_concat {
                    return EvalError::invalid_argument(format!(
                        "concatenation exceeds size limit of {max_concat}"
                    ))
                    .into();
                }
                let mut out = std::string::String::with_capacity(a.len() + b.len());
                out.push_str(a);
                out.push_str(b);
                Value::string(out)
            }
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "_+_", Overload::new("add_bytes", [Bytes, Bytes], move |args| {
        match args {
            [Value::Bytes(a), Value::Bytes(b)] => {
                if a.len() + b.len() > max_concat {
                    return EvalError::invalid_argument(format!(
                        "concatenation exceeds size limit of {max_concat}"
                    ))
                    .into();
                }
                let mut out = Vec::with_capacity(a.len() + b.len());
                out.extend_from_slice(a);
                out.extend_from_slice(b);
                Value::bytes(out)
            }
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "_+_", Overload::new("add_list", [List, List], |args| match args {
        [Value::List(a), Value::List(b)] => {
            let mut out = Vec::with_capacity(a.len() + b.len());
            out.extend(a.iter().cloned());
            out.extend(b.iter().cloned());
            Value::list(out)
        }
        _ => mismatch(),
    }))?;
    add(reg, filter, "_+_", Overload::new(
        "add_duration_duration",
        [Duration, Duration],
        |args| match args {
            [Value::Duration(a), Value::Duration(b)] => a
                .checked_add(b)
                .map(Value::Duration)
                .unwrap_or_else(|| overflow("duration addition")),
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "_+_", Overload::new(
        "add_timestamp_duration",
        [Timestamp, Duration],
        |args| match args {
            [Value::Timestamp(t), Value::Duration(d)] => t
                .checked_add_signed(*d)
                .map(Value::Timestamp)
                .unwrap_or_else(|| overflow("timestamp addition")),
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "_+_", Overload::new(
        "add_duration_timestamp",
        [Duration, Timestamp],
        |args| match args {
            [Value::Duration(d), Value::Timestamp(t)] => t
                .checked_add_signed(*d)
                .map(Value::Timestamp)
                .unwrap_or_else(|| overflow("timestamp addition")),
            _ => mismatch(),
        },
    ))?;

    add(reg, filter, "_-_", Overload::new("subtract_int64", [Int, Int], |args| match args {
        [Value::Int(a), Value::Int(b)] => a
            .checked_sub(*b)
            .map(Value::Int)
            .unwrap_or_else(|| overflow("int subtraction")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_-_", Overload::new("subtract_uint64", [Uint, Uint], |args| match args {
        [Value::Uint(a), Value::Uint(b)] => a
            .checked_sub(*b)
            .map(Value::Uint)
            .unwrap_or_else(|| overflow("uint subtraction")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_-_", Overload::new("subtract_double", [Double, Double], |args| {
        match args {
            [Value::Double(a), Value::Double(b)] => Value::Double(a - b),
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "_-_", Overload::new(
        "subtract_duration_duration",
        [Duration, Duration],
        |args| match args {
            [Value::Duration(a), Value::Duration(b)] => a
                .checked_sub(b)
                .map(Value::Duration)
                .unwrap_or_else(|| overflow("duration subtraction")),
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "_-_", Overload::new(
        "subtract_timestamp_timestamp",
        [Timestamp, Timestamp],
        |args| match args {
            [Value::Timestamp(a), Value::Timestamp(b)] => {
                Value::Duration(a.signed_duration_since(*b))
            }
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "_-_", Overload::new(
        "subtract_timestamp_duration",
        [Timestamp, Duration],
        |args| match args {
            [Value::Timestamp(t), Value::Duration(d)] => t
                .checked_sub_signed(*d)
                .map(Value::Timestamp)
                .unwrap_or_else(|| overflow("timestamp subtraction")),
            _ => mismatch(),
        },
    ))?;

    add(reg, filter, "_*_", Overload::new("multiply_int64", [Int, Int], |args| match args {
        [Value::Int(a), Value::Int(b)] => a
            .checked_mul(*b)
            .map(Value::Int)
            .unwrap_or_else(|| overflow("int multiplication")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_*_", Overload::new("multiply_uint64", [Uint, Uint], |args| match args {
        [Value::Uint(a), Value::Uint(b)] => a
            .checked_mul(*b)
            .map(Value::Uint)
            .unwrap_or_else(|| overflow("uint multiplication")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_*_", Overload::new("multiply_double", [Double, Double], |args| {
        match args {
            [Value::Double(a), Value::Double(b)] => Value::Double(a * b),
            _ => mismatch(),
        }
    }))?;

    add(reg, filter, "_/_", Overload::new("divide_int64", [Int, Int], |args| match args {
        [Value::Int(_), Value::Int(0)] => EvalError::division_by_zero().into(),
        [Value::Int(a), Value::Int(b)] => a
            .checked_div(*b)
            .map(Value::Int)
            .unwrap_or_else(|| overflow("int division")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_/_", Overload::new("divide_uint64", [Uint, Uint], |args| match args {
        [Value::Uint(_), Value::Uint(0)] => EvalError::division_by_zero().into(),
        [Value::Uint(a), Value::Uint(b)] => Value::Uint(a / b),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_/_", Overload::new("divide_double", [Double, Double], |args| {
        // IEEE semantics: division by zero yields an infinity, not an error.
        match args {
            [Value::Double(a), Value::Double(b)] => Value::Double(a / b),
            _ => mismatch(),
        }
    }))?;

    add(reg, filter, "_%_", Overload::new("modulo_int64", [Int, Int], |args| match args {
        [Value::Int(_), Value::Int(0)] => {
            EvalError::new(cel_core::ErrorKind::DivisionByZero, "modulus by zero").into()
        }
        [Value::Int(a), Value::Int(b)] => a
            .checked_rem(*b)
            .map(Value::Int)
            .unwrap_or_else(|| overflow("int modulus")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "_%_", Overload::new("modulo_uint64", [Uint, Uint], |args| match args {
        [Value::Uint(_), Value::Uint(0)] => {
            EvalError::new(cel_core::ErrorKind::DivisionByZero, "modulus by zero").into()
        }
        [Value::Uint(a), Value::Uint(b)] => Value::Uint(a % b),
        _ => mismatch(),
    }))?;

    add(reg, filter, "-_", Overload::new("negate_int64", [Int], |args| match args {
        [Value::Int(a)] => a
            .checked_neg()
            .map(Value::Int)
            .unwrap_or_else(|| overflow("int negation")),
        _ => mismatch(),
    }))?;
    add(reg, filter, "-_", Overload::new("negate_double", [Double], |args| match args {
        [Value::Double(a)] => Value::Double(-a),
        _ => mismatch(),
    }))?;

    Ok(())
}

// ============================================================================
// Equality and ordering
// ============================================================================

fn install_comparisons(
    reg: &mut FunctionRegistry,
    features: Features,
    filter: &StdFilter<'_>,
) -> Result<(), BindingError> {
    let mode = if features.proto_differencer_equality {
        StructEquality::Differencer
    } else {
        StructEquality::FieldWise
    };
    let heterogeneous = features.heterogeneous_comparisons;

    let equals = move |args: &[Value]| -> Result<bool, EvalError> {
        let (a, b) = (&args[0], &args[1]);
        if !heterogeneous && a.type_of() != b.type_of() {
            return Err(EvalError::no_such_overload(format!(
                "{} == {}",
                a.kind_name(),
                b.kind_name()
            )));
        }
        Ok(runtime_equals_with(a, b, mode))
    };

    add(reg, filter, "_==_", Overload::new(
        "equals",
        [ArgKind::Any, ArgKind::Any],
        move |args| match equals(args) {
            Ok(eq) => Value::Bool(eq),
            Err(e) => e.into(),
        },
    ))?;
    add(reg, filter, "_!=_", Overload::new(
        "not_equals",
        [ArgKind::Any, ArgKind::Any],
        move |args| match equals(args) {
            Ok(eq) => Value::Bool(!eq),
            Err(e) => e.into(),
        },
    ))?;

    let ordered: [(&str, ArgKind); 8] = [
        ("bool", ArgKind::Bool),
        ("int64", ArgKind::Int),
        ("uint64", ArgKind::Uint),
        ("double", ArgKind::Double),
        ("string", ArgKind::String),
        ("bytes", ArgKind::Bytes),
        ("timestamp", ArgKind::Timestamp),
        ("duration", ArgKind::Duration),
    ];
    for (suffix, kind) in ordered {
        add(reg, filter, "_<_", cmp_overload(format!("less_{suffix}"), kind, |o| {
            o == Ordering::Less
        }))?;
        add(reg, filter, "_<=_", cmp_overload(format!("less_equals_{suffix}"), kind, |o| {
            o != Ordering::Greater
        }))?;
        add(reg, filter, "_>_", cmp_overload(format!("greater_{suffix}"), kind, |o| {
            o == Ordering::Greater
        }))?;
        add(reg, filter, "_>=_", cmp_overload(format!("greater_equals_{suffix}"), kind, |o| {
            o != Ordering::Less
        }))?;
    }

    Ok(())
}

/// Relational overload over one ordered kind. An unordered result (NaN) makes
/// every relation false.
fn cmp_overload(
    id: String,
    kind: ArgKind,
    test: fn(Ordering) -> bool,
) -> Overload {
    Overload::new(id, [kind, kind], move |args| {
        match runtime_compare(&args[0], &args[1]) {
            Ok(ord) => Value::Bool(ord.is_some_and(test)),
            Err(e) => e.into(),
        }
    })
}

// ============================================================================
// Logic
// ============================================================================

fn install_logic(reg: &mut FunctionRegistry, filter: &StdFilter<'_>) -> Result<(), BindingError> {
    add(reg, filter, "!_", Overload::new("logical_not", [ArgKind::Bool], |args| match args {
        [Value::Bool(b)] => Value::Bool(!b),
        _ => mismatch(),
    }))?;

    // Comprehension loop-condition helper: anything that is not literally
    // false collapses to true, errors and unknowns included.
    add(reg, filter, "@not_strictly_false", Overload::non_strict(
        "not_strictly_false",
        [ArgKind::Any],
        |args| Value::Bool(!matches!(args[0], Value::Bool(false))),
    ))?;

    Ok(())
}

// ============================================================================
// Containers
// ============================================================================

fn install_containers(
    reg: &mut FunctionRegistry,
    filter: &StdFilter<'_>,
) -> Result<(), BindingError> {
    use ArgKind::*;

    add(reg, filter, "_[_]", Overload::new("index_list", [List, Int], |args| match args {
        [Value::List(items), Value::Int(i)] => {
            if *i < 0 || *i as usize >= items.len() {
                return EvalError::invalid_argument(format!("index out of range: {i}")).into();
            }
            items[*i as usize].clone()
        }
        _ => mismatch(),
    }))?;
    add(reg, filter, "_[_]", Overload::new("index_map", [Map, Any], |args| match args {
        [Value::Map(map), key] => match key {
            Value::Bool(_) | Value::Int(_) | Value::Uint(_) | Value::String(_)
            | Value::Double(_) => MapKey::for_lookup(key)
                .and_then(|k| map.get(&k))
                .cloned()
                .unwrap_or_else(|| EvalError::no_such_key(key).into()),
            other => {
                EvalError::no_such_overload(format!("map[{}]", other.kind_name())).into()
            }
        },
        _ => mismatch(),
    }))?;

    add(reg, filter, "_in_", Overload::new("in_list", [Any, List], |args| {
        match runtime_contains(&args[1], &args[0]) {
            Ok(found) => Value::Bool(found),
            Err(e) => e.into(),
        }
    }))?;
    add(reg, filter, "_in_", Overload::new("in_map", [Any, Map], |args| {
        match runtime_contains(&args[1], &args[0]) {
            Ok(found) => Value::Bool(found),
            Err(e) => e.into(),
        }
    }))?;

    add(reg, filter, "size", Overload::new("size_string", [String], |args| match args {
        // Unicode code points, not bytes.
        [Value::String(s)] => Value::Int(s.chars().count() as i64),
        _ => mismatch(),
    }))?;
    add(reg, filter, "size", Overload::new("size_bytes", [Bytes], |args| match args {
        [Value::Bytes(b)] => Value::Int(b.len() as i64),
        _ => mismatch(),
    }))?;
    add(reg, filter, "size", Overload::new("size_list", [List], |args| match args {
        [Value::List(items)] => Value::Int(items.len() as i64),
        _ => mismatch(),
    }))?;
    add(reg, filter, "size", Overload::new("size_map", [Map], |args| match args {
        [Value::Map(map)] => Value::Int(map.len() as i64),
        _ => mismatch(),
    }))?;

    add(reg, filter, "type", Overload::new("type", [ArgKind::Any], |args| {
        Value::Type(args[0].type_of())
    }))?;

    Ok(())
}

// ============================================================================
// Conversions
// ============================================================================

fn install_conversions(
    reg: &mut FunctionRegistry,
    features: Features,
    filter: &StdFilter<'_>,
) -> Result<(), BindingError> {
    use ArgKind::*;

    const INT_MIN_F: f64 = -9_223_372_036_854_775_808.0; // -(2^63)
    const INT_MAX_BOUND_F: f64 = 9_223_372_036_854_775_808.0; // 2^63
    const UINT_MAX_BOUND_F: f64 = 18_446_744_073_709_551_616.0; // 2^64

    add(reg, filter, "int", Overload::new("int64_to_int64", [Int], |args| args[0].clone()))?;
    add(reg, filter, "int", Overload::new("uint64_to_int64", [Uint], |args| match args {
        [Value::Uint(u)] => {
            if *u > i64::MAX as u64 {
                overflow("uint out of int range")
            } else {
                Value::Int(*u as i64)
            }
        }
        _ => mismatch(),
    }))?;
    add(reg, filter, "int", Overload::new("double_to_int64", [Double], |args| match args {
        [Value::Double(d)] => {
            let t = d.trunc();
            if t.is_nan() || t < INT_MIN_F || t >= INT_MAX_BOUND_F {
                overflow("double out of int range")
            } else {
                Value::Int(t as i64)
            }
        }
        _ => mismatch(),
    }))?;
    add(reg, filter, "int", Overload::new("string_to_int64", [String], |args| match args {
        [Value::String(s)] => s
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| bad_literal("int", s)),
        _ => mismatch(),
    }))?;
    add(reg, filter, "int", Overload::new("timestamp_to_int64", [Timestamp], |args| {
        match args {
            [Value::Timestamp(t)] => Value::Int(t.timestamp()),
            _ => mismatch(),
        }
    }))?;

    add(reg, filter, "uint", Overload::new("uint64_to_uint64", [Uint], |args| args[0].clone()))?;
    add(reg, filter, "uint", Overload::new("int64_to_uint64", [Int], |args| match args {
        [Value::Int(i)] => {
            if *i < 0 {
                overflow("int out of uint range")
            } else {
                Value::Uint(*i as u64)
            }
        }
        _ => mismatch(),
    }))?;
    add(reg, filter, "uint", Overload::new("double_to_uint64", [Double], |args| match args {
        [Value::Double(d)] => {
            let t = d.trunc();
            if t.is_nan() || t < 0.0 || t >= UINT_MAX_BOUND_F {
                overflow("double out of uint range")
            } else {
                Value::Uint(t as u64)
            }
        }
        _ => mismatch(),
    }))?;
    add(reg, filter, "uint", Overload::new("string_to_uint64", [String], |args| match args {
        [Value::String(s)] => s
            .parse::<u64>()
            .map(Value::Uint)
            .unwrap_or_else(|_| {
                bad_literal("uint", s)
            }),
        _ => mismatch(),
    }))?;

    add(reg, filter, "double", Overload::new("double_to_double", [Double], |args| {
        args[0].clone()
    }))?;
    add(reg, filter, "double", Overload::new("int64_to_double", [Int], |args| match args {
        [Value::Int(i)] => Value::Double(*i as f64),
        _ => mismatch(),
    }))?;
    add(reg, filter, "double", Overload::new("uint64_to_double", [Uint], |args| match args {
        [Value::Uint(u)] => Value::Double(*u as f64),
        _ => mismatch(),
    }))?;
    add(reg, filter, "double", Overload::new("string_to_double", [String], |args| match args {
        [Value::String(s)] => s
            .parse::<f64>()
            .map(Value::Double)
            .unwrap_or_else(|_| {
                bad_literal("double", s)
            }),
        _ => mismatch(),
    }))?;

    add(reg, filter, "string", Overload::new("string_to_string", [String], |args| {
        args[0].clone()
    }))?;
    add(reg, filter, "string", Overload::new("int64_to_string", [Int], |args| match args {
        [Value::Int(i)] => Value::string(i.to_string()),
        _ => mismatch(),
    }))?;
    add(reg, filter, "string", Overload::new("uint64_to_string", [Uint], |args| match args {
        [Value::Uint(u)] => Value::string(u.to_string()),
        _ => mismatch(),
    }))?;
    add(reg, filter, "string", Overload::new("double_to_string", [Double], |args| match args {
        [Value::Double(d)] => Value::string(d.to_string()),
        _ => mismatch(),
    }))?;
    add(reg, filter, "string", Overload::new("bytes_to_string", [Bytes], |args| match args {
        [Value::Bytes(b)] => match std::str::from_utf8(b) {
            Ok(s) => Value::string(s),
            Err(_) => EvalError::bad_format("bytes are not valid UTF-8").into(),
        },
        _ => mismatch(),
    }))?;
    add(reg, filter, "string", Overload::new(
        "duration_to_string",
        [Duration],
        |args| match args {
            [Value::Duration(d)] => Value::string(format_duration(d)),
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "string", Overload::new(
        "timestamp_to_string",
        [Timestamp],
        |args| match args {
            [Value::Timestamp(t)] => {
                Value::string(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            _ => mismatch(),
        },
    ))?;

    add(reg, filter, "bytes", Overload::new("bytes_to_bytes", [Bytes], |args| args[0].clone()))?;
    add(reg, filter, "bytes", Overload::new("string_to_bytes", [String], |args| match args {
        [Value::String(s)] => Value::bytes(s.as_bytes().to_vec()),
        _ => mismatch(),
    }))?;

    add(reg, filter, "bool", Overload::new("bool_to_bool", [Bool], |args| args[0].clone()))?;
    add(reg, filter, "bool", Overload::new("string_to_bool", [String], |args| match args {
        [Value::String(s)] => match s.as_ref() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => bad_literal("bool", s),
        },
        _ => mismatch(),
    }))?;

    add(reg, filter, "duration", Overload::new(
        "duration_to_duration",
        [Duration],
        |args| args[0].clone(),
    ))?;
    add(reg, filter, "duration", Overload::new(
        "string_to_duration",
        [String],
        |args| match args {
            [Value::String(s)] => match parse_duration(s) {
                Ok(d) => Value::Duration(d),
                Err(e) => {
                    tracing::debug!(text = &**s, "invalid duration literal");
                    e.into()
                }
            },
            _ => mismatch(),
        },
    ))?;

    add(reg, filter, "timestamp", Overload::new(
        "timestamp_to_timestamp",
        [Timestamp],
        |args| args[0].clone(),
    ))?;
    add(reg, filter, "timestamp", Overload::new(
        "string_to_timestamp",
        [String],
        |args| match args {
            [Value::String(s)] => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => Value::Timestamp(t.with_timezone(&Utc)),
                Err(e) => {
                    tracing::debug!(text = &**s, "invalid timestamp literal");
                    EvalError::bad_format(format!("invalid timestamp: {e}")).into()
                }
            },
            _ => mismatch(),
        },
    ))?;
    if features.timestamp_epoch {
        add(reg, filter, "timestamp", Overload::new("int64_to_timestamp", [Int], |args| {
            match args {
                [Value::Int(secs)] => DateTime::<Utc>::from_timestamp(*secs, 0)
                    .map(Value::Timestamp)
                    .unwrap_or_else(|| {
                        overflow("timestamp out of range")
                    }),
                _ => mismatch(),
            }
        }))?;
    }

    add(reg, filter, "dyn", Overload::new("to_dyn", [Any], |args| args[0].clone()))?;

    Ok(())
}

// ============================================================================
// String predicates
// ============================================================================

fn install_strings(reg: &mut FunctionRegistry, filter: &StdFilter<'_>) -> Result<(), BindingError> {
    use ArgKind::*;

    add(reg, filter, "matches", Overload::new(
        "matches_string",
        [String, String],
        |args| match args {
            [Value::String(subject), Value::String(pattern)] => {
                match regex::Regex::new(pattern) {
                    // Unanchored search, RE2-style.
                    Ok(re) => Value::Bool(re.is_match(subject)),
                    Err(e) => {
                        EvalError::bad_format(format!("invalid regular expression: {e}")).into()
                    }
                }
            }
            _ => mismatch(),
        },
    ))?;

    add(reg, filter, "contains", Overload::new(
        "contains_string",
        [String, String],
        |args| match args {
            [Value::String(s), Value::String(sub)] => Value::Bool(s.contains(sub.as_ref())),
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "startsWith", Overload::new(
        "starts_with_string",
        [String, String],
        |args| match args {
            [Value::String(s), Value::String(prefix)] => {
                Value::Bool(s.starts_with(prefix.as_ref()))
            }
            _ => mismatch(),
        },
    ))?;
    add(reg, filter, "endsWith", Overload::new(
        "ends_with_string",
        [String, String],
        |args| match args {
            [Value::String(s), Value::String(suffix)] => {
                Value::Bool(s.ends_with(suffix.as_ref()))
            }
            _ => mismatch(),
        },
    ))?;

    Ok(())
}

// ============================================================================
// Time accessors
// ============================================================================

fn install_time(reg: &mut FunctionRegistry, filter: &StdFilter<'_>) -> Result<(), BindingError> {
    use ArgKind::Duration;

    add(reg, filter, "getHours", Overload::new("duration_to_hours", [Duration], |args| {
        match args {
            [Value::Duration(d)] => Value::Int(d.num_hours()),
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "getMinutes", Overload::new("duration_to_minutes", [Duration], |args| {
        match args {
            [Value::Duration(d)] => Value::Int(d.num_minutes()),
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "getSeconds", Overload::new("duration_to_seconds", [Duration], |args| {
        match args {
            [Value::Duration(d)] => Value::Int(d.num_seconds()),
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "getMilliseconds", Overload::new(
        "duration_to_milliseconds",
        [Duration],
        |args| match args {
            [Value::Duration(d)] => Value::Int(d.num_milliseconds()),
            _ => mismatch(),
        },
    ))?;

    Ok(())
}

// ============================================================================
// Optionals
// ============================================================================

fn install_optionals(
    reg: &mut FunctionRegistry,
    filter: &StdFilter<'_>,
) -> Result<(), BindingError> {
    use ArgKind::*;

    add(reg, filter, "optional.of", Overload::new("optional_of", [Any], |args| {
        Value::Optional(OptionalValue::of(args[0].clone()))
    }))?;
    add(reg, filter, "optional.none", Overload::new("optional_none", [], |_args| {
        Value::Optional(OptionalValue::none())
    }))?;
    add(reg, filter, "hasValue", Overload::new("optional_has_value", [Optional], |args| {
        match args {
            [Value::Optional(o)] => Value::Bool(o.has_value()),
            _ => mismatch(),
        }
    }))?;
    add(reg, filter, "value", Overload::new("optional_value", [Optional], |args| match args {
        [Value::Optional(o)] => match o.value() {
            Some(v) => v.clone(),
            None => EvalError::invalid_argument("optional.none() dereference").into(),
        },
        _ => mismatch(),
    }))?;
    add(reg, filter, "orValue", Overload::new("optional_or_value", [Optional, Any], |args| {
        match args {
            [Value::Optional(o), fallback] => match o.value() {
                Some(v) => v.clone(),
                None => fallback.clone(),
            },
            _ => mismatch(),
        }
    }))?;

    Ok(())
}

// ============================================================================
// Time parsing and formatting
// ============================================================================

/// Parse a duration literal: an optional sign followed by one or more
/// decimal numbers, each with a unit (`h`, `m`, `s`, `ms`, `us`, `ns`).
/// `"0"` alone is permitted.
pub(crate) fn parse_duration(input: &str) -> Result<TimeDelta, EvalError> {
    let bad = || EvalError::bad_format(format!("invalid duration literal {input:?}"));

    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(bad());
    }

    let mut total_nanos: i128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(bad());
        }
        let number: f64 = rest[..number_len].parse().map_err(|_| bad())?;
        rest = &rest[number_len..];

        // Two-letter units first: "ms" shadows "m", "ns"/"us" shadow "s".
        let (nanos_per_unit, unit_len) = if rest.starts_with("ns") {
            (1u64, 2)
        } else if rest.starts_with("us") {
            (1_000, 2)
        } else if rest.starts_with("µs") {
            (1_000, "µs".len())
        } else if rest.starts_with("ms") {
            (1_000_000, 2)
        } else if rest.starts_with('s') {
            (1_000_000_000, 1)
        } else if rest.starts_with('m') {
            (60 * 1_000_000_000, 1)
        } else if rest.starts_with('h') {
            (3600 * 1_000_000_000, 1)
        } else {
            return Err(bad());
        };
        rest = &rest[unit_len..];

        total_nanos += (number * nanos_per_unit as f64) as i128;
    }

    if negative {
        total_nanos = -total_nanos;
    }
    if total_nanos < i64::MIN as i128 || total_nanos > i64::MAX as i128 {
        return Err(EvalError::numeric_overflow("duration out of range"));
    }
    Ok(TimeDelta::nanoseconds(total_nanos as i64))
}

/// Format a duration as decimal seconds with an `s` suffix, e.g. `"3.5s"`.
pub(crate) fn format_duration(d: &TimeDelta) -> String {
    let secs = d.num_seconds();
    let sub = d.subsec_nanos();
    let negative = secs < 0 || sub < 0;

    let secs = secs.unsigned_abs();
    let sub = sub.unsigned_abs();
    let sign = if negative { "-" } else { "" };
    if sub == 0 {
        format!("{sign}{secs}s")
    } else {
        let frac = format!("{sub:09}");
        format!("{sign}{secs}.{}s", frac.trim_end_matches('0'))
    }
}
