//! Runtime equality, ordering, and hashing.
//!
//! Equality is total: any two values either are or are not equal, and
//! numerically equal int/uint/double values compare equal across kinds.
//! Ordering is partial: it exists only within one primitive kind (plus
//! duration and timestamp), and mixed-kind comparisons are an overload error.
//!
//! `value_hash` is consistent with equality: equal values hash equal, with
//! numerics normalized through a wide integer when they are mathematically
//! integral. NaN is never equal to anything but still hashes to a stable
//! constant.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::error::EvalError;
use crate::value::{MapKey, Value};

/// How doubles reached through struct fields compare.
///
/// `FieldWise` mirrors message-level equals where NaN equals NaN;
/// `Differencer` applies canonical IEEE semantics everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructEquality {
    #[default]
    FieldWise,
    Differencer,
}

/// Total runtime equality with default struct semantics.
pub fn runtime_equals(a: &Value, b: &Value) -> bool {
    equals_rec(a, b, StructEquality::FieldWise, false)
}

/// Total runtime equality with an explicit struct-equality mode.
pub fn runtime_equals_with(a: &Value, b: &Value, mode: StructEquality) -> bool {
    equals_rec(a, b, mode, false)
}

fn double_eq(a: f64, b: f64, nan_equal: bool) -> bool {
    if nan_equal && a.is_nan() && b.is_nan() {
        return true;
    }
    a == b
}

fn int_eq_double(i: i64, d: f64) -> bool {
    // Compare in the integer domain; a lossy i64 -> f64 cast would make
    // distinct large ints equal the same double.
    d.fract() == 0.0 && d >= -(2f64.powi(63)) && d < 2f64.powi(63) && d as i64 == i
}

fn uint_eq_double(u: u64, d: f64) -> bool {
    d.fract() == 0.0 && d >= 0.0 && d < 2f64.powi(64) && d as u64 == u
}

fn equals_rec(a: &Value, b: &Value, mode: StructEquality, in_struct: bool) -> bool {
    use Value::*;

    let nan_equal = in_struct && mode == StructEquality::FieldWise;
    match (a, b) {
        (Null, Null) => true,
        (Bool(x), Bool(y)) => x == y,

        (Int(x), Int(y)) => x == y,
        (Uint(x), Uint(y)) => x == y,
        (Double(x), Double(y)) => double_eq(*x, *y, nan_equal),
        (Int(x), Uint(y)) | (Uint(y), Int(x)) => *x >= 0 && *x as u64 == *y,
        (Int(x), Double(y)) | (Double(y), Int(x)) => int_eq_double(*x, *y),
        (Uint(x), Double(y)) | (Double(y), Uint(x)) => uint_eq_double(*x, *y),

        (String(x), String(y)) => x == y,
        (Bytes(x), Bytes(y)) => x == y,
        (Duration(x), Duration(y)) => x == y,
        (Timestamp(x), Timestamp(y)) => x == y,

        (List(x), List(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(l, r)| equals_rec(l, r, mode, in_struct))
        }
        (Map(x), Map(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.get(k).is_some_and(|w| equals_rec(v, w, mode, in_struct))
                })
        }
        (Struct(x), Struct(y)) => {
            x.type_name() == y.type_name()
                && x.field_count() == y.field_count()
                && x.fields().all(|(name, v)| {
                    y.field(name)
                        .is_some_and(|w| equals_rec(v, w, mode, true))
                })
        }
        (Type(x), Type(y)) => x == y,
        (Optional(x), Optional(y)) => match (x.value(), y.value()) {
            (None, None) => true,
            (Some(l), Some(r)) => equals_rec(l, r, mode, in_struct),
            _ => false,
        },
        (Error(x), Error(y)) => x == y,
        (Unknown(x), Unknown(y)) => x == y,

        _ => false,
    }
}

/// Same-kind ordering.
///
/// `Ok(None)` means the operands are unordered (a NaN was involved); every
/// relational operator over an unordered pair is false. Mixed kinds and
/// unordered kinds fail with no-such-overload.
pub fn runtime_compare(a: &Value, b: &Value) -> Result<Option<Ordering>, EvalError> {
    use Value::*;

    match (a, b) {
        (Bool(x), Bool(y)) => Ok(Some(x.cmp(y))),
        (Int(x), Int(y)) => Ok(Some(x.cmp(y))),
        (Uint(x), Uint(y)) => Ok(Some(x.cmp(y))),
        (Double(x), Double(y)) => Ok(x.partial_cmp(y)),
        (String(x), String(y)) => Ok(Some(x.cmp(y))),
        (Bytes(x), Bytes(y)) => Ok(Some(x.cmp(y))),
        (Duration(x), Duration(y)) => Ok(Some(x.cmp(y))),
        (Timestamp(x), Timestamp(y)) => Ok(Some(x.cmp(y))),
        _ => Err(EvalError::no_such_overload(format!(
            "{} < {}",
            a.kind_name(),
            b.kind_name()
        ))),
    }
}

/// Membership test used by the `in` operator.
///
/// Lists test element equality (heterogeneous numerics included); maps test
/// key membership with the same numeric key matching as indexing.
pub fn runtime_contains(haystack: &Value, needle: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::List(items) => Ok(items.iter().any(|item| runtime_equals(item, needle))),
        Value::Map(map) => Ok(MapKey::for_lookup(needle)
            .map(|key| map.contains_key(&key))
            .unwrap_or(false)),
        _ => Err(EvalError::no_such_overload(format!(
            "{} in {}",
            needle.kind_name(),
            haystack.kind_name()
        ))),
    }
}

// Hash domain tags. Numerics share one tag so cross-kind equal values
// land in the same domain.
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMERIC: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_DURATION: u8 = 6;
const TAG_TIMESTAMP: u8 = 7;
const TAG_LIST: u8 = 8;
const TAG_MAP: u8 = 9;
const TAG_STRUCT: u8 = 10;
const TAG_TYPE: u8 = 11;
const TAG_OPTIONAL: u8 = 12;
const TAG_ERROR: u8 = 13;
const TAG_UNKNOWN: u8 = 14;

/// Stable bit pattern hashed for any NaN.
const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// Hash a value consistently with [`runtime_equals`].
pub fn value_hash(value: &Value) -> u64 {
    let mut hasher = FxHasher::default();
    hash_into(value, &mut hasher);
    hasher.finish()
}

fn hash_into(value: &Value, state: &mut FxHasher) {
    use Value::*;

    match value {
        Null => TAG_NULL.hash(state),
        Bool(b) => {
            TAG_BOOL.hash(state);
            b.hash(state);
        }
        Int(i) => hash_numeric(*i as i128, state),
        Uint(u) => hash_numeric(*u as i128, state),
        Double(d) => {
            if d.is_nan() {
                TAG_DOUBLE.hash(state);
                CANONICAL_NAN_BITS.hash(state);
            } else if d.fract() == 0.0 && *d >= -(2f64.powi(63)) && *d < 2f64.powi(64) {
                // Integral doubles hash like the equal integer. The negative
                // half fits i64, the positive half fits u64.
                let wide = if *d < 0.0 {
                    *d as i64 as i128
                } else {
                    *d as u64 as i128
                };
                hash_numeric(wide, state);
            } else {
                TAG_DOUBLE.hash(state);
                d.to_bits().hash(state);
            }
        }
        String(s) => {
            TAG_STRING.hash(state);
            s.hash(state);
        }
        Bytes(b) => {
            TAG_BYTES.hash(state);
            b.hash(state);
        }
        Duration(d) => {
            TAG_DURATION.hash(state);
            d.num_seconds().hash(state);
            d.subsec_nanos().hash(state);
        }
        Timestamp(t) => {
            TAG_TIMESTAMP.hash(state);
            t.timestamp().hash(state);
            t.timestamp_subsec_nanos().hash(state);
        }
        List(items) => {
            TAG_LIST.hash(state);
            items.len().hash(state);
            for item in items.iter() {
                value_hash(item).hash(state);
            }
        }
        Map(map) => {
            TAG_MAP.hash(state);
            map.len().hash(state);
            // Iteration order is unspecified for equality, so entries
            // combine commutatively.
            let mut combined = 0u64;
            for (key, val) in map.iter() {
                let mut entry = FxHasher::default();
                key.hash(&mut entry);
                value_hash(val).hash(&mut entry);
                combined = combined.wrapping_add(entry.finish());
            }
            combined.hash(state);
        }
        Struct(s) => {
            TAG_STRUCT.hash(state);
            s.type_name().hash(state);
            let mut combined = 0u64;
            for (name, val) in s.fields() {
                let mut entry = FxHasher::default();
                name.hash(&mut entry);
                value_hash(val).hash(&mut entry);
                combined = combined.wrapping_add(entry.finish());
            }
            combined.hash(state);
        }
        Type(t) => {
            TAG_TYPE.hash(state);
            t.hash(state);
        }
        Optional(o) => {
            TAG_OPTIONAL.hash(state);
            match o.value() {
                Some(v) => {
                    true.hash(state);
                    hash_into(v, state);
                }
                None => false.hash(state),
            }
        }
        Error(e) => {
            TAG_ERROR.hash(state);
            e.kind.hash(state);
            e.message.hash(state);
        }
        Unknown(u) => {
            TAG_UNKNOWN.hash(state);
            u.hash(state);
        }
    }
}

fn hash_numeric(wide: i128, state: &mut FxHasher) {
    TAG_NUMERIC.hash(state);
    wide.hash(state);
}
