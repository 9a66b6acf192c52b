//! Runtime value representation.
//!
//! A value is a tagged variant over the closed set of kinds the language can
//! produce. Containers and strings sit behind `Arc` so cloning a value during
//! evaluation is cheap and evaluations can share inputs across threads.
//!
//! Errors and unknown-sets are values too: they flow through evaluation and
//! are absorbed or propagated by the rules in the interpreter and dispatcher,
//! never thrown.

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;

use crate::attr::UnknownSet;
use crate::error::EvalError;
use crate::types::CelType;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    /// Signed span with nanosecond precision.
    Duration(TimeDelta),
    /// UTC instant with nanosecond precision.
    Timestamp(DateTime<Utc>),
    List(Arc<Vec<Value>>),
    Map(MapValue),
    Struct(Arc<StructValue>),
    Type(CelType),
    Optional(OptionalValue),
    /// A deferred evaluation error.
    Error(Box<EvalError>),
    /// Attribute paths whose values are not (yet) known.
    Unknown(UnknownSet),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(b.into())
    }

    pub fn list(elements: Vec<Value>) -> Self {
        Self::List(Arc::new(elements))
    }

    pub fn error(err: EvalError) -> Self {
        Self::Error(Box::new(err))
    }

    pub fn unknown(set: UnknownSet) -> Self {
        Self::Unknown(set)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Whether this value halts strict evaluation (error or unknown-set).
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Unknown(_))
    }

    /// The type descriptor reported by the `type()` built-in.
    pub fn type_of(&self) -> CelType {
        match self {
            Self::Null => CelType::Null,
            Self::Bool(_) => CelType::Bool,
            Self::Int(_) => CelType::Int,
            Self::Uint(_) => CelType::Uint,
            Self::Double(_) => CelType::Double,
            Self::String(_) => CelType::String,
            Self::Bytes(_) => CelType::Bytes,
            Self::Duration(_) => CelType::Duration,
            Self::Timestamp(_) => CelType::Timestamp,
            Self::List(_) => CelType::List,
            Self::Map(_) => CelType::Map,
            Self::Struct(s) => CelType::Struct(s.type_name().to_string()),
            Self::Type(_) => CelType::Type,
            Self::Optional(_) => CelType::Optional,
            Self::Error(_) => CelType::Error,
            Self::Unknown(_) => CelType::Unknown,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Duration(_) => "duration",
            Self::Timestamp(_) => "timestamp",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Struct(_) => "struct",
            Self::Type(_) => "type",
            Self::Optional(_) => "optional",
            Self::Error(_) => "error",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::list(v)
    }
}

impl From<EvalError> for Value {
    fn from(err: EvalError) -> Self {
        Self::error(err)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}u"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b.iter() {
                    write!(f, "\\x{byte:02x}")?;
                }
                write!(f, "\"")
            }
            Self::Duration(d) => {
                let secs = d.num_seconds();
                let sub = d.subsec_nanos();
                let sign = if secs < 0 || sub < 0 { "-" } else { "" };
                write!(
                    f,
                    "{sign}{}.{:09}s",
                    secs.unsigned_abs(),
                    sub.unsigned_abs()
                )
            }
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Struct(s) => {
                write!(f, "{}{{", s.type_name())?;
                for (i, (name, value)) in s.fields().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            Self::Type(t) => write!(f, "{t}"),
            Self::Optional(o) => match o.value() {
                Some(v) => write!(f, "optional.of({v})"),
                None => write!(f, "optional.none()"),
            },
            Self::Error(e) => write!(f, "error: {e}"),
            Self::Unknown(u) => write!(f, "unknown: {u}"),
        }
    }
}

/// Map key restricted to the hashable scalar kinds.
///
/// Numerically equal int and uint keys are indistinguishable, so `Eq` and
/// `Hash` normalize both through a wide integer.
#[derive(Debug, Clone)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Arc<str>),
}

impl MapKey {
    /// The mathematical value of a numeric key, if it is one.
    fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(*i as i128),
            Self::Uint(u) => Some(*u as i128),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    /// Convert a construction-time key value. Doubles and other kinds are
    /// rejected; keys come only from the kinds listed on the type.
    pub fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Int(i) => Ok(Self::Int(*i)),
            Value::Uint(u) => Ok(Self::Uint(*u)),
            Value::String(s) => Ok(Self::String(Arc::clone(s))),
            other => Err(EvalError::invalid_argument(format!(
                "unsupported map key type: {}",
                other.kind_name()
            ))),
        }
    }

    /// Convert a lookup key, additionally admitting doubles that represent an
    /// exact integer (heterogeneous numeric key equality).
    pub fn for_lookup(value: &Value) -> Option<Self> {
        match value {
            // The upper bound excludes 2^64 itself; casting it would saturate
            // onto u64::MAX and alias a real key.
            Value::Double(d) if d.fract() == 0.0 && *d >= i64::MIN as f64 && *d < u64::MAX as f64 => {
                if *d < 0.0 {
                    Some(Self::Int(*d as i64))
                } else {
                    Some(Self::Uint(*d as u64))
                }
            }
            other => Self::from_value(other).ok(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Int(i),
            Self::Uint(u) => Value::Uint(u),
            Self::String(s) => Value::String(s),
        }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => match (self.as_i128(), other.as_i128()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Bool(b) => {
                0u8.hash(state);
                b.hash(state);
            }
            Self::Int(_) | Self::Uint(_) => {
                1u8.hash(state);
                self.as_i128().hash(state);
            }
            Self::String(s) => {
                2u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl Display for MapKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}u"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// Unordered association from key to value.
///
/// Iteration follows construction order, which comprehension evaluation and
/// map-literal tests rely on; equality is order-independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapValue {
    entries: Arc<IndexMap<MapKey, Value>>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: IndexMap<MapKey, Value>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in construction order.
    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter()
    }

    /// Keys in construction order.
    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.keys()
    }
}

impl FromIterator<(MapKey, Value)> for MapValue {
    fn from_iter<T: IntoIterator<Item = (MapKey, Value)>>(iter: T) -> Self {
        Self::from_entries(iter.into_iter().collect())
    }
}

/// A named structured object with typed fields.
///
/// Instances are only created through the structured-type provider boundary,
/// which performs wrapper unwrapping; the field map never holds a wrapper.
/// Absent entries are unset fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    type_name: Arc<str>,
    fields: IndexMap<Arc<str>, Value>,
}

impl StructValue {
    pub fn new(type_name: impl Into<Arc<str>>, fields: IndexMap<Arc<str>, Value>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The set field's value, or `None` when unset.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Set fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Either empty or holding exactly one value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionalValue(Option<Box<Value>>);

impl OptionalValue {
    pub fn of(value: Value) -> Self {
        Self(Some(Box::new(value)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn has_value(&self) -> bool {
        self.0.is_some()
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.as_deref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.0.map(|b| *b)
    }
}
