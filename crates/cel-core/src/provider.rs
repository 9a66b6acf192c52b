//! Structured-type provider boundary.
//!
//! The engine never interprets external structured data directly. A
//! [`TypeProvider`] supplies type declarations and constructs struct values;
//! field selection and presence testing have default implementations driven
//! by those declarations. Wrapper unwrapping happens here: the interpreter
//! only ever observes primitives or null, never a wrapper.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::EvalError;
use crate::value::{MapKey, MapValue, StructValue, Value};

/// Declared kind of a structured-type field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
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
    /// Nested structured type, by name.
    Message(String),
    /// Dynamic field; any value is admitted.
    Dyn,
}

impl FieldKind {
    /// The value an unset non-presence field reads as.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Uint => Value::Uint(0),
            Self::Double => Value::Double(0.0),
            Self::String => Value::string(""),
            Self::Bytes => Value::bytes(Vec::new()),
            Self::List => Value::list(Vec::new()),
            Self::Map => Value::Map(MapValue::new()),
            Self::Duration | Self::Timestamp | Self::Message(_) | Self::Dyn => Value::Null,
        }
    }

    /// Whether `value` is acceptable for a field of this kind.
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Dyn, _) => true,
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
            (Self::Message(name), Value::Struct(s)) => s.type_name() == name,
            _ => false,
        }
    }
}

/// Declaration of one structured-type field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub kind: FieldKind,
    /// Field tracks set/unset explicitly (proto2-style presence).
    pub explicit_presence: bool,
    /// Boxed-scalar wrapper field: unset reads as null, set reads as the
    /// bare scalar.
    pub wrapper: bool,
}

impl FieldDecl {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            explicit_presence: false,
            wrapper: false,
        }
    }

    pub fn with_presence(mut self) -> Self {
        self.explicit_presence = true;
        self
    }

    pub fn wrapper(kind: FieldKind) -> Self {
        Self {
            kind,
            explicit_presence: false,
            wrapper: true,
        }
    }

    /// Whether set/unset is observable independently of the field value.
    pub fn has_presence(&self) -> bool {
        self.explicit_presence
            || self.wrapper
            || matches!(
                self.kind,
                FieldKind::Duration | FieldKind::Timestamp | FieldKind::Message(_) | FieldKind::Dyn
            )
    }
}

/// Declaration of a structured type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDecl {
    name: String,
    fields: IndexMap<String, FieldDecl>,
}

impl MessageDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, decl: FieldDecl) -> Self {
        self.fields.insert(name.into(), decl);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_decl(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDecl)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Bridge between the engine value model and externally defined structured
/// data.
///
/// Implementations must be thread-safe for reads; the engine never mutates a
/// provider. The default `new_value`/`select_field`/`has_field` bodies are
/// declaration-driven and usually sufficient.
pub trait TypeProvider: Send + Sync {
    /// Look up a type declaration by fully-qualified name.
    fn find_type(&self, type_name: &str) -> Option<&MessageDecl>;

    /// Construct a structured value from named field values.
    ///
    /// Unknown type names and unknown fields fail with typed error values.
    /// Null assigned to wrapper or message fields leaves the field unset;
    /// null assigned to a primitive field is a bad-format error.
    /// Non-presence fields set to their default are normalized to unset so
    /// equality and presence agree with declared-field semantics.
    fn new_value(&self, type_name: &str, fields: Vec<(Arc<str>, Value)>) -> Value {
        let Some(decl) = self.find_type(type_name) else {
            return EvalError::attribute_not_found(format!("unknown type {type_name:?}")).into();
        };

        let mut out: IndexMap<Arc<str>, Value> = IndexMap::with_capacity(fields.len());
        for (name, value) in fields {
            let Some(field) = decl.field_decl(&name) else {
                return EvalError::no_such_field(format!("{type_name}.{name}")).into();
            };
            if out.contains_key(&name) {
                return EvalError::invalid_argument(format!("repeated field name {name:?}")).into();
            }
            if value.is_absorbing() {
                return value;
            }
            if matches!(value, Value::Null) {
                if field.wrapper || matches!(field.kind, FieldKind::Message(_) | FieldKind::Dyn) {
                    continue; // unset
                }
                return EvalError::bad_format(format!(
                    "null is not assignable to field {type_name}.{name}"
                ))
                .into();
            }
            if !field.kind.admits(&value) {
                return EvalError::bad_format(format!(
                    "field {type_name}.{name} does not accept {}",
                    value.kind_name()
                ))
                .into();
            }
            if !field.has_presence() && value == field.kind.default_value() {
                continue; // normalize default to unset
            }
            out.insert(name, value);
        }

        Value::Struct(Arc::new(StructValue::new(type_name, out)))
    }

    /// Read a field from a map or structured holder.
    fn select_field(&self, holder: &Value, field: &str) -> Value {
        match holder {
            Value::Map(map) => match map.get(&MapKey::String(field.into())) {
                Some(value) => value.clone(),
                None => EvalError::no_such_key(format!("{field:?}")).into(),
            },
            Value::Struct(s) => {
                if let Some(value) = s.field(field) {
                    return value.clone();
                }
                match self.find_type(s.type_name()).and_then(|d| d.field_decl(field)) {
                    // Unset wrapper and presence fields read as null, unset
                    // non-presence fields read as the kind default.
                    Some(decl) if decl.has_presence() => Value::Null,
                    Some(decl) => decl.kind.default_value(),
                    None => {
                        EvalError::no_such_field(format!("{}.{field}", s.type_name())).into()
                    }
                }
            }
            other => EvalError::attribute_not_found(format!(
                "{}.{field}",
                other.kind_name()
            ))
            .into(),
        }
    }

    /// Presence test backing test-only selection.
    fn has_field(&self, holder: &Value, field: &str) -> Value {
        match holder {
            Value::Map(map) => Value::Bool(map.contains_key(&MapKey::String(field.into()))),
            Value::Struct(s) => {
                let Some(decl) = self.find_type(s.type_name()).and_then(|d| d.field_decl(field))
                else {
                    return EvalError::no_such_field(format!("{}.{field}", s.type_name())).into();
                };
                let present = match (&decl.kind, s.field(field)) {
                    (_, None) => false,
                    // Set repeated/map fields count only when non-empty.
                    (FieldKind::List, Some(Value::List(items))) => !items.is_empty(),
                    (FieldKind::Map, Some(Value::Map(map))) => !map.is_empty(),
                    // Presence fields (incl. wrappers) report set; set
                    // non-presence scalars are non-default by construction.
                    (_, Some(_)) => true,
                };
                Value::Bool(present)
            }
            other => EvalError::no_such_overload(format!("has({}.{field})", other.kind_name()))
                .into(),
        }
    }

    /// Normalize an external value into the engine value model.
    ///
    /// The default is the identity; providers wrapping foreign object models
    /// unwrap well-known wrappers and promote native numerics here.
    fn adapt(&self, _type_name: &str, value: Value) -> Value {
        value
    }
}

/// Registry-backed provider for declaration-driven structured types.
#[derive(Debug, Clone, Default)]
pub struct DynProvider {
    types: IndexMap<String, MessageDecl>,
}

impl DynProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, decl: MessageDecl) -> Self {
        self.types.insert(decl.name().to_string(), decl);
        self
    }

    pub fn register(&mut self, decl: MessageDecl) {
        self.types.insert(decl.name().to_string(), decl);
    }
}

impl TypeProvider for DynProvider {
    fn find_type(&self, type_name: &str) -> Option<&MessageDecl> {
        self.types.get(type_name)
    }
}
