//! Runtime type descriptors.
//!
//! Every runtime value maps to exactly one descriptor; the descriptor of a
//! type value is the `Type` sentinel, which is itself of type `Type`.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Descriptor of a runtime value's type.
///
/// Container descriptors are unparameterized at runtime: a list value is
/// `list(dyn)` regardless of its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CelType {
    Null,
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
    /// Named structured type.
    Struct(std::string::String),
    /// The runtime-type sentinel.
    Type,
    Optional,
    Error,
    Unknown,
    /// Top type; assignable from anything.
    Dyn,
}

impl CelType {
    /// Whether this descriptor names a scalar (non-container, non-sentinel)
    /// kind.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::Int
                | Self::Uint
                | Self::Double
                | Self::String
                | Self::Bytes
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Uint | Self::Double)
    }
}

impl Display for CelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null_type"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Uint => write!(f, "uint"),
            Self::Double => write!(f, "double"),
            Self::String => write!(f, "string"),
            Self::Bytes => write!(f, "bytes"),
            Self::Duration => write!(f, "duration"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::List => write!(f, "list(dyn)"),
            Self::Map => write!(f, "map(dyn, dyn)"),
            Self::Struct(name) => write!(f, "{name}"),
            Self::Type => write!(f, "type"),
            Self::Optional => write!(f, "optional(dyn)"),
            Self::Error => write!(f, "error"),
            Self::Unknown => write!(f, "unknown"),
            Self::Dyn => write!(f, "dyn"),
        }
    }
}
