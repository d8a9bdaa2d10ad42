
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire form of a null remotable reference. Remotable parameters and
/// results travel as integer object ids; a null reference travels as this
/// sentinel, never as the object itself.
pub const NULL_OBJECT_ID: i64 = -1;

/// Value is the application-level payload carried by the two frame kinds.
///
/// Remotable references have already been substituted for integers by the
/// core before a value reaches the serialization collaborator, so every
/// variant here survives a byte-level round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "bytes[{}]", v.len()),
            Value::List(v) => write!(f, "list[{}]", v.len()),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(Error::ErrValueType(other.to_string())),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(Error::ErrValueType(other.to_string())),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(Error::ErrValueType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(Error::ErrValueType(other.to_string())),
        }
    }

    /// Reads a remotable reference slot: an object id, or None for the
    /// null sentinel.
    pub fn as_object_id(&self) -> Result<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Int(id) if *id == NULL_OBJECT_ID => Ok(None),
            Value::Int(id) => Ok(Some(*id)),
            other => Err(Error::ErrValueType(other.to_string())),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}
