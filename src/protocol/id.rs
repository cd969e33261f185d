//! Correlation identifiers
//!
//! An [`Id`] links a request to its response. Clients draw numeric ids from the
//! node's counter; servers echo whatever id the request carried.

use serde::{ Deserialize, Serialize };
use serde_json::Value;
use std::fmt;

/// A JSON-RPC identifier: null, a 64-bit integer, or a string.
///
/// Equality is by tag and value, so `Id::Number(1)` and `Id::String("1")` are
/// different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Null,
    Number(i64),
    String(String),
}

impl Id {
    /// Read an id from a JSON value, rejecting fractional numbers, booleans,
    /// arrays and objects
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Id::Null),
            Value::Number(n) => n.as_i64().map(Id::Number),
            Value::String(s) => Some(Id::String(s.clone())),
            _ => None,
        }
    }

    /// The JSON form of this id
    pub fn to_value(&self) -> Value {
        match self {
            Id::Null => Value::Null,
            Id::Number(n) => Value::from(*n),
            Id::String(s) => Value::String(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Id::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Id::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Null => write!(f, "null"),
            Id::Number(n) => write!(f, "{}", n),
            Id::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::String(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::String(value)
    }
}
